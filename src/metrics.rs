//! Crawl-wide performance accounting.
//!
//! One `Metrics` value is created by the engine and shared by `Arc` with
//! every component that reports into it. Operation timings live behind a
//! single mutex; the activity counters are atomics.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::url_utils;

pub const OP_HTTP_REQUEST: &str = "HTTP Request";
pub const OP_ROBOTS_CHECK: &str = "Robots Check";
pub const OP_HTML_PARSE: &str = "HTML Parse";
pub const OP_DB_WRITE: &str = "DB Write";
pub const OP_PROCESS: &str = "Process URL";

/// Aggregated samples for one named operation.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub total_ms: f64,
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub error_count: usize,
    pub domain_ms: HashMap<String, f64>,
    pub domain_counts: HashMap<String, usize>,
}

impl OperationStats {
    fn record(&mut self, ms: f64, success: bool, domain: Option<&str>) {
        self.total_ms += ms;
        self.count += 1;
        if self.count == 1 || ms < self.min_ms {
            self.min_ms = ms;
        }
        if self.count == 1 || ms > self.max_ms {
            self.max_ms = ms;
        }
        if !success {
            self.error_count += 1;
        }
        if let Some(domain) = domain {
            if !domain.is_empty() {
                *self.domain_ms.entry(domain.to_string()).or_default() += ms;
                *self.domain_counts.entry(domain.to_string()).or_default() += 1;
            }
        }
    }

    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

pub struct Metrics {
    operations: Mutex<HashMap<String, OperationStats>>,
    start_time: Mutex<Instant>,
    active_threads: AtomicUsize,
    queue_size: AtomicUsize,
    visited_count: AtomicUsize,
    total_bytes_downloaded: AtomicUsize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            start_time: Mutex::new(Instant::now()),
            active_threads: AtomicUsize::new(0),
            queue_size: AtomicUsize::new(0),
            visited_count: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
        }
    }

    /// Start a timing window for `operation`. The window closes when the
    /// returned guard is stopped (or dropped, which records success); a
    /// URL associates the sample with its domain for the slow-domain
    /// breakdown.
    pub fn timer<'a>(&'a self, operation: &'static str, url: Option<&str>) -> Timer<'a> {
        Timer {
            metrics: self,
            operation,
            domain: url.map(url_utils::extract_domain),
            start: Instant::now(),
            armed: true,
        }
    }

    pub fn record_metric(&self, operation: &str, ms: f64, success: bool, domain: Option<&str>) {
        let mut operations = self.operations.lock().unwrap();
        operations
            .entry(operation.to_string())
            .or_default()
            .record(ms, success, domain);
    }

    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        self.operations.lock().unwrap().get(operation).cloned()
    }

    pub fn increment_active_threads(&self) {
        self.active_threads.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_active_threads(&self) {
        let _ = self
            .active_threads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn set_queue_size(&self, size: usize) {
        self.queue_size.store(size, Ordering::SeqCst);
    }

    pub fn set_visited_count(&self, count: usize) {
        self.visited_count.store(count, Ordering::SeqCst);
    }

    pub fn add_bytes_downloaded(&self, bytes: usize) {
        self.total_bytes_downloaded.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::SeqCst)
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::SeqCst)
    }

    pub fn visited_count(&self) -> usize {
        self.visited_count.load(Ordering::SeqCst)
    }

    pub fn total_bytes_downloaded(&self) -> usize {
        self.total_bytes_downloaded.load(Ordering::SeqCst)
    }

    pub fn urls_per_second(&self) -> f64 {
        let elapsed = self.start_time.lock().unwrap().elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.visited_count() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Average download bandwidth in kB/s since start (or last reset).
    pub fn bandwidth_kbps(&self) -> f64 {
        let elapsed = self.start_time.lock().unwrap().elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.total_bytes_downloaded() as f64 / 1024.0) / elapsed
        } else {
            0.0
        }
    }

    /// Drop all recorded samples and counters and restart the clock.
    pub fn reset(&self) {
        self.operations.lock().unwrap().clear();
        self.active_threads.store(0, Ordering::SeqCst);
        self.queue_size.store(0, Ordering::SeqCst);
        self.visited_count.store(0, Ordering::SeqCst);
        self.total_bytes_downloaded.store(0, Ordering::SeqCst);
        *self.start_time.lock().unwrap() = Instant::now();
    }

    /// Write the tabular performance summary to `sink`.
    pub fn print_report(&self, sink: &mut dyn Write) -> io::Result<()> {
        let runtime = self.start_time.lock().unwrap().elapsed().as_secs_f64();
        let operations = self.operations.lock().unwrap();

        writeln!(sink)?;
        writeln!(sink, "===== Web Crawler Performance Report =====")?;
        writeln!(sink, "Runtime: {runtime:.2} seconds")?;
        writeln!(sink, "URLs processed: {}", self.visited_count())?;
        writeln!(sink, "Active threads: {}", self.active_threads())?;
        writeln!(sink, "Queue size: {}", self.queue_size())?;
        writeln!(
            sink,
            "Total downloaded: {:.2} KB",
            self.total_bytes_downloaded() as f64 / 1024.0
        )?;
        writeln!(sink, "Processing rate: {:.2} URLs/second", self.urls_per_second())?;
        writeln!(sink, "Bandwidth: {:.2} kB/s", self.bandwidth_kbps())?;
        writeln!(sink)?;
        writeln!(
            sink,
            "{:<16} {:>8} {:>10} {:>10} {:>10} {:>8} {:>10}",
            "Operation", "Count", "Avg ms", "Min ms", "Max ms", "Errors", "Success %"
        )?;

        let mut names: Vec<&String> = operations.keys().collect();
        names.sort();
        for name in names {
            let stats = &operations[name];
            let success_pct = if stats.count == 0 {
                100.0
            } else {
                (stats.count - stats.error_count) as f64 / stats.count as f64 * 100.0
            };
            writeln!(
                sink,
                "{:<16} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>8} {:>9.1}%",
                name, stats.count, stats.avg_ms(), stats.min_ms, stats.max_ms,
                stats.error_count, success_pct
            )?;
        }

        writeln!(sink)?;
        writeln!(sink, "Top 5 Slowest Domains ({OP_HTTP_REQUEST}):")?;
        if let Some(http) = operations.get(OP_HTTP_REQUEST) {
            let mut domains: Vec<(&String, f64, usize)> = http
                .domain_ms
                .iter()
                .map(|(domain, total)| {
                    let count = http.domain_counts.get(domain).copied().unwrap_or(1);
                    (domain, total / count as f64, count)
                })
                .collect();
            domains.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (domain, avg, count) in domains.into_iter().take(5) {
                writeln!(sink, "  {domain}: {avg:.2} ms avg over {count} requests")?;
            }
        }

        Ok(())
    }

    /// Periodically log a progress snapshot until the handle is aborted.
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracing::info!(
                    visited = metrics.visited_count(),
                    queued = metrics.queue_size(),
                    active = metrics.active_threads(),
                    rate = format_args!("{:.2}/s", metrics.urls_per_second()),
                    bandwidth = format_args!("{:.2} kB/s", metrics.bandwidth_kbps()),
                    "crawl progress"
                );
            }
        })
    }
}

/// RAII timing window handed out by [`Metrics::timer`].
pub struct Timer<'a> {
    metrics: &'a Metrics,
    operation: &'static str,
    domain: Option<String>,
    start: Instant,
    armed: bool,
}

impl Timer<'_> {
    pub fn stop(mut self, success: bool) {
        self.finish(success);
    }

    fn finish(&mut self, success: bool) {
        if self.armed {
            self.armed = false;
            let ms = self.start.elapsed().as_secs_f64() * 1000.0;
            self.metrics
                .record_metric(self.operation, ms, success, self.domain.as_deref());
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.finish(true);
    }
}
