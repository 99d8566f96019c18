//! The concurrent crawl engine.
//!
//! The engine owns the frontier, the visited set, the depth map and the
//! seed-domain set behind one mutex, plus the per-domain access clock.
//! A drain loop pops the best frontier item and hands it to a worker
//! task; a semaphore sized to `thread_count` bounds how many run at
//! once. The loop parks on an outstanding-task counter between drains
//! and re-checks the termination condition under the state mutex, so no
//! live worker can refill the frontier after the decision to stop.
//!
//! Lock order: state < tasks < domain clock < robots cache. No method
//! holds two of them at once.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{Mutex as AsyncMutex, Notify, Semaphore};

use crate::config::CrawlerConfig;
use crate::fetcher::{fetch_with_retry, Fetch, HttpFetcher};
use crate::frontier::{Frontier, Prioritizer, UrlItem, SEED_PRIORITY};
use crate::html;
use crate::metrics::{Metrics, OP_DB_WRITE, OP_HTML_PARSE, OP_PROCESS, OP_ROBOTS_CHECK};
use crate::robots::RobotsPolicy;
use crate::storage::{Database, Mode, PageStore};
use crate::url_utils;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Default)]
struct CrawlState {
    frontier: Frontier,
    visited: HashSet<String>,
    depths: HashMap<String, usize>,
    seed_domains: HashSet<String>,
}

/// Outstanding-worker count with an idle signal for the drain loop.
struct TaskCounter {
    active: AtomicUsize,
    idle: Notify,
}

impl TaskCounter {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases the task slot even when the worker panics.
struct TaskGuard {
    tasks: Arc<TaskCounter>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tasks.decrement();
    }
}

struct ThreadGauge<'a> {
    metrics: &'a Metrics,
}

impl<'a> ThreadGauge<'a> {
    fn new(metrics: &'a Metrics) -> Self {
        metrics.increment_active_threads();
        Self { metrics }
    }
}

impl Drop for ThreadGauge<'_> {
    fn drop(&mut self) {
        self.metrics.decrement_active_threads();
    }
}

pub struct CrawlEngine {
    config: CrawlerConfig,
    state: Mutex<CrawlState>,
    tasks: Arc<TaskCounter>,
    domain_clock: AsyncMutex<HashMap<String, Instant>>,
    robots: RobotsPolicy,
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn PageStore>,
    prioritizer: Prioritizer,
    metrics: Arc<Metrics>,
    pool: Arc<Semaphore>,
}

impl CrawlEngine {
    pub fn new(config: CrawlerConfig) -> Result<Arc<Self>> {
        let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_sec),
        )?);
        let robots_fetcher: Arc<dyn Fetch> =
            Arc::new(HttpFetcher::new(&config.user_agent, ROBOTS_FETCH_TIMEOUT)?);
        let store: Arc<dyn PageStore> =
            Arc::new(Database::open(Path::new(&config.db_name), Mode::Crawler));
        Ok(Self::with_parts(config, fetcher, robots_fetcher, store))
    }

    /// Assemble an engine from explicit collaborators. This is the seam
    /// the tests use to substitute scripted fetchers and stores.
    pub fn with_parts(
        config: CrawlerConfig,
        fetcher: Arc<dyn Fetch>,
        robots_fetcher: Arc<dyn Fetch>,
        store: Arc<dyn PageStore>,
    ) -> Arc<Self> {
        let pool_size = config.thread_count.max(1);
        Arc::new(Self {
            prioritizer: Prioritizer::new(&config),
            robots: RobotsPolicy::new(robots_fetcher),
            state: Mutex::new(CrawlState::default()),
            tasks: Arc::new(TaskCounter::new()),
            domain_clock: AsyncMutex::new(HashMap::new()),
            fetcher,
            store,
            metrics: Arc::new(Metrics::new()),
            pool: Arc::new(Semaphore::new(pool_size)),
            config,
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Load seeds, one URL per line; blank lines are skipped and
    /// duplicates collapse. Returns how many entered the frontier.
    pub fn load_seeds_from_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("unable to open seed file {}", path.display()))?;
        let mut loaded = 0;
        for line in content.lines() {
            if self.add_seed(line) {
                loaded += 1;
            }
        }
        let state = self.state.lock().unwrap();
        self.metrics.set_queue_size(state.frontier.len());
        self.metrics.set_visited_count(state.visited.len());
        drop(state);
        tracing::info!("Loaded {loaded} seed links from {}", path.display());
        Ok(loaded)
    }

    fn add_seed(&self, raw: &str) -> bool {
        if raw.trim().is_empty() {
            return false;
        }
        let url = url_utils::normalize(raw);
        let domain = url_utils::extract_domain(&url);
        if domain.is_empty() {
            tracing::warn!("Skipping invalid seed URL: {raw}");
            return false;
        }
        let mut state = self.state.lock().unwrap();
        if state.visited.contains(&url) {
            return false;
        }
        state.visited.insert(url.clone());
        state.depths.insert(url.clone(), 0);
        state.seed_domains.insert(domain);
        state.frontier.push(UrlItem {
            url,
            depth: 0,
            priority: SEED_PRIORITY,
        });
        true
    }

    /// Drain the frontier to completion: either the visited set reaches
    /// `max_links` or the frontier empties with no task outstanding.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let reporter = self.metrics.spawn_reporter(REPORT_INTERVAL);
        let mut workers = Vec::new();

        loop {
            while let Some(item) = self.pop_next() {
                self.tasks.increment();
                let engine = Arc::clone(self);
                workers.push(tokio::spawn(async move {
                    let _task = TaskGuard {
                        tasks: Arc::clone(&engine.tasks),
                    };
                    let Ok(_permit) = engine.pool.acquire().await else {
                        return;
                    };
                    engine.process(item).await;
                }));
            }

            self.tasks.wait_idle().await;

            let state = self.state.lock().unwrap();
            if state.visited.len() >= self.config.max_links {
                tracing::info!("Visited limit of {} reached", self.config.max_links);
                break;
            }
            if state.frontier.is_empty() {
                tracing::info!("Frontier exhausted after {} links", state.visited.len());
                break;
            }
        }

        // Every worker is already done; joining only surfaces panics.
        for joined in futures::future::join_all(workers).await {
            if let Err(error) = joined {
                tracing::error!("Worker task failed: {error}");
            }
        }

        reporter.abort();
        let _ = reporter.await;
        Ok(())
    }

    fn pop_next(&self) -> Option<UrlItem> {
        let mut state = self.state.lock().unwrap();
        if state.visited.len() >= self.config.max_links {
            return None;
        }
        let item = state.frontier.pop()?;
        self.metrics.set_queue_size(state.frontier.len());
        Some(item)
    }

    #[tracing::instrument(skip(self, item), fields(url = %item.url, depth = item.depth))]
    async fn process(&self, item: UrlItem) {
        let _threads = ThreadGauge::new(&self.metrics);
        let timer = self.metrics.timer(OP_PROCESS, Some(&item.url));

        let robots_timer = self.metrics.timer(OP_ROBOTS_CHECK, Some(&item.url));
        let allowed = self
            .robots
            .is_allowed(&self.config.user_agent, &item.url)
            .await;
        robots_timer.stop(true);
        if !allowed {
            tracing::info!("Disallowed by robots.txt: {}", item.url);
            self.mark_visited(&item.url);
            return;
        }

        self.respect_crawl_delay(&item.url).await;

        let result = fetch_with_retry(
            self.fetcher.as_ref(),
            &item.url,
            self.config.max_retries,
            Duration::from_secs(self.config.retry_delay_sec),
            &self.metrics,
        )
        .await;
        if !result.is_success() {
            tracing::warn!("Giving up on {} (HTTP {})", item.url, result.status);
            self.mark_visited(&item.url);
            timer.stop(false);
            return;
        }

        let parse_timer = self.metrics.timer(OP_HTML_PARSE, Some(&item.url));
        let links = html::extract_links(&result.body, &item.url);
        let text = html::extract_text(&result.body);
        parse_timer.stop(true);

        if !text.is_empty() {
            let write_timer = self.metrics.timer(OP_DB_WRITE, Some(&item.url));
            self.store.insert(&item.url, &text);
            write_timer.stop(true);
        }

        self.merge_links(&item, links);
        timer.stop(true);
    }

    /// Honor the cached crawl-delay for the URL's domain. The sleep is
    /// performed while holding the clock, which serializes requests to
    /// any domain for that interval.
    async fn respect_crawl_delay(&self, url: &str) {
        let domain = url_utils::extract_domain(url);
        let delay = self
            .robots
            .crawl_delay(&self.config.user_agent, &domain)
            .await;
        if delay == 0 {
            return;
        }
        let delay = Duration::from_secs(delay);
        let mut clock = self.domain_clock.lock().await;
        if let Some(last) = clock.get(&domain) {
            let elapsed = last.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        clock.insert(domain, Instant::now());
    }

    /// Merge freshly extracted links into the frontier under the state
    /// mutex. A link survives only while both caps hold and it is
    /// in-scope, unseen, and passes the per-domain keyword filter;
    /// survivors enter the visited set the moment they are enqueued.
    fn merge_links(&self, item: &UrlItem, links: HashSet<String>) {
        let mut state = self.state.lock().unwrap();
        for link in links {
            if state.visited.len() >= self.config.max_links
                || state.frontier.len() >= self.config.max_links
            {
                continue;
            }
            if !state
                .seed_domains
                .iter()
                .any(|domain| url_utils::is_same_domain(&link, domain))
            {
                continue;
            }
            if state.visited.contains(&link) {
                continue;
            }
            if !self.passes_keyword_filter(&link) {
                continue;
            }
            let depth = item.depth + 1;
            let priority = self.prioritizer.score(&link, depth);
            state.visited.insert(link.clone());
            state.depths.insert(link.clone(), depth);
            state.frontier.push(UrlItem {
                url: link,
                depth,
                priority,
            });
        }
        state.visited.insert(item.url.clone());
        self.metrics.set_queue_size(state.frontier.len());
        self.metrics.set_visited_count(state.visited.len());
    }

    fn mark_visited(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.visited.insert(url.to_string());
        self.metrics.set_visited_count(state.visited.len());
    }

    /// With keyword filtering configured, a link on a configured domain
    /// must carry one of that domain's keywords in its path.
    fn passes_keyword_filter(&self, url: &str) -> bool {
        if self.config.domain_keywords.is_empty() {
            return true;
        }
        let domain = url_utils::extract_domain(url);
        let Some(keywords) = self.config.domain_keywords.get(&domain) else {
            return true;
        };
        let path = url_utils::extract_path(url).to_lowercase();
        keywords
            .iter()
            .any(|keyword| path.contains(&keyword.to_lowercase()))
    }
}
