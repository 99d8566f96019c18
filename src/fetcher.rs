//! HTTP page fetching behind an object-safe seam.
//!
//! The engine and the robots policy only see the [`Fetch`] trait, so tests
//! can substitute scripted responses for the real client.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use crate::metrics::{Metrics, OP_HTTP_REQUEST};

/// Outcome of a single GET. `status` is 0 when the transport itself failed
/// (DNS, connect, timeout) and no response was received.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub ok: bool,
    pub status: u16,
    pub body: String,
}

impl FetchResult {
    /// A response counts as successful only with a 2xx/3xx status and a
    /// non-empty body; an empty body is useless to the extractor.
    pub fn is_success(&self) -> bool {
        (200..=399).contains(&self.status) && !self.body.is_empty()
    }

    /// Transient failures are worth another attempt; 4xx is not.
    pub fn is_retryable(&self) -> bool {
        !self.ok || self.status == 0 || (500..=599).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// [`Fetch`] implementation over a shared `reqwest` client. Redirects are
/// followed at the client default; the body is buffered in memory.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => FetchResult {
                        ok: true,
                        status,
                        body,
                    },
                    Err(error) => {
                        tracing::debug!("Failed to read body of {url}: {error}");
                        FetchResult {
                            ok: false,
                            status,
                            body: String::new(),
                        }
                    }
                }
            }
            Err(error) => {
                tracing::debug!("Request to {url} failed: {error}");
                FetchResult::default()
            }
        }
    }
}

/// Fetch with the retry policy of the crawl engine: up to `max_retries`
/// total attempts, a fixed sleep between them, retrying only transport
/// errors and 5xx responses. Every attempt is timed as an "HTTP Request"
/// sample and every successful body adds to the download counter.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    url: &str,
    max_retries: u32,
    retry_delay: Duration,
    metrics: &Metrics,
) -> FetchResult {
    let attempts = max_retries.max(1);
    let mut result = FetchResult::default();

    for attempt in 1..=attempts {
        let timer = metrics.timer(OP_HTTP_REQUEST, Some(url));
        result = fetcher.fetch(url).await;
        let success = result.is_success();
        timer.stop(success);

        if success {
            metrics.add_bytes_downloaded(result.body.len());
            return result;
        }
        if !result.is_retryable() {
            tracing::debug!("Not retrying {url}: HTTP {}", result.status);
            return result;
        }
        if attempt < attempts {
            tracing::debug!(
                "Attempt {attempt}/{attempts} for {url} failed (HTTP {}), retrying",
                result.status
            );
            tokio::time::sleep(retry_delay).await;
        }
    }

    result
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[tokio::test]
    async fn retries_5xx_until_success() {
        let fetcher = ScriptedFetcher::new(
            vec![
                status(503, "unavailable"),
                status(503, "unavailable"),
                status(200, "<html>ok</html>"),
            ],
            transport_error(),
        );
        let metrics = Metrics::new();
        let result = fetch_with_retry(
            &fetcher,
            "http://example.com/a",
            3,
            Duration::from_millis(0),
            &metrics,
        )
        .await;

        assert!(result.is_success());
        assert_eq!(fetcher.call_count(), 3);

        let stats = metrics.operation_stats(OP_HTTP_REQUEST).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.error_count, 2);
    }

    #[tokio::test]
    async fn does_not_retry_4xx() {
        let fetcher = ScriptedFetcher::new(vec![status(404, "missing")], status(200, "late"));
        let metrics = Metrics::new();
        let result = fetch_with_retry(
            &fetcher,
            "http://example.com/a",
            3,
            Duration::from_millis(0),
            &metrics,
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(result.status, 404);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_body_with_success_status_is_failure_without_retry() {
        let fetcher = ScriptedFetcher::new(vec![status(200, "")], status(200, "late"));
        let metrics = Metrics::new();
        let result = fetch_with_retry(
            &fetcher,
            "http://example.com/a",
            3,
            Duration::from_millis(0),
            &metrics,
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(metrics.total_bytes_downloaded(), 0);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let fetcher = ScriptedFetcher::new(vec![], transport_error());
        let metrics = Metrics::new();
        let result = fetch_with_retry(
            &fetcher,
            "http://example.com/a",
            3,
            Duration::from_millis(0),
            &metrics,
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(fetcher.call_count(), 3);
        let stats = metrics.operation_stats(OP_HTTP_REQUEST).unwrap();
        assert_eq!(stats.error_count, 3);
    }

    #[tokio::test]
    async fn successful_body_counts_bytes() {
        let fetcher = ScriptedFetcher::new(vec![status(200, "abcd")], transport_error());
        let metrics = Metrics::new();
        let _ = fetch_with_retry(
            &fetcher,
            "http://example.com/a",
            1,
            Duration::from_millis(0),
            &metrics,
        )
        .await;
        assert_eq!(metrics.total_bytes_downloaded(), 4);
    }
}
