//! Per-domain robots.txt policy with a lazily populated cache.
//!
//! The cache lives behind a single async mutex and the robots.txt fetch
//! happens while it is held; that serializes the first access per domain,
//! so each domain is fetched at most once for the life of the crawl.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::fetcher::Fetch;
use crate::url_utils;

/// Rules for one `(domain, agent)` pair, in file order.
#[derive(Debug, Clone, Default)]
pub struct RobotsRecord {
    pub allow_rules: Vec<String>,
    pub disallow_rules: Vec<String>,
    pub crawl_delay: u64,
}

type DomainRecords = HashMap<String, RobotsRecord>;

pub struct RobotsPolicy {
    fetcher: Arc<dyn Fetch>,
    cache: Mutex<IndexMap<String, DomainRecords>>,
}

impl RobotsPolicy {
    /// The fetcher passed in should carry the short robots timeout, not
    /// the page-request timeout.
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(IndexMap::new()),
        }
    }

    /// Whether `agent` may fetch `url`. The record for the exact agent
    /// wins over `*`; with no record at all the domain is open. Within a
    /// record an allow match wins, then a disallow match denies.
    pub async fn is_allowed(&self, agent: &str, url: &str) -> bool {
        let domain = url_utils::extract_domain(url);
        if domain.is_empty() {
            return true;
        }
        let path = url_utils::extract_path(url);

        let mut cache = self.cache.lock().await;
        if !cache.contains_key(&domain) {
            let records = self.fetch_records(&domain).await;
            cache.insert(domain.clone(), records);
        }
        let records = &cache[&domain];

        let record = records.get(agent).or_else(|| records.get("*"));
        let Some(record) = record else {
            return true;
        };

        if record
            .allow_rules
            .iter()
            .any(|rule| matches_pattern(&path, rule))
        {
            return true;
        }
        !record
            .disallow_rules
            .iter()
            .any(|rule| matches_pattern(&path, rule))
    }

    /// Crawl-delay in seconds for `agent` on `domain`; 0 when unspecified.
    pub async fn crawl_delay(&self, agent: &str, domain: &str) -> u64 {
        if domain.is_empty() {
            return 0;
        }
        let mut cache = self.cache.lock().await;
        if !cache.contains_key(domain) {
            let records = self.fetch_records(domain).await;
            cache.insert(domain.to_string(), records);
        }
        let records = &cache[domain];
        records
            .get(agent)
            .or_else(|| records.get("*"))
            .map(|record| record.crawl_delay)
            .unwrap_or(0)
    }

    /// Fetch `robots.txt` over http, falling back to https. Any failure
    /// or empty file installs a permissive `*` record so the domain is
    /// never fetched again.
    async fn fetch_records(&self, domain: &str) -> DomainRecords {
        let mut content = None;
        for scheme in ["http", "https"] {
            let result = self
                .fetcher
                .fetch(&format!("{scheme}://{domain}/robots.txt"))
                .await;
            if result.is_success() {
                content = Some(result.body);
                break;
            }
        }

        match content {
            Some(content) => {
                tracing::debug!("Fetched robots.txt for {domain}");
                parse_robots(&content)
            }
            None => {
                tracing::debug!("No robots.txt for {domain}, allowing everything");
                let mut records = DomainRecords::new();
                records.insert("*".to_string(), RobotsRecord::default());
                records
            }
        }
    }
}

/// Parse a robots.txt body into per-agent records. Successive
/// `User-agent` lines before any rule form one group sharing the rules
/// that follow.
fn parse_robots(content: &str) -> DomainRecords {
    let mut records = DomainRecords::new();
    let mut group: Vec<String> = vec!["*".to_string()];
    let mut group_open = false;

    for raw_line in content.lines() {
        let line = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                if value.is_empty() {
                    continue;
                }
                if group_open {
                    group.push(value.to_string());
                } else {
                    group = vec![value.to_string()];
                    group_open = true;
                }
                records.entry(value.to_string()).or_default();
            }
            "disallow" => {
                group_open = false;
                if !value.is_empty() {
                    for agent in &group {
                        records
                            .entry(agent.clone())
                            .or_default()
                            .disallow_rules
                            .push(value.to_string());
                    }
                }
            }
            "allow" => {
                group_open = false;
                if !value.is_empty() {
                    for agent in &group {
                        records
                            .entry(agent.clone())
                            .or_default()
                            .allow_rules
                            .push(value.to_string());
                    }
                }
            }
            "crawl-delay" => {
                group_open = false;
                if let Ok(delay) = value.parse::<u64>() {
                    for agent in &group {
                        records.entry(agent.clone()).or_default().crawl_delay = delay;
                    }
                }
            }
            _ => {}
        }
    }

    records
}

/// Prefix match with `*` as a greedy, backtracking run of characters.
/// All other characters, including `?`, are literal. A pattern without
/// `*` is a plain prefix test; with `*` the pattern must consume the
/// whole path.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return path.starts_with(pattern);
    }

    let path: Vec<char> = path.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<(usize, usize)> = None;

    while pi < path.len() {
        if ti < pattern.len() && pattern[ti] == path[pi] && pattern[ti] != '*' {
            pi += 1;
            ti += 1;
        } else if ti < pattern.len() && pattern[ti] == '*' {
            star = Some((ti, pi));
            ti += 1;
        } else if let Some((star_ti, star_pi)) = star {
            ti = star_ti + 1;
            star = Some((star_ti, star_pi + 1));
            pi = star_pi + 1;
        } else {
            return false;
        }
    }

    while ti < pattern.len() && pattern[ti] == '*' {
        ti += 1;
    }
    ti == pattern.len()
}
