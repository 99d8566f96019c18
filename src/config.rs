//! JSON configuration with per-field defaults.
//!
//! Missing keys fall back to their defaults, unknown keys are ignored,
//! and an unreadable or unparsable file yields the all-default
//! configuration so a bad config never stops a crawl from starting.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub thread_count: usize,
    pub db_name: String,
    pub user_agent: String,
    pub request_timeout_sec: u64,
    pub max_links: usize,
    pub max_retries: u32,
    pub retry_delay_sec: u64,
    pub log_filename: String,
    pub verbose_logging: bool,
    /// Domain to keywords; restricts which links of that domain are
    /// followed and feeds the prioritizer bonuses.
    pub domain_keywords: HashMap<String, Vec<String>>,
    pub domain_keyword_weight: f64,
    pub cross_domain_keyword_weight: f64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            thread_count: 10,
            db_name: "parser.db".to_string(),
            user_agent: "MyWebCrawler/1.0".to_string(),
            request_timeout_sec: 30,
            max_links: 1000,
            max_retries: 3,
            retry_delay_sec: 5,
            log_filename: "logs.txt".to_string(),
            verbose_logging: true,
            domain_keywords: HashMap::new(),
            domain_keyword_weight: 3.0,
            cross_domain_keyword_weight: 1.5,
        }
    }
}

impl CrawlerConfig {
    pub fn load_from_file(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => {
                eprintln!("Could not open config file {}: {error}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("Error loading config {}: {error}", path.display());
                Self::default()
            }
        }
    }
}
