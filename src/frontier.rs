//! The frontier of pending URLs and the scoring that orders it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use regex::{Regex, RegexBuilder};

use crate::config::CrawlerConfig;
use crate::url_utils;

/// Priority assigned to every seed URL.
pub const SEED_PRIORITY: f64 = 10.0;

/// A pending fetch. Ordered by priority; ties resolve in any order.
#[derive(Debug, Clone)]
pub struct UrlItem {
    pub url: String,
    pub depth: usize,
    pub priority: f64,
}

impl PartialEq for UrlItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}

impl Eq for UrlItem {}

impl PartialOrd for UrlItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UrlItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// Max-heap of [`UrlItem`]s. Deduplication is the visited set's job,
/// not the frontier's.
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<UrlItem>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: UrlItem) {
        self.heap.push(item);
    }

    /// Remove and return the highest-priority item.
    pub fn pop(&mut self) -> Option<UrlItem> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Fixed weights for path keywords that hint at page importance.
const KEYWORD_WEIGHTS: [(&str, f64); 10] = [
    ("about", 1.5),
    ("index", 1.2),
    ("main", 1.2),
    ("home", 1.1),
    ("product", 1.3),
    ("service", 1.3),
    ("blog", 0.9),
    ("news", 1.0),
    ("article", 0.9),
    ("contact", 0.8),
];

/// Computes the crawl priority of a URL at a given discovery depth:
/// `keyword_factor * depth_factor * tld_factor + domain_keyword_bonus`.
pub struct Prioritizer {
    keyword_patterns: Vec<(Regex, f64)>,
    domain_keywords: Vec<(String, Vec<Regex>)>,
    domain_keyword_weight: f64,
    cross_domain_keyword_weight: f64,
}

impl Prioritizer {
    pub fn new(config: &CrawlerConfig) -> Self {
        let keyword_patterns = KEYWORD_WEIGHTS
            .iter()
            .filter_map(|(keyword, weight)| {
                whole_word(keyword).map(|pattern| (pattern, *weight))
            })
            .collect();

        let domain_keywords = config
            .domain_keywords
            .iter()
            .map(|(domain, keywords)| {
                let patterns = keywords
                    .iter()
                    .filter_map(|keyword| whole_word(keyword))
                    .collect();
                (domain.clone(), patterns)
            })
            .collect();

        Self {
            keyword_patterns,
            domain_keywords,
            domain_keyword_weight: config.domain_keyword_weight,
            cross_domain_keyword_weight: config.cross_domain_keyword_weight,
        }
    }

    pub fn score(&self, url: &str, depth: usize) -> f64 {
        self.keyword_factor(url) * depth_factor(depth) * tld_factor(url)
            + self.domain_keyword_bonus(url)
    }

    fn keyword_factor(&self, url: &str) -> f64 {
        let mut factor = 1.0;
        for (pattern, weight) in &self.keyword_patterns {
            if pattern.is_match(url) {
                factor *= weight;
            }
        }
        if url_utils::extract_path(url) == "/" {
            factor *= 1.5;
        }
        factor
    }

    fn domain_keyword_bonus(&self, url: &str) -> f64 {
        let url_domain = url_utils::extract_domain(url);
        let mut bonus = 0.0;
        for (domain, patterns) in &self.domain_keywords {
            let weight = if *domain == url_domain {
                self.domain_keyword_weight
            } else {
                self.cross_domain_keyword_weight
            };
            for pattern in patterns {
                if pattern.is_match(url) {
                    bonus += weight;
                }
            }
        }
        bonus
    }
}

fn depth_factor(depth: usize) -> f64 {
    (2.0 / (depth as f64 + 1.0)).max(0.1)
}

fn tld_factor(url: &str) -> f64 {
    let domain = url_utils::extract_domain(url);
    if domain.ends_with(".gov") {
        1.4
    } else if domain.ends_with(".edu") {
        1.3
    } else if domain.ends_with(".org") {
        1.2
    } else {
        1.0
    }
}

fn whole_word(keyword: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
        .case_insensitive(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, priority: f64) -> UrlItem {
        UrlItem {
            url: url.to_string(),
            depth: 0,
            priority,
        }
    }

    #[test]
    fn frontier_pops_highest_priority_first() {
        let mut frontier = Frontier::new();
        frontier.push(item("http://a", 1.0));
        frontier.push(item("http://b", 5.0));
        frontier.push(item("http://c", 3.0));

        assert_eq!(frontier.pop().unwrap().url, "http://b");
        assert_eq!(frontier.pop().unwrap().url, "http://c");
        assert_eq!(frontier.pop().unwrap().url, "http://a");
        assert!(frontier.pop().is_none());
        assert!(frontier.is_empty());
    }

    #[test]
    fn shallow_gov_about_beats_deep_com_blog() {
        let prioritizer = Prioritizer::new(&CrawlerConfig::default());
        let shallow = prioritizer.score("http://agency.gov/about", 0);
        let deep = prioritizer.score("http://example.com/blog", 3);
        assert!(shallow > deep, "{shallow} <= {deep}");
    }

    #[test]
    fn keyword_factors_multiply() {
        let prioritizer = Prioritizer::new(&CrawlerConfig::default());
        let plain = prioritizer.score("http://example.com/page", 0);
        let about = prioritizer.score("http://example.com/about", 0);
        assert!((about / plain - 1.5).abs() < 1e-9);
    }

    #[test]
    fn root_path_gets_home_page_boost() {
        let prioritizer = Prioritizer::new(&CrawlerConfig::default());
        let root = prioritizer.score("http://example.com", 0);
        let page = prioritizer.score("http://example.com/page", 0);
        assert!((root / page - 1.5).abs() < 1e-9);
    }

    #[test]
    fn depth_factor_decays_and_floors() {
        assert_eq!(depth_factor(0), 2.0);
        assert_eq!(depth_factor(1), 1.0);
        assert_eq!(depth_factor(3), 0.5);
        assert_eq!(depth_factor(100), 0.1);
    }

    #[test]
    fn domain_keyword_bonus_is_additive() {
        let mut config = CrawlerConfig::default();
        config
            .domain_keywords
            .insert("example.com".to_string(), vec!["rust".to_string()]);
        let prioritizer = Prioritizer::new(&config);

        let own = prioritizer.score("http://example.com/rust", 0);
        let cross = prioritizer.score("http://other.com/rust", 0);
        let neither = prioritizer.score("http://example.com/python", 0);

        assert!((own - neither - config.domain_keyword_weight).abs() < 1e-9);
        let cross_base = prioritizer.score("http://other.com/python", 0);
        assert!((cross - cross_base - config.cross_domain_keyword_weight).abs() < 1e-9);
    }

    #[test]
    fn keyword_matching_is_whole_word_and_case_insensitive() {
        let prioritizer = Prioritizer::new(&CrawlerConfig::default());
        // "aboutus" must not match the "about" keyword.
        let fused = prioritizer.score("http://example.com/aboutus", 0);
        let plain = prioritizer.score("http://example.com/page", 0);
        assert!((fused - plain).abs() < 1e-9);

        let upper = prioritizer.score("http://example.com/ABOUT", 0);
        let lower = prioritizer.score("http://example.com/about", 0);
        assert!((upper - lower).abs() < 1e-9);
    }
}
