//! A polite, multithreaded web crawler with a searchable page store.
//!
//! Starting from a seed list, the [`engine::CrawlEngine`] drains a
//! priority frontier with a bounded worker pool, honoring robots.txt
//! rules and per-domain crawl delays, and persists extracted page text
//! through [`storage::Database`]. The `searcher` binary runs substring
//! queries over the same store.

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod frontier;
pub mod html;
pub mod metrics;
pub mod robots;
pub mod storage;
pub mod url_utils;
