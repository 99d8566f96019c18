//! Relational page store shared by the crawler and the searcher.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::url_utils;

/// What the engine needs from a store: a dedup query and an idempotent
/// write. Writes may arrive from any worker; implementations serialize
/// internally.
pub trait PageStore: Send + Sync {
    fn seen(&self, url: &str) -> bool;
    fn insert(&self, url: &str, text: &str);
}

pub enum Mode {
    /// Destroy any existing store and start fresh.
    Crawler,
    /// Open an existing store read-only.
    Searcher,
}

/// SQLite-backed store with a single `pages(id, url UNIQUE, content)`
/// table. URLs are normalized on every call so the stored identity is
/// the canonical form. A failed open is logged and every later call
/// short-circuits.
pub struct Database {
    conn: Option<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path, mode: Mode) -> Self {
        let conn = match mode {
            Mode::Crawler => {
                let _ = std::fs::remove_file(path);
                Connection::open(path).and_then(|conn| {
                    conn.execute_batch(
                        "CREATE TABLE IF NOT EXISTS pages (
                             id INTEGER PRIMARY KEY AUTOINCREMENT,
                             url TEXT UNIQUE,
                             content TEXT
                         );",
                    )?;
                    Ok(conn)
                })
            }
            Mode::Searcher => {
                Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            }
        };

        match conn {
            Ok(conn) => Self {
                conn: Some(Mutex::new(conn)),
            },
            Err(error) => {
                tracing::error!("Failed to open database {}: {error}", path.display());
                Self { conn: None }
            }
        }
    }

    pub fn seen(&self, url: &str) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        let normalized = url_utils::normalize(url);
        let conn = conn.lock().unwrap();
        let row: Result<Option<i64>, _> = conn
            .query_row(
                "SELECT 1 FROM pages WHERE url = ?1 LIMIT 1;",
                params![normalized],
                |row| row.get(0),
            )
            .optional();
        match row {
            Ok(found) => found.is_some(),
            Err(error) => {
                tracing::error!("Dedup query failed for {normalized}: {error}");
                false
            }
        }
    }

    pub fn insert(&self, url: &str, text: &str) {
        let Some(conn) = &self.conn else {
            return;
        };
        let normalized = url_utils::normalize(url);
        let conn = conn.lock().unwrap();
        // UNIQUE on url makes a concurrent duplicate a no-op.
        if let Err(error) = conn.execute(
            "INSERT OR IGNORE INTO pages (url, content) VALUES (?1, ?2);",
            params![normalized, text],
        ) {
            tracing::error!("Failed to insert {normalized}: {error}");
        }
    }

    /// URLs of all pages whose content contains `query` as a substring.
    pub fn search(&self, query: &str) -> Vec<String> {
        let Some(conn) = &self.conn else {
            return Vec::new();
        };
        let conn = conn.lock().unwrap();
        let mut statement = match conn.prepare("SELECT url FROM pages WHERE content LIKE ?1;") {
            Ok(statement) => statement,
            Err(error) => {
                tracing::error!("Failed to prepare search: {error}");
                return Vec::new();
            }
        };
        let pattern = format!("%{query}%");
        let rows = statement.query_map(params![pattern], |row| row.get::<_, String>(0));
        match rows {
            Ok(rows) => rows.filter_map(|row| row.ok()).collect(),
            Err(error) => {
                tracing::error!("Search query failed: {error}");
                Vec::new()
            }
        }
    }
}

impl PageStore for Database {
    fn seen(&self, url: &str) -> bool {
        Database::seen(self, url)
    }

    fn insert(&self, url: &str, text: &str) {
        if !self.seen(url) {
            Database::insert(self, url, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler_db(dir: &tempfile::TempDir) -> Database {
        Database::open(&dir.path().join("test.db"), Mode::Crawler)
    }

    #[test]
    fn insert_then_seen() {
        let dir = tempfile::tempdir().unwrap();
        let db = crawler_db(&dir);
        assert!(!db.seen("http://example.com/a"));
        db.insert("http://example.com/a", "hello world");
        assert!(db.seen("http://example.com/a"));
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let db = crawler_db(&dir);
        db.insert("http://example.com/a", "first");
        db.insert("http://example.com/a", "second");
        let urls = db.search("first");
        assert_eq!(urls, vec!["http://example.com/a".to_string()]);
        assert!(db.search("second").is_empty());
    }

    #[test]
    fn identity_is_the_normalized_url() {
        let dir = tempfile::tempdir().unwrap();
        let db = crawler_db(&dir);
        db.insert("HTTP://Example.com/a//b/index.html", "content");
        assert!(db.seen("http://example.com/a/b/"));
    }

    #[test]
    fn crawler_mode_destroys_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let db = Database::open(&path, Mode::Crawler);
            db.insert("http://example.com/a", "old");
        }
        let db = Database::open(&path, Mode::Crawler);
        assert!(!db.seen("http://example.com/a"));
    }

    #[test]
    fn searcher_mode_reads_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let db = Database::open(&path, Mode::Crawler);
            db.insert("http://example.com/a", "needle in haystack");
            db.insert("http://example.com/b", "nothing here");
        }
        let db = Database::open(&path, Mode::Searcher);
        assert_eq!(db.search("needle"), vec!["http://example.com/a".to_string()]);
    }

    #[test]
    fn missing_store_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("absent.db"), Mode::Searcher);
        assert!(!db.seen("http://example.com/a"));
        db.insert("http://example.com/a", "content");
        assert!(db.search("content").is_empty());
    }
}
