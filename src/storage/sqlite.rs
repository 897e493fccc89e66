//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ArticleStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ArticleStore, StorageError, StorageResult};
use crate::storage::{ArticleStatistics, CandidateRecord, UpsertOutcome};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// SQLite article store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the article database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; missing parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        tracing::debug!("Opened article database at {}", path.display());
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn grouped_counts(&self, column: &str) -> StorageResult<BTreeMap<String, u64>> {
        let sql = format!(
            "SELECT {col}, COUNT(*) FROM articles GROUP BY {col} ORDER BY {col}",
            col = column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (key, count) = row?;
            counts.insert(key, count);
        }
        Ok(counts)
    }
}

impl ArticleStore for SqliteStore {
    fn find_by_url(&self, url: &str) -> StorageResult<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT content_hash FROM articles WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn upsert_article(&mut self, record: &CandidateRecord) -> StorageResult<UpsertOutcome> {
        let keywords = serde_json::to_string(&record.keywords)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let fetched_at = record.fetched_at.to_rfc3339();

        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM articles WHERE url = ?1",
                params![record.url],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "INSERT INTO articles (
                url, title, content, content_hash, quality_score, word_count,
                language, version, category, author, reviewed_at, description,
                keywords, created_at, updated_at, last_seen_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, ?14)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                content_hash = excluded.content_hash,
                quality_score = excluded.quality_score,
                word_count = excluded.word_count,
                language = excluded.language,
                version = excluded.version,
                category = excluded.category,
                author = excluded.author,
                reviewed_at = excluded.reviewed_at,
                description = excluded.description,
                keywords = excluded.keywords,
                updated_at = excluded.updated_at,
                last_seen_at = excluded.last_seen_at",
            params![
                record.url,
                record.title,
                record.content,
                record.content_hash,
                record.quality_score as i64,
                record.word_count as i64,
                record.language,
                record.version,
                record.category,
                record.author,
                record.reviewed_at,
                record.description,
                keywords,
                fetched_at,
            ],
        )?;

        let article_id: i64 = match existing {
            Some(id) => id,
            None => tx.query_row(
                "SELECT id FROM articles WHERE url = ?1",
                params![record.url],
                |row| row.get(0),
            )?,
        };

        tx.execute(
            "DELETE FROM article_terms WHERE article_id = ?1",
            params![article_id],
        )?;
        {
            let mut insert_term = tx.prepare(
                "INSERT OR REPLACE INTO article_terms (article_id, term, frequency) VALUES (?1, ?2, ?3)",
            )?;
            for term in &record.terms {
                insert_term.execute(params![article_id, term.term, term.frequency as i64])?;
            }
        }

        tx.execute(
            "DELETE FROM article_media WHERE article_id = ?1",
            params![article_id],
        )?;
        {
            let mut insert_media = tx.prepare(
                "INSERT OR IGNORE INTO article_media (article_id, url, kind, label) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for media in &record.media {
                insert_media.execute(params![
                    article_id,
                    media.url,
                    media.kind.as_str(),
                    media.label
                ])?;
            }
        }

        tx.commit()?;

        Ok(UpsertOutcome {
            was_insert: existing.is_none(),
        })
    }

    fn touch_article(
        &mut self,
        url: &str,
        seen_at: DateTime<Utc>,
        quality_score: u8,
    ) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE articles SET last_seen_at = ?2, quality_score = ?3 WHERE url = ?1",
            params![url, seen_at.to_rfc3339(), quality_score as i64],
        )?;
        Ok(changed > 0)
    }

    fn article_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn statistics(&self) -> StorageResult<ArticleStatistics> {
        let total_articles = self.article_count()?;

        let (average_quality, last_updated): (Option<f64>, Option<String>) = self.conn.query_row(
            "SELECT AVG(quality_score), MAX(updated_at) FROM articles",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let distinct_terms: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT term) FROM article_terms",
            [],
            |row| row.get(0),
        )?;

        let media_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM article_media", [], |row| row.get(0))?;

        Ok(ArticleStatistics {
            total_articles,
            by_language: self.grouped_counts("language")?,
            by_version: self.grouped_counts("version")?,
            average_quality: average_quality.unwrap_or(0.0),
            distinct_terms: distinct_terms as u64,
            media_count: media_count as u64,
            last_updated,
        })
    }
}
