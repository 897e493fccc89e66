//! Storage traits and error types
//!
//! This module defines the trait interface the engine writes articles
//! through, and the errors a backend can report.

use crate::storage::{ArticleStatistics, CandidateRecord, UpsertOutcome};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Another writer panicked while holding the store
    #[error("Store lock poisoned: {0}")]
    Lock(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence sink for ingested articles
///
/// Records are keyed by URL. Implementations must make `upsert_article`
/// idempotent: writing an identical record twice leaves the store unchanged.
pub trait ArticleStore: Send {
    /// Returns the stored content fingerprint for `url`, if the article exists
    fn find_by_url(&self, url: &str) -> StorageResult<Option<String>>;

    /// Inserts or fully updates the article for `record.url`
    ///
    /// # Returns
    ///
    /// Whether the write created a new row
    fn upsert_article(&mut self, record: &CandidateRecord) -> StorageResult<UpsertOutcome>;

    /// Metadata-only update for an article whose content did not change
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The article existed and was touched
    /// * `Ok(false)` - No article is stored under `url`
    fn touch_article(
        &mut self,
        url: &str,
        seen_at: DateTime<Utc>,
        quality_score: u8,
    ) -> StorageResult<bool>;

    /// Number of stored articles
    fn article_count(&self) -> StorageResult<u64>;

    /// Aggregate statistics over the stored articles
    fn statistics(&self) -> StorageResult<ArticleStatistics>;
}
