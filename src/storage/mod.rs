//! Storage module for persisting articles
//!
//! This module handles all database operations for the harvester:
//! - SQLite database initialization and schema management
//! - Idempotent article upserts keyed by URL
//! - Fingerprint lookups for change detection
//! - Aggregate statistics for the `--stats` mode

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{ArticleStore, StorageError, StorageResult};

use crate::crawler::{ExtractedTerm, MediaRef};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A store shared between the coordinator's workers
pub type SharedStore = Arc<Mutex<dyn ArticleStore>>;

/// Wraps a store for sharing between workers
pub fn shared<S: ArticleStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// An article ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// Normalized URL; the record's key
    pub url: String,
    pub title: String,
    pub content: String,
    /// SHA-256 fingerprint of the normalized content
    pub content_hash: String,
    pub quality_score: u8,
    pub word_count: usize,
    pub language: String,
    pub version: String,
    pub category: Option<String>,
    pub author: Option<String>,
    pub reviewed_at: Option<String>,
    pub description: Option<String>,
    pub terms: Vec<ExtractedTerm>,
    pub keywords: Vec<String>,
    pub media: Vec<MediaRef>,
    pub fetched_at: DateTime<Utc>,
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub was_insert: bool,
}

/// Aggregate view of the article database
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArticleStatistics {
    pub total_articles: u64,
    pub by_language: BTreeMap<String, u64>,
    pub by_version: BTreeMap<String, u64>,
    pub average_quality: f64,
    pub distinct_terms: u64,
    pub media_count: u64,
    pub last_updated: Option<String>,
}
