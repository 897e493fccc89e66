//! Durable, resumable record of crawl progress
//!
//! The checkpoint is a JSON document written with a temp-file-then-rename
//! sequence, so a crash mid-write leaves the previous checkpoint intact.

use crate::crawler::FrontierEntry;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;

/// Counter names as they appear in the checkpoint file
pub mod counters {
    pub const URLS_PROCESSED: &str = "urlsProcessed";
    pub const SUCCESSFUL_DOWNLOADS: &str = "successfulDownloads";
    pub const LANDING_PAGES_SKIPPED: &str = "landingPagesSkipped";
    pub const FAILED_DOWNLOADS: &str = "failedDownloads";
    pub const PARSE_ERRORS: &str = "parseErrors";
    pub const QUALITY_REJECTED: &str = "qualityRejected";
    pub const STORAGE_ERRORS: &str = "storageErrors";
    pub const NEW_ARTICLES_CREATED: &str = "newArticlesCreated";
    pub const EXISTING_ARTICLES_UPDATED: &str = "existingArticlesUpdated";

    /// Every counter the run state knows about
    pub const ALL: [&str; 9] = [
        URLS_PROCESSED,
        SUCCESSFUL_DOWNLOADS,
        LANDING_PAGES_SKIPPED,
        FAILED_DOWNLOADS,
        PARSE_ERRORS,
        QUALITY_REJECTED,
        STORAGE_ERRORS,
        NEW_ARTICLES_CREATED,
        EXISTING_ARTICLES_UPDATED,
    ];

    /// Counters that each terminal entry increments exactly one of
    pub const TERMINAL: [&str; 6] = [
        SUCCESSFUL_DOWNLOADS,
        LANDING_PAGES_SKIPPED,
        FAILED_DOWNLOADS,
        PARSE_ERRORS,
        QUALITY_REJECTED,
        STORAGE_ERRORS,
    ];
}

/// A failed URL with its error and the time it failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// On-disk layout of the checkpoint
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Checkpoint {
    last_saved: Option<DateTime<Utc>>,
    urls_processed: u64,
    successful_downloads: u64,
    landing_pages_skipped: u64,
    failed_downloads: u64,
    parse_errors: u64,
    new_articles_created: u64,
    existing_articles_updated: u64,
    quality_rejected: u64,
    storage_errors: u64,
    processed_urls: Vec<String>,
    failed_urls: Vec<String>,
    error_log: Vec<ErrorLogEntry>,
    processing_time_seconds: f64,
    pending_urls: Vec<FrontierEntry>,
}

/// Progress of the current crawl job
///
/// Owned by the coordinator; workers never touch it directly.
#[derive(Debug)]
pub struct RunState {
    counters: BTreeMap<&'static str, u64>,
    processed_urls: HashSet<String>,
    failed_urls: HashSet<String>,
    error_log: VecDeque<ErrorLogEntry>,
    error_log_limit: usize,
    last_saved: Option<DateTime<Utc>>,
    prior_processing_secs: f64,
    started: Instant,
    pending: Vec<FrontierEntry>,
}

impl RunState {
    /// Creates a zeroed run state
    pub fn new(error_log_limit: usize) -> Self {
        Self {
            counters: counters::ALL.iter().map(|name| (*name, 0)).collect(),
            processed_urls: HashSet::new(),
            failed_urls: HashSet::new(),
            error_log: VecDeque::new(),
            error_log_limit,
            last_saved: None,
            prior_processing_secs: 0.0,
            started: Instant::now(),
            pending: Vec::new(),
        }
    }

    /// Loads the last checkpoint
    ///
    /// A missing file yields a zeroed state. An unreadable or corrupt file is
    /// logged and also yields a zeroed state; loading never fails the run.
    pub fn load(path: &Path, error_log_limit: usize) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No checkpoint at {}, starting fresh", path.display());
                return Self::new(error_log_limit);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read checkpoint {}: {}; starting fresh",
                    path.display(),
                    e
                );
                return Self::new(error_log_limit);
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => Self::from_checkpoint(checkpoint, error_log_limit),
            Err(e) => {
                tracing::warn!(
                    "Checkpoint {} is corrupt ({}); starting fresh",
                    path.display(),
                    e
                );
                Self::new(error_log_limit)
            }
        }
    }

    /// Deletes any checkpoint at `path`
    pub fn reset(path: &Path) -> Result<(), HarvestError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Discarded previous checkpoint {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Verifies that the checkpoint directory exists (creating it) and is writable
    ///
    /// Failure here is fatal: a run that can never checkpoint is not resumable.
    pub fn ensure_store(path: &Path) -> Result<(), HarvestError> {
        let dir = checkpoint_dir(path);
        let unavailable = |source: std::io::Error| HarvestError::CheckpointStore {
            path: dir.display().to_string(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(unavailable)?;
        NamedTempFile::new_in(dir).map_err(unavailable)?;
        Ok(())
    }

    fn from_checkpoint(checkpoint: Checkpoint, error_log_limit: usize) -> Self {
        let mut state = Self::new(error_log_limit);

        state.processed_urls = unique_set("processedUrls", checkpoint.processed_urls);
        state.failed_urls = unique_set("failedUrls", checkpoint.failed_urls);

        for (name, value) in [
            (counters::SUCCESSFUL_DOWNLOADS, checkpoint.successful_downloads),
            (counters::LANDING_PAGES_SKIPPED, checkpoint.landing_pages_skipped),
            (counters::FAILED_DOWNLOADS, checkpoint.failed_downloads),
            (counters::PARSE_ERRORS, checkpoint.parse_errors),
            (counters::QUALITY_REJECTED, checkpoint.quality_rejected),
            (counters::STORAGE_ERRORS, checkpoint.storage_errors),
            (counters::NEW_ARTICLES_CREATED, checkpoint.new_articles_created),
            (counters::EXISTING_ARTICLES_UPDATED, checkpoint.existing_articles_updated),
        ] {
            state.counters.insert(name, value);
        }

        let processed = state.processed_urls.len() as u64;
        if checkpoint.urls_processed != processed {
            tracing::warn!(
                "Checkpoint urlsProcessed={} disagrees with {} processed URLs; using the set size",
                checkpoint.urls_processed,
                processed
            );
        }
        state.counters.insert(counters::URLS_PROCESSED, processed);

        let skip = checkpoint.error_log.len().saturating_sub(error_log_limit);
        state.error_log = checkpoint.error_log.into_iter().skip(skip).collect();
        state.last_saved = checkpoint.last_saved;
        state.prior_processing_secs = checkpoint.processing_time_seconds.max(0.0);
        state.pending = checkpoint.pending_urls;

        tracing::info!(
            "Resumed checkpoint: {} processed, {} failed, {} pending",
            state.processed_urls.len(),
            state.failed_urls.len(),
            state.pending.len()
        );

        state
    }

    /// Writes a snapshot of the state plus the pending frontier entries
    ///
    /// The snapshot is written to a temporary file in the same directory and
    /// renamed over the previous checkpoint.
    pub fn save(&mut self, path: &Path, pending: &[FrontierEntry]) -> Result<(), HarvestError> {
        let now = Utc::now();
        let checkpoint = self.snapshot(now, pending);
        let json = serde_json::to_string_pretty(&checkpoint)?;

        let dir = checkpoint_dir(path);
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(path).map_err(|e| HarvestError::Io(e.error))?;

        self.last_saved = Some(now);
        tracing::debug!(
            "Checkpoint written to {} ({} processed, {} pending)",
            path.display(),
            self.processed_urls.len(),
            pending.len()
        );

        Ok(())
    }

    fn snapshot(&self, now: DateTime<Utc>, pending: &[FrontierEntry]) -> Checkpoint {
        Checkpoint {
            last_saved: Some(now),
            urls_processed: self.counter(counters::URLS_PROCESSED),
            successful_downloads: self.counter(counters::SUCCESSFUL_DOWNLOADS),
            landing_pages_skipped: self.counter(counters::LANDING_PAGES_SKIPPED),
            failed_downloads: self.counter(counters::FAILED_DOWNLOADS),
            parse_errors: self.counter(counters::PARSE_ERRORS),
            new_articles_created: self.counter(counters::NEW_ARTICLES_CREATED),
            existing_articles_updated: self.counter(counters::EXISTING_ARTICLES_UPDATED),
            quality_rejected: self.counter(counters::QUALITY_REJECTED),
            storage_errors: self.counter(counters::STORAGE_ERRORS),
            processed_urls: self.processed_urls.iter().cloned().collect(),
            failed_urls: self.failed_urls.iter().cloned().collect(),
            error_log: self.error_log.iter().cloned().collect(),
            processing_time_seconds: self.processing_time_secs(),
            pending_urls: pending.to_vec(),
        }
    }

    /// Adds deltas to named counters
    ///
    /// Unknown names are ignored. `urlsProcessed` is derived from the processed
    /// set and cannot be changed this way.
    pub fn update_stats(&mut self, delta: &[(&str, u64)]) {
        for (name, amount) in delta {
            if *name == counters::URLS_PROCESSED {
                tracing::debug!("Ignoring delta for derived counter {}", name);
                continue;
            }
            match self.counters.get_mut(*name) {
                Some(value) => *value += amount,
                None => tracing::debug!("Ignoring unknown counter {}", name),
            }
        }
    }

    /// Marks a URL as processed and refreshes the processed counter
    pub fn add_processed_url(&mut self, url: &str) {
        self.processed_urls.insert(url.to_string());
        self.counters
            .insert(counters::URLS_PROCESSED, self.processed_urls.len() as u64);
    }

    /// Marks a URL as failed and appends an error-log entry
    pub fn add_failed_url(&mut self, url: &str, error: &str) {
        self.failed_urls.insert(url.to_string());
        self.error_log.push_back(ErrorLogEntry {
            url: url.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        while self.error_log.len() > self.error_log_limit {
            self.error_log.pop_front();
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &BTreeMap<&'static str, u64> {
        &self.counters
    }

    /// Sum of the terminal counter categories
    pub fn terminal_total(&self) -> u64 {
        counters::TERMINAL.iter().map(|name| self.counter(name)).sum()
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed_urls.contains(url)
    }

    pub fn processed_urls(&self) -> &HashSet<String> {
        &self.processed_urls
    }

    pub fn failed_urls(&self) -> &HashSet<String> {
        &self.failed_urls
    }

    /// Error-log entries, oldest first
    pub fn error_log(&self) -> impl Iterator<Item = &ErrorLogEntry> {
        self.error_log.iter()
    }

    /// The `n` most recent error-log entries, oldest first
    pub fn recent_errors(&self, n: usize) -> Vec<&ErrorLogEntry> {
        let skip = self.error_log.len().saturating_sub(n);
        self.error_log.iter().skip(skip).collect()
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Processing time of earlier runs plus the time since this state was loaded
    pub fn processing_time_secs(&self) -> f64 {
        self.prior_processing_secs + self.started.elapsed().as_secs_f64()
    }

    /// Takes the frontier entries that were pending when the checkpoint was written
    pub fn take_pending(&mut self) -> Vec<FrontierEntry> {
        std::mem::take(&mut self.pending)
    }
}

fn checkpoint_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Rebuilds a set from its on-disk array, reporting duplicate keys
fn unique_set(field: &str, items: Vec<String>) -> HashSet<String> {
    let total = items.len();
    let set: HashSet<String> = items.into_iter().collect();
    if set.len() != total {
        tracing::warn!(
            "Checkpoint field {} held {} duplicate entries; keeping unique URLs",
            field,
            total - set.len()
        );
    }
    set
}
