//! Ingestion: turning accepted pages into stored articles
//!
//! # Components
//!
//! - `ChangeDetector`: SHA-256 fingerprints compared against the stored one for the same URL
//! - `QualityGate`: weighted score plus the strict/permissive admission policy
//! - `extract_keywords`: frequency-ranked keywords stored with each article
//! - `Ingestor`: the single place where a page is scored, compared and written

mod fingerprint;
mod keywords;
mod quality;

pub use fingerprint::{content_fingerprint, Change, ChangeDetector};
pub use keywords::{extract_keywords, MAX_KEYWORDS};
pub use quality::QualityGate;

use crate::config::QualityConfig;
use crate::crawler::ParsedPage;
use crate::storage::{CandidateRecord, SharedStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};

/// What happened to an admitted page in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    /// Fingerprint matched; only metadata was touched
    Unchanged,
}

/// Result of ingesting one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestDecision {
    Stored(IngestOutcome, u8),
    /// Quality score below the strict threshold; nothing was written
    Rejected(u8),
}

/// Scores, deduplicates and stores parsed pages
#[derive(Clone)]
pub struct Ingestor {
    store: SharedStore,
    quality: QualityGate,
    detector: ChangeDetector,
}

impl Ingestor {
    pub fn new(store: SharedStore, config: &QualityConfig) -> Self {
        Self {
            store,
            quality: QualityGate::new(config),
            detector: ChangeDetector,
        }
    }

    /// Builds the candidate record for `page` fetched from `url`
    pub fn candidate(&self, page: &ParsedPage, url: &str, fetched_at: DateTime<Utc>) -> CandidateRecord {
        let meta = &page.metadata;
        let mut record = CandidateRecord {
            url: url.to_string(),
            title: page.title.clone(),
            content: page.text.clone(),
            content_hash: content_fingerprint(&page.text),
            quality_score: 0,
            word_count: page.word_count,
            language: meta.language.clone(),
            version: meta.version.clone(),
            category: meta.category.clone(),
            author: meta.author.clone(),
            reviewed_at: meta.reviewed_at.clone(),
            description: meta.description.clone(),
            terms: page.terms.clone(),
            keywords: Vec::new(),
            media: page.media.clone(),
            fetched_at,
        };
        record.quality_score = self.quality.score(&record);
        record
    }

    /// Scores `page`, compares it with the stored article and writes it
    ///
    /// Strict-mode rejections return before the store is consulted. An
    /// unchanged fingerprint only touches the stored row, skipping keyword
    /// extraction.
    pub fn ingest(
        &self,
        page: &ParsedPage,
        url: &str,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<IngestDecision> {
        let mut record = self.candidate(page, url, fetched_at);
        let score = record.quality_score;

        if !self.quality.admits(score) {
            tracing::debug!(
                "Rejecting {} with quality score {} (minimum {})",
                url,
                score,
                self.quality.min_score()
            );
            return Ok(IngestDecision::Rejected(score));
        }

        let mut store = self
            .store
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let stored = store.find_by_url(url)?;
        let outcome = match self.detector.detect(stored.as_deref(), &record.content_hash) {
            Change::Unchanged => {
                store.touch_article(url, fetched_at, score)?;
                IngestOutcome::Unchanged
            }
            Change::New | Change::Changed => {
                record.keywords = extract_keywords(&record.content, &record.language);
                if record.keywords.is_empty() {
                    record.keywords = page.metadata.keywords.clone();
                }

                if store.upsert_article(&record)?.was_insert {
                    IngestOutcome::Inserted
                } else {
                    IngestOutcome::Updated
                }
            }
        };

        tracing::debug!("Stored {} as {:?} (score {})", url, outcome, score);
        Ok(IngestDecision::Stored(outcome, score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityMode;
    use crate::crawler::{ExtractedTerm, Extraction, PageMetadata};
    use crate::storage::{shared, SqliteStore};

    fn page(text: &str) -> ParsedPage {
        ParsedPage {
            title: "Hypertension overview".to_string(),
            text: text.to_string(),
            word_count: text.split_whitespace().count(),
            metadata: PageMetadata {
                language: "en".to_string(),
                version: "home".to_string(),
                category: Some("heart".to_string()),
                ..PageMetadata::default()
            },
            terms: vec![ExtractedTerm {
                term: "hypertension".to_string(),
                frequency: 2,
            }],
            links: Vec::new(),
            media: Vec::new(),
            extraction: Extraction::Primary {
                selector: "main".to_string(),
            },
        }
    }

    fn article_text() -> String {
        "Hypertension means blood pressure stays high. ".repeat(10)
    }

    fn ingestor(config: &QualityConfig) -> (Ingestor, SharedStore) {
        let store = shared(SqliteStore::open_in_memory().unwrap());
        (Ingestor::new(store.clone(), config), store)
    }

    #[test]
    fn test_insert_then_unchanged_then_updated() {
        let (ingestor, store) = ingestor(&QualityConfig::default());
        let url = "https://a.test/hypertension";
        let now = Utc::now();

        let first = ingestor.ingest(&page(&article_text()), url, now).unwrap();
        assert!(matches!(first, IngestDecision::Stored(IngestOutcome::Inserted, _)));
        let fingerprint = store.lock().unwrap().find_by_url(url).unwrap();

        let second = ingestor.ingest(&page(&article_text()), url, now).unwrap();
        assert!(matches!(second, IngestDecision::Stored(IngestOutcome::Unchanged, _)));
        assert_eq!(store.lock().unwrap().find_by_url(url).unwrap(), fingerprint);

        let edited = format!("{} Revised.", article_text());
        let third = ingestor.ingest(&page(&edited), url, now).unwrap();
        assert!(matches!(third, IngestDecision::Stored(IngestOutcome::Updated, _)));
        assert_ne!(store.lock().unwrap().find_by_url(url).unwrap(), fingerprint);
        assert_eq!(store.lock().unwrap().article_count().unwrap(), 1);
    }

    #[test]
    fn test_strict_rejection_writes_nothing() {
        let (ingestor, store) = ingestor(&QualityConfig {
            min_score: 90,
            ..QualityConfig::default()
        });
        let mut thin = page("too short");
        thin.terms.clear();

        let decision = ingestor.ingest(&thin, "https://a.test/thin", Utc::now()).unwrap();
        assert!(matches!(decision, IngestDecision::Rejected(score) if score < 90));
        assert_eq!(store.lock().unwrap().article_count().unwrap(), 0);
    }

    #[test]
    fn test_permissive_mode_stores_low_scores() {
        let (ingestor, store) = ingestor(&QualityConfig {
            mode: QualityMode::Permissive,
            min_score: 90,
            ..QualityConfig::default()
        });

        let decision = ingestor
            .ingest(&page("too short"), "https://a.test/thin", Utc::now())
            .unwrap();
        assert!(matches!(decision, IngestDecision::Stored(IngestOutcome::Inserted, s) if s < 90));
        assert_eq!(store.lock().unwrap().article_count().unwrap(), 1);
    }

    #[test]
    fn test_candidate_carries_score_and_fingerprint() {
        let (ingestor, _) = ingestor(&QualityConfig::default());
        let record = ingestor.candidate(&page(&article_text()), "https://a.test/x", Utc::now());
        assert_eq!(record.quality_score, 100);
        assert_eq!(record.content_hash, content_fingerprint(&article_text()));
    }
}
