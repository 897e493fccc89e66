//! Lifecycle of a single frontier entry
//!
//! `Queued -> Fetching -> {FetchFailedRetryable -> Queued | FetchFailedTerminal}
//! -> Fetched -> Parsing -> {LandingSkip | ParseError | Parsed} -> QualityEval
//! -> {Rejected | Accepted} -> {Persisted | StorageFailed}`

use crate::state::run_state::counters;
use std::fmt;

/// Represents where a frontier entry is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    // ===== Active States =====
    Queued,
    Fetching,
    /// A fetch attempt failed but will be retried
    FetchFailedRetryable,
    Fetched,
    Parsing,
    Parsed,
    QualityEval,
    Accepted,

    // ===== Terminal States =====
    /// Retries exhausted or a give-up status was returned
    FetchFailedTerminal,
    /// Navigation/overview page, deliberately not ingested
    LandingSkip,
    ParseError,
    /// Quality score below the ingestion threshold
    Rejected,
    /// Stored (inserted, updated, or touched unchanged)
    Persisted,
    /// Accepted but the store refused the write
    StorageFailed,
}

impl EntryState {
    /// Returns true if the entry needs no further processing
    pub fn is_terminal(&self) -> bool {
        self.terminal_counter().is_some()
    }

    /// The counter a terminal state increments; `None` for active states
    pub fn terminal_counter(&self) -> Option<&'static str> {
        match self {
            Self::Persisted => Some(counters::SUCCESSFUL_DOWNLOADS),
            Self::LandingSkip => Some(counters::LANDING_PAGES_SKIPPED),
            Self::FetchFailedTerminal => Some(counters::FAILED_DOWNLOADS),
            Self::ParseError => Some(counters::PARSE_ERRORS),
            Self::Rejected => Some(counters::QUALITY_REJECTED),
            Self::StorageFailed => Some(counters::STORAGE_ERRORS),
            _ => None,
        }
    }

    /// Returns true if the URL belongs in the failed set and error log
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailedTerminal | Self::ParseError | Self::StorageFailed
        )
    }

    /// Checks whether moving from `self` to `next` follows the lifecycle
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        use EntryState::*;

        matches!(
            (self, next),
            (Queued, Fetching)
                | (Fetching, FetchFailedRetryable)
                | (Fetching, FetchFailedTerminal)
                | (Fetching, Fetched)
                | (FetchFailedRetryable, Queued)
                | (Fetched, Parsing)
                | (Parsing, LandingSkip)
                | (Parsing, ParseError)
                | (Parsing, Parsed)
                | (Parsed, QualityEval)
                | (QualityEval, Rejected)
                | (QualityEval, Accepted)
                | (Accepted, Persisted)
                | (Accepted, StorageFailed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::FetchFailedRetryable => "fetch_failed_retryable",
            Self::Fetched => "fetched",
            Self::Parsing => "parsing",
            Self::Parsed => "parsed",
            Self::QualityEval => "quality_eval",
            Self::Accepted => "accepted",
            Self::FetchFailedTerminal => "fetch_failed_terminal",
            Self::LandingSkip => "landing_skip",
            Self::ParseError => "parse_error",
            Self::Rejected => "rejected",
            Self::Persisted => "persisted",
            Self::StorageFailed => "storage_failed",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
