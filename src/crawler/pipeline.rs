//! Per-page processing: fetch with retries, parse, classify, ingest
//!
//! A worker runs one [`PagePipeline::process`] call per frontier entry and
//! reports back to the coordinator, which alone owns the run state.

use crate::config::Config;
use crate::crawler::fetcher::{FetchClient, FetchOutcome, RequestHeaders};
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::gate::{ContentGate, Verdict};
use crate::crawler::parser::{DiscoveredLink, PageParser, ParseOutcome};
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::ingest::{IngestDecision, IngestOutcome, Ingestor};
use crate::state::EntryState;
use crate::storage::SharedStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a page ended in a failure state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageFailure {
    /// Retryable fetch errors persisted past the attempt ceiling
    #[error("fetch failed after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// The server answered with a give-up status
    #[error("HTTP {status}")]
    TerminalHttp { status: u16 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PageFailure {
    pub fn entry_state(&self) -> EntryState {
        match self {
            Self::Transient { .. } | Self::TerminalHttp { .. } => EntryState::FetchFailedTerminal,
            Self::Parse(_) => EntryState::ParseError,
            Self::Storage(_) => EntryState::StorageFailed,
        }
    }
}

/// How processing of a page ended
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Persisted(IngestOutcome),
    LandingSkipped { reason: String },
    Rejected { score: u8 },
    Failed(PageFailure),
    /// Interrupted before reaching a terminal state; the entry goes back to the frontier
    Abandoned,
}

impl PageOutcome {
    /// Terminal lifecycle state, `None` for abandoned entries
    pub fn terminal_state(&self) -> Option<EntryState> {
        match self {
            Self::Persisted(_) => Some(EntryState::Persisted),
            Self::LandingSkipped { .. } => Some(EntryState::LandingSkip),
            Self::Rejected { .. } => Some(EntryState::Rejected),
            Self::Failed(failure) => Some(failure.entry_state()),
            Self::Abandoned => None,
        }
    }

    pub fn failure(&self) -> Option<&PageFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// What a worker hands back to the coordinator
#[derive(Debug, Clone)]
pub struct PageReport {
    pub entry: FrontierEntry,
    pub origin: String,
    pub outcome: PageOutcome,
    /// Links found on the page, including landing pages
    pub links: Vec<DiscoveredLink>,
    /// URL the page was served from, after redirects
    pub base_url: Option<Url>,
    pub attempts: u32,
}

impl PageReport {
    fn new(entry: FrontierEntry, origin: String) -> Self {
        Self {
            entry,
            origin,
            outcome: PageOutcome::Abandoned,
            links: Vec::new(),
            base_url: None,
            attempts: 0,
        }
    }

    /// Report for a worker that panicked while processing `entry`
    pub fn panicked(entry: FrontierEntry, origin: String) -> Self {
        Self {
            outcome: PageOutcome::Failed(PageFailure::Parse("worker panicked".to_string())),
            ..Self::new(entry, origin)
        }
    }
}

/// Collaborators a pipeline is built from
#[derive(Clone)]
pub struct Components {
    pub fetcher: Arc<dyn FetchClient>,
    pub parser: Arc<dyn PageParser>,
    pub store: SharedStore,
}

/// The fetch/parse/classify/ingest sequence for one page
pub struct PagePipeline {
    fetcher: Arc<dyn FetchClient>,
    parser: Arc<dyn PageParser>,
    gate: ContentGate,
    ingestor: Ingestor,
    retry: RetryPolicy,
    headers: RequestHeaders,
    timeout: Duration,
}

impl PagePipeline {
    pub fn new(config: &Config, components: Components) -> Self {
        Self {
            fetcher: components.fetcher,
            parser: components.parser,
            gate: ContentGate::new(&config.landing),
            ingestor: Ingestor::new(components.store, &config.quality),
            retry: RetryPolicy::new(&config.retry),
            headers: RequestHeaders::new(&config.user_agent),
            timeout: Duration::from_secs(config.crawler.timeout_secs),
        }
    }

    /// Processes one frontier entry to a terminal outcome
    ///
    /// Cancellation is only observed during retry backoff; a fetch already in
    /// progress is allowed to finish.
    pub async fn process(
        &self,
        entry: FrontierEntry,
        origin: String,
        cancel: &CancellationToken,
    ) -> PageReport {
        let mut report = PageReport::new(entry, origin);

        let fetched = match self.fetch(&report.entry.url, cancel, &mut report.attempts).await {
            Ok(fetched) => fetched,
            Err(outcome) => {
                report.outcome = outcome;
                return report;
            }
        };

        report.base_url = Url::parse(&fetched.final_url).ok();
        let (outcome, links) = self.evaluate(&report.entry.url, &fetched);
        report.outcome = outcome;
        report.links = links;
        report
    }

    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> Result<FetchOutcome, PageOutcome> {
        loop {
            *attempts += 1;
            let attempt = *attempts;
            transition(url, EntryState::Queued, EntryState::Fetching);

            let headers = self.headers.next();
            let err = match self.fetcher.fetch(url, &headers, self.timeout).await {
                Ok(fetched) => {
                    transition(url, EntryState::Fetching, EntryState::Fetched);
                    return Ok(fetched);
                }
                Err(err) => err,
            };

            if self.retry.decide(&err, attempt) == RetryDecision::GiveUp {
                transition(url, EntryState::Fetching, EntryState::FetchFailedTerminal);
                let failure = match err.status() {
                    Some(status) if self.retry.classify(&err) == RetryDecision::GiveUp => {
                        PageFailure::TerminalHttp { status }
                    }
                    _ => PageFailure::Transient {
                        attempts: attempt,
                        message: err.to_string(),
                    },
                };
                tracing::debug!("Giving up on {}: {}", url, failure);
                return Err(PageOutcome::Failed(failure));
            }

            transition(url, EntryState::Fetching, EntryState::FetchFailedRetryable);
            let backoff = self.retry.backoff(attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:.1}s",
                attempt,
                self.retry.max_attempts(),
                url,
                err,
                backoff.as_secs_f64()
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!("Backoff for {} interrupted", url);
                    return Err(PageOutcome::Abandoned);
                }
            }
            transition(url, EntryState::FetchFailedRetryable, EntryState::Queued);
        }
    }

    /// Parses, classifies and ingests a fetched page
    ///
    /// Kept synchronous: the parsed document is not `Send` and must not live
    /// across an await point.
    fn evaluate(&self, url: &str, fetched: &FetchOutcome) -> (PageOutcome, Vec<DiscoveredLink>) {
        transition(url, EntryState::Fetched, EntryState::Parsing);

        let parsed = match self.parser.parse(fetched) {
            Ok(parsed) => parsed,
            Err(e) => {
                transition(url, EntryState::Parsing, EntryState::ParseError);
                let links = self.parser.links(fetched);
                return (PageOutcome::Failed(PageFailure::Parse(e.to_string())), links);
            }
        };

        let links = match &parsed {
            ParseOutcome::Page(page) => page.links.clone(),
            ParseOutcome::Landing { .. } => self.parser.links(fetched),
        };

        let classified = self.gate.classify(parsed);
        let page = match (classified.verdict, classified.page) {
            (Verdict::Accepted, Some(page)) => page,
            (_, _) => {
                transition(url, EntryState::Parsing, EntryState::LandingSkip);
                tracing::debug!("Skipping landing page {}: {}", url, classified.reason);
                return (
                    PageOutcome::LandingSkipped {
                        reason: classified.reason,
                    },
                    links,
                );
            }
        };

        transition(url, EntryState::Parsing, EntryState::Parsed);
        transition(url, EntryState::Parsed, EntryState::QualityEval);

        let outcome = match self.ingestor.ingest(&page, url, Utc::now()) {
            Ok(IngestDecision::Rejected(score)) => {
                transition(url, EntryState::QualityEval, EntryState::Rejected);
                PageOutcome::Rejected { score }
            }
            Ok(IngestDecision::Stored(outcome, _)) => {
                transition(url, EntryState::QualityEval, EntryState::Accepted);
                transition(url, EntryState::Accepted, EntryState::Persisted);
                PageOutcome::Persisted(outcome)
            }
            Err(e) => {
                transition(url, EntryState::QualityEval, EntryState::Accepted);
                transition(url, EntryState::Accepted, EntryState::StorageFailed);
                tracing::warn!("Failed to store {}: {}", url, e);
                PageOutcome::Failed(PageFailure::Storage(e.to_string()))
            }
        };

        (outcome, links)
    }
}

fn transition(url: &str, from: EntryState, to: EntryState) {
    debug_assert!(from.can_transition_to(to), "{} -> {}", from, to);
    tracing::trace!("{}: {} -> {}", url, from, to);
}
