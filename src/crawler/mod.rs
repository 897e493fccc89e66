//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Prioritized, deduplicated frontier
//! - Per-origin politeness delays and concurrency ceilings
//! - HTTP fetching with retry and backoff
//! - HTML parsing, landing-page detection and link discovery
//! - The per-page pipeline and the coordinator that runs it on a worker pool

mod coordinator;
mod fetcher;
mod frontier;
mod gate;
mod pacer;
mod parser;
mod pipeline;
mod retry;

pub use coordinator::{Coordinator, CrawlOptions, StopReason};
pub use fetcher::{FetchClient, FetchError, FetchOutcome, HeaderSet, HttpFetchClient, RequestHeaders};
pub use frontier::{
    DiscoveryStats, Frontier, FrontierEntry, DEFAULT_PRIORITY, KEYWORD_PRIORITY, SEED_PRIORITY,
};
pub use gate::{ClassifiedPage, ContentGate, FallbackStats, Verdict};
pub use pacer::Pacer;
pub use parser::{
    DiscoveredLink, ExtractedTerm, Extraction, HtmlPageParser, MediaKind, MediaRef, PageMetadata,
    PageParser, ParseFailure, ParseOutcome, ParsedPage,
};
pub use pipeline::{Components, PageFailure, PageOutcome, PagePipeline, PageReport};
pub use retry::{RetryDecision, RetryPolicy};

use crate::config::Config;
use crate::output::RunReport;
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Resolve the entry point and open the checkpoint and article stores
/// 2. Seed the frontier from the checkpoint and the entry point
/// 3. Fetch, classify and store pages until done, limited or cancelled
/// 4. Write the final checkpoint and the run report
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `options` - Entry selection and per-run limits
/// * `cancel` - Stops dispatching new pages when cancelled
///
/// # Returns
///
/// * `Ok(RunReport)` - The crawl ran; see the report for how it ended
/// * `Err(HarvestError)` - The crawl could not start
pub async fn crawl(
    config: Config,
    options: CrawlOptions,
    cancel: CancellationToken,
) -> Result<RunReport, HarvestError> {
    let mut coordinator = Coordinator::new(config, options)?;
    Ok(coordinator.run(cancel).await)
}
