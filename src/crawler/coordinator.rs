//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Seeding the frontier from the configured entry point and the last checkpoint
//! - Dispatching frontier entries to workers under per-origin politeness limits
//! - Folding worker reports into the run state and discovering new links
//! - Periodic and final checkpoints, interruption and the end-of-run report

use crate::config::{Config, EntryPoint};
use crate::crawler::fetcher::HttpFetchClient;
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::pacer::Pacer;
use crate::crawler::parser::HtmlPageParser;
use crate::crawler::pipeline::{Components, PageOutcome, PagePipeline, PageReport};
use crate::ingest::IngestOutcome;
use crate::output::RunReport;
use crate::state::{counters, OriginState, RunState};
use crate::storage::{shared, SqliteStore};
use crate::HarvestError;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-run options that are not part of the configuration file
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub language: String,
    pub version: String,

    /// Maximum number of entries dispatched in this run
    pub max_pages: Option<u64>,

    /// Discard the previous checkpoint before starting
    pub reset_state: bool,

    /// Hash of the configuration file, logged at start
    pub config_hash: Option<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            version: "home".to_string(),
            max_pages: None,
            reset_state: false,
            config_hash: None,
        }
    }
}

/// Why the crawl loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The frontier ran dry
    Exhausted,
    /// The page ceiling was reached
    PageLimit,
    /// Cancelled from outside, typically Ctrl-C
    Interrupted,
    /// The loop itself panicked
    Aborted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "frontier exhausted",
            Self::PageLimit => "page limit reached",
            Self::Interrupted => "interrupted",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main crawler coordinator structure
///
/// The coordinator is the only owner of the frontier and the run state.
/// Workers receive a frontier entry, run the page pipeline and send a
/// [`PageReport`] back over a channel.
pub struct Coordinator {
    config: Arc<Config>,
    options: CrawlOptions,
    frontier: Frontier,
    run_state: RunState,
    pacer: Pacer,
    origins: HashMap<String, OriginState>,
    pipeline: Arc<PagePipeline>,
    state_path: PathBuf,
    in_flight: HashMap<String, FrontierEntry>,
    dispatched: u64,
    completed: u64,
    started: Instant,
}

impl Coordinator {
    /// Creates a coordinator with the reqwest fetcher, HTML parser and SQLite store
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `options` - Entry selection, page ceiling and reset flag
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Unsupported entry, unusable checkpoint directory or database
    pub fn new(config: Config, options: CrawlOptions) -> Result<Self, HarvestError> {
        let entry = config.entry_for(&options.language, &options.version)?;
        let parser = HtmlPageParser::new(&entry.language, &entry.version);
        let fetcher = HttpFetchClient::new()?;
        let store = SqliteStore::open(Path::new(&config.output.database_path))?;

        let components = Components {
            fetcher: Arc::new(fetcher),
            parser: Arc::new(parser),
            store: shared(store),
        };
        Self::with_components(config, options, components)
    }

    /// Creates a coordinator with caller-supplied collaborators
    ///
    /// Seeding order: entries pending in the checkpoint first, then the
    /// entry point's seeds. Seeds already processed are skipped.
    pub fn with_components(
        config: Config,
        options: CrawlOptions,
        components: Components,
    ) -> Result<Self, HarvestError> {
        let entry: EntryPoint = config
            .entry_for(&options.language, &options.version)?
            .clone();
        let seeds = entry.seed_urls()?;

        let state_path = config.output.state_path();
        RunState::ensure_store(&state_path)?;
        if options.reset_state {
            RunState::reset(&state_path)?;
        }

        let mut run_state = RunState::load(&state_path, config.crawler.error_log_limit);
        let mut frontier = Frontier::new(&config.links);

        let mut resumed = 0;
        for pending in run_state.take_pending() {
            if frontier.push(pending, &run_state) {
                resumed += 1;
            }
        }

        let mut seeded = 0;
        for seed in &seeds {
            if frontier.push(FrontierEntry::seed(seed.as_str()), &run_state) {
                seeded += 1;
            }
        }

        if let Some(hash) = &options.config_hash {
            tracing::info!("Configuration hash: {}", hash);
        }
        tracing::info!(
            "Harvesting {} / {}: {} resumed entries, {} new seeds, {} already processed",
            entry.language,
            entry.version,
            resumed,
            seeded,
            run_state.processed_urls().len()
        );

        let pipeline = PagePipeline::new(&config, components);

        Ok(Self {
            pacer: Pacer::new(&config),
            config: Arc::new(config),
            options,
            frontier,
            run_state,
            origins: HashMap::new(),
            pipeline: Arc::new(pipeline),
            state_path,
            in_flight: HashMap::new(),
            dispatched: 0,
            completed: 0,
            started: Instant::now(),
        })
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Number of entries handed to workers in this run
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Runs the crawl until the frontier is exhausted, the page ceiling is
    /// reached or `cancel` fires
    ///
    /// Whatever stops the loop, including a panic inside it, the final
    /// checkpoint is written and the report is produced.
    pub async fn run(&mut self, cancel: CancellationToken) -> RunReport {
        tracing::info!(
            "Starting crawl with {} workers, {} entries queued",
            self.config.crawler.max_workers,
            self.frontier.len()
        );

        let stop = match AssertUnwindSafe(self.drive(&cancel)).catch_unwind().await {
            Ok(stop) => stop,
            Err(_) => {
                tracing::error!("Crawl loop panicked; saving progress");
                StopReason::Aborted
            }
        };

        self.checkpoint();

        let report = RunReport::from_state(&self.run_state, stop);
        report.log();
        match report.write(&self.config.output.report_path()) {
            Ok(path) => tracing::info!("Report written to {}", path.display()),
            Err(e) => tracing::warn!("Failed to write report: {}", e),
        }

        report
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> StopReason {
        let (tx, mut rx) = mpsc::channel::<PageReport>(self.config.crawler.max_workers.max(1));
        let mut stop: Option<StopReason> = None;

        loop {
            let mut dispatched_at = Instant::now();
            if stop.is_none() {
                if cancel.is_cancelled() {
                    stop = Some(StopReason::Interrupted);
                } else {
                    dispatched_at = self.dispatch(&tx, cancel);
                    if self.page_limit_reached() {
                        stop = Some(StopReason::PageLimit);
                    } else if self.frontier.is_empty() && self.in_flight.is_empty() {
                        stop = Some(StopReason::Exhausted);
                    }
                }
            }

            if stop.is_some() && self.in_flight.is_empty() {
                break;
            }

            let wake = if stop.is_none() {
                self.next_wake(dispatched_at)
            } else {
                None
            };

            tokio::select! {
                Some(report) = rx.recv(), if !self.in_flight.is_empty() => {
                    self.handle_report(report);
                }
                _ = tokio::time::sleep(wake.unwrap_or_default()), if wake.is_some() => {}
                _ = cancel.cancelled(), if stop.is_none() => {
                    tracing::info!(
                        "Interrupt received; waiting for {} in-flight pages",
                        self.in_flight.len()
                    );
                    stop = Some(StopReason::Interrupted);
                }
                else => break,
            }
        }

        let stop = stop.unwrap_or(StopReason::Exhausted);
        tracing::info!(
            "Crawl loop stopped ({}): {} dispatched, {} left in frontier",
            stop,
            self.dispatched,
            self.frontier.len()
        );
        stop
    }

    fn page_limit_reached(&self) -> bool {
        self.options
            .max_pages
            .is_some_and(|max| self.dispatched >= max)
    }

    /// Hands admissible frontier entries to new workers
    ///
    /// Returns the instant every politeness check in this round was made
    /// against.
    fn dispatch(&mut self, tx: &mpsc::Sender<PageReport>, cancel: &CancellationToken) -> Instant {
        let now = Instant::now();
        while self.in_flight.len() < self.config.crawler.max_workers && !self.page_limit_reached()
        {
            let origins = &self.origins;
            let pacer = &self.pacer;
            let next = self.frontier.pop_where(|origin| {
                origins
                    .get(origin)
                    .map(|state| state.can_dispatch(pacer.max_concurrency(origin), now))
                    .unwrap_or(true)
            });
            let Some((entry, origin)) = next else { break };

            let delay = self.pacer.delay_for_origin(&origin);
            self.origins
                .entry(origin.clone())
                .or_default()
                .record_dispatch(now, delay);
            self.dispatched += 1;
            self.in_flight.insert(entry.url.clone(), entry.clone());

            tracing::debug!(
                "Dispatching {} (priority {}, next {} request in {:.1}s)",
                entry.url,
                entry.priority,
                origin,
                delay.as_secs_f64()
            );

            let pipeline = Arc::clone(&self.pipeline);
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let fallback = (entry.clone(), origin.clone());
                let report = match AssertUnwindSafe(pipeline.process(entry, origin, &cancel))
                    .catch_unwind()
                    .await
                {
                    Ok(report) => report,
                    Err(_) => {
                        tracing::error!("Worker for {} panicked", fallback.0.url);
                        PageReport::panicked(fallback.0, fallback.1)
                    }
                };
                if tx.send(report).await.is_err() {
                    tracing::debug!("Coordinator gone; dropping worker report");
                }
            });
        }
        now
    }

    /// How long the loop may sleep before dispatching again
    ///
    /// `now` must be the instant the last dispatch round checked against, so
    /// an origin that was blocked there still has a deadline here. With
    /// nothing in flight and work queued there is always a timer to wake on.
    fn next_wake(&self, now: Instant) -> Option<Duration> {
        if self.frontier.is_empty() {
            return None;
        }
        let gated = self
            .origins
            .values()
            .filter_map(|state| state.time_until_ready(now))
            .min();
        match gated {
            None if self.in_flight.is_empty() => Some(Duration::ZERO),
            gated => gated,
        }
    }

    /// Folds a worker report into the run state
    fn handle_report(&mut self, report: PageReport) {
        self.in_flight.remove(&report.entry.url);
        if let Some(state) = self.origins.get_mut(&report.origin) {
            state.record_completion();
        }

        if let Some(base) = &report.base_url {
            let stats = self.frontier.discover(&report.links, base, &self.run_state);
            tracing::debug!(
                "{}: {} links admitted, {} duplicates, {} rejected",
                report.entry.url,
                stats.admitted,
                stats.duplicates,
                stats.rejected
            );
        }

        let Some(state) = report.outcome.terminal_state() else {
            tracing::debug!("Requeueing interrupted entry {}", report.entry.url);
            self.frontier.requeue(report.entry, report.origin);
            return;
        };

        let url = report.entry.url.as_str();
        let mut delta: Vec<(&str, u64)> = Vec::with_capacity(2);
        if let Some(counter) = state.terminal_counter() {
            delta.push((counter, 1));
        }

        match &report.outcome {
            PageOutcome::Persisted(IngestOutcome::Inserted) => {
                delta.push((counters::NEW_ARTICLES_CREATED, 1));
            }
            PageOutcome::Persisted(_) => {
                delta.push((counters::EXISTING_ARTICLES_UPDATED, 1));
            }
            PageOutcome::Rejected { score } => {
                tracing::debug!("Rejected {} with quality score {}", url, score);
            }
            _ => {}
        }

        if state.is_failure() {
            let message = report
                .outcome
                .failure()
                .map(|failure| failure.to_string())
                .unwrap_or_else(|| state.to_string());
            tracing::warn!("Failed {} after {} attempts: {}", url, report.attempts, message);
            self.run_state.add_failed_url(url, &message);
        }

        self.run_state.update_stats(&delta);
        self.run_state.add_processed_url(url);
        self.completed += 1;
        tracing::debug!("{} finished as {}", url, state);

        let progress_interval = self.config.crawler.progress_interval.max(1);
        if self.completed % progress_interval == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} processed, {} in frontier, {} in flight, {:.2} pages/sec",
                self.run_state.processed_urls().len(),
                self.frontier.len(),
                self.in_flight.len(),
                self.completed as f64 / elapsed.max(f64::EPSILON)
            );
        }

        let checkpoint_interval = self.config.crawler.checkpoint_interval.max(1);
        if self.completed % checkpoint_interval == 0 {
            self.checkpoint();
        }
    }

    /// Saves the run state with the frontier and in-flight entries as pending work
    ///
    /// Write failures are logged; the crawl keeps going.
    fn checkpoint(&mut self) {
        let mut pending = self.frontier.snapshot();
        pending.extend(self.in_flight.values().cloned());

        if let Err(e) = self.run_state.save(&self.state_path, &pending) {
            tracing::warn!(
                "Failed to write checkpoint {}: {}",
                self.state_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::{FetchClient, FetchError, FetchOutcome, HeaderSet};
    use crate::storage::SharedStore;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    /// Serves fixed bodies by URL; anything else is a 404
    struct SiteClient {
        pages: Map<String, String>,
    }

    #[async_trait]
    impl FetchClient for SiteClient {
        async fn fetch(
            &self,
            url: &str,
            _headers: &HeaderSet,
            _timeout: Duration,
        ) -> Result<FetchOutcome, FetchError> {
            match self.pages.get(url) {
                Some(body) => {
                    let mut headers = Map::new();
                    headers.insert("content-type".to_string(), "text/html".to_string());
                    Ok(FetchOutcome {
                        status: 200,
                        final_url: url.to_string(),
                        body: body.clone(),
                        headers,
                    })
                }
                None => Err(FetchError::Status {
                    status: 404,
                    final_url: url.to_string(),
                }),
            }
        }
    }

    fn article(links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!("<a href=\"{}\">more</a>", href))
            .collect();
        format!(
            "<html><body><main><h1>Hypertension overview</h1><p>{}</p>{}</main></body></html>",
            "High blood pressure damages arteries over many years. ".repeat(8),
            anchors
        )
    }

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.crawler.randomize_delay = false;
        config.crawler.default_delay_secs = 0.0;
        config.origins.clear();
        config.links.allowed_origins = vec!["site.test".to_string()];
        config.output.directory = dir.display().to_string();
        config.entries = vec![EntryPoint::new("home", "en", "https://site.test/home/a")];
        config
    }

    fn build(config: Config, options: CrawlOptions) -> (Coordinator, SharedStore) {
        let mut pages = Map::new();
        pages.insert(
            "https://site.test/home/a".to_string(),
            article(&["/home/b", "/home/c"]),
        );
        pages.insert("https://site.test/home/b".to_string(), article(&["/home/a"]));
        pages.insert("https://site.test/home/c".to_string(), article(&[]));
        build_site(config, options, pages)
    }

    fn build_site(
        config: Config,
        options: CrawlOptions,
        pages: Map<String, String>,
    ) -> (Coordinator, SharedStore) {
        let store = shared(SqliteStore::open_in_memory().unwrap());
        let components = Components {
            fetcher: Arc::new(SiteClient { pages }),
            parser: Arc::new(HtmlPageParser::new("en", "home")),
            store: store.clone(),
        };
        let coordinator = Coordinator::with_components(config, options, components).unwrap();
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_crawl_until_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, store) =
            build(test_config(dir.path()), CrawlOptions::default());

        let report = coordinator.run(CancellationToken::new()).await;

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        let state = coordinator.run_state();
        assert_eq!(state.processed_urls().len(), 3);
        assert_eq!(state.counter(counters::SUCCESSFUL_DOWNLOADS), 3);
        assert_eq!(state.counter(counters::NEW_ARTICLES_CREATED), 3);
        assert_eq!(state.terminal_total(), 3);
        assert_eq!(store.lock().unwrap().article_count().unwrap(), 3);
        assert!(coordinator.frontier().is_empty());
    }

    #[tokio::test]
    async fn test_page_limit_leaves_frontier_for_resume() {
        let dir = tempfile::tempdir().unwrap();
        let options = CrawlOptions {
            max_pages: Some(1),
            ..CrawlOptions::default()
        };
        let (mut coordinator, _) = build(test_config(dir.path()), options.clone());

        let report = coordinator.run(CancellationToken::new()).await;
        assert_eq!(report.stop_reason, StopReason::PageLimit);
        assert_eq!(coordinator.dispatched(), 1);
        assert_eq!(coordinator.frontier().len(), 2);

        let (mut resumed, _) = build(test_config(dir.path()), CrawlOptions::default());
        assert_eq!(resumed.frontier().len(), 2);
        resumed.run(CancellationToken::new()).await;
        assert_eq!(resumed.run_state().processed_urls().len(), 3);
        assert_eq!(resumed.dispatched(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, _) = build(test_config(dir.path()), CrawlOptions::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = coordinator.run(cancel).await;

        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(coordinator.dispatched(), 0);
        assert!(coordinator.state_path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_entry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared(SqliteStore::open_in_memory().unwrap());
        let components = Components {
            fetcher: Arc::new(SiteClient { pages: Map::new() }),
            parser: Arc::new(HtmlPageParser::new("en", "home")),
            store,
        };
        let options = CrawlOptions {
            language: "fr".to_string(),
            ..CrawlOptions::default()
        };

        let result = Coordinator::with_components(test_config(dir.path()), options, components);
        assert!(matches!(
            result,
            Err(HarvestError::Config(crate::ConfigError::UnsupportedEntry { .. }))
        ));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_are_all_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = Map::new();
        pages.insert(
            "https://site.test/home/a".to_string(),
            article(&["/home/b", "/home/c", "/home/d", "/home/e"]),
        );
        pages.insert(
            "https://site.test/home/b".to_string(),
            "<html><body><nav><a href=\"/home/a\">browse all health topics here</a></nav>\
             <div>Topics</div></body></html>"
                .to_string(),
        );
        pages.insert(
            "https://site.test/home/c".to_string(),
            "<html><body><main><p>Too short here</p></main></body></html>".to_string(),
        );
        // /home/d is missing and answers 404
        pages.insert("https://site.test/home/e".to_string(), String::new());

        let (mut coordinator, store) =
            build_site(test_config(dir.path()), CrawlOptions::default(), pages);
        let report = coordinator.run(CancellationToken::new()).await;

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(coordinator.dispatched(), 5);

        let state = coordinator.run_state();
        assert_eq!(state.terminal_total(), coordinator.dispatched());
        assert_eq!(state.processed_urls().len(), 5);
        assert_eq!(state.counter(counters::SUCCESSFUL_DOWNLOADS), 1);
        assert_eq!(state.counter(counters::LANDING_PAGES_SKIPPED), 1);
        assert_eq!(state.counter(counters::QUALITY_REJECTED), 1);
        assert_eq!(state.counter(counters::FAILED_DOWNLOADS), 1);
        assert_eq!(state.counter(counters::PARSE_ERRORS), 1);

        assert!(state.failed_urls().contains("https://site.test/home/d"));
        assert!(state.failed_urls().contains("https://site.test/home/e"));
        assert_eq!(state.failed_urls().len(), 2);

        let errors: Vec<_> = state.error_log().collect();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| e.url == "https://site.test/home/e" && e.error.contains("parse error")));
        assert!(errors
            .iter()
            .any(|e| e.url == "https://site.test/home/d" && e.error.contains("404")));

        assert_eq!(store.lock().unwrap().article_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_keeps_crawling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.crawler.checkpoint_interval = 1;
        let (mut coordinator, _) = build(config, CrawlOptions::default());

        // A directory where the checkpoint file should go makes every save fail
        std::fs::create_dir_all(&coordinator.state_path).unwrap();

        let report = coordinator.run(CancellationToken::new()).await;

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(coordinator.run_state().processed_urls().len(), 3);
        assert_eq!(report.counter(counters::NEW_ARTICLES_CREATED), 3);
        assert!(coordinator.state_path.is_dir());
        assert!(coordinator.run_state().last_saved().is_none());
    }

    #[tokio::test]
    async fn test_expired_origin_still_wakes_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, _) = build(test_config(dir.path()), CrawlOptions::default());

        let dispatched_at = Instant::now();
        coordinator
            .origins
            .entry("site.test".to_string())
            .or_default()
            .record_dispatch(dispatched_at, Duration::from_millis(500));
        coordinator
            .origins
            .get_mut("site.test")
            .unwrap()
            .record_completion();

        // Blocked at the dispatch instant: sleep out the remaining delay
        assert_eq!(
            coordinator.next_wake(dispatched_at),
            Some(Duration::from_millis(500))
        );

        // Checked after the deadline passed: wake at once instead of never
        let later = dispatched_at + Duration::from_secs(1);
        assert_eq!(coordinator.next_wake(later), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_large_frontier_with_delay_reaches_page_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.crawler.default_delay_secs = 0.05;
        let options = CrawlOptions {
            max_pages: Some(6),
            ..CrawlOptions::default()
        };
        let (mut coordinator, _) = build(config, options);

        for i in 0..5_000 {
            let entry = FrontierEntry::seed(&format!("https://site.test/home/extra-{}", i));
            coordinator.frontier.push(entry, &coordinator.run_state);
        }

        let report = tokio::time::timeout(
            Duration::from_secs(30),
            coordinator.run(CancellationToken::new()),
        )
        .await
        .expect("crawl loop stalled");

        assert_eq!(report.stop_reason, StopReason::PageLimit);
        assert_eq!(coordinator.dispatched(), 6);
        assert_eq!(coordinator.run_state().terminal_total(), 6);
    }
}
