//! End-of-run report
//!
//! Summarizes the run state's counters with derived rates and the most recent
//! errors. The report is logged and written as a timestamped text file.

use crate::crawler::StopReason;
use crate::state::{counters, ErrorLogEntry, RunState};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Number of error-log entries shown in the report
pub const RECENT_ERRORS: usize = 10;

/// Counters in report order, with their labels
const COUNTER_LABELS: [(&str, &str); 9] = [
    (counters::URLS_PROCESSED, "URLs processed"),
    (counters::SUCCESSFUL_DOWNLOADS, "Successful downloads"),
    (counters::NEW_ARTICLES_CREATED, "New articles created"),
    (counters::EXISTING_ARTICLES_UPDATED, "Existing articles updated"),
    (counters::LANDING_PAGES_SKIPPED, "Landing pages skipped"),
    (counters::QUALITY_REJECTED, "Quality rejected"),
    (counters::FAILED_DOWNLOADS, "Failed downloads"),
    (counters::PARSE_ERRORS, "Parse errors"),
    (counters::STORAGE_ERRORS, "Storage errors"),
];

/// Summary of a finished (or stopped) run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    /// Processing time across resumed runs
    pub processing_time_secs: f64,
    pub counters: Vec<(&'static str, u64)>,
    /// Failed downloads per processed URL, in percent
    pub error_rate: f64,
    /// Successful downloads per processed URL, in percent
    pub success_rate: f64,
    pub avg_secs_per_page: f64,
    pub recent_errors: Vec<ErrorLogEntry>,
}

impl RunReport {
    pub fn from_state(state: &RunState, stop_reason: StopReason) -> Self {
        let processed = state.counter(counters::URLS_PROCESSED);
        let denominator = processed.max(1) as f64;
        let processing_time_secs = state.processing_time_secs();

        Self {
            generated_at: Utc::now(),
            stop_reason,
            processing_time_secs,
            counters: COUNTER_LABELS
                .iter()
                .map(|(name, _)| (*name, state.counter(name)))
                .collect(),
            error_rate: state.counter(counters::FAILED_DOWNLOADS) as f64 / denominator * 100.0,
            success_rate: state.counter(counters::SUCCESSFUL_DOWNLOADS) as f64 / denominator
                * 100.0,
            avg_secs_per_page: processing_time_secs / denominator,
            recent_errors: state
                .recent_errors(RECENT_ERRORS)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Renders the report as plain text
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== Crawl Report ===");
        let _ = writeln!(out, "Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "Stopped: {}", self.stop_reason);
        let _ = writeln!(out, "Processing time: {:.2} s", self.processing_time_secs);
        let _ = writeln!(out);

        let _ = writeln!(out, "Totals:");
        for (name, label) in COUNTER_LABELS {
            let _ = writeln!(out, "  {}: {}", label, self.counter(name));
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Performance:");
        let _ = writeln!(out, "  Average time: {:.2} s/page", self.avg_secs_per_page);
        let _ = writeln!(out, "  Error rate: {:.2}%", self.error_rate);
        let _ = writeln!(out, "  Success rate: {:.2}%", self.success_rate);

        if !self.recent_errors.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Recent errors:");
            for entry in &self.recent_errors {
                let _ = writeln!(out, "  - {}: {}", entry.url, entry.error);
            }
        }

        out
    }

    pub fn log(&self) {
        tracing::info!("\n{}", self.render());
    }

    /// Writes `crawl_report_{YYYYmmdd_HHMMSS}.txt` into `dir`, creating it if needed
    pub fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "crawl_report_{}.txt",
            self.generated_at.format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, self.render())?;
        Ok(path)
    }
}
