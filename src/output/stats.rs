//! Statistics from the article database
//!
//! This module provides functionality for extracting and displaying
//! article statistics from the storage layer.

use crate::storage::{ArticleStatistics, ArticleStore, StorageResult};
use std::fmt::Write as _;

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(ArticleStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn ArticleStore) -> StorageResult<ArticleStatistics> {
    store.statistics()
}

/// Formats statistics for display
pub fn format_statistics(stats: &ArticleStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Article Statistics ===\n");

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Total articles: {}", stats.total_articles);
    let _ = writeln!(out, "  Average quality score: {:.1}", stats.average_quality);
    let _ = writeln!(out, "  Distinct medical terms: {}", stats.distinct_terms);
    let _ = writeln!(out, "  Media references: {}", stats.media_count);
    if let Some(updated) = &stats.last_updated {
        let _ = writeln!(out, "  Last updated: {}", updated);
    }

    for (title, groups) in [
        ("Articles by Language", &stats.by_language),
        ("Articles by Version", &stats.by_version),
    ] {
        if groups.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}:", title);

        // Sort by count (descending)
        let mut counts: Vec<_> = groups.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (key, count) in counts {
            let percentage = if stats.total_articles > 0 {
                (*count as f64 / stats.total_articles as f64) * 100.0
            } else {
                0.0
            };
            let _ = writeln!(out, "  {}: {} ({:.1}%)", key, count, percentage);
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ArticleStatistics) {
    print!("{}", format_statistics(stats));
}
