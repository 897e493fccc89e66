//! Output module for run reports and database statistics
//!
//! This module handles:
//! - The end-of-run report (counters, derived rates, recent errors)
//! - Article statistics for the `--stats` mode

mod report;
pub mod stats;

pub use report::{RunReport, RECENT_ERRORS};
pub use stats::{format_statistics, load_statistics, print_statistics};
