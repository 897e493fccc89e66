//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunState`: durable counters, processed/failed URL sets and error log, checkpointed to JSON
//! - `EntryState`: lifecycle of a single frontier entry and the counter its terminal state feeds
//! - `OriginState`: per-host in-flight count and politeness delay used for admission

mod entry_state;
mod origin_state;
mod run_state;

// Re-export main types
pub use entry_state::EntryState;
pub use origin_state::OriginState;
pub use run_state::{counters, ErrorLogEntry, RunState};
