//! Configuration module for Folio-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The engine never reads global settings: a [`Config`] value is built here (from a
//! file or from the built-in defaults) and handed to the coordinator.
//!
//! # Example
//!
//! ```no_run
//! use folio_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Checkpoint every {} pages", config.crawler.checkpoint_interval);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, EntryPoint, LandingConfig, LinkConfig, OriginPolicy, OutputConfig,
    QualityConfig, QualityMode, RetryConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
