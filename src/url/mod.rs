//! URL handling module for Folio-Harvest
//!
//! This module provides URL normalization, origin extraction, host pattern
//! matching, and the admission rules applied to every discovered link.

mod normalize;
mod origin;

use crate::config::LinkConfig;
use url::Url;

// Re-export main functions
pub use normalize::{normalize_parsed, normalize_url};
pub use origin::{extract_origin, matches_host};

/// Outcome of checking a discovered link against the admission rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkVerdict {
    /// The link may be queued; carries the normalized URL
    Admit(Url),
    /// The link could not be resolved or is not http(s)
    Unsupported,
    /// The link's host is not on the allow-list
    ForeignOrigin,
    /// The link's path starts with a disallowed prefix
    DisallowedPath,
    /// The link points at an account, search or subscription page
    SkipPattern,
}

/// Admission rules for discovered links
///
/// Checks run in the order: resolution, origin allow-list, disallowed path
/// prefixes, skip patterns.
#[derive(Debug, Clone)]
pub struct LinkRules {
    allowed_origins: Vec<String>,
    disallowed_paths: Vec<String>,
    skip_patterns: Vec<String>,
}

impl LinkRules {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            disallowed_paths: config
                .disallowed_paths
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            skip_patterns: config
                .skip_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Checks a raw link, resolving it against `base` when it is relative
    pub fn check(&self, raw: &str, base: Option<&Url>) -> LinkVerdict {
        let resolved = match base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        };

        let url = match resolved.ok().and_then(|u| normalize_parsed(u).ok()) {
            Some(url) => url,
            None => return LinkVerdict::Unsupported,
        };

        let origin = match extract_origin(&url) {
            Some(origin) => origin,
            None => return LinkVerdict::Unsupported,
        };

        if !self.is_allowed_origin(&origin) {
            return LinkVerdict::ForeignOrigin;
        }

        let path = url.path().to_lowercase();
        if self
            .disallowed_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || format!("{}/", path) == *prefix)
        {
            return LinkVerdict::DisallowedPath;
        }

        let lowered = url.as_str().to_lowercase();
        if self
            .skip_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
        {
            return LinkVerdict::SkipPattern;
        }

        LinkVerdict::Admit(url)
    }

    /// Returns true if the origin matches an allow-list pattern
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|pattern| matches_host(pattern, origin))
    }
}
