//! Landing-page detection
//!
//! The content gate decides whether a parsed page is article content or a
//! navigation page to discard. Pages the parser extracted from a primary
//! content region are always accepted here; the heuristic only runs on
//! generic body-text fallbacks.

use crate::config::LandingConfig;
use crate::crawler::parser::{Extraction, ParseOutcome, ParsedPage};
use std::collections::HashMap;

/// Classification of a parsed page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    LandingSkip,
    Accepted,
}

/// A page after classification
#[derive(Debug, Clone)]
pub struct ClassifiedPage {
    pub verdict: Verdict,
    pub reason: String,
    /// Parsed fields; absent when the parser flagged a landing page outright
    pub page: Option<ParsedPage>,
}

/// Numbers the fallback heuristic looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackStats {
    pub word_count: usize,
    pub nav_word_count: usize,
    /// Share of the single most common lowercase token
    pub repeated_ratio: f64,
}

impl FallbackStats {
    /// Computes the stats of a fallback text
    pub fn from_text(text: &str, nav_word_count: usize) -> Self {
        let tokens: Vec<String> = text.split_whitespace().map(|t| t.to_lowercase()).collect();
        Self {
            word_count: tokens.len(),
            nav_word_count,
            repeated_ratio: max_token_repeat_ratio(&tokens),
        }
    }

    /// Navigation words relative to the text's word count
    pub fn nav_ratio(&self) -> f64 {
        self.nav_word_count as f64 / self.word_count.max(1) as f64
    }
}

/// Share of the most frequent token; 1.0 for an empty token list
fn max_token_repeat_ratio(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 1.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }

    let most_common = counts.values().copied().max().unwrap_or(0);
    most_common as f64 / tokens.len() as f64
}

/// Classifies parse outcomes into accepted pages and landing pages
#[derive(Debug, Clone)]
pub struct ContentGate {
    max_word_count: usize,
    nav_ratio: f64,
    repeated_ratio: f64,
}

impl ContentGate {
    pub fn new(config: &LandingConfig) -> Self {
        Self {
            max_word_count: config.max_word_count,
            nav_ratio: config.nav_ratio,
            repeated_ratio: config.repeated_ratio,
        }
    }

    pub fn classify(&self, outcome: ParseOutcome) -> ClassifiedPage {
        let page = match outcome {
            ParseOutcome::Landing { reason } => {
                return ClassifiedPage {
                    verdict: Verdict::LandingSkip,
                    reason,
                    page: None,
                };
            }
            ParseOutcome::Page(page) => page,
        };

        let (verdict, reason) = match &page.extraction {
            Extraction::Primary { selector } => {
                (Verdict::Accepted, format!("content region '{}'", selector))
            }
            Extraction::Fallback {
                has_landmark: true, ..
            } => (
                Verdict::Accepted,
                "fallback text with a main/article landmark".to_string(),
            ),
            Extraction::Fallback { nav_word_count, .. } => {
                let stats = FallbackStats::from_text(&page.text, *nav_word_count);
                self.fallback_verdict(&stats)
            }
        };

        ClassifiedPage {
            verdict,
            reason,
            page: Some(page),
        }
    }

    /// Applies the landing-page heuristic to fallback stats
    ///
    /// A page is a landing page when it is short and dominated either by
    /// navigation text or by a single repeated token.
    pub fn fallback_verdict(&self, stats: &FallbackStats) -> (Verdict, String) {
        let nav_ratio = stats.nav_ratio();
        let short = stats.word_count < self.max_word_count;
        let nav_dominated = stats.nav_word_count > 0 && nav_ratio > self.nav_ratio;
        let repetitive = stats.repeated_ratio > self.repeated_ratio;

        if short && (nav_dominated || repetitive) {
            (
                Verdict::LandingSkip,
                format!(
                    "{} words, nav ratio {:.2}, repeated ratio {:.2}",
                    stats.word_count, nav_ratio, stats.repeated_ratio
                ),
            )
        } else {
            (
                Verdict::Accepted,
                format!("fallback text with {} words", stats.word_count),
            )
        }
    }
}
