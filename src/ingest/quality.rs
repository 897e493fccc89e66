//! Weighted quality scoring for candidate records

use crate::config::{QualityConfig, QualityMode};
use crate::storage::CandidateRecord;
use std::collections::HashMap;

const TITLE_WEIGHT: u8 = 20;
const CONTENT_WEIGHT: u8 = 30;
const WORD_COUNT_WEIGHT: u8 = 20;
const TERMS_WEIGHT: u8 = 15;
const SCHEME_WEIGHT: u8 = 10;
const METADATA_WEIGHT: u8 = 5;

/// Lines this short are ignored by the repeated-line check
const REPEAT_MIN_LINE_CHARS: usize = 10;
/// Pages with this many long lines or fewer are never penalized
const REPEAT_MIN_LINES: usize = 3;
const REPEAT_MAX_RATIO: f64 = 0.3;

/// Scores records and decides whether a score blocks ingestion
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Scores a record on a 0..=100 scale
    pub fn score(&self, record: &CandidateRecord) -> u8 {
        let c = &self.config;
        let mut score: i32 = 0;

        if record.title.chars().count() >= c.title_min_length {
            score += TITLE_WEIGHT as i32;
        }
        if record.content.chars().count() >= c.content_min_length {
            score += CONTENT_WEIGHT as i32;
        }
        if record.word_count >= c.word_count_min {
            score += WORD_COUNT_WEIGHT as i32;
        }
        if record.terms.len() >= c.min_terms {
            score += TERMS_WEIGHT as i32;
        }
        if record.url.starts_with("http://") || record.url.starts_with("https://") {
            score += SCHEME_WEIGHT as i32;
        }
        if record.category.as_deref().is_some_and(|s| !s.is_empty()) && !record.language.is_empty()
        {
            score += METADATA_WEIGHT as i32;
        }

        if has_repeated_lines(&record.content) {
            score -= c.repeated_line_penalty as i32;
        }

        score.clamp(0, 100) as u8
    }

    /// Whether a record with `score` may be persisted
    pub fn admits(&self, score: u8) -> bool {
        match self.config.mode {
            QualityMode::Strict => score >= self.config.min_score,
            QualityMode::Permissive => true,
        }
    }

    pub fn min_score(&self) -> u8 {
        self.config.min_score
    }
}

/// True when too many of the content's long lines are duplicates
fn has_repeated_lines(content: &str) -> bool {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| l.chars().count() > REPEAT_MIN_LINE_CHARS)
        .collect();

    if lines.len() <= REPEAT_MIN_LINES {
        return false;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for line in &lines {
        *seen.entry(line).or_default() += 1;
    }
    let repeated: usize = seen.values().filter(|&&n| n > 1).map(|n| n - 1).sum();

    repeated as f64 / lines.len() as f64 > REPEAT_MAX_RATIO
}
