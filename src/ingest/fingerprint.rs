//! Content fingerprints and change detection

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `text` with whitespace runs collapsed
///
/// Pages that differ only in layout whitespace get the same fingerprint.
pub fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(word.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// How a page relates to what is already stored under its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing stored yet
    New,
    /// Stored fingerprint matches
    Unchanged,
    /// Stored fingerprint differs
    Changed,
}

/// Compares fingerprints for a single URL
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn detect(&self, stored: Option<&str>, fingerprint: &str) -> Change {
        match stored {
            None => Change::New,
            Some(previous) if previous == fingerprint => Change::Unchanged,
            Some(_) => Change::Changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_whitespace_layout() {
        let a = content_fingerprint("High  blood\npressure\t is common");
        let b = content_fingerprint(" High blood pressure is common ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_detects_text_changes() {
        assert_ne!(
            content_fingerprint("blood pressure"),
            content_fingerprint("blood pressures")
        );
    }

    #[test]
    fn test_fingerprint_of_empty_text() {
        // SHA-256 of the empty string
        assert_eq!(
            content_fingerprint("  \n "),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_detect() {
        let detector = ChangeDetector;
        assert_eq!(detector.detect(None, "abc"), Change::New);
        assert_eq!(detector.detect(Some("abc"), "abc"), Change::Unchanged);
        assert_eq!(detector.detect(Some("abd"), "abc"), Change::Changed);
    }
}
