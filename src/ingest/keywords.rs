//! Frequency-based keyword extraction
//!
//! English keywords are alphabetic words of three or more letters; Chinese
//! keywords are character bigrams taken from runs of CJK text. Stopwords are
//! dropped, as are words seen only once.

use std::collections::HashMap;

/// Maximum number of keywords kept per article
pub const MAX_KEYWORDS: usize = 20;

const MIN_WORD_LEN: usize = 3;

const EN_STOPWORDS: &[&str] = &[
    "the", "and", "that", "have", "for", "not", "with", "you", "this", "but", "his", "from",
    "they", "say", "her", "she", "will", "one", "all", "would", "there", "their", "what", "out",
    "about", "who", "get", "which", "when", "make", "can", "like", "time", "just", "him", "know",
    "take", "people", "into", "year", "your", "good", "some", "could", "them", "see", "other",
    "than", "then", "now", "look", "only", "come", "its", "over", "think", "also", "back",
    "after", "use", "two", "how", "our", "work", "first", "well", "way", "even", "new", "want",
    "because", "any", "these", "give", "day", "most", "are", "was", "were", "been", "has",
    "had", "may", "more", "such", "should", "does", "did", "very", "each", "many",
];

/// Characters that end a Chinese bigram candidate
const ZH_STOPCHARS: &[char] = &[
    '的', '了', '在', '是', '我', '有', '和', '就', '不', '人', '都', '一', '上', '也', '很',
    '到', '说', '要', '去', '你', '会', '着', '看', '这', '或', '但', '只', '可', '已', '应',
    '并', '于', '对', '由', '把', '而', '从', '以', '为', '与', '及', '向', '当', '将', '比',
    '等', '还', '此', '各', '所', '其', '之', '被', '过', '再', '用', '能', '使', '则', '么',
    '地', '得',
];

/// Extracts up to [`MAX_KEYWORDS`] keywords, most frequent first
///
/// Ties are broken alphabetically so the result is deterministic.
pub fn extract_keywords(text: &str, language: &str) -> Vec<String> {
    let counts = if language.starts_with("zh") {
        chinese_bigrams(text)
    } else {
        english_words(text)
    };

    let mut ranked: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word)
        .collect()
}

fn english_words(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for word in text.split(|c: char| !c.is_ascii_alphabetic()) {
        if word.len() < MIN_WORD_LEN {
            continue;
        }
        let word = word.to_ascii_lowercase();
        if EN_STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        *counts.entry(word).or_default() += 1;
    }
    counts
}

fn chinese_bigrams(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    let runs = text.split(|c: char| !is_cjk(c) || ZH_STOPCHARS.contains(&c));

    for run in runs {
        let chars: Vec<char> = run.chars().collect();
        for pair in chars.windows(2) {
            *counts.entry(pair.iter().collect::<String>()).or_default() += 1;
        }
    }
    counts
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}
