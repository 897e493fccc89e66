//! HTML extraction for manual pages
//!
//! This module turns a fetched page into the fields the ingest layer stores:
//! - Title and body text (from a primary content region, or the whole body)
//! - Metadata deduced from meta tags, the URL and the text itself
//! - Medical terms, media references and outgoing links
//!
//! When no primary content region is found the body text is returned as a
//! generic fallback extraction, together with the numbers the content gate
//! needs to decide whether the page is really a landing page.

use crate::crawler::fetcher::FetchOutcome;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Primary content regions, in order of preference
const CONTENT_SELECTORS: &[&str] = &[
    "main .content",
    "article .content",
    ".main-content",
    ".article-body",
    "main",
    "article",
];

/// Title candidates, in order of preference
const TITLE_SELECTORS: &[&str] = &["h1", ".page-title", ".article-title", "title"];

/// A content region must hold more than this many characters to count
const MIN_REGION_CHARS: usize = 100;

/// A title candidate must hold more than this many characters to count
const MIN_TITLE_CHARS: usize = 10;

/// Elements whose text never counts as content
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "nav", "footer", "aside"];

/// Elements that start a new line of text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "li", "ul", "ol", "table", "tr", "td",
    "th", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "dd", "dt", "figcaption", "br",
    "pre", "hr",
];

const ENGLISH_TERMS: &[&str] = &[
    "disease",
    "disorder",
    "syndrome",
    "diagnosis",
    "treatment",
    "symptom",
    "medication",
    "surgery",
    "examination",
    "therapy",
    "pathology",
    "physiology",
    "anatomy",
    "cardiology",
    "neurology",
];

const CHINESE_TERMS: &[&str] = &[
    "高血压", "低血压", "心脏病", "糖尿病", "癌症", "肿瘤", "炎症", "感染", "症状", "诊断", "治疗",
    "预防", "药物", "手术", "检查", "医生", "患者", "医院", "诊所", "急救", "护理",
];

const DOWNLOAD_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".xls"];

/// A link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Absolute URL
    pub url: String,
    /// Anchor text
    pub text: String,
}

/// How the body text was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Text came from a recognized content region
    Primary { selector: String },
    /// No content region was found; text is the whole body
    Fallback {
        /// Words inside navigation-marked regions
        nav_word_count: usize,
        /// Whether the document has a `main` or `article` element
        has_landmark: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageMetadata {
    pub language: String,
    pub version: String,
    pub category: Option<String>,
    pub author: Option<String>,
    pub reviewed_at: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
}

/// A term from the medical vocabulary and how often it occurs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTerm {
    pub term: String,
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Download,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Download => "download",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
    /// Alt text or link text
    pub label: String,
}

/// Structured fields extracted from a page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    /// Body text, one block per line
    pub text: String,
    pub word_count: usize,
    pub metadata: PageMetadata,
    pub terms: Vec<ExtractedTerm>,
    pub links: Vec<DiscoveredLink>,
    pub media: Vec<MediaRef>,
    pub extraction: Extraction,
}

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Page(ParsedPage),
    /// The parser recognized a navigation or landing page outright
    Landing { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("response body is empty")]
    EmptyBody,

    #[error("invalid page URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Turns a fetched page into structured fields
pub trait PageParser: Send + Sync {
    fn parse(&self, fetched: &FetchOutcome) -> Result<ParseOutcome, ParseFailure>;

    /// Outgoing links, extracted independently of the page's classification
    fn links(&self, fetched: &FetchOutcome) -> Vec<DiscoveredLink>;
}

/// Parser for the manual sites' HTML
#[derive(Debug, Clone)]
pub struct HtmlPageParser {
    default_language: String,
    default_version: String,
}

impl HtmlPageParser {
    /// The defaults are used when neither the page nor its URL names a
    /// language or manual version
    pub fn new(default_language: &str, default_version: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
            default_version: default_version.to_string(),
        }
    }
}

impl PageParser for HtmlPageParser {
    fn parse(&self, fetched: &FetchOutcome) -> Result<ParseOutcome, ParseFailure> {
        if let Some(content_type) = fetched.content_type() {
            let lowered = content_type.to_ascii_lowercase();
            if !lowered.contains("html") && !lowered.starts_with("text/plain") {
                return Ok(ParseOutcome::Landing {
                    reason: format!("non-HTML content type {}", content_type),
                });
            }
        }

        if fetched.body.trim().is_empty() {
            return Err(ParseFailure::EmptyBody);
        }

        let url = Url::parse(&fetched.final_url).map_err(|e| ParseFailure::InvalidUrl {
            url: fetched.final_url.clone(),
            reason: e.to_string(),
        })?;

        let document = Html::parse_document(&fetched.body);

        let (text, extraction) = extract_content(&document);
        let word_count = text.split_whitespace().count();
        if word_count == 0 {
            return Ok(ParseOutcome::Landing {
                reason: "page has no text content".to_string(),
            });
        }

        let metadata = extract_metadata(&document, &url, &text, self);
        let terms = extract_terms(&text, &metadata.language);

        Ok(ParseOutcome::Page(ParsedPage {
            title: extract_title(&document),
            word_count,
            metadata,
            terms,
            links: extract_links(&document, &url),
            media: extract_media(&document, &url),
            extraction,
            text,
        }))
    }

    fn links(&self, fetched: &FetchOutcome) -> Vec<DiscoveredLink> {
        match Url::parse(&fetched.final_url) {
            Ok(url) => extract_links(&Html::parse_document(&fetched.body), &url),
            Err(_) => Vec::new(),
        }
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Finds the primary content region, falling back to the whole body
fn extract_content(document: &Html) -> (String, Extraction) {
    for css in CONTENT_SELECTORS {
        let Some(sel) = selector(css) else { continue };
        if let Some(region) = document.select(&sel).next() {
            let text = visible_text(region);
            if text.chars().count() > MIN_REGION_CHARS {
                return (
                    text,
                    Extraction::Primary {
                        selector: css.to_string(),
                    },
                );
            }
        }
    }

    let body = selector("body").and_then(|sel| document.select(&sel).next());
    let text = body.map(visible_text).unwrap_or_default();

    let has_landmark = selector("main, article")
        .map(|sel| document.select(&sel).next().is_some())
        .unwrap_or(false);

    (
        text,
        Extraction::Fallback {
            nav_word_count: nav_word_count(document),
            has_landmark,
        },
    )
}

/// Counts words inside `nav` elements and `role="navigation"` regions
///
/// Nested navigation regions are counted once.
fn nav_word_count(document: &Html) -> usize {
    let Some(sel) = selector("nav, [role=navigation]") else {
        return 0;
    };

    document
        .select(&sel)
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| is_navigation(&a))
        })
        .map(|el| {
            el.text()
                .map(|t| t.split_whitespace().count())
                .sum::<usize>()
        })
        .sum()
}

fn is_navigation(element: &ElementRef) -> bool {
    element.value().name() == "nav" || element.value().attr("role") == Some("navigation")
}

/// Collects text outside hidden elements, one line per block
fn visible_text(root: ElementRef) -> String {
    let mut collector = TextCollector::default();
    collector.visit(root);
    collector.finish()
}

#[derive(Default)]
struct TextCollector {
    lines: Vec<String>,
    current: String,
}

impl TextCollector {
    fn visit(&mut self, element: ElementRef) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(el) => {
                    let name = el.name();
                    if HIDDEN_ELEMENTS.contains(&name) {
                        continue;
                    }
                    let block = BLOCK_ELEMENTS.contains(&name);
                    if block {
                        self.break_line();
                    }
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.visit(child_el);
                    }
                    if block {
                        self.break_line();
                    }
                }
                _ => {}
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        for word in text.split_whitespace() {
            if !self.current.is_empty() {
                self.current.push(' ');
            }
            self.current.push_str(word);
        }
    }

    fn break_line(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        }
    }

    fn finish(mut self) -> String {
        self.break_line();
        self.lines.join("\n")
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_title(document: &Html) -> String {
    let first_text = |css: &str| {
        selector(css)
            .and_then(|sel| document.select(&sel).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
    };

    TITLE_SELECTORS
        .iter()
        .filter_map(|css| first_text(css))
        .find(|title| title.chars().count() > MIN_TITLE_CHARS)
        .or_else(|| first_text("title"))
        .unwrap_or_default()
}

fn extract_metadata(document: &Html, url: &Url, text: &str, defaults: &HtmlPageParser) -> PageMetadata {
    let mut metadata = PageMetadata::default();
    let mut declared_language = String::new();
    let mut modified = None;

    if let Some(sel) = selector("meta[content]") {
        for meta in document.select(&sel) {
            let name = meta
                .value()
                .attr("name")
                .or_else(|| meta.value().attr("http-equiv"))
                .unwrap_or_default()
                .to_lowercase();
            let content = meta.value().attr("content").unwrap_or_default();
            match name.as_str() {
                "description" => {
                    let description = collapse_whitespace(content);
                    if !description.is_empty() {
                        metadata.description = Some(description);
                    }
                }
                "keywords" => {
                    metadata.keywords = content
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect();
                }
                "language" | "content-language" => {
                    declared_language = content.trim().to_lowercase()
                }
                "last-modified" => modified = Some(content.trim().to_string()),
                _ => {}
            }
        }
    }

    let html_lang = document
        .root_element()
        .value()
        .attr("lang")
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_default();

    metadata.language = deduce_language(
        &declared_language,
        &html_lang,
        url,
        text,
        &defaults.default_language,
    );

    let (version, category) = deduce_version_and_category(url, &defaults.default_version);
    metadata.version = version;
    metadata.category = category;

    metadata.author = reviewer(text);
    metadata.reviewed_at = selector("time[datetime]")
        .and_then(|sel| document.select(&sel).next())
        .and_then(|el| el.value().attr("datetime"))
        .map(|d| d.trim().to_string())
        .or(modified)
        .filter(|d| !d.is_empty());

    metadata
}

/// Chinese if any of the declared language, the `html` lang attribute, the
/// host or the text itself says so; English if the page declares it;
/// otherwise the entry's language
fn deduce_language(
    declared: &str,
    html_lang: &str,
    url: &Url,
    text: &str,
    default_language: &str,
) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();

    if declared.starts_with("zh")
        || html_lang.starts_with("zh")
        || host.ends_with(".cn")
        || has_chinese_text(text)
    {
        "zh".to_string()
    } else if declared.starts_with("en") || html_lang.starts_with("en") {
        "en".to_string()
    } else {
        default_language.to_string()
    }
}

fn has_chinese_text(text: &str) -> bool {
    let total = text.chars().count();
    let chinese = text
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();

    chinese >= 20 && chinese as f64 / total.max(1) as f64 >= 0.15
}

/// Manual version and topic category from the URL path
///
/// Paths look like `/{version}/{category}/...` on the human manuals and
/// `/{category}/...` on the veterinary manual.
fn deduce_version_and_category(url: &Url, default_version: &str) -> (String, Option<String>) {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let host = url.host_str().unwrap_or_default().to_lowercase();

    let (version, rest) = match segments.first() {
        Some(&"home") => ("home".to_string(), &segments[1..]),
        Some(&"professional") => ("professional".to_string(), &segments[1..]),
        _ if host.contains("msdvetmanual") => ("veterinary".to_string(), &segments[..]),
        _ => (default_version.to_string(), &segments[..]),
    };

    let category = rest.first().map(|c| c.to_string());
    (version, category)
}

/// Name following a "reviewed by" byline, up to the end of the sentence
fn reviewer(text: &str) -> Option<String> {
    const MARKER: &str = "reviewed by";

    let lowered = text.to_lowercase();
    // Byte offsets only line up when lowercasing kept every length
    if lowered.len() != text.len() {
        return None;
    }

    let start = lowered.find(MARKER)? + MARKER.len();
    let rest = &text[start..];
    let end = rest
        .find(|c: char| matches!(c, '.' | '\n' | '|'))
        .unwrap_or(rest.len());
    let name = rest[..end].trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn extract_terms(text: &str, language: &str) -> Vec<ExtractedTerm> {
    if language == "zh" {
        return CHINESE_TERMS
            .iter()
            .filter_map(|term| {
                let frequency = text.matches(term).count() as u32;
                (frequency > 0).then(|| ExtractedTerm {
                    term: term.to_string(),
                    frequency,
                })
            })
            .collect();
    }

    let mut counts: HashMap<String, u32> = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        *counts.entry(word.to_lowercase()).or_default() += 1;
    }

    ENGLISH_TERMS
        .iter()
        .filter_map(|term| {
            counts.get(*term).map(|&frequency| ExtractedTerm {
                term: term.to_string(),
                frequency,
            })
        })
        .collect()
}

fn extract_links(document: &Html, base: &Url) -> Vec<DiscoveredLink> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter(|a| a.value().attr("download").is_none())
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            if href.is_empty() || is_ignored_href(href) {
                return None;
            }
            let url = base.join(href).ok()?;
            Some(DiscoveredLink {
                url: url.to_string(),
                text: collapse_whitespace(&a.text().collect::<String>()),
            })
        })
        .collect()
}

fn is_ignored_href(href: &str) -> bool {
    let lowered = href.to_ascii_lowercase();
    href.starts_with('#')
        || ["javascript:", "mailto:", "tel:", "data:"]
            .iter()
            .any(|scheme| lowered.starts_with(scheme))
}

fn extract_media(document: &Html, base: &Url) -> Vec<MediaRef> {
    let mut media = Vec::new();
    let resolve = |src: &str| base.join(src.trim()).ok().map(|u| u.to_string());

    if let Some(sel) = selector("img[src]") {
        for img in document.select(&sel) {
            if let Some(url) = img.value().attr("src").and_then(resolve) {
                media.push(MediaRef {
                    url,
                    kind: MediaKind::Image,
                    label: collapse_whitespace(img.value().attr("alt").unwrap_or_default()),
                });
            }
        }
    }

    if let Some(sel) = selector("video, iframe") {
        for video in document.select(&sel) {
            let src = video
                .value()
                .attr("src")
                .or_else(|| video.value().attr("data-src"));
            if let Some(url) = src.and_then(resolve) {
                media.push(MediaRef {
                    url,
                    kind: MediaKind::Video,
                    label: String::new(),
                });
            }
        }
    }

    if let Some(sel) = selector("a[href]") {
        for link in document.select(&sel) {
            let Some(href) = link.value().attr("href") else { continue };
            let lowered = href.to_ascii_lowercase();
            if !DOWNLOAD_EXTENSIONS.iter().any(|ext| lowered.contains(ext)) {
                continue;
            }
            if let Some(url) = resolve(href) {
                media.push(MediaRef {
                    url,
                    kind: MediaKind::Download,
                    label: collapse_whitespace(&link.text().collect::<String>()),
                });
            }
        }
    }

    media
}
