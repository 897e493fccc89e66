use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Folio-Harvest
///
/// Every section falls back to the built-in defaults, so an empty file (or no
/// file at all) yields a configuration for the reference manual sites.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub quality: QualityConfig,
    pub landing: LandingConfig,
    pub links: LinkConfig,
    #[serde(rename = "origin")]
    pub origins: Vec<OriginPolicy>,
    #[serde(rename = "entry")]
    pub entries: Vec<EntryPoint>,
}

impl Config {
    /// Looks up the entry point for a language/version combination
    ///
    /// # Returns
    ///
    /// * `Ok(&EntryPoint)` - The configured entry point
    /// * `Err(ConfigError::UnsupportedEntry)` - No entry is configured for the pair
    pub fn entry_for(&self, language: &str, version: &str) -> Result<&EntryPoint, ConfigError> {
        self.entries
            .iter()
            .find(|e| e.language == language && e.version == version)
            .ok_or_else(|| ConfigError::UnsupportedEntry {
                language: language.to_string(),
                version: version.to_string(),
            })
    }

    /// Returns the politeness policy declared for a host, if any
    pub fn origin_policy(&self, host: &str) -> Option<&OriginPolicy> {
        self.origins.iter().find(|o| o.host.eq_ignore_ascii_case(host))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            retry: RetryConfig::default(),
            user_agent: UserAgentConfig::default(),
            output: OutputConfig::default(),
            quality: QualityConfig::default(),
            landing: LandingConfig::default(),
            links: LinkConfig::default(),
            origins: vec![
                OriginPolicy::new("www.msdmanuals.com", 5.0, 3),
                OriginPolicy::new("www.msdmanuals.cn", 6.0, 2),
                OriginPolicy::new("www.msdvetmanual.com", 7.0, 1),
            ],
            entries: vec![
                EntryPoint {
                    version: "home".to_string(),
                    language: "en".to_string(),
                    start_url: "https://www.msdmanuals.com/home/".to_string(),
                    extra_urls: vec!["health-topics/".to_string()],
                },
                EntryPoint {
                    version: "home".to_string(),
                    language: "zh".to_string(),
                    start_url: "https://www.msdmanuals.cn/home/".to_string(),
                    extra_urls: vec![
                        "health-topics/".to_string(),
                        "https://www.msdmanuals.cn/".to_string(),
                    ],
                },
                EntryPoint::new("professional", "en", "https://www.msdmanuals.com/professional/"),
                EntryPoint::new("professional", "zh", "https://www.msdmanuals.cn/professional/"),
                EntryPoint::new("veterinary", "en", "https://www.msdvetmanual.com/"),
            ],
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Upper bound on concurrently running page workers
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// Delay between requests to an origin without its own policy (seconds)
    #[serde(rename = "default-delay-secs")]
    pub default_delay_secs: f64,

    /// Draw each delay from `delay-range` instead of using the base delay
    #[serde(rename = "randomize-delay")]
    pub randomize_delay: bool,

    /// Inclusive `[min, max]` range for randomized delays (seconds)
    #[serde(rename = "delay-range")]
    pub delay_range: (f64, f64),

    /// Per-fetch timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Number of completed entries between checkpoints
    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u64,

    /// Number of error-log entries retained in the checkpoint
    #[serde(rename = "error-log-limit")]
    pub error_log_limit: usize,

    /// Number of completed entries between progress log lines
    #[serde(rename = "progress-interval")]
    pub progress_interval: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            default_delay_secs: 5.0,
            randomize_delay: true,
            delay_range: (4.0, 6.0),
            timeout_secs: 30,
            checkpoint_interval: 100,
            error_log_limit: 100,
            progress_interval: 10,
        }
    }
}

/// Retry and give-up policy for failed fetches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per URL, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry (seconds)
    #[serde(rename = "backoff-base-secs")]
    pub backoff_base_secs: f64,

    /// Multiplier applied to the backoff for each further retry
    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,

    /// Random `[min, max]` seconds added to every backoff
    #[serde(rename = "jitter-range-secs")]
    pub jitter_range_secs: (f64, f64),

    /// Status codes that are retried
    #[serde(rename = "retry-status-codes")]
    pub retry_status_codes: Vec<u16>,

    /// Status codes that are never retried
    #[serde(rename = "give-up-status-codes")]
    pub give_up_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 1.0,
            backoff_factor: 2.0,
            jitter_range_secs: (1.0, 5.0),
            retry_status_codes: vec![429, 500, 502, 503, 504],
            give_up_status_codes: vec![403, 404, 451],
        }
    }
}

/// Request identity: user agent rotation and default headers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// User agent strings; one is picked at random per request
    pub agents: Vec<String>,

    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        let agents = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:89.0) Gecko/20100101 Firefox/89.0",
        ];

        let headers = [
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "en-US,en;q=0.5,zh-CN;q=0.3"),
            ("Cache-Control", "no-cache"),
            ("Pragma", "no-cache"),
            ("Upgrade-Insecure-Requests", "1"),
        ];

        Self {
            agents: agents.iter().map(|a| a.to_string()).collect(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory holding the checkpoint and reports
    pub directory: String,

    /// Checkpoint file name inside `directory`
    #[serde(rename = "state-file")]
    pub state_file: String,

    /// Report directory inside `directory`
    #[serde(rename = "report-dir")]
    pub report_dir: String,

    /// Path to the SQLite article database
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl OutputConfig {
    /// Full path of the checkpoint file
    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.state_file)
    }

    /// Full path of the report directory
    pub fn report_path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.report_dir)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "data/output".to_string(),
            state_file: "crawler_state.json".to_string(),
            report_dir: "reports".to_string(),
            database_path: "data/articles.db".to_string(),
        }
    }
}

/// Whether a low quality score blocks ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    /// Records scoring below `min-score` are rejected and not stored
    Strict,
    /// Every record is stored; the score is kept for downstream filtering
    Permissive,
}

/// Quality scoring thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub mode: QualityMode,

    #[serde(rename = "min-score")]
    pub min_score: u8,

    #[serde(rename = "title-min-length")]
    pub title_min_length: usize,

    #[serde(rename = "content-min-length")]
    pub content_min_length: usize,

    #[serde(rename = "word-count-min")]
    pub word_count_min: usize,

    #[serde(rename = "min-terms")]
    pub min_terms: usize,

    #[serde(rename = "repeated-line-penalty")]
    pub repeated_line_penalty: u8,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            mode: QualityMode::Strict,
            min_score: 30,
            title_min_length: 5,
            content_min_length: 100,
            word_count_min: 10,
            min_terms: 1,
            repeated_line_penalty: 10,
        }
    }
}

/// Thresholds for the landing-page fallback heuristic
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LandingConfig {
    /// Pages at or above this word count are never treated as landing pages
    #[serde(rename = "max-word-count")]
    pub max_word_count: usize,

    #[serde(rename = "nav-ratio")]
    pub nav_ratio: f64,

    #[serde(rename = "repeated-ratio")]
    pub repeated_ratio: f64,
}

impl Default for LandingConfig {
    fn default() -> Self {
        Self {
            max_word_count: 32,
            nav_ratio: 0.45,
            repeated_ratio: 0.55,
        }
    }
}

/// Link admission rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Host patterns (e.g. "www.example.com" or "*.example.com") links may point to
    #[serde(rename = "allowed-origins")]
    pub allowed_origins: Vec<String>,

    /// Path prefixes that are never followed
    #[serde(rename = "disallowed-paths")]
    pub disallowed_paths: Vec<String>,

    /// Substrings that mark account, search or subscription pages
    #[serde(rename = "skip-patterns")]
    pub skip_patterns: Vec<String>,

    /// Terms that move a link into the high-priority class
    #[serde(rename = "priority-keywords")]
    pub priority_keywords: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let to_strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };

        Self {
            allowed_origins: to_strings(&[
                "www.msdmanuals.com",
                "www.msdmanuals.cn",
                "www.msdvetmanual.com",
            ]),
            disallowed_paths: to_strings(&[
                "/sitecore/",
                "/custom/",
                "/news/external/",
                "/multimedia/zk/",
                "/downloadtextfile",
                "/pagerevalidation",
                "/bigqueryexport",
            ]),
            skip_patterns: to_strings(&["login", "register", "search?", "subscribe"]),
            priority_keywords: to_strings(&[
                "health",
                "medical",
                "disease",
                "disorder",
                "symptom",
                "treatment",
                "diagnosis",
                "health-topics",
                "cardiovascular",
                "神经",
                "心脏",
                "疾病",
                "症状",
                "治疗",
                "诊断",
            ]),
        }
    }
}

/// Politeness policy for a single origin
#[derive(Debug, Clone, Deserialize)]
pub struct OriginPolicy {
    /// Host name, compared case-insensitively
    pub host: String,

    /// Base delay between requests to this host (seconds)
    #[serde(rename = "delay-secs")]
    pub delay_secs: f64,

    /// Maximum number of in-flight requests to this host
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,
}

impl OriginPolicy {
    pub fn new(host: &str, delay_secs: f64, max_concurrent: usize) -> Self {
        Self {
            host: host.to_string(),
            delay_secs,
            max_concurrent,
        }
    }
}

/// Seed URLs for one manual version in one language
#[derive(Debug, Clone, Deserialize)]
pub struct EntryPoint {
    pub version: String,
    pub language: String,

    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Additional seeds, absolute or relative to `start-url`
    #[serde(rename = "extra-urls", default)]
    pub extra_urls: Vec<String>,
}

impl EntryPoint {
    pub fn new(version: &str, language: &str, start_url: &str) -> Self {
        Self {
            version: version.to_string(),
            language: language.to_string(),
            start_url: start_url.to_string(),
            extra_urls: Vec::new(),
        }
    }

    /// Returns the start URL followed by the extra URLs resolved against it
    pub fn seed_urls(&self) -> Result<Vec<url::Url>, ConfigError> {
        let start = url::Url::parse(&self.start_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start-url '{}': {}", self.start_url, e))
        })?;

        let mut seeds = vec![start.clone()];
        for extra in &self.extra_urls {
            let resolved = start.join(extra).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid extra-url '{}': {}", extra, e))
            })?;
            seeds.push(resolved);
        }

        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entries_cover_reference_site() {
        let config = Config::default();
        assert!(config.entry_for("en", "home").is_ok());
        assert!(config.entry_for("zh", "professional").is_ok());
        assert!(config.entry_for("en", "veterinary").is_ok());
    }

    #[test]
    fn test_unsupported_entry() {
        let config = Config::default();
        let err = config.entry_for("zh", "veterinary").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedEntry { .. }));
    }

    #[test]
    fn test_seed_urls_resolve_relative_extras() {
        let config = Config::default();
        let entry = config.entry_for("zh", "home").unwrap();
        let seeds: Vec<String> = entry
            .seed_urls()
            .unwrap()
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            seeds,
            vec![
                "https://www.msdmanuals.cn/home/",
                "https://www.msdmanuals.cn/home/health-topics/",
                "https://www.msdmanuals.cn/",
            ]
        );
    }

    #[test]
    fn test_origin_policy_lookup_is_case_insensitive() {
        let config = Config::default();
        let policy = config.origin_policy("WWW.MSDVETMANUAL.COM").unwrap();
        assert_eq!(policy.max_concurrent, 1);
        assert!(config.origin_policy("example.com").is_none());
    }

    #[test]
    fn test_output_paths() {
        let output = OutputConfig::default();
        assert_eq!(
            output.state_path(),
            PathBuf::from("data/output/crawler_state.json")
        );
        assert_eq!(output.report_path(), PathBuf::from("data/output/reports"));
    }
}
