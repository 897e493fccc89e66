use crate::config::types::{
    Config, CrawlerConfig, EntryPoint, LandingConfig, LinkConfig, OriginPolicy, QualityConfig,
    RetryConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_output_config(&config.output)?;
    validate_quality_config(&config.quality)?;
    validate_landing_config(&config.landing)?;
    validate_link_config(&config.links)?;
    validate_origins(&config.origins)?;
    validate_entries(&config.entries)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_workers < 1 || config.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max-workers must be between 1 and 64, got {}",
            config.max_workers
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be greater than 0".to_string(),
        ));
    }

    if config.default_delay_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "default-delay-secs must be >= 0, got {}",
            config.default_delay_secs
        )));
    }

    validate_range("delay-range", config.delay_range)?;

    if config.checkpoint_interval == 0 {
        return Err(ConfigError::Validation(
            "checkpoint-interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_base_secs < 0.0 || config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-base-secs must be >= 0 and backoff-factor >= 1, got {} and {}",
            config.backoff_base_secs, config.backoff_factor
        )));
    }

    validate_range("jitter-range-secs", config.jitter_range_secs)?;

    let retry: HashSet<u16> = config.retry_status_codes.iter().copied().collect();
    if let Some(code) = config
        .give_up_status_codes
        .iter()
        .find(|code| retry.contains(code))
    {
        return Err(ConfigError::Validation(format!(
            "status code {} cannot be both retried and given up on",
            code
        )));
    }

    Ok(())
}

fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("directory", &config.directory),
        ("state-file", &config.state_file),
        ("report-dir", &config.report_dir),
        ("database-path", &config.database_path),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

fn validate_quality_config(config: &QualityConfig) -> Result<(), ConfigError> {
    if config.min_score > 100 {
        return Err(ConfigError::Validation(format!(
            "min-score must be between 0 and 100, got {}",
            config.min_score
        )));
    }

    if config.repeated_line_penalty > 100 {
        return Err(ConfigError::Validation(format!(
            "repeated-line-penalty must be between 0 and 100, got {}",
            config.repeated_line_penalty
        )));
    }

    Ok(())
}

fn validate_landing_config(config: &LandingConfig) -> Result<(), ConfigError> {
    for (name, ratio) in [
        ("nav-ratio", config.nav_ratio),
        ("repeated-ratio", config.repeated_ratio),
    ] {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 0 and 1, got {}",
                name, ratio
            )));
        }
    }

    Ok(())
}

fn validate_link_config(config: &LinkConfig) -> Result<(), ConfigError> {
    if config.allowed_origins.is_empty() {
        return Err(ConfigError::Validation(
            "allowed-origins must name at least one host".to_string(),
        ));
    }

    for pattern in &config.allowed_origins {
        validate_host_pattern(pattern)?;
    }

    for path in &config.disallowed_paths {
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPattern(format!(
                "Disallowed path '{}' must start with '/'",
                path
            )));
        }
    }

    Ok(())
}

fn validate_origins(origins: &[OriginPolicy]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for origin in origins {
        validate_host_pattern(&origin.host)?;

        if !seen.insert(origin.host.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "Origin '{}' is declared more than once",
                origin.host
            )));
        }

        if origin.delay_secs < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Origin '{}' delay-secs must be >= 0",
                origin.host
            )));
        }

        if origin.max_concurrent < 1 {
            return Err(ConfigError::Validation(format!(
                "Origin '{}' max-concurrent must be >= 1",
                origin.host
            )));
        }
    }

    Ok(())
}

fn validate_entries(entries: &[EntryPoint]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in entries {
        if entry.language.is_empty() || entry.version.is_empty() {
            return Err(ConfigError::Validation(
                "Entry language and version cannot be empty".to_string(),
            ));
        }

        if !seen.insert((entry.language.as_str(), entry.version.as_str())) {
            return Err(ConfigError::Validation(format!(
                "Entry for language '{}' and version '{}' is declared more than once",
                entry.language, entry.version
            )));
        }

        for seed in entry.seed_urls()? {
            if seed.scheme() != "http" && seed.scheme() != "https" {
                return Err(ConfigError::InvalidUrl(format!(
                    "Seed URL '{}' must use http or https",
                    seed
                )));
            }
        }
    }

    Ok(())
}

fn validate_range(name: &str, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if min < 0.0 || max < min {
        return Err(ConfigError::Validation(format!(
            "{} must satisfy 0 <= min <= max, got [{}, {}]",
            name, min, max
        )));
    }
    Ok(())
}

/// Validates a host pattern (supports a leading "*." wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    // Hosts must be parseable as the host part of a URL
    Url::parse(&format!("http://{}/", host))
        .map_err(|e| ConfigError::InvalidPattern(format!("Host '{}': {}", host, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_host_pattern() {
        assert!(validate_host_pattern("example.com").is_ok());
        assert!(validate_host_pattern("*.example.com").is_ok());
        assert!(validate_host_pattern("www.msdmanuals.cn").is_ok());
        assert!(validate_host_pattern("127.0.0.1").is_ok());
        assert!(validate_host_pattern("localhost").is_ok());

        assert!(validate_host_pattern("").is_err());
        assert!(validate_host_pattern("*.").is_err());
        assert!(validate_host_pattern(".example.com").is_err());
        assert!(validate_host_pattern("example.com.").is_err());
        assert!(validate_host_pattern("exa mple.com").is_err());
        assert!(validate_host_pattern("a..b").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_overlapping_status_codes_rejected() {
        let mut config = Config::default();
        config.retry.give_up_status_codes.push(503);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_inverted_delay_range_rejected() {
        let mut config = Config::default();
        config.crawler.delay_range = (6.0, 4.0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut config = Config::default();
        let duplicate = config.entries[0].clone();
        config.entries.push(duplicate);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_non_http_seed_rejected() {
        let mut config = Config::default();
        config.entries = vec![EntryPoint::new("home", "en", "ftp://example.com/")];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_origin_rejected() {
        let mut config = Config::default();
        config.origins[0].max_concurrent = 0;
        assert!(validate(&config).is_err());
    }
}
