use url::Url;

/// Extracts the origin (lowercase host) a URL belongs to
///
/// Politeness and admission are keyed by host, so two URLs on the same host but
/// different ports share one origin.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use folio_harvest::url::extract_origin;
///
/// let url = Url::parse("https://WWW.MSDMANUALS.COM/home/").unwrap();
/// assert_eq!(extract_origin(&url), Some("www.msdmanuals.com".to_string()));
/// ```
pub fn extract_origin(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks whether a host matches an allow-list pattern
///
/// `"*.example.com"` matches `example.com` and every subdomain of it; any other
/// pattern must equal the host. Comparison ignores ASCII case.
pub fn matches_host(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{}", base)),
        None => host == pattern,
    }
}
