//! HTTP fetching
//!
//! The engine talks to the network only through [`FetchClient`], so tests can
//! swap in a mock server or a scripted client. [`HttpFetchClient`] is the
//! reqwest-backed implementation used by the binary.
//!
//! A fetch either yields a 2xx [`FetchOutcome`] or a typed [`FetchError`];
//! whether an error is retried is decided by the caller's retry policy, not here.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{redirect::Policy, Client};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

/// Request headers, sent in key order
pub type HeaderSet = BTreeMap<String, String>;

/// Maximum number of redirects followed per request
const REDIRECT_LIMIT: usize = 10;

/// A successful (2xx) response
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,

    /// URL after redirects
    pub final_url: String,

    pub body: String,

    /// Response headers with lowercased names
    pub headers: HashMap<String, String>,
}

impl FetchOutcome {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }
}

/// A failed fetch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-2xx status
    #[error("HTTP {status} from {final_url}")]
    Status { status: u16, final_url: String },

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Fetches a single URL
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Builds the header set for each request
///
/// Every request carries the configured default headers plus a user agent
/// picked at random from the configured list.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    base: HeaderSet,
    agents: Vec<String>,
}

impl RequestHeaders {
    pub fn new(config: &UserAgentConfig) -> Self {
        Self {
            base: config.headers.clone(),
            agents: config.agents.clone(),
        }
    }

    /// Headers for the next request
    pub fn next(&self) -> HeaderSet {
        let mut headers = self.base.clone();
        if let Some(agent) = self.agents.choose(&mut rand::thread_rng()) {
            headers.insert("User-Agent".to_string(), agent.clone());
        }
        headers
    }
}

/// reqwest-backed fetch client
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    client: Client,
}

impl HttpFetchClient {
    /// Builds the underlying HTTP client
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetchClient)` - Successfully built client
    /// * `Err(reqwest::Error)` - The TLS backend could not be initialized
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::limited(REDIRECT_LIMIT))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                final_url,
            });
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        Ok(FetchOutcome {
            status: status.as_u16(),
            final_url,
            body,
            headers,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_headers_include_agent() {
        let headers = RequestHeaders::new(&UserAgentConfig::default()).next();
        assert!(headers.contains_key("Accept"));
        assert!(headers["User-Agent"].starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_request_headers_without_agents() {
        let config = UserAgentConfig {
            agents: Vec::new(),
            headers: HeaderSet::new(),
        };
        assert!(RequestHeaders::new(&config).next().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("X-Test", "yes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=utf-8")
                    .set_body_string("<html>hi</html>"),
            )
            .mount(&server)
            .await;

        let client = HttpFetchClient::new().unwrap();
        let mut headers = HeaderSet::new();
        headers.insert("X-Test".to_string(), "yes".to_string());

        let outcome = client
            .fetch(
                &format!("{}/page", server.uri()),
                &headers,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, "<html>hi</html>");
        assert_eq!(outcome.content_type(), Some("text/html; charset=utf-8"));
        assert!(outcome.final_url.ends_with("/page"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpFetchClient::new().unwrap();
        let err = client
            .fetch(
                &format!("{}/missing", server.uri()),
                &HeaderSet::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = HttpFetchClient::new().unwrap();
        let err = client
            .fetch(&server.uri(), &HeaderSet::new(), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let client = HttpFetchClient::new().unwrap();
        let outcome = client
            .fetch(
                &format!("{}/old", server.uri()),
                &HeaderSet::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(outcome.final_url.ends_with("/new"));
        assert_eq!(outcome.body, "moved");
    }
}
