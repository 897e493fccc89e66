//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small manual site and run the full
//! crawl cycle end-to-end: fetch, classify, score, store and checkpoint.

use folio_harvest::config::{Config, EntryPoint};
use folio_harvest::crawler::{crawl, CrawlOptions, StopReason};
use folio_harvest::state::counters;
use folio_harvest::storage::{ArticleStore, SqliteStore};
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no politeness delays or retry backoff
fn create_test_config(base_url: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.randomize_delay = false;
    config.crawler.default_delay_secs = 0.0;
    config.crawler.timeout_secs = 5;
    config.retry.backoff_base_secs = 0.0;
    config.retry.jitter_range_secs = (0.0, 0.0);
    config.origins.clear();
    config.links.allowed_origins = vec!["127.0.0.1".to_string()];
    config.output.directory = dir.join("output").display().to_string();
    config.output.database_path = dir.join("articles.db").display().to_string();
    config.entries = vec![EntryPoint::new(
        "home",
        "en",
        &format!("{}/home/a", base_url),
    )];
    config
}

fn article(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">related topic</a>", href))
        .collect();
    format!(
        r#"<html lang="en"><head><title>{title}</title></head>
        <body><main><h1>{title}</h1>
        <p>{body}</p>
        <p>Reviewed by Jane Doe, MD</p>
        {anchors}
        </main></body></html>"#,
        title = title,
        body = "Diagnosis relies on repeated blood pressure readings and treatment starts early. "
            .repeat(6),
        anchors = anchors
    )
}

fn landing(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">browse all health topics here</a> ", href))
        .collect();
    format!(
        "<html><body><nav>{}</nav><div>Topics</div></body></html>",
        anchors
    )
}

async fn mount_page(server: &MockServer, route: &str, body: String, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .expect(calls)
        .mount(server)
        .await;
}

fn read_checkpoint(config: &Config) -> serde_json::Value {
    let text = std::fs::read_to_string(config.output.state_path()).expect("checkpoint exists");
    serde_json::from_str(&text).expect("checkpoint is JSON")
}

fn url_set(value: &serde_json::Value) -> HashSet<String> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other["url"].as_str().expect("entry url").to_string(),
        })
        .collect()
}

#[tokio::test]
async fn test_page_limit_checkpoints_frontier() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());

    mount_page(
        &server,
        "/home/a",
        article(
            "Hypertension overview",
            &["/home/b", "https://elsewhere.test/c", "/account/login"],
        ),
        1,
    )
    .await;
    mount_page(&server, "/home/b", article("Heart failure basics", &[]), 0).await;

    let options = CrawlOptions {
        max_pages: Some(1),
        ..CrawlOptions::default()
    };
    let report = crawl(config.clone(), options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::PageLimit);
    assert_eq!(report.counter(counters::URLS_PROCESSED), 1);
    assert_eq!(report.counter(counters::NEW_ARTICLES_CREATED), 1);

    let checkpoint = read_checkpoint(&config);
    assert_eq!(
        url_set(&checkpoint["processedUrls"]),
        HashSet::from([format!("{}/home/a", base)])
    );
    assert_eq!(
        url_set(&checkpoint["pendingUrls"]),
        HashSet::from([format!("{}/home/b", base)])
    );
    assert_eq!(checkpoint["urlsProcessed"], 1);

    let store = SqliteStore::open(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(store.article_count().unwrap(), 1);
    assert!(store
        .find_by_url(&format!("{}/home/a", base))
        .unwrap()
        .is_some());

    let reports: Vec<_> = std::fs::read_dir(config.output.report_path())
        .unwrap()
        .collect();
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn test_resume_skips_processed_pages() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());

    mount_page(
        &server,
        "/home/a",
        article("Hypertension overview", &["/home/b", "/home/c"]),
        1,
    )
    .await;
    mount_page(&server, "/home/b", article("Heart failure basics", &["/home/a"]), 1).await;
    mount_page(&server, "/home/c", article("Stroke prevention", &[]), 1).await;

    let limited = CrawlOptions {
        max_pages: Some(1),
        ..CrawlOptions::default()
    };
    let first = crawl(config.clone(), limited, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.stop_reason, StopReason::PageLimit);

    let second = crawl(config.clone(), CrawlOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.stop_reason, StopReason::Exhausted);
    assert_eq!(second.counter(counters::URLS_PROCESSED), 3);
    assert_eq!(second.counter(counters::NEW_ARTICLES_CREATED), 3);

    let checkpoint = read_checkpoint(&config);
    assert_eq!(url_set(&checkpoint["processedUrls"]).len(), 3);
    assert!(url_set(&checkpoint["pendingUrls"]).is_empty());
}

#[tokio::test]
async fn test_not_found_gives_up_without_retry() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());

    Mock::given(method("GET"))
        .and(path("/home/a"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = crawl(config.clone(), CrawlOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.counter(counters::FAILED_DOWNLOADS), 1);
    assert_eq!(report.counter(counters::SUCCESSFUL_DOWNLOADS), 0);
    assert_eq!(report.recent_errors.len(), 1);
    assert!(report.recent_errors[0].error.contains("404"));

    let checkpoint = read_checkpoint(&config);
    assert_eq!(
        url_set(&checkpoint["failedUrls"]),
        HashSet::from([format!("{}/home/a", base)])
    );
}

#[tokio::test]
async fn test_service_unavailable_is_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());

    // Mounted first, so it answers the first request only
    Mock::given(method("GET"))
        .and(path("/home/a"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/home/a", article("Hypertension overview", &[]), 1).await;

    let report = crawl(config.clone(), CrawlOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.counter(counters::SUCCESSFUL_DOWNLOADS), 1);
    assert_eq!(report.counter(counters::FAILED_DOWNLOADS), 0);
    assert_eq!(report.counter(counters::NEW_ARTICLES_CREATED), 1);
    assert!(report.recent_errors.is_empty());
}

#[tokio::test]
async fn test_landing_page_is_skipped_but_followed() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());

    mount_page(&server, "/home/a", landing(&["/home/b", "/home/c"]), 1).await;
    mount_page(&server, "/home/b", article("Heart failure basics", &[]), 1).await;
    mount_page(&server, "/home/c", article("Stroke prevention", &[]), 1).await;

    let report = crawl(config.clone(), CrawlOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.counter(counters::LANDING_PAGES_SKIPPED), 1);
    assert_eq!(report.counter(counters::NEW_ARTICLES_CREATED), 2);
    assert_eq!(report.counter(counters::URLS_PROCESSED), 3);

    let store = SqliteStore::open(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(store.article_count().unwrap(), 2);
    assert!(store
        .find_by_url(&format!("{}/home/a", base))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unchanged_article_is_touched_not_rewritten() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());
    let url = format!("{}/home/a", base);

    mount_page(&server, "/home/a", article("Hypertension overview", &[]), 2).await;

    let first = crawl(config.clone(), CrawlOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.counter(counters::NEW_ARTICLES_CREATED), 1);

    let fingerprint = SqliteStore::open(Path::new(&config.output.database_path))
        .unwrap()
        .find_by_url(&url)
        .unwrap()
        .expect("article stored");

    let fresh = CrawlOptions {
        reset_state: true,
        ..CrawlOptions::default()
    };
    let second = crawl(config.clone(), fresh, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.counter(counters::NEW_ARTICLES_CREATED), 0);
    assert_eq!(second.counter(counters::EXISTING_ARTICLES_UPDATED), 1);

    let store = SqliteStore::open(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(store.article_count().unwrap(), 1);
    assert_eq!(store.find_by_url(&url).unwrap(), Some(fingerprint));
}

#[tokio::test]
async fn test_cancelled_crawl_fetches_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base, dir.path());

    mount_page(&server, "/home/a", article("Hypertension overview", &[]), 0).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = crawl(config.clone(), CrawlOptions::default(), cancel)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Interrupted);
    let checkpoint = read_checkpoint(&config);
    assert_eq!(
        url_set(&checkpoint["pendingUrls"]),
        HashSet::from([format!("{}/home/a", base)])
    );
}
