//! Database schema definitions
//!
//! All SQL schema definitions for the article database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per article, keyed by normalized URL
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    quality_score INTEGER NOT NULL,
    word_count INTEGER NOT NULL,
    language TEXT NOT NULL,
    version TEXT NOT NULL,
    category TEXT,
    author TEXT,
    reviewed_at TEXT,
    description TEXT,
    keywords TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_language ON articles(language);
CREATE INDEX IF NOT EXISTS idx_articles_version ON articles(version);

-- Medical terms found in each article
CREATE TABLE IF NOT EXISTS article_terms (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    term TEXT NOT NULL,
    frequency INTEGER NOT NULL,
    PRIMARY KEY (article_id, term)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_article_terms_term ON article_terms(term);

-- Images, videos and downloads referenced by each article
CREATE TABLE IF NOT EXISTS article_media (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    kind TEXT NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (article_id, url)
) WITHOUT ROWID;
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - SQLite connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
