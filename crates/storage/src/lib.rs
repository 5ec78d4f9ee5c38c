use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use hiddencrawl_core::Site;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct PageInsert<'a> {
    pub site_id: i64,
    pub url: &'a str,
    pub title: &'a str,
    pub body_text: &'a str,
    pub raw_html: &'a str,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MediaInsert<'a> {
    pub page_id: i64,
    pub source_url: &'a str,
    pub category: &'a str,
    pub mime_type: Option<&'a str>,
    pub bucket: &'a str,
    pub object_key: &'a str,
    pub size_bytes: i64,
    pub inline_bytes: Option<&'a [u8]>,
    pub downloaded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    /// Inserts the site if it's new, otherwise returns the existing row untouched.
    pub async fn upsert_site(&self, url: &str, is_onion: bool, is_i2p: bool) -> Result<Site> {
        let row: (i64, String, bool, bool, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"INSERT INTO sites (url, is_onion, is_i2p)
               VALUES ($1, $2, $3)
               ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url
               RETURNING id, url, is_onion, is_i2p, last_crawled"#,
        )
        .bind(url)
        .bind(is_onion)
        .bind(is_i2p)
        .fetch_one(&self.pool)
        .await?;

        Ok(Site {
            id: row.0,
            url: row.1,
            is_onion: row.2,
            is_i2p: row.3,
            last_crawled: row.4,
        })
    }

    pub async fn touch_site_last_crawled(&self, site_id: i64) -> Result<()> {
        sqlx::query("UPDATE sites SET last_crawled = NOW() WHERE id = $1")
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Appends a fetched page as a new row. Every fetch of a URL gets its own
    /// row keyed on `(site_id, url, fetched_at)` — history is never mutated;
    /// the conflict target only guards against a literal duplicate insert of
    /// the same page at the same instant.
    pub async fn insert_page(&self, page: PageInsert<'_>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO pages (site_id, url, title, body_text, raw_html, depth, fetched_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (site_id, url, fetched_at) DO UPDATE SET
                   title = EXCLUDED.title,
                   body_text = EXCLUDED.body_text,
                   raw_html = EXCLUDED.raw_html
               RETURNING id"#,
        )
        .bind(page.site_id)
        .bind(page.url)
        .bind(page.title)
        .bind(page.body_text)
        .bind(page.raw_html)
        .bind(page.depth as i32)
        .bind(page.fetched_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// True if this exact (page, source URL) media reference has already been stored.
    pub async fn media_exists(&self, page_id: i64, source_url: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM media_files WHERE page_id = $1 AND source_url = $2",
        )
        .bind(page_id)
        .bind(source_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn insert_media(&self, media: MediaInsert<'_>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO media_files (page_id, source_url, category, mime_type, bucket, object_key, size_bytes, inline_bytes, downloaded_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (page_id, source_url) DO UPDATE SET downloaded_at = EXCLUDED.downloaded_at
               RETURNING id"#,
        )
        .bind(media.page_id)
        .bind(media.source_url)
        .bind(media.category)
        .bind(media.mime_type)
        .bind(media.bucket)
        .bind(media.object_key)
        .bind(media.size_bytes)
        .bind(media.inline_bytes)
        .bind(media.downloaded_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_page_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_media_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_files")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_site_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sites")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
