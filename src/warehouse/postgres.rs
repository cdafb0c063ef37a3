//! PostgreSQL [`Warehouse`] backed by a `sqlx` connection pool.
//!
//! # Table
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS news (
//!     id           BIGINT PRIMARY KEY,
//!     title        TEXT NOT NULL,
//!     subtitles    TEXT[] NOT NULL,
//!     publisher    TEXT NOT NULL,
//!     body         TEXT NOT NULL,
//!     images       JSONB NOT NULL,
//!     tags         TEXT[] NOT NULL,
//!     source_url   TEXT NOT NULL,
//!     published_at TIMESTAMPTZ NOT NULL,
//!     fetched_at   TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! `images` holds a JSON array of `{url, caption}` objects.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};

use super::Warehouse;
use crate::error::WarehouseError;
use crate::models::Record;

/// Connection settings for [`PgWarehouse`].
#[derive(Debug, Clone)]
pub struct PgSettings {
    pub database_url: String,
    pub table: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Warehouse writing to one PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
    table: String,
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> Result<&str, WarehouseError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63;
    if valid {
        Ok(name)
    } else {
        Err(WarehouseError::InvalidTableName(name.to_string()))
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id           BIGINT PRIMARY KEY,
            title        TEXT NOT NULL,
            subtitles    TEXT[] NOT NULL,
            publisher    TEXT NOT NULL,
            body         TEXT NOT NULL,
            images       JSONB NOT NULL,
            tags         TEXT[] NOT NULL,
            source_url   TEXT NOT NULL,
            published_at TIMESTAMPTZ NOT NULL,
            fetched_at   TIMESTAMPTZ NOT NULL
        )
        "#
    )
}

fn upsert_sql(table: &str) -> String {
    format!(
        r#"
        INSERT INTO {table} (
            id, title, subtitles, publisher, body, images, tags, source_url, published_at, fetched_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            subtitles = EXCLUDED.subtitles,
            publisher = EXCLUDED.publisher,
            body = EXCLUDED.body,
            images = EXCLUDED.images,
            tags = EXCLUDED.tags,
            source_url = EXCLUDED.source_url,
            published_at = EXCLUDED.published_at,
            fetched_at = EXCLUDED.fetched_at
        "#
    )
}

impl PgWarehouse {
    /// Open the connection pool. Failure here is fatal for the run.
    #[instrument(level = "info", skip_all, fields(table = %settings.table))]
    pub async fn connect(settings: &PgSettings) -> Result<Self, WarehouseError> {
        let table = validate_table_name(&settings.table)?.to_string();
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(settings.acquire_timeout)
            .connect(&settings.database_url)
            .await?;
        info!(max_connections = settings.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool, table })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

impl Warehouse for PgWarehouse {
    #[instrument(level = "info", skip(self), fields(table = %self.table))]
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        sqlx::query(&create_table_sql(&self.table))
            .execute(&self.pool)
            .await?;
        info!("Warehouse table ready");
        Ok(())
    }

    async fn upsert(&self, record: &Record) -> Result<(), WarehouseError> {
        sqlx::query(&upsert_sql(&self.table))
            .bind(record.id)
            .bind(&record.title)
            .bind(&record.subtitles)
            .bind(&record.publisher)
            .bind(&record.body)
            .bind(Json(&record.images))
            .bind(&record.tags)
            .bind(&record.source_url)
            .bind(record.published_at)
            .bind(record.fetched_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("news").is_ok());
        assert!(validate_table_name("_news_2025").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("News").is_err());
        assert!(validate_table_name("news; DROP TABLE x").is_err());
        assert!(validate_table_name("1news").is_err());
    }

    #[test]
    fn test_upsert_overwrites_every_column() {
        let sql = upsert_sql("news");
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET"));
        for column in [
            "title", "subtitles", "publisher", "body", "images", "tags", "source_url", "published_at", "fetched_at",
        ] {
            assert!(
                sql.contains(&format!("{column} = EXCLUDED.{column}")),
                "{column} is not overwritten"
            );
        }
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let sql = create_table_sql("news");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS news"));
        assert!(sql.contains("id           BIGINT PRIMARY KEY"));
    }
}
