//! Checkpoint repository for resumable harvesting.
//!
//! One row per search configuration, keyed by
//! [`CheckpointConfig::config_hash`]. Every completed page upserts the row, so
//! a crashed run resumes from the last page written here.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use themis_core::checkpoint::{
    CheckpointConfig, CheckpointStatus, CheckpointUpdate, ScrapeCheckpoint,
};
use themis_core::error::AppError;

const CHECKPOINT_COLUMNS: &str = "config_hash, category_form, keywords, justice_kind, last_page, documents_scraped, documents_failed, status, last_error, last_scraped_at, updated_at";

/// Repository for scrape checkpoints.
#[derive(Clone)]
pub struct CheckpointRepository {
    pool: Pool<Postgres>,
}

impl CheckpointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, config_hash: &str) -> Result<Option<ScrapeCheckpoint>, AppError> {
        let query = format!(
            "SELECT {} FROM scrape_checkpoints WHERE config_hash = $1",
            CHECKPOINT_COLUMNS
        );
        let row = sqlx::query_as::<_, CheckpointRow>(&query)
            .bind(config_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// Creates or updates the checkpoint of `config`.
    ///
    /// `last_scraped_at` is set to now only when the new status is terminal;
    /// in-progress writes keep the previous value.
    pub async fn upsert(
        &self,
        config: &CheckpointConfig,
        update: &CheckpointUpdate,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO scrape_checkpoints (
                config_hash, category_form, keywords, justice_kind, last_page,
                documents_scraped, documents_failed, status, last_error, last_scraped_at,
                updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                CASE WHEN $8 IN ('completed', 'failed') THEN NOW() ELSE NULL END,
                NOW()
            )
            ON CONFLICT (config_hash)
            DO UPDATE SET
                category_form = EXCLUDED.category_form,
                keywords = EXCLUDED.keywords,
                justice_kind = EXCLUDED.justice_kind,
                last_page = EXCLUDED.last_page,
                documents_scraped = EXCLUDED.documents_scraped,
                documents_failed = EXCLUDED.documents_failed,
                status = EXCLUDED.status,
                last_error = EXCLUDED.last_error,
                last_scraped_at = CASE
                    WHEN EXCLUDED.status IN ('completed', 'failed') THEN NOW()
                    ELSE scrape_checkpoints.last_scraped_at
                END,
                updated_at = NOW()
            "#,
        )
        .bind(config.config_hash())
        .bind(&config.category_form)
        .bind(config.keyword_set())
        .bind(&config.justice_kind)
        .bind(update.last_page as i32)
        .bind(update.documents_scraped as i64)
        .bind(update.documents_failed as i64)
        .bind(update.status.as_str())
        .bind(&update.error)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    /// All checkpoints, most recently updated first.
    pub async fn list(&self) -> Result<Vec<ScrapeCheckpoint>, AppError> {
        let query = format!(
            "SELECT {} FROM scrape_checkpoints ORDER BY updated_at DESC",
            CHECKPOINT_COLUMNS
        );
        let rows = sqlx::query_as::<_, CheckpointRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    config_hash: String,
    category_form: Option<String>,
    keywords: Vec<String>,
    justice_kind: Option<String>,
    last_page: i32,
    documents_scraped: i64,
    documents_failed: i64,
    status: String,
    last_error: Option<String>,
    last_scraped_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<ScrapeCheckpoint, AppError> {
        let status: CheckpointStatus = self
            .status
            .parse()
            .map_err(|e: themis_core::checkpoint::ParseCheckpointStatusError| {
                AppError::Generic(e.to_string())
            })?;

        Ok(ScrapeCheckpoint {
            config_hash: self.config_hash,
            category_form: self.category_form,
            keywords: self.keywords,
            justice_kind: self.justice_kind,
            last_page: self.last_page.max(0) as u32,
            documents_scraped: self.documents_scraped.max(0) as u64,
            documents_failed: self.documents_failed.max(0) as u64,
            status,
            last_error: self.last_error,
            last_scraped_at: self.last_scraped_at,
            updated_at: self.updated_at,
        })
    }
}

// =============================================================================
// Trait Implementation: CheckpointStore
// =============================================================================

impl themis_core::traits::CheckpointStore for CheckpointRepository {
    async fn get_checkpoint(
        &self,
        config: &CheckpointConfig,
    ) -> Result<Option<ScrapeCheckpoint>, AppError> {
        CheckpointRepository::get(self, &config.config_hash()).await
    }

    async fn upsert_checkpoint(
        &self,
        config: &CheckpointConfig,
        update: &CheckpointUpdate,
    ) -> Result<(), AppError> {
        CheckpointRepository::upsert(self, config, update).await
    }
}
