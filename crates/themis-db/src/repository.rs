//! Document repository for PostgreSQL with pgvector support.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use pgvector::Vector;
use sqlx::{PgPool, Pool, Postgres};
use themis_core::error::AppError;
use themis_core::models::{
    DocumentIdentity, DocumentRecord, DocumentStats, EmbeddingChunk, HarvestedDocument, Section,
    StoredDocument,
};
use tracing::debug;

/// Column list for SELECT queries. Must remain a const literal since
/// format!() bypasses sqlx compile-time validation.
const DOCUMENT_COLUMNS: &str = "identity, category, title, decision_date, court, case_number, full_text, full_text_html, first_seen_at, last_updated_at";

/// Repository for documents, their sections and embedding chunks.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use themis_db::DocumentRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/themis")
///     .await?;
///
/// let repo = DocumentRepository::new(pool);
/// println!("{} documents", repo.count().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentRepository {
    pool: Pool<Postgres>,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a batch of harvested documents in one statement.
    ///
    /// On conflict, present fields overwrite stored ones and absent fields keep
    /// the stored value, so a search hit without text never erases full text
    /// obtained by enrichment. The category of first discovery is kept.
    /// Returns the number of rows written.
    pub async fn upsert_batch(&self, documents: &[HarvestedDocument]) -> Result<u64, AppError> {
        if documents.is_empty() {
            return Ok(0);
        }

        // ON CONFLICT cannot touch the same row twice in one statement.
        let mut latest: HashMap<&DocumentIdentity, &HarvestedDocument> = HashMap::new();
        for doc in documents {
            latest.insert(&doc.identity, doc);
        }

        let mut identities = Vec::with_capacity(latest.len());
        let mut categories = Vec::with_capacity(latest.len());
        let mut titles: Vec<Option<String>> = Vec::with_capacity(latest.len());
        let mut dates: Vec<Option<NaiveDate>> = Vec::with_capacity(latest.len());
        let mut courts: Vec<Option<String>> = Vec::with_capacity(latest.len());
        let mut case_numbers: Vec<Option<String>> = Vec::with_capacity(latest.len());
        let mut full_texts: Vec<Option<String>> = Vec::with_capacity(latest.len());
        let mut metadata: Vec<serde_json::Value> = Vec::with_capacity(latest.len());

        for doc in latest.into_values() {
            identities.push(doc.identity.as_str().to_string());
            categories.push(doc.category.clone());
            titles.push(doc.title.clone());
            dates.push(doc.decision_date);
            courts.push(doc.court.clone());
            case_numbers.push(doc.case_number.clone());
            full_texts.push(doc.full_text.clone());
            metadata.push(match &doc.metadata {
                serde_json::Value::Object(_) => doc.metadata.clone(),
                _ => serde_json::json!({}),
            });
        }

        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                identity, category, title, decision_date, court, case_number, full_text, metadata,
                last_updated_at
            )
            SELECT *, NOW() FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::date[], $5::text[], $6::text[], $7::text[],
                $8::jsonb[]
            )
            ON CONFLICT (identity)
            DO UPDATE SET
                category = COALESCE(documents.category, EXCLUDED.category),
                title = COALESCE(EXCLUDED.title, documents.title),
                decision_date = COALESCE(EXCLUDED.decision_date, documents.decision_date),
                court = COALESCE(EXCLUDED.court, documents.court),
                case_number = COALESCE(EXCLUDED.case_number, documents.case_number),
                full_text = COALESCE(EXCLUDED.full_text, documents.full_text),
                metadata = documents.metadata || EXCLUDED.metadata,
                last_updated_at = NOW()
            "#,
        )
        .bind(&identities)
        .bind(&categories)
        .bind(&titles)
        .bind(&dates)
        .bind(&courts)
        .bind(&case_numbers)
        .bind(&full_texts)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        debug!(rows = result.rows_affected(), "Upserted document batch");
        Ok(result.rows_affected())
    }

    /// Stores the full text obtained by enrichment, creating the row if the
    /// identity was never harvested.
    pub async fn upsert_full_text(&self, record: &DocumentRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                identity, title, case_number, full_text, full_text_html, source_url, last_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (identity)
            DO UPDATE SET
                title = COALESCE(EXCLUDED.title, documents.title),
                case_number = COALESCE(EXCLUDED.case_number, documents.case_number),
                full_text = EXCLUDED.full_text,
                full_text_html = COALESCE(EXCLUDED.full_text_html, documents.full_text_html),
                source_url = COALESCE(EXCLUDED.source_url, documents.source_url),
                last_updated_at = NOW()
            "#,
        )
        .bind(record.identity.as_str())
        .bind(&record.title)
        .bind(&record.case_number)
        .bind(&record.full_text)
        .bind(&record.full_text_html)
        .bind(&record.source_url)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    /// Retrieves a document by identity.
    pub async fn get(&self, id: &DocumentIdentity) -> Result<Option<StoredDocument>, AppError> {
        let query = format!("SELECT {} FROM documents WHERE identity = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(row.map(DocumentRow::into_stored))
    }

    /// Replaces all sections of a document in one transaction.
    pub async fn replace_sections(
        &self,
        id: &DocumentIdentity,
        sections: &[Section],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;

        sqlx::query("DELETE FROM document_sections WHERE identity = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

        if !sections.is_empty() {
            let positions: Vec<i32> = sections.iter().map(|s| s.position as i32).collect();
            let kinds: Vec<&str> = sections.iter().map(|s| s.kind.as_str()).collect();
            let headings: Vec<Option<String>> = sections.iter().map(|s| s.heading.clone()).collect();
            let texts: Vec<&str> = sections.iter().map(|s| s.text.as_str()).collect();

            sqlx::query(
                r#"
                INSERT INTO document_sections (identity, position, kind, heading, text)
                SELECT $1, * FROM UNNEST($2::int4[], $3::text[], $4::text[], $5::text[])
                "#,
            )
            .bind(id.as_str())
            .bind(&positions)
            .bind(&kinds)
            .bind(&headings)
            .bind(&texts)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(())
    }

    /// Deletes every embedding chunk of a document.
    pub async fn delete_chunks(&self, id: &DocumentIdentity) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE identity = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(result.rows_affected())
    }

    /// Upserts one embedding chunk by (identity, section kind, chunk index).
    pub async fn upsert_chunk(&self, chunk: &EmbeddingChunk) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO document_chunks (identity, section_kind, chunk_index, content, embedding)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity, section_kind, chunk_index)
            DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                created_at = NOW()
            "#,
        )
        .bind(chunk.identity.as_str())
        .bind(chunk.section_kind.as_str())
        .bind(chunk.chunk_index as i32)
        .bind(&chunk.content)
        .bind(Vector::from(chunk.embedding.clone()))
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(count)
    }

    /// Identities without usable full text, oldest first.
    pub async fn list_missing_full_text(
        &self,
        min_chars: usize,
        limit: usize,
    ) -> Result<Vec<DocumentIdentity>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT identity
            FROM documents
            WHERE full_text IS NULL
               OR char_length(btrim(full_text, E' \t\r\n')) < $1
            ORDER BY first_seen_at, identity
            LIMIT $2
            "#,
        )
        .bind(min_chars as i32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(|(id,)| DocumentIdentity::new(id)).collect())
    }

    pub async fn get_stats(&self) -> Result<DocumentStats, AppError> {
        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents) AS total,
                (SELECT COUNT(*) FROM documents
                    WHERE full_text IS NOT NULL AND btrim(full_text) <> '') AS with_full_text,
                (SELECT COUNT(*) FROM document_sections) AS sections,
                (SELECT COUNT(*) FROM document_chunks) AS chunks,
                (SELECT MAX(last_updated_at) FROM documents) AS last_update
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(DocumentStats {
            total_documents: row.total.unwrap_or(0),
            with_full_text: row.with_full_text.unwrap_or(0),
            total_sections: row.sections.unwrap_or(0),
            total_chunks: row.chunks.unwrap_or(0),
            last_update: row.last_update,
        })
    }

    /// Checks database connectivity by executing a simple query.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    identity: String,
    category: Option<String>,
    title: Option<String>,
    decision_date: Option<NaiveDate>,
    court: Option<String>,
    case_number: Option<String>,
    full_text: Option<String>,
    full_text_html: Option<String>,
    first_seen_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_stored(self) -> StoredDocument {
        StoredDocument {
            identity: DocumentIdentity::new(self.identity),
            category: self.category,
            title: self.title,
            decision_date: self.decision_date,
            court: self.court,
            case_number: self.case_number,
            full_text: self.full_text,
            full_text_html: self.full_text_html,
            first_seen_at: self.first_seen_at,
            last_updated_at: self.last_updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total: Option<i64>,
    with_full_text: Option<i64>,
    sections: Option<i64>,
    chunks: Option<i64>,
    last_update: Option<DateTime<Utc>>,
}

// =============================================================================
// Trait Implementation: DocumentStore
// =============================================================================

impl themis_core::traits::DocumentStore for DocumentRepository {
    async fn get_document(&self, id: &DocumentIdentity) -> Result<Option<StoredDocument>, AppError> {
        DocumentRepository::get(self, id).await
    }

    async fn save_documents(&self, documents: &[HarvestedDocument]) -> Result<u64, AppError> {
        DocumentRepository::upsert_batch(self, documents).await
    }

    async fn save_document(&self, record: &DocumentRecord) -> Result<(), AppError> {
        DocumentRepository::upsert_full_text(self, record).await
    }

    async fn save_sections(
        &self,
        id: &DocumentIdentity,
        sections: &[Section],
    ) -> Result<(), AppError> {
        DocumentRepository::replace_sections(self, id, sections).await
    }

    async fn clear_chunks(&self, id: &DocumentIdentity) -> Result<(), AppError> {
        DocumentRepository::delete_chunks(self, id).await.map(|_| ())
    }

    async fn store_chunk(&self, chunk: &EmbeddingChunk) -> Result<(), AppError> {
        DocumentRepository::upsert_chunk(self, chunk).await
    }

    async fn count_documents(&self) -> Result<i64, AppError> {
        DocumentRepository::count(self).await
    }

    async fn list_missing_full_text(
        &self,
        min_chars: usize,
        limit: usize,
    ) -> Result<Vec<DocumentIdentity>, AppError> {
        DocumentRepository::list_missing_full_text(self, min_chars, limit).await
    }

    async fn stats(&self) -> Result<DocumentStats, AppError> {
        DocumentRepository::get_stats(self).await
    }
}
