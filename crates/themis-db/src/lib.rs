//! Themis DB - PostgreSQL persistence with pgvector.
//!
//! The main components are:
//! - [`DocumentRepository`] - documents, sections and embedding chunks
//! - [`CheckpointRepository`] - durable scrape checkpoints
//!
//! Both implement the corresponding `themis-core` traits. The schema lives in
//! `migrations/` and is applied with [`MIGRATOR`].

mod checkpoint_repository;
mod repository;

pub use checkpoint_repository::CheckpointRepository;
pub use repository::DocumentRepository;

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Applies pending migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), themis_core::AppError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| themis_core::AppError::DatabaseError(e.into()))
}
