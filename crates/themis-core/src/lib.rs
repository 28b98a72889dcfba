//! Themis Core - Domain types, business logic, and services.
//!
//! This crate provides the core functionality for Themis, a resumable
//! harvester of court decisions:
//!
//! - **Crawl planning**: [`generate_windows`], [`CrawlPlan`]
//! - **Services**: [`HarvestService`] for windowed discovery and persistence,
//!   [`EnrichmentService`] for full-text backfill, sectioning and embeddings
//! - **Shared run state**: [`DedupSet`], [`PersistenceBatcher`], [`ConcurrencyGate`],
//!   [`IntervalLimiter`]
//! - **Observability**: [`JobTracker`] / [`JobRegistry`] and the
//!   [`ProgressReporter`] trait
//! - **Traits**: [`SearchClient`], [`DocumentFetcher`], [`DocumentStore`],
//!   [`CheckpointStore`], [`EmbeddingProvider`], [`RemoteIngest`]
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O through the traits above.
//! `themis-client` implements the HTTP side, `themis-db` the PostgreSQL side,
//! and `themis-server` / `themis-cli` wire them together.
//!
//! # Example
//!
//! ```ignore
//! use themis_core::{HarvestConfig, HarvestService, TracingReporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let harvest = HarvestService::new(search, store, checkpoints, None, HarvestConfig::default());
//! let summary = harvest
//!     .harvest_cancellable(&categories, &TracingReporter, None, CancellationToken::new())
//!     .await?;
//! println!("{} unique documents", summary.unique_documents);
//! ```

pub mod batcher;
pub mod checkpoint;
pub mod config;
pub mod dedup;
pub mod enrich;
pub mod error;
pub mod gate;
pub mod harvest;
pub mod job;
pub mod models;
pub mod plan;
pub mod progress;
pub mod rate_limit;
pub mod sections;
pub mod stats;
pub mod traits;

// Configuration
pub use config::{
    CategoriesConfig, DbConfig, EnrichmentConfig, HarvestConfig, HttpConfig, PersistenceMode,
    SearchCategory, default_config_path, load_categories_config,
};

// Error handling
pub use error::AppError;

// Domain models
pub use models::{
    DocumentIdentity, DocumentRecord, DocumentStats, EmbeddingChunk, FetchedDocument,
    HarvestedDocument, ScrapeResult, Section, SectionKind, StoredDocument,
};

// Crawl planning
pub use plan::{CategoryPlan, CrawlPlan, CrawlTask, DateWindow, generate_windows};

// Shared run state
pub use batcher::{BatcherSettings, PersistenceBatcher};
pub use dedup::{Admission, DedupSet};
pub use gate::{ConcurrencyGate, GatePermit, QueueDepth};
pub use rate_limit::IntervalLimiter;

// Checkpoints
pub use checkpoint::{
    CheckpointConfig, CheckpointProgress, CheckpointStatus, CheckpointUpdate, ScrapeCheckpoint,
};

// Jobs and statistics
pub use job::{BulkScrapeJob, JobKind, JobRegistry, JobStatus, JobTracker};
pub use stats::{BatchStats, CategoryStats, HarvestSummary};

// Progress reporting
pub use progress::{HarvestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{
    CheckpointStore, DocumentFetcher, DocumentStore, EmbeddingProvider, NoEmbeddings,
    NoRemoteIngest, RemoteIngest, SearchClient, SearchPage, SearchQuery,
};

// Services (generic over trait implementations)
pub use enrich::EnrichmentService;
pub use harvest::HarvestService;
pub use sections::{chunk_text, extract_sections};
