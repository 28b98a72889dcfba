use tokio_util::sync::CancellationToken;

use themis_client::{DocumentPageClient, EmbeddingProviderEnum, RemoteIngestClient, SearchApiClient};
use themis_core::{
    AppError, CategoriesConfig, EnrichmentConfig, EnrichmentService, HarvestConfig,
    HarvestService, JobRegistry,
};
use themis_db::{CheckpointRepository, DocumentRepository};

pub type ServerHarvestService =
    HarvestService<SearchApiClient, DocumentRepository, CheckpointRepository, RemoteIngestClient>;

pub type ServerEnrichmentService =
    EnrichmentService<DocumentPageClient, DocumentRepository, EmbeddingProviderEnum>;

/// Upstream clients, built by the binary from its configuration.
pub struct Upstreams {
    pub search: SearchApiClient,
    pub fetcher: DocumentPageClient,
    pub remote: Option<RemoteIngestClient>,
    pub embeddings: EmbeddingProviderEnum,
}

/// Shared application state for all handlers.
///
/// Every field is cheap to clone: repositories hold the pool, services hold
/// their clients, and the job registry and gate are shared behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Harvest service carrying the server-wide defaults
    pub harvest_service: ServerHarvestService,

    /// Enrichment service; its gate is shared by every enrichment job
    pub enrichment_service: ServerEnrichmentService,

    pub document_repo: DocumentRepository,

    /// In-memory index of the jobs launched since startup
    pub jobs: JobRegistry,

    /// Category taxonomy (loaded from categories.toml)
    pub categories_config: Option<CategoriesConfig>,

    /// Bearer token for protected routes; `None` disables them
    pub admin_token: Option<String>,

    /// Cancellation token for graceful shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    /// Creates the application state with all services initialized.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if `enrichment_config` is invalid.
    pub fn new(
        pool: sqlx::PgPool,
        upstreams: Upstreams,
        harvest_config: HarvestConfig,
        enrichment_config: EnrichmentConfig,
        categories_config: Option<CategoriesConfig>,
        admin_token: Option<String>,
        shutdown_token: CancellationToken,
    ) -> Result<Self, AppError> {
        let document_repo = DocumentRepository::new(pool.clone());
        let checkpoint_repo = CheckpointRepository::new(pool);

        let enrichment_service = EnrichmentService::new(
            upstreams.fetcher,
            document_repo.clone(),
            upstreams.embeddings,
            enrichment_config,
        )?;

        Ok(Self {
            harvest_service: HarvestService::new(
                upstreams.search,
                document_repo.clone(),
                checkpoint_repo,
                upstreams.remote,
                harvest_config,
            ),
            enrichment_service,
            document_repo,
            jobs: JobRegistry::new(),
            categories_config,
            admin_token: admin_token.filter(|t| !t.trim().is_empty()),
            shutdown_token,
        })
    }
}
