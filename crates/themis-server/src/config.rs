use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use themis_core::{EnrichmentConfig, HarvestConfig, PersistenceMode};

/// Server configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug, Clone)]
#[command(name = "themis-server")]
#[command(author, version, about = "REST API server for Themis harvest and enrichment jobs")]
pub struct ServerConfig {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Path to categories.toml
    #[arg(long, env = "THEMIS_CATEGORIES")]
    pub categories_config: Option<PathBuf>,

    /// Bearer token for the job-launching endpoints. Unset disables them.
    #[arg(long, env = "THEMIS_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Requests per second allowed per client IP
    #[arg(long, env = "RATE_LIMIT_RPS", default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_rps: u32,

    /// Burst size of the per-client rate limit
    #[arg(long, env = "RATE_LIMIT_BURST", default_value = "20", value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_burst: u32,

    /// Comma-separated allowed CORS origins, or "*"
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    // -------------------------------------------------------------------------
    // Upstreams
    // -------------------------------------------------------------------------
    /// Base URL of the court decision search API
    #[arg(long, env = "SEARCH_API_URL")]
    pub search_api_url: String,

    #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Public decision page URL with an `{id}` placeholder
    #[arg(long, env = "DOCUMENT_PAGE_URL")]
    pub document_page_url: String,

    /// Base URL of the structured full-text API
    #[arg(long, env = "DOCUMENT_API_URL")]
    pub document_api_url: Option<String>,

    /// Remote enrichment endpoint; enables remote persistence
    #[arg(long, env = "REMOTE_INGEST_URL")]
    pub remote_ingest_url: Option<String>,

    #[arg(long, env = "REMOTE_INGEST_KEY", hide_env_values = true)]
    pub remote_ingest_key: Option<String>,

    /// OpenAI-compatible API key; embeddings are disabled without it
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    pub embedding_endpoint: Option<String>,

    // -------------------------------------------------------------------------
    // Job defaults (harvest requests may override some of these)
    // -------------------------------------------------------------------------
    #[arg(long, env = "HARVEST_MAX_DOCUMENTS", default_value = "10000")]
    pub max_documents: usize,

    /// Lower date bound of harvests; one year back when unset
    #[arg(long, env = "HARVEST_DATE_FROM")]
    pub date_from: Option<NaiveDate>,

    #[arg(long, env = "HARVEST_PAGE_SIZE", default_value = "50")]
    pub page_size: usize,

    #[arg(long, env = "HARVEST_WINDOW_DAYS", default_value = "30")]
    pub window_days: u32,

    #[arg(long, env = "HARVEST_WINDOW_CONCURRENCY", default_value = "3")]
    pub window_concurrency: usize,

    /// Advance the lower date bound of completed categories
    #[arg(long, env = "HARVEST_INCREMENTAL")]
    pub incremental: bool,

    #[arg(long, env = "ENRICH_CONCURRENCY", default_value = "4")]
    pub enrich_concurrency: usize,

    /// Minimum milliseconds between two document fetches
    #[arg(long, env = "ENRICH_MIN_INTERVAL_MS", default_value = "1000")]
    pub min_request_interval_ms: u64,
}

impl ServerConfig {
    /// Harvest defaults shared by every job launched by this server.
    pub fn harvest_config(&self) -> HarvestConfig {
        let mut config = HarvestConfig::default()
            .with_max_documents(self.max_documents)
            .with_page_size(self.page_size)
            .with_window_days(self.window_days)
            .with_window_concurrency(self.window_concurrency);

        if let Some(from) = self.date_from {
            config = config.with_date_range(from, None);
        }
        if self.remote_ingest_url.is_some() {
            config = config.with_persistence(PersistenceMode::Remote);
        }
        if self.incremental {
            config = config.with_incremental();
        }
        config
    }

    pub fn enrichment_config(&self) -> EnrichmentConfig {
        let mut config = EnrichmentConfig::default()
            .with_concurrency(self.enrich_concurrency)
            .with_min_request_interval(Duration::from_millis(self.min_request_interval_ms))
            .with_direct_lookup(self.document_api_url.is_some());

        if self.openai_api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            config = config.without_embeddings();
        }
        config
    }
}
