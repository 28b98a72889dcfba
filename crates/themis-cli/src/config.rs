use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use themis_core::{EnrichmentConfig, HarvestConfig, PersistenceMode};

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());
    let dirty = match option_env!("VERGEN_GIT_DIRTY") {
        Some("true") => " (dirty)",
        _ => "",
    };

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown");
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}{dirty}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "themis")]
#[command(
    author,
    version = version_info(),
    about = "Resumable harvester of court decisions"
)]
#[command(after_help = "Examples:
  themis harvest --dry-run
  themis harvest --only 0,2 --date-from 2023-01-01 --incremental
  themis enrich cd-2023-0042 cd-2023-0043
  themis enrich --missing 500
  themis checkpoint labour
  themis stats")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Custom path to categories.toml
    #[arg(long = "config", env = "THEMIS_CATEGORIES", value_name = "PATH", global = true)]
    pub categories_config: Option<PathBuf>,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Upstream endpoints and credentials.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Base URL of the court decision search API (required by harvest)
    #[arg(long, env = "SEARCH_API_URL", global = true)]
    pub search_api_url: Option<String>,

    #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true, global = true)]
    pub search_api_key: Option<String>,

    /// Decision page URL with an `{id}` placeholder (required by enrich)
    #[arg(long, env = "DOCUMENT_PAGE_URL", global = true)]
    pub document_page_url: Option<String>,

    /// Base URL of the structured full-text API
    #[arg(long, env = "DOCUMENT_API_URL", global = true)]
    pub document_api_url: Option<String>,

    /// OpenAI-compatible API key; embeddings are skipped without it
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    #[arg(
        long,
        env = "EMBEDDING_MODEL",
        default_value = "text-embedding-3-small",
        global = true
    )]
    pub embedding_model: String,

    #[arg(long, env = "EMBEDDING_ENDPOINT", global = true)]
    pub embedding_endpoint: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover decisions for every enabled category and persist them
    Harvest(HarvestArgs),

    /// Fetch full text, sections and embeddings of stored decisions
    #[command(after_help = "Examples:
  themis enrich cd-2023-0042 cd-2023-0043
  themis enrich --missing 500 --concurrency 8")]
    Enrich(EnrichArgs),

    /// Show the checkpoint of a category for the given harvest settings
    Checkpoint {
        /// Category name from categories.toml
        category: String,

        /// Justice-kind filter the checkpoint was written with
        #[arg(long)]
        justice_kind: Option<String>,
    },

    /// Show document store statistics
    Stats,
}

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Stop after this many unique documents
    #[arg(long, default_value = "10000")]
    pub max_documents: usize,

    /// Count only, persist nothing and write no checkpoint
    #[arg(long)]
    pub dry_run: bool,

    /// Lower date bound (YYYY-MM-DD); one year back when unset
    #[arg(long)]
    pub date_from: Option<NaiveDate>,

    /// Upper date bound (YYYY-MM-DD); today when unset
    #[arg(long)]
    pub date_to: Option<NaiveDate>,

    #[arg(long, default_value = "50")]
    pub page_size: usize,

    /// Page ceiling per keyword and window
    #[arg(long, default_value = "100")]
    pub max_pages: usize,

    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    #[arg(long, default_value = "30")]
    pub window_days: u32,

    /// Keyword/window tasks searched in parallel
    #[arg(long, default_value = "3")]
    pub window_concurrency: usize,

    /// Only run these category positions (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "INDEX")]
    pub only: Option<Vec<usize>>,

    /// Skip these category positions (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "INDEX")]
    pub skip: Vec<usize>,

    #[arg(long)]
    pub justice_kind: Option<String>,

    #[arg(long)]
    pub order_by: Option<String>,

    /// Pause between two pages of one task, in milliseconds
    #[arg(long, default_value = "500")]
    pub page_delay_ms: u64,

    /// Wait after a failed page, in milliseconds
    #[arg(long, default_value = "3000")]
    pub error_backoff_ms: u64,

    /// Pause after every batch flush, in milliseconds
    #[arg(long, default_value = "1000")]
    pub batch_pause_ms: u64,

    /// Send documents to the remote enrichment endpoint instead of the database
    #[arg(long, requires = "remote_url")]
    pub remote: bool,

    #[arg(long, env = "REMOTE_INGEST_URL")]
    pub remote_url: Option<String>,

    #[arg(long, env = "REMOTE_INGEST_KEY", hide_env_values = true)]
    pub remote_key: Option<String>,

    /// Resume completed categories from their last run date
    #[arg(long)]
    pub incremental: bool,
}

impl HarvestArgs {
    pub fn to_config(&self) -> HarvestConfig {
        let mut config = HarvestConfig::default()
            .with_max_documents(self.max_documents)
            .with_page_size(self.page_size)
            .with_max_pages(self.max_pages)
            .with_batch_size(self.batch_size)
            .with_window_days(self.window_days)
            .with_window_concurrency(self.window_concurrency)
            .with_delays(
                Duration::from_millis(self.page_delay_ms),
                Duration::from_millis(self.error_backoff_ms),
                Duration::from_millis(self.batch_pause_ms),
            );

        if self.date_from.is_some() || self.date_to.is_some() {
            let from = self.date_from.unwrap_or(config.date_from);
            config = config.with_date_range(from, self.date_to);
        }
        if self.dry_run {
            config = config.with_dry_run();
        }
        if self.remote {
            config = config.with_persistence(PersistenceMode::Remote);
        }
        if self.incremental {
            config = config.with_incremental();
        }

        config.skip_categories = self.skip.clone();
        config.only_categories = self.only.clone();
        config.justice_kind = self.justice_kind.clone();
        config.order_by = self.order_by.clone();
        config
    }
}

#[derive(Args, Debug)]
pub struct EnrichArgs {
    /// Document identities to enrich
    #[arg(value_name = "IDS", required_unless_present = "missing")]
    pub ids: Vec<String>,

    /// Enrich up to N stored documents lacking full text
    #[arg(long, value_name = "N", conflicts_with = "ids")]
    pub missing: Option<usize>,

    /// Simultaneous fetch/parse/embed operations
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    /// Minimum milliseconds between two fetches
    #[arg(long, default_value = "1000")]
    pub min_interval_ms: u64,

    /// Stored text at least this long is not fetched again
    #[arg(long, default_value = "500")]
    pub min_full_text_chars: usize,

    /// Skip embedding generation
    #[arg(long)]
    pub no_embeddings: bool,

    /// Only scrape the public page, never the structured API
    #[arg(long)]
    pub no_direct: bool,
}

impl EnrichArgs {
    pub fn to_config(&self, embeddings_available: bool) -> EnrichmentConfig {
        let mut config = EnrichmentConfig::default()
            .with_concurrency(self.concurrency)
            .with_min_request_interval(Duration::from_millis(self.min_interval_ms))
            .with_min_full_text_chars(self.min_full_text_chars)
            .with_direct_lookup(!self.no_direct);

        if self.no_embeddings || !embeddings_available {
            config = config.without_embeddings();
        }
        config
    }
}
