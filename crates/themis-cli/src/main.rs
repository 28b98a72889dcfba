mod config;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use themis_client::{
    DocumentPageClient, EmbeddingProviderEnum, RemoteIngestClient, SearchApiClient,
};
use themis_core::{
    AppError, CategoriesConfig, CheckpointConfig, DbConfig, DocumentIdentity, EmbeddingProvider,
    EnrichmentService, HarvestService, HarvestSummary, HttpConfig, PersistenceMode, ScrapeResult,
    TracingReporter, load_categories_config,
};
use themis_db::{CheckpointRepository, DocumentRepository};

use crate::config::{Command, Config, EnrichArgs, HarvestArgs, UpstreamArgs};

const BANNER: &str = "═══════════════════════════════════════════════════════════";
const RULE: &str = "───────────────────────────────────────────────────────────";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // stderr keeps stdout clean for piping
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::parse();

    if let Err(e) = run(config).await {
        match e.downcast_ref::<AppError>() {
            Some(app_error) => error!("{}", app_error.user_message()),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("Connecting to database...");
    let db_config = DbConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    themis_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let documents = DocumentRepository::new(pool.clone());
    let checkpoints = CheckpointRepository::new(pool);

    match config.command {
        Command::Harvest(args) => {
            let categories = require_categories(config.categories_config)?;
            handle_harvest(&config.upstream, &args, &categories, documents, checkpoints).await?;
        }
        Command::Enrich(args) => {
            handle_enrich(&config.upstream, &args, documents).await?;
        }
        Command::Checkpoint {
            category,
            justice_kind,
        } => {
            let categories = require_categories(config.categories_config)?;
            show_checkpoint(&categories, &category, justice_kind.as_deref(), &checkpoints)
                .await?;
        }
        Command::Stats => {
            show_stats(&documents).await?;
        }
    }
    Ok(())
}

fn require_categories(path: Option<std::path::PathBuf>) -> anyhow::Result<CategoriesConfig> {
    load_categories_config(path)?.ok_or_else(|| {
        anyhow::anyhow!(
            "No configuration file found. Create ~/.config/themis/categories.toml or use --config"
        )
    })
}

/// Cancels the returned token on Ctrl+C so runs stop at their next checkpoint.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight work and flushing...");
            child.cancel();
        }
    });
    token
}

async fn handle_harvest(
    upstream: &UpstreamArgs,
    args: &HarvestArgs,
    categories: &CategoriesConfig,
    documents: DocumentRepository,
    checkpoints: CheckpointRepository,
) -> anyhow::Result<()> {
    let http = HttpConfig::default();
    let search_url = upstream
        .search_api_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SEARCH_API_URL (or --search-api-url) is required"))?;

    let mut search = SearchApiClient::with_http_config(search_url, http.clone())
        .context("Invalid SEARCH_API_URL")?;
    if let Some(key) = &upstream.search_api_key {
        search = search.with_api_key(key.clone());
    }

    let harvest_config = args.to_config();
    let remote = match (&harvest_config.persistence, &args.remote_url) {
        (PersistenceMode::Remote, Some(url)) => {
            let mut client = RemoteIngestClient::with_http_config(url, http)
                .context("Invalid REMOTE_INGEST_URL")?;
            if let Some(key) = &args.remote_key {
                client = client.with_api_key(key.clone());
            }
            Some(client)
        }
        _ => None,
    };

    let enabled = categories.enabled_categories().len();
    info!("{}", BANNER);
    info!(
        "Starting harvest of {} enabled categories ({} configured)",
        enabled,
        categories.categories.len()
    );
    info!(
        "  Range: {} .. {}   Mode: {}{}",
        harvest_config.date_from,
        harvest_config.effective_date_to(),
        harvest_config.persistence,
        if harvest_config.dry_run { " (dry run)" } else { "" }
    );
    info!("{}", BANNER);

    let service = HarvestService::new(search, documents, checkpoints, remote, harvest_config);
    let summary = service
        .harvest_cancellable(
            &categories.categories,
            &TracingReporter,
            None,
            cancel_on_ctrl_c(),
        )
        .await?;

    print_harvest_summary(&summary);
    Ok(())
}

fn print_harvest_summary(summary: &HarvestSummary) {
    info!("");
    info!("{}", BANNER);
    if summary.cancelled {
        info!("HARVEST INTERRUPTED (checkpoints kept, rerun to resume)");
    } else {
        info!("HARVEST COMPLETE");
    }
    info!("{}", BANNER);
    for category in &summary.categories {
        info!(
            "  {:<20} fetched {:>6}  new {:>6}  dup {:>6}  errors {:>4}",
            category.name,
            category.fetched,
            category.new_documents,
            category.duplicates,
            category.errors
        );
    }
    info!("{}", RULE);
    info!("  Unique documents:    {}", summary.unique_documents);
    info!("  Total fetched:       {}", summary.total_fetched());
    info!("  Page errors:         {}", summary.total_errors());
    if summary.dry_run {
        info!("  Dry run: nothing was persisted");
    } else {
        info!("  Persisted:           {}", summary.batches.persisted);
        info!("  Failed documents:    {}", summary.batches.failed_documents);
        if summary.batches.throttled > 0 {
            info!("  Throttled calls:     {}", summary.batches.throttled);
        }
    }
    if let Some(delta) = summary.store_delta() {
        info!("  Store growth:        {:+}", delta);
    }
    if summary.cap_reached {
        info!("  Stopped at the --max-documents cap");
    }
    info!("{}", BANNER);
}

async fn handle_enrich(
    upstream: &UpstreamArgs,
    args: &EnrichArgs,
    documents: DocumentRepository,
) -> anyhow::Result<()> {
    let http = HttpConfig::default();
    let page_url = upstream
        .document_page_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DOCUMENT_PAGE_URL (or --document-page-url) is required"))?;

    let mut fetcher = DocumentPageClient::with_http_config(page_url, http.clone())
        .context("Invalid DOCUMENT_PAGE_URL")?;
    if let Some(base) = &upstream.document_api_url {
        fetcher = fetcher
            .with_direct_base(base)
            .context("Invalid DOCUMENT_API_URL")?;
    }
    if let Some(key) = &upstream.search_api_key {
        fetcher = fetcher.with_api_key(key.clone());
    }

    let embeddings = if args.no_embeddings {
        EmbeddingProviderEnum::disabled()
    } else {
        EmbeddingProviderEnum::from_optional_key(
            upstream.openai_api_key.as_deref(),
            &upstream.embedding_model,
            upstream.embedding_endpoint.as_deref(),
            http,
        )
        .context("Failed to initialize embedding client")?
    };
    if embeddings.is_enabled() {
        info!(
            "Using {} embedding provider ({} dimensions)",
            embeddings.name(),
            embeddings.dimension()
        );
    } else {
        info!("Embeddings disabled");
    }

    let config = args.to_config(embeddings.is_enabled());
    let service = EnrichmentService::new(fetcher, documents, embeddings, config)?;
    let cancel = cancel_on_ctrl_c();

    let results = match args.missing {
        Some(limit) => {
            info!("Enriching up to {} documents lacking full text", limit);
            service
                .enrich_missing(limit, &TracingReporter, None, cancel)
                .await?
        }
        None => {
            let ids: Vec<DocumentIdentity> = args
                .ids
                .iter()
                .map(DocumentIdentity::new)
                .filter(|id| !id.is_empty())
                .collect();
            info!("Enriching {} documents", ids.len());
            service
                .enrich_many(&ids, &TracingReporter, None, cancel)
                .await
        }
    };

    print_enrich_summary(&results);
    Ok(())
}

fn print_enrich_summary(results: &[ScrapeResult]) {
    let failed: Vec<&ScrapeResult> = results.iter().filter(|r| !r.is_success()).collect();
    let cached = results.iter().filter(|r| r.cached).count();
    let sections: usize = results.iter().map(|r| r.sections_count).sum();
    let embeddings: usize = results.iter().map(|r| r.embeddings_count).sum();

    info!("");
    info!("{}", BANNER);
    info!("ENRICHMENT COMPLETE");
    info!("{}", BANNER);
    info!("  Processed:           {}", results.len());
    info!("  Already enriched:    {}", cached);
    info!("  Failed:              {}", failed.len());
    info!("  Sections stored:     {}", sections);
    info!("  Chunks embedded:     {}", embeddings);
    if !failed.is_empty() {
        info!("{}", RULE);
        info!("Failed documents:");
        for result in failed {
            if let Some(err) = &result.error {
                error!("  - {}: {}", result.doc_id, err);
            }
        }
    }
    info!("{}", BANNER);
}

async fn show_checkpoint(
    categories: &CategoriesConfig,
    name: &str,
    justice_kind: Option<&str>,
    checkpoints: &CheckpointRepository,
) -> anyhow::Result<()> {
    let category = categories
        .find_by_name(name)
        .ok_or_else(|| anyhow::anyhow!("Category '{}' not found in configuration", name))?;

    // Dates are not part of the checkpoint key.
    let key = CheckpointConfig::for_category(
        category,
        justice_kind,
        chrono::Utc::now().date_naive(),
        None,
    );

    let Some(checkpoint) = checkpoints.get(&key.config_hash()).await? else {
        println!("\nNo checkpoint for '{}' ({})\n", category.name, key.config_hash());
        return Ok(());
    };

    println!("\nCheckpoint for '{}'\n", category.name);
    println!("  Key:                   {}", checkpoint.config_hash);
    println!("  Status:                {}", checkpoint.status);
    println!("  Last page:             {}", checkpoint.last_page);
    println!("  Documents scraped:     {}", checkpoint.documents_scraped);
    println!("  Failed pages:          {}", checkpoint.documents_failed);
    if let Some(at) = checkpoint.last_scraped_at {
        println!("  Last finished run:     {}", at);
    }
    println!("  Updated:               {}", checkpoint.updated_at);
    if let Some(err) = &checkpoint.last_error {
        println!("  Last error:            {}", err);
    }
    println!();
    Ok(())
}

async fn show_stats(documents: &DocumentRepository) -> anyhow::Result<()> {
    let stats = documents.get_stats().await?;

    println!("\nDocument Statistics\n");
    println!("  Total documents:       {}", stats.total_documents);
    println!("  With full text:        {}", stats.with_full_text);
    println!("  Sections:              {}", stats.total_sections);
    println!("  Embedded chunks:       {}", stats.total_chunks);
    if let Some(last_update) = stats.last_update {
        println!("  Last update:           {}", last_update);
    }
    println!();
    Ok(())
}
