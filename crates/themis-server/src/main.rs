//! Themis REST API Server
//!
//! This binary starts the Themis REST API server, exposing endpoints for
//! launching and monitoring harvest and enrichment jobs.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use themis_client::{
    DocumentPageClient, EmbeddingProviderEnum, RemoteIngestClient, SearchApiClient,
};
use themis_core::{DbConfig, EmbeddingProvider, HttpConfig, load_categories_config};

use themis_server::{AppState, ServerConfig, Upstreams, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::parse();

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
    info!("Database connection established");

    let upstreams = build_upstreams(&config)?;
    info!(
        "Using {} embedding provider ({} dimensions)",
        upstreams.embeddings.name(),
        upstreams.embeddings.dimension()
    );

    let categories_config = match &config.categories_config {
        Some(path) => load_categories_config(Some(path.clone()))?,
        None => load_categories_config(None).unwrap_or(None),
    };
    match &categories_config {
        Some(categories) => info!(
            "Loaded {} categories from configuration",
            categories.categories.len()
        ),
        None => info!("No categories configured, harvest jobs are disabled"),
    }

    let shutdown_token = CancellationToken::new();

    let app_state = AppState::new(
        pool,
        upstreams,
        config.harvest_config(),
        config.enrichment_config(),
        categories_config,
        config.admin_token.clone(),
        shutdown_token.clone(),
    )
    .context("Invalid job configuration")?;

    if app_state.admin_token.is_none() {
        info!("THEMIS_ADMIN_TOKEN not set, job endpoints answer 403");
    }

    let app = create_router(app_state, &config)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Starting Themis API server on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token))
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn build_upstreams(config: &ServerConfig) -> anyhow::Result<Upstreams> {
    let http = HttpConfig::default();

    let mut search = SearchApiClient::with_http_config(&config.search_api_url, http.clone())
        .context("Invalid SEARCH_API_URL")?;
    if let Some(key) = &config.search_api_key {
        search = search.with_api_key(key.clone());
    }

    let mut fetcher = DocumentPageClient::with_http_config(&config.document_page_url, http.clone())
        .context("Invalid DOCUMENT_PAGE_URL")?;
    if let Some(base) = &config.document_api_url {
        fetcher = fetcher
            .with_direct_base(base)
            .context("Invalid DOCUMENT_API_URL")?;
    }
    if let Some(key) = &config.search_api_key {
        fetcher = fetcher.with_api_key(key.clone());
    }

    let remote = match &config.remote_ingest_url {
        Some(url) => {
            let mut client = RemoteIngestClient::with_http_config(url, http.clone())
                .context("Invalid REMOTE_INGEST_URL")?;
            if let Some(key) = &config.remote_ingest_key {
                client = client.with_api_key(key.clone());
            }
            Some(client)
        }
        None => None,
    };

    let embeddings = EmbeddingProviderEnum::from_optional_key(
        config.openai_api_key.as_deref(),
        &config.embedding_model,
        config.embedding_endpoint.as_deref(),
        http,
    )
    .context("Failed to initialize embedding client")?;

    Ok(Upstreams {
        search,
        fetcher,
        remote,
        embeddings,
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");

    // Running jobs stop at their next checkpoint and flush what they have
    shutdown_token.cancel();

    tokio::time::sleep(Duration::from_secs(2)).await;
}
