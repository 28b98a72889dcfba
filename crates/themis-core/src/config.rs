//! Configuration types for Themis components.
//!
//! Runtime knobs live in plain structs with `Default` impls and `with_*`
//! builders; binaries fill them from flags and environment variables. The
//! category taxonomy is static and loaded from `categories.toml`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

impl DbConfig {
    /// Reads `DB_MAX_CONNECTIONS`, falling back to the default.
    pub fn from_env() -> Self {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &u32| *v > 0)
            .unwrap_or(5);
        Self { max_connections }
    }
}

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Upper bound for any single backoff, including server wait hints.
    pub max_retry_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Harvest Configuration
// =============================================================================

/// Where newly discovered documents are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Bulk upsert of each batch into the document store.
    #[default]
    Direct,
    /// One call per document to the remote enrichment endpoint.
    Remote,
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for PersistenceMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "remote" => Ok(Self::Remote),
            _ => Err(AppError::ConfigError(format!(
                "Unknown persistence mode: '{}'. Valid options: direct, remote",
                s
            ))),
        }
    }
}

/// Configuration of one harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Global cap on unique documents discovered in one run.
    pub max_documents: usize,
    /// Count only: nothing is persisted and no checkpoint is written.
    pub dry_run: bool,
    pub date_from: NaiveDate,
    /// Upper bound of the range; today when unset.
    pub date_to: Option<NaiveDate>,
    pub page_size: usize,
    /// Ceiling on pages fetched for one (keyword, window) task.
    pub max_pages: usize,
    pub batch_size: usize,
    /// Number of (keyword, window) tasks searched in parallel.
    pub window_concurrency: usize,
    pub window_days: u32,
    /// Category indices (position in the taxonomy) to leave out.
    pub skip_categories: Vec<usize>,
    /// When set, only these category indices run.
    pub only_categories: Option<Vec<usize>>,
    /// Optional justice-kind filter, part of the checkpoint key.
    pub justice_kind: Option<String>,
    pub order_by: Option<String>,
    /// Pause between two successful pages of one task.
    pub page_delay: Duration,
    /// Wait after a failed page before moving to the next one.
    pub error_backoff: Duration,
    /// Pause after every batch flush.
    pub batch_pause: Duration,
    pub persistence: PersistenceMode,
    /// Advance the lower date bound of completed checkpoints.
    pub incremental: bool,
    /// Wait applied to a throttled remote call that carried no hint.
    pub throttle_wait: Duration,
    /// Cap on any server-supplied throttle hint.
    pub max_throttle_wait: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_documents: 10_000,
            dry_run: false,
            date_from: Utc::now().date_naive() - TimeDelta::days(365),
            date_to: None,
            page_size: 50,
            max_pages: 100,
            batch_size: 100,
            window_concurrency: 3,
            window_days: 30,
            skip_categories: Vec::new(),
            only_categories: None,
            justice_kind: None,
            order_by: None,
            page_delay: Duration::from_millis(500),
            error_backoff: Duration::from_secs(3),
            batch_pause: Duration::from_secs(1),
            persistence: PersistenceMode::Direct,
            incremental: false,
            throttle_wait: Duration::from_secs(5),
            max_throttle_wait: Duration::from_secs(60),
        }
    }
}

impl HarvestConfig {
    pub fn with_max_documents(mut self, max: usize) -> Self {
        self.max_documents = max;
        self
    }

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_date_range(mut self, from: NaiveDate, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_window_concurrency(mut self, concurrency: usize) -> Self {
        self.window_concurrency = concurrency;
        self
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    pub fn with_persistence(mut self, mode: PersistenceMode) -> Self {
        self.persistence = mode;
        self
    }

    pub fn with_incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    /// Sets every artificial delay (page, backoff, batch pause, throttle) at once.
    ///
    /// Mostly useful for tests and local mirrors of the upstream.
    pub fn with_delays(mut self, page: Duration, backoff: Duration, pause: Duration) -> Self {
        self.page_delay = page;
        self.error_backoff = backoff;
        self.batch_pause = pause;
        self
    }

    /// Upper bound of the date range, defaulting to today.
    pub fn effective_date_to(&self) -> NaiveDate {
        self.date_to.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Rejects configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("max_documents", self.max_documents),
            ("page_size", self.page_size),
            ("max_pages", self.max_pages),
            ("batch_size", self.batch_size),
            ("window_concurrency", self.window_concurrency),
            ("window_days", self.window_days as usize),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AppError::ConfigError(format!("{} must be positive", name)));
            }
        }

        let date_to = self.effective_date_to();
        if date_to < self.date_from {
            return Err(AppError::ConfigError(format!(
                "date range is inverted: {} > {}",
                self.date_from, date_to
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Enrichment Configuration
// =============================================================================

/// Configuration of the full-text enrichment pipeline.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Maximum simultaneous fetch/parse/embed operations.
    pub concurrency: usize,
    /// Minimum interval between two outbound fetches.
    pub min_request_interval: Duration,
    pub generate_embeddings: bool,
    /// Try the direct full-text API before falling back to the page.
    pub direct_lookup: bool,
    /// Stored text at least this long counts as already enriched.
    pub min_full_text_chars: usize,
    /// Operations launched together; progress is recomputed after each batch.
    pub batch_size: usize,
    pub chunk_max_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            min_request_interval: Duration::from_millis(1000),
            generate_embeddings: true,
            direct_lookup: true,
            min_full_text_chars: 500,
            batch_size: 20,
            chunk_max_chars: 2000,
        }
    }
}

impl EnrichmentConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn without_embeddings(mut self) -> Self {
        self.generate_embeddings = false;
        self
    }

    pub fn with_direct_lookup(mut self, enabled: bool) -> Self {
        self.direct_lookup = enabled;
        self
    }

    pub fn with_min_full_text_chars(mut self, min: usize) -> Self {
        self.min_full_text_chars = min;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency == 0 {
            return Err(AppError::ConfigError(
                "enrichment concurrency must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::ConfigError(
                "enrichment batch_size must be positive".to_string(),
            ));
        }
        if self.chunk_max_chars == 0 {
            return Err(AppError::ConfigError(
                "chunk_max_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Category Taxonomy (categories.toml)
// =============================================================================

fn default_enabled() -> bool {
    true
}

/// Root configuration structure for categories.toml.
///
/// # Example
///
/// ```toml
/// [[categories]]
/// name = "labour"
/// form = "CIV"
/// keywords = ["unfair dismissal", "overtime pay"]
///
/// [[categories]]
/// name = "tax"
/// keywords = ["vat refund"]
/// enabled = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesConfig {
    pub categories: Vec<SearchCategory>,
}

impl CategoriesConfig {
    /// Returns only enabled categories.
    pub fn enabled_categories(&self) -> Vec<&SearchCategory> {
        self.categories.iter().filter(|c| c.enabled).collect()
    }

    /// Find a category by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&SearchCategory> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A named legal topic searched through an ordered list of keyword phrases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCategory {
    pub name: String,

    /// Category-specific filter passed to the search API (jurisdiction code).
    pub form: Option<String>,

    /// Phrases searched independently, in order.
    pub keywords: Vec<String>,

    /// Disabled categories are never planned.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub description: Option<String>,
}

impl SearchCategory {
    pub fn new(name: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            name: name.into(),
            form: None,
            keywords,
            enabled: true,
            description: None,
        }
    }

    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "categories.toml";

/// Returns the default configuration directory path: `~/.config/themis/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("themis"))
}

/// Returns the default configuration file path: `~/.config/themis/categories.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Themis category taxonomy
#
# Each category is searched once per keyword and date window.
#   form     = jurisdiction filter code passed to the search API (optional)
#   keywords = phrases searched independently
#   enabled  = false skips the category
#
# Usage:
#   themis harvest                  # all enabled categories
#   themis harvest --only 0,2       # categories by position in this file
#   themis harvest --skip 1

[[categories]]
name = "labour"
form = "CIV"
keywords = ["unfair dismissal", "overtime pay", "workplace harassment"]
description = "Employment and labour disputes"

[[categories]]
name = "tenancy"
form = "CIV"
keywords = ["eviction", "rent increase"]
description = "Residential and commercial tenancy"

[[categories]]
name = "administrative"
form = "ADM"
keywords = ["building permit", "public procurement"]
description = "Administrative court decisions"
"#;

/// Load the category taxonomy from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration file and none could be created
/// * `Err(e)` - File exists but is invalid, or a custom path does not exist
///
/// When the default path has no file yet, a template is written there first.
pub fn load_categories_config(
    path: Option<PathBuf>,
) -> Result<Option<CategoriesConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default categories template: {}", e);
                return Ok(None);
            }
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: CategoriesConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    for category in &config.categories {
        if category.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(AppError::ConfigError(format!(
                "Category '{}' has no keywords",
                category.name
            )));
        }
    }

    Ok(Some(config))
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default categories template at: {}", path.display());

    Ok(())
}
