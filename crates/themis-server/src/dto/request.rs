//! Request DTOs for API endpoints.

use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use themis_core::{DocumentIdentity, HarvestConfig};

use crate::error::ApiError;

/// Maximum number of identities accepted by one enrichment request.
pub const MAX_ENRICH_IDS: usize = 10_000;

/// Optional overrides of the server's harvest defaults.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct HarvestJobRequest {
    /// Global cap on unique documents discovered by the job
    #[schema(example = 500)]
    pub max_documents: Option<usize>,

    /// Count only, persist nothing
    pub dry_run: Option<bool>,

    #[schema(value_type = Option<String>, format = Date, example = "2023-01-01")]
    pub date_from: Option<NaiveDate>,

    #[schema(value_type = Option<String>, format = Date, example = "2023-03-15")]
    pub date_to: Option<NaiveDate>,

    /// Category positions in categories.toml to run exclusively
    pub only_categories: Option<Vec<usize>>,

    /// Category positions in categories.toml to leave out
    pub skip_categories: Option<Vec<usize>>,
}

impl HarvestJobRequest {
    /// Applies the overrides on top of `base`.
    ///
    /// A `date_to` without `date_from` keeps the base lower bound.
    pub fn apply(&self, base: &HarvestConfig) -> Result<HarvestConfig, ApiError> {
        let mut config = base.clone();

        if let Some(max) = self.max_documents {
            config = config.with_max_documents(max);
        }
        if self.dry_run == Some(true) {
            config = config.with_dry_run();
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let from = self.date_from.unwrap_or(config.date_from);
            let to = self.date_to.or(config.date_to);
            config = config.with_date_range(from, to);
        }
        if let Some(only) = &self.only_categories {
            config.only_categories = Some(only.clone());
        }
        if let Some(skip) = &self.skip_categories {
            config.skip_categories = skip.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// What an enrichment job works on: explicit identities or the backlog.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EnrichJobRequest {
    /// Identities to enrich
    #[serde(default)]
    #[schema(example = json!(["cd-2023-0042", "cd-2023-0043"]))]
    pub document_ids: Vec<String>,

    /// Enrich up to this many stored documents lacking full text
    #[schema(example = 100)]
    pub missing: Option<usize>,
}

/// Validated form of [`EnrichJobRequest`].
#[derive(Debug, PartialEq)]
pub enum EnrichTarget {
    Documents(Vec<DocumentIdentity>),
    Missing(usize),
}

impl EnrichJobRequest {
    pub fn target(&self) -> Result<EnrichTarget, ApiError> {
        let ids: Vec<DocumentIdentity> = self
            .document_ids
            .iter()
            .map(DocumentIdentity::new)
            .filter(|id| !id.is_empty())
            .collect();

        match (ids.is_empty(), self.missing) {
            (false, Some(_)) => Err(ApiError::BadRequest(
                "Specify either document_ids or missing, not both".to_string(),
            )),
            (true, None) => Err(ApiError::BadRequest(
                "Specify document_ids or missing".to_string(),
            )),
            (true, Some(0)) => Err(ApiError::BadRequest(
                "missing must be positive".to_string(),
            )),
            (true, Some(limit)) => Ok(EnrichTarget::Missing(limit.min(MAX_ENRICH_IDS))),
            (false, None) if ids.len() > MAX_ENRICH_IDS => Err(ApiError::BadRequest(format!(
                "Too many document_ids (max: {})",
                MAX_ENRICH_IDS
            ))),
            (false, None) => Ok(EnrichTarget::Documents(ids)),
        }
    }
}
