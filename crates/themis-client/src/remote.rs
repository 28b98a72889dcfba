//! Client for the remote enrichment endpoint used in remote persistence mode.

use reqwest::{Client, Url};
use themis_core::{AppError, HarvestedDocument, HttpConfig, RemoteIngest};

use crate::http::{ThrottlePolicy, build_client, send_with_retry};

/// Posts harvested documents one at a time to a remote enrichment service.
///
/// Throttling is surfaced as [`AppError::RateLimitExceeded`] carrying the
/// server's `Retry-After` hint; the persistence batcher owns the retry.
#[derive(Clone, Debug)]
pub struct RemoteIngestClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    http: HttpConfig,
}

impl RemoteIngestClient {
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if `endpoint` is malformed.
    pub fn new(endpoint: &str) -> Result<Self, AppError> {
        Self::with_http_config(endpoint, HttpConfig::default())
    }

    pub fn with_http_config(endpoint: &str, http: HttpConfig) -> Result<Self, AppError> {
        let endpoint =
            Url::parse(endpoint.trim()).map_err(|_| AppError::InvalidUrl(endpoint.to_string()))?;
        Ok(Self {
            client: build_client(&http)?,
            endpoint,
            api_key: None,
            http,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl RemoteIngest for RemoteIngestClient {
    async fn ingest(&self, document: &HarvestedDocument) -> Result<(), AppError> {
        send_with_retry(&self.http, ThrottlePolicy::Surface, &self.endpoint, || {
            let request = self.client.post(self.endpoint.clone()).json(document);
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await
        .map(|_| ())
    }
}
