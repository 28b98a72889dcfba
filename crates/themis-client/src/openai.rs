//! OpenAI-compatible embeddings client.
//!
//! Supports OpenAI's text embedding models:
//! - `text-embedding-3-small` (1536 dimensions, recommended)
//! - `text-embedding-3-large` (3072 dimensions, higher quality)
//! - `text-embedding-ada-002` (1536 dimensions, legacy)
//!
//! Any server exposing the same `POST /v1/embeddings` contract works through
//! [`OpenAIClient::with_config`].
//!
//! # Examples
//!
//! ```no_run
//! use themis_client::OpenAIClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAIClient::new("sk-your-api-key")?;
//! let embedding = client.get_embeddings("The eviction is void.").await?;
//! println!("Embedding dimension: {}", embedding.len()); // 1536
//! # Ok(())
//! # }
//! ```

use reqwest::Client;
use serde::{Deserialize, Serialize};
use themis_core::{AppError, EmbeddingProvider, HttpConfig};

use crate::http::{build_client, map_transport_error, retry_after};

/// Default public endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Known OpenAI embedding models and their dimensions.
pub fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

/// HTTP client for an OpenAI-compatible embeddings API.
#[derive(Clone, Debug)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    dim: usize,
    http: HttpConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

impl OpenAIClient {
    /// Creates a client for the default model `text-embedding-3-small`.
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    pub fn with_model(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_config(api_key, model, None, HttpConfig::default())
    }

    /// Creates a client with full configuration.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Custom API endpoint (Azure OpenAI, proxies, local servers)
    pub fn with_config(
        api_key: &str,
        model: &str,
        endpoint: Option<&str>,
        http: HttpConfig,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError(
                "embedding API key is empty".to_string(),
            ));
        }

        Ok(Self {
            client: build_client(&http)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            dim: model_dimension(model),
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates the embedding of a single text.
    pub async fn get_embeddings(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let embeddings = self.get_embeddings_batch(&[text]).await?;
        embeddings.into_iter().next().ok_or(AppError::EmptyResponse)
    }

    /// Generates embeddings for several texts in one call, in input order.
    pub async fn get_embeddings_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, &self.http))?;

        let status = response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let hint = retry_after(&response).map(|d| d.min(self.http.max_retry_delay));
            let error_text = response.text().await.unwrap_or_default();

            let message = match serde_json::from_str::<OpenAIError>(&error_text) {
                Ok(openai_error) => openai_error.error.message,
                Err(_) => format!("HTTP {}: {}", status_code, error_text),
            };

            return match status_code {
                401 => Err(AppError::EmbeddingError(format!(
                    "authentication failed: {}. Check your OPENAI_API_KEY.",
                    message
                ))),
                429 => Err(AppError::RateLimitExceeded { retry_after: hint }),
                _ => Err(AppError::EmbeddingError(message)),
            };
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingError(format!("Failed to parse embeddings response: {}", e))
        })?;

        let mut data = embedding_response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

// =============================================================================
// Trait Implementation: EmbeddingProvider
// =============================================================================

impl EmbeddingProvider for OpenAIClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn generate(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.get_embeddings(text).await
    }
}
