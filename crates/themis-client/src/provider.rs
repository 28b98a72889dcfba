//! Runtime choice of embedding provider.
//!
//! [`EmbeddingProvider`] uses RPITIT and is not object-safe, so binaries that
//! pick the provider from configuration hold an [`EmbeddingProviderEnum`].

use themis_core::{AppError, EmbeddingProvider, HttpConfig, NoEmbeddings};

use crate::OpenAIClient;

#[derive(Clone, Debug)]
pub enum EmbeddingProviderEnum {
    OpenAI(OpenAIClient),
    Disabled(NoEmbeddings),
}

impl EmbeddingProviderEnum {
    pub fn openai(api_key: &str) -> Result<Self, AppError> {
        Ok(Self::OpenAI(OpenAIClient::new(api_key)?))
    }

    pub fn openai_with_config(
        api_key: &str,
        model: &str,
        endpoint: Option<&str>,
        http: HttpConfig,
    ) -> Result<Self, AppError> {
        Ok(Self::OpenAI(OpenAIClient::with_config(
            api_key, model, endpoint, http,
        )?))
    }

    pub fn disabled() -> Self {
        Self::Disabled(NoEmbeddings)
    }

    /// OpenAI when a non-blank key is given, disabled otherwise.
    pub fn from_optional_key(
        api_key: Option<&str>,
        model: &str,
        endpoint: Option<&str>,
        http: HttpConfig,
    ) -> Result<Self, AppError> {
        match api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Self::openai_with_config(key, model, endpoint, http),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled(_))
    }
}

impl EmbeddingProvider for EmbeddingProviderEnum {
    fn name(&self) -> &'static str {
        match self {
            Self::OpenAI(c) => c.name(),
            Self::Disabled(c) => c.name(),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            Self::OpenAI(c) => c.dimension(),
            Self::Disabled(c) => c.dimension(),
        }
    }

    async fn generate(&self, text: &str) -> Result<Vec<f32>, AppError> {
        match self {
            Self::OpenAI(c) => c.generate(text).await,
            Self::Disabled(c) => c.generate(text).await,
        }
    }
}
