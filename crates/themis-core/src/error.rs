use std::time::Duration;

use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every failure the harvesting engine can surface. It uses
/// `thiserror` for ergonomic conversions from the underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// Engine services mostly swallow errors below the run level into counters
/// (page failures, batch failures, enrichment failures). Only
/// [`AppError::ConfigError`] is expected to abort a run before any work starts.
///
/// # Examples
///
/// ```no_run
/// use themis_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::ConfigError("page_size must be positive".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures, query errors,
    /// and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client request failed with a non-retryable status or malformed payload.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// Embedding generation failed.
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    ///
    /// Raised when a configured base URL or page URL template cannot be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Document not found upstream or in the store.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error.
    ///
    /// DNS failures, refused connections, resets.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream answered with a throttling response.
    ///
    /// `retry_after` carries the server-supplied wait hint when present.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded { retry_after: Option<Duration> },

    /// A fetched page could not be parsed into a document.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration is missing or invalid.
    ///
    /// Fatal: a run with an invalid configuration never starts.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The operation was cancelled before completion.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Shorthand for a rate limit error without a wait hint.
    pub fn rate_limited() -> Self {
        AppError::RateLimitExceeded { retry_after: None }
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Try: docker-compose up -d".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The search API may be slow or unreachable.\n   Try again later.".to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to upstream: {}\n   Check your internet connection and SEARCH_API_URL.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::EmbeddingError(msg) => {
                format!(
                    "Embedding generation failed: {}\n   Check OPENAI_API_KEY or run with --no-embeddings.",
                    msg
                )
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The upstream may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded { retry_after } => match retry_after {
                Some(wait) => format!(
                    "Too many requests. The server asked to wait {} seconds.\n   Lower the concurrency or raise the request interval.",
                    wait.as_secs()
                ),
                None => "Too many requests.\n   Lower the concurrency or raise the request interval."
                    .to_string(),
            },
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your flags, environment or categories.toml.",
                    msg
                )
            }
            AppError::EmptyResponse => {
                "The API returned no data. The upstream may be temporarily unavailable.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is transient and the operation may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded { .. } => true,
            AppError::ClientError(msg) => msg.contains("timeout") || msg.contains("Server error"),
            AppError::DatabaseError(_)
            | AppError::EmbeddingError(_)
            | AppError::SerializationError(_)
            | AppError::InvalidUrl(_)
            | AppError::DocumentNotFound(_)
            | AppError::EmptyResponse
            | AppError::ParseError(_)
            | AppError::ConfigError(_)
            | AppError::Cancelled
            | AppError::Generic(_) => false,
        }
    }

    /// Server-supplied wait hint for throttling errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}
