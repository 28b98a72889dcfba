//! Themis Client - HTTP clients for the upstream collaborators.
//!
//! This crate provides `reqwest` implementations of the `themis-core` traits:
//!
//! - [`search`] - paginated court decision search API ([`SearchClient`])
//! - [`fetch`] - structured full-text API and public decision pages ([`DocumentFetcher`])
//! - [`remote`] - remote enrichment endpoint ([`RemoteIngest`])
//! - [`openai`] - OpenAI-compatible embeddings API ([`EmbeddingProvider`])
//! - [`provider`] - runtime choice between OpenAI and disabled embeddings
//!
//! All of them share the retry loop in [`http`].
//!
//! [`SearchClient`]: themis_core::SearchClient
//! [`DocumentFetcher`]: themis_core::DocumentFetcher
//! [`RemoteIngest`]: themis_core::RemoteIngest
//! [`EmbeddingProvider`]: themis_core::EmbeddingProvider

pub mod fetch;
pub mod http;
pub mod openai;
pub mod provider;
pub mod remote;
pub mod search;

pub use fetch::{DocumentPageClient, parse_decision_page};
pub use openai::OpenAIClient;
pub use provider::EmbeddingProviderEnum;
pub use remote::RemoteIngestClient;
pub use search::SearchApiClient;
