//! Themis Server - REST API for background harvest and enrichment jobs
//!
//! - **Jobs**: launch harvests and enrichments, poll their snapshots
//! - **Queue**: occupancy of the enrichment concurrency gate
//! - **System**: health and document statistics
//!
//! # API Documentation
//!
//! When running the server, interactive API documentation is available
//! at `/swagger-ui`.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use router::{api_router, create_router};
pub use state::{AppState, Upstreams};
