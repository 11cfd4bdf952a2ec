//! Error taxonomy for the storage and provider boundaries.
//!
//! Leaf errors at store/provider boundaries are typed (`thiserror`). Above those
//! boundaries — loop, evolver, reflection, scheduler — errors are erased to
//! `Box<dyn std::error::Error + Send + Sync>` since those layers log and continue
//! rather than branch on variant.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum RelationalError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector collection not configured: {0}")]
    NotConfigured(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("edge endpoint missing: {0}")]
    EdgeEndpointMissing(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("provider not configured")]
    NotConfigured,
}
