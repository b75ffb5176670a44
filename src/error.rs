//! Error taxonomy for the RAG and translation core.
//!
//! Adapters (HTTP clients, Qdrant, sqlx, fastembed) report failures with
//! `anyhow`; the orchestrators turn those into one of these variants or into
//! a degraded-but-valid response.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A provider credential is missing or still a placeholder
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Blank translation content
    #[error("content cannot be empty")]
    EmptyInput,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An embedding, index, generation or translation backend failed
    #[error("{provider} provider failed: {message}")]
    Provider { provider: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Relational store failure
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    pub fn provider(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
