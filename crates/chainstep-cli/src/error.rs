//! CLI error types

use chainstep_deployment::{ChainError, DeploymentError};
use chainstep_state::StateError;
use chainstep_types::DatasetError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Chain gateway error outside a deployment run
    #[error("Chain gateway error: {0}")]
    Chain(#[from] ChainError),

    /// Deployment or migration failure
    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    /// Ledger storage failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Migration dataset error
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
