// Error types for Executor module
#![allow(dead_code)]

use crate::transport::TransportError;
use thiserror::Error;

/// Executor error types
///
/// Only failures that happen before the task function is invoked are
/// errors. Failures of the task itself are reported inside
/// [`ExecutionOutput`](crate::executor::ExecutionOutput).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to deserialize task function: {0}")]
    Deserialization(#[from] TransportError),

    #[error("Invalid option '{0}': {1}")]
    InvalidOption(String, String),

    #[error("Unknown executor plugin: {0}")]
    UnknownPlugin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
