// Error types for Transport module

use thiserror::Error;

/// Transport error types
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Payload kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch {
        expected: crate::transport::codec::PayloadKind,
        found: crate::transport::codec::PayloadKind,
    },

    #[error("Function '{0}' is not available in this environment")]
    MissingDependency(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
