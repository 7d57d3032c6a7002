//! The single failure type surfaced by every storage adapter.

use std::time::Duration;
use thiserror::Error;

use crate::dht::TransportError;

/// Errors returned by [`StorageAdapter`](crate::StorageAdapter) operations.
///
/// Validation failures (`TypeMismatch`, `UnsupportedOperation`) are raised
/// before any disk or network I/O is attempted.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("expected a {expected} path element, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{path}: no such file or directory")]
    NotFound { path: String },

    #[error("target path {path} already exists")]
    AlreadyExists { path: String },

    #[error("interrupted while waiting for {op} of {path}")]
    Interrupted { op: &'static str, path: String },

    #[error("{op} of {path} did not complete within {limit:?}")]
    Timeout {
        op: &'static str,
        path: String,
        limit: Duration,
    },

    #[error("{op} of {path} failed in transport: {source}")]
    Transport {
        op: &'static str,
        path: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// Wrap an `io::Error` with the operation and path it happened on.
    pub fn io(op: &'static str, path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_string(),
            source,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    pub fn not_found(path: impl std::fmt::Display) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// True for failures caused by a missing path, including wrapped
    /// `io::ErrorKind::NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
