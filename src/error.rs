//! Error types for the transfer engine
//!
//! - [`TransferError`] is what every engine operation returns
//! - [`StoreError`] is what an [`crate::s3::ObjectStore`] backend returns
//! - [`CleanupError`] describes a failed multipart abort; it is only ever logged

use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T, E = TransferError> = std::result::Result<T, E>;

/// Errors surfaced to callers of the transfer engine
#[derive(Debug, Error)]
pub enum TransferError {
    /// Connection missing, bucket unset, or malformed endpoint/config.
    /// Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid caller input (bad path, missing file name, oversized payload).
    /// Raised before any network call.
    #[error("invalid input: {0}")]
    Input(String),

    /// The storage endpoint rejected or failed a request
    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Local disk read or write failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn store(operation: &'static str, source: StoreError) -> Self {
        TransferError::Store { operation, source }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the error came from the caller's cancellation token
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

/// Errors produced by an object store backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The service answered with an error
    #[error("{message}")]
    Service {
        code: Option<String>,
        message: String,
    },

    /// The service answered successfully but omitted a required field
    #[error("response is missing {0}")]
    MissingField(&'static str),

    /// The request could not be built
    #[error("invalid request: {0}")]
    Request(String),

    /// The response body could not be read
    #[error("body error: {0}")]
    Body(String),
}

impl StoreError {
    /// Service error code (e.g. `NoSuchKey`), when the backend reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// A failed attempt to abort a multipart session.
///
/// Never returned in place of the error that triggered the abort.
#[derive(Debug, Error)]
#[error("failed to abort multipart upload {upload_id} for {key}: {source}")]
pub struct CleanupError {
    pub key: String,
    pub upload_id: String,
    #[source]
    pub source: StoreError,
}
