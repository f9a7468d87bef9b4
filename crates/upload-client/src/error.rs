//! Upload error types.

use std::time::Duration;

use groupbin_transfer::TransferError;

/// Errors produced by the upload controller.
///
/// Validation failures are returned from the public operations; transfer
/// failures never are, they surface as `FileError` events instead.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Session(#[from] TransferError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("chunk transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("upload queue is empty")]
    EmptyQueue,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("task join error: {0}")]
    Task(String),
}

/// Errors produced by a chunk transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected chunk ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("{0}")]
    Other(String),
}
