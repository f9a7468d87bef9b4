//! Chunked upload data model with resume support and throughput tracking.
//!
//! Files selected for upload become [`UploadFile`]s inside an
//! [`UploadSession`]; each file is cut into [`ChunkDescriptor`]s whose shape
//! is fixed at enqueue time and whose state moves through
//! pending → in-flight → acknowledged (or failed, awaiting a manual retry).

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{
    ChunkReader, FileSource, detect_content_type, plan_chunks, resumable_identifier,
};
pub use progress::{DEFAULT_PROGRESS_INTERVAL, ProgressThrottle, SpeedCalculator};
pub use types::{
    AckOutcome, ChunkDescriptor, ChunkFailure, ChunkJob, ChunkState, FileId, FileSnapshot,
    FileState, Fingerprint, SelectedFile, SessionCounts, UploadFile, UploadSession,
};
pub use validation::{validate_relative_path, validate_selection};

/// Default chunk size: 5 MiB, the server's default `CHUNK_SIZE_MB`.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {offset}+{len} exceeds source of {size} bytes")]
    InvalidRange { offset: u64, len: u64, size: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("no files selected")]
    EmptySelection,

    #[error("file is empty: {0}")]
    EmptyFile(String),

    #[error("file already queued: {0}")]
    DuplicateFile(String),

    #[error("file not found in queue: {0}")]
    FileNotFound(FileId),

    #[error("file already fully uploaded: {0}")]
    AlreadyAcknowledged(FileId),

    #[error("chunk {index} out of range for {file_id}")]
    ChunkNotFound { file_id: FileId, index: usize },
}
