//! Resumable chunked upload client for groupbin.
//!
//! This crate implements the client side of the group upload flow: a
//! queue of selected files, split into fixed-size chunks, sent with a
//! session-wide cap on simultaneous requests. Chunks that fail are parked
//! and resent on the next `start()`; chunks already acknowledged are never
//! sent again.
//!
//! # Pipeline
//!
//! 1. **Select** turns paths into files with browser-style relative paths
//! 2. **Probe** checks the environment and builds an [`UploadController`]
//! 3. **Enqueue** partitions each file into chunks
//! 4. **Start** dispatches chunks through a [`ChunkTransport`]
//! 5. **Complete** reports the follow-up navigation once every file is done

pub mod controller;
pub mod error;
pub mod http;
pub mod scanner;
pub mod transport;
pub mod types;

// Re-export primary types for convenience.
pub use controller::{Capability, UnsupportedReason, UploadController};
pub use error::{TransportError, UploadError};
pub use http::HttpTransport;
pub use scanner::select_paths;
pub use transport::{ChunkRequest, ChunkTransport, TransportFuture};
pub use types::{UploadConfig, UploadEvent};
