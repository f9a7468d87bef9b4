//! Wire contract between the groupbin upload client and the server.
//!
//! Covers the multipart field names sent with every chunk, the CSRF header,
//! the upload/landing routes, and the per-chunk form model.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{ChunkErrorBody, ChunkForm};
pub use types::{CompletionAction, SessionParams, UploadMode};
