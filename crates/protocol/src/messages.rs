use serde::{Deserialize, Serialize};

use crate::constants::fields;
use crate::types::SessionParams;

/// Per-chunk parameters of one chunk request.
///
/// Sent as multipart text fields on `POST` and as query parameters on the
/// `GET` chunk test probe; [`ChunkForm::fields`] maps them to wire names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkForm {
    /// 1-based chunk number.
    pub chunk_number: u64,
    pub chunk_size: u64,
    pub current_chunk_size: u64,
    pub total_size: u64,
    /// MIME type guessed from the file name; empty when unknown.
    pub content_type: String,
    pub identifier: String,
    pub filename: String,
    pub relative_path: String,
    pub total_chunks: u64,
}

impl ChunkForm {
    /// Flattens the chunk parameters plus the session parameters into
    /// name/value pairs, in the order the web client emits them.
    pub fn fields(&self, params: &SessionParams) -> Vec<(&'static str, String)> {
        vec![
            (fields::CHUNK_NUMBER, self.chunk_number.to_string()),
            (fields::CHUNK_SIZE, self.chunk_size.to_string()),
            (fields::CURRENT_CHUNK_SIZE, self.current_chunk_size.to_string()),
            (fields::TOTAL_SIZE, self.total_size.to_string()),
            (fields::TYPE, self.content_type.clone()),
            (fields::IDENTIFIER, self.identifier.clone()),
            (fields::FILENAME, self.filename.clone()),
            (fields::RELATIVE_PATH, self.relative_path.clone()),
            (fields::TOTAL_CHUNKS, self.total_chunks.to_string()),
            (fields::UPLOADER, params.uploader.clone()),
            (fields::DESCRIPTION, params.description.clone()),
            (fields::COMMENT, params.comment.clone()),
        ]
    }
}

/// JSON error body returned by the upload routes (`{"error": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkErrorBody {
    pub error: String,
}

impl ChunkErrorBody {
    /// Extracts a human-readable message from a non-2xx response body.
    ///
    /// Falls back to the raw (trimmed) body when it is not the JSON shape.
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<ChunkErrorBody>(body) {
            Ok(parsed) => parsed.error,
            Err(_) => body.trim().to_string(),
        }
    }
}
