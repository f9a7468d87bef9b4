use std::time::Duration;

/// Header carrying the form's CSRF token on every chunk request.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Multipart field holding the chunk payload.
pub const FILE_FIELD: &str = "file";

/// Default number of simultaneous chunk transfers per session.
pub const DEFAULT_SIMULTANEOUS_UPLOADS: usize = 3;

/// Default connect timeout for the HTTP transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Multipart/query field names of the resumable chunk protocol.
///
/// The names match the ones the web client library sends, so the server
/// side sees identical requests from browsers and from this client.
pub mod fields {
    /// 1-based chunk number.
    pub const CHUNK_NUMBER: &str = "resumableChunkNumber";
    /// Nominal chunk size of the session.
    pub const CHUNK_SIZE: &str = "resumableChunkSize";
    /// Byte length of this particular chunk (the last one may be shorter).
    pub const CURRENT_CHUNK_SIZE: &str = "resumableCurrentChunkSize";
    pub const TOTAL_SIZE: &str = "resumableTotalSize";
    pub const TYPE: &str = "resumableType";
    pub const IDENTIFIER: &str = "resumableIdentifier";
    pub const FILENAME: &str = "resumableFilename";
    pub const RELATIVE_PATH: &str = "resumableRelativePath";
    pub const TOTAL_CHUNKS: &str = "resumableTotalChunks";

    pub const UPLOADER: &str = "uploader";
    pub const DESCRIPTION: &str = "description";
    pub const COMMENT: &str = "comment";
}

/// Route of the normal upload endpoint for a group.
pub fn upload_path(group_id: &str) -> String {
    format!("/file/upload/{group_id}")
}

/// Route of the new-version upload endpoint for an existing file.
pub fn upload_version_path(group_id: &str, file_id: &str) -> String {
    format!("/file/upload_version/{group_id}/{file_id}")
}

/// Route of the group page (reloaded after a normal upload).
pub fn group_view_path(group_id: &str) -> String {
    format!("/group/{group_id}")
}

/// Route of a file's version history page.
pub fn version_history_path(group_id: &str, file_id: &str) -> String {
    format!("/file/version_history/{group_id}/{file_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_match_server_blueprints() {
        assert_eq!(upload_path("g1"), "/file/upload/g1");
        assert_eq!(upload_version_path("g1", "f9"), "/file/upload_version/g1/f9");
        assert_eq!(group_view_path("g1"), "/group/g1");
        assert_eq!(version_history_path("g1", "f9"), "/file/version_history/g1/f9");
    }
}
