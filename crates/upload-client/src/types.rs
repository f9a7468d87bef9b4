//! Configuration and event types of the upload controller.

use std::time::Duration;

use groupbin_protocol::constants::DEFAULT_SIMULTANEOUS_UPLOADS;
use groupbin_protocol::{CompletionAction, SessionParams, UploadMode};
use groupbin_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_PROGRESS_INTERVAL, FileId, FileSnapshot};

use crate::error::UploadError;

/// Configuration of one upload session.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Chunk size in bytes, uniform across every file of the session.
    pub chunk_size: u64,
    /// Session-wide cap on simultaneous chunk transfers.
    pub max_concurrent: usize,
    /// Probe the server for each chunk before sending it.
    pub test_chunks: bool,
    /// Upper bound for one chunk transfer; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Cumulative chunk failures after which a file is marked failed.
    /// `None` leaves failed chunks for a manual retry forever.
    pub max_chunk_failures: Option<u32>,
    /// Minimum gap between two `Progress` events (file completions always
    /// report).
    pub progress_interval: Duration,
    /// Form parameters resent with every chunk.
    pub params: SessionParams,
    pub mode: UploadMode,
}

impl UploadConfig {
    /// Defaults for the given upload mode.
    pub fn new(mode: UploadMode) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent: DEFAULT_SIMULTANEOUS_UPLOADS,
            test_chunks: true,
            request_timeout: None,
            max_chunk_failures: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            params: SessionParams::default(),
            mode,
        }
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidConfig("chunk size must be positive".into()));
        }
        if self.max_concurrent == 0 {
            return Err(UploadError::InvalidConfig(
                "concurrency cap must be positive".into(),
            ));
        }
        if self.max_chunk_failures == Some(0) {
            return Err(UploadError::InvalidConfig(
                "failure threshold must be positive".into(),
            ));
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(UploadError::InvalidConfig(
                "request timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Event emitted by the upload controller.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A file entered the queue.
    FileAdded { file: FileSnapshot },
    /// A file left the queue before finishing.
    FileRemoved { file: FileSnapshot },
    /// Acknowledged bytes grew.
    Progress {
        /// Aggregate fraction in [0, 1].
        progress: f64,
        file_id: FileId,
        file_progress: f64,
        bytes_per_second: f64,
    },
    /// Every chunk of a file was acknowledged. Sent once per file.
    FileSuccess { file: FileSnapshot },
    /// A chunk transfer failed, or the file was cancelled (`chunk: None`).
    FileError {
        file: FileSnapshot,
        chunk: Option<usize>,
        reason: String,
    },
    /// Every queued file is completed or failed.
    Complete {
        action: CompletionAction,
        completed: usize,
        failed: usize,
    },
    /// Nothing is in flight or dispatchable, but `waiting` files still need
    /// a manual retry.
    Idle { waiting: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig::new(UploadMode::Normal {
            group_id: "g".into(),
        })
    }

    #[test]
    fn defaults_match_web_client() {
        let cfg = config();
        assert_eq!(cfg.chunk_size, 5 * 1024 * 1024);
        assert_eq!(cfg.max_concurrent, 3);
        assert!(cfg.test_chunks);
        assert!(cfg.max_chunk_failures.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = config();
        cfg.chunk_size = 0;
        assert!(matches!(cfg.validate(), Err(UploadError::InvalidConfig(_))));

        let mut cfg = config();
        cfg.max_concurrent = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.max_chunk_failures = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.request_timeout = Some(Duration::ZERO);
        assert!(cfg.validate().is_err());
    }
}
