//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use groupbin_protocol::{SessionParams, UploadMode};

use crate::config::Config;

/// Upload files and folders to a groupbin group.
#[derive(Debug, Parser)]
#[command(name = "groupbin-upload", version, about)]
pub struct Cli {
    /// Files or folders to upload.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Target group.
    #[arg(short, long)]
    pub group: String,

    /// Upload a new version of this file instead of new files.
    #[arg(long, value_name = "FILE_ID")]
    pub version_of: Option<String>,

    /// Server base URL.
    #[arg(long)]
    pub server: Option<String>,

    /// CSRF token of the upload form.
    #[arg(long)]
    pub csrf_token: Option<String>,

    #[arg(short, long)]
    pub uploader: Option<String>,

    #[arg(short, long, default_value = "")]
    pub description: String,

    #[arg(long, default_value = "")]
    pub comment: String,

    /// Chunk size in bytes.
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Simultaneous chunk requests.
    #[arg(short = 'j', long)]
    pub simultaneous: Option<usize>,

    /// Send every chunk without asking the server first.
    #[arg(long)]
    pub no_test_chunks: bool,

    /// Automatic restarts after failed chunks.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Configuration file (defaults to the per-user location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Overrides file settings with the flags given on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(token) = &self.csrf_token {
            config.csrf_token = Some(token.clone());
        }
        if let Some(uploader) = &self.uploader {
            config.uploader = uploader.clone();
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(n) = self.simultaneous {
            config.simultaneous_uploads = n;
        }
        if self.no_test_chunks {
            config.test_chunks = false;
        }
        if let Some(retries) = self.retries {
            config.retry_rounds = retries;
        }
    }

    pub fn mode(&self) -> UploadMode {
        match &self.version_of {
            Some(file_id) => UploadMode::Version {
                group_id: self.group.clone(),
                file_id: file_id.clone(),
            },
            None => UploadMode::Normal {
                group_id: self.group.clone(),
            },
        }
    }

    pub fn params(&self, config: &Config) -> SessionParams {
        SessionParams {
            uploader: config.uploader.clone(),
            description: self.description.clone(),
            comment: self.comment.clone(),
        }
    }
}
