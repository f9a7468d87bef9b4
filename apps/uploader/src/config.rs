//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/groupbin/uploader.toml`
//! - Windows: `%APPDATA%/groupbin/uploader.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use groupbin_protocol::{SessionParams, UploadMode};
use groupbin_upload_client::UploadConfig;
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the groupbin server.
    #[serde(default = "default_server")]
    pub server: String,

    /// CSRF token sent with every chunk request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,

    /// Name recorded as the uploader of each file.
    #[serde(default = "default_uploader")]
    pub uploader: String,

    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Simultaneous chunk requests.
    #[serde(default = "default_simultaneous_uploads")]
    pub simultaneous_uploads: usize,

    /// Ask the server for each chunk before sending it.
    #[serde(default = "default_true")]
    pub test_chunks: bool,

    /// Per-chunk request timeout in seconds (unset = no limit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Chunk failures after which a file is given up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunk_failures: Option<u32>,

    /// Automatic restarts after a run stalls on failed chunks.
    #[serde(default = "default_retry_rounds")]
    pub retry_rounds: u32,

    /// Pause before each automatic restart, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_server() -> String {
    "http://localhost:5000".into()
}

fn default_uploader() -> String {
    SessionParams::default().uploader
}

fn default_chunk_size() -> u64 {
    groupbin_transfer::DEFAULT_CHUNK_SIZE
}

fn default_simultaneous_uploads() -> usize {
    groupbin_protocol::constants::DEFAULT_SIMULTANEOUS_UPLOADS
}

fn default_true() -> bool {
    true
}

fn default_retry_rounds() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server(),
            csrf_token: None,
            uploader: default_uploader(),
            chunk_size: default_chunk_size(),
            simultaneous_uploads: default_simultaneous_uploads(),
            test_chunks: default_true(),
            request_timeout_secs: None,
            max_chunk_failures: None,
            retry_rounds: default_retry_rounds(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file is created
    /// with default values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::read(path);
        }

        let path = config_path()?;
        if path.exists() {
            Self::read(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file may hold a CSRF token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Controller configuration for one run.
    pub fn upload_config(&self, mode: UploadMode, params: SessionParams) -> UploadConfig {
        let mut config = UploadConfig::new(mode);
        config.chunk_size = self.chunk_size;
        config.max_concurrent = self.simultaneous_uploads;
        config.test_chunks = self.test_chunks;
        config.request_timeout = self.request_timeout_secs.map(Duration::from_secs);
        config.max_chunk_failures = self.max_chunk_failures;
        config.params = params;
        config
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("groupbin")
            .join("uploader.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("groupbin").join("uploader.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/groupbin/uploader.toml"))
    }
}
