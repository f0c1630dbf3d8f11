//! Client configuration.
//!
//! Defaults match the server's named-pipe convention: the socket lives in the
//! system temp directory as `CoreFxPipe_<identifier>`. A JSON document in
//! `APSIM_CLIENT_CONFIG` and a few individual env vars can override them.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::transport::DEFAULT_MAX_FRAME_SIZE;

/// Connection settings for the replacement client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Directory containing the server socket.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,

    /// File name prefix placed before the identifier.
    #[serde(default = "default_socket_prefix")]
    pub socket_prefix: String,

    /// Maximum time to wait for `connect` to complete.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Maximum time for a single frame read or write. No limit when absent.
    #[serde(default)]
    pub io_timeout_seconds: Option<u64>,

    /// Largest frame accepted in either direction.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            socket_prefix: default_socket_prefix(),
            connect_timeout_seconds: default_connect_timeout(),
            io_timeout_seconds: None,
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment.
    ///
    /// `APSIM_CLIENT_CONFIG` (JSON) provides the base; `APSIM_SOCKET_DIR`,
    /// `APSIM_CONNECT_TIMEOUT` and `APSIM_IO_TIMEOUT` (seconds) override it.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("APSIM_CLIENT_CONFIG") {
            Ok(json) => Self::from_json(&json).context("Failed to parse APSIM_CLIENT_CONFIG")?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;

        debug!(?config, "Loaded client configuration");
        Ok(config)
    }

    /// Apply the individual `APSIM_*` overrides, looking each one up with `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("APSIM_SOCKET_DIR") {
            self.socket_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("APSIM_CONNECT_TIMEOUT") {
            self.connect_timeout_seconds = secs
                .parse()
                .with_context(|| format!("Invalid APSIM_CONNECT_TIMEOUT: {secs}"))?;
        }
        if let Some(secs) = lookup("APSIM_IO_TIMEOUT") {
            self.io_timeout_seconds = Some(
                secs.parse()
                    .with_context(|| format!("Invalid APSIM_IO_TIMEOUT: {secs}"))?,
            );
        }
        Ok(())
    }

    /// Parse configuration from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }

    /// Socket path for a server identifier.
    pub fn socket_path(&self, identifier: &str) -> PathBuf {
        self.socket_dir
            .join(format!("{}{identifier}", self.socket_prefix))
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_seconds.map(Duration::from_secs)
    }
}

fn default_socket_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_socket_prefix() -> String {
    "CoreFxPipe_".into()
}

const fn default_connect_timeout() -> u64 {
    5
}

const fn default_max_frame_size() -> u32 {
    DEFAULT_MAX_FRAME_SIZE
}
