//! Unix domain socket transport.
//!
//! The simulation server listens on a socket file whose path is derived from
//! a caller-supplied identifier (see [`ClientConfig::socket_path`]). The
//! client connects to it; tests and the `listen` command bind it.

use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use super::StreamTransport;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Connect to the server socket at `path`, bounded by the configured connect timeout.
pub async fn connect(path: &Path, config: &ClientConfig) -> Result<StreamTransport<UnixStream>> {
    debug!(path = %path.display(), "Connecting to simulation server");

    let timeout = config.connect_timeout();
    let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
        .map_err(|source| ClientError::Connection {
            endpoint: path.to_path_buf(),
            source,
        })?;

    info!(path = %path.display(), "Connected to simulation server");
    Ok(wrap(stream, config))
}

fn wrap(stream: UnixStream, config: &ClientConfig) -> StreamTransport<UnixStream> {
    StreamTransport::new(stream)
        .with_max_frame_size(config.max_frame_size)
        .with_io_timeout(config.io_timeout())
}

/// Listening side of the socket, used to play the server in tests and the CLI.
///
/// The socket file is removed when the listener is dropped.
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
    config: ClientConfig,
}

impl SocketListener {
    /// Bind to `path`, removing a stale socket file left by an earlier run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: &Path, config: &ClientConfig) -> Result<Self> {
        let to_connection_error = |source| ClientError::Connection {
            endpoint: path.to_path_buf(),
            source,
        };

        if path.exists() {
            debug!(path = %path.display(), "Removing stale socket file");
            std::fs::remove_file(path).map_err(to_connection_error)?;
        }

        let listener = UnixListener::bind(path).map_err(to_connection_error)?;
        info!(path = %path.display(), "Listening for clients");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            config: config.clone(),
        })
    }

    /// Accept a single client connection.
    pub async fn accept(&self) -> Result<StreamTransport<UnixStream>> {
        let (stream, _addr) = self.listener.accept().await?;
        debug!(path = %self.path.display(), "Accepted client");
        Ok(wrap(stream, &self.config))
    }

    /// Socket file this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
        }
    }
}
