//! Client session: one open connection to a simulation server.
//!
//! A session owns the transport behind an async mutex. The lock is held for
//! an entire exchange (a raw frame, a replacement or a whole run), so
//! concurrent callers are serialized per transaction and can never interleave
//! their frames or steal each other's acknowledgements.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{handshake, Replacement};
use crate::transport::{self, Transport};

/// A connection to a simulation server.
pub struct Session {
    /// Where the session is connected, for logging.
    endpoint: PathBuf,

    /// `None` once disconnected.
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl Session {
    /// Connect to the server socket derived from `identifier`.
    pub async fn connect(identifier: &str, config: &ClientConfig) -> Result<Self> {
        let path = config.socket_path(identifier);
        Self::connect_path(&path, config).await
    }

    /// Connect to an explicit socket path.
    pub async fn connect_path(path: &Path, config: &ClientConfig) -> Result<Self> {
        let transport = transport::connect(path, config).await?;
        Ok(Self::from_transport(path, transport))
    }

    /// Wrap an already-open transport.
    pub fn from_transport(endpoint: impl Into<PathBuf>, transport: impl Transport + 'static) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: Mutex::new(Some(Box::new(transport))),
        }
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Close the connection.
    ///
    /// Every later call on this session, including a second `disconnect`,
    /// fails with `ConnectionClosed`.
    pub async fn disconnect(&self) -> Result<()> {
        let mut transport = self
            .transport
            .lock()
            .await
            .take()
            .ok_or(ClientError::ConnectionClosed)?;

        if let Err(e) = transport.shutdown().await {
            warn!(endpoint = %self.endpoint.display(), error = %e, "Error shutting down connection");
        }
        info!(endpoint = %self.endpoint.display(), "Disconnected from simulation server");
        Ok(())
    }

    /// Send one frame without any handshake.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<()> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_deref_mut().ok_or(ClientError::ConnectionClosed)?;
        debug!(len = payload.len(), "Sending raw frame");
        let result = transport.send_frame(payload).await;
        self.close_on_failure(&mut guard, result).await
    }

    /// Read one frame without any handshake. The frame length is `len()` of the result.
    pub async fn read_raw(&self) -> Result<Vec<u8>> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_deref_mut().ok_or(ClientError::ConnectionClosed)?;
        let result = transport.recv_frame().await;
        let frame = self.close_on_failure(&mut guard, result).await?;
        debug!(len = frame.len(), "Read raw frame");
        Ok(frame)
    }

    /// Send a single replacement outside a run.
    pub async fn send_replacement(&self, replacement: &Replacement) -> Result<()> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_deref_mut().ok_or(ClientError::ConnectionClosed)?;
        let result = handshake::send_replacement(transport, replacement).await;
        self.close_on_failure(&mut guard, result).await
    }

    /// Apply `replacements` in the given order and run the simulation.
    ///
    /// Returns once the server reports that the run has finished. On error the
    /// server's parameters are in an undefined state and the session is
    /// closed; reconnect before retrying.
    pub async fn run_with_changes(&self, replacements: &[Replacement]) -> Result<()> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_deref_mut().ok_or(ClientError::ConnectionClosed)?;
        info!(
            endpoint = %self.endpoint.display(),
            changes = replacements.len(),
            "Running simulation with changes"
        );
        let result = handshake::run_with_changes(transport, replacements).await;
        self.close_on_failure(&mut guard, result).await
    }

    /// Drop the transport if `result` failed part-way through an exchange.
    ///
    /// Once a frame transfer or handshake step fails, the read position in the
    /// stream is unknown and the connection cannot carry another frame.
    async fn close_on_failure<T>(
        &self,
        slot: &mut Option<Box<dyn Transport>>,
        result: Result<T>,
    ) -> Result<T> {
        let error = match result {
            Ok(value) => return Ok(value),
            Err(e @ (ClientError::Connection { .. } | ClientError::MalformedValue(_))) => {
                return Err(e)
            }
            Err(e) => e,
        };

        if let Some(mut transport) = slot.take() {
            warn!(
                endpoint = %self.endpoint.display(),
                error = %error,
                "Exchange failed, closing connection"
            );
            if let Err(e) = transport.shutdown().await {
                warn!(endpoint = %self.endpoint.display(), error = %e, "Error shutting down connection");
            }
        }
        Err(error)
    }
}
