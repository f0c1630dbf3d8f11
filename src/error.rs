//! Error types for the replacement client.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::value::ValueError;
use crate::protocol::HandshakeStep;

/// Errors raised by the framing, handshake and session layers.
///
/// Every handshake failure is fatal to the exchange in progress. After any
/// error other than [`ClientError::Connection`] the remote parameter set is
/// in an undefined state. A [`crate::Session`] closes its connection on such
/// errors, so the caller has to reconnect before retrying.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint does not exist or refused the connection.
    #[error("Failed to connect to {}: {source}", .endpoint.display())]
    Connection {
        endpoint: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read/write failure or EOF in the middle of a frame.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The session was disconnected, or the peer closed the stream between frames.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A connect or frame transfer exceeded the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A frame length above the configured maximum.
    #[error("Frame of {len} bytes exceeds max size of {max} bytes")]
    FrameTooLarge { len: u64, max: u32 },

    /// The peer answered a handshake step with something other than the expected literal.
    #[error("Protocol error during {step}: expected {expected:?}, received {}", String::from_utf8_lossy(.received))]
    Protocol {
        step: HandshakeStep,
        expected: &'static str,
        received: Vec<u8>,
    },

    /// A typed value payload that does not match its declared type.
    #[error("Malformed value: {0}")]
    MalformedValue(#[from] ValueError),
}

/// Result type alias using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
