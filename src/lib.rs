//! apsim-client library
//!
//! Client for the APSIM replacement protocol over a local Unix socket:
//! - Length-prefixed framing over any async byte stream
//! - Typed parameter values and replacement records
//! - The ACK handshakes for sending replacements and running simulations
//! - A session type that serializes whole exchanges on one connection

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use protocol::{ParamType, Replacement, Value};
pub use session::Session;
