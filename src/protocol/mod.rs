//! Replacement protocol: typed values, replacement records and the
//! acknowledgement handshakes built on top of the framing layer.
//!
//! Control messages are the literal 3-byte frame payloads `RUN`, `FIN` and
//! `ACK` (ASCII, no terminator).

pub mod handshake;
pub mod peer;
pub mod replacement;
pub mod value;

pub use handshake::{run_with_changes, send_replacement, RunState, RunTransaction};
pub use peer::{recv_replacement, recv_run};
pub use replacement::Replacement;
pub use value::{ParamType, Value, ValueError};

use std::fmt;

pub const RUN: &str = "RUN";
pub const FIN: &str = "FIN";
pub const ACK: &str = "ACK";

/// The exchange a handshake frame belongs to, reported in protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Replacement path frame.
    Path,
    /// Replacement param type tag frame.
    ParamType,
    /// Replacement value frame.
    Value,
    /// `RUN` request opening a run transaction.
    Run,
    /// `FIN` closing the list of changes.
    Fin,
    /// Server-initiated `FIN` signalling that the run finished.
    Completion,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Path => "path",
            Self::ParamType => "param type",
            Self::Value => "value",
            Self::Run => "RUN",
            Self::Fin => "FIN",
            Self::Completion => "run completion",
        };
        f.write_str(name)
    }
}
