//! Server side of the handshakes.
//!
//! Mirrors [`super::handshake`]: every received frame is validated before it
//! is acknowledged, so a malformed replacement is never ACKed. Used by the
//! `listen` command and by tests that play the simulation server.

use tracing::{debug, trace};

use super::handshake::expect_frame;
use super::replacement::Replacement;
use super::value::{ParamType, ValueError};
use super::{HandshakeStep, ACK, FIN, RUN};
use crate::error::Result;
use crate::transport::Transport;

async fn ack(transport: &mut dyn Transport) -> Result<()> {
    transport.send_frame(ACK.as_bytes()).await
}

/// Receive one replacement, acknowledging each of its three frames.
pub async fn recv_replacement(transport: &mut dyn Transport) -> Result<Replacement> {
    let path = transport.recv_frame().await?;
    recv_replacement_after_path(transport, path).await
}

async fn recv_replacement_after_path(
    transport: &mut dyn Transport,
    path: Vec<u8>,
) -> Result<Replacement> {
    let path = String::from_utf8(path).map_err(|e| ValueError::InvalidUtf8(e.utf8_error()))?;
    ack(transport).await?;

    let tag = transport.recv_frame().await?;
    let param_type = ParamType::from_wire(&tag)?;
    ack(transport).await?;

    let value = transport.recv_frame().await?;
    let replacement = Replacement::from_raw(path, param_type, value)?;
    ack(transport).await?;

    trace!(path = %replacement.path(), param_type = %param_type, "Received replacement");
    Ok(replacement)
}

/// Receive a complete run transaction and return its changes in arrival order.
///
/// Changes are read until a `FIN` frame arrives where a path is expected, so
/// a replacement whose path is literally `FIN` cannot be received.
pub async fn recv_run(transport: &mut dyn Transport) -> Result<Vec<Replacement>> {
    expect_frame(transport, HandshakeStep::Run, RUN).await?;
    ack(transport).await?;

    let mut changes = Vec::new();
    loop {
        let frame = transport.recv_frame().await?;
        if frame == FIN.as_bytes() {
            break;
        }
        changes.push(recv_replacement_after_path(transport, frame).await?);
    }
    ack(transport).await?;

    debug!(changes = changes.len(), "Run transaction received");
    transport.send_frame(FIN.as_bytes()).await?;
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::transport::StreamTransport;

    fn pair() -> (StreamTransport<tokio::io::DuplexStream>, StreamTransport<tokio::io::DuplexStream>) {
        let (client, server) = tokio::io::duplex(1024);
        (StreamTransport::new(client), StreamTransport::new(server))
    }

    #[tokio::test]
    async fn unknown_tag_is_not_acknowledged() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move { recv_replacement(&mut server).await });

        client.send_frame(b"x").await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), b"ACK");
        client.send_frame(&99i32.to_le_bytes()).await.unwrap();

        let err = peer.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::MalformedValue(ValueError::UnknownParamType(99))
        ));
        // The server hung up without acknowledging the tag.
        assert!(matches!(
            client.recv_frame().await,
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn short_value_is_rejected() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move { recv_replacement(&mut server).await });

        client.send_frame(b"x").await.unwrap();
        client.recv_frame().await.unwrap();
        client.send_frame(&ParamType::Double.to_wire()).await.unwrap();
        client.recv_frame().await.unwrap();
        client.send_frame(&[0; 4]).await.unwrap();

        let err = peer.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::MalformedValue(ValueError::WrongLength { expected: 8, actual: 4, .. })
        ));
    }

    #[tokio::test]
    async fn run_must_start_with_run() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move { recv_run(&mut server).await });

        client.send_frame(b"GO").await.unwrap();

        let err = peer.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol { step: HandshakeStep::Run, expected: "RUN", .. }
        ));
    }

    #[tokio::test]
    async fn run_envelope_is_acknowledged_and_finished() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move { recv_run(&mut server).await });

        client.send_frame(b"RUN").await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), b"ACK");
        client.send_frame(b"FIN").await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), b"ACK");
        assert_eq!(client.recv_frame().await.unwrap(), b"FIN");

        assert!(peer.await.unwrap().unwrap().is_empty());
    }
}
