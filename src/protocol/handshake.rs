//! Client side of the acknowledgement handshakes.
//!
//! Every frame the client sends is answered by the server before the next
//! one goes out. A replacement takes three round trips (path, tag, value);
//! a run wraps any number of replacements in `RUN`/ACK ... `FIN`/ACK and then
//! waits for the server's own `FIN`.
//!
//! Failures are never retried. Once a step fails, nothing more is written and
//! the server's parameter set must be treated as undefined.

use std::borrow::Cow;

use tracing::{debug, trace, warn};

use super::replacement::Replacement;
use super::{HandshakeStep, ACK, FIN, RUN};
use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Progress of a run transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// `RUN` written, waiting for its ACK.
    SentRun,
    /// Inside the three-step exchange for change `index`.
    SendingChange { index: usize, step: HandshakeStep },
    AllSent,
    /// `FIN` written, waiting for its ACK.
    SentFin,
    AwaitingServerFin,
    Done,
    Failed,
}

/// Read one frame and require it to equal `expected`.
pub(crate) async fn expect_frame(
    transport: &mut dyn Transport,
    step: HandshakeStep,
    expected: &'static str,
) -> Result<()> {
    let received = transport.recv_frame().await?;
    if received != expected.as_bytes() {
        return Err(ClientError::Protocol {
            step,
            expected,
            received,
        });
    }
    Ok(())
}

async fn send_and_ack(
    transport: &mut dyn Transport,
    step: HandshakeStep,
    payload: &[u8],
) -> Result<()> {
    transport.send_frame(payload).await?;
    expect_frame(transport, step, ACK).await
}

fn replacement_frames(replacement: &Replacement) -> [(HandshakeStep, Cow<'_, [u8]>); 3] {
    [
        (HandshakeStep::Path, Cow::Borrowed(replacement.path().as_bytes())),
        (
            HandshakeStep::ParamType,
            Cow::Owned(replacement.param_type().to_wire().to_vec()),
        ),
        (HandshakeStep::Value, Cow::Borrowed(replacement.value_bytes())),
    ]
}

/// Send one replacement: path, tag and value, each acknowledged.
pub async fn send_replacement(
    transport: &mut dyn Transport,
    replacement: &Replacement,
) -> Result<()> {
    debug!(
        path = %replacement.path(),
        param_type = %replacement.param_type(),
        len = replacement.value_bytes().len(),
        "Sending replacement"
    );
    for (step, payload) in replacement_frames(replacement) {
        send_and_ack(transport, step, &payload).await?;
    }
    Ok(())
}

/// Apply `replacements` in order and run the simulation.
pub async fn run_with_changes(
    transport: &mut dyn Transport,
    replacements: &[Replacement],
) -> Result<()> {
    RunTransaction::new(transport).run(replacements).await
}

/// A run transaction driven step by step, exposing its state.
pub struct RunTransaction<'a> {
    transport: &'a mut dyn Transport,
    state: RunState,
}

impl<'a> RunTransaction<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self {
            transport,
            state: RunState::Idle,
        }
    }

    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Run the whole transaction. On error the state is left at `Failed`.
    ///
    /// Each call starts a fresh transaction from `Idle`.
    pub async fn run(&mut self, replacements: &[Replacement]) -> Result<()> {
        self.state = RunState::Idle;
        debug!(changes = replacements.len(), "Starting run transaction");
        match self.drive(replacements).await {
            Ok(()) => {
                debug!(changes = replacements.len(), "Run completed");
                Ok(())
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "Run transaction failed");
                self.enter(RunState::Failed);
                Err(e)
            }
        }
    }

    fn enter(&mut self, state: RunState) {
        trace!(from = ?self.state, to = ?state, "Run state transition");
        self.state = state;
    }

    async fn drive(&mut self, replacements: &[Replacement]) -> Result<()> {
        self.transport.send_frame(RUN.as_bytes()).await?;
        self.enter(RunState::SentRun);
        expect_frame(self.transport, HandshakeStep::Run, ACK).await?;

        for (index, replacement) in replacements.iter().enumerate() {
            trace!(index, path = %replacement.path(), "Sending change");
            for (step, payload) in replacement_frames(replacement) {
                self.enter(RunState::SendingChange { index, step });
                send_and_ack(self.transport, step, &payload).await?;
            }
        }
        self.enter(RunState::AllSent);

        self.transport.send_frame(FIN.as_bytes()).await?;
        self.enter(RunState::SentFin);
        expect_frame(self.transport, HandshakeStep::Fin, ACK).await?;

        self.enter(RunState::AwaitingServerFin);
        expect_frame(self.transport, HandshakeStep::Completion, FIN).await?;

        self.enter(RunState::Done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::peer::{recv_replacement, recv_run};
    use crate::protocol::{ParamType, Value};
    use crate::transport::StreamTransport;

    /// Encode a frame the way the server writes it.
    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut buf = u32::try_from(payload.len()).unwrap().to_le_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    fn pair() -> (StreamTransport<tokio::io::DuplexStream>, StreamTransport<tokio::io::DuplexStream>) {
        let (client, server) = tokio::io::duplex(1024);
        (StreamTransport::new(client), StreamTransport::new(server))
    }

    #[tokio::test]
    async fn replacement_is_three_acknowledged_frames() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"xyz"))
            .read(&frame(b"ACK"))
            .write(&frame(&[0, 0, 0, 0]))
            .read(&frame(b"ACK"))
            .write(&frame(&(-65536i32).to_le_bytes()))
            .read(&frame(b"ACK"))
            .build();
        let mut transport = StreamTransport::new(mock);

        send_replacement(&mut transport, &Replacement::int("xyz", -65536))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bad_ack_stops_the_exchange() {
        // The mock has nothing left to accept after the path frame.
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"xyz"))
            .read(&frame(b"NAK"))
            .build();
        let mut transport = StreamTransport::new(mock);

        let err = send_replacement(&mut transport, &Replacement::int("xyz", 1))
            .await
            .unwrap_err();
        match err {
            ClientError::Protocol {
                step,
                expected,
                received,
            } => {
                assert_eq!(step, HandshakeStep::Path);
                assert_eq!(expected, "ACK");
                assert_eq!(received, b"NAK");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_run_envelope() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"RUN"))
            .read(&frame(b"ACK"))
            .write(&frame(b"FIN"))
            .read(&frame(b"ACK"))
            .read(&frame(b"FIN"))
            .build();
        let mut transport = StreamTransport::new(mock);

        run_with_changes(&mut transport, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_run_sends_no_changes() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"RUN"))
            .read(&frame(b"ERR"))
            .build();
        let mut transport = StreamTransport::new(mock);

        let mut txn = RunTransaction::new(&mut transport);
        let err = txn
            .run(&[Replacement::int("a", 1), Replacement::int("b", 2)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol { step: HandshakeStep::Run, .. }
        ));
        assert_eq!(txn.state(), RunState::Failed);
    }

    /// Run `changes` against a scripted server and return the step that failed.
    async fn failing_step(mock: tokio_test::io::Mock, changes: &[Replacement]) -> HandshakeStep {
        let mut transport = StreamTransport::new(mock);
        let mut txn = RunTransaction::new(&mut transport);
        let err = txn.run(changes).await.unwrap_err();
        assert_eq!(txn.state(), RunState::Failed);
        match err {
            ClientError::Protocol {
                step,
                expected,
                received,
            } => {
                assert_eq!(expected, "ACK");
                assert_eq!(received, b"NAK");
                step
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_tag_stops_the_run() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"RUN"))
            .read(&frame(b"ACK"))
            .write(&frame(b"a"))
            .read(&frame(b"ACK"))
            .write(&frame(&[0, 0, 0, 0]))
            .read(&frame(b"NAK"))
            .build();

        let step = failing_step(mock, &[Replacement::int("a", 7), Replacement::int("b", 8)]).await;
        assert_eq!(step, HandshakeStep::ParamType);
    }

    #[tokio::test]
    async fn rejected_value_stops_the_run() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"RUN"))
            .read(&frame(b"ACK"))
            .write(&frame(b"a"))
            .read(&frame(b"ACK"))
            .write(&frame(&[0, 0, 0, 0]))
            .read(&frame(b"ACK"))
            .write(&frame(&7i32.to_le_bytes()))
            .read(&frame(b"NAK"))
            .build();

        let step = failing_step(mock, &[Replacement::int("a", 7), Replacement::int("b", 8)]).await;
        assert_eq!(step, HandshakeStep::Value);
    }

    #[tokio::test]
    async fn rejected_fin_skips_the_completion_wait() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"RUN"))
            .read(&frame(b"ACK"))
            .write(&frame(b"FIN"))
            .read(&frame(b"NAK"))
            .build();

        let step = failing_step(mock, &[]).await;
        assert_eq!(step, HandshakeStep::Fin);
    }

    #[tokio::test]
    async fn wrong_completion_frame_is_protocol_error() {
        let mock = tokio_test::io::Builder::new()
            .write(&frame(b"RUN"))
            .read(&frame(b"ACK"))
            .write(&frame(b"FIN"))
            .read(&frame(b"ACK"))
            .read(&frame(b"ACK"))
            .build();
        let mut transport = StreamTransport::new(mock);

        let err = run_with_changes(&mut transport, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol {
                step: HandshakeStep::Completion,
                expected: "FIN",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_completion_frame_is_reported() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move {
            assert_eq!(server.recv_frame().await.unwrap(), b"RUN");
            server.send_frame(b"ACK").await.unwrap();
            assert_eq!(server.recv_frame().await.unwrap(), b"FIN");
            server.send_frame(b"ACK").await.unwrap();
            // Hang up instead of sending the completion FIN.
        });

        let err = run_with_changes(&mut client, &[]).await.unwrap_err();
        peer.await.unwrap();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn transaction_reaches_done() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move { recv_run(&mut server).await });

        let changes = [Replacement::double("xyz", 12.5)];
        let mut txn = RunTransaction::new(&mut client);
        assert_eq!(txn.state(), RunState::Idle);
        txn.run(&changes).await.unwrap();
        assert_eq!(txn.state(), RunState::Done);

        assert_eq!(peer.await.unwrap().unwrap(), changes);
    }

    #[tokio::test]
    async fn transaction_runs_again_from_idle() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move {
            let first = recv_run(&mut server).await.unwrap();
            let second = recv_run(&mut server).await.unwrap();
            (first, second)
        });

        let mut txn = RunTransaction::new(&mut client);
        txn.run(&[Replacement::int("a", 1)]).await.unwrap();
        txn.run(&[Replacement::int("b", 2)]).await.unwrap();
        assert_eq!(txn.state(), RunState::Done);

        let (first, second) = peer.await.unwrap();
        assert_eq!(first, [Replacement::int("a", 1)]);
        assert_eq!(second, [Replacement::int("b", 2)]);
    }

    #[tokio::test]
    async fn replacement_roundtrip_for_every_type() {
        let values = [
            Value::Integer(i32::MIN),
            Value::Double(f64::MAX),
            Value::Boolean(false),
            Value::String("Ünïcode path value".into()),
            Value::IntegerArray(vec![1, 2, 3]),
            Value::DoubleArray(vec![]),
            Value::BooleanArray(vec![true, false]),
        ];

        for value in values {
            let (mut client, mut server) = pair();
            let peer = tokio::spawn(async move { recv_replacement(&mut server).await });

            let sent = Replacement::new("[Paddock].Field", &value);
            send_replacement(&mut client, &sent).await.unwrap();

            let received = peer.await.unwrap().unwrap();
            assert_eq!(received, sent);
            assert_eq!(received.value().unwrap(), value);
        }
    }

    #[tokio::test]
    async fn changes_arrive_in_order() {
        let (mut client, mut server) = pair();
        let peer = tokio::spawn(async move { recv_run(&mut server).await });

        let changes: Vec<_> = (0..10)
            .map(|i| Replacement::int(format!("change[{i}]"), i))
            .collect();
        run_with_changes(&mut client, &changes).await.unwrap();

        let received = peer.await.unwrap().unwrap();
        assert_eq!(received, changes);
        assert!(received
            .iter()
            .all(|r| r.param_type() == ParamType::Integer));
    }
}
