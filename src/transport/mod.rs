//! Transport layer for client ↔ simulation server communication.
//!
//! Provides the `Transport` trait and the length-prefixed framing functions.
//! Frames are `[4-byte little-endian length][payload bytes]`; the length is a
//! byte count and payloads carry no nested length fields.

pub mod unix_socket;

pub use unix_socket::{connect, SocketListener};

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ClientError, Result};

/// Default maximum frame size (64 MB). Safety valve against malformed lengths.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Abstraction over one ordered, reliable byte stream carrying frames.
///
/// Implementations are driven by exactly one exchange at a time; callers that
/// share a transport must hold a lock for the whole exchange, not per frame.
#[async_trait]
pub trait Transport: Send {
    /// Write one frame, blocking until every byte has been handed to the stream.
    async fn send_frame(&mut self, payload: &[u8]) -> Result<()>;

    /// Read one complete frame.
    async fn recv_frame(&mut self) -> Result<Vec<u8>>;

    /// Close the write side of the stream.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Write a length-prefixed frame to a writer.
///
/// Payloads larger than `max_frame_size` are rejected before anything is written.
pub async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: u32,
) -> Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= max_frame_size)
        .ok_or(ClientError::FrameTooLarge {
            len: payload.len() as u64,
            max: max_frame_size,
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed frame from a reader.
///
/// A clean EOF before the first length byte means the peer hung up and is
/// reported as `ConnectionClosed`; EOF anywhere later is a transport error.
pub async fn recv_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: u32,
) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {filled} of {LENGTH_PREFIX_SIZE} length bytes"),
            )
            .into());
        }
        filled += n;
    }

    let len = u32::from_le_bytes(len_buf);
    if len > max_frame_size {
        return Err(ClientError::FrameTooLarge {
            len: len.into(),
            max: max_frame_size,
        });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Frame transport over any async byte stream.
///
/// Used with `UnixStream` in production and with in-memory streams in tests.
pub struct StreamTransport<S> {
    stream: S,
    max_frame_size: u32,
    io_timeout: Option<Duration>,
}

impl<S> StreamTransport<S> {
    /// Wrap a stream with the default frame limit and no timeout.
    pub const fn new(stream: S) -> Self {
        Self {
            stream,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            io_timeout: None,
        }
    }

    /// Set the largest frame accepted in either direction.
    #[must_use]
    pub const fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Bound every frame read and write by `timeout`.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }
}

async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Timeout(limit))?,
        None => fut.await,
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport for StreamTransport<S> {
    async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        trace!(len = payload.len(), "Sending frame");
        with_timeout(
            self.io_timeout,
            send_frame(&mut self.stream, payload, self.max_frame_size),
        )
        .await
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>> {
        let frame = with_timeout(
            self.io_timeout,
            recv_frame(&mut self.stream, self.max_frame_size),
        )
        .await?;
        trace!(len = frame.len(), "Received frame");
        Ok(frame)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
