//! Blocking-style frame transport over a reliable, ordered byte stream.
//!
//! [`FrameTransport`] wraps any `AsyncRead`/`AsyncWrite` stream (in
//! production a `TcpStream`) in a `Framed` using [`EnvelopeCodec`]. Each
//! call moves exactly one envelope; a connection fault surfaces as an
//! error and the transport should be dropped afterwards.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::error::CastError;
use crate::wire::{EnvelopeCodec, FrameEnvelope};

/// One end of a frame stream.
pub struct FrameTransport<T> {
    framed: Framed<T, EnvelopeCodec>,
    bytes_sent: u64,
    bytes_received: u64,
    frames_sent: u64,
    frames_received: u64,
}

impl FrameTransport<TcpStream> {
    /// Connect to a receiver. Nagle is disabled since every envelope is
    /// written as soon as it is encoded.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, CastError> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_tcp(stream)
    }

    /// Wrap an accepted TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self, CastError> {
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    /// Remote address of the underlying socket.
    pub fn peer_addr(&self) -> Result<SocketAddr, CastError> {
        Ok(self.framed.get_ref().peer_addr()?)
    }
}

impl<T> FrameTransport<T> {
    /// Wrap an arbitrary stream with the default payload limit.
    pub fn new(stream: T) -> Self
    where
        T: AsyncRead + AsyncWrite,
    {
        Self::with_codec(stream, EnvelopeCodec::new())
    }

    pub fn with_codec(stream: T, codec: EnvelopeCodec) -> Self
    where
        T: AsyncRead + AsyncWrite,
    {
        Self {
            framed: Framed::new(stream, codec),
            bytes_sent: 0,
            bytes_received: 0,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Total bytes written (headers included).
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Total bytes read (headers included).
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Consume the transport and return the underlying stream.
    pub fn into_inner(self) -> T {
        self.framed.into_inner()
    }
}

impl<T: AsyncWrite + Unpin> FrameTransport<T> {
    /// Write one envelope and flush it.
    ///
    /// Resolves once every byte has been handed to the stream, or fails
    /// with the underlying I/O fault.
    pub async fn send_frame(
        &mut self,
        capture_timestamp_ms: i64,
        sequence: u32,
        payload: impl Into<Bytes>,
    ) -> Result<(), CastError> {
        let envelope = FrameEnvelope::new(capture_timestamp_ms, sequence, payload);
        self.send_envelope(envelope).await
    }

    pub async fn send_envelope(&mut self, envelope: FrameEnvelope) -> Result<(), CastError> {
        let wire_len = envelope.wire_len() as u64;
        let sequence = envelope.sequence;
        self.framed.send(envelope).await?;
        self.bytes_sent += wire_len;
        self.frames_sent += 1;
        trace!(sequence, bytes = wire_len, "frame sent");
        Ok(())
    }
}

impl<T: AsyncRead + Unpin> FrameTransport<T> {
    /// Read the next complete envelope.
    ///
    /// Fails with [`CastError::ConnectionClosed`] when the peer closes the
    /// stream, whether cleanly between envelopes or in the middle of one.
    pub async fn receive_frame(&mut self) -> Result<FrameEnvelope, CastError> {
        match self.framed.next().await {
            Some(Ok(envelope)) => {
                self.bytes_received += envelope.wire_len() as u64;
                self.frames_received += 1;
                trace!(
                    sequence = envelope.sequence,
                    bytes = envelope.payload.len(),
                    "frame received"
                );
                Ok(envelope)
            }
            Some(Err(e)) => Err(e),
            None => {
                debug!("peer closed the stream");
                Err(CastError::ConnectionClosed)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
