//! Wire framing for screen frames on a TCP byte stream.
//!
//! Every frame travels as a fixed 16-byte header followed by the
//! compressed payload. There are no delimiters: framing relies on both
//! ends agreeing on field widths, order and byte order.
//!
//! ## Wire format
//!
//! ```text
//! capture_timestamp_ms:  i64  (8)   ms since the Unix epoch at capture start
//! sequence:              u32  (4)   0-based, +1 per transmitted frame
//! payload_len:           u32  (4)   byte count of the payload
//! payload:               [u8]       compressed image data
//! ```
//!
//! All integers use the **native** byte order of the host. Both ends of a
//! deployment must share it; there is no negotiation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CastError;

// ── Constants ────────────────────────────────────────────────────

/// Largest payload a receiver accepts before declaring the stream out of
/// sync. A raw 3840×2160 BGRA frame is ~33 MB, so this leaves ample room
/// for poorly compressible content.
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

// ── FrameHeader ──────────────────────────────────────────────────

/// Fixed-width envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub capture_timestamp_ms: i64,
    pub sequence: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 16;

    /// Serialize to bytes (native endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.capture_timestamp_ms.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.payload_len.to_ne_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, CastError> {
        let Some(bytes) = data.get(..Self::SIZE) else {
            return Err(CastError::InvalidHeader("header shorter than 16 bytes"));
        };
        let mut ts = [0u8; 8];
        let mut seq = [0u8; 4];
        let mut len = [0u8; 4];
        ts.copy_from_slice(&bytes[0..8]);
        seq.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);
        Ok(Self {
            capture_timestamp_ms: i64::from_ne_bytes(ts),
            sequence: u32::from_ne_bytes(seq),
            payload_len: u32::from_ne_bytes(len),
        })
    }
}

// ── FrameEnvelope ────────────────────────────────────────────────

/// One complete frame as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEnvelope {
    pub capture_timestamp_ms: i64,
    pub sequence: u32,
    pub payload: Bytes,
}

impl FrameEnvelope {
    pub fn new(capture_timestamp_ms: i64, sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            capture_timestamp_ms,
            sequence,
            payload: payload.into(),
        }
    }

    /// Header describing this envelope.
    pub fn header(&self) -> Result<FrameHeader, CastError> {
        let payload_len =
            u32::try_from(self.payload.len()).map_err(|_| CastError::PayloadTooLarge {
                size: self.payload.len(),
                max: u32::MAX as usize,
            })?;
        Ok(FrameHeader {
            capture_timestamp_ms: self.capture_timestamp_ms,
            sequence: self.sequence,
            payload_len,
        })
    }

    /// Bytes this envelope occupies on the wire.
    pub fn wire_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }
}

// ── EnvelopeCodec ────────────────────────────────────────────────

/// `tokio_util` codec turning a byte stream into [`FrameEnvelope`]s.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_payload: usize,
    /// Header of the envelope currently being assembled.
    pending: Option<FrameHeader>,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload,
            pending: None,
        }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = FrameEnvelope;
    type Error = CastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending {
            Some(h) => h,
            None => {
                if src.len() < FrameHeader::SIZE {
                    return Ok(None);
                }
                let h = FrameHeader::decode(&src[..FrameHeader::SIZE])?;
                if h.payload_len as usize > self.max_payload {
                    return Err(CastError::PayloadTooLarge {
                        size: h.payload_len as usize,
                        max: self.max_payload,
                    });
                }
                src.advance(FrameHeader::SIZE);
                self.pending = Some(h);
                h
            }
        };

        let len = header.payload_len as usize;
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.pending = None;
        let payload = src.split_to(len).freeze();
        Ok(Some(FrameEnvelope {
            capture_timestamp_ms: header.capture_timestamp_ms,
            sequence: header.sequence,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(envelope) => Ok(Some(envelope)),
            None if src.is_empty() && self.pending.is_none() => Ok(None),
            // Peer went away in the middle of an envelope.
            None => Err(CastError::ConnectionClosed),
        }
    }
}

impl Encoder<FrameEnvelope> for EnvelopeCodec {
    type Error = CastError;

    fn encode(&mut self, item: FrameEnvelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = item.header()?;
        dst.reserve(item.wire_len());
        dst.put_slice(&header.encode());
        dst.put_slice(&item.payload);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
