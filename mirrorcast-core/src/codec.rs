//! Frame compression.
//!
//! The pipeline only needs "pixels in, bytes out" and the reverse, so the
//! codec sits behind the [`FrameCodec`] trait. [`ZstdFrameCodec`] is the
//! built-in implementation:
//!
//! ```text
//! width:     u32 LE  (4)
//! height:    u32 LE  (4)
//! format:    u8      (1)   PixelFormat tag
//! reserved:  [u8; 3] (3)
//! pixels:    zstd(tightly packed rows)
//! ```

use crate::error::CastError;
use crate::types::{PixelFormat, RawScreenFrame};

/// Encodes raw frames to a compressed payload and back.
///
/// Implementations are shared between connection tasks on the receiver,
/// hence `Send + Sync`.
pub trait FrameCodec: Send + Sync {
    fn encode(&self, frame: &RawScreenFrame) -> Result<Vec<u8>, CastError>;

    /// Decode a payload. A result without pixels is an error
    /// ([`CastError::EmptyFrame`]), never an empty frame.
    fn decode(&self, payload: &[u8]) -> Result<RawScreenFrame, CastError>;
}

// ── ZstdFrameCodec ───────────────────────────────────────────────

const IMAGE_HEADER_SIZE: usize = 12;

/// Largest decoded image accepted from a peer (an 8K BGRA frame is
/// ~133 MB).
pub const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// Lossless zstd codec over tightly packed pixel rows.
#[derive(Debug, Clone)]
pub struct ZstdFrameCodec {
    /// zstd level (1 = fast / less compression, 19 = slow / max).
    level: i32,
}

impl ZstdFrameCodec {
    pub fn new(level: i32) -> Self {
        Self {
            level: level.clamp(1, 19),
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdFrameCodec {
    fn default() -> Self {
        // Favour speed: live view cares about latency, not ratio.
        Self::new(1)
    }
}

impl FrameCodec for ZstdFrameCodec {
    fn encode(&self, frame: &RawScreenFrame) -> Result<Vec<u8>, CastError> {
        if frame.is_empty() {
            return Err(CastError::EmptyFrame);
        }

        let raw = frame.packed_rows();
        let compressed = zstd::encode_all(raw.as_slice(), self.level)
            .map_err(|e| CastError::Codec(format!("zstd encode failed: {e}")))?;

        let mut out = Vec::with_capacity(IMAGE_HEADER_SIZE + compressed.len());
        out.extend_from_slice(&frame.width.to_le_bytes());
        out.extend_from_slice(&frame.height.to_le_bytes());
        out.push(frame.format.tag());
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn decode(&self, payload: &[u8]) -> Result<RawScreenFrame, CastError> {
        if payload.len() < IMAGE_HEADER_SIZE {
            return Err(CastError::Codec(format!(
                "payload too short for image header: {} < {IMAGE_HEADER_SIZE}",
                payload.len()
            )));
        }

        let width = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let height = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let format = PixelFormat::from_tag(payload[8])
            .ok_or_else(|| CastError::Codec(format!("unknown pixel format tag {}", payload[8])))?;

        if width == 0 || height == 0 {
            return Err(CastError::EmptyFrame);
        }

        // Dimensions come from the peer: every product is checked.
        let bpp = format.bytes_per_pixel();
        let stride = width
            .checked_mul(bpp as u32)
            .ok_or_else(|| CastError::Codec(format!("row stride overflows for width {width}")))?;
        let expected = (stride as usize)
            .checked_mul(height as usize)
            .filter(|&n| n <= MAX_DECODED_SIZE)
            .ok_or_else(|| {
                CastError::Codec(format!("image {width}x{height} exceeds {MAX_DECODED_SIZE} bytes"))
            })?;

        let pixels = zstd::bulk::decompress(&payload[IMAGE_HEADER_SIZE..], expected)
            .map_err(|e| CastError::Codec(format!("zstd decode failed: {e}")))?;

        if pixels.len() != expected {
            return Err(CastError::Codec(format!(
                "decoded image size mismatch: {} != {expected}",
                pixels.len()
            )));
        }

        Ok(RawScreenFrame::packed(width, height, format, pixels))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(w: u32, h: u32, fill: u8) -> RawScreenFrame {
        RawScreenFrame::packed(w, h, PixelFormat::Bgra8, vec![fill; (w * h * 4) as usize])
    }

    #[test]
    fn encode_compresses_flat_frames() {
        let codec = ZstdFrameCodec::default();
        let frame = test_frame(128, 128, 0xAB);
        let encoded = codec.encode(&frame).unwrap();
        assert!(encoded.len() < frame.data.len());
    }

    #[test]
    fn decode_restores_pixels() {
        let codec = ZstdFrameCodec::new(3);
        let frame = test_frame(64, 32, 0xCD);
        let decoded = codec.decode(&codec.encode(&frame).unwrap()).unwrap();
        assert_eq!(decoded.width, 64);
        assert_eq!(decoded.height, 32);
        assert_eq!(decoded.format, PixelFormat::Bgra8);
        assert!(decoded.data.iter().all(|&b| b == 0xCD));
    }

    #[test]
    fn padded_stride_is_dropped_on_encode() {
        let codec = ZstdFrameCodec::default();
        let frame = RawScreenFrame {
            width: 3,
            height: 2,
            stride: 16,
            format: PixelFormat::Bgra8,
            data: vec![7; 32],
        };
        let decoded = codec.decode(&codec.encode(&frame).unwrap()).unwrap();
        assert_eq!(decoded.stride, 12);
        assert_eq!(decoded.data.len(), 24);
    }

    #[test]
    fn empty_frame_is_rejected() {
        let codec = ZstdFrameCodec::default();
        assert!(matches!(
            codec.encode(&RawScreenFrame::empty(PixelFormat::Bgra8)),
            Err(CastError::EmptyFrame)
        ));

        let mut zero_sized = vec![0u8; IMAGE_HEADER_SIZE];
        zero_sized.extend(zstd::encode_all(&[][..], 1).unwrap());
        assert!(matches!(codec.decode(&zero_sized), Err(CastError::EmptyFrame)));
    }

    #[test]
    fn garbage_payload_is_codec_error() {
        let codec = ZstdFrameCodec::default();
        assert!(matches!(codec.decode(b"short"), Err(CastError::Codec(_))));

        let mut bad = Vec::new();
        bad.extend_from_slice(&4u32.to_le_bytes());
        bad.extend_from_slice(&4u32.to_le_bytes());
        bad.extend_from_slice(&[0, 0, 0, 0]);
        bad.extend_from_slice(b"definitely not zstd");
        assert!(matches!(codec.decode(&bad), Err(CastError::Codec(_))));
    }

    fn payload_with_header(width: u32, height: u32, tag: u8, pixels: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&[tag, 0, 0, 0]);
        out.extend(zstd::encode_all(pixels, 1).unwrap());
        out
    }

    #[test]
    fn hostile_dimensions_are_codec_errors() {
        let codec = ZstdFrameCodec::default();

        // Products that wrap to zero in 32 and 64 bits.
        let huge = payload_with_header(1 << 31, 1 << 31, 0, &[]);
        assert!(matches!(codec.decode(&huge), Err(CastError::Codec(_))));
        let wide = payload_with_header(u32::MAX, 1, 0, &[]);
        assert!(matches!(codec.decode(&wide), Err(CastError::Codec(_))));

        // Within u64 but far above the decoded-size limit.
        let big = payload_with_header(100_000, 100_000, 0, &[0; 16]);
        assert!(matches!(codec.decode(&big), Err(CastError::Codec(_))));
    }

    #[test]
    fn decoded_size_must_match_dimensions() {
        let codec = ZstdFrameCodec::default();
        let short = payload_with_header(2, 2, 0, &[0; 8]);
        assert!(matches!(codec.decode(&short), Err(CastError::Codec(_))));
        // More pixels than declared overflow the bounded buffer.
        let long = payload_with_header(2, 2, 0, &[0; 64]);
        assert!(matches!(codec.decode(&long), Err(CastError::Codec(_))));
        let exact = payload_with_header(2, 2, 0, &[0; 16]);
        assert_eq!(codec.decode(&exact).unwrap().data.len(), 16);
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(ZstdFrameCodec::new(0).level(), 1);
        assert_eq!(ZstdFrameCodec::new(40).level(), 19);
    }
}
