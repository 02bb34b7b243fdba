//! Domain-specific error types for mirrorcast.
//!
//! All fallible operations return `Result<T, CastError>`. Capture and
//! decode failures are recoverable (the caller skips the frame); every
//! transport-level variant is fatal for the connection it came from.

use thiserror::Error;

/// The canonical error type for the mirrorcast pipeline.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Configuration ────────────────────────────────────────────
    /// Missing or malformed configuration, detected before networking.
    #[error("configuration error: {0}")]
    Config(String),

    // ── Transport ────────────────────────────────────────────────
    /// The peer closed the stream (possibly in the middle of an envelope).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An envelope header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// A `payload_length` larger than the accepted maximum: the stream is
    /// out of sync and cannot be recovered.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Collaborators ────────────────────────────────────────────
    /// Frame compression or decompression failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A capture or decode produced no pixels.
    #[error("empty frame")]
    EmptyFrame,

    /// The capture source failed.
    #[error("capture error: {0}")]
    Capture(String),

    /// The render sink failed.
    #[error("render error: {0}")]
    Render(String),

    // ── Internal ─────────────────────────────────────────────────
    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CastError {
    /// Whether the error leaves the pipeline able to continue with the
    /// next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CastError::EmptyFrame | CastError::Codec(_) | CastError::Capture(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CastError {
    fn from(s: String) -> Self {
        CastError::Other(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        CastError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = CastError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = CastError::ConnectionClosed;
        assert!(e.to_string().contains("closed"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: CastError = io_err.into();
        assert!(matches!(e, CastError::Connection(_)));
        assert!(!e.is_recoverable());
    }

    #[test]
    fn capture_and_decode_failures_are_recoverable() {
        assert!(CastError::EmptyFrame.is_recoverable());
        assert!(CastError::Codec("bad zstd".into()).is_recoverable());
        assert!(!CastError::ConnectionClosed.is_recoverable());
    }
}
