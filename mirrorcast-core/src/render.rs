//! Render sinks: where displayed frames end up.
//!
//! A sink is driven from the receiver's single consumer loop. Besides
//! [`present`](RenderSink::present) it must service its UI event queue in
//! [`pump`](RenderSink::pump); a native window that is not pumped looks
//! frozen even while frames are being drawn.

use tracing::debug;

use crate::error::CastError;
use crate::types::RawScreenFrame;

/// Whether the sink can keep accepting frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Open,
    /// The user closed the surface; the receiver should stop.
    Closed,
}

/// Displays decoded frames.
///
/// `tile` identifies the stream a frame belongs to: the port index in
/// per-connection mode, always 0 in shared-cursor mode.
pub trait RenderSink {
    fn present(&mut self, tile: usize, frame: &RawScreenFrame) -> Result<(), CastError>;

    /// Service pending UI events.
    fn pump(&mut self) -> SinkStatus {
        SinkStatus::Open
    }
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn present(&mut self, tile: usize, frame: &RawScreenFrame) -> Result<(), CastError> {
        (**self).present(tile, frame)
    }

    fn pump(&mut self) -> SinkStatus {
        (**self).pump()
    }
}

// ── HeadlessSink ─────────────────────────────────────────────────

/// Sink without a surface: counts presented frames per tile.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    presented: Vec<u64>,
    last_size: Vec<(u32, u32)>,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented on `tile` so far.
    pub fn presented(&self, tile: usize) -> u64 {
        self.presented.get(tile).copied().unwrap_or(0)
    }

    /// Frames presented across all tiles.
    pub fn total_presented(&self) -> u64 {
        self.presented.iter().sum()
    }

    /// Dimensions of the last frame presented on `tile`.
    pub fn last_size(&self, tile: usize) -> Option<(u32, u32)> {
        self.last_size.get(tile).copied()
    }
}

impl RenderSink for HeadlessSink {
    fn present(&mut self, tile: usize, frame: &RawScreenFrame) -> Result<(), CastError> {
        if self.presented.len() <= tile {
            self.presented.resize(tile + 1, 0);
            self.last_size.resize(tile + 1, (0, 0));
        }
        self.presented[tile] += 1;
        self.last_size[tile] = (frame.width, frame.height);
        debug!(
            tile,
            width = frame.width,
            height = frame.height,
            "frame presented"
        );
        Ok(())
    }
}
