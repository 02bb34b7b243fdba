//! # mirrorcast-core
//!
//! Core library for mirrorcast, live screen sharing over raw TCP.
//!
//! ## Architecture
//!
//! ```text
//! SENDER                                       RECEIVER
//! ┌────────────────────────┐                  ┌─────────────────────────────┐
//! │ CaptureSource          │                  │ FanIn (task per port)       │
//! │   ↓ resize             │                  │   ↓ decode (FrameCodec)     │
//! │ FrameCodec::encode     │   TCP, 16-byte   │ mpsc<Ingest>                │
//! │   ↓                    │   header + data  │   ↓ single consumer         │
//! │ FrameTransport::send   │ ───────────────► │ ReorderBuffer admit/select  │
//! │   ↓ pace               │                  │   ↓                         │
//! └────────────────────────┘                  │ RenderSink present + pump   │
//!                                             └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module      | Purpose                                                |
//! |-------------|--------------------------------------------------------|
//! | `wire`      | Frame header/envelope layout and the `EnvelopeCodec`   |
//! | `transport` | `FrameTransport` over any async byte stream            |
//! | `sender`    | Capture → encode → transmit → pace loop                |
//! | `reorder`   | Latency-first reorder buffer with staleness eviction   |
//! | `receiver`  | Multi-port fan-in and the display consumer             |
//! | `stats`     | Interval rate counters and reports                     |
//! | `codec`     | `FrameCodec` trait and the zstd implementation         |
//! | `capture`   | `CaptureSource` trait, GDI capture, test pattern       |
//! | `render`    | `RenderSink` trait and the headless sink               |
//! | `types`     | Raw frames, pixel formats, resolution presets          |
//! | `error`     | `CastError`                                            |

pub mod capture;
pub mod codec;
pub mod error;
pub mod receiver;
pub mod render;
pub mod reorder;
pub mod sender;
pub mod stats;
pub mod transport;
pub mod types;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{CaptureSource, GdiCapturer, TestPatternSource};
pub use codec::{FrameCodec, ZstdFrameCodec};
pub use error::CastError;
pub use receiver::{CursorMode, FanIn, FaultPolicy, Ingest, ReceiverConfig, ReceiverSummary};
pub use render::{HeadlessSink, RenderSink, SinkStatus};
pub use reorder::{Admission, PendingFrame, ReorderBuffer};
pub use sender::{FrameSender, SenderConfig, SenderSummary};
pub use stats::{ReceiverReport, ReceiverStats, SenderReport, SenderStats};
pub use transport::FrameTransport;
pub use types::{PixelFormat, RawScreenFrame, Resolution, unix_millis};
pub use wire::{EnvelopeCodec, FrameEnvelope, FrameHeader, MAX_PAYLOAD_SIZE};
