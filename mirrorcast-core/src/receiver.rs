//! Multi-port receiver: one task per connection, one consumer.
//!
//! ```text
//!  port 0 ─► [accept → receive → decode] ─┐
//!  port 1 ─► [accept → receive → decode] ─┼─► mpsc<Ingest> ─► consumer
//!  port N ─► [accept → receive → decode] ─┘     admit → evict → select
//!                                               → present → pump → stats
//! ```
//!
//! Connection tasks never touch reorder state. The consumer is the only
//! owner of every [`ReorderBuffer`], so admission is sequential without
//! locks, and a slow or silent connection never blocks the others.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::codec::FrameCodec;
use crate::error::CastError;
use crate::render::{RenderSink, SinkStatus};
use crate::reorder::ReorderBuffer;
use crate::stats::{DEFAULT_REPORT_INTERVAL, ReceiverReport, ReceiverStats};
use crate::transport::FrameTransport;
use crate::types::{RawScreenFrame, unix_millis};

/// Idle interval at which the sink's event queue is serviced.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(16);

const INGEST_CHANNEL_CAPACITY: usize = 64;

/// Delays beyond this (either sign) mean the timestamp is garbage, not
/// clock skew, and are left out of the average.
const MAX_PLAUSIBLE_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

// ── Policies ─────────────────────────────────────────────────────

/// How display cursors relate to connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorMode {
    /// One reorder buffer per port, each drawn on its own tile.
    #[default]
    PerConnection,
    /// One reorder buffer for every port. Sequence spaces of different
    /// senders merge, so a sender that is ahead evicts the others'
    /// frames. Everything is drawn on tile 0.
    Shared,
}

impl CursorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CursorMode::PerConnection => "per-connection",
            CursorMode::Shared => "shared",
        }
    }
}

impl fmt::Display for CursorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CursorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "per-connection" | "per_connection" => Ok(CursorMode::PerConnection),
            "shared" => Ok(CursorMode::Shared),
            other => Err(format!(
                "unknown cursor mode '{other}' (expected per-connection or shared)"
            )),
        }
    }
}

/// What a connection fault does to the rest of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultPolicy {
    /// Log the fault and keep serving the remaining connections.
    #[default]
    Isolate,
    /// The first fault ends the receiver with that error.
    Terminate,
}

impl FaultPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultPolicy::Isolate => "isolate",
            FaultPolicy::Terminate => "terminate",
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isolate" => Ok(FaultPolicy::Isolate),
            "terminate" => Ok(FaultPolicy::Terminate),
            other => Err(format!(
                "unknown fault policy '{other}' (expected isolate or terminate)"
            )),
        }
    }
}

// ── ReceiverConfig ───────────────────────────────────────────────

/// Configuration for [`FanIn`].
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Listening ports; the index of a port is its source/tile id.
    pub ports: Vec<u16>,
    pub cursor_mode: CursorMode,
    pub fault_policy: FaultPolicy,
    pub report_interval: Duration,
    /// Tile grid (columns, rows) of the render surface.
    pub grid: (u32, u32),
}

impl ReceiverConfig {
    /// Number of reorder buffers (and tiles) the consumer drives.
    pub fn stream_count(&self) -> usize {
        match self.cursor_mode {
            CursorMode::PerConnection => self.ports.len(),
            CursorMode::Shared => 1,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            ports: vec![12345],
            cursor_mode: CursorMode::default(),
            fault_policy: FaultPolicy::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            grid: (1, 1),
        }
    }
}

// ── Ingest ───────────────────────────────────────────────────────

/// Message from a connection task to the consumer.
#[derive(Debug)]
pub enum Ingest {
    /// A decoded frame ready for admission.
    Frame {
        source: usize,
        sequence: u32,
        capture_timestamp_ms: i64,
        wire_bytes: u64,
        frame: RawScreenFrame,
    },
    /// A payload that failed to decode; it is never admitted.
    Dropped {
        source: usize,
        sequence: u32,
        error: CastError,
    },
    /// The connection ended. Always the last message from its task.
    Closed { source: usize, error: CastError },
}

/// Totals over the whole receiver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverSummary {
    pub frames_received: u64,
    pub frames_displayed: u64,
    pub decode_failures: u64,
    pub stale_evictions: u64,
    /// Final display cursor of each reorder buffer.
    pub cursors: Vec<Option<u32>>,
    /// Frames left pending in each reorder buffer.
    pub pending: Vec<usize>,
}

// ── FanIn ────────────────────────────────────────────────────────

/// Bound listeners plus the codec used to decode their frames.
pub struct FanIn<C> {
    listeners: Vec<TcpListener>,
    codec: Arc<C>,
    config: ReceiverConfig,
}

impl<C: FrameCodec + 'static> FanIn<C> {
    /// Bind every configured port on all interfaces.
    ///
    /// All listeners are bound before any connection is accepted, so a
    /// port clash fails here rather than after a sender has connected.
    pub async fn bind(config: ReceiverConfig, codec: C) -> Result<Self, CastError> {
        if config.ports.is_empty() {
            return Err(CastError::Config("no receive ports configured".into()));
        }
        let mut listeners = Vec::with_capacity(config.ports.len());
        for &port in &config.ports {
            let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
                error!(port, "bind failed: {e}");
                CastError::Connection(e)
            })?;
            info!(port, "listening");
            listeners.push(listener);
        }
        Ok(Self::from_listeners(listeners, codec, config))
    }

    /// Use listeners that are already bound. `config.ports` is replaced
    /// by their local ports.
    pub fn from_listeners(listeners: Vec<TcpListener>, codec: C, mut config: ReceiverConfig) -> Self {
        config.ports = listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .map(|addr| addr.port())
            .collect();
        Self {
            listeners,
            codec: Arc::new(codec),
            config,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Local addresses of the bound listeners, in source order.
    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>, CastError> {
        self.listeners
            .iter()
            .map(|l| l.local_addr().map_err(CastError::from))
            .collect()
    }

    /// Accept one connection per port and display frames until every
    /// connection has closed, the sink is closed, or (with
    /// [`FaultPolicy::Terminate`]) the first connection fault.
    pub async fn run<R: RenderSink + ?Sized>(
        self,
        sink: &mut R,
    ) -> Result<ReceiverSummary, CastError> {
        let FanIn {
            listeners,
            codec,
            config,
        } = self;

        let (grid_w, grid_h) = config.grid;
        if config.stream_count() > (grid_w as usize) * (grid_h as usize) {
            warn!(
                streams = config.stream_count(),
                grid_w, grid_h, "more streams than grid tiles"
            );
        }

        let (tx, mut rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);
        let mut open = listeners.len();
        let handles: Vec<_> = listeners
            .into_iter()
            .enumerate()
            .map(|(source, listener)| {
                tokio::spawn(connection_task(
                    source,
                    listener,
                    Arc::clone(&codec),
                    tx.clone(),
                ))
            })
            .collect();
        drop(tx);

        let mut consumer = Consumer::new(&config);
        let mut tick = tokio::time::interval(PUMP_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(Ingest::Frame { source, sequence, capture_timestamp_ms, wire_bytes, frame }) => {
                        match consumer.on_frame(sink, source, sequence, capture_timestamp_ms, wire_bytes, frame) {
                            Ok(SinkStatus::Open) => {}
                            Ok(SinkStatus::Closed) => {
                                info!("render surface closed");
                                break Ok(());
                            }
                            Err(e) => break Err(e),
                        }
                    }
                    Some(Ingest::Dropped { source, sequence, error }) => {
                        warn!(source, sequence, "frame dropped: {error}");
                        consumer.on_decode_failure();
                    }
                    Some(Ingest::Closed { source, error }) => {
                        open = open.saturating_sub(1);
                        match config.fault_policy {
                            FaultPolicy::Terminate => {
                                error!(source, "connection lost: {error}");
                                break Err(error);
                            }
                            FaultPolicy::Isolate => {
                                warn!(source, remaining = open, "connection lost: {error}");
                            }
                        }
                    }
                    None => {
                        info!("all connections closed");
                        break Ok(());
                    }
                },
                _ = tick.tick() => {
                    if sink.pump() == SinkStatus::Closed {
                        info!("render surface closed");
                        break Ok(());
                    }
                    consumer.report_if_due();
                }
            }
        };

        for handle in &handles {
            handle.abort();
        }
        outcome?;

        let summary = consumer.summary();
        info!(
            received = summary.frames_received,
            displayed = summary.frames_displayed,
            "receiver stopped"
        );
        Ok(summary)
    }
}

// ── Connection task ──────────────────────────────────────────────

async fn connection_task<C: FrameCodec>(
    source: usize,
    listener: TcpListener,
    codec: Arc<C>,
    tx: mpsc::Sender<Ingest>,
) {
    if let Err(error) = serve_connection(source, listener, codec.as_ref(), &tx).await {
        let _ = tx.send(Ingest::Closed { source, error }).await;
    }
}

/// Accept exactly one sender, then forward its frames until the stream
/// fails. Returns `Ok` only when the consumer has gone away.
async fn serve_connection<C: FrameCodec>(
    source: usize,
    listener: TcpListener,
    codec: &C,
    tx: &mpsc::Sender<Ingest>,
) -> Result<(), CastError> {
    let (stream, peer) = listener.accept().await?;
    info!(source, %peer, "sender connected");
    drop(listener);

    let mut transport = FrameTransport::from_tcp(stream)?;
    loop {
        let envelope = transport.receive_frame().await?;
        let wire_bytes = envelope.wire_len() as u64;
        let msg = match codec.decode(&envelope.payload) {
            Ok(frame) => Ingest::Frame {
                source,
                sequence: envelope.sequence,
                capture_timestamp_ms: envelope.capture_timestamp_ms,
                wire_bytes,
                frame,
            },
            Err(error) => Ingest::Dropped {
                source,
                sequence: envelope.sequence,
                error,
            },
        };
        if tx.send(msg).await.is_err() {
            debug!(source, "consumer gone; closing connection");
            return Ok(());
        }
    }
}

// ── Consumer ─────────────────────────────────────────────────────

/// State owned by the single consumer: reorder buffers and counters.
struct Consumer {
    mode: CursorMode,
    buffers: Vec<ReorderBuffer<RawScreenFrame>>,
    stats: ReceiverStats,
    report_interval: Duration,
    frames_received: u64,
    decode_failures: u64,
}

impl Consumer {
    fn new(config: &ReceiverConfig) -> Self {
        Self {
            mode: config.cursor_mode,
            buffers: (0..config.stream_count())
                .map(|_| ReorderBuffer::new())
                .collect(),
            stats: ReceiverStats::new(),
            report_interval: config.report_interval,
            frames_received: 0,
            decode_failures: 0,
        }
    }

    fn slot(&self, source: usize) -> usize {
        match self.mode {
            CursorMode::PerConnection => source,
            CursorMode::Shared => 0,
        }
    }

    fn on_frame<R: RenderSink + ?Sized>(
        &mut self,
        sink: &mut R,
        source: usize,
        sequence: u32,
        capture_timestamp_ms: i64,
        wire_bytes: u64,
        frame: RawScreenFrame,
    ) -> Result<SinkStatus, CastError> {
        let slot = self.slot(source);
        let Some(buffer) = self.buffers.get_mut(slot) else {
            return Err(CastError::Other(format!("no reorder buffer for source {source}")));
        };

        self.frames_received += 1;
        self.stats.record_received(wire_bytes);

        let admission = buffer.admit(sequence, capture_timestamp_ms, frame);
        if admission.evicted > 0 {
            debug!(source, sequence, evicted = admission.evicted, "stale frames evicted");
            self.stats.record_evictions(admission.evicted);
        }
        if admission.replaced {
            debug!(source, sequence, "duplicate sequence replaced");
        }

        if let Some(pending) = buffer.select() {
            sink.present(slot, &pending.frame)?;
            let delay_ms = unix_millis().saturating_sub(pending.capture_timestamp_ms);
            if delay_ms.unsigned_abs() <= MAX_PLAUSIBLE_DELAY_MS {
                self.stats.record_displayed(delay_ms as f64);
            } else {
                debug!(source, sequence, delay_ms, "implausible capture timestamp");
                self.stats.record_displayed_untimed();
            }
        }

        let status = sink.pump();
        self.report_if_due();
        Ok(status)
    }

    fn on_decode_failure(&mut self) {
        self.decode_failures += 1;
        self.stats.record_decode_failure();
    }

    fn report_if_due(&mut self) {
        if let Some(report) = self.stats.report_if_due(Instant::now(), self.report_interval) {
            log_report(&report);
        }
    }

    fn summary(&self) -> ReceiverSummary {
        ReceiverSummary {
            frames_received: self.frames_received,
            frames_displayed: self.buffers.iter().map(ReorderBuffer::displayed).sum(),
            decode_failures: self.decode_failures,
            stale_evictions: self.buffers.iter().map(ReorderBuffer::stale_evictions).sum(),
            cursors: self.buffers.iter().map(ReorderBuffer::cursor).collect(),
            pending: self.buffers.iter().map(ReorderBuffer::len).collect(),
        }
    }
}

fn log_report(report: &ReceiverReport) {
    info!(
        frames_received = report.frames_received,
        frames_displayed = report.frames_displayed,
        average_delay_ms = report.average_delay_ms,
        decode_failures = report.decode_failures,
        stale_evictions = report.stale_evictions,
        "{report}"
    );
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessSink;
    use crate::types::PixelFormat;

    fn frame() -> RawScreenFrame {
        RawScreenFrame::packed(2, 1, PixelFormat::Bgra8, vec![0; 8])
    }

    fn config(mode: CursorMode, sources: usize) -> ReceiverConfig {
        ReceiverConfig {
            ports: vec![0; sources],
            cursor_mode: mode,
            ..ReceiverConfig::default()
        }
    }

    fn feed(consumer: &mut Consumer, sink: &mut HeadlessSink, arrivals: &[(usize, u32)]) {
        for &(source, seq) in arrivals {
            consumer
                .on_frame(sink, source, seq, unix_millis(), 24, frame())
                .unwrap();
        }
    }

    #[test]
    fn per_connection_streams_are_independent() {
        let mut consumer = Consumer::new(&config(CursorMode::PerConnection, 2));
        let mut sink = HeadlessSink::new();
        feed(&mut consumer, &mut sink, &[(0, 0), (0, 1), (1, 0), (0, 2), (1, 1)]);

        let summary = consumer.summary();
        assert_eq!(summary.frames_displayed, 5);
        assert_eq!(summary.stale_evictions, 0);
        assert_eq!(summary.cursors, vec![Some(2), Some(1)]);
        assert_eq!(sink.presented(0), 3);
        assert_eq!(sink.presented(1), 2);
    }

    #[test]
    fn shared_cursor_merges_sequence_spaces() {
        let mut consumer = Consumer::new(&config(CursorMode::Shared, 2));
        let mut sink = HeadlessSink::new();
        feed(&mut consumer, &mut sink, &[(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 3)]);

        let summary = consumer.summary();
        // Source 1's frames 0 and 1 are at or below the shared cursor.
        assert_eq!(summary.frames_displayed, 4);
        assert_eq!(summary.stale_evictions, 2);
        assert_eq!(summary.cursors, vec![Some(3)]);
        assert_eq!(sink.presented(0), 4);
        assert_eq!(sink.presented(1), 0);
    }

    #[test]
    fn extreme_timestamps_are_displayed_without_delay() {
        let mut consumer = Consumer::new(&config(CursorMode::PerConnection, 1));
        let mut sink = HeadlessSink::new();
        for (seq, ts) in [(0, i64::MIN), (1, i64::MAX), (2, unix_millis())] {
            consumer.on_frame(&mut sink, 0, seq, ts, 24, frame()).unwrap();
        }
        assert_eq!(sink.presented(0), 3);

        let report = consumer.stats.take_report(Instant::now());
        assert_eq!(report.frames_displayed, 3);
        let delay = report.average_delay_ms.unwrap();
        assert!((0.0..1_000.0).contains(&delay), "delay {delay} ms");
    }

    #[test]
    fn decode_failures_are_counted() {
        let mut consumer = Consumer::new(&config(CursorMode::PerConnection, 1));
        consumer.on_decode_failure();
        assert_eq!(consumer.summary().decode_failures, 1);
        assert_eq!(consumer.summary().frames_received, 0);
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!("shared".parse::<CursorMode>(), Ok(CursorMode::Shared));
        assert_eq!(
            "Per-Connection".parse::<CursorMode>(),
            Ok(CursorMode::PerConnection)
        );
        assert!("both".parse::<CursorMode>().is_err());
        assert_eq!("terminate".parse::<FaultPolicy>(), Ok(FaultPolicy::Terminate));
        assert_eq!(FaultPolicy::Isolate.to_string(), "isolate");
        assert_eq!(CursorMode::default(), CursorMode::PerConnection);
    }

    #[tokio::test]
    async fn bind_rejects_empty_port_list() {
        let cfg = ReceiverConfig {
            ports: Vec::new(),
            ..ReceiverConfig::default()
        };
        let result = FanIn::bind(cfg, crate::codec::ZstdFrameCodec::default()).await;
        assert!(matches!(result, Err(CastError::Config(_))));
    }
}
