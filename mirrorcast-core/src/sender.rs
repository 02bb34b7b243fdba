//! Sender pacing loop.
//!
//! Drives the pipeline at a fixed frame rate:
//!
//! 1. [`CaptureSource`] produces a raw frame (empty → skip, retry).
//! 2. The frame is scaled to the target [`Resolution`] when needed.
//! 3. [`FrameCodec`] compresses it.
//! 4. [`FrameTransport`] writes the envelope with the pre-capture
//!    timestamp and the next sequence number.
//! 5. The loop sleeps for whatever is left of the frame period.
//!
//! Pacing only absorbs the current iteration's work time. An iteration
//! that overruns the period is followed immediately by the next one, and
//! earlier overruns are never caught up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use crate::capture::CaptureSource;
use crate::codec::FrameCodec;
use crate::error::CastError;
use crate::stats::{DEFAULT_REPORT_INTERVAL, SenderReport, SenderStats};
use crate::transport::FrameTransport;
use crate::types::{Resolution, unix_millis};

// ── SenderConfig ─────────────────────────────────────────────────

/// Configuration for [`FrameSender`].
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Target frames per second (clamped to 1..=240).
    pub target_fps: u32,
    /// Resolution frames are scaled to before encoding.
    pub resolution: Resolution,
    /// How often throughput is reported.
    pub report_interval: Duration,
    /// Stop after this many transmitted frames (`None` = run forever).
    pub frame_limit: Option<u64>,
}

impl SenderConfig {
    /// Frame period derived from the target rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.clamp(1, 240) as f64)
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            resolution: Resolution::Native,
            report_interval: DEFAULT_REPORT_INTERVAL,
            frame_limit: None,
        }
    }
}

/// Summary returned when the loop ends without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderSummary {
    pub frames_sent: u64,
    pub capture_failures: u64,
    /// Sequence number the next frame would have carried.
    pub next_sequence: u32,
    pub bytes_sent: u64,
}

// ── FrameSender ──────────────────────────────────────────────────

/// Capture → encode → transmit → pace loop for one connection.
pub struct FrameSender<S, C, T> {
    capture: S,
    codec: C,
    transport: FrameTransport<T>,
    config: SenderConfig,
    running: Arc<AtomicBool>,
    sequence: u32,
}

impl<S, C, T> FrameSender<S, C, T>
where
    S: CaptureSource,
    C: FrameCodec,
    T: AsyncWrite + Unpin,
{
    pub fn new(capture: S, codec: C, transport: FrameTransport<T>, config: SenderConfig) -> Self {
        Self {
            capture,
            codec,
            transport,
            config,
            running: Arc::new(AtomicBool::new(true)),
            sequence: 0,
        }
    }

    /// A cloneable handle; storing `false` ends the loop after the
    /// current frame, or before the first one if `run` has not started.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the loop to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sequence number the next transmitted frame will carry.
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    /// Target dimensions for the configured resolution.
    pub fn target_size(&self) -> (u32, u32) {
        self.config.resolution.resolve(self.capture.native_size())
    }

    /// Run until stopped, until the frame limit is reached, or until the
    /// transport fails. Transport failures are returned as errors; there
    /// is no reconnect.
    ///
    /// A stop requested before `run` is honoured: nothing is sent.
    pub async fn run(&mut self) -> Result<SenderSummary, CastError> {
        let period = self.config.frame_period();
        let (target_w, target_h) = self.target_size();
        let mut stats = SenderStats::new();
        let mut frames_sent: u64 = 0;
        let mut capture_failures: u64 = 0;

        info!(
            fps = self.config.target_fps,
            width = target_w,
            height = target_h,
            "sender started"
        );

        while self.running.load(Ordering::SeqCst) {
            if self.config.frame_limit.is_some_and(|limit| frames_sent >= limit) {
                break;
            }

            let loop_start = Instant::now();
            let capture_timestamp_ms = unix_millis();

            // 1. Capture.
            let raw = match self.capture.capture() {
                Ok(frame) if !frame.is_empty() => frame,
                Ok(_) => {
                    warn!("captured frame is empty; retrying");
                    capture_failures += 1;
                    stats.record_capture_failure();
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("capture failed: {e}; retrying");
                    capture_failures += 1;
                    stats.record_capture_failure();
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            // 2. Resize.
            let raw = if (raw.width, raw.height) != (target_w, target_h) {
                raw.resized(target_w, target_h)
            } else {
                raw
            };

            // 3. Encode.
            let payload = self.codec.encode(&raw)?;
            let size = payload.len() as u64;

            // 4. Transmit.
            self.transport
                .send_frame(capture_timestamp_ms, self.sequence, payload)
                .await?;
            debug!(sequence = self.sequence, bytes = size, "frame transmitted");
            self.sequence = self.sequence.wrapping_add(1);
            frames_sent += 1;
            stats.record_frame(size);

            if let Some(report) = stats.report_if_due(Instant::now(), self.config.report_interval)
            {
                log_report(&report);
            }

            // 5. Pace.
            Self::pace(loop_start, period).await;
        }

        self.running.store(false, Ordering::SeqCst);
        let summary = SenderSummary {
            frames_sent,
            capture_failures,
            next_sequence: self.sequence,
            bytes_sent: self.transport.bytes_sent(),
        };
        info!(
            frames = summary.frames_sent,
            bytes = summary.bytes_sent,
            "sender stopped"
        );
        Ok(summary)
    }

    /// Consume the sender and return its transport.
    pub fn into_transport(self) -> FrameTransport<T> {
        self.transport
    }

    /// Sleep for the remainder of the frame period, if any.
    async fn pace(loop_start: Instant, period: Duration) {
        let elapsed = loop_start.elapsed();
        if elapsed < period {
            tokio::time::sleep(period - elapsed).await;
        }
    }
}

fn log_report(report: &SenderReport) {
    info!(
        frames_sent = report.frames_sent,
        average_fps = report.average_fps,
        total_megabytes = report.total_megabytes,
        "{report}"
    );
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::capture::TestPatternSource;
    use crate::codec::ZstdFrameCodec;
    use crate::types::{PixelFormat, RawScreenFrame};

    /// Capture source scripted with a list of "empty" flags; records the
    /// instant of every capture call.
    struct ScriptedSource {
        inner: TestPatternSource,
        empties: Vec<bool>,
        calls: Arc<Mutex<Vec<Instant>>>,
        work: Duration,
    }

    impl ScriptedSource {
        fn new(empties: Vec<bool>) -> Self {
            Self {
                inner: TestPatternSource::new(16, 8),
                empties,
                calls: Arc::new(Mutex::new(Vec::new())),
                work: Duration::ZERO,
            }
        }
    }

    impl CaptureSource for ScriptedSource {
        fn native_size(&self) -> (u32, u32) {
            self.inner.native_size()
        }

        fn capture(&mut self) -> Result<RawScreenFrame, CastError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() - 1
            };
            if !self.work.is_zero() {
                std::thread::sleep(self.work);
            }
            if self.empties.get(n).copied().unwrap_or(false) {
                return Ok(RawScreenFrame::empty(PixelFormat::Bgra8));
            }
            self.inner.capture()
        }
    }

    fn config(fps: u32, limit: u64) -> SenderConfig {
        SenderConfig {
            target_fps: fps,
            frame_limit: Some(limit),
            ..SenderConfig::default()
        }
    }

    #[tokio::test]
    async fn sequence_numbers_are_gap_free_and_skip_empty_captures() {
        let (a, b) = tokio::io::duplex(1 << 20);
        let source = ScriptedSource::new(vec![false, true, true, false, false]);
        let mut sender = FrameSender::new(
            source,
            ZstdFrameCodec::default(),
            FrameTransport::new(a),
            config(200, 3),
        );

        let reader = tokio::spawn(async move {
            let mut rx = FrameTransport::new(b);
            let mut seqs = Vec::new();
            for _ in 0..3 {
                seqs.push(rx.receive_frame().await.unwrap().sequence);
            }
            seqs
        });

        let summary = sender.run().await.unwrap();
        assert_eq!(summary.frames_sent, 3);
        assert_eq!(summary.capture_failures, 2);
        assert_eq!(summary.next_sequence, 3);
        assert_eq!(reader.await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn frames_are_scaled_to_target_resolution() {
        let (a, b) = tokio::io::duplex(1 << 22);
        let mut sender = FrameSender::new(
            TestPatternSource::new(32, 32),
            ZstdFrameCodec::default(),
            FrameTransport::new(a),
            SenderConfig {
                resolution: Resolution::Vga,
                ..config(100, 1)
            },
        );
        assert_eq!(sender.target_size(), (640, 480));

        let reader = tokio::spawn(async move {
            let mut rx = FrameTransport::new(b);
            rx.receive_frame().await.unwrap()
        });
        sender.run().await.unwrap();

        let env = reader.await.unwrap();
        let frame = ZstdFrameCodec::default().decode(&env.payload).unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
    }

    #[tokio::test]
    async fn pacing_never_runs_faster_than_target() {
        let (a, b) = tokio::io::duplex(1 << 20);
        let mut source = ScriptedSource::new(Vec::new());
        source.work = Duration::from_millis(10);
        let calls = Arc::clone(&source.calls);

        let mut sender = FrameSender::new(
            source,
            ZstdFrameCodec::default(),
            FrameTransport::new(a),
            config(30, 10),
        );
        let reader = tokio::spawn(async move {
            let mut rx = FrameTransport::new(b);
            while rx.receive_frame().await.is_ok() {}
        });

        sender.run().await.unwrap();
        drop(sender);
        reader.await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 10);
        for pair in calls.windows(2) {
            let interval = pair[1].duration_since(pair[0]);
            assert!(
                interval >= Duration::from_millis(33),
                "inter-frame interval {interval:?} shorter than the 30 fps period"
            );
        }
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let mut sender = FrameSender::new(
            TestPatternSource::new(8, 8),
            ZstdFrameCodec::default(),
            FrameTransport::new(a),
            config(100, 5),
        );
        let err = sender.run().await.unwrap_err();
        assert!(matches!(err, CastError::Connection(_)));
        assert_eq!(sender.next_sequence(), 0);
    }

    #[tokio::test]
    async fn stop_before_run_sends_nothing() {
        let (a, _b) = tokio::io::duplex(1 << 20);
        let mut sender = FrameSender::new(
            TestPatternSource::new(8, 8),
            ZstdFrameCodec::default(),
            FrameTransport::new(a),
            config(100, 5),
        );
        assert!(sender.is_running());
        sender.stop_handle().store(false, Ordering::SeqCst);

        let summary = sender.run().await.unwrap();
        assert_eq!(summary.frames_sent, 0);
        assert_eq!(summary.next_sequence, 0);
        assert_eq!(summary.bytes_sent, 0);
        assert!(!sender.is_running());
    }

    #[test]
    fn frame_period_from_fps() {
        let cfg = SenderConfig {
            target_fps: 10,
            ..SenderConfig::default()
        };
        assert_eq!(cfg.frame_period(), Duration::from_millis(100));
        let zero = SenderConfig {
            target_fps: 0,
            ..SenderConfig::default()
        };
        assert_eq!(zero.frame_period(), Duration::from_secs(1));
    }
}
