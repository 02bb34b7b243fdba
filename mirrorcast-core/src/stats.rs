//! Interval rate counters for periodic throughput / delay reports.
//!
//! Counters accumulate over a reporting window and are reset in one step
//! when a report is taken, so a report always describes exactly one
//! window. Cumulative byte totals survive the reset.

use std::fmt;
use std::time::{Duration, Instant};

/// Default reporting window.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(15);

const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

// ── Sender ───────────────────────────────────────────────────────

/// Counters kept by the sender pacing loop.
#[derive(Debug, Clone)]
pub struct SenderStats {
    window_start: Instant,
    frames_sent: u64,
    bytes_in_window: u64,
    total_bytes: u64,
    capture_failures: u64,
}

/// One reporting window of sender activity.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderReport {
    pub frames_sent: u64,
    pub elapsed: Duration,
    pub average_fps: f64,
    pub window_megabytes: f64,
    pub total_megabytes: f64,
    pub capture_failures: u64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_sent: 0,
            bytes_in_window: 0,
            total_bytes: 0,
            capture_failures: 0,
        }
    }

    /// Record one transmitted frame of `bytes` payload bytes.
    pub fn record_frame(&mut self, bytes: u64) {
        self.frames_sent += 1;
        self.bytes_in_window += bytes;
        self.total_bytes += bytes;
    }

    pub fn record_capture_failure(&mut self) {
        self.capture_failures += 1;
    }

    pub fn frames_in_window(&self) -> u64 {
        self.frames_sent
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Take a report if at least `interval` has passed since the window
    /// started.
    pub fn report_if_due(&mut self, now: Instant, interval: Duration) -> Option<SenderReport> {
        if now.duration_since(self.window_start) >= interval {
            Some(self.take_report(now))
        } else {
            None
        }
    }

    /// Close the current window and start a new one at `now`.
    pub fn take_report(&mut self, now: Instant) -> SenderReport {
        let elapsed = now.duration_since(self.window_start);
        let report = SenderReport {
            frames_sent: self.frames_sent,
            elapsed,
            average_fps: per_second(self.frames_sent, elapsed),
            window_megabytes: self.bytes_in_window as f64 / BYTES_PER_MEGABYTE,
            total_megabytes: self.total_bytes as f64 / BYTES_PER_MEGABYTE,
            capture_failures: self.capture_failures,
        };
        self.window_start = now;
        self.frames_sent = 0;
        self.bytes_in_window = 0;
        self.capture_failures = 0;
        report
    }
}

impl Default for SenderStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames sent: {}, average fps: {:.2}, transmitted: {:.1} MB (total {:.1} MB)",
            self.frames_sent, self.average_fps, self.window_megabytes, self.total_megabytes
        )
    }
}

// ── Receiver ─────────────────────────────────────────────────────

/// Counters kept by the receiver's consumer loop.
#[derive(Debug, Clone)]
pub struct ReceiverStats {
    window_start: Instant,
    frames_received: u64,
    frames_displayed: u64,
    total_delay_ms: f64,
    delay_samples: u64,
    decode_failures: u64,
    stale_evictions: u64,
    bytes_in_window: u64,
    total_bytes: u64,
}

/// One reporting window of receiver activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverReport {
    pub frames_received: u64,
    pub frames_displayed: u64,
    pub elapsed: Duration,
    pub receive_fps: f64,
    pub display_fps: f64,
    /// Mean capture-to-display delay; `None` when nothing was displayed.
    pub average_delay_ms: Option<f64>,
    pub decode_failures: u64,
    pub stale_evictions: u64,
    pub window_megabytes: f64,
    pub total_megabytes: f64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_received: 0,
            frames_displayed: 0,
            total_delay_ms: 0.0,
            delay_samples: 0,
            decode_failures: 0,
            stale_evictions: 0,
            bytes_in_window: 0,
            total_bytes: 0,
        }
    }

    /// A frame was decoded and admitted.
    pub fn record_received(&mut self, wire_bytes: u64) {
        self.frames_received += 1;
        self.bytes_in_window += wire_bytes;
        self.total_bytes += wire_bytes;
    }

    /// A frame was presented `delay_ms` after it was captured.
    pub fn record_displayed(&mut self, delay_ms: f64) {
        self.frames_displayed += 1;
        self.total_delay_ms += delay_ms;
        self.delay_samples += 1;
    }

    /// A frame was presented but its capture timestamp is unusable.
    pub fn record_displayed_untimed(&mut self) {
        self.frames_displayed += 1;
    }

    pub fn record_decode_failure(&mut self) {
        self.decode_failures += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.stale_evictions += count as u64;
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    pub fn report_if_due(&mut self, now: Instant, interval: Duration) -> Option<ReceiverReport> {
        if now.duration_since(self.window_start) >= interval {
            Some(self.take_report(now))
        } else {
            None
        }
    }

    pub fn take_report(&mut self, now: Instant) -> ReceiverReport {
        let elapsed = now.duration_since(self.window_start);
        let average_delay_ms = (self.delay_samples > 0)
            .then(|| self.total_delay_ms / self.delay_samples as f64);
        let report = ReceiverReport {
            frames_received: self.frames_received,
            frames_displayed: self.frames_displayed,
            elapsed,
            receive_fps: per_second(self.frames_received, elapsed),
            display_fps: per_second(self.frames_displayed, elapsed),
            average_delay_ms,
            decode_failures: self.decode_failures,
            stale_evictions: self.stale_evictions,
            window_megabytes: self.bytes_in_window as f64 / BYTES_PER_MEGABYTE,
            total_megabytes: self.total_bytes as f64 / BYTES_PER_MEGABYTE,
        };
        self.window_start = now;
        self.frames_received = 0;
        self.frames_displayed = 0;
        self.total_delay_ms = 0.0;
        self.delay_samples = 0;
        self.decode_failures = 0;
        self.stale_evictions = 0;
        self.bytes_in_window = 0;
        report
    }
}

impl Default for ReceiverStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReceiverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received: {} ({:.2} fps), displayed: {} ({:.2} fps), average delay: ",
            self.frames_received, self.receive_fps, self.frames_displayed, self.display_fps
        )?;
        match self.average_delay_ms {
            Some(ms) => write!(f, "{ms:.1} ms"),
            None => f.write_str("n/a"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
