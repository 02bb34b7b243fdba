//! Configuration for the mirrorcast binary.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mirrorcast_core::{CastError, CursorMode, FaultPolicy, ReceiverConfig, Resolution, SenderConfig};

/// Default TCP port shared by sender and receiver.
pub const DEFAULT_PORT: u16 = 12345;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderSection,
    pub receiver: ReceiverSection,
    pub stats: StatsSection,
    pub logging: LoggingConfig,
}

/// Where the sender's frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureKind {
    /// Primary display via GDI.
    #[default]
    Screen,
    /// Synthetic moving gradient.
    TestPattern,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureKind::Screen => "screen",
            CaptureKind::TestPattern => "test-pattern",
        })
    }
}

impl FromStr for CaptureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "screen" => Ok(CaptureKind::Screen),
            "test-pattern" | "test_pattern" | "pattern" => Ok(CaptureKind::TestPattern),
            other => Err(format!(
                "unknown source '{other}' (expected screen or test-pattern)"
            )),
        }
    }
}

/// Sender settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSection {
    /// Receiver host name or IP address. Required.
    pub host: String,
    pub port: u16,
    /// Target frames per second.
    pub fps: u32,
    /// "native", "2160p", "1080p", "720p", "800x600", "640x480".
    pub resolution: Resolution,
    pub source: CaptureKind,
    /// zstd level, 1 (fast) to 19.
    pub compression_level: i32,
}

/// Receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSection {
    /// One listening port per expected sender.
    pub ports: Vec<u16>,
    /// Borderless window covering the primary display.
    pub fullscreen: bool,
    pub grid_width: u32,
    pub grid_height: u32,
    pub cursor_mode: CursorMode,
    pub fault_policy: FaultPolicy,
    /// Window size when not fullscreen.
    pub window_width: u32,
    pub window_height: u32,
}

/// Periodic statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSection {
    pub report_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SenderSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            fps: 30,
            resolution: Resolution::Native,
            source: CaptureKind::Screen,
            compression_level: 1,
        }
    }
}

impl Default for ReceiverSection {
    fn default() -> Self {
        Self {
            ports: vec![DEFAULT_PORT],
            fullscreen: false,
            grid_width: 1,
            grid_height: 1,
            cursor_mode: CursorMode::PerConnection,
            fault_policy: FaultPolicy::Isolate,
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            report_interval_secs: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file means defaults. A file that exists but cannot be
    /// read or parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Self, CastError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CastError::Config(format!(
                    "cannot read config {}: {e}",
                    path.display()
                )));
            }
        };
        toml::from_str(&contents)
            .map_err(|e| CastError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> Result<String, CastError> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| CastError::Config(format!("cannot serialize defaults: {e}")))
    }

    /// Write the default configuration to a file (`--write-config`).
    pub fn write_default(path: &Path) -> Result<(), CastError> {
        std::fs::write(path, Self::default_toml()?)
            .map_err(|e| CastError::Config(format!("cannot write {}: {e}", path.display())))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.stats.report_interval_secs.max(1))
    }

    /// Reject sender settings that cannot work, before any networking.
    pub fn validate_sender(&self) -> Result<(), CastError> {
        if self.sender.host.trim().is_empty() {
            return Err(CastError::Config(
                "no receiver host given (pass HOST or set [sender] host)".into(),
            ));
        }
        if self.sender.fps == 0 {
            return Err(CastError::Config("fps must be at least 1".into()));
        }
        Ok(())
    }

    /// Reject receiver settings that cannot work, before any networking.
    pub fn validate_receiver(&self) -> Result<(), CastError> {
        if self.receiver.ports.is_empty() {
            return Err(CastError::Config(
                "no receive ports given (pass --port or set [receiver] ports)".into(),
            ));
        }
        if self.receiver.grid_width == 0 || self.receiver.grid_height == 0 {
            return Err(CastError::Config("grid dimensions must be non-zero".into()));
        }
        Ok(())
    }

    /// "host:port" of the receiver.
    pub fn sender_address(&self) -> String {
        format!("{}:{}", self.sender.host.trim(), self.sender.port)
    }

    pub fn to_sender_config(&self, frame_limit: Option<u64>) -> SenderConfig {
        SenderConfig {
            target_fps: self.sender.fps.clamp(1, 240),
            resolution: self.sender.resolution,
            report_interval: self.report_interval(),
            frame_limit,
        }
    }

    pub fn to_receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            ports: self.receiver.ports.clone(),
            cursor_mode: self.receiver.cursor_mode,
            fault_policy: self.receiver.fault_policy,
            report_interval: self.report_interval(),
            grid: (self.receiver.grid_width, self.receiver.grid_height),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
