//! Command-line interface.
//!
//! ```text
//! mirrorcast send 10.0.0.2 --fps 30 --resolution 720p     (alias: 1)
//! mirrorcast receive --grid 2x1 --port 5000 --port 5001   (alias: 0)
//! mirrorcast --gen-config                                 print defaults
//! mirrorcast --write-config mirrorcast.toml               write defaults to a file
//! ```
//!
//! Values given on the command line override the configuration file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mirrorcast_core::{CursorMode, FaultPolicy, Resolution};

use crate::config::{AppConfig, CaptureKind};

#[derive(Parser, Debug)]
#[command(
    name = "mirrorcast",
    version,
    about = "Live screen sharing over raw TCP"
)]
pub struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirrorcast.toml")]
    pub config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    pub gen_config: bool,

    /// Write the default configuration to PATH and exit.
    #[arg(long, value_name = "PATH", conflicts_with = "gen_config")]
    pub write_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture this display and stream it to a receiver.
    #[command(alias = "1")]
    Send(SendArgs),
    /// Accept senders and display their streams.
    #[command(alias = "0")]
    Receive(ReceiveArgs),
}

#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// Receiver host name or IP address.
    pub host: Option<String>,

    /// Receiver port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Target frames per second.
    #[arg(long)]
    pub fps: Option<u32>,

    /// native, 2160p, 1080p, 720p, 800x600, 640x480 (or preset 0-5).
    #[arg(short, long)]
    pub resolution: Option<Resolution>,

    /// screen or test-pattern.
    #[arg(long)]
    pub source: Option<CaptureKind>,

    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct ReceiveArgs {
    /// Borderless window covering the primary display.
    #[arg(long)]
    pub fullscreen: bool,

    /// Tile grid as COLUMNSxROWS, e.g. 2x2.
    #[arg(long, value_parser = parse_grid)]
    pub grid: Option<(u32, u32)>,

    /// Listening port; repeat for several senders.
    #[arg(short, long = "port")]
    pub ports: Vec<u16>,

    /// per-connection or shared.
    #[arg(long = "cursor")]
    pub cursor_mode: Option<CursorMode>,

    /// isolate or terminate.
    #[arg(long = "on-fault")]
    pub fault_policy: Option<FaultPolicy>,

    /// Count frames instead of opening a window.
    #[arg(long)]
    pub headless: bool,
}

impl SendArgs {
    /// Overlay the given values onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        let sender = &mut config.sender;
        if let Some(host) = &self.host {
            sender.host = host.clone();
        }
        if let Some(port) = self.port {
            sender.port = port;
        }
        if let Some(fps) = self.fps {
            sender.fps = fps;
        }
        if let Some(resolution) = self.resolution {
            sender.resolution = resolution;
        }
        if let Some(source) = self.source {
            sender.source = source;
        }
    }
}

impl ReceiveArgs {
    /// Overlay the given values onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        let receiver = &mut config.receiver;
        if self.fullscreen {
            receiver.fullscreen = true;
        }
        if let Some((w, h)) = self.grid {
            receiver.grid_width = w;
            receiver.grid_height = h;
        }
        if !self.ports.is_empty() {
            receiver.ports = self.ports.clone();
        }
        if let Some(mode) = self.cursor_mode {
            receiver.cursor_mode = mode;
        }
        if let Some(policy) = self.fault_policy {
            receiver.fault_policy = policy;
        }
    }
}

/// Parse `WxH` (also `W,H`) into a grid size.
pub fn parse_grid(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X', ','])
        .ok_or_else(|| format!("grid must look like 2x2, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("grid width: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("grid height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("grid dimensions must be non-zero".into());
    }
    Ok((w, h))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mirrorcast").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn send_alias_and_overrides() {
        let cli = parse(&["1", "10.0.0.2", "--fps", "15", "-r", "720p", "--source", "test-pattern"]);
        let Some(Command::Send(args)) = cli.command else {
            panic!("expected send");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.sender.host, "10.0.0.2");
        assert_eq!(config.sender.fps, 15);
        assert_eq!(config.sender.resolution, Resolution::Hd720);
        assert_eq!(config.sender.source, CaptureKind::TestPattern);
        assert!(config.validate_sender().is_ok());
    }

    #[test]
    fn receive_with_grid_and_ports() {
        let cli = parse(&[
            "receive", "--grid", "2x1", "--port", "5000", "--port", "5001", "--cursor", "shared",
            "--on-fault", "terminate",
        ]);
        let Some(Command::Receive(args)) = cli.command else {
            panic!("expected receive");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        let rx = config.to_receiver_config();
        assert_eq!(rx.ports, vec![5000, 5001]);
        assert_eq!(rx.grid, (2, 1));
        assert_eq!(rx.cursor_mode, CursorMode::Shared);
        assert_eq!(rx.fault_policy, FaultPolicy::Terminate);
    }

    #[test]
    fn receive_alias_keeps_file_ports_when_none_given() {
        let cli = parse(&["0", "--headless"]);
        let Some(Command::Receive(args)) = cli.command else {
            panic!("expected receive");
        };
        assert!(args.headless);
        let mut config = AppConfig::default();
        config.receiver.ports = vec![7000];
        args.apply(&mut config);
        assert_eq!(config.receiver.ports, vec![7000]);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Cli::try_parse_from(["mirrorcast", "send", "--fps", "fast"]).is_err());
        assert!(Cli::try_parse_from(["mirrorcast", "receive", "--grid", "2"]).is_err());
        assert!(Cli::try_parse_from(["mirrorcast", "receive", "--cursor", "both"]).is_err());
    }

    #[test]
    fn write_config_takes_a_path() {
        let cli = parse(&["--write-config", "out.toml"]);
        assert_eq!(cli.write_config, Some(PathBuf::from("out.toml")));
        assert!(cli.command.is_none());
        assert!(Cli::try_parse_from(["mirrorcast", "--write-config"]).is_err());
        assert!(
            Cli::try_parse_from(["mirrorcast", "--gen-config", "--write-config", "x.toml"]).is_err()
        );
    }

    #[test]
    fn grid_parsing() {
        assert_eq!(parse_grid("3x2"), Ok((3, 2)));
        assert_eq!(parse_grid("4,1"), Ok((4, 1)));
        assert!(parse_grid("0x2").is_err());
        assert!(parse_grid("wide").is_err());
    }
}
