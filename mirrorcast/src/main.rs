//! mirrorcast entry point.
//!
//! ```text
//! mirrorcast send HOST [--port N] [--fps N] [--resolution R]   stream this display
//! mirrorcast receive [--grid WxH] [--port N]...               show incoming streams
//! mirrorcast --config <path>                                  load a custom config TOML
//! mirrorcast --gen-config                                     write default config to stdout
//! mirrorcast --write-config <path>                            write default config to a file
//! ```

use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirrorcast::cli::{Cli, Command, ReceiveArgs, SendArgs};
use mirrorcast::config::{AppConfig, CaptureKind};
use mirrorcast::display::GdiTileRenderer;
use mirrorcast_core::{
    CaptureSource, CastError, FanIn, FrameSender, FrameTransport, GdiCapturer, HeadlessSink,
    RenderSink, TestPatternSource, ZstdFrameCodec,
};

/// Size of the synthetic source when no display is captured.
const TEST_PATTERN_SIZE: (u32, u32) = (1280, 720);

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        return match AppConfig::default_toml() {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("mirrorcast: {e}");
                ExitCode::from(1)
            }
        };
    }

    if let Some(path) = &cli.write_config {
        return match AppConfig::write_default(path) {
            Ok(()) => {
                println!("wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("mirrorcast: {e}");
                ExitCode::from(1)
            }
        };
    }

    let Some(command) = cli.command else {
        eprintln!("mirrorcast: no command given; use `send` or `receive` (see --help)");
        return ExitCode::from(1);
    };

    // The log level comes from the file, so a broken file is reported
    // before tracing exists.
    let mut config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mirrorcast: {e}");
            return ExitCode::from(1);
        }
    };

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mirrorcast v{}", env!("CARGO_PKG_VERSION"));

    let result = match command {
        Command::Send(args) => run_sender(&mut config, &args).await,
        Command::Receive(args) => run_receiver(&mut config, &args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("mirrorcast: {e}");
            ExitCode::from(1)
        }
    }
}

// ── Sender ───────────────────────────────────────────────────────

async fn run_sender(config: &mut AppConfig, args: &SendArgs) -> Result<(), CastError> {
    args.apply(config);
    config.validate_sender()?;

    let source: Box<dyn CaptureSource> = match config.sender.source {
        CaptureKind::Screen => Box::new(GdiCapturer::new()?),
        CaptureKind::TestPattern => {
            let (w, h) = TEST_PATTERN_SIZE;
            Box::new(TestPatternSource::new(w, h))
        }
    };
    let codec = ZstdFrameCodec::new(config.sender.compression_level);

    let address = config.sender_address();
    info!("source: {}", config.sender.source);
    info!("resolution: {}", config.sender.resolution);
    info!("connecting to {address}");
    let transport = FrameTransport::connect(address.as_str()).await?;
    info!("connected");

    let mut sender = FrameSender::new(source, codec, transport, config.to_sender_config(args.frames));

    // Ctrl-C handler.
    let stop = sender.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; stopping after the current frame");
        stop.store(false, Ordering::SeqCst);
    });

    let summary = sender.run().await?;
    info!(
        frames = summary.frames_sent,
        capture_failures = summary.capture_failures,
        "done"
    );
    Ok(())
}

// ── Receiver ─────────────────────────────────────────────────────

async fn run_receiver(config: &mut AppConfig, args: &ReceiveArgs) -> Result<(), CastError> {
    args.apply(config);
    config.validate_receiver()?;

    let receiver_config = config.to_receiver_config();
    info!("ports: {:?}", receiver_config.ports);
    info!("cursor mode: {}", receiver_config.cursor_mode);
    info!("on fault: {}", receiver_config.fault_policy);

    let fan_in = FanIn::bind(receiver_config, ZstdFrameCodec::default()).await?;

    // The sink is created here so that the window belongs to the thread
    // that drives the consumer loop below.
    let mut sink: Box<dyn RenderSink> = if args.headless {
        Box::new(HeadlessSink::new())
    } else {
        let rx = &config.receiver;
        Box::new(GdiTileRenderer::new(
            "mirrorcast",
            rx.window_width,
            rx.window_height,
            rx.fullscreen,
            (rx.grid_width, rx.grid_height),
        )?)
    };

    tokio::select! {
        result = fan_in.run(&mut sink) => {
            let summary = result?;
            info!(
                received = summary.frames_received,
                displayed = summary.frames_displayed,
                stale = summary.stale_evictions,
                "done"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received; shutting down");
        }
    }
    Ok(())
}
