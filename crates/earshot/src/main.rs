use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use earshot_hw::Camera;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod compositor;
mod config;
mod detector;
mod loader;
mod session;
mod video;

use compositor::{Compositor, SnapshotSettings};
use config::{Config, ConfigViewport, ViewportOverride};
use session::{IntervalClock, LoopHandle, Session, SessionError, SessionEvent, SessionParts};
use video::VideoFeed;

/// Capture resolution requested from the webcam.
const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;

#[derive(Parser)]
#[command(name = "earshot", about = "Live webcam overlay of tracked ears and a text label")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "EARSHOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the overlay (default)
    Run(RunArgs),
    /// List V4L2 capture devices
    Devices,
}

/// Flags that override the config file and environment.
#[derive(Args, Default)]
struct RunArgs {
    /// V4L2 device path
    #[arg(long)]
    device: Option<String>,
    /// Viewport width in pixels
    #[arg(long)]
    width: Option<u32>,
    /// Viewport height in pixels
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    fps: Option<u32>,
    /// Write composites as PNG into this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Draw the tracking anchors
    #[arg(long)]
    debug_landmarks: bool,
}

impl RunArgs {
    fn viewport_override(&self) -> ViewportOverride {
        ViewportOverride {
            width: self.width,
            height: self.height,
        }
    }

    fn apply(self, config: &mut Config) {
        if let Some(device) = self.device {
            config.camera_device = device;
        }
        if let Some(width) = self.width {
            config.viewport.width = width;
        }
        if let Some(height) = self.height {
            config.viewport.height = height;
        }
        if let Some(fps) = self.fps {
            config.target_fps = fps;
        }
        if let Some(dir) = self.snapshot_dir {
            config.snapshot_dir = Some(dir);
        }
        if self.debug_landmarks {
            config.debug_landmarks = true;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{dev}");
            }
            Ok(())
        }
        Commands::Run(args) => {
            let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
            let overrides =
                ViewportOverride::from_env(|key| std::env::var(key).ok()).then(args.viewport_override());
            args.apply(&mut config);
            let viewport = ConfigViewport::new(cli.config, config.viewport, overrides);
            run(config, viewport).await
        }
    }
}

async fn run(config: Config, viewport: ConfigViewport) -> Result<()> {
    tracing::info!(
        device = %config.camera_device,
        viewport = %config.viewport,
        fps = config.target_fps,
        "earshot starting"
    );

    // Acquisition failure is terminal: nothing else is started.
    let camera = match Camera::open(&config.camera_device, CAPTURE_WIDTH, CAPTURE_HEIGHT) {
        Ok(camera) => camera,
        Err(err) => {
            tracing::error!(device = %config.camera_device, error = %err, "failed to acquire webcam");
            return Err(SessionError::Acquisition(err.to_string()).into());
        }
    };

    let (frame_tx, feed) = VideoFeed::channel();
    let _capture = video::spawn_capture(camera, frame_tx).context("spawning capture thread")?;
    let detector = detector::spawn_detector(config.tracker_models()).map_err(SessionError::Detector)?;

    let (events_tx, events_rx) = mpsc::channel(16);
    loader::spawn_asset_loads(config.asset_sources(), config.retry_policy(), events_tx.clone());
    spawn_resize_listener(events_tx)?;

    let snapshots = match &config.snapshot_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
            Some(SnapshotSettings {
                dir: dir.clone(),
                every: config.snapshot_every,
            })
        }
        None => None,
    };

    let mut session = Session::new(SessionParts {
        video: feed.clone(),
        detector,
        renderer: Compositor::new(config.viewport, Some(feed), snapshots),
        clock: IntervalClock::new(config.frame_interval()),
        viewport: Box::new(viewport),
        events: events_rx,
        debug_landmarks: config.debug_landmarks,
    });
    spawn_shutdown_listener(session.handle());

    let stats = session.run().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// SIGHUP signals a viewport resize.
fn spawn_resize_listener(events: mpsc::Sender<SessionEvent>) -> Result<(), SessionError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).map_err(SessionError::Signal)?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::debug!("SIGHUP received; re-reading viewport");
            if events.send(SessionEvent::Resized).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

fn spawn_shutdown_listener(handle: LoopHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received; stopping");
                handle.stop();
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for ctrl-c"),
        }
    });
}
