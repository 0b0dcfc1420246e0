//! The overlay session: idle until playback starts, then one tick per paint.
//!
//! Everything mutable (viewport, scene, camera, readiness slots, canvas)
//! is owned here and only touched from the loop. Resize signals and asset
//! completions are queued on a channel and handled between ticks, so a tick
//! always sees one consistent display size.

use crate::detector::{Detect, WorkerError};
use crate::video::FrameSource;
use earshot_core::camera::{DEFAULT_FAR, DEFAULT_FOV_DEGREES, DEFAULT_NEAR, RUNNING_CAMERA_Z};
use earshot_core::{
    extract_anchors, place, resize_results, Anchors, AssetEvent, Detection, DisplaySize,
    OverlayAssets, OverlayCanvas, PerspectiveCamera, Renderer, Scene, Viewport, ViewportSource,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

const LEFT_EAR_MARK: [u8; 3] = [255, 64, 64];
const RIGHT_EAR_MARK: [u8; 3] = [64, 255, 64];
const FOREHEAD_MARK: [u8; 3] = [64, 160, 255];

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("video acquisition failed: {0}")]
    Acquisition(String),
    #[error("detector: {0}")]
    Detector(#[from] WorkerError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Work delivered to the session from outside the loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// The display was resized; the new size is read from the viewport source.
    Resized,
    Asset(AssetEvent),
}

/// The host's "next paint" signal.
#[allow(async_fn_in_trait)]
pub trait FrameClock {
    async fn next_paint(&mut self);
}

/// Paints at a fixed rate. Late paints are delayed rather than bunched.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl FrameClock for IntervalClock {
    async fn next_paint(&mut self) {
        self.interval.tick().await;
    }
}

/// Stops a running session after its current tick.
#[derive(Clone)]
pub struct LoopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl LoopHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub renders: u64,
    /// Ticks scheduled so far, including the one pending when the loop stopped.
    pub scheduled: u64,
    pub detection_failures: u64,
    pub render_failures: u64,
}

/// Construction inputs for a [`Session`].
pub struct SessionParts<V, D, R, C> {
    pub video: V,
    pub detector: D,
    pub renderer: R,
    pub clock: C,
    pub viewport: Box<dyn ViewportSource>,
    pub events: mpsc::Receiver<SessionEvent>,
    pub debug_landmarks: bool,
}

pub struct Session<V, D, R, C> {
    video: V,
    detector: D,
    renderer: R,
    clock: C,
    viewport_source: Box<dyn ViewportSource>,
    events: mpsc::Receiver<SessionEvent>,
    viewport: Viewport,
    canvas: OverlayCanvas,
    camera: PerspectiveCamera,
    scene: Scene,
    assets: OverlayAssets,
    handle: LoopHandle,
    stop: watch::Receiver<bool>,
    detection_enabled: bool,
    debug_landmarks: bool,
    stats: LoopStats,
}

impl<V, D, R, C> Session<V, D, R, C>
where
    V: FrameSource,
    D: Detect,
    R: Renderer,
    C: FrameClock,
{
    pub fn new(parts: SessionParts<V, D, R, C>) -> Self {
        let SessionParts {
            video,
            detector,
            mut renderer,
            clock,
            viewport: viewport_source,
            events,
            debug_landmarks,
        } = parts;

        let size = viewport_source.dimensions();
        let mut viewport = Viewport::new(size);
        let mut canvas = OverlayCanvas::new(size);
        let mut camera =
            PerspectiveCamera::new(DEFAULT_FOV_DEGREES, size.aspect(), DEFAULT_NEAR, DEFAULT_FAR);
        viewport.resize(size, &mut canvas, &mut renderer, &mut camera);

        let (handle, stop) = LoopHandle::new();

        Self {
            video,
            detector,
            renderer,
            clock,
            viewport_source,
            events,
            viewport,
            canvas,
            camera,
            scene: Scene::with_default_lighting(),
            assets: OverlayAssets::new(),
            handle,
            stop,
            detection_enabled: false,
            debug_landmarks,
            stats: LoopStats::default(),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run until stopped.
    ///
    /// Only a video stream that never starts is an error; once running,
    /// detection and render failures are logged and the loop continues.
    pub async fn run(&mut self) -> Result<LoopStats, SessionError> {
        tracing::info!(size = %self.viewport.size(), "session idle, waiting for video");
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => {
                    tracing::info!("session stopped before playback started");
                    return Ok(self.stats);
                }
                Some(event) = self.events.recv() => self.handle_event(event),
                playing = self.video.wait_until_playing() => {
                    playing?;
                    break;
                }
            }
        }

        self.start_running().await;

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => break,
                Some(event) = self.events.recv() => self.handle_event(event),
                _ = self.clock.next_paint() => {
                    self.tick().await;
                    self.stats.scheduled += 1;
                }
            }
        }

        tracing::info!(
            ticks = self.stats.ticks,
            renders = self.stats.renders,
            detection_failures = self.stats.detection_failures,
            "session stopped"
        );
        Ok(self.stats)
    }

    /// Idle → Running.
    async fn start_running(&mut self) {
        let size = self.viewport.size();
        self.canvas.set_size(size);
        self.camera.position.z = RUNNING_CAMERA_Z;
        tracing::info!(%size, "playback started; session running");

        match self.detector.load_models().await {
            Ok(()) => self.detection_enabled = true,
            Err(err) => {
                tracing::error!(error = %err, "detector models failed to load; running without tracking")
            }
        }
        self.stats.scheduled = 1;
    }

    async fn tick(&mut self) {
        self.stats.ticks += 1;
        self.canvas.clear();

        let size = self.viewport.size();
        match self.detect(size).await {
            Some(detections) => self.place_overlays(&detections, size),
            None => tracing::debug!(tick = self.stats.ticks, "placement skipped"),
        }

        if let Err(err) = self.renderer.render(&self.scene, &self.camera, &self.canvas) {
            self.stats.render_failures += 1;
            tracing::warn!(tick = self.stats.ticks, error = %err, "render failed");
        }
        self.stats.renders += 1;
    }

    /// Detections for the current frame in display pixels, or `None` when
    /// the detector rejected the frame.
    async fn detect(&mut self, size: DisplaySize) -> Option<Vec<Detection>> {
        if !self.detection_enabled {
            return Some(Vec::new());
        }
        let Some(frame) = self.video.latest() else {
            return Some(Vec::new());
        };
        let source = DisplaySize::new(frame.width, frame.height);
        match self.detector.detect(frame).await {
            Ok(detections) => Some(resize_results(detections, source, size)),
            Err(err) => {
                self.stats.detection_failures += 1;
                tracing::warn!(tick = self.stats.ticks, error = %err, "detection failed");
                None
            }
        }
    }

    fn place_overlays(&mut self, detections: &[Detection], size: DisplaySize) {
        let anchors = extract_anchors(detections);
        if self.debug_landmarks {
            if let Some(anchors) = &anchors {
                self.mark_anchors(anchors);
            }
        }

        let placement = place(anchors.as_ref(), size, &self.assets, &mut self.scene);
        tracing::debug!(
            tick = self.stats.ticks,
            faces = detections.len(),
            ears = placement.ears_positioned,
            label = placement.label_positioned,
            "placed overlays"
        );
    }

    fn mark_anchors(&mut self, anchors: &Anchors) {
        self.canvas.mark(anchors.left_ear, LEFT_EAR_MARK);
        self.canvas.mark(anchors.right_ear, RIGHT_EAR_MARK);
        self.canvas.mark(anchors.forehead, FOREHEAD_MARK);
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Resized => {
                let size = self.viewport_source.dimensions();
                self.viewport
                    .resize(size, &mut self.canvas, &mut self.renderer, &mut self.camera);
            }
            SessionEvent::Asset(event) => {
                self.assets.apply(event, &mut self.scene);
                if self.assets.settled() {
                    tracing::info!("all overlay assets resolved");
                }
            }
        }
    }
}

/// Resolves once the stop flag is set. Never resolves if every handle is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}
