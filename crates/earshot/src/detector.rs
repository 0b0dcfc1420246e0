use earshot_core::{Detection, DetectorError, FaceTracker, TrackerModels};
use earshot_hw::Frame;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("detector error: {0}")]
    Tracker(#[from] DetectorError),
    #[error("detector models not loaded")]
    NotLoaded,
    #[error("detector thread exited")]
    ChannelClosed,
    #[error("failed to spawn detector thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Face detection as seen by the session loop.
#[allow(async_fn_in_trait)]
pub trait Detect {
    async fn load_models(&mut self) -> Result<(), WorkerError>;

    /// Detections in `frame` pixel coordinates, best face first.
    async fn detect(&mut self, frame: Arc<Frame>) -> Result<Vec<Detection>, WorkerError>;
}

enum DetectorRequest {
    LoadModels {
        reply: oneshot::Sender<Result<(), WorkerError>>,
    },
    Detect {
        frame: Arc<Frame>,
        reply: oneshot::Sender<Result<Vec<Detection>, WorkerError>>,
    },
}

/// Clone-safe handle to the detector thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectorRequest>,
}

impl DetectorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, WorkerError>>) -> DetectorRequest,
    ) -> Result<T, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)?
    }
}

impl Detect for DetectorHandle {
    async fn load_models(&mut self) -> Result<(), WorkerError> {
        self.request(|reply| DetectorRequest::LoadModels { reply }).await
    }

    async fn detect(&mut self, frame: Arc<Frame>) -> Result<Vec<Detection>, WorkerError> {
        self.request(|reply| DetectorRequest::Detect { frame, reply }).await
    }
}

/// Spawn the detector on a dedicated OS thread.
///
/// Models are not opened here; the first `load_models` request loads them
/// on the detector thread. Until then every `detect` fails with
/// [`WorkerError::NotLoaded`].
pub fn spawn_detector(models: TrackerModels) -> Result<DetectorHandle, WorkerError> {
    let (tx, mut rx) = mpsc::channel::<DetectorRequest>(1);

    std::thread::Builder::new()
        .name("earshot-detector".into())
        .spawn(move || {
            tracing::info!("detector thread started");
            let mut tracker: Option<FaceTracker> = None;
            while let Some(req) = rx.blocking_recv() {
                match req {
                    DetectorRequest::LoadModels { reply } => {
                        let result = match FaceTracker::load(&models) {
                            Ok(loaded) => {
                                tracing::info!(
                                    boxes = %models.boxes.display(),
                                    landmarks = %models.landmarks.display(),
                                    "detector models loaded"
                                );
                                tracker = Some(loaded);
                                Ok(())
                            }
                            Err(err) => Err(err.into()),
                        };
                        let _ = reply.send(result);
                    }
                    DetectorRequest::Detect { frame, reply } => {
                        let result = match tracker.as_mut() {
                            Some(t) => t
                                .detect(&frame.data, frame.width, frame.height)
                                .map_err(WorkerError::from),
                            None => Err(WorkerError::NotLoaded),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("detector thread exiting");
        })?;

    Ok(DetectorHandle { tx })
}
