//! Live video feed: the capture thread publishes, the session reads.

use crate::session::SessionError;
use earshot_hw::{Camera, CameraError, Frame};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::watch;

pub type FrameSender = watch::Sender<Option<Arc<Frame>>>;

/// A video stream the session can wait on and sample.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Resolves once the stream has produced its first frame.
    async fn wait_until_playing(&mut self) -> Result<(), SessionError>;

    /// The most recent frame, if any.
    fn latest(&self) -> Option<Arc<Frame>>;
}

/// Receiving end of the capture thread's latest-frame channel.
#[derive(Clone)]
pub struct VideoFeed {
    rx: watch::Receiver<Option<Arc<Frame>>>,
}

impl VideoFeed {
    pub fn channel() -> (FrameSender, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

impl FrameSource for VideoFeed {
    async fn wait_until_playing(&mut self) -> Result<(), SessionError> {
        self.rx
            .wait_for(Option::is_some)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Acquisition("video stream ended before the first frame".into()))
    }

    fn latest(&self) -> Option<Arc<Frame>> {
        self.rx.borrow().clone()
    }
}

/// Stream `camera` on its own thread until every feed is dropped.
///
/// The first published frame is the "playback started" signal.
pub fn spawn_capture(
    camera: Camera,
    tx: FrameSender,
) -> std::io::Result<JoinHandle<Result<(), CameraError>>> {
    std::thread::Builder::new()
        .name("earshot-capture".into())
        .spawn(move || {
            let mut first = true;
            let result = camera.stream(|frame| {
                if first {
                    tracing::info!(
                        width = frame.width,
                        height = frame.height,
                        "video playback started"
                    );
                    first = false;
                }
                tx.send(Some(Arc::new(frame))).is_ok()
            });
            match &result {
                Ok(()) => tracing::info!("capture thread exiting"),
                Err(err) => tracing::error!(error = %err, "capture stream failed"),
            }
            result
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(sequence: u32) -> Arc<Frame> {
        Arc::new(Frame {
            data: vec![0; 4 * 2 * 3],
            width: 4,
            height: 2,
            timestamp: Instant::now(),
            sequence,
        })
    }

    #[tokio::test]
    async fn test_playing_after_first_frame() {
        let (tx, mut feed) = VideoFeed::channel();
        assert!(feed.latest().is_none());
        tx.send_replace(Some(frame(1)));
        feed.wait_until_playing().await.unwrap();
        assert_eq!(feed.latest().unwrap().sequence, 1);

        tx.send_replace(Some(frame(2)));
        assert_eq!(feed.latest().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_stream_ending_before_playback() {
        let (tx, mut feed) = VideoFeed::channel();
        drop(tx);
        assert!(matches!(
            feed.wait_until_playing().await,
            Err(SessionError::Acquisition(_))
        ));
    }

    #[tokio::test]
    async fn test_waits_for_late_first_frame() {
        let (tx, mut feed) = VideoFeed::channel();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.send_replace(Some(frame(7)));
            // keep the sender alive until the receiver has seen it
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        });
        feed.wait_until_playing().await.unwrap();
        assert_eq!(feed.latest().unwrap().sequence, 7);
    }
}
