//! Asynchronous overlay asset loading with retry.
//!
//! The ear model and the label each have one load path. File reads are
//! async; parsing runs on the blocking pool. Each path reports exactly once
//! to the session, with the asset or the error of its last attempt.

use crate::session::SessionEvent;
use earshot_core::model::ModelAsset;
use earshot_core::text::{TextMesh, EXTRUDE_DEPTH, GLYPH_SIZE};
use earshot_core::{AssetError, AssetEvent};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Attempts and exponential backoff for one load path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): doubles every time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Clone)]
pub struct AssetSources {
    pub ear_model: PathBuf,
    pub font: PathBuf,
    pub label_text: String,
}

pub async fn load_with_retry<T, F, Fut>(
    asset: &str,
    policy: RetryPolicy,
    mut load: F,
) -> Result<T, AssetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AssetError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match load().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    asset,
                    attempt,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "asset load failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub async fn load_ear_model(path: &Path) -> Result<ModelAsset, AssetError> {
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || ModelAsset::from_glb(&bytes))
        .await
        .map_err(|e| AssetError::Task(e.to_string()))?
}

pub async fn load_label(font: &Path, text: &str) -> Result<TextMesh, AssetError> {
    let bytes = tokio::fs::read(font).await?;
    let text = text.to_string();
    tokio::task::spawn_blocking(move || TextMesh::build(&bytes, &text, GLYPH_SIZE, EXTRUDE_DEPTH))
        .await
        .map_err(|e| AssetError::Task(e.to_string()))?
}

/// Start both load paths. Completions arrive on `events` in any order.
pub fn spawn_asset_loads(sources: AssetSources, policy: RetryPolicy, events: mpsc::Sender<SessionEvent>) {
    let ear_events = events.clone();
    let ear_path = sources.ear_model;
    tokio::spawn(async move {
        let result = load_with_retry("ear model", policy, || load_ear_model(&ear_path)).await;
        if let Err(err) = &result {
            tracing::error!(path = %ear_path.display(), error = %err, "giving up on ear model");
        }
        deliver(&ear_events, AssetEvent::EarModel(result)).await;
    });

    let font = sources.font;
    let text = sources.label_text;
    tokio::spawn(async move {
        let result = load_with_retry("label", policy, || load_label(&font, &text)).await;
        if let Err(err) = &result {
            tracing::error!(path = %font.display(), error = %err, "giving up on label font");
        }
        deliver(&events, AssetEvent::Label(result)).await;
    });
}

async fn deliver(events: &mpsc::Sender<SessionEvent>, event: AssetEvent) {
    if events.send(SessionEvent::Asset(event)).await.is_err() {
        tracing::debug!("session ended before asset load completed");
    }
}
