//! Two-stage face tracker via ONNX Runtime.
//!
//! SCRFD proposes face boxes on the full frame, then a 68-point landmark
//! regressor runs on a square crop around each box. Frames are packed RGB8.

use crate::landmarker::LandmarkRegressor;
use crate::scrfd::BoxDetector;
use crate::types::Detection;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on faces refined per frame.
pub const MAX_FACES: usize = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer has {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Model files and runtime settings for [`FaceTracker::load`].
#[derive(Debug, Clone)]
pub struct TrackerModels {
    pub boxes: PathBuf,
    pub landmarks: PathBuf,
    /// Intra-op threads per ONNX session.
    pub threads: usize,
}

pub struct FaceTracker {
    boxes: BoxDetector,
    landmarks: LandmarkRegressor,
}

impl FaceTracker {
    pub fn load(models: &TrackerModels) -> Result<Self, DetectorError> {
        let boxes = BoxDetector::load(&models.boxes, models.threads)?;
        let landmarks = LandmarkRegressor::load(&models.landmarks, models.threads)?;
        Ok(Self { boxes, landmarks })
    }

    /// Detect faces and their landmarks, most confident face first.
    pub fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<Detection>, DetectorError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected || expected == 0 {
            return Err(DetectorError::InvalidFrame {
                expected,
                actual: rgb.len(),
            });
        }

        let faces = self.boxes.detect(rgb, width as usize, height as usize)?;
        tracing::trace!(faces = faces.len(), "face boxes");

        faces
            .into_iter()
            .take(MAX_FACES)
            .map(|face| {
                let landmarks = self.landmarks.locate(rgb, width as usize, height as usize, &face)?;
                Ok(Detection { face, landmarks })
            })
            .collect()
    }
}

pub(crate) fn require_model(path: &Path) -> Result<(), DetectorError> {
    if path.exists() {
        Ok(())
    } else {
        Err(DetectorError::ModelNotFound(path.display().to_string()))
    }
}

/// Bilinear RGB sample at (`x`, `y`) with edge clamping.
pub(crate) fn sample_rgb(rgb: &[u8], width: usize, height: usize, x: f32, y: f32) -> [f32; 3] {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |xx: usize, yy: usize, c: usize| rgb[(yy * width + xx) * 3 + c] as f32;
    std::array::from_fn(|c| {
        let top = px(x0, y0, c) * (1.0 - fx) + px(x1, y0, c) * fx;
        let bottom = px(x0, y1, c) * (1.0 - fx) + px(x1, y1, c) * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rgb_uniform() {
        let rgb = [10u8, 20, 30].repeat(4 * 4);
        let s = sample_rgb(&rgb, 4, 4, 1.7, 2.2);
        assert_eq!(s, [10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_sample_rgb_interpolates() {
        // two pixels: black then white
        let rgb = [0u8, 0, 0, 255, 255, 255];
        let s = sample_rgb(&rgb, 2, 1, 0.5, 0.0);
        assert!((s[0] - 127.5).abs() < 1e-4);
        // clamped outside the frame
        assert_eq!(sample_rgb(&rgb, 2, 1, -4.0, 9.0)[1], 0.0);
        assert_eq!(sample_rgb(&rgb, 2, 1, 40.0, 0.0)[2], 255.0);
    }

    #[test]
    fn test_load_missing_models() {
        let models = TrackerModels {
            boxes: PathBuf::from("/nonexistent/det_10g.onnx"),
            landmarks: PathBuf::from("/nonexistent/pfld_68.onnx"),
            threads: 1,
        };
        assert!(matches!(FaceTracker::load(&models), Err(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_detect_on_blank_frame() {
        let models = TrackerModels {
            boxes: PathBuf::from("models/det_10g.onnx"),
            landmarks: PathBuf::from("models/pfld_68.onnx"),
            threads: 1,
        };
        if !models.boxes.exists() || !models.landmarks.exists() {
            eprintln!("Skipping test: tracker models not found");
            return;
        }
        let mut tracker = FaceTracker::load(&models).unwrap();
        let frame = vec![0u8; 320 * 240 * 3];
        assert!(tracker.detect(&frame, 320, 240).unwrap().is_empty());
        assert!(matches!(
            tracker.detect(&frame[..10], 320, 240),
            Err(DetectorError::InvalidFrame { .. })
        ));
    }
}
