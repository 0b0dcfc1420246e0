//! 68-point facial landmark regression (PFLD-style export).
//!
//! The model sees a 112×112 RGB crop scaled to [0, 1] and emits 136 values:
//! x/y pairs normalized to the crop.

use crate::tracker::{require_model, sample_rgb, DetectorError};
use crate::types::{FaceBox, FaceLandmarks, LandmarkPoint, LANDMARK_COUNT};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const INPUT_SIZE: usize = 112;
/// Crop side relative to the longer side of the face box.
const CROP_SCALE: f32 = 1.2;

/// Square crop region in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Crop {
    x0: f32,
    y0: f32,
    side: f32,
}

impl Crop {
    fn around(face: &FaceBox) -> Self {
        let side = face.width.max(face.height) * CROP_SCALE;
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        Self {
            x0: cx - side / 2.0,
            y0: cy - side / 2.0,
            side,
        }
    }

    /// Crop-normalized (u, v) → frame pixels.
    fn to_frame(self, u: f32, v: f32) -> LandmarkPoint {
        LandmarkPoint::new(self.x0 + u * self.side, self.y0 + v * self.side)
    }
}

pub(crate) struct LandmarkRegressor {
    session: Session,
}

impl LandmarkRegressor {
    pub(crate) fn load(path: &Path, threads: usize) -> Result<Self, DetectorError> {
        require_model(path)?;

        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(path)?;

        tracing::info!(
            path = %path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }

    pub(crate) fn locate(
        &mut self,
        rgb: &[u8],
        width: usize,
        height: usize,
        face: &FaceBox,
    ) -> Result<FaceLandmarks, DetectorError> {
        let crop = Crop::around(face);
        let input = preprocess(rgb, width, height, crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;

        decode(values, crop)
    }
}

fn preprocess(rgb: &[u8], width: usize, height: usize, crop: Crop) -> Array4<f32> {
    let step = crop.side / INPUT_SIZE as f32;
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for y in 0..INPUT_SIZE {
        let sy = crop.y0 + (y as f32 + 0.5) * step - 0.5;
        for x in 0..INPUT_SIZE {
            let sx = crop.x0 + (x as f32 + 0.5) * step - 0.5;
            let px = sample_rgb(rgb, width, height, sx, sy);
            for (c, v) in px.iter().enumerate() {
                tensor[[0, c, y, x]] = v / 255.0;
            }
        }
    }
    tensor
}

fn decode(values: &[f32], crop: Crop) -> Result<FaceLandmarks, DetectorError> {
    if values.len() < LANDMARK_COUNT * 2 {
        return Err(DetectorError::InferenceFailed(format!(
            "landmark output has {} values, expected {}",
            values.len(),
            LANDMARK_COUNT * 2
        )));
    }
    let points: Vec<LandmarkPoint> = values
        .chunks_exact(2)
        .take(LANDMARK_COUNT)
        .map(|uv| crop.to_frame(uv[0], uv[1]))
        .collect();
    FaceLandmarks::try_from(points).map_err(|e| DetectorError::InferenceFailed(e.to_string()))
}
