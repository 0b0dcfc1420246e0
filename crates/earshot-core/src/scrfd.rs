//! SCRFD face box proposals.
//!
//! Anchor-free decoding over three stride levels followed by greedy NMS.
//! Keypoint outputs, when the export has them, are not used: landmarks come
//! from the dedicated 68-point stage.

use crate::tracker::{require_model, sample_rgb, DetectorError};
use crate::types::FaceBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const INPUT_SIZE: usize = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// (score output, bbox output) per stride.
type OutputSlots = [(usize, usize); 3];

/// Uniform scale plus centering offsets of the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: usize, height: usize) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        Self {
            scale,
            pad_x: (INPUT_SIZE as f32 - width as f32 * scale) / 2.0,
            pad_y: (INPUT_SIZE as f32 - height as f32 * scale) / 2.0,
        }
    }

    fn to_frame(self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    fn to_input(self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
    }
}

pub(crate) struct BoxDetector {
    session: Session,
    slots: OutputSlots,
}

impl BoxDetector {
    pub(crate) fn load(path: &Path, threads: usize) -> Result<Self, DetectorError> {
        require_model(path)?;

        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD export needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }
        let slots = output_slots(&names);

        tracing::info!(path = %path.display(), outputs = ?names, ?slots, "loaded SCRFD model");

        Ok(Self { session, slots })
    }

    /// Face boxes in frame pixels, most confident first.
    pub(crate) fn detect(&mut self, rgb: &[u8], width: usize, height: usize) -> Result<Vec<FaceBox>, DetectorError> {
        let letterbox = Letterbox::fit(width, height);
        let input = preprocess(rgb, width, height, letterbox);
        let slots = self.slots;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, (score_idx, bbox_idx)) in STRIDES.iter().zip(slots) {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            candidates.extend(decode(scores, bboxes, stride, letterbox, SCORE_THRESHOLD));
        }

        Ok(suppress(candidates, NMS_IOU))
    }
}

/// NCHW RGB tensor, letterboxed, padded with the mean so padding reads as 0.
fn preprocess(rgb: &[u8], width: usize, height: usize, letterbox: Letterbox) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    let (x_lo, y_lo) = letterbox.to_input(0.0, 0.0);
    let (x_hi, y_hi) = letterbox.to_input(width as f32, height as f32);

    for y in 0..INPUT_SIZE {
        let cy = y as f32 + 0.5;
        for x in 0..INPUT_SIZE {
            let cx = x as f32 + 0.5;
            if cx < x_lo || cx >= x_hi || cy < y_lo || cy >= y_hi {
                continue;
            }
            let (sx, sy) = letterbox.to_frame(cx, cy);
            let px = sample_rgb(rgb, width, height, sx - 0.5, sy - 0.5);
            for (c, v) in px.iter().enumerate() {
                tensor[[0, c, y, x]] = (v - MEAN) / STD;
            }
        }
    }
    tensor
}

/// Map output names like `score_8` / `bbox_8` to stride slots, falling back
/// to the standard positional layout when the export uses numeric names.
fn output_slots(names: &[String]) -> OutputSlots {
    let find = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<(usize, usize)>> = STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

fn decode(scores: &[f32], bboxes: &[f32], stride: usize, letterbox: Letterbox, threshold: f32) -> Vec<FaceBox> {
    let cols = INPUT_SIZE / stride;
    let s = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > threshold)
        .filter_map(|(idx, &score)| {
            let d = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / ANCHORS_PER_CELL;
            let ax = (cell % cols) as f32 * s;
            let ay = (cell / cols) as f32 * s;
            let (x1, y1) = letterbox.to_frame(ax - d[0] * s, ay - d[1] * s);
            let (x2, y2) = letterbox.to_frame(ax + d[2] * s, ay + d[3] * s);
            Some(FaceBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn suppress(mut candidates: Vec<FaceBox>, iou: f32) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou) {
            kept.push(candidate);
        }
    }
    kept
}
