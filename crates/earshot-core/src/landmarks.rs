//! Anchor selection from per-frame detections.
//!
//! Only the first detection of a frame is tracked. Any further faces are
//! ignored outright: no averaging, no preference for the face nearest the
//! center.

use crate::normalize::NormalizedPoint;
use crate::types::{Detection, DisplaySize, LandmarkPoint};

/// Index into the left/right eye contour used as the ear proxy.
pub const EAR_PROXY_INDEX: usize = 3;
/// Index into the nose run used as the forehead proxy (top of the bridge).
pub const FOREHEAD_PROXY_INDEX: usize = 0;

/// The three placement anchors, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchors {
    pub left_ear: LandmarkPoint,
    pub right_ear: LandmarkPoint,
    pub forehead: LandmarkPoint,
}

/// The three placement anchors, in virtual coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedAnchors {
    pub left_ear: NormalizedPoint,
    pub right_ear: NormalizedPoint,
    pub forehead: NormalizedPoint,
}

impl Anchors {
    pub fn from_detection(detection: &Detection) -> Self {
        let lm = &detection.landmarks;
        Self {
            left_ear: lm.left_eye()[EAR_PROXY_INDEX],
            right_ear: lm.right_eye()[EAR_PROXY_INDEX],
            forehead: lm.nose()[FOREHEAD_PROXY_INDEX],
        }
    }

    pub fn normalized(&self, size: DisplaySize) -> NormalizedAnchors {
        NormalizedAnchors {
            left_ear: NormalizedPoint::from_landmark(self.left_ear, size),
            right_ear: NormalizedPoint::from_landmark(self.right_ear, size),
            forehead: NormalizedPoint::from_landmark(self.forehead, size),
        }
    }
}

/// Pick anchors from the first detection, or `None` for an empty frame.
pub fn extract_anchors(detections: &[Detection]) -> Option<Anchors> {
    let first = detections.first()?;
    if detections.len() > 1 {
        tracing::trace!(ignored = detections.len() - 1, "tracking first face only");
    }
    Some(Anchors::from_detection(first))
}

/// Rescale detections produced on a `source`-sized frame into `target`
/// display pixels.
pub fn resize_results(
    detections: Vec<Detection>,
    source: DisplaySize,
    target: DisplaySize,
) -> Vec<Detection> {
    if source == target {
        return detections;
    }
    let sx = target.width as f32 / source.width as f32;
    let sy = target.height as f32 / source.height as f32;
    detections.iter().map(|d| d.scaled(sx, sy)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{synthetic_landmarks, FaceBox};

    fn detection(offset: f32) -> Detection {
        Detection {
            face: FaceBox { x: offset, y: offset, width: 100.0, height: 100.0, confidence: 0.8 },
            landmarks: synthetic_landmarks(offset),
        }
    }

    #[test]
    fn test_extract_empty() {
        assert_eq!(extract_anchors(&[]), None);
    }

    #[test]
    fn test_extract_picks_documented_points() {
        let anchors = extract_anchors(&[detection(0.0)]).unwrap();
        // left eye starts at 36, right eye at 42, nose at 27
        assert_eq!(anchors.left_ear, LandmarkPoint::new(39.0, 78.0));
        assert_eq!(anchors.right_ear, LandmarkPoint::new(45.0, 90.0));
        assert_eq!(anchors.forehead, LandmarkPoint::new(27.0, 54.0));
    }

    #[test]
    fn test_extract_ignores_all_but_first() {
        let first = extract_anchors(&[detection(0.0)]).unwrap();
        let multi = extract_anchors(&[detection(0.0), detection(500.0), detection(250.0)]).unwrap();
        assert_eq!(first, multi);
    }

    #[test]
    fn test_resize_results_scales_landmarks() {
        let resized = resize_results(
            vec![detection(0.0)],
            DisplaySize::new(640, 480),
            DisplaySize::new(1280, 240),
        );
        let anchors = extract_anchors(&resized).unwrap();
        assert_eq!(anchors.left_ear, LandmarkPoint::new(78.0, 39.0));
        assert_eq!(resized[0].face.width, 200.0);
    }

    #[test]
    fn test_resize_results_same_size_is_identity() {
        let size = DisplaySize::new(640, 480);
        let dets = vec![detection(3.0)];
        assert_eq!(resize_results(dets.clone(), size, size), dets);
    }

    #[test]
    fn test_normalized_anchors() {
        let anchors = Anchors {
            left_ear: LandmarkPoint::new(0.0, 0.0),
            right_ear: LandmarkPoint::new(200.0, 100.0),
            forehead: LandmarkPoint::new(100.0, 50.0),
        };
        let n = anchors.normalized(DisplaySize::new(200, 100));
        assert_eq!(n.left_ear, NormalizedPoint { x: -1.0, y: -1.0 });
        assert_eq!(n.right_ear, NormalizedPoint { x: 1.0, y: 1.0 });
        assert_eq!(n.forehead, NormalizedPoint { x: 0.0, y: 0.0 });
    }
}
