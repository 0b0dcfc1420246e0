use serde::{Deserialize, Serialize};

/// Number of points in the iBUG / Multi-PIE facial landmark layout.
pub const LANDMARK_COUNT: usize = 68;

const JAW: std::ops::Range<usize> = 0..17;
const NOSE: std::ops::Range<usize> = 27..36;
const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
const MOUTH: std::ops::Range<usize> = 48..68;

/// Pixel dimensions of the display area the overlay is composited into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height. A zero height yields a non-finite ratio.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl std::fmt::Display for DisplaySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A landmark position in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let ix = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let iy =
            ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// The 68 facial landmarks of one face, grouped into named subsequences.
///
/// Always holds exactly [`LANDMARK_COUNT`] points; deserialization rejects
/// anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LandmarkPoint>", into = "Vec<LandmarkPoint>")]
pub struct FaceLandmarks {
    points: Vec<LandmarkPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {LANDMARK_COUNT} landmark points, got {0}")]
pub struct LandmarkCountError(pub usize);

impl TryFrom<Vec<LandmarkPoint>> for FaceLandmarks {
    type Error = LandmarkCountError;

    fn try_from(points: Vec<LandmarkPoint>) -> Result<Self, Self::Error> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkCountError(points.len()));
        }
        Ok(Self { points })
    }
}

impl From<FaceLandmarks> for Vec<LandmarkPoint> {
    fn from(landmarks: FaceLandmarks) -> Self {
        landmarks.points
    }
}

impl FaceLandmarks {
    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }

    pub fn jaw(&self) -> &[LandmarkPoint] {
        &self.points[JAW]
    }

    /// Nose bridge and tip, starting at the top of the bridge.
    pub fn nose(&self) -> &[LandmarkPoint] {
        &self.points[NOSE]
    }

    /// Left eye contour, starting at the outer corner.
    pub fn left_eye(&self) -> &[LandmarkPoint] {
        &self.points[LEFT_EYE]
    }

    /// Right eye contour, starting at the inner corner.
    pub fn right_eye(&self) -> &[LandmarkPoint] {
        &self.points[RIGHT_EYE]
    }

    pub fn mouth(&self) -> &[LandmarkPoint] {
        &self.points[MOUTH]
    }

    /// Scale every point (and nothing else) by independent x/y factors.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| LandmarkPoint::new(p.x * sx, p.y * sy))
                .collect(),
        }
    }
}

/// One detected face: its box and its landmarks, in pixel coordinates of
/// whatever space the detection was produced (or resized) in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub face: FaceBox,
    pub landmarks: FaceLandmarks,
}

impl Detection {
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            face: FaceBox {
                x: self.face.x * sx,
                y: self.face.y * sy,
                width: self.face.width * sx,
                height: self.face.height * sy,
                confidence: self.face.confidence,
            },
            landmarks: self.landmarks.scaled(sx, sy),
        }
    }
}

#[cfg(test)]
pub(crate) fn synthetic_landmarks(offset: f32) -> FaceLandmarks {
    // Point i sits at (offset + i, offset + 2i) so subsequence indices are easy to check.
    let points = (0..LANDMARK_COUNT)
        .map(|i| LandmarkPoint::new(offset + i as f32, offset + 2.0 * i as f32))
        .collect::<Vec<_>>();
    FaceLandmarks::try_from(points).unwrap()
}
