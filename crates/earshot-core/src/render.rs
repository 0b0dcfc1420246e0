//! Renderer seam and the 2D debug canvas drawn over the 3D output.

use crate::camera::PerspectiveCamera;
use crate::scene::Scene;
use crate::types::{DisplaySize, LandmarkPoint};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render surface is empty ({0})")]
    EmptySurface(DisplaySize),
    #[error("failed to write snapshot {path}: {reason}")]
    Snapshot { path: String, reason: String },
}

/// Rasterizes a scene as seen by a camera into an output surface.
pub trait Renderer {
    fn set_size(&mut self, size: DisplaySize);

    fn size(&self) -> DisplaySize;

    fn render(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        overlay: &OverlayCanvas,
    ) -> Result<(), RenderError>;
}

/// A point marker on the debug canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasMark {
    pub point: LandmarkPoint,
    pub color: [u8; 3],
}

/// 2D overlay for debug drawing, in display pixels. Cleared every tick.
#[derive(Debug, Clone)]
pub struct OverlayCanvas {
    size: DisplaySize,
    marks: Vec<CanvasMark>,
}

impl OverlayCanvas {
    pub fn new(size: DisplaySize) -> Self {
        Self {
            size,
            marks: Vec::new(),
        }
    }

    pub fn size(&self) -> DisplaySize {
        self.size
    }

    pub fn set_size(&mut self, size: DisplaySize) {
        self.size = size;
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    pub fn mark(&mut self, point: LandmarkPoint, color: [u8; 3]) {
        self.marks.push(CanvasMark { point, color });
    }

    pub fn marks(&self) -> &[CanvasMark] {
        &self.marks
    }
}
