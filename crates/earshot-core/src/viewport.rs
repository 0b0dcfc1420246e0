//! Viewport resize handling.
//!
//! A resize updates, in order: the display size, the debug canvas, the
//! renderer output and the camera projection. Applying the same size twice
//! leaves everything exactly as after the first application.

use crate::camera::PerspectiveCamera;
use crate::render::{OverlayCanvas, Renderer};
use crate::types::DisplaySize;

/// Where the current display dimensions are read from when a resize is
/// signalled.
pub trait ViewportSource {
    fn dimensions(&self) -> DisplaySize;
}

/// Owner of the current display size.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    size: DisplaySize,
}

impl Viewport {
    pub fn new(size: DisplaySize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> DisplaySize {
        self.size
    }

    /// Apply `size` to every size-dependent component. Returns whether the
    /// display size actually changed.
    pub fn resize<R: Renderer + ?Sized>(
        &mut self,
        size: DisplaySize,
        canvas: &mut OverlayCanvas,
        renderer: &mut R,
        camera: &mut PerspectiveCamera,
    ) -> bool {
        let changed = size != self.size;
        self.size = size;
        canvas.set_size(size);
        renderer.set_size(size);
        camera.aspect = size.aspect();
        camera.update_projection();

        if changed {
            tracing::info!(%size, aspect = camera.aspect, "viewport resized");
        } else {
            tracing::debug!(%size, "viewport resize with unchanged size");
        }
        changed
    }
}
