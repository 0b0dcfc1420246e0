//! Software compositor: the live frame, the projected overlays and the
//! debug canvas, all on one RGBA surface.

use crate::video::{FrameSource, VideoFeed};
use earshot_core::model::ModelAsset;
use earshot_core::scene::{Geometry, Material, SceneNode};
use earshot_core::text::TextMesh;
use earshot_core::{DisplaySize, OverlayCanvas, PerspectiveCamera, RenderError, Renderer, Scene};
use glam::{Mat4, Vec3};
use image::{Rgba, RgbaImage};
use std::ops::Range;
use std::path::PathBuf;

/// Half-width of a projected vertex splat, in pixels.
const SPLAT_RADIUS: i64 = 1;
/// Arm length of a debug mark cross.
const MARK_RADIUS: i64 = 4;
/// Brightness of the label's back face relative to its front.
const BACK_FACE_SHADE: f32 = 0.55;

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub dir: PathBuf,
    /// Write every n-th composite. 0 disables snapshots.
    pub every: u64,
}

pub struct Compositor {
    size: DisplaySize,
    surface: RgbaImage,
    video: Option<VideoFeed>,
    snapshots: Option<SnapshotSettings>,
    renders: u64,
}

impl Compositor {
    pub fn new(size: DisplaySize, video: Option<VideoFeed>, snapshots: Option<SnapshotSettings>) -> Self {
        Self {
            size,
            surface: RgbaImage::new(size.width, size.height),
            video,
            snapshots,
            renders: 0,
        }
    }

    fn draw_background(&mut self) {
        let frame = self.video.as_ref().and_then(|v| v.latest());
        let (w, h) = (self.size.width as u64, self.size.height as u64);
        match frame {
            Some(frame) if frame.width > 0 && frame.height > 0 => {
                for (x, y, px) in self.surface.enumerate_pixels_mut() {
                    let sx = (x as u64 * frame.width as u64 / w) as u32;
                    let sy = (y as u64 * frame.height as u64 / h) as u32;
                    let [r, g, b] = frame.pixel(sx, sy).unwrap_or([0, 0, 0]);
                    *px = Rgba([r, g, b, 255]);
                }
            }
            _ => {
                for px in self.surface.pixels_mut() {
                    *px = Rgba([0, 0, 0, 255]);
                }
            }
        }
    }

    fn draw_model(&mut self, view_projection: Mat4, node: &SceneNode, model: &ModelAsset) {
        let mvp = view_projection * node.transform.matrix();
        let color = shade(&node.material);
        for vertex in &model.vertices {
            let Some((px, py)) = to_pixel(mvp, *vertex, self.size) else {
                continue;
            };
            let (cx, cy) = (px.floor() as i64, py.floor() as i64);
            for dy in -SPLAT_RADIUS..=SPLAT_RADIUS {
                for dx in -SPLAT_RADIUS..=SPLAT_RADIUS {
                    self.blend(cx + dx, cy + dy, color, 1.0);
                }
            }
        }
    }

    /// The label's coverage mask stretched over its projected extent, with
    /// the back face `depth` behind it in a darker shade. The node origin is
    /// the left end of the baseline.
    fn draw_text(&mut self, view_projection: Mat4, node: &SceneNode, mesh: &TextMesh) {
        let mvp = view_projection * node.transform.matrix();
        let color = shade(&node.material);
        if mesh.depth > 0.0 {
            self.draw_text_face(mvp, mesh, -mesh.depth, dim(color, BACK_FACE_SHADE));
        }
        self.draw_text_face(mvp, mesh, 0.0, color);
    }

    fn draw_text_face(&mut self, mvp: Mat4, mesh: &TextMesh, z: f32, color: [u8; 3]) {
        let top_left = to_pixel(mvp, Vec3::new(0.0, mesh.world_height(), z), self.size);
        let bottom_right = to_pixel(mvp, Vec3::new(mesh.world_width(), 0.0, z), self.size);
        let (Some((x0, y0)), Some((x1, y1))) = (top_left, bottom_right) else {
            return;
        };
        let (w, h) = (x1 - x0, y1 - y0);
        if !(w >= 1.0 && h >= 1.0) {
            return;
        }

        let mask = &mesh.mask;
        for py in pixel_span(y0, y1, self.size.height) {
            let v = (py as f32 + 0.5 - y0) / h;
            if !(0.0..1.0).contains(&v) {
                continue;
            }
            let my = (v * mask.height as f32) as usize;
            for px in pixel_span(x0, x1, self.size.width) {
                let u = (px as f32 + 0.5 - x0) / w;
                if !(0.0..1.0).contains(&u) {
                    continue;
                }
                let coverage = mask.get((u * mask.width as f32) as usize, my);
                if coverage > 0 {
                    self.blend(px, py, color, coverage as f32 / 255.0);
                }
            }
        }
    }

    fn draw_marks(&mut self, canvas: &OverlayCanvas) {
        for mark in canvas.marks() {
            if !mark.point.x.is_finite() || !mark.point.y.is_finite() {
                continue;
            }
            let (cx, cy) = (mark.point.x.round() as i64, mark.point.y.round() as i64);
            for d in -MARK_RADIUS..=MARK_RADIUS {
                self.blend(cx + d, cy, mark.color, 1.0);
                self.blend(cx, cy + d, mark.color, 1.0);
            }
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: [u8; 3], alpha: f32) {
        if x < 0 || y < 0 || x >= self.size.width as i64 || y >= self.size.height as i64 {
            return;
        }
        let px = self.surface.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            let mixed = px.0[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
            px.0[c] = mixed.round().clamp(0.0, 255.0) as u8;
        }
        px.0[3] = 255;
    }

    fn write_snapshot(&self) -> Result<(), RenderError> {
        let Some(settings) = &self.snapshots else {
            return Ok(());
        };
        if settings.every == 0 || self.renders % settings.every != 0 {
            return Ok(());
        }
        let path = settings.dir.join(format!("frame-{:06}.png", self.renders));
        self.surface.save(&path).map_err(|e| RenderError::Snapshot {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "wrote snapshot");
        Ok(())
    }
}

impl Renderer for Compositor {
    fn set_size(&mut self, size: DisplaySize) {
        if size != self.size {
            self.surface = RgbaImage::new(size.width, size.height);
            self.size = size;
        }
    }

    fn size(&self) -> DisplaySize {
        self.size
    }

    fn render(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        overlay: &OverlayCanvas,
    ) -> Result<(), RenderError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(RenderError::EmptySurface(self.size));
        }

        self.draw_background();
        let view_projection = camera.view_projection();
        for node in scene.nodes() {
            match &node.geometry {
                Geometry::Model(model) => self.draw_model(view_projection, node, model),
                Geometry::Text(mesh) => self.draw_text(view_projection, node, mesh),
            }
        }
        self.draw_marks(overlay);

        self.renders += 1;
        self.write_snapshot()
    }
}

/// Flat approximation of the material: base color pulled toward the
/// emissive color by the emissive intensity.
fn shade(material: &Material) -> [u8; 3] {
    let base = rgb(material.color);
    let emissive = rgb(material.emissive);
    let k = (material.emissive_intensity * 0.5).clamp(0.0, 1.0);
    std::array::from_fn(|c| (base[c] as f32 * (1.0 - k) + emissive[c] as f32 * k).round() as u8)
}

fn dim(color: [u8; 3], k: f32) -> [u8; 3] {
    color.map(|c| (c as f32 * k).round() as u8)
}

/// Pixel indices covering `lo..hi`, clipped to `0..limit`.
fn pixel_span(lo: f32, hi: f32, limit: u32) -> Range<i64> {
    let start = lo.floor().max(0.0) as i64;
    let end = hi.ceil().min(limit as f32) as i64;
    start..end
}

fn rgb(hex: u32) -> [u8; 3] {
    [(hex >> 16) as u8, (hex >> 8) as u8, hex as u8]
}

/// Object-space point → surface pixel, `None` behind the camera.
fn to_pixel(mvp: Mat4, local: Vec3, size: DisplaySize) -> Option<(f32, f32)> {
    let clip = mvp * local.extend(1.0);
    if !(clip.w > 0.0) {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if !ndc.x.is_finite() || !ndc.y.is_finite() {
        return None;
    }
    Some((
        (ndc.x + 1.0) * 0.5 * size.width as f32,
        (1.0 - ndc.y) * 0.5 * size.height as f32,
    ))
}
