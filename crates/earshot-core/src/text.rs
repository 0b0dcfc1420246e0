//! Text label construction with `fontdue`.
//!
//! The label is laid out once into a coverage mask. World-space extent is
//! derived from the glyph size: one em of the rasterized font equals
//! `size` scene units.

use crate::assets::AssetError;
use fontdue::{Font, FontSettings};

/// Default label content.
pub const LABEL_TEXT: &str = "Ceci n'est pas un cog";
/// Em height of the label, in scene units.
pub const GLYPH_SIZE: f32 = 0.2;
/// Extrusion depth of the label, in scene units.
pub const EXTRUDE_DEPTH: f32 = 0.1;

const RASTER_PX: f32 = 64.0;

/// 8-bit glyph coverage, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl CoverageMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        if x < self.width && y < self.height {
            self.data[y * self.width + x]
        } else {
            0
        }
    }

    /// Max-combine a `w`×`h` bitmap at (`x`, `y`), clipping to the mask.
    fn blit_max(&mut self, x: i32, y: i32, w: usize, h: usize, bitmap: &[u8]) {
        for row in 0..h {
            let ty = y + row as i32;
            if ty < 0 || ty as usize >= self.height {
                continue;
            }
            for col in 0..w {
                let tx = x + col as i32;
                if tx < 0 || tx as usize >= self.width {
                    continue;
                }
                let dst = &mut self.data[ty as usize * self.width + tx as usize];
                *dst = (*dst).max(bitmap[row * w + col]);
            }
        }
    }
}

/// A laid-out text label.
#[derive(Debug, Clone)]
pub struct TextMesh {
    pub text: String,
    pub mask: CoverageMask,
    /// Em height in scene units.
    pub size: f32,
    /// Extrusion depth in scene units.
    pub depth: f32,
}

impl TextMesh {
    /// Lay out `text` with the TrueType/OpenType font in `font_bytes`.
    pub fn build(font_bytes: &[u8], text: &str, size: f32, depth: f32) -> Result<Self, AssetError> {
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|e| AssetError::Font(e.to_string()))?;

        let line = font
            .horizontal_line_metrics(RASTER_PX)
            .ok_or_else(|| AssetError::Font("font has no horizontal line metrics".into()))?;
        let baseline = line.ascent.round() as i32;
        let height = (line.ascent - line.descent).ceil().max(1.0) as usize;

        let mut pen = 0.0f32;
        let mut glyphs = Vec::with_capacity(text.len());
        for ch in text.chars() {
            let (metrics, bitmap) = font.rasterize(ch, RASTER_PX);
            let gx = pen.round() as i32 + metrics.xmin;
            let gy = baseline - metrics.ymin - metrics.height as i32;
            glyphs.push((gx, gy, metrics.width, metrics.height, bitmap));
            pen += metrics.advance_width;
        }

        let width = pen.ceil().max(1.0) as usize;
        let mut mask = CoverageMask::new(width, height);
        for (x, y, w, h, bitmap) in &glyphs {
            mask.blit_max(*x, *y, *w, *h, bitmap);
        }

        tracing::debug!(text, width, height, "laid out text label");

        Ok(Self {
            text: text.to_string(),
            mask,
            size,
            depth,
        })
    }

    /// Mask pixels per scene unit.
    pub fn pixels_per_unit(&self) -> f32 {
        RASTER_PX / self.size
    }

    pub fn world_width(&self) -> f32 {
        self.mask.width as f32 / self.pixels_per_unit()
    }

    pub fn world_height(&self) -> f32 {
        self.mask.height as f32 / self.pixels_per_unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    #[test]
    fn test_blit_max_clips_and_combines() {
        let mut mask = CoverageMask::new(4, 3);
        mask.blit_max(-1, -1, 3, 3, &[9, 9, 9, 9, 50, 60, 9, 70, 80]);
        mask.blit_max(1, 0, 1, 1, &[10]);
        assert_eq!(mask.get(0, 0), 50);
        assert_eq!(mask.get(1, 0), 60);
        assert_eq!(mask.get(0, 1), 70);
        assert_eq!(mask.get(1, 1), 80);
        assert_eq!(mask.get(3, 2), 0);
        assert_eq!(mask.get(10, 10), 0);
    }

    #[test]
    fn test_build_rejects_invalid_font() {
        let err = TextMesh::build(b"not a font", LABEL_TEXT, GLYPH_SIZE, EXTRUDE_DEPTH).unwrap_err();
        assert!(matches!(err, AssetError::Font(_)));
    }

    #[test]
    fn test_build_with_system_font() {
        let Ok(bytes) = std::fs::read(SYSTEM_FONT) else {
            eprintln!("Skipping test: {SYSTEM_FONT} not found");
            return;
        };
        let mesh = TextMesh::build(&bytes, LABEL_TEXT, GLYPH_SIZE, EXTRUDE_DEPTH).unwrap();
        assert!(mesh.mask.width > mesh.mask.height);
        assert!(mesh.mask.data.iter().any(|&c| c > 128));
        // roughly one em tall
        assert!(mesh.world_height() > 0.15 && mesh.world_height() < 0.4);
    }
}
