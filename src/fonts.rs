//! Font loading, text measurement and glyph rasterization using `ttf-parser`.
//!
//! The surrounding application supplies the template fonts as raw TTF/OTF
//! bytes. When none are supplied we fall back to synthetic Helvetica-like
//! metrics and draw each visible character as a solid block, so a template
//! still renders deterministically on a headless machine without fonts.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::raster::{fill_path, Path};

/// Weight of a text slot on the template.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
}

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
}

impl FontData {
    fn synthetic() -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
        }
    }

    fn is_synthetic(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Manages the fonts used by the certificate template.
pub struct FontManager {
    fonts: HashMap<FontStyle, FontData>,
    fallback: FontData,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            fallback: FontData::synthetic(),
        }
    }

    /// Load a TTF/OTF font from bytes for the given style.
    pub fn load_font(&mut self, style: FontStyle, bytes: Vec<u8>) -> Result<(), RenderError> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| RenderError::Font(format!("{style:?}: {e}")))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            bytes,
        };
        self.fonts.insert(style, data);
        Ok(())
    }

    /// Font data for a style. Bold falls back to regular, regular falls back
    /// to synthetic metrics.
    pub fn get(&self, style: FontStyle) -> &FontData {
        self.fonts
            .get(&style)
            .or_else(|| self.fonts.get(&FontStyle::Regular))
            .unwrap_or(&self.fallback)
    }

    /// Whether text in `style` is drawn with block glyphs because no font
    /// bytes are available for it, even after falling back.
    pub fn uses_block_glyphs(&self, style: FontStyle) -> bool {
        self.get(style).is_synthetic()
    }

    /// Measure the width of a string at a given font size (in px).
    /// Without font bytes we use an average character width heuristic
    /// (0.5 × font_size per char, bold ~10 % wider).
    pub fn measure_text_width(&self, text: &str, font_size: f32, style: FontStyle) -> f32 {
        let data = self.get(style);

        if data.is_synthetic() {
            return text.chars().count() as f32 * font_size * synthetic_advance(style);
        }

        match ttf_parser::Face::parse(&data.bytes, 0) {
            Ok(face) => {
                let scale = font_size / data.units_per_em;
                text.chars()
                    .map(|ch| match face.glyph_index(ch) {
                        Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                        None => font_size * 0.5,
                    })
                    .sum()
            }
            Err(_) => text.chars().count() as f32 * font_size * 0.5,
        }
    }

    /// Rasterize `text` onto `surface` with its left edge at `x` and its
    /// baseline at `baseline_y`. Glyphs falling outside the surface are
    /// clipped.
    pub fn draw_text(
        &self,
        surface: &mut RgbaImage,
        text: &str,
        x: f32,
        baseline_y: f32,
        font_size: f32,
        style: FontStyle,
        color: Rgba<u8>,
    ) {
        let path = self.text_path(text, x, baseline_y, font_size, style);
        if !path.is_empty() {
            fill_path(surface, &path, color);
        }
    }

    fn text_path(&self, text: &str, x: f32, baseline_y: f32, font_size: f32, style: FontStyle) -> Path {
        let data = self.get(style);
        let mut path = Path::new();

        let face = if data.is_synthetic() {
            None
        } else {
            ttf_parser::Face::parse(&data.bytes, 0).ok()
        };

        let Some(face) = face else {
            let advance = font_size * synthetic_advance(style);
            let cap_height = font_size * 0.7;
            let mut pen_x = x;
            for ch in text.chars() {
                if !ch.is_whitespace() {
                    path.rect(
                        pen_x + advance * 0.1,
                        baseline_y - cap_height,
                        pen_x + advance * 0.9,
                        baseline_y,
                    );
                }
                pen_x += advance;
            }
            return path;
        };

        let scale = font_size / data.units_per_em;
        let mut pen_x = x;
        for ch in text.chars() {
            let Some(gid) = face.glyph_index(ch) else {
                pen_x += font_size * 0.5;
                continue;
            };
            let mut pen = GlyphPen {
                path: &mut path,
                origin_x: pen_x,
                origin_y: baseline_y,
                scale,
            };
            face.outline_glyph(gid, &mut pen);
            pen_x += face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
        }
        path
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

fn synthetic_advance(style: FontStyle) -> f32 {
    match style {
        FontStyle::Regular => 0.5,
        FontStyle::Bold => 0.55,
    }
}

/// Maps font units (y up) onto surface pixels (y down).
struct GlyphPen<'a> {
    path: &'a mut Path,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPen<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for GlyphPen<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.path.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.path.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.path.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.path.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.path.close();
    }
}
