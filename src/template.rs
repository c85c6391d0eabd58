//! Certificate template rendering – composes the background image, the name
//! and course overlays and a decorative line into a magnified raster.
//!
//! Rendering is two-phase. [`TemplateRenderer::begin_render`] lays the text
//! out on the shared surface, [`settle`] yields once so the layout pass can
//! complete, and [`PendingCapture::capture`] rasterises the surface into a
//! [`RenderedImage`]. The [`Renderer`] trait wraps both phases in one async
//! call.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::fonts::{FontManager, FontStyle};
use crate::raster::{fill_path, Path};
use crate::records::Record;

/// Magnification applied to the native template resolution.
pub const DEFAULT_MAGNIFICATION: u32 = 3;

/// Name shown when previewing the template without a record.
pub const PREVIEW_NAME: &str = "Your Name";

// ---------------------------------------------------------------------------
// Decorative variants
// ---------------------------------------------------------------------------

/// Decorative line drawn beneath the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Variant {
    /// Single solid rule.
    #[default]
    V1,
    /// Double rule.
    V2,
    /// Dashed rule.
    V3,
    /// Dotted rule.
    V4,
    /// Hairline with a centre diamond.
    V5,
}

impl Variant {
    pub const ALL: [Variant; 5] = [Variant::V1, Variant::V2, Variant::V3, Variant::V4, Variant::V5];

    fn index(self) -> usize {
        match self {
            Variant::V1 => 1,
            Variant::V2 => 2,
            Variant::V3 => 3,
            Variant::V4 => 4,
            Variant::V5 => 5,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "option{}", self.index())
    }
}

impl FromStr for Variant {
    type Err = RenderError;

    /// Accepts `option1`..`option5`, `v1`..`v5` and `1`..`5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower
            .strip_prefix("option")
            .or_else(|| lower.strip_prefix('v'))
            .unwrap_or(&lower);
        Variant::ALL
            .into_iter()
            .find(|v| digits.parse::<usize>().ok() == Some(v.index()))
            .ok_or_else(|| RenderError::InvalidTemplate(format!("unknown variant {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Layout config
// ---------------------------------------------------------------------------

/// Placement of one text overlay. Positions and sizes are fractions of the
/// native template size so one layout fits any background resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSlot {
    /// Horizontal centre of the text.
    pub center_x: f32,
    /// Baseline position.
    pub baseline_y: f32,
    /// Font size as a fraction of the template height.
    pub size: f32,
    pub style: FontStyle,
    pub color: [u8; 4],
}

/// Placement of the decorative line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecorationSlot {
    pub center_x: f32,
    pub center_y: f32,
    /// Line length as a fraction of the template width.
    pub width: f32,
    /// Stroke thickness as a fraction of the template height.
    pub thickness: f32,
    pub color: [u8; 4],
}

/// Where the overlays sit on the template and how much to magnify it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLayout {
    #[serde(default = "TemplateLayout::default_magnification")]
    pub magnification: u32,
    pub name: TextSlot,
    pub course: TextSlot,
    pub decoration: DecorationSlot,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            magnification: DEFAULT_MAGNIFICATION,
            name: TextSlot {
                center_x: 0.5,
                baseline_y: 0.52,
                size: 0.08,
                style: FontStyle::Bold,
                color: [26, 54, 93, 255],
            },
            course: TextSlot {
                center_x: 0.5,
                baseline_y: 0.62,
                size: 0.045,
                style: FontStyle::Regular,
                color: [64, 64, 64, 255],
            },
            decoration: DecorationSlot {
                center_x: 0.5,
                center_y: 0.68,
                width: 0.4,
                thickness: 0.004,
                color: [184, 134, 11, 255],
            },
        }
    }
}

impl TemplateLayout {
    fn default_magnification() -> u32 {
        DEFAULT_MAGNIFICATION
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, RenderError> {
        serde_json::from_str(json).map_err(|e| RenderError::InvalidTemplate(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Assets and inputs
// ---------------------------------------------------------------------------

/// Static assets supplied by the surrounding application.
#[derive(Clone)]
pub struct TemplateAssets {
    pub background: RgbaImage,
    pub regular_font: Option<Vec<u8>>,
    pub bold_font: Option<Vec<u8>>,
}

impl TemplateAssets {
    pub fn new(background: RgbaImage) -> Self {
        Self {
            background,
            regular_font: None,
            bold_font: None,
        }
    }

    /// Decode an encoded (PNG/JPEG) background.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, RenderError> {
        Ok(Self::new(image::load_from_memory(bytes)?.to_rgba8()))
    }

    /// Decode a `data:<mime>;base64,<data>` background.
    pub fn from_data_uri(src: &str) -> Result<Self, RenderError> {
        Self::from_image_bytes(&parse_data_uri(src)?)
    }

    pub fn with_font(mut self, style: FontStyle, bytes: Vec<u8>) -> Self {
        match style {
            FontStyle::Regular => self.regular_font = Some(bytes),
            FontStyle::Bold => self.bold_font = Some(bytes),
        }
        self
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, RenderError> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        RenderError::InvalidTemplate(format!(
            "background must be a base64 data URI (e.g. `data:image/png;base64,...`), got {preview:?}"
        ))
    })?;
    let (header, data) = rest.split_once(',').ok_or_else(|| {
        RenderError::InvalidTemplate("data URI is missing the `,` separator".to_string())
    })?;
    if !header.contains(";base64") {
        return Err(RenderError::InvalidTemplate(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| RenderError::InvalidTemplate(format!("base64 decode error: {e}")))
}

/// Values substituted into the template for one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFields {
    pub name: String,
    pub course: String,
    pub variant: Variant,
}

impl CertificateFields {
    pub fn new(name: impl Into<String>, course: impl Into<String>, variant: Variant) -> Self {
        Self {
            name: name.into(),
            course: course.into(),
            variant,
        }
    }

    pub fn from_record(record: &Record, variant: Variant) -> Self {
        Self::new(record.name(), record.course(), variant)
    }
}

/// A captured raster of the template. Dimensions are the native template
/// size times the magnification.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pixels: RgbaImage,
}

impl RenderedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

// ---------------------------------------------------------------------------
// Renderer capability
// ---------------------------------------------------------------------------

/// Anything that can turn certificate fields into a raster.
///
/// `&mut self` reflects that a renderer owns one surface which cannot serve
/// two renders at once.
#[allow(async_fn_in_trait)]
pub trait Renderer {
    async fn render(&mut self, fields: &CertificateFields) -> Result<RenderedImage, RenderError>;
}

/// Cooperative yield between laying out the overlays and capturing them.
pub async fn settle() {
    tokio::task::yield_now().await;
}

struct TextPlacement {
    text: String,
    x: f32,
    baseline_y: f32,
    font_size: f32,
    style: FontStyle,
    color: Rgba<u8>,
}

/// Headless renderer for the fixed certificate template.
pub struct TemplateRenderer {
    layout: TemplateLayout,
    fonts: FontManager,
    native_size: (u32, u32),
    /// Magnified background, copied onto the surface before each render.
    base: RgbaImage,
    surface: RgbaImage,
}

impl TemplateRenderer {
    pub fn new(assets: TemplateAssets, layout: TemplateLayout) -> Result<Self, RenderError> {
        let (native_w, native_h) = assets.background.dimensions();
        if native_w == 0 || native_h == 0 {
            return Err(RenderError::InvalidTemplate(
                "background image has no pixels".to_string(),
            ));
        }
        if layout.magnification == 0 {
            return Err(RenderError::InvalidTemplate(
                "magnification must be at least 1".to_string(),
            ));
        }

        let mag = layout.magnification;
        let (width, height) = native_w
            .checked_mul(mag)
            .zip(native_h.checked_mul(mag))
            .filter(|(w, h)| (*w as u128) * (*h as u128) * 4 <= isize::MAX as u128)
            .ok_or_else(|| {
                RenderError::SurfaceUnavailable(format!(
                    "{native_w}x{native_h} template at {mag}x does not fit in memory"
                ))
            })?;

        let base = if mag == 1 {
            assets.background
        } else {
            imageops::resize(&assets.background, width, height, FilterType::Triangle)
        };

        let mut fonts = FontManager::new();
        if let Some(bytes) = assets.regular_font {
            fonts.load_font(FontStyle::Regular, bytes)?;
        }
        if let Some(bytes) = assets.bold_font {
            fonts.load_font(FontStyle::Bold, bytes)?;
        }
        for style in [FontStyle::Regular, FontStyle::Bold] {
            if fonts.uses_block_glyphs(style) {
                log::warn!("No {style:?} template font supplied, {style:?} text will be drawn with block glyphs");
            }
        }

        log::debug!("Template {native_w}x{native_h} rendering at {width}x{height}");

        Ok(Self {
            layout,
            fonts,
            native_size: (native_w, native_h),
            surface: base.clone(),
            base,
        })
    }

    /// Whether `style` text falls back to block glyphs for lack of a font.
    pub fn uses_block_glyphs(&self, style: FontStyle) -> bool {
        self.fonts.uses_block_glyphs(style)
    }

    /// Template size before magnification.
    pub fn native_size(&self) -> (u32, u32) {
        self.native_size
    }

    /// Size of every captured image.
    pub fn output_size(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    pub fn layout(&self) -> &TemplateLayout {
        &self.layout
    }

    /// Reset the surface to the bare template and lay the overlays out.
    pub fn begin_render(&mut self, fields: &CertificateFields) -> PendingCapture<'_> {
        self.surface.copy_from_slice(&self.base);

        let placements = vec![
            self.place_text(&fields.name, &self.layout.name),
            self.place_text(&fields.course, &self.layout.course),
        ];

        PendingCapture {
            renderer: self,
            placements,
            variant: fields.variant,
        }
    }

    /// Render the template with the placeholder name.
    pub async fn preview(&mut self, course: &str, variant: Variant) -> Result<RenderedImage, RenderError> {
        self.render(&CertificateFields::new(PREVIEW_NAME, course, variant)).await
    }

    fn place_text(&self, text: &str, slot: &TextSlot) -> TextPlacement {
        let (width, height) = self.output_size();
        let font_size = slot.size * height as f32;
        let text_width = self.fonts.measure_text_width(text, font_size, slot.style);

        TextPlacement {
            text: text.to_string(),
            // Long names overflow both edges evenly and are clipped.
            x: slot.center_x * width as f32 - text_width / 2.0,
            baseline_y: slot.baseline_y * height as f32,
            font_size,
            style: slot.style,
            color: Rgba(slot.color),
        }
    }
}

impl Renderer for TemplateRenderer {
    async fn render(&mut self, fields: &CertificateFields) -> Result<RenderedImage, RenderError> {
        let pending = self.begin_render(fields);
        settle().await;
        Ok(pending.capture())
    }
}

/// A laid-out render waiting to be captured.
pub struct PendingCapture<'a> {
    renderer: &'a mut TemplateRenderer,
    placements: Vec<TextPlacement>,
    variant: Variant,
}

impl PendingCapture<'_> {
    /// Rasterise the overlays and copy the surface out.
    pub fn capture(self) -> RenderedImage {
        let renderer = self.renderer;

        for p in &self.placements {
            renderer.fonts.draw_text(
                &mut renderer.surface,
                &p.text,
                p.x,
                p.baseline_y,
                p.font_size,
                p.style,
                p.color,
            );
        }

        let slot = &renderer.layout.decoration;
        let path = decoration_path(self.variant, slot, renderer.surface.dimensions());
        fill_path(&mut renderer.surface, &path, Rgba(slot.color));

        RenderedImage::new(renderer.surface.clone())
    }
}

/// Outline of the decorative line for `variant`, in surface pixels.
fn decoration_path(variant: Variant, slot: &DecorationSlot, (width, height): (u32, u32)) -> Path {
    let cx = slot.center_x * width as f32;
    let cy = slot.center_y * height as f32;
    let half = slot.width * width as f32 / 2.0;
    let (left, right) = (cx - half, cx + half);
    let t = (slot.thickness * height as f32).max(1.0);

    let mut path = Path::new();
    match variant {
        Variant::V1 => path.rect(left, cy - t / 2.0, right, cy + t / 2.0),
        Variant::V2 => {
            path.rect(left, cy - 2.0 * t, right, cy - t);
            path.rect(left, cy + t, right, cy + 2.0 * t);
        }
        Variant::V3 => {
            let (dash, gap) = (6.0 * t, 4.0 * t);
            let mut x = left;
            while x < right {
                path.rect(x, cy - t / 2.0, (x + dash).min(right), cy + t / 2.0);
                x += dash + gap;
            }
        }
        Variant::V4 => {
            let spacing = 4.0 * t;
            let mut x = left + t;
            while x <= right - t {
                path.circle(x, cy, t);
                x += spacing;
            }
        }
        Variant::V5 => {
            path.rect(left, cy - t / 4.0, right, cy + t / 4.0);
            let d = 3.0 * t;
            path.move_to(cx, cy - d);
            path.line_to(cx + d, cy);
            path.line_to(cx, cy + d);
            path.line_to(cx - d, cy);
            path.close();
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(w: u32, h: u32) -> TemplateRenderer {
        let bg = RgbaImage::from_pixel(w, h, Rgba([250, 245, 230, 255]));
        TemplateRenderer::new(TemplateAssets::new(bg), TemplateLayout::default()).unwrap()
    }

    #[test]
    fn variant_parsing() {
        assert_eq!("option3".parse::<Variant>().unwrap(), Variant::V3);
        assert_eq!("V5".parse::<Variant>().unwrap(), Variant::V5);
        assert_eq!(" 2 ".parse::<Variant>().unwrap(), Variant::V2);
        assert!("option6".parse::<Variant>().is_err());
        assert!("fancy".parse::<Variant>().is_err());
        assert_eq!(Variant::V4.to_string(), "option4");
    }

    #[test]
    fn output_is_magnified() {
        let r = renderer(40, 30);
        assert_eq!(r.native_size(), (40, 30));
        assert_eq!(r.output_size(), (120, 90));
    }

    #[test]
    fn empty_background_is_rejected() {
        let result = TemplateRenderer::new(
            TemplateAssets::new(RgbaImage::new(0, 10)),
            TemplateLayout::default(),
        );
        assert!(matches!(result, Err(RenderError::InvalidTemplate(_))));
    }

    #[test]
    fn zero_magnification_is_rejected() {
        let layout = TemplateLayout {
            magnification: 0,
            ..TemplateLayout::default()
        };
        let bg = RgbaImage::new(10, 10);
        assert!(TemplateRenderer::new(TemplateAssets::new(bg), layout).is_err());
    }

    #[test]
    fn oversized_surface_is_unavailable() {
        let layout = TemplateLayout {
            magnification: u32::MAX,
            ..TemplateLayout::default()
        };
        let bg = RgbaImage::new(2, 2);
        let result = TemplateRenderer::new(TemplateAssets::new(bg), layout);
        assert!(matches!(result, Err(RenderError::SurfaceUnavailable(_))));
    }

    #[test]
    fn capture_draws_overlays_without_touching_the_base() {
        let mut r = renderer(60, 40);
        let fields = CertificateFields::new("Asha Rao", "Diploma", Variant::V1);
        let image = r.begin_render(&fields).capture();
        assert_ne!(image.pixels(), &r.base);

        // the next render starts again from the bare template
        let blank = r.begin_render(&CertificateFields::new("", "", Variant::V1));
        drop(blank);
        assert_eq!(r.surface, r.base);
    }

    #[test]
    fn variants_draw_differently() {
        let mut r = renderer(60, 40);
        let images: Vec<_> = Variant::ALL
            .iter()
            .map(|v| r.begin_render(&CertificateFields::new("Sam", "X", *v)).capture())
            .collect();
        for (i, a) in images.iter().enumerate() {
            for b in &images[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn overlong_names_are_clipped_not_rejected() {
        let mut r = renderer(20, 10);
        let name = "W".repeat(500);
        let image = r.begin_render(&CertificateFields::new(name, "X", Variant::V2)).capture();
        assert_eq!((image.width(), image.height()), (60, 30));
    }

    #[test]
    fn fonts_are_tracked_per_style() {
        let bg = RgbaImage::from_pixel(20, 10, Rgba([250, 245, 230, 255]));
        let assets = TemplateAssets::new(bg.clone())
            .with_font(FontStyle::Bold, include_bytes!("../tests/fonts/Tuffy.ttf").to_vec());
        let r = TemplateRenderer::new(assets, TemplateLayout::default()).unwrap();
        assert!(!r.uses_block_glyphs(FontStyle::Bold));
        assert!(r.uses_block_glyphs(FontStyle::Regular));

        let r = TemplateRenderer::new(TemplateAssets::new(bg), TemplateLayout::default()).unwrap();
        assert!(r.uses_block_glyphs(FontStyle::Bold));
    }

    #[test]
    fn layout_json_roundtrip() {
        let layout = TemplateLayout::default();
        let parsed = TemplateLayout::from_json(&layout.to_json()).unwrap();
        assert_eq!(parsed, layout);
        assert!(TemplateLayout::from_json("{}").is_err());
    }

    #[test]
    fn data_uri_background() {
        // 1×1 PNG
        let uri = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";
        let assets = TemplateAssets::from_data_uri(uri).unwrap();
        assert_eq!(assets.background.dimensions(), (1, 1));

        assert!(TemplateAssets::from_data_uri("certificate.jpg").is_err());
        assert!(TemplateAssets::from_data_uri("data:image/png,abc").is_err());
    }
}
