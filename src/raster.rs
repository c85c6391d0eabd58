//! Anti-aliased filling on an RGBA surface.
//!
//! Paths are flattened into line edges and filled with the non-zero winding
//! rule. Coverage is exact horizontally and sampled on [`SUBSAMPLES`]
//! sub-scanlines vertically. Everything is clipped to the surface, so shapes
//! that overflow the template are cut off rather than rejected.

use image::{Rgba, RgbaImage};

/// Sub-scanlines per pixel row.
const SUBSAMPLES: usize = 4;

/// Segments used to flatten one curve.
const CURVE_STEPS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

/// A closed outline in surface pixel coordinates (origin top-left).
#[derive(Debug, Clone, Default)]
pub struct Path {
    edges: Vec<Edge>,
    start: (f32, f32),
    current: (f32, f32),
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.close();
        self.start = (x, y);
        self.current = (x, y);
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        let (x0, y0) = self.current;
        self.edges.push(Edge { x0, y0, x1: x, y1: y });
        self.current = (x, y);
    }

    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        let (x0, y0) = self.current;
        for step in 1..=CURVE_STEPS {
            let t = step as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let px = mt * mt * x0 + 2.0 * mt * t * cx + t * t * x;
            let py = mt * mt * y0 + 2.0 * mt * t * cy + t * t * y;
            self.line_to(px, py);
        }
    }

    pub fn cubic_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) {
        let (x0, y0) = self.current;
        for step in 1..=CURVE_STEPS {
            let t = step as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let a = mt * mt * mt;
            let b = 3.0 * mt * mt * t;
            let c = 3.0 * mt * t * t;
            let d = t * t * t;
            self.line_to(
                a * x0 + b * c1x + c * c2x + d * x,
                a * y0 + b * c1y + c * c2y + d * y,
            );
        }
    }

    pub fn close(&mut self) {
        if self.current != self.start {
            let (x, y) = self.start;
            self.line_to(x, y);
        }
    }

    /// Axis-aligned rectangle.
    pub fn rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32) {
        self.move_to(x0, y0);
        self.line_to(x1, y0);
        self.line_to(x1, y1);
        self.line_to(x0, y1);
        self.close();
    }

    /// Regular polygon approximating a circle.
    pub fn circle(&mut self, cx: f32, cy: f32, radius: f32) {
        const SIDES: usize = 16;
        self.move_to(cx + radius, cy);
        for i in 1..SIDES {
            let angle = i as f32 * std::f32::consts::TAU / SIDES as f32;
            self.line_to(cx + radius * angle.cos(), cy + radius * angle.sin());
        }
        self.close();
    }

    fn vertical_bounds(&self) -> Option<(f32, f32)> {
        self.edges.iter().fold(None, |acc, e| {
            let lo = e.y0.min(e.y1);
            let hi = e.y0.max(e.y1);
            Some(match acc {
                None => (lo, hi),
                Some((a, b)) => (a.min(lo), b.max(hi)),
            })
        })
    }
}

/// Fill `path` with `color` using the non-zero winding rule.
pub fn fill_path(surface: &mut RgbaImage, path: &Path, color: Rgba<u8>) {
    let mut path = path.clone();
    path.close();

    let Some((top, bottom)) = path.vertical_bounds() else {
        return;
    };
    let (width, height) = surface.dimensions();
    let first_row = top.floor().max(0.0) as u32;
    let last_row = (bottom.ceil().max(0.0) as u32).min(height);

    let mut coverage = vec![0.0f32; width as usize];
    let mut crossings: Vec<(f32, i32)> = Vec::new();

    for row in first_row..last_row {
        coverage.iter_mut().for_each(|c| *c = 0.0);

        for sub in 0..SUBSAMPLES {
            let sy = row as f32 + (sub as f32 + 0.5) / SUBSAMPLES as f32;
            crossings.clear();
            for e in &path.edges {
                if e.y0 == e.y1 {
                    continue;
                }
                let (lo, hi, dir) = if e.y0 < e.y1 {
                    (e.y0, e.y1, 1)
                } else {
                    (e.y1, e.y0, -1)
                };
                if sy < lo || sy >= hi {
                    continue;
                }
                let t = (sy - e.y0) / (e.y1 - e.y0);
                crossings.push((e.x0 + t * (e.x1 - e.x0), dir));
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for pair in crossings.windows(2) {
                winding += pair[0].1;
                if winding != 0 {
                    accumulate_span(&mut coverage, pair[0].0, pair[1].0);
                }
            }
        }

        for (x, c) in coverage.iter().enumerate() {
            if *c > 0.0 {
                blend_pixel(surface, x as u32, row, color, c.min(1.0));
            }
        }
    }
}

fn accumulate_span(coverage: &mut [f32], x0: f32, x1: f32) {
    let width = coverage.len() as f32;
    let x0 = x0.clamp(0.0, width);
    let x1 = x1.clamp(0.0, width);
    if x1 <= x0 {
        return;
    }
    let weight = 1.0 / SUBSAMPLES as f32;
    let first = x0.floor() as usize;
    let last = (x1.ceil() as usize).min(coverage.len());
    for (px, c) in coverage.iter_mut().enumerate().take(last).skip(first) {
        let left = x0.max(px as f32);
        let right = x1.min(px as f32 + 1.0);
        if right > left {
            *c += (right - left) * weight;
        }
    }
}

/// Source-over blend of `color` scaled by `coverage` onto one pixel.
fn blend_pixel(surface: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>, coverage: f32) {
    let alpha = coverage * color[3] as f32 / 255.0;
    let dst = surface.get_pixel_mut(x, y);
    for i in 0..3 {
        let blended = color[i] as f32 * alpha + dst[i] as f32 * (1.0 - alpha);
        dst[i] = blended.round().clamp(0.0, 255.0) as u8;
    }
    let out_alpha = alpha * 255.0 + dst[3] as f32 * (1.0 - alpha);
    dst[3] = out_alpha.round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn white(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Path {
        let mut path = Path::new();
        path.rect(x0, y0, x1, y1);
        path
    }

    #[test]
    fn pixel_aligned_rect_is_solid() {
        let mut img = white(10, 10);
        fill_path(&mut img, &rect(2.0, 2.0, 5.0, 4.0), BLACK);
        assert_eq!(*img.get_pixel(2, 2), BLACK);
        assert_eq!(*img.get_pixel(4, 3), BLACK);
        assert_eq!(*img.get_pixel(5, 3), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(3, 4), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn half_covered_pixel_is_grey() {
        let mut img = white(4, 1);
        fill_path(&mut img, &rect(0.0, 0.0, 1.5, 1.0), BLACK);
        let p = img.get_pixel(1, 0);
        assert!(p[0] > 100 && p[0] < 155, "got {:?}", p);
    }

    #[test]
    fn shapes_outside_the_surface_are_clipped() {
        let mut img = white(4, 4);
        fill_path(&mut img, &rect(-10.0, -10.0, 20.0, 20.0), BLACK);
        assert!(img.pixels().all(|p| *p == BLACK));
        fill_path(&mut img, &rect(100.0, 100.0, 200.0, 200.0), Rgba([255, 0, 0, 255]));
        assert!(img.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn circle_covers_its_centre() {
        let mut img = white(20, 20);
        let mut path = Path::new();
        path.circle(10.0, 10.0, 5.0);
        fill_path(&mut img, &path, BLACK);
        assert_eq!(*img.get_pixel(10, 10), BLACK);
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }
}
