//! Circular natal chart rendering.
//!
//! The chart is laid out on a unit disk: the zodiac ring on the boundary,
//! sign glyphs at [`SIGN_LABEL_RADIUS`], bodies at [`BODY_RADIUS`] and aspect
//! lines between the placed bodies. Each call draws on its own canvas, so
//! concurrent renders share nothing.

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut,
    text_size,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

use crate::{
    Aspect, AspectKind, BodyPositions, CelestialBody, ChartError, Element, Result, ZodiacSign,
};

pub const OUTER_RADIUS: f64 = 1.0;
pub const SIGN_LABEL_RADIUS: f64 = 0.85;
pub const BODY_RADIUS: f64 = 0.7;
pub const MIN_SIZE_PX: u32 = 64;
pub const MAX_SIZE_PX: u32 = 8192;

/// Fraction of the half-width used by the outer circle; the rest is margin.
const DISK_FILL: f32 = 0.92;
const LINE_WIDTH_PX: u32 = 2;
const DASH_PX: f32 = 8.0;
const GAP_PX: f32 = 5.0;

/// DejaVu Sans, which covers the zodiac and planet symbols.
static DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const GREY: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// How ecliptic longitude maps onto the page.
///
/// Angles are mathematical (x right, y up). The default puts 0° straight
/// down with longitude increasing counter-clockwise.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConvention {
    pub zero_angle_degrees: f64,
    pub counter_clockwise: bool,
}

impl Default for RotationConvention {
    fn default() -> Self {
        RotationConvention {
            zero_angle_degrees: -90.0,
            counter_clockwise: true,
        }
    }
}

impl RotationConvention {
    pub fn page_angle(&self, longitude: f64) -> f64 {
        let sweep = if self.counter_clockwise {
            longitude
        } else {
            -longitude
        };
        self.zero_angle_degrees + sweep
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinePattern {
    Solid,
    Dashed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AspectStyle {
    pub color: Rgba<u8>,
    pub pattern: LinePattern,
}

pub fn aspect_style(kind: AspectKind) -> AspectStyle {
    let (color, pattern) = match kind {
        AspectKind::Conjunction => ([0, 0, 255], LinePattern::Solid),
        AspectKind::SemiSquare => ([255, 165, 0], LinePattern::Dashed),
        AspectKind::Sextile => ([0, 128, 0], LinePattern::Dashed),
        AspectKind::Square => ([255, 0, 0], LinePattern::Solid),
        AspectKind::Trine => ([0, 128, 0], LinePattern::Solid),
        AspectKind::Sesquiquadrate => ([128, 0, 128], LinePattern::Solid),
        AspectKind::Quincunx => ([0, 255, 255], LinePattern::Solid),
        AspectKind::Opposition => ([255, 0, 0], LinePattern::Dashed),
    };
    AspectStyle {
        color: Rgba([color[0], color[1], color[2], 255]),
        pattern,
    }
}

fn element_color(element: Element) -> Rgba<u8> {
    match element {
        Element::Fire => Rgba([214, 69, 65, 255]),
        Element::Earth => Rgba([120, 144, 72, 255]),
        Element::Air => Rgba([230, 190, 60, 255]),
        Element::Water => Rgba([60, 110, 200, 255]),
    }
}

fn body_color(body: CelestialBody) -> Rgba<u8> {
    let rgb = match body {
        CelestialBody::Sun => [230, 160, 0],
        CelestialBody::Moon => [140, 140, 160],
        CelestialBody::Mercury => [100, 100, 100],
        CelestialBody::Venus => [200, 120, 170],
        CelestialBody::Mars => [190, 30, 30],
        CelestialBody::Jupiter => [160, 100, 40],
        CelestialBody::Saturn => [90, 70, 40],
        CelestialBody::Uranus => [40, 160, 170],
        CelestialBody::Neptune => [40, 70, 170],
        CelestialBody::Pluto => [70, 20, 70],
    };
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

/// The bundled glyph font. `None` only if the embedded bytes fail to parse.
pub fn default_font() -> Option<FontArc> {
    match FontArc::try_from_slice(DEFAULT_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!(error = %e, "bundled font unreadable, drawing markers instead of glyphs");
            None
        }
    }
}

/// Size, orientation and glyph font for [`render_chart`].
///
/// The default carries the bundled font. With `font: None` signs and bodies
/// are drawn as coloured markers.
#[derive(Clone)]
pub struct RenderOptions {
    pub size_px: u32,
    pub rotation: RotationConvention,
    pub font: Option<FontArc>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            size_px: 800,
            rotation: RotationConvention::default(),
            font: default_font(),
        }
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("size_px", &self.size_px)
            .field("rotation", &self.rotation)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl RenderOptions {
    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| ChartError::Config(format!("invalid font: {e}")))?;
        self.font = Some(font);
        Ok(self)
    }
}

/// PNG-encoded chart image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartArtifact {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl ChartArtifact {
    pub fn as_png(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png(self) -> Vec<u8> {
        self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.png)?;
        Ok(())
    }
}

struct Layout {
    center: f32,
    radius_px: f32,
    rotation: RotationConvention,
}

impl Layout {
    fn new(size_px: u32, rotation: RotationConvention) -> Self {
        let half = size_px as f32 / 2.0;
        Layout {
            center: half,
            radius_px: half * DISK_FILL,
            rotation,
        }
    }

    fn point(&self, radius: f64, longitude: f64) -> (f32, f32) {
        let angle = self.rotation.page_angle(longitude).to_radians();
        let r = radius as f32 * self.radius_px;
        (
            self.center + r * angle.cos() as f32,
            self.center - r * angle.sin() as f32,
        )
    }

    fn glyph_scale(&self) -> PxScale {
        PxScale::from((self.radius_px * 0.09).max(8.0))
    }

    fn marker_radius(&self) -> i32 {
        ((self.radius_px * 0.025).round() as i32).max(2)
    }
}

/// Draws the chart for `positions` and `aspects` and encodes it as PNG.
///
/// Aspects referring to an absent body are skipped. Aspects are drawn in
/// canonical pair order, so their order in the slice does not affect pixels.
#[tracing::instrument(skip_all, fields(bodies = positions.len(), aspects = aspects.len()))]
pub fn render_chart(
    positions: &BodyPositions,
    aspects: &[Aspect],
    options: &RenderOptions,
) -> Result<ChartArtifact> {
    let size = options.size_px;
    if !(MIN_SIZE_PX..=MAX_SIZE_PX).contains(&size) {
        return Err(ChartError::render(format!(
            "image size {size}px outside {MIN_SIZE_PX}..={MAX_SIZE_PX}"
        )));
    }

    let layout = Layout::new(size, options.rotation);
    let mut canvas = RgbaImage::from_pixel(size, size, WHITE);

    draw_zodiac_ring(&mut canvas, &layout, options.font.as_ref());
    draw_aspects(&mut canvas, &layout, positions, aspects);
    draw_bodies(&mut canvas, &layout, positions, options.font.as_ref());

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(ChartError::render)?;
    debug!(bytes = png.len(), "chart encoded");

    Ok(ChartArtifact {
        png,
        width: size,
        height: size,
    })
}

fn draw_zodiac_ring(canvas: &mut RgbaImage, layout: &Layout, font: Option<&FontArc>) {
    let center = (layout.center.round() as i32, layout.center.round() as i32);
    let outer = (OUTER_RADIUS as f32 * layout.radius_px).round() as i32;
    for inset in 0..LINE_WIDTH_PX as i32 {
        draw_hollow_circle_mut(canvas, center, outer - inset, BLACK);
    }

    let origin = (layout.center, layout.center);
    for sign in ZodiacSign::ALL {
        let cusp = sign.index() as f64 * 30.0;
        let edge = layout.point(OUTER_RADIUS, cusp);
        draw_segment(canvas, origin, edge, GREY, LinePattern::Dashed);

        let label_at = layout.point(SIGN_LABEL_RADIUS, cusp + 15.0);
        match font {
            Some(font) => draw_centered_text(
                canvas,
                font,
                layout.glyph_scale(),
                label_at,
                sign.symbol(),
                BLACK,
            ),
            None => draw_marker(canvas, layout, label_at, element_color(sign.element())),
        }
    }
}

fn draw_aspects(
    canvas: &mut RgbaImage,
    layout: &Layout,
    positions: &BodyPositions,
    aspects: &[Aspect],
) {
    let mut ordered: Vec<&Aspect> = aspects.iter().collect();
    ordered.sort_by_key(|a| (a.body_a, a.body_b));

    for aspect in ordered {
        let (Some(lon_a), Some(lon_b)) =
            (positions.get(aspect.body_a), positions.get(aspect.body_b))
        else {
            warn!(%aspect, "aspect references a body without a position, skipping");
            continue;
        };
        let style = aspect_style(aspect.kind);
        draw_segment(
            canvas,
            layout.point(BODY_RADIUS, lon_a),
            layout.point(BODY_RADIUS, lon_b),
            style.color,
            style.pattern,
        );
    }
}

fn draw_bodies(
    canvas: &mut RgbaImage,
    layout: &Layout,
    positions: &BodyPositions,
    font: Option<&FontArc>,
) {
    for (body, longitude) in positions.iter() {
        let at = layout.point(BODY_RADIUS, longitude);
        match font {
            Some(font) => {
                draw_centered_text(canvas, font, layout.glyph_scale(), at, body.symbol(), BLACK)
            }
            None => draw_marker(canvas, layout, at, body_color(body)),
        }
    }
}

fn draw_marker(canvas: &mut RgbaImage, layout: &Layout, at: (f32, f32), color: Rgba<u8>) {
    let center = (at.0.round() as i32, at.1.round() as i32);
    let radius = layout.marker_radius();
    draw_filled_circle_mut(canvas, center, radius, color);
    draw_hollow_circle_mut(canvas, center, radius, BLACK);
}

fn draw_centered_text(
    canvas: &mut RgbaImage,
    font: &FontArc,
    scale: PxScale,
    at: (f32, f32),
    text: &str,
    color: Rgba<u8>,
) {
    let (w, h) = text_size(scale, font, text);
    let x = at.0.round() as i32 - (w / 2) as i32;
    let y = at.1.round() as i32 - (h / 2) as i32;
    draw_text_mut(canvas, color, x, y, scale, font, text);
}

fn draw_segment(
    canvas: &mut RgbaImage,
    from: (f32, f32),
    to: (f32, f32),
    color: Rgba<u8>,
    pattern: LinePattern,
) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < f32::EPSILON {
        draw_thick_line(canvas, from, to, color);
        return;
    }

    match pattern {
        LinePattern::Solid => draw_thick_line(canvas, from, to, color),
        LinePattern::Dashed => {
            let (ux, uy) = (dx / length, dy / length);
            let mut start = 0.0;
            while start < length {
                let end = (start + DASH_PX).min(length);
                draw_thick_line(
                    canvas,
                    (from.0 + ux * start, from.1 + uy * start),
                    (from.0 + ux * end, from.1 + uy * end),
                    color,
                );
                start += DASH_PX + GAP_PX;
            }
        }
    }
}

fn draw_thick_line(canvas: &mut RgbaImage, from: (f32, f32), to: (f32, f32), color: Rgba<u8>) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if length < f32::EPSILON {
        (0.0, 0.0)
    } else {
        (-dy / length, dx / length)
    };

    let half = (LINE_WIDTH_PX as f32 - 1.0) / 2.0;
    for step in 0..LINE_WIDTH_PX {
        let offset = step as f32 - half;
        draw_line_segment_mut(
            canvas,
            (from.0 + nx * offset, from.1 + ny * offset),
            (to.0 + nx * offset, to.1 + ny * offset),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_positions() -> BodyPositions {
        [
            (CelestialBody::Sun, 10.0),
            (CelestialBody::Moon, 100.0),
            (CelestialBody::Venus, 190.0),
            (CelestialBody::Saturn, 250.5),
        ]
        .into_iter()
        .collect()
    }

    fn small() -> RenderOptions {
        RenderOptions {
            size_px: 200,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn default_convention_puts_aries_at_the_bottom() {
        let layout = Layout::new(200, RotationConvention::default());
        let (x, y) = layout.point(1.0, 0.0);
        assert_abs_diff_eq!(x, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 100.0 + 92.0, epsilon = 1e-3);

        // 90° sweeps counter-clockwise to the right-hand side.
        let (x, y) = layout.point(1.0, 90.0);
        assert_abs_diff_eq!(x, 192.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn clockwise_convention_mirrors() {
        let rotation = RotationConvention {
            zero_angle_degrees: 90.0,
            counter_clockwise: false,
        };
        assert_abs_diff_eq!(rotation.page_angle(30.0), 60.0);
        let layout = Layout::new(200, rotation);
        let (x, y) = layout.point(1.0, 0.0);
        assert_abs_diff_eq!(x, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 8.0, epsilon = 1e-3);
    }

    #[test]
    fn renders_a_square_png() {
        let positions = sample_positions();
        let aspects = crate::detect_aspects(&positions);
        let artifact = render_chart(&positions, &aspects, &small()).unwrap();
        assert_eq!((artifact.width(), artifact.height()), (200, 200));

        let decoded = image::load_from_memory(artifact.as_png()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 200));
    }

    #[test]
    fn rendering_is_deterministic_and_ignores_aspect_order() {
        let positions = sample_positions();
        let aspects = crate::detect_aspects(&positions);
        assert!(aspects.len() > 1);
        let mut reversed = aspects.clone();
        reversed.reverse();

        let first = render_chart(&positions, &aspects, &small()).unwrap();
        let second = render_chart(&positions, &reversed, &small()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_chart_still_renders() {
        let artifact = render_chart(&BodyPositions::new(), &[], &small()).unwrap();
        assert!(!artifact.as_png().is_empty());
    }

    #[test]
    fn aspects_to_absent_bodies_are_ignored() {
        let positions: BodyPositions = [(CelestialBody::Sun, 0.0)].into_iter().collect();
        let dangling = [Aspect {
            body_a: CelestialBody::Sun,
            body_b: CelestialBody::Moon,
            kind: AspectKind::Opposition,
        }];
        let with = render_chart(&positions, &dangling, &small()).unwrap();
        let without = render_chart(&positions, &[], &small()).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn unusable_sizes_fail() {
        let options = RenderOptions {
            size_px: 10,
            ..RenderOptions::default()
        };
        let err = render_chart(&sample_positions(), &[], &options).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Render);
    }

    #[test]
    fn default_options_draw_glyphs() {
        let options = small();
        assert!(options.font.is_some());
        let markers_only = RenderOptions {
            font: None,
            ..small()
        };

        let positions = sample_positions();
        let with_glyphs = render_chart(&positions, &[], &options).unwrap();
        let with_markers = render_chart(&positions, &[], &markers_only).unwrap();
        assert_ne!(with_glyphs, with_markers);

        // Glyphs are black text; markers carry the element and body colours.
        let decoded = image::load_from_memory(with_glyphs.as_png()).unwrap().to_rgba8();
        let fire = element_color(Element::Fire);
        assert!(decoded.pixels().all(|p| *p != fire));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let err = RenderOptions::default()
            .with_font_bytes(vec![0, 1, 2, 3])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[test]
    fn style_table_matches_kinds() {
        assert_eq!(aspect_style(AspectKind::Square).pattern, LinePattern::Solid);
        assert_eq!(aspect_style(AspectKind::Opposition).pattern, LinePattern::Dashed);
        assert_eq!(
            aspect_style(AspectKind::Square).color,
            aspect_style(AspectKind::Opposition).color
        );
    }

    #[test]
    fn artifact_writes_to_disk() {
        let artifact = render_chart(&sample_positions(), &[], &small()).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        artifact.write_to(file.path()).unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), artifact.as_png());
    }
}
