//! # Analysis Overlay
//!
//! Draws the detected contour, bounding box with corner markers, fitted
//! ellipse, axis arrows, centroid and a measurement text block onto a copy of
//! the input, and encodes the result as base64 JPEG for transport.
//!
//! Text needs a TrueType font. Without one the drawing is still produced and
//! the text lines are returned alongside it.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::config::OverlayConfig;
use crate::errors::{AppError, AppResult};
use crate::geometry::{bounding_box, fit_ellipse, polygon_moments};
use crate::grid::GridEstimate;
use crate::measurement::Measurements;

const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const ELLIPSE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MAJOR_AXIS_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const MINOR_AXIS_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const CENTROID_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Fonts probed when no explicit font path is configured
const SYSTEM_FONTS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Rendered overlay and the text that belongs on it.
#[derive(Debug, Clone)]
pub struct RenderedOverlay {
    pub image: RgbImage,
    pub text_lines: Vec<String>,
    /// Whether the text was drawn into the image
    pub text_drawn: bool,
}

pub struct OverlayRenderer {
    config: OverlayConfig,
    font: Option<FontVec>,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Self {
        let font = load_font(config.font_path.as_deref());
        Self { config, font }
    }

    /// Renderer that never draws text.
    pub fn without_font(config: OverlayConfig) -> Self {
        Self { config, font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Full overlay for a measured sample.
    pub fn render_analysis(
        &self,
        image: &RgbImage,
        contour: &[Point<i32>],
        measurements: &Measurements,
        grid: &GridEstimate,
    ) -> RenderedOverlay {
        let mut canvas = image.clone();
        self.draw_sample(&mut canvas, contour);

        let mut text_lines = measurement_lines(measurements);
        text_lines.push(scale_line(grid));
        let text_drawn = self.draw_text_block(&mut canvas, &text_lines);
        RenderedOverlay {
            image: canvas,
            text_lines,
            text_drawn,
        }
    }

    /// Calibration text only, used when no sample was found.
    pub fn render_calibration_only(&self, image: &RgbImage, grid: &GridEstimate) -> RenderedOverlay {
        let mut canvas = image.clone();
        let text_lines = vec![
            scale_line(grid),
            format!("Calibration confidence: {:.0}%", grid.confidence * 100.0),
            "No sample detected - manual measurement available".to_string(),
        ];
        let text_drawn = self.draw_text_block(&mut canvas, &text_lines);
        RenderedOverlay {
            image: canvas,
            text_lines,
            text_drawn,
        }
    }

    /// Contour, box and ellipse without any text.
    pub fn render_contour_only(&self, image: &RgbImage, contour: &[Point<i32>]) -> RenderedOverlay {
        let mut canvas = image.clone();
        self.draw_sample(&mut canvas, contour);
        RenderedOverlay {
            image: canvas,
            text_lines: Vec::new(),
            text_drawn: false,
        }
    }

    /// JPEG at the configured quality, base64 encoded.
    pub fn encode_base64(&self, image: &RgbImage) -> AppResult<String> {
        encode_jpeg_base64(image, self.config.jpeg_quality)
    }

    fn draw_sample(&self, canvas: &mut RgbImage, contour: &[Point<i32>]) {
        let thickness = self.config.line_thickness;
        if contour.is_empty() {
            return;
        }

        let points: Vec<(f32, f32)> = contour.iter().map(|p| (p.x as f32, p.y as f32)).collect();
        draw_polyline(canvas, &points, true, CONTOUR_COLOR, thickness + 1);

        if let Some(bbox) = bounding_box(contour) {
            let (x0, y0) = (bbox.x as f32, bbox.y as f32);
            let (x1, y1) = (x0 + bbox.width as f32 - 1.0, y0 + bbox.height as f32 - 1.0);
            let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
            draw_polyline(canvas, &corners, true, BOX_COLOR, thickness);
            for (cx, cy) in corners {
                let size = 4 + thickness as i32;
                draw_filled_rect_mut(
                    canvas,
                    Rect::at(cx as i32 - size / 2, cy as i32 - size / 2)
                        .of_size(size as u32, size as u32),
                    BOX_COLOR,
                );
            }
        }

        if let Some(ellipse) = fit_ellipse(contour) {
            let (cx, cy) = (ellipse.center.0 as f32, ellipse.center.1 as f32);
            let theta = (ellipse.angle_degrees as f32).to_radians();
            let (a, b) = (ellipse.major_axis as f32 / 2.0, ellipse.minor_axis as f32 / 2.0);
            let (sin, cos) = theta.sin_cos();

            let outline: Vec<(f32, f32)> = (0..72)
                .map(|i| {
                    let t = i as f32 * std::f32::consts::TAU / 72.0;
                    let (x, y) = (a * t.cos(), b * t.sin());
                    (cx + x * cos - y * sin, cy + x * sin + y * cos)
                })
                .collect();
            draw_polyline(canvas, &outline, true, ELLIPSE_COLOR, thickness);

            let major = ((cx - a * cos, cy - a * sin), (cx + a * cos, cy + a * sin));
            let minor = ((cx + b * sin, cy - b * cos), (cx - b * sin, cy + b * cos));
            draw_arrow(canvas, major.0, major.1, MAJOR_AXIS_COLOR, thickness);
            draw_arrow(canvas, major.1, major.0, MAJOR_AXIS_COLOR, thickness);
            draw_arrow(canvas, minor.0, minor.1, MINOR_AXIS_COLOR, thickness);
            draw_arrow(canvas, minor.1, minor.0, MINOR_AXIS_COLOR, thickness);
        }

        if let Some((cx, cy)) = polygon_moments(contour).centroid() {
            let (cx, cy) = (cx as f32, cy as f32);
            draw_thick_line(canvas, (cx - 6.0, cy), (cx + 6.0, cy), CENTROID_COLOR, thickness);
            draw_thick_line(canvas, (cx, cy - 6.0), (cx, cy + 6.0), CENTROID_COLOR, thickness);
        }
    }

    /// Draws the lines on a white box in the top-left corner. False without a font.
    fn draw_text_block(&self, canvas: &mut RgbImage, lines: &[String]) -> bool {
        let Some(font) = &self.font else {
            return false;
        };
        if lines.is_empty() {
            return true;
        }

        let size = self.config.font_size;
        let line_height = (size * 1.4).ceil() as i32;
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let box_width = ((longest as f32) * size * 0.55).ceil() as u32 + 16;
        let box_height = (line_height * lines.len() as i32) as u32 + 12;
        draw_filled_rect_mut(
            canvas,
            Rect::at(6, 6).of_size(box_width.max(1), box_height.max(1)),
            TEXT_BACKGROUND,
        );

        let scale = PxScale::from(size);
        for (i, line) in lines.iter().enumerate() {
            draw_text_mut(canvas, TEXT_COLOR, 14, 12 + i as i32 * line_height, scale, font, line);
        }
        true
    }
}

impl std::fmt::Debug for OverlayRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRenderer")
            .field("config", &self.config)
            .field("font_loaded", &self.font.is_some())
            .finish()
    }
}

/// Text block lines for a measured sample.
pub fn measurement_lines(measurements: &Measurements) -> Vec<String> {
    vec![
        format!("Area: {:.2} mm²", measurements.area_mm2),
        format!("Length: {:.2} mm", measurements.length_max_mm),
        format!("Width: {:.2} mm", measurements.width_max_mm),
        format!("Perimeter: {:.2} mm", measurements.perimeter_mm),
        format!("Circularity: {:.3}", measurements.circularity),
    ]
}

fn scale_line(grid: &GridEstimate) -> String {
    format!("Scale: {:.2} px/mm ({})", grid.pixels_per_mm, grid.method)
}

/// JPEG-encodes and base64-encodes an RGB raster.
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> AppResult<String> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        encoder
            .encode_image(image)
            .map_err(|e| AppError::Encoding(format!("JPEG encoding failed: {}", e)))?;
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(buffer.into_inner()))
}

fn load_font(explicit: Option<&str>) -> Option<FontVec> {
    let candidates: Vec<&str> = match explicit {
        Some(path) => vec![path],
        None => SYSTEM_FONTS.to_vec(),
    };
    for path in candidates {
        if !Path::new(path).exists() {
            continue;
        }
        match fs::read(path).map_err(|e| e.to_string()).and_then(|data| {
            FontVec::try_from_vec(data).map_err(|e| e.to_string())
        }) {
            Ok(font) => {
                debug!(font_path = %path, "Overlay font loaded");
                return Some(font);
            }
            Err(e) => warn!(font_path = %path, error = %e, "Failed to load overlay font"),
        }
    }
    debug!("No overlay font available, text will be returned without drawing");
    None
}

fn draw_thick_line(canvas: &mut RgbImage, start: (f32, f32), end: (f32, f32), color: Rgb<u8>, thickness: u32) {
    let half = thickness as i32 / 2;
    let offsets = -half..=(thickness as i32 - 1 - half);
    for dx in offsets.clone() {
        for dy in offsets.clone() {
            let (ox, oy) = (dx as f32, dy as f32);
            draw_line_segment_mut(canvas, (start.0 + ox, start.1 + oy), (end.0 + ox, end.1 + oy), color);
        }
    }
}

fn draw_polyline(canvas: &mut RgbImage, points: &[(f32, f32)], closed: bool, color: Rgb<u8>, thickness: u32) {
    for pair in points.windows(2) {
        draw_thick_line(canvas, pair[0], pair[1], color, thickness);
    }
    if closed && points.len() > 2 {
        draw_thick_line(canvas, points[points.len() - 1], points[0], color, thickness);
    }
}

/// Line from `start` to `end` with an arrowhead at `end`.
fn draw_arrow(canvas: &mut RgbImage, start: (f32, f32), end: (f32, f32), color: Rgb<u8>, thickness: u32) {
    draw_thick_line(canvas, start, end, color, thickness);
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1.0 {
        return;
    }
    let head = (length * 0.15).clamp(4.0, 12.0);
    let back = dy.atan2(dx) + std::f32::consts::PI;
    for spread in [-0.45f32, 0.45] {
        let angle = back + spread;
        let tip = (end.0 + head * angle.cos(), end.1 + head * angle.sin());
        draw_thick_line(canvas, end, tip, color, thickness);
    }
}
