//! # Contour Geometry
//!
//! Polygon measures over closed pixel contours: area, arc length, bounding box,
//! convex hull, second-order moments with the equivalent ellipse, and polygon
//! rasterisation. Contours are ordered `Point<i32>` sequences whose last point
//! connects back to the first.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

/// Closed polygon in pixel coordinates.
pub type Contour = Vec<Point<i32>>;

/// Axis-aligned bounding box, `width = max_x - min_x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

/// Ellipse with the same second-order moments as a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseFit {
    pub center: (f64, f64),
    /// Full length of the major axis
    pub major_axis: f64,
    /// Full length of the minor axis
    pub minor_axis: f64,
    /// Orientation of the major axis in degrees, in [0, 180)
    pub angle_degrees: f64,
}

/// Raw and central moments of a polygon, up to second order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolygonMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub mu20: f64,
    pub mu11: f64,
    pub mu02: f64,
}

impl PolygonMoments {
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() < f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(contour: &[Point<i32>]) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = edges(contour)
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice_area as f64).abs() / 2.0
}

/// Perimeter of the polygon, including the closing edge when `closed`.
pub fn arc_length(contour: &[Point<i32>], closed: bool) -> f64 {
    if contour.len() < 2 {
        return 0.0;
    }
    let open_length: f64 = contour
        .windows(2)
        .map(|pair| distance(pair[0], pair[1]))
        .sum();
    if closed {
        open_length + distance(contour[contour.len() - 1], contour[0])
    } else {
        open_length
    }
}

pub fn bounding_box(contour: &[Point<i32>]) -> Option<BoundingBox> {
    let first = contour.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in contour {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    // Inclusive pixel extent
    Some(BoundingBox {
        x: min_x,
        y: min_y,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

pub fn convex_hull(contour: &[Point<i32>]) -> Contour {
    if contour.len() < 3 {
        return contour.to_vec();
    }
    imageproc::geometry::convex_hull(contour)
}

/// Moments of the region enclosed by the polygon, via Green's theorem.
pub fn polygon_moments(contour: &[Point<i32>]) -> PolygonMoments {
    if contour.len() < 3 {
        return PolygonMoments::default();
    }

    let (mut a, mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for (p, q) in edges(contour) {
        let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let cross = x0 * y1 - x1 * y0;
        a += cross;
        sx += (x0 + x1) * cross;
        sy += (y0 + y1) * cross;
        sxx += (x0 * x0 + x0 * x1 + x1 * x1) * cross;
        syy += (y0 * y0 + y0 * y1 + y1 * y1) * cross;
        sxy += (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0) * cross;
    }

    let sign = if a < 0.0 { -1.0 } else { 1.0 };
    let m00 = sign * a / 2.0;
    if m00 < f64::EPSILON {
        return PolygonMoments::default();
    }
    let m10 = sign * sx / 6.0;
    let m01 = sign * sy / 6.0;
    let m20 = sign * sxx / 12.0;
    let m02 = sign * syy / 12.0;
    let m11 = sign * sxy / 24.0;

    let cx = m10 / m00;
    let cy = m01 / m00;
    PolygonMoments {
        m00,
        m10,
        m01,
        mu20: m20 - cx * m10,
        mu11: m11 - cx * m01,
        mu02: m02 - cy * m01,
    }
}

/// Moment-equivalent ellipse. Needs at least five points and a non-zero area.
pub fn fit_ellipse(contour: &[Point<i32>]) -> Option<EllipseFit> {
    if contour.len() < 5 {
        return None;
    }
    let moments = polygon_moments(contour);
    let center = moments.centroid()?;

    // Normalised covariance of the enclosed region
    let a = moments.mu20 / moments.m00;
    let b = moments.mu11 / moments.m00;
    let c = moments.mu02 / moments.m00;

    let half_trace = (a + c) / 2.0;
    let root = (((a - c) / 2.0).powi(2) + b * b).sqrt();
    let lambda_major = half_trace + root;
    let lambda_minor = (half_trace - root).max(0.0);
    if !lambda_major.is_finite() || lambda_major <= 0.0 {
        return None;
    }

    let mut angle_degrees = 0.5 * (2.0 * b).atan2(a - c).to_degrees();
    if angle_degrees < 0.0 {
        angle_degrees += 180.0;
    }
    if angle_degrees >= 180.0 {
        angle_degrees -= 180.0;
    }

    Some(EllipseFit {
        center,
        major_axis: 4.0 * lambda_major.sqrt(),
        minor_axis: 4.0 * lambda_minor.sqrt(),
        angle_degrees,
    })
}

/// Rasterises the polygon (interior and boundary) into a binary mask.
pub fn fill_contour(mask: &mut GrayImage, contour: &[Point<i32>]) {
    let mut polygon: Vec<Point<i32>> = Vec::with_capacity(contour.len());
    for p in contour {
        if polygon.last() != Some(p) {
            polygon.push(*p);
        }
    }
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    match polygon.len() {
        0 => {}
        1 | 2 => {
            for p in &polygon {
                if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height() {
                    mask.put_pixel(p.x as u32, p.y as u32, Luma([255]));
                }
            }
        }
        _ => draw_polygon_mut(mask, &polygon, Luma([255])),
    }
}

pub fn distance(a: Point<i32>, b: Point<i32>) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

fn edges(contour: &[Point<i32>]) -> impl Iterator<Item = (Point<i32>, Point<i32>)> + '_ {
    contour
        .iter()
        .zip(contour.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}
