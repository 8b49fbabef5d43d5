// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quadrilateral detection: every colour channel is binarised at several
// levels (Canny edges first, then hard thresholds), contours are simplified
// to polygons, and convex near-rectangular 4-gons are kept as candidates.

use gridscan_core::config::DetectorConfig;
use gridscan_core::types::{Point, Quad};
use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::geometry::{arc_length, contour_area};
use imageproc::morphology::dilate;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::image::ImageProcessor;

/// Guards the cosine denominator against zero-length edges.
const COSINE_EPSILON: f64 = 1e-10;

/// Finds candidate answer cells on a page.
///
/// The same physical cell is usually found by several passes; the output
/// keeps every hit and leaves collapsing them to the deduplication stage.
pub struct QuadDetector {
    config: DetectorConfig,
}

impl QuadDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Run all channel × level passes and concatenate their candidates in
    /// pass order (channel-major). The result does not depend on whether the
    /// passes ran in parallel.
    #[instrument(skip_all, fields(width = page.width(), height = page.height()))]
    pub fn detect(&self, page: &ImageProcessor) -> Vec<Quad> {
        let channels = page.channels();
        let levels = self.config.threshold_levels;
        let passes: Vec<(usize, u32)> = (0..channels.len())
            .flat_map(|c| (0..levels).map(move |l| (c, l)))
            .collect();

        let run = |&(channel, level): &(usize, u32)| {
            let found = self.detect_pass(&channels[channel], level);
            debug!(channel, level, found = found.len(), "Detection pass complete");
            found
        };

        let per_pass: Vec<Vec<Quad>> = if self.config.parallel_passes {
            passes.par_iter().map(run).collect()
        } else {
            passes.iter().map(run).collect()
        };

        let quads: Vec<Quad> = per_pass.into_iter().flatten().collect();
        info!(
            passes = passes.len(),
            candidates = quads.len(),
            "Quadrilateral detection complete"
        );
        quads
    }

    /// One pass over one channel at one level.
    fn detect_pass(&self, gray: &GrayImage, level: u32) -> Vec<Quad> {
        let binary = self.binarize(gray, level);
        find_contours::<i32>(&binary)
            .into_iter()
            .filter_map(|contour| {
                if contour.points.len() < 4 {
                    return None;
                }
                let epsilon = arc_length(&contour.points, true) * self.config.approx_epsilon_ratio;
                let outline: Vec<Point> = contour
                    .points
                    .iter()
                    .map(|p| Point::new(p.x, p.y))
                    .collect();
                let polygon = approximate_closed_polygon(&outline, epsilon);
                if is_cell_candidate(&polygon, self.config.min_area, self.config.max_cosine) {
                    Quad::from_slice(&polygon)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Level 0: dilated Canny edges. Level `l > 0`: `pixel >= (l + 1) * 255 / N`.
    fn binarize(&self, gray: &GrayImage, level: u32) -> GrayImage {
        if level == 0 {
            let edges = canny(gray, self.config.canny_low, self.config.canny_high);
            // Close one-pixel gaps between edge segments.
            return dilate(&edges, Norm::LInf, 1);
        }
        let levels = u64::from(self.config.threshold_levels.max(1));
        let threshold = ((u64::from(level) + 1) * 255 / levels).min(255) as u8;
        let mut binary = gray.clone();
        for pixel in binary.pixels_mut() {
            pixel.0[0] = if pixel.0[0] >= threshold { 255 } else { 0 };
        }
        binary
    }
}

/// The acceptance test for a simplified contour: exactly four vertices,
/// absolute area above `min_area`, convex, and every corner's |cos| below
/// `max_cosine`.
pub fn is_cell_candidate(polygon: &[Point], min_area: f64, max_cosine: f64) -> bool {
    polygon.len() == 4
        && contour_area(&to_imageproc_points(polygon)).abs() > min_area
        && is_convex(polygon)
        && max_corner_cosine(polygon) < max_cosine
}

fn to_imageproc_points(polygon: &[Point]) -> Vec<imageproc::point::Point<i32>> {
    polygon
        .iter()
        .map(|p| imageproc::point::Point::new(p.x, p.y))
        .collect()
}

/// True when every turn along the closed polygon has the same orientation.
pub fn is_convex(polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0i64;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let c = polygon[(i + 2) % n];
        let cross = (b.x - a.x) as i64 * (c.y - b.y) as i64 - (b.y - a.y) as i64 * (c.x - b.x) as i64;
        if cross == 0 {
            continue;
        }
        if sign == 0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0
}

/// Largest |cos| of the interior angle over all corners of a closed polygon.
pub fn max_corner_cosine(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let corner = polygon[i];
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            corner_cosine(prev, next, corner).abs()
        })
        .fold(0.0, f64::max)
}

/// Cosine of the angle between `corner → a` and `corner → b`.
fn corner_cosine(a: Point, b: Point, corner: Point) -> f64 {
    let dx1 = (a.x - corner.x) as f64;
    let dy1 = (a.y - corner.y) as f64;
    let dx2 = (b.x - corner.x) as f64;
    let dy2 = (b.y - corner.y) as f64;
    (dx1 * dx2 + dy1 * dy2)
        / ((dx1 * dx1 + dy1 * dy1) * (dx2 * dx2 + dy2 * dy2) + COSINE_EPSILON).sqrt()
}

/// Douglas–Peucker simplification of a closed contour.
///
/// The ring is split at its first point and the point farthest from it; each
/// half is simplified as an open chain and the halves are rejoined. The
/// returned polygon lists each kept vertex once, in contour order.
pub fn approximate_closed_polygon(contour: &[Point], epsilon: f64) -> Vec<Point> {
    let n = contour.len();
    if n <= 3 {
        return contour.to_vec();
    }

    let origin = contour[0];
    let far = (1..n)
        .max_by(|&a, &b| origin.distance(&contour[a]).total_cmp(&origin.distance(&contour[b])))
        .unwrap_or(n / 2);

    // Index `n` stands for the origin again, closing the ring.
    let at = |i: usize| contour[i % n];
    let mut keep = vec![false; n + 1];
    keep[0] = true;
    keep[far] = true;
    keep[n] = true;

    let mut stack = vec![(0usize, far), (far, n)];
    while let Some((start, end)) = stack.pop() {
        if end - start <= 1 {
            continue;
        }
        let (a, b) = (at(start), at(end));
        let mut max_dist = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let dist = distance_to_line(at(i), a, b);
            if dist > max_dist {
                max_dist = dist;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }

    let mut polygon: Vec<Point> = (0..n).filter(|&i| keep[i]).map(|i| contour[i]).collect();
    polygon.dedup();
    polygon
}

/// Perpendicular distance from `p` to the line through `a` and `b`.
fn distance_to_line(p: Point, a: Point, b: Point) -> f64 {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        return a.distance(&p);
    }
    ((p.x - a.x) as f64 * dy - (p.y - a.y) as f64 * dx).abs() / length
}
