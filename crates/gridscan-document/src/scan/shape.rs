// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Size filtering and corner normalization of candidate quads.

use gridscan_core::config::ShapeConfig;
use gridscan_core::types::Quad;
use tracing::{debug, instrument};

/// Keeps quads whose shortest edge matches the expected cell size.
///
/// Edge lengths are true Euclidean distances, so the test does not depend on
/// which vertex comes first.
#[derive(Debug, Clone)]
pub struct SizeFilter {
    min_edge: f64,
    max_edge: f64,
}

impl SizeFilter {
    pub fn new(config: &ShapeConfig) -> Self {
        Self {
            min_edge: config.expected_edge - config.edge_tolerance,
            max_edge: config.expected_edge + config.edge_tolerance,
        }
    }

    /// Shortest edge within `[expected - tolerance, expected + tolerance]`.
    pub fn accepts(&self, quad: &Quad) -> bool {
        (self.min_edge..=self.max_edge).contains(&quad.min_edge())
    }

    #[instrument(skip_all, fields(candidates = quads.len()))]
    pub fn filter(&self, quads: Vec<Quad>) -> Vec<Quad> {
        let kept: Vec<Quad> = quads.into_iter().filter(|q| self.accepts(q)).collect();
        debug!(
            kept = kept.len(),
            min_edge = self.min_edge,
            max_edge = self.max_edge,
            "Size filter applied"
        );
        kept
    }
}

/// Rotates a quad's vertices so vertex 0 is the upper-left corner.
#[derive(Debug, Clone)]
pub struct CornerNormalizer {
    tolerance: i32,
}

impl CornerNormalizer {
    pub fn new(config: &ShapeConfig) -> Self {
        Self {
            tolerance: config.corner_tolerance,
        }
    }

    /// Among vertices within `tolerance` of the topmost y, the one with the
    /// smallest x (then smallest y).
    pub fn upper_left_index(&self, quad: &Quad) -> usize {
        let points = quad.points();
        let top = points.iter().map(|p| p.y).min().unwrap_or_default();
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.y - top <= self.tolerance)
            .min_by_key(|(_, p)| (p.x, p.y))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    pub fn normalize(&self, mut quad: Quad) -> Quad {
        let index = self.upper_left_index(&quad);
        quad.rotate_to(index);
        quad
    }

    pub fn normalize_all(&self, quads: &mut [Quad]) {
        for quad in quads.iter_mut() {
            *quad = self.normalize(*quad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::types::Point;

    fn quad(coords: [(i32, i32); 4]) -> Quad {
        Quad::new(coords.map(|(x, y)| Point::new(x, y)))
    }

    fn shape(expected_edge: f64, edge_tolerance: f64) -> ShapeConfig {
        ShapeConfig {
            expected_edge,
            edge_tolerance,
            ..ShapeConfig::default()
        }
    }

    #[test]
    fn every_rotation_normalizes_to_upper_left() {
        let normalizer = CornerNormalizer::new(&ShapeConfig::default());
        let base = quad([(10, 10), (50, 10), (50, 50), (10, 50)]);
        for offset in 0..4 {
            let mut rotated = base;
            rotated.rotate_to(offset);
            let normalized = normalizer.normalize(rotated);
            assert_eq!(normalized.anchor(), Point::new(10, 10), "offset {offset}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = CornerNormalizer::new(&ShapeConfig::default());
        let samples = [
            quad([(50, 50), (10, 52), (12, 12), (48, 8)]),
            quad([(30, 0), (60, 30), (30, 60), (0, 30)]),
            quad([(5, 5), (5, 5), (40, 40), (5, 40)]),
        ];
        for q in samples {
            let once = normalizer.normalize(q);
            assert_eq!(normalizer.normalize(once), once);
        }
    }

    #[test]
    fn tilted_quad_picks_leftmost_of_top_vertices() {
        let normalizer = CornerNormalizer::new(&ShapeConfig::default());
        // Top edge slopes up to the right by 6 px; the left vertex is still "upper-left".
        let q = quad([(60, 4), (62, 64), (2, 70), (0, 10)]);
        assert_eq!(normalizer.normalize(q).anchor(), Point::new(0, 10));
    }

    #[test]
    fn rotation_preserves_cyclic_order() {
        let normalizer = CornerNormalizer::new(&ShapeConfig::default());
        let q = quad([(50, 50), (10, 50), (10, 10), (50, 10)]);
        let n = normalizer.normalize(q);
        assert_eq!(
            n.points(),
            &[
                Point::new(10, 10),
                Point::new(50, 10),
                Point::new(50, 50),
                Point::new(10, 50)
            ]
        );
    }

    #[test]
    fn size_filter_uses_shortest_edge() {
        let filter = SizeFilter::new(&shape(40.0, 4.0));
        let exact = quad([(0, 0), (40, 0), (40, 40), (0, 40)]);
        let long_rect = quad([(0, 0), (90, 0), (90, 41), (0, 41)]);
        let too_small = quad([(0, 0), (30, 0), (30, 30), (0, 30)]);
        let too_big = quad([(0, 0), (50, 0), (50, 50), (0, 50)]);
        assert!(filter.accepts(&exact));
        assert!(filter.accepts(&long_rect));
        assert!(!filter.accepts(&too_small));
        assert!(!filter.accepts(&too_big));
    }

    #[test]
    fn size_filter_ignores_vertex_order() {
        let filter = SizeFilter::new(&shape(40.0, 2.0));
        let mut q = quad([(0, 0), (40, 0), (40, 40), (0, 40)]);
        for offset in 0..4 {
            q.rotate_to(offset);
            assert!(filter.accepts(&q));
        }
    }

    #[test]
    fn size_filter_band_is_inclusive() {
        let filter = SizeFilter::new(&shape(40.0, 5.0));
        let lower = quad([(0, 0), (35, 0), (35, 35), (0, 35)]);
        let upper = quad([(0, 0), (45, 0), (45, 45), (0, 45)]);
        let kept = filter.filter(vec![lower, upper]);
        assert_eq!(kept.len(), 2);
    }
}
