// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Row-major ordering and near-duplicate collapse.
//
// The detector reports the same physical cell once per channel/threshold pass
// that sees it. Sorting in reading order puts those hits next to each other,
// so a single sweep against the last kept quad is enough to collapse them.

use gridscan_core::config::DedupConfig;
use gridscan_core::types::Quad;
use tracing::{debug, instrument};

/// Sort quads in reading order by their anchors.
///
/// Anchors are first sorted by `(y, x)` and cut into horizontal bands: a band
/// opens at its first anchor and absorbs every following anchor whose y is
/// within `tolerance` of it. The final order is `(band, x, y)`. Deriving the
/// band up front keeps the comparison a total order, which a pairwise "close
/// y counts as equal" comparator is not.
pub fn sort_row_major(quads: &mut Vec<Quad>, tolerance: i32) {
    quads.sort_by_key(|q| (q.anchor().y, q.anchor().x));

    let mut banded: Vec<(usize, Quad)> = Vec::with_capacity(quads.len());
    let mut band = 0usize;
    let mut band_top = quads.first().map(|q| q.anchor().y).unwrap_or_default();
    for quad in quads.drain(..) {
        let y = quad.anchor().y;
        if y - band_top > tolerance {
            band += 1;
            band_top = y;
        }
        banded.push((band, quad));
    }

    banded.sort_by_key(|(band, q)| (*band, q.anchor().x, q.anchor().y));
    quads.extend(banded.into_iter().map(|(_, q)| q));
}

/// Whether two anchors are close enough to be the same physical cell.
pub fn quads_overlap(a: &Quad, b: &Quad, tolerance_x: i32, tolerance_y: i32) -> bool {
    let (pa, pb) = (a.anchor(), b.anchor());
    (pb.x - pa.x).abs() < tolerance_x && (pb.y - pa.y).abs() < tolerance_y
}

/// Greedy one-pass collapse of repeated detections.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Sort in reading order, then keep each quad unless it overlaps the most
    /// recently kept one.
    #[instrument(skip_all, fields(candidates = quads.len()))]
    pub fn dedup(&self, mut quads: Vec<Quad>) -> Vec<Quad> {
        sort_row_major(&mut quads, self.config.sort_tolerance);

        let mut kept: Vec<Quad> = Vec::with_capacity(quads.len());
        for quad in quads {
            let duplicate = kept.last().is_some_and(|last| {
                quads_overlap(last, &quad, self.config.tolerance_x, self.config.tolerance_y)
            });
            if !duplicate {
                kept.push(quad);
            }
        }

        debug!(kept = kept.len(), "Near-duplicates collapsed");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::types::Point;

    fn cell(x: i32, y: i32) -> Quad {
        Quad::new([
            Point::new(x, y),
            Point::new(x + 40, y),
            Point::new(x + 40, y + 40),
            Point::new(x, y + 40),
        ])
    }

    fn anchors(quads: &[Quad]) -> Vec<(i32, i32)> {
        quads.iter().map(|q| (q.anchor().x, q.anchor().y)).collect()
    }

    fn config(tolerance_x: i32, tolerance_y: i32) -> DedupConfig {
        DedupConfig {
            sort_tolerance: 50,
            tolerance_x,
            tolerance_y,
        }
    }

    #[test]
    fn row_major_treats_close_y_as_same_band() {
        let mut quads = vec![cell(300, 12), cell(100, 30), cell(200, 0), cell(50, 200)];
        sort_row_major(&mut quads, 50);
        assert_eq!(anchors(&quads), vec![(100, 30), (200, 0), (300, 12), (50, 200)]);
    }

    #[test]
    fn row_major_is_independent_of_input_order() {
        let base = vec![cell(10, 5), cell(300, 40), cell(150, 0), cell(20, 160), cell(200, 190)];
        let mut forward = base.clone();
        let mut reversed: Vec<Quad> = base.into_iter().rev().collect();
        sort_row_major(&mut forward, 50);
        sort_row_major(&mut reversed, 50);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn collapses_repeated_hits() {
        let quads = vec![cell(100, 100), cell(102, 99), cell(98, 101), cell(400, 100)];
        let kept = Deduplicator::new(config(20, 20)).dedup(quads);
        assert_eq!(anchors(&kept), vec![(98, 101), (400, 100)]);
    }

    #[test]
    fn tolerances_are_used() {
        let quads = vec![cell(100, 100), cell(130, 100)];
        let tight = Deduplicator::new(config(20, 20)).dedup(quads.clone());
        let loose = Deduplicator::new(config(40, 20)).dedup(quads);
        assert_eq!(tight.len(), 2);
        assert_eq!(loose.len(), 1);
    }

    #[test]
    fn overlap_needs_both_axes() {
        let a = cell(100, 100);
        assert!(quads_overlap(&a, &cell(110, 110), 20, 20));
        assert!(!quads_overlap(&a, &cell(110, 130), 20, 20));
        assert!(!quads_overlap(&a, &cell(130, 110), 20, 20));
    }

    #[test]
    fn never_grows_and_keeps_singleton() {
        let dedup = Deduplicator::new(DedupConfig::default());
        assert_eq!(dedup.dedup(vec![cell(5, 5)]), vec![cell(5, 5)]);
        assert!(dedup.dedup(Vec::new()).is_empty());

        let many: Vec<Quad> = (0..30).map(|i| cell((i * 37) % 500, (i * 53) % 400)).collect();
        let n = many.len();
        assert!(dedup.dedup(many).len() <= n);
    }
}
