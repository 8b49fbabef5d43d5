// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Row clustering: turns a deduplicated set of quads into a top-to-bottom
// grid of left-to-right rows.

use gridscan_core::config::{DedupConfig, RowConfig};
use gridscan_core::error::{GridscanError, Result};
use gridscan_core::types::{Grid, Quad, Row};
use tracing::{debug, instrument};

use super::dedup::sort_row_major;

/// Whether two quads sit on the same grid line.
pub fn same_row(a: &Quad, b: &Quad, tolerance: i32) -> bool {
    (a.anchor().y - b.anchor().y).abs() < tolerance
}

/// Clusters quads into rows by vertical proximity of consecutive anchors.
#[derive(Debug, Clone)]
pub struct RowGrouper {
    row_tolerance: i32,
    sort_tolerance: i32,
}

impl RowGrouper {
    pub fn new(rows: &RowConfig, dedup: &DedupConfig) -> Self {
        Self {
            row_tolerance: rows.row_tolerance,
            sort_tolerance: dedup.sort_tolerance,
        }
    }

    /// Walk the quads in reading order; a quad joins the open row while its
    /// anchor stays within `row_tolerance` of the previous quad's anchor,
    /// otherwise it opens a new row. Each row is then ordered by anchor x.
    #[instrument(skip_all, fields(quads = quads.len()))]
    pub fn group(&self, mut quads: Vec<Quad>) -> Result<Grid> {
        if quads.is_empty() {
            return Err(GridscanError::EmptyDetection(
                "row grouping received no quads".into(),
            ));
        }
        sort_row_major(&mut quads, self.sort_tolerance);

        let mut rows: Vec<Vec<Quad>> = Vec::new();
        let mut current: Vec<Quad> = Vec::new();
        for quad in quads {
            let breaks = current
                .last()
                .is_some_and(|previous| !same_row(previous, &quad, self.row_tolerance));
            if breaks {
                rows.push(std::mem::take(&mut current));
            }
            current.push(quad);
        }
        rows.push(current);

        let rows: Vec<Row> = rows
            .into_iter()
            .filter_map(|mut cells| {
                cells.sort_by_key(|q| (q.anchor().x, q.anchor().y));
                Row::new(cells)
            })
            .collect();

        let grid = Grid::new(rows);
        debug!(
            rows = grid.len(),
            cells = grid.cell_count(),
            "Quads grouped into rows"
        );
        Ok(grid)
    }
}
