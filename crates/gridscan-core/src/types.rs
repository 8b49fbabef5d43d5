// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Gridscan form-cell pipeline.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GridscanError, Result};

/// Label templates in library order. Ties during classification go to the
/// earlier name.
pub const LABEL_NAMES: [&str; 12] = [
    "accident",
    "bomb",
    "car",
    "casualty",
    "electricity",
    "fire",
    "gas",
    "injury",
    "paramedics",
    "person",
    "police",
    "roadBlock",
];

/// Name written for a cell whose verdict fell below the confidence threshold.
pub const UNCLASSIFIED: &str = "unclassified";

/// A pixel position on the scanned page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Axis-aligned bounds, inclusive on both corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        (self.max.x - self.min.x).unsigned_abs()
    }

    pub fn height(&self) -> u32 {
        (self.max.y - self.min.y).unsigned_abs()
    }
}

/// One detected quadrilateral. Always exactly four vertices, in contour order.
///
/// Once a quad has been through corner normalization, vertex 0 is its
/// upper-left corner and serves as the *anchor* for every positional
/// comparison (sorting, deduplication, row grouping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad {
    points: [Point; 4],
}

impl Quad {
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Build a quad from a vertex list; `None` unless it has exactly four entries.
    pub fn from_slice(points: &[Point]) -> Option<Self> {
        let points: [Point; 4] = points.try_into().ok()?;
        Some(Self { points })
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.points
    }

    /// Vertex 0.
    pub fn anchor(&self) -> Point {
        self.points[0]
    }

    /// Cyclically rotate the vertices so that `index` becomes vertex 0.
    /// Cyclic order is preserved; there is no reflection.
    pub fn rotate_to(&mut self, index: usize) {
        self.points.rotate_left(index % 4);
    }

    /// Euclidean lengths of the four edges, `[p0p1, p1p2, p2p3, p3p0]`.
    pub fn edge_lengths(&self) -> [f64; 4] {
        let p = &self.points;
        [
            p[0].distance(&p[1]),
            p[1].distance(&p[2]),
            p[2].distance(&p[3]),
            p[3].distance(&p[0]),
        ]
    }

    /// Shortest edge length.
    pub fn min_edge(&self) -> f64 {
        self.edge_lengths()
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut min = self.points[0];
        let mut max = self.points[0];
        for p in &self.points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        BoundingBox { min, max }
    }
}

/// A left-to-right run of quads sharing one horizontal grid line. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    cells: Vec<Quad>,
}

impl Row {
    /// `None` for an empty cell list.
    pub fn new(cells: Vec<Quad>) -> Option<Self> {
        if cells.is_empty() {
            None
        } else {
            Some(Self { cells })
        }
    }

    pub fn cells(&self) -> &[Quad] {
        &self.cells
    }

    /// The first (leftmost) quad.
    pub fn first(&self) -> &Quad {
        &self.cells[0]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Top-to-bottom sequence of rows for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Row>,
}

impl Grid {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total number of cells across all rows.
    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Row::len).sum()
    }

    /// Every cell with its zero-based `(row, column)` position.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &Quad)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.cells()
                .iter()
                .enumerate()
                .map(move |(c, quad)| (r, c, quad))
        })
    }
}

/// Physical size category drawn on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    /// Library order, used for tie-breaking.
    pub const ALL: [SizeClass; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Template name (also the name written to sidecars).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

/// Outcome of matching one region against one family of templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    /// The best template cleared the confidence threshold.
    Matched { name: String, score: f32 },
    /// Nothing cleared the threshold; `best_score` is the highest peak seen, if any.
    Unclassified { best_score: Option<f32> },
}

impl Verdict {
    /// Matched template name, or [`UNCLASSIFIED`].
    pub fn name(&self) -> &str {
        match self {
            Self::Matched { name, .. } => name,
            Self::Unclassified { .. } => UNCLASSIFIED,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Label and size verdicts for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Verdict,
    pub size: Verdict,
}

/// Which scripter filled the form and which page of it was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormId {
    pub scripter: String,
    pub page: String,
}

static SCAN_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*[/\\]w(\d{3})-scans[/\\](.+)\.png$").expect("scan path pattern is valid")
});

impl FormId {
    /// Parse `.../w<NNN>-scans/<page>.png`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = path.to_string_lossy();
        let caps = SCAN_PATH
            .captures(&text)
            .ok_or_else(|| GridscanError::InputParse {
                path: path.to_path_buf(),
            })?;
        Ok(Self {
            scripter: caps[1].to_owned(),
            page: caps[2].to_owned(),
        })
    }

    /// Scripter and page concatenated, as written to the `form` sidecar field.
    pub fn form_code(&self) -> String {
        format!("{}{}", self.scripter, self.page)
    }
}

impl std::fmt::Display for FormId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}/{}", self.scripter, self.page)
    }
}

/// Everything persisted about one exported cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// 1-based row number.
    pub row: usize,
    /// 1-based column number.
    pub column: usize,
    pub form: FormId,
    pub label: Verdict,
    pub size: Verdict,
    pub quad: Quad,
}

impl CellRecord {
    /// `<label>_<scripter>_<page>_<row>_<column>`
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.label.name(),
            self.form.scripter,
            self.form.page,
            self.row,
            self.column
        )
    }

    /// Render the plain-text metadata sidecar.
    pub fn sidecar(&self, header: &str) -> String {
        format!(
            "{header}\nlabel {}\nform {}\nscripter {}\npage {}\nrow {}\ncolumn {}\nsize {}\n",
            self.label.name(),
            self.form.form_code(),
            self.form.scripter,
            self.form.page,
            self.row,
            self.column,
            self.size.name(),
        )
    }
}

/// How far an error reaches in a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorScope {
    /// Skip this image, continue with the next.
    PerImage,
    /// Stop the run.
    Fatal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn square(x: i32, y: i32, side: i32) -> Quad {
        Quad::new([
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ])
    }

    #[test]
    fn quad_geometry() {
        let q = square(10, 10, 40);
        assert_eq!(q.edge_lengths(), [40.0; 4]);
        assert_eq!(q.min_edge(), 40.0);
        let bb = q.bounding_box();
        assert_eq!((bb.min, bb.max), (Point::new(10, 10), Point::new(50, 50)));
        assert_eq!((bb.width(), bb.height()), (40, 40));
    }

    #[test]
    fn quad_from_slice_requires_four_points() {
        let three = [Point::new(0, 0), Point::new(1, 0), Point::new(1, 1)];
        assert!(Quad::from_slice(&three).is_none());
        let four = [Point::new(0, 0), Point::new(1, 0), Point::new(1, 1), Point::new(0, 1)];
        assert!(Quad::from_slice(&four).is_some());
    }

    #[test]
    fn rotate_keeps_cyclic_order() {
        let mut q = square(0, 0, 10);
        q.rotate_to(2);
        assert_eq!(
            q.points(),
            &[
                Point::new(10, 10),
                Point::new(0, 10),
                Point::new(0, 0),
                Point::new(10, 0)
            ]
        );
    }

    #[test]
    fn row_rejects_empty() {
        assert!(Row::new(Vec::new()).is_none());
    }

    #[test]
    fn grid_cells_enumerates_positions() {
        let grid = Grid::new(vec![
            Row::new(vec![square(0, 0, 5), square(20, 0, 5)]).unwrap(),
            Row::new(vec![square(0, 40, 5)]).unwrap(),
        ]);
        let positions: Vec<(usize, usize)> = grid.cells().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(positions, vec![(0, 0), (0, 1), (1, 0)]);
        assert_eq!(grid.cell_count(), 3);
    }

    #[test]
    fn form_id_parses_scan_path() {
        let id = FormId::from_path(Path::new("/data/w007-scans/00012.png")).unwrap();
        assert_eq!(id.scripter, "007");
        assert_eq!(id.page, "00012");
        assert_eq!(id.form_code(), "00700012");
    }

    #[test]
    fn form_id_accepts_backslash_separators() {
        let id = FormId::from_path(Path::new(r"C:\scans\w123-scans\p2.png")).unwrap();
        assert_eq!(id.scripter, "123");
        assert_eq!(id.page, "p2");
    }

    #[test]
    fn form_id_rejects_other_names() {
        for bad in ["/data/w07-scans/1.png", "/data/w007-scans/1.jpg", "w007-scans/1.png"] {
            let err = FormId::from_path(Path::new(bad)).unwrap_err();
            match err {
                GridscanError::InputParse { path } => assert_eq!(path, PathBuf::from(bad)),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn cell_record_naming_and_sidecar() {
        let record = CellRecord {
            row: 3,
            column: 2,
            form: FormId {
                scripter: "004".into(),
                page: "00021".into(),
            },
            label: Verdict::Matched {
                name: "fire".into(),
                score: 0.91,
            },
            size: Verdict::Unclassified {
                best_score: Some(0.2),
            },
            quad: square(0, 0, 10),
        };
        assert_eq!(record.file_stem(), "fire_004_00021_3_2");
        let text = record.sidecar("# header");
        assert_eq!(
            text,
            "# header\nlabel fire\nform 00400021\nscripter 004\npage 00021\nrow 3\ncolumn 2\nsize unclassified\n"
        );
    }
}
