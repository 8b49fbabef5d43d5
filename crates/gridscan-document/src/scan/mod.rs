// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cell scanning pipeline: quadrilateral detection, shape filtering,
// deduplication, row grouping, and template classification.

pub mod classify;
pub mod dedup;
pub mod detect;
pub mod pipeline;
pub mod rows;
pub mod shape;

pub use classify::{CellClassifier, Correlator, NormalizedCrossCorrelation, TemplateLibrary};
pub use dedup::Deduplicator;
pub use detect::QuadDetector;
pub use pipeline::{CancelToken, DetectedCell, GridScanner, LocatedGrid, ScanOutcome};
pub use rows::RowGrouper;
pub use shape::{CornerNormalizer, SizeFilter};
