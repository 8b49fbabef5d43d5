// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// gridscan-document: image processing for scanned answer forms.
//
// Provides page loading and cropping, the cell scanning pipeline (detection,
// filtering, deduplication, row grouping, classification), debug overlays, and
// export of cell images with their metadata.

pub mod export;
pub mod image;
pub mod overlay;
pub mod scan;

// Re-export the primary structs so callers can use `gridscan_document::GridScanner` etc.
pub use export::{Exporter, Manifest};
pub use crate::image::processor::ImageProcessor;
pub use overlay::render_overlay;
pub use scan::{CancelToken, GridScanner, ScanOutcome, TemplateLibrary};
