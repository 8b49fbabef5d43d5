// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end page scan: detection, size filter, corner normalization,
// deduplication, row grouping, then classification and cell cropping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use tracing::{debug, info, instrument};

use gridscan_core::config::{Granularity, ScanConfig};
use gridscan_core::error::{GridscanError, Result};
use gridscan_core::types::{CellRecord, Classification, FormId, Grid, Quad};

use super::classify::{CellClassifier, Correlator, NormalizedCrossCorrelation, TemplateLibrary};
use super::dedup::Deduplicator;
use super::detect::QuadDetector;
use super::rows::RowGrouper;
use super::shape::{CornerNormalizer, SizeFilter};
use crate::image::ImageProcessor;

/// Shared cancellation flag, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`CancelToken::cancel`] has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(GridscanError::Cancelled);
        }
        Ok(())
    }
}

/// One exported answer cell: its record and its cropped pixels.
#[derive(Debug, Clone)]
pub struct DetectedCell {
    pub record: CellRecord,
    pub image: DynamicImage,
}

/// Located cells of a page before classification.
#[derive(Debug, Clone)]
pub struct LocatedGrid {
    /// Candidates straight out of the detector.
    pub raw_count: usize,
    /// Candidates left after the size filter.
    pub sized_count: usize,
    /// Quads left after deduplication.
    pub unique_count: usize,
    pub grid: Grid,
}

/// Everything a scan produced for one page.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub form: FormId,
    pub raw_count: usize,
    pub sized_count: usize,
    pub unique_count: usize,
    pub grid: Grid,
    pub cells: Vec<DetectedCell>,
}

/// Runs the whole cell extraction pipeline over one page at a time.
pub struct GridScanner<'a, C = NormalizedCrossCorrelation> {
    detector: QuadDetector,
    size_filter: SizeFilter,
    normalizer: CornerNormalizer,
    deduplicator: Deduplicator,
    grouper: RowGrouper,
    classifier: CellClassifier<'a, C>,
    granularity: Granularity,
    window_width: u32,
    window_height: u32,
}

impl<'a> GridScanner<'a> {
    pub fn new(config: &ScanConfig, library: &'a TemplateLibrary) -> Self {
        Self::with_correlator(config, library, NormalizedCrossCorrelation)
    }
}

impl<'a, C: Correlator> GridScanner<'a, C> {
    pub fn with_correlator(config: &ScanConfig, library: &'a TemplateLibrary, correlator: C) -> Self {
        Self {
            detector: QuadDetector::new(config.detector.clone()),
            size_filter: SizeFilter::new(&config.shape),
            normalizer: CornerNormalizer::new(&config.shape),
            deduplicator: Deduplicator::new(config.dedup.clone()),
            grouper: RowGrouper::new(&config.rows, &config.dedup),
            classifier: CellClassifier::with_correlator(
                library,
                correlator,
                config.classifier.min_confidence,
            ),
            granularity: config.classifier.granularity,
            window_width: config.classifier.row_window_width,
            window_height: config.classifier.row_window_height,
        }
    }

    /// Detection through row grouping, without classification.
    #[instrument(skip_all, fields(width = page.width(), height = page.height()))]
    pub fn locate(&self, page: &ImageProcessor, cancel: &CancelToken) -> Result<LocatedGrid> {
        cancel.check()?;
        let raw = self.detector.detect(page);
        let raw_count = raw.len();

        cancel.check()?;
        let mut sized = self.size_filter.filter(raw);
        let sized_count = sized.len();
        if sized.is_empty() {
            return Err(GridscanError::EmptyDetection(format!(
                "none of {raw_count} candidates matched the expected cell size"
            )));
        }

        cancel.check()?;
        self.normalizer.normalize_all(&mut sized);

        cancel.check()?;
        let unique = self.deduplicator.dedup(sized);
        let unique_count = unique.len();

        cancel.check()?;
        let grid = self.grouper.group(unique)?;

        info!(
            raw = raw_count,
            sized = sized_count,
            unique = unique_count,
            rows = grid.len(),
            "Cells located"
        );
        Ok(LocatedGrid {
            raw_count,
            sized_count,
            unique_count,
            grid,
        })
    }

    /// Locate, classify, and crop every cell of `page`.
    #[instrument(skip_all, fields(form = %form))]
    pub fn scan(&self, form: FormId, page: &ImageProcessor, cancel: &CancelToken) -> Result<ScanOutcome> {
        let located = self.locate(page, cancel)?;

        let mut cells = Vec::with_capacity(located.grid.cell_count());
        for (r, row) in located.grid.rows().iter().enumerate() {
            cancel.check()?;

            let row_vote = match self.granularity {
                Granularity::Row => {
                    let top = row.first().anchor().y;
                    let window = page.region(0, top, self.window_width, self.window_height);
                    Some(self.classifier.classify(&window.to_luma8()))
                }
                Granularity::Cell => None,
            };

            for (c, quad) in row.cells().iter().enumerate() {
                let image = crop_cell(page, quad);
                let Classification { label, size } = match &row_vote {
                    Some(vote) => vote.clone(),
                    None => self.classifier.classify(&image.to_luma8()),
                };
                cells.push(DetectedCell {
                    record: CellRecord {
                        row: r + 1,
                        column: c + 1,
                        form: form.clone(),
                        label,
                        size,
                        quad: *quad,
                    },
                    image,
                });
            }
            debug!(row = r + 1, cells = row.len(), "Row classified");
        }

        let matched = cells.iter().filter(|c| c.record.label.is_matched()).count();
        info!(cells = cells.len(), matched, "Page scanned");
        Ok(ScanOutcome {
            form,
            raw_count: located.raw_count,
            sized_count: located.sized_count,
            unique_count: located.unique_count,
            grid: located.grid,
            cells,
        })
    }
}

/// Axis-aligned bounding box of the quad, clamped to the page.
fn crop_cell(page: &ImageProcessor, quad: &Quad) -> DynamicImage {
    let bounds = quad.bounding_box();
    page.region(
        bounds.min.x,
        bounds.min.y,
        bounds.width() + 1,
        bounds.height() + 1,
    )
}
