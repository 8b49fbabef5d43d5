// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch runner: scans each input page, writes its cells, and keeps going past
// per-image failures unless told otherwise.

use std::path::{Path, PathBuf};

use gridscan_core::config::ScanConfig;
use gridscan_core::error::{GridscanError, Result, classify_error};
use gridscan_core::types::{ErrorScope, FormId};
use gridscan_document::export::write_quad_dump;
use gridscan_document::image::processor::save_png;
use gridscan_document::{CancelToken, Exporter, GridScanner, ImageProcessor, TemplateLibrary, render_overlay};
use image::DynamicImage;
use tracing::{error, info, instrument};

/// Where optional artefacts go and how failures are handled.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    /// Directory for `<scripter>_<page>.overlay.png` previews.
    pub overlay_dir: Option<PathBuf>,
    /// Directory for `<scripter>_<page>.quads.json` dumps.
    pub dump_dir: Option<PathBuf>,
    /// Stop at the first failed image.
    pub fail_fast: bool,
}

/// Result of one successfully processed page.
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub path: PathBuf,
    pub form: FormId,
    pub cells: usize,
    pub unclassified: usize,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<ImageReport>,
    pub failed: Vec<(PathBuf, GridscanError)>,
    /// The run stopped before every input was attempted.
    pub aborted: bool,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }
}

pub struct BatchRunner<'a> {
    scanner: GridScanner<'a>,
    exporter: Exporter,
    options: BatchOptions,
}

impl<'a> BatchRunner<'a> {
    /// Prepares the output directory; fails if it cannot be created.
    pub fn new(config: &ScanConfig, library: &'a TemplateLibrary, options: BatchOptions) -> Result<Self> {
        let exporter = Exporter::new(&options.output_dir, config)?;
        Ok(Self {
            scanner: GridScanner::new(config, library),
            exporter,
            options,
        })
    }

    /// Process `images` in order. A fatal error, `fail_fast`, or a cancelled
    /// token stops the run early.
    pub fn run(&self, images: &[PathBuf], cancel: &CancelToken) -> BatchReport {
        let mut report = BatchReport::default();
        for path in images {
            if cancel.is_cancelled() {
                report.aborted = true;
                break;
            }
            match self.process(path, cancel) {
                Ok(done) => report.processed.push(done),
                Err(err) => {
                    let scope = classify_error(&err);
                    error!(path = %path.display(), error = %err, ?scope, "Image failed");
                    let stop = scope == ErrorScope::Fatal || self.options.fail_fast;
                    report.failed.push((path.clone(), err));
                    if stop {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }
        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            aborted = report.aborted,
            "Batch finished"
        );
        report
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn process(&self, path: &Path, cancel: &CancelToken) -> Result<ImageReport> {
        let form = FormId::from_path(path)?;
        let bytes = std::fs::read(path)?;
        let page = ImageProcessor::from_bytes(&bytes)?;
        let outcome = self.scanner.scan(form.clone(), &page, cancel)?;
        let stem = format!("{}_{}", form.scripter, form.page);

        if let Some(dir) = &self.options.dump_dir {
            std::fs::create_dir_all(dir)?;
            write_quad_dump(&outcome.grid, dir.join(format!("{stem}.quads.json")))?;
        }
        if let Some(dir) = &self.options.overlay_dir {
            std::fs::create_dir_all(dir)?;
            let overlay = render_overlay(page.as_dynamic(), &outcome.grid);
            save_png(
                &DynamicImage::ImageRgba8(overlay),
                dir.join(format!("{stem}.overlay.png")),
            )?;
        }

        self.exporter.export(&outcome, path, &bytes)?;

        Ok(ImageReport {
            path: path.to_path_buf(),
            form,
            cells: outcome.cells.len(),
            unclassified: outcome
                .cells
                .iter()
                .filter(|c| !c.record.label.is_matched())
                .count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::config::{DedupConfig, ShapeConfig};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn library() -> TemplateLibrary {
        let t = || GrayImage::from_pixel(8, 8, Luma([40]));
        TemplateLibrary::from_images(
            vec![("accident".into(), t())],
            vec![("small".into(), t()), ("medium".into(), t()), ("large".into(), t())],
        )
    }

    fn config() -> ScanConfig {
        ScanConfig {
            shape: ShapeConfig {
                expected_edge: 60.0,
                edge_tolerance: 12.0,
                ..ShapeConfig::default()
            },
            dedup: DedupConfig {
                sort_tolerance: 50,
                tolerance_x: 20,
                tolerance_y: 20,
            },
            ..ScanConfig::default()
        }
    }

    /// Write a page with two cells under `<root>/w003-scans/<page>.png`.
    fn write_page(root: &Path, page: &str) -> PathBuf {
        let dir = root.join("w003-scans");
        std::fs::create_dir_all(&dir).unwrap();
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for x in [40, 250] {
            draw_filled_rect_mut(&mut img, Rect::at(x, 60).of_size(60, 60), Rgb([0, 0, 0]));
        }
        let path = dir.join(format!("{page}.png"));
        img.save(&path).unwrap();
        path
    }

    fn options(root: &Path) -> BatchOptions {
        BatchOptions {
            output_dir: root.join("out"),
            ..BatchOptions::default()
        }
    }

    fn files_with_suffix(dir: &Path, suffix: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
            .count()
    }

    #[test]
    fn processes_page_and_writes_outputs() {
        let root = tempfile::tempdir().unwrap();
        let page = write_page(root.path(), "00042");
        let lib = library();
        let opts = BatchOptions {
            overlay_dir: Some(root.path().join("overlay")),
            dump_dir: Some(root.path().join("dump")),
            ..options(root.path())
        };
        let runner = BatchRunner::new(&config(), &lib, opts).unwrap();

        let report = runner.run(&[page], &CancelToken::new());
        assert!(report.is_success(), "failures: {:?}", report.failed);
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].cells, 2);
        assert_eq!(report.processed[0].form.scripter, "003");

        let out = root.path().join("out");
        assert_eq!(files_with_suffix(&out, ".png"), 2);
        assert_eq!(files_with_suffix(&out, ".txt"), 2);
        assert!(out.join("003_00042.manifest.json").exists());
        assert!(root.path().join("overlay/003_00042.overlay.png").exists());
        assert!(root.path().join("dump/003_00042.quads.json").exists());
    }

    #[test]
    fn bad_path_does_not_stop_the_batch() {
        let root = tempfile::tempdir().unwrap();
        let stray = root.path().join("stray.png");
        std::fs::write(&stray, b"").unwrap();
        let good = write_page(root.path(), "00001");
        let lib = library();
        let runner = BatchRunner::new(&config(), &lib, options(root.path())).unwrap();

        let report = runner.run(&[stray.clone(), good], &CancelToken::new());
        assert!(!report.is_success());
        assert!(!report.aborted);
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, stray);
        assert!(matches!(report.failed[0].1, GridscanError::InputParse { .. }));
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("w003-scans/00009.png");
        let good = write_page(root.path(), "00001");
        let lib = library();
        let opts = BatchOptions {
            fail_fast: true,
            ..options(root.path())
        };
        let runner = BatchRunner::new(&config(), &lib, opts).unwrap();

        let report = runner.run(&[missing, good], &CancelToken::new());
        assert!(report.aborted);
        assert!(report.processed.is_empty());
        assert!(matches!(report.failed[0].1, GridscanError::Io(_)));
    }

    #[test]
    fn cancelled_run_processes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let good = write_page(root.path(), "00001");
        let lib = library();
        let runner = BatchRunner::new(&config(), &lib, options(root.path())).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = runner.run(&[good], &cancel);
        assert!(report.aborted);
        assert!(report.processed.is_empty());
        assert!(report.failed.is_empty());
    }
}
