// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cell export: one PNG plus a plain-text sidecar per cell, and a JSON
// manifest per scanned page.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use gridscan_core::config::ScanConfig;
use gridscan_core::error::Result;
use gridscan_core::types::{CellRecord, FormId, Grid};

use crate::image::processor::save_png;
use crate::scan::pipeline::ScanOutcome;

/// Compute the SHA-256 hex digest of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Per-page record of what was scanned, with which settings, and what came out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub source: PathBuf,
    pub source_sha256: String,
    pub created_at: DateTime<Utc>,
    pub form: FormId,
    pub raw_count: usize,
    pub sized_count: usize,
    pub unique_count: usize,
    pub config: ScanConfig,
    pub cells: Vec<CellRecord>,
}

/// Paths written by one [`Exporter::export`] call.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub images: Vec<PathBuf>,
    pub sidecars: Vec<PathBuf>,
    pub manifest: Option<PathBuf>,
}

/// Writes scan outcomes into an output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    config: ScanConfig,
}

impl Exporter {
    /// Creates `output_dir` (and parents) if missing.
    pub fn new(output_dir: impl Into<PathBuf>, config: &ScanConfig) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            config: config.clone(),
        })
    }

    /// Write every cell of `outcome`. `source_bytes` are the undecoded bytes
    /// of the page image, hashed into the manifest.
    #[instrument(skip_all, fields(form = %outcome.form, cells = outcome.cells.len()))]
    pub fn export(
        &self,
        outcome: &ScanOutcome,
        source: &Path,
        source_bytes: &[u8],
    ) -> Result<ExportSummary> {
        let mut summary = ExportSummary::default();
        let header = &self.config.export.sidecar_header;

        for cell in &outcome.cells {
            let stem = cell.record.file_stem();
            let image_path = self.output_dir.join(format!("{stem}.png"));
            let sidecar_path = self.output_dir.join(format!("{stem}.txt"));

            save_png(&cell.image, &image_path)?;
            std::fs::write(&sidecar_path, cell.record.sidecar(header))?;

            summary.images.push(image_path);
            summary.sidecars.push(sidecar_path);
        }

        if self.config.export.write_manifest {
            let manifest = Manifest {
                source: source.to_path_buf(),
                source_sha256: hash_bytes(source_bytes),
                created_at: Utc::now(),
                form: outcome.form.clone(),
                raw_count: outcome.raw_count,
                sized_count: outcome.sized_count,
                unique_count: outcome.unique_count,
                config: self.config.clone(),
                cells: outcome.cells.iter().map(|c| c.record.clone()).collect(),
            };
            let path = self.output_dir.join(format!(
                "{}_{}.manifest.json",
                outcome.form.scripter, outcome.form.page
            ));
            std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
            summary.manifest = Some(path);
        }

        info!(
            dir = %self.output_dir.display(),
            written = summary.images.len(),
            "Cells exported"
        );
        Ok(summary)
    }
}

/// Write the grid's quads as pretty JSON, one array of quads per row.
pub fn write_quad_dump(grid: &Grid, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(grid)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}
