// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. Every tolerance the scanner uses lives here.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GridscanError, Result};

/// Complete configuration for one scanning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub detector: DetectorConfig,
    pub shape: ShapeConfig,
    pub dedup: DedupConfig,
    pub rows: RowConfig,
    pub classifier: ClassifierConfig,
    pub export: ExportConfig,
}

/// Multi-pass quadrilateral detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Threshold levels per channel. Level 0 is the Canny pass.
    pub threshold_levels: u32,
    /// Canny low threshold for the level-0 pass.
    pub canny_low: f32,
    /// Canny high threshold for the level-0 pass.
    pub canny_high: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_ratio: f64,
    /// Minimum absolute polygon area, in square pixels.
    pub min_area: f64,
    /// Maximum |cos| allowed at any corner.
    pub max_cosine: f64,
    /// Run the channel/threshold passes on the rayon pool.
    pub parallel_passes: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_levels: 5,
            canny_low: 5.0,
            canny_high: 50.0,
            approx_epsilon_ratio: 0.02,
            min_area: 1000.0,
            max_cosine: 0.3,
            parallel_passes: false,
        }
    }
}

/// Size filter and corner normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Expected edge length of an answer cell, in pixels.
    pub expected_edge: f64,
    /// Accepted deviation of the shortest edge from `expected_edge`.
    pub edge_tolerance: f64,
    /// Vertices within this many pixels of the topmost one count as "top".
    pub corner_tolerance: i32,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            expected_edge: 130.0,
            edge_tolerance: 30.0,
            corner_tolerance: 20,
        }
    }
}

/// Row-major sort and near-duplicate collapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Anchors closer than this vertically sort as the same band.
    pub sort_tolerance: i32,
    /// Horizontal anchor distance under which two quads are the same cell.
    pub tolerance_x: i32,
    /// Vertical anchor distance under which two quads are the same cell.
    pub tolerance_y: i32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            sort_tolerance: 50,
            tolerance_x: 160,
            tolerance_y: 320,
        }
    }
}

/// Row clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    /// Consecutive anchors closer than this vertically share a row.
    pub row_tolerance: i32,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self { row_tolerance: 160 }
    }
}

/// Whether one symbol vote covers a whole row or each cell gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Row,
    Cell,
}

impl std::str::FromStr for Granularity {
    type Err = GridscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "row" => Ok(Self::Row),
            "cell" => Ok(Self::Cell),
            other => Err(GridscanError::Config(format!(
                "unknown granularity `{other}` (expected `row` or `cell`)"
            ))),
        }
    }
}

/// Template classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub granularity: Granularity,
    /// Peaks below this are reported as unclassified.
    pub min_confidence: f32,
    /// Width of the row window, starting at x = 0.
    pub row_window_width: u32,
    /// Height of the row window, starting at the row's first anchor.
    pub row_window_height: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Row,
            min_confidence: 0.5,
            row_window_width: 600,
            row_window_height: 350,
        }
    }
}

/// Output records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// First line of every metadata sidecar.
    pub sidecar_header: String,
    /// Also write a JSON manifest per image.
    pub write_manifest: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sidecar_header: "# gridscan cell record v1".into(),
            write_manifest: true,
        }
    }
}

impl ScanConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if d.threshold_levels == 0 || d.threshold_levels > 255 {
            return Err(GridscanError::Config(format!(
                "detector.threshold_levels ({}) must lie in [1, 255]",
                d.threshold_levels
            )));
        }
        if d.canny_low > d.canny_high {
            return Err(GridscanError::Config(format!(
                "detector.canny_low ({}) exceeds detector.canny_high ({})",
                d.canny_low, d.canny_high
            )));
        }
        if d.approx_epsilon_ratio.is_nan() || d.approx_epsilon_ratio <= 0.0 {
            return Err(GridscanError::Config(
                "detector.approx_epsilon_ratio must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&d.max_cosine) {
            return Err(GridscanError::Config(
                "detector.max_cosine must lie in [0, 1]".into(),
            ));
        }
        if self.shape.expected_edge <= 0.0 || self.shape.edge_tolerance < 0.0 {
            return Err(GridscanError::Config(
                "shape.expected_edge must be positive and shape.edge_tolerance non-negative"
                    .into(),
            ));
        }
        let tolerances = [
            ("shape.corner_tolerance", self.shape.corner_tolerance),
            ("dedup.sort_tolerance", self.dedup.sort_tolerance),
            ("dedup.tolerance_x", self.dedup.tolerance_x),
            ("dedup.tolerance_y", self.dedup.tolerance_y),
            ("rows.row_tolerance", self.rows.row_tolerance),
        ];
        if let Some((name, _)) = tolerances.iter().find(|(_, v)| *v < 0) {
            return Err(GridscanError::Config(format!("{name} must not be negative")));
        }
        let c = &self.classifier;
        if !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(GridscanError::Config(format!(
                "classifier.min_confidence ({}) must lie in [0, 1]",
                c.min_confidence
            )));
        }
        if c.row_window_width == 0 || c.row_window_height == 0 {
            return Err(GridscanError::Config(
                "classifier row window must have a non-zero size".into(),
            ));
        }
        Ok(())
    }
}
