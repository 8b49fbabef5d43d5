// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Template classification of cell and row regions.
//
// Every region gets two independent votes: which pictogram was drawn (one of
// the label templates) and which size box was ticked (small, medium, large).
// Each vote keeps the template with the highest correlation peak.

use std::path::Path;

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use tracing::{debug, instrument, warn};

use gridscan_core::error::{GridscanError, Result};
use gridscan_core::types::{Classification, LABEL_NAMES, SizeClass, Verdict};

/// Scores how well a template matches somewhere inside a region.
pub trait Correlator: Send + Sync {
    /// Highest response over all placements, or `None` when the template
    /// cannot be placed inside the region.
    fn peak(&self, region: &GrayImage, template: &GrayImage) -> Option<f32>;
}

/// Per-pixel variance below which a window counts as flat.
const FLAT_VARIANCE: f64 = 1e-6;

/// Zero-mean normalized cross-correlation over every placement of the
/// template, in `[-1, 1]`.
///
/// Both the template and each region window are mean-subtracted, so a blank
/// window scores 0 against any template. A constant template carries no
/// pattern and yields `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCrossCorrelation;

impl Correlator for NormalizedCrossCorrelation {
    fn peak(&self, region: &GrayImage, template: &GrayImage) -> Option<f32> {
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > region.width() || th > region.height() {
            return None;
        }
        let n = f64::from(tw) * f64::from(th);
        let template_mean = template.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / n;
        let template_energy: f64 = template
            .pixels()
            .map(|p| (f64::from(p.0[0]) - template_mean).powi(2))
            .sum();
        if template_energy / n <= FLAT_VARIANCE {
            return None;
        }

        // Raw sum of region * template per placement; window sums come from
        // the integral images.
        let cross = match_template(region, template, MatchTemplateMethod::CrossCorrelation);
        let sums = integral_image::<_, u64>(region);
        let squares = integral_squared_image::<_, u64>(region);

        let mut best = f64::NEG_INFINITY;
        for (x, y, raw) in cross.enumerate_pixels() {
            let sum = window_sum(&sums, x, y, tw, th);
            let region_energy = window_sum(&squares, x, y, tw, th) - sum * sum / n;
            let score = if region_energy / n <= FLAT_VARIANCE {
                0.0
            } else {
                (f64::from(raw.0[0]) - template_mean * sum) / (region_energy * template_energy).sqrt()
            };
            best = best.max(score);
        }
        best.is_finite().then_some(best.clamp(-1.0, 1.0) as f32)
    }
}

/// Sum of the `w` x `h` window at `(x, y)` from a zero-padded integral image.
fn window_sum(integral: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let at = |x: u32, y: u32| integral.get_pixel(x, y).0[0];
    let total = at(x + w, y + h) + at(x, y) - at(x + w, y) - at(x, y + h);
    total as f64
}

/// Label and size templates, in the order ties are resolved.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    labels: Vec<(String, GrayImage)>,
    sizes: Vec<(String, GrayImage)>,
}

impl TemplateLibrary {
    /// Load `<dir>/<name>.png` for every label name and size class.
    ///
    /// Any missing or undecodable template fails the whole load.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let labels = LABEL_NAMES
            .iter()
            .map(|name| load_template(dir, name))
            .collect::<Result<Vec<_>>>()?;
        let sizes = SizeClass::ALL
            .iter()
            .map(|class| load_template(dir, class.name()))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            labels = labels.len(),
            sizes = sizes.len(),
            "Template library loaded"
        );
        Ok(Self { labels, sizes })
    }

    /// Build a library from images already in memory.
    pub fn from_images(
        labels: Vec<(String, GrayImage)>,
        sizes: Vec<(String, GrayImage)>,
    ) -> Self {
        Self { labels, sizes }
    }

    pub fn labels(&self) -> &[(String, GrayImage)] {
        &self.labels
    }

    pub fn sizes(&self) -> &[(String, GrayImage)] {
        &self.sizes
    }
}

fn load_template(dir: &Path, name: &str) -> Result<(String, GrayImage)> {
    let path = dir.join(format!("{name}.png"));
    let fail = |reason: String| GridscanError::TemplateLoad {
        name: name.to_owned(),
        path: path.clone(),
        reason,
    };

    let image = image::open(&path).map_err(|e| fail(e.to_string()))?;
    let gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(fail("template image is empty".into()));
    }
    Ok((name.to_owned(), gray))
}

/// Votes a label and a size class for a grayscale region.
pub struct CellClassifier<'a, C = NormalizedCrossCorrelation> {
    library: &'a TemplateLibrary,
    correlator: C,
    min_confidence: f32,
}

impl<'a> CellClassifier<'a> {
    pub fn new(library: &'a TemplateLibrary, min_confidence: f32) -> Self {
        Self::with_correlator(library, NormalizedCrossCorrelation, min_confidence)
    }
}

impl<'a, C: Correlator> CellClassifier<'a, C> {
    pub fn with_correlator(library: &'a TemplateLibrary, correlator: C, min_confidence: f32) -> Self {
        Self {
            library,
            correlator,
            min_confidence,
        }
    }

    pub fn classify(&self, region: &GrayImage) -> Classification {
        Classification {
            label: self.vote("label", region, &self.library.labels),
            size: self.vote("size", region, &self.library.sizes),
        }
    }

    fn vote(&self, family: &str, region: &GrayImage, templates: &[(String, GrayImage)]) -> Verdict {
        let mut best: Option<(&str, f32)> = None;
        for (name, template) in templates {
            let Some(score) = self.correlator.peak(region, template) else {
                debug!(
                    family,
                    template = %name,
                    region_width = region.width(),
                    region_height = region.height(),
                    "Template not scored against region"
                );
                continue;
            };
            // Strict comparison keeps the earlier template on ties.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((name.as_str(), score));
            }
        }

        match best {
            Some((name, score)) if score >= self.min_confidence => Verdict::Matched {
                name: name.to_owned(),
                score,
            },
            _ => {
                let best_score = best.map(|(_, score)| score);
                warn!(
                    family,
                    best_score,
                    min_confidence = self.min_confidence,
                    "Region left unclassified"
                );
                Verdict::Unclassified { best_score }
            }
        }
    }
}
