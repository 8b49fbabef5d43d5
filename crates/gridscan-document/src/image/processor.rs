// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decoding, channel splitting, clamped cropping, and
// PNG output for scanned form pages. Operates on in-memory images using the
// `image` crate.

use image::{DynamicImage, GrayImage, ImageFormat};
use gridscan_core::error::GridscanError;
use tracing::{debug, instrument};

/// A scanned page held in memory, with the operations the cell pipeline needs.
///
/// ```ignore
/// let page = ImageProcessor::from_bytes(&std::fs::read("w004-scans/00021.png")?)?;
/// let [r, g, b] = page.channels();
/// let window = page.region(0, 480, 600, 350);
/// ```
pub struct ImageProcessor {
    /// The page as decoded.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Create a processor from raw encoded bytes (PNG, JPEG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, GridscanError> {
        let img = image::load_from_memory(data).map_err(|err| {
            GridscanError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying `DynamicImage`.
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    // -- Views ----------------------------------------------------------------

    /// Split into red, green, and blue planes. Grayscale input yields three
    /// copies of its luma plane.
    pub fn channels(&self) -> [GrayImage; 3] {
        let rgb = self.image.to_rgb8();
        let (width, height) = rgb.dimensions();
        [0usize, 1, 2].map(|c| {
            GrayImage::from_fn(width, height, |x, y| image::Luma([rgb.get_pixel(x, y).0[c]]))
        })
    }

    /// Copy out a rectangular region.
    ///
    /// `x` and `y` are the top-left corner and may be negative; the rectangle
    /// is clamped to the image bounds, so the result can be smaller than
    /// requested (or empty when the image itself is empty).
    pub fn region(&self, x: i32, y: i32, width: u32, height: u32) -> DynamicImage {
        let img_w = self.image.width();
        let img_h = self.image.height();
        if img_w == 0 || img_h == 0 {
            return self.image.crop_imm(0, 0, 0, 0);
        }

        // A negative origin eats into the requested size.
        let width = width.saturating_sub(x.min(0).unsigned_abs());
        let height = height.saturating_sub(y.min(0).unsigned_abs());

        let safe_x = (x.max(0) as u32).min(img_w - 1);
        let safe_y = (y.max(0) as u32).min(img_h - 1);
        let safe_w = width.min(img_w - safe_x);
        let safe_h = height.min(img_h - safe_y);

        debug!(safe_x, safe_y, safe_w, safe_h, "Cropping region");
        self.image.crop_imm(safe_x, safe_y, safe_w, safe_h)
    }
}

/// Write a `DynamicImage` to `path` as PNG.
pub fn save_png(
    image: &DynamicImage,
    path: impl AsRef<std::path::Path>,
) -> Result<(), GridscanError> {
    image
        .save_with_format(path.as_ref(), ImageFormat::Png)
        .map_err(|err| {
            GridscanError::ImageError(format!(
                "failed to save image to {}: {}",
                path.as_ref().display(),
                err
            ))
        })
}
