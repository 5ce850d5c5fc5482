//! Image normalisation: grayscale + Gaussian adaptive binarisation.
//!
//! Document-QA models read scanned documents far more reliably when the
//! page is reduced to ink-versus-paper. A single global threshold fails on
//! uneven lighting (shadows, scanner vignetting), so the threshold is local:
//! each pixel is compared against the Gaussian-weighted mean of its 11×11
//! neighbourhood minus a small constant offset. The output is inverted —
//! ink becomes foreground (255), paper becomes background (0).
//!
//! The transform is pure: same input image, byte-identical output, every
//! call. That property is load-bearing — the binarised page is shared
//! read-only by every concurrent extraction worker, and tests pin the
//! determinism down.

use crate::error::FieldlensError;
use crate::pipeline::ingest::DocumentImage;
use image::{GrayImage, Luma};
use std::io::Cursor;
use tracing::debug;

/// Side length of the square thresholding neighbourhood.
pub const THRESHOLD_BLOCK_SIZE: u32 = 11;

/// Constant subtracted from the weighted neighbourhood mean.
pub const THRESHOLD_OFFSET: f32 = 2.0;

/// A binarised (0/255) single-channel document image.
///
/// Same pixel dimensions as its source [`DocumentImage`]. Immutable;
/// shared read-only by all extraction workers behind an `Arc`.
#[derive(Debug)]
pub struct PreprocessedImage {
    binary: GrayImage,
}

impl PreprocessedImage {
    pub fn width(&self) -> u32 {
        self.binary.width()
    }

    pub fn height(&self) -> u32 {
        self.binary.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// The underlying binary pixel buffer.
    pub fn as_gray(&self) -> &GrayImage {
        &self.binary
    }

    /// Encode as PNG for the engine wire format.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, FieldlensError> {
        let mut buf = Vec::new();
        self.binary
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| FieldlensError::Internal(format!("PNG encoding: {e}")))?;
        Ok(buf)
    }
}

/// Normalise a document image for extraction.
///
/// Two steps: (1) single-channel grayscale; (2) inverted local adaptive
/// threshold over a Gaussian-weighted [`THRESHOLD_BLOCK_SIZE`] neighbourhood
/// with [`THRESHOLD_OFFSET`].
///
/// # Errors
/// [`FieldlensError::PreprocessFailed`] on malformed pixel data. Unreachable
/// for a [`DocumentImage`], whose invariants guarantee a well-formed buffer.
pub fn preprocess(document: &DocumentImage) -> Result<PreprocessedImage, FieldlensError> {
    let gray = document.as_dynamic().to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(FieldlensError::PreprocessFailed {
            detail: format!("grayscale buffer has dimensions {width}x{height}"),
        });
    }

    let binary = adaptive_threshold_gaussian(&gray, THRESHOLD_BLOCK_SIZE, THRESHOLD_OFFSET);
    debug!(width, height, "image binarised");

    Ok(PreprocessedImage { binary })
}

/// The Gaussian weights for a 1-D kernel of the given odd size.
///
/// Sigma follows the usual derivation from kernel size:
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`. Weights are normalised to sum to 1.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size - 1) as f32 * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i64;

    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();

    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Inverted adaptive threshold with a Gaussian-weighted neighbourhood mean.
///
/// The Gaussian window is separable, so the weighted mean is computed as a
/// horizontal pass followed by a vertical pass. Borders replicate the edge
/// pixel (indices clamp to the image). A pixel brighter than its local
/// threshold is paper (0); everything else is ink (255).
fn adaptive_threshold_gaussian(gray: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let kernel = gaussian_kernel(block_size);
    let half = (block_size / 2) as i64;

    let row = width as usize;

    // Horizontal pass of the separable Gaussian mean.
    let mut horizontal = vec![0f32; row * height as usize];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0f32;
            for (i, w) in kernel.iter().enumerate() {
                let sx = (x as i64 + i as i64 - half).clamp(0, width as i64 - 1) as u32;
                acc += *w * f32::from(gray.get_pixel(sx, y)[0]);
            }
            horizontal[y as usize * row + x as usize] = acc;
        }
    }

    // Vertical pass, then compare against the local threshold.
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut mean = 0f32;
            for (i, w) in kernel.iter().enumerate() {
                let sy = (y as i64 + i as i64 - half).clamp(0, height as i64 - 1) as u32;
                mean += *w * horizontal[sy as usize * row + x as usize];
            }
            let threshold = mean - offset;
            let value = if f32::from(gray.get_pixel(x, y)[0]) > threshold {
                0
            } else {
                255
            };
            out.put_pixel(x, y, Luma([value]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::ingest;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    /// A light page with a dark horizontal "text" band.
    fn scanned_page(width: u32, height: u32) -> DocumentImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([235, 235, 235]));
        for y in height / 3..height / 3 + 4 {
            for x in 4..width - 4 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("PNG encoding must succeed");
        ingest(&buf).expect("page must ingest")
    }

    #[test]
    fn preprocess_preserves_dimensions() {
        let doc = scanned_page(120, 90);
        let pre = preprocess(&doc).expect("preprocess must succeed");
        assert_eq!(pre.dimensions(), (120, 90));
    }

    #[test]
    fn output_is_strictly_binary() {
        let doc = scanned_page(60, 60);
        let pre = preprocess(&doc).expect("preprocess must succeed");
        assert!(pre
            .as_gray()
            .pixels()
            .all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn ink_becomes_foreground() {
        let doc = scanned_page(60, 60);
        let pre = preprocess(&doc).expect("preprocess must succeed");
        // Middle of the dark band → ink → 255 in the inverted binary.
        assert_eq!(pre.as_gray().get_pixel(30, 20)[0], 255);
        // A far corner of plain paper → 0.
        assert_eq!(pre.as_gray().get_pixel(2, 55)[0], 0);
    }

    #[test]
    fn preprocess_is_deterministic_and_idempotent() {
        let doc = scanned_page(80, 50);
        let first = preprocess(&doc).expect("preprocess must succeed");
        let second = preprocess(&doc).expect("preprocess must succeed");
        assert_eq!(
            first.as_gray().as_raw(),
            second.as_gray().as_raw(),
            "same input must yield byte-identical output"
        );
    }

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(THRESHOLD_BLOCK_SIZE);
        assert_eq!(kernel.len(), 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "weights must sum to 1, got {sum}");
        for i in 0..kernel.len() / 2 {
            assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-6);
        }
        // Centre weight dominates.
        assert!(kernel[5] > kernel[0]);
    }

    #[test]
    fn png_round_trip_keeps_dimensions() {
        let doc = scanned_page(40, 30);
        let pre = preprocess(&doc).expect("preprocess must succeed");
        let png = pre.to_png_bytes().expect("encoding must succeed");
        let reloaded = image::load_from_memory(&png).expect("PNG must decode");
        assert_eq!((reloaded.width(), reloaded.height()), (40, 30));
    }
}
