//! Image ingestion: decode and validate raw document bytes.
//!
//! Ingestion is the only stage that sees the user's bytes. It produces a
//! [`DocumentImage`] or fails; nothing downstream ever re-validates
//! dimensions or format, so the invariants established here (decodable,
//! both dimensions > 0) hold for the rest of the run.

use crate::error::FieldlensError;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// A decoded raster document image with positive dimensions.
///
/// Immutable and owned by the pipeline run; it is consumed by
/// preprocessing and only the binarised derivative travels further.
#[derive(Debug)]
pub struct DocumentImage {
    image: DynamicImage,
}

impl DocumentImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub(crate) fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

/// Decode raster bytes (PNG/JPEG) into a validated [`DocumentImage`].
///
/// # Errors
/// - [`FieldlensError::DecodeFailed`] if the bytes are not a decodable image
/// - [`FieldlensError::EmptyImage`] if either decoded dimension is zero
pub fn ingest(bytes: &[u8]) -> Result<DocumentImage, FieldlensError> {
    let image = image::load_from_memory(bytes).map_err(|e| FieldlensError::DecodeFailed {
        detail: e.to_string(),
    })?;

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(FieldlensError::EmptyImage { width, height });
    }

    debug!(width, height, "image ingested");
    Ok(DocumentImage { image })
}

/// Read an image file and [`ingest`] its bytes.
pub fn ingest_file(path: impl AsRef<Path>) -> Result<DocumentImage, FieldlensError> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => ingest(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(FieldlensError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(FieldlensError::ImageNotFound {
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([220, 220, 220]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("PNG encoding must succeed");
        buf
    }

    #[test]
    fn ingest_decodes_valid_png() {
        let doc = ingest(&png_bytes(64, 48)).expect("valid PNG must ingest");
        assert_eq!(doc.dimensions(), (64, 48));
    }

    #[test]
    fn ingest_rejects_garbage_bytes() {
        let err = ingest(b"definitely not an image").expect_err("garbage must fail");
        assert!(matches!(err, FieldlensError::DecodeFailed { .. }));
    }

    #[test]
    fn ingest_rejects_truncated_png() {
        let mut bytes = png_bytes(32, 32);
        bytes.truncate(bytes.len() / 2);
        let err = ingest(&bytes).expect_err("truncated PNG must fail");
        assert!(matches!(err, FieldlensError::DecodeFailed { .. }));
    }

    #[test]
    fn ingest_file_reports_missing_path() {
        let err = ingest_file("/nonexistent/invoice.png").expect_err("missing file must fail");
        assert!(matches!(err, FieldlensError::ImageNotFound { .. }));
    }

    #[test]
    fn ingest_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.png");
        std::fs::write(&path, png_bytes(20, 30)).expect("write");

        let doc = ingest_file(&path).expect("file must ingest");
        assert_eq!(doc.dimensions(), (20, 30));
    }
}
