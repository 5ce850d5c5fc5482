//! Error types for the fieldlens library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FieldlensError`] — **Fatal**: the pipeline stage cannot proceed at all
//!   (undecodable image, invalid schema override, store unreachable).
//!   Returned as `Err(FieldlensError)` from the stage-boundary functions.
//!
//! * [`FieldError`] — **Non-fatal**: a single field's inference call failed
//!   (engine error, timeout) but every other field is fine. Stored inside
//!   [`crate::output::FieldResult`] so callers can inspect partial success
//!   rather than losing the whole extraction to one bad field.
//!
//! The separation encodes the failure-isolation guarantee: a per-field
//! failure is converted into data (`NoAnswer` plus the recorded error) and
//! never aborts the run; a stage-boundary failure aborts that stage and
//! surfaces with a variant naming the stage.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fieldlens library.
///
/// Per-field failures use [`FieldError`] and are stored in
/// [`crate::output::FieldResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum FieldlensError {
    // ── Ingest errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The bytes could not be decoded as a raster image.
    #[error("failed to decode image: {detail}\nSupported formats: PNG, JPEG.")]
    DecodeFailed { detail: String },

    /// The image decoded but one of its dimensions is zero.
    #[error("image dimensions must be greater than zero, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    // ── Preprocess errors ─────────────────────────────────────────────────
    /// Pixel data was malformed during normalisation.
    #[error("preprocessing failed: {detail}")]
    PreprocessFailed { detail: String },

    // ── Schema errors ─────────────────────────────────────────────────────
    /// A schema was constructed with no keys at all.
    #[error("key schema must contain at least one field label")]
    EmptySchema,

    /// The override list contains the same label twice.
    #[error("duplicate key '{key}' in schema override")]
    DuplicateKey { key: String },

    /// The override list contains a blank (empty after trimming) label.
    ///
    /// Only raised under [`crate::schema::OverridePolicy::Strict`].
    #[error("blank key at position {position} in schema override")]
    BlankKey { position: usize },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// No DocQA engine was injected and none could be resolved from the
    /// environment.
    #[error("no DocQA engine configured.\n{hint}")]
    EngineNotConfigured { hint: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// The document store could not be reached at all.
    #[error("document store unreachable: {detail}")]
    StoreUnreachable { detail: String },

    /// The document store was reached but rejected the insert.
    #[error("document store rejected the write: {detail}")]
    StoreWriteFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single field.
///
/// Stored alongside [`crate::output::FieldResult`] when a field's inference
/// call fails. The field is recorded as `NoAnswer` and the extraction
/// continues; this error never crosses the extraction boundary.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FieldError {
    /// The engine call failed after all retries.
    #[error("field '{key}': engine call failed after {retries} retries: {detail}")]
    EngineFailed {
        key: String,
        retries: u8,
        detail: String,
    },

    /// The engine call timed out.
    #[error("field '{key}': engine call timed out after {secs}s")]
    Timeout { key: String, secs: u64 },
}
