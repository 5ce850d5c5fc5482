//! Progress-callback trait for per-field extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgress>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as fields complete.
//!
//! The callback approach keeps the library ignorant of how the host
//! application communicates: callers forward events to a terminal progress
//! bar, a channel, or a UI however they like. The trait is `Send + Sync`
//! because fields are resolved concurrently; `completed` counts come from a
//! single lock-serialised counter inside the engine, so the sequence
//! observed through [`on_field_complete`](ExtractionProgress::on_field_complete)
//! is monotonically increasing even though events arrive in completion
//! order, not schema order.

use crate::output::RunStatus;
use std::sync::Arc;

/// Called by the extraction engine as it processes each field.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Methods may be invoked concurrently from different
/// workers; implementations must protect shared mutable state.
pub trait ExtractionProgress: Send + Sync {
    /// Called once before any field is dispatched.
    fn on_extraction_start(&self, total_fields: usize) {
        let _ = total_fields;
    }

    /// Called just before a field's question is sent to the engine.
    fn on_field_start(&self, key: &str) {
        let _ = key;
    }

    /// Called each time a field completes, in completion order.
    ///
    /// `completed` is monotonically increasing and reaches `total` exactly
    /// once when an un-cancelled run finishes.
    fn on_field_complete(&self, completed: usize, total: usize) {
        let _ = (completed, total);
    }

    /// Called when a field's engine call failed after all retries.
    ///
    /// The field is still reported through
    /// [`on_field_complete`](Self::on_field_complete); this event only adds
    /// the error detail.
    fn on_field_error(&self, key: &str, error: &str) {
        let _ = (key, error);
    }

    /// Called once after the run finishes, whether completed or cancelled.
    fn on_extraction_complete(&self, status: RunStatus, answered: usize, total: usize) {
        let _ = (status, answered, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl ExtractionProgress for NoopProgress {}

/// Convenience alias matching the type stored in
/// [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgress>;
