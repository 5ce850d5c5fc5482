//! Streaming extraction API: emit fields as they complete.
//!
//! Unlike the eager [`crate::extract::extract`] which returns only after
//! every field finishes, [`extract_stream`] yields each [`FieldResult`] as
//! it resolves — in completion order, not schema order (sort by
//! `field.index` if order matters). Useful for live displays that show
//! answers arriving one by one.
//!
//! The stream always yields exactly one item per schema key: after a
//! cancellation, skipped fields are yielded immediately as `NoAnswer`
//! records.

use crate::cancel::CancelToken;
use crate::config::ExtractionConfig;
use crate::error::FieldlensError;
use crate::output::FieldResult;
use crate::pipeline::preprocess::PreprocessedImage;
use crate::pipeline::qa::{self, FieldJob};
use crate::questions::{question_for, DEFAULT_QUESTION_TEMPLATE};
use crate::schema::KeySchema;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of per-field results.
pub type FieldStream = Pin<Box<dyn Stream<Item = FieldResult> + Send>>;

/// Extract schema fields, streaming each result as it is ready.
///
/// # Errors
/// Fails only before dispatch, when no engine can be resolved.
pub fn extract_stream(
    image: Arc<PreprocessedImage>,
    schema: &KeySchema,
    config: &ExtractionConfig,
    cancel: CancelToken,
) -> Result<FieldStream, FieldlensError> {
    let engine = config.resolve_engine()?;

    let template = config
        .question_template
        .as_deref()
        .unwrap_or(DEFAULT_QUESTION_TEMPLATE);

    info!(fields = schema.len(), "starting streaming extraction");

    let jobs: Vec<FieldJob> = schema
        .keys()
        .iter()
        .enumerate()
        .map(|(index, key)| FieldJob {
            index,
            key: key.clone(),
            question: question_for(template, key),
        })
        .collect();

    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(jobs.into_iter().map(move |job| {
        let engine = Arc::clone(&engine);
        let image = Arc::clone(&image);
        let config = config.clone();
        let cancel = cancel.clone();
        async move {
            if cancel.is_cancelled() {
                debug!(key = %job.key, "cancelled before dispatch, skipping");
                return FieldResult::undispatched(job.index, job.key);
            }
            qa::resolve_field(&engine, job, &image, &config).await
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
