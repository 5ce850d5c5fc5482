//! The extraction engine: question-driven field extraction over a bounded
//! worker pool.
//!
//! ## Ordering and progress
//!
//! Fields are dispatched concurrently and finish in whatever order the
//! engine answers, but the returned [`ExtractionResult`] is always in
//! schema order — every worker carries its schema index and results are
//! reassembled into index slots at the end. Only the progress signal
//! reflects completion order: a single lock-serialised counter feeds
//! `on_field_complete(completed, total)` with a monotonically increasing
//! count.
//!
//! ## Failure isolation and cancellation
//!
//! A per-field failure never aborts the run (see [`crate::pipeline::qa`]).
//! Cancellation is cooperative: each worker checks the [`CancelToken`] once
//! before dispatching to the engine, so in-flight calls finish but nothing
//! new starts. Undispatched fields resolve to `NoAnswer` and the run is
//! reported as [`RunStatus::Cancelled`], not completed.

use crate::cancel::CancelToken;
use crate::config::ExtractionConfig;
use crate::error::FieldlensError;
use crate::output::{ExtractionResult, ExtractionStats, FieldResult, RunStatus};
use crate::pipeline::preprocess::PreprocessedImage;
use crate::pipeline::qa::{self, FieldJob};
use crate::questions::{question_for, DEFAULT_QUESTION_TEMPLATE};
use crate::schema::KeySchema;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Extract every schema field from the preprocessed image.
///
/// # Errors
/// Fails only before dispatch, when no engine can be resolved
/// ([`FieldlensError::EngineNotConfigured`]). Once extraction starts it
/// cannot fail globally — individual fields fail internally and are
/// recorded as `NoAnswer`.
pub async fn extract(
    image: Arc<PreprocessedImage>,
    schema: &KeySchema,
    config: &ExtractionConfig,
    cancel: CancelToken,
) -> Result<ExtractionResult, FieldlensError> {
    let total_start = Instant::now();
    let engine = config.resolve_engine()?;

    let template = config
        .question_template
        .as_deref()
        .unwrap_or(DEFAULT_QUESTION_TEMPLATE);
    let total = schema.len();

    info!(
        fields = total,
        language = %schema.language(),
        concurrency = config.concurrency,
        "starting extraction"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total);
    }

    // Completion events are serialised: the counter increment and the
    // callback invocation happen under one lock, so the `completed` values
    // observed through the callback are strictly increasing even though
    // fields finish on different workers.
    let completed = Arc::new(Mutex::new(0usize));

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

    // `None` marks a job whose dispatch was skipped after cancellation.
    let outcomes: Vec<Option<FieldResult>> = stream::iter(jobs.into_iter().map(|job| {
        let engine = Arc::clone(&engine);
        let image = Arc::clone(&image);
        let config = config.clone();
        let cancel = cancel.clone();
        let completed = Arc::clone(&completed);
        async move {
            if cancel.is_cancelled() {
                debug!(key = %job.key, "cancelled before dispatch, skipping");
                return None;
            }
            if let Some(ref cb) = config.progress_callback {
                cb.on_field_start(&job.key);
            }

            let result = qa::resolve_field(&engine, job, &image, &config).await;

            {
                let mut done = completed.lock().unwrap_or_else(|p| p.into_inner());
                *done += 1;
                if let Some(ref cb) = config.progress_callback {
                    if let Some(ref error) = result.error {
                        cb.on_field_error(&result.key, &error.to_string());
                    }
                    cb.on_field_complete(*done, total);
                }
            }
            Some(result)
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    // Reassemble into schema order, filling skipped slots.
    let mut slots: Vec<Option<FieldResult>> = (0..total).map(|_| None).collect();
    let mut dispatched = 0usize;
    for outcome in outcomes.into_iter().flatten() {
        dispatched += 1;
        let index = outcome.index;
        slots[index] = Some(outcome);
    }
    let fields: Vec<FieldResult> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| FieldResult::undispatched(index, schema.keys()[index].clone()))
        })
        .collect();

    // A signalled run reports cancelled even when every field was already
    // in flight and finished.
    let status = if cancel.is_cancelled() {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };

    let answered = fields.iter().filter(|f| f.answer.is_answered()).count();
    let stats = ExtractionStats {
        total_fields: total,
        answered_fields: answered,
        no_answer_fields: total - answered,
        dispatched_fields: dispatched,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        answered,
        total,
        dispatched,
        ?status,
        duration_ms = stats.total_duration_ms,
        "extraction finished"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(status, answered, total);
    }

    Ok(ExtractionResult {
        fields,
        status,
        stats,
    })
}
