//! Per-field engine interaction: ask one question, absorb any failure.
//!
//! This is the failure-isolation boundary. `resolve_field` always returns a
//! [`FieldResult`] — an engine error or timeout for one field is retried
//! with exponential backoff, then recorded on the result and converted into
//! `NoAnswer`, never propagated upward. One unreadable field must not cost
//! the caller the other nine.

use crate::config::ExtractionConfig;
use crate::engine::DocumentQaEngine;
use crate::error::FieldError;
use crate::output::{FieldAnswer, FieldResult};
use crate::pipeline::answer::clean_answer;
use crate::pipeline::preprocess::PreprocessedImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One unit of extraction work: a schema key and its rendered question.
pub(crate) struct FieldJob {
    pub index: usize,
    pub key: String,
    pub question: String,
}

/// Ask the engine one field's question, retrying transient failures.
///
/// Retry waits follow `retry_backoff_ms * 2^(attempt-1)`. After the last
/// attempt the field resolves to `NoAnswer` carrying the final error; an
/// empty candidate list resolves to `NoAnswer` immediately with no error —
/// the engine looked and found nothing, which is an answer in itself.
pub(crate) async fn resolve_field(
    engine: &Arc<dyn DocumentQaEngine>,
    job: FieldJob,
    image: &PreprocessedImage,
    config: &ExtractionConfig,
) -> FieldResult {
    let start = Instant::now();
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_error: Option<String> = None;
    let mut timed_out = false;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                key = %job.key,
                attempt,
                max = config.max_retries,
                backoff_ms = backoff,
                "retrying field"
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, engine.answer(&job.question, image)).await {
            Err(_elapsed) => {
                warn!(key = %job.key, secs = config.api_timeout_secs, "engine call timed out");
                last_error = Some(format!("timed out after {}s", config.api_timeout_secs));
                timed_out = true;
            }
            Ok(Err(e)) => {
                warn!(key = %job.key, error = %e, "engine call failed");
                last_error = Some(e.to_string());
                timed_out = false;
            }
            Ok(Ok(candidates)) => {
                return resolved(job, candidates, config, start, attempt as u8);
            }
        }
    }

    // All retries exhausted; the failure becomes data.
    let retries = config.max_retries as u8;
    let error = if timed_out {
        FieldError::Timeout {
            key: job.key.clone(),
            secs: config.api_timeout_secs,
        }
    } else {
        FieldError::EngineFailed {
            key: job.key.clone(),
            retries,
            detail: last_error.unwrap_or_else(|| "unknown error".to_string()),
        }
    };
    warn!(key = %job.key, %error, "field unresolved, recording no answer");

    FieldResult {
        index: job.index,
        key: job.key,
        answer: FieldAnswer::NoAnswer,
        confidence: None,
        duration_ms: start.elapsed().as_millis() as u64,
        retries,
        error: Some(error),
    }
}

/// Turn a successful engine response into the field's record.
fn resolved(
    job: FieldJob,
    candidates: Vec<crate::engine::AnswerCandidate>,
    config: &ExtractionConfig,
    start: Instant,
    retries: u8,
) -> FieldResult {
    let duration_ms = start.elapsed().as_millis() as u64;

    let top = match candidates.into_iter().next() {
        Some(top) => top,
        None => {
            debug!(key = %job.key, "engine returned no candidates");
            return FieldResult {
                index: job.index,
                key: job.key,
                answer: FieldAnswer::NoAnswer,
                confidence: None,
                duration_ms,
                retries,
                error: None,
            };
        }
    };

    let text = if config.clean_answers {
        clean_answer(&top.text)
    } else {
        top.text
    };

    // A cleaned-to-empty answer carries no information; treat it as none.
    let (answer, confidence) = if text.is_empty() {
        (FieldAnswer::NoAnswer, None)
    } else {
        (FieldAnswer::Answered(text), Some(top.confidence))
    };

    FieldResult {
        index: job.index,
        key: job.key,
        answer,
        confidence,
        duration_ms,
        retries,
        error: None,
    }
}
