//! Result types produced by the extraction engine.
//!
//! The engine's answer shape is deliberately a discriminated enum,
//! [`FieldAnswer`], not an `Option<String>` in disguise: downstream code can
//! never mistake an engine failure for a legitimately empty answer, because
//! failures carry their [`crate::error::FieldError`] on the
//! [`FieldResult`] and the answer itself is `NoAnswer`.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The outcome of one field's question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAnswer {
    /// The engine's top-ranked candidate text.
    Answered(String),
    /// The engine returned no candidates, the call failed, or the field was
    /// never dispatched because the run was cancelled.
    NoAnswer,
}

impl FieldAnswer {
    pub fn is_answered(&self) -> bool {
        matches!(self, FieldAnswer::Answered(_))
    }

    /// The answer text, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldAnswer::Answered(text) => Some(text),
            FieldAnswer::NoAnswer => None,
        }
    }
}

/// One schema key's extraction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResult {
    /// Position of the key in the schema (0-indexed).
    pub index: usize,
    /// The schema key this record answers.
    pub key: String,
    /// The extracted answer.
    pub answer: FieldAnswer,
    /// Confidence of the engine's top candidate, when one existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Wall-clock time spent on this field, including retries.
    pub duration_ms: u64,
    /// Retries consumed before the final outcome.
    pub retries: u8,
    /// The absorbed per-field error, if the engine call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FieldError>,
}

impl FieldResult {
    /// Record for a field that was never dispatched (cancelled run).
    pub(crate) fn undispatched(index: usize, key: String) -> Self {
        FieldResult {
            index,
            key,
            answer: FieldAnswer::NoAnswer,
            confidence: None,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }
}

/// How an extraction run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every field was dispatched and completed.
    Completed,
    /// The run was cancelled; undispatched fields are `NoAnswer`.
    Cancelled,
}

/// Aggregate statistics for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Fields in the schema.
    pub total_fields: usize,
    /// Fields that resolved to `Answered`.
    pub answered_fields: usize,
    /// Fields that resolved to `NoAnswer` for any reason.
    pub no_answer_fields: usize,
    /// Fields actually dispatched to the engine (< total only when cancelled).
    pub dispatched_fields: usize,
    /// Total wall-clock time of the extraction stage.
    pub total_duration_ms: u64,
}

/// The complete, ordered result of one extraction run.
///
/// Invariant: `fields` holds exactly one entry per schema key, in schema
/// order, regardless of the order in which the underlying work completed.
/// Frozen once the run finishes; [`crate::store::DocumentStore::persist`]
/// takes it by shared reference and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub fields: Vec<FieldResult>,
    pub status: RunStatus,
    pub stats: ExtractionStats,
}

impl ExtractionResult {
    /// Look up a field's answer by key.
    pub fn get(&self, key: &str) -> Option<&FieldAnswer> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.answer)
    }

    /// Number of fields (equal to the schema length).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields that resolved to an answer.
    pub fn answered_count(&self) -> usize {
        self.fields.iter().filter(|f| f.answer.is_answered()).count()
    }

    /// Flatten into the store's wire shape: label → string-or-null.
    ///
    /// JSON object member order is not significant to the store; the ordered
    /// view of the result is `fields` itself.
    pub fn to_field_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| {
                let value = match &f.answer {
                    FieldAnswer::Answered(text) => Value::String(text.clone()),
                    FieldAnswer::NoAnswer => Value::Null,
                };
                (f.key.clone(), value)
            })
            .collect()
    }
}
