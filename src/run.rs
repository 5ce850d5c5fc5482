//! The per-run context object and its state machine.
//!
//! All per-run artifacts — the decoded image, its binarised derivative, the
//! resolved schema, the result — live on an explicit [`ExtractionRun`]
//! passed through the stages, never in shared mutable state. That keeps the
//! pipeline reusable across runs and safe under concurrent extraction.
//!
//! ```text
//! Idle → Ingested → Preprocessed → SchemaResolved
//!      → Extracting → Completed | Cancelled → Persisted
//! ```
//!
//! Stage-local errors move the run to `Failed(stage)`. The extraction stage
//! itself cannot fail globally — only individual fields fail, internally. A
//! persistence error leaves the state untouched so `persist` can simply be
//! called again with the already-computed result.

use crate::cancel::CancelToken;
use crate::config::ExtractionConfig;
use crate::error::FieldlensError;
use crate::output::{ExtractionResult, RunStatus};
use crate::pipeline::ingest::{self, DocumentImage};
use crate::pipeline::preprocess::{self, PreprocessedImage};
use crate::schema::{KeySchema, Language, OverridePolicy};
use crate::store::{DocumentStore, PersistedRecord};
use std::sync::Arc;
use tracing::debug;

/// Where a run currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Ingested,
    Preprocessed,
    SchemaResolved,
    Extracting,
    Completed,
    Cancelled,
    Persisted,
    /// A stage-boundary error; carries the stage name.
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Persisted | RunState::Failed(_)
        )
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}

/// One pipeline run's context: artifacts plus the state machine.
#[derive(Debug, Default)]
pub struct ExtractionRun {
    state: RunState,
    document: Option<DocumentImage>,
    image: Option<Arc<PreprocessedImage>>,
    schema: Option<KeySchema>,
    result: Option<ExtractionResult>,
    record: Option<PersistedRecord>,
}

impl ExtractionRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// The binarised image, once preprocessing has run.
    pub fn image(&self) -> Option<&Arc<PreprocessedImage>> {
        self.image.as_ref()
    }

    pub fn schema(&self) -> Option<&KeySchema> {
        self.schema.as_ref()
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        self.result.as_ref()
    }

    pub fn record(&self) -> Option<&PersistedRecord> {
        self.record.as_ref()
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state transition");
        self.state = next;
    }

    /// Decode and validate the raw image bytes.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<(), FieldlensError> {
        match ingest::ingest(bytes) {
            Ok(document) => {
                self.document = Some(document);
                self.transition(RunState::Ingested);
                Ok(())
            }
            Err(e) => {
                self.transition(RunState::Failed("ingest".into()));
                Err(e)
            }
        }
    }

    /// Normalise the ingested image for extraction.
    ///
    /// Consumes the decoded original: only the binarised derivative is
    /// retained downstream.
    pub fn preprocess(&mut self) -> Result<(), FieldlensError> {
        let document = self.document.take().ok_or_else(|| {
            FieldlensError::Internal("preprocess called before ingest".to_string())
        })?;
        match preprocess::preprocess(&document) {
            Ok(image) => {
                self.image = Some(Arc::new(image));
                self.transition(RunState::Preprocessed);
                Ok(())
            }
            Err(e) => {
                self.transition(RunState::Failed("preprocess".into()));
                Err(e)
            }
        }
    }

    /// Resolve the key schema. Independent of the image stages.
    pub fn resolve_schema(
        &mut self,
        language: Language,
        override_labels: Option<&[String]>,
        policy: OverridePolicy,
    ) -> Result<(), FieldlensError> {
        match KeySchema::resolve(language, override_labels, policy) {
            Ok(schema) => {
                self.schema = Some(schema);
                self.transition(RunState::SchemaResolved);
                Ok(())
            }
            Err(e) => {
                self.transition(RunState::Failed("schema".into()));
                Err(e)
            }
        }
    }

    /// Run the extraction engine over the preprocessed image and schema.
    pub async fn extract(
        &mut self,
        config: &ExtractionConfig,
        cancel: CancelToken,
    ) -> Result<&ExtractionResult, FieldlensError> {
        let image = Arc::clone(self.image.as_ref().ok_or_else(|| {
            FieldlensError::Internal("extract called before preprocess".to_string())
        })?);
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| FieldlensError::Internal("extract called before schema".to_string()))?;

        self.transition(RunState::Extracting);
        let result = match crate::extract::extract(image, &schema, config, cancel).await {
            Ok(result) => result,
            Err(e) => {
                // Only reachable before dispatch (no engine configured).
                self.transition(RunState::Failed("extract".into()));
                return Err(e);
            }
        };

        self.transition(match result.status {
            RunStatus::Completed => RunState::Completed,
            RunStatus::Cancelled => RunState::Cancelled,
        });
        Ok(&*self.result.insert(result))
    }

    /// Persist the finished result as one new record.
    ///
    /// On failure the run state is left as-is: the result is still held and
    /// `persist` can be called again.
    pub async fn persist(
        &mut self,
        store: &dyn DocumentStore,
    ) -> Result<&PersistedRecord, FieldlensError> {
        let result = self.result.as_ref().ok_or_else(|| {
            FieldlensError::Internal("persist called before extract".to_string())
        })?;
        let record = store.persist(result).await?;
        self.transition(RunState::Persisted);
        Ok(&*self.record.insert(record))
    }
}

/// Drive a whole pipeline run: ingest → preprocess → schema → extract.
///
/// Preprocessing is CPU-bound and runs on the blocking pool so the async
/// workers are never stalled behind it. Persistence stays a separate,
/// explicitly-invoked step (see [`ExtractionRun::persist`]) so the caller
/// controls when — and whether — the result is written.
pub async fn run(
    bytes: &[u8],
    language: Language,
    override_labels: Option<&[String]>,
    config: &ExtractionConfig,
    cancel: CancelToken,
) -> Result<ExtractionRun, FieldlensError> {
    let mut run = ExtractionRun::new();
    run.ingest(bytes)?;

    let mut run = tokio::task::spawn_blocking(move || -> Result<ExtractionRun, FieldlensError> {
        run.preprocess()?;
        Ok(run)
    })
    .await
    .map_err(|e| FieldlensError::Internal(format!("preprocess task panicked: {e}")))??;

    run.resolve_schema(language, override_labels, config.override_policy)?;
    run.extract(config, cancel).await?;
    Ok(run)
}
