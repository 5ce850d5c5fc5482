//! Configuration for an extraction run.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`],
//! built via its [`ExtractionConfigBuilder`]. Keeping every knob in one
//! struct makes it trivial to share configs across workers and to diff two
//! runs to understand why their results differ.

use crate::engine::{DocumentQaEngine, HttpQaEngine};
use crate::error::FieldlensError;
use crate::progress::ProgressCallback;
use crate::questions::KEY_PLACEHOLDER;
use crate::schema::OverridePolicy;
use std::fmt;
use std::sync::Arc;

/// Environment variable holding the DocQA endpoint URL, consulted when no
/// engine is injected explicitly.
pub const ENGINE_URL_ENV: &str = "FIELDLENS_QA_URL";

/// Configuration for a field-extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use fieldlens::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(8)
///     .max_retries(1)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Number of concurrent engine calls. Default: 4.
    ///
    /// Per-field DocQA calls are network-bound; a small pool cuts wall-clock
    /// time without overwhelming the inference endpoint. Lower this if the
    /// engine rate-limits; raise it for a fast, wide endpoint.
    pub concurrency: usize,

    /// Maximum retry attempts per field on a transient engine failure.
    /// Default: 2.
    ///
    /// Exhausted retries never abort the run — the field is recorded as
    /// `NoAnswer` with the error kept on its record.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt).
    /// Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-engine-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom question template containing `{key}`. If `None`, uses
    /// [`crate::questions::DEFAULT_QUESTION_TEMPLATE`].
    pub question_template: Option<String>,

    /// How blank tokens in a schema override are treated. Default: Strict.
    pub override_policy: OverridePolicy,

    /// Apply deterministic answer cleanup to engine output. Default: true.
    pub clean_answers: bool,

    /// Pre-constructed engine. Takes precedence over `engine_url` and the
    /// `FIELDLENS_QA_URL` environment variable.
    pub engine: Option<Arc<dyn DocumentQaEngine>>,

    /// DocQA endpoint URL used to build an [`HttpQaEngine`] when no engine
    /// is injected.
    pub engine_url: Option<String>,

    /// Progress callback invoked as fields complete.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            question_template: None,
            override_policy: OverridePolicy::default(),
            clean_answers: true,
            engine: None,
            engine_url: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("question_template", &self.question_template)
            .field("override_policy", &self.override_policy)
            .field("clean_answers", &self.clean_answers)
            .field("engine", &self.engine.as_ref().map(|_| "<dyn DocumentQaEngine>"))
            .field("engine_url", &self.engine_url)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgress>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the engine, from most-specific to least-specific:
    ///
    /// 1. A pre-built engine injected via [`ExtractionConfigBuilder::engine`]
    ///    — used as-is (tests, custom middleware).
    /// 2. `engine_url` — an [`HttpQaEngine`] is built for it.
    /// 3. The `FIELDLENS_QA_URL` environment variable.
    pub fn resolve_engine(&self) -> Result<Arc<dyn DocumentQaEngine>, FieldlensError> {
        if let Some(ref engine) = self.engine {
            return Ok(Arc::clone(engine));
        }

        if let Some(ref url) = self.engine_url {
            let engine = HttpQaEngine::new(url.clone(), self.api_timeout_secs)?;
            return Ok(Arc::new(engine));
        }

        if let Ok(url) = std::env::var(ENGINE_URL_ENV) {
            if !url.is_empty() {
                let engine = HttpQaEngine::new(url, self.api_timeout_secs)?;
                return Ok(Arc::new(engine));
            }
        }

        Err(FieldlensError::EngineNotConfigured {
            hint: format!(
                "Inject an engine via the config builder, set engine_url, \
                 or export {ENGINE_URL_ENV}."
            ),
        })
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn question_template(mut self, template: impl Into<String>) -> Self {
        self.config.question_template = Some(template.into());
        self
    }

    pub fn override_policy(mut self, policy: OverridePolicy) -> Self {
        self.config.override_policy = policy;
        self
    }

    pub fn clean_answers(mut self, v: bool) -> Self {
        self.config.clean_answers = v;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn DocumentQaEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn engine_url(mut self, url: impl Into<String>) -> Self {
        self.config.engine_url = Some(url.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, FieldlensError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(FieldlensError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if let Some(ref template) = c.question_template {
            if !template.contains(KEY_PLACEHOLDER) {
                return Err(FieldlensError::InvalidConfig(format!(
                    "question template must contain '{KEY_PLACEHOLDER}', got {template:?}"
                )));
            }
        }
        Ok(self.config)
    }
}
