//! # fieldlens
//!
//! Extract structured key/value fields from scanned document images using
//! Document-QA models.
//!
//! ## Why this crate?
//!
//! Template-based invoice parsers break the moment a vendor changes their
//! layout. Instead this crate turns each field label into a natural-language
//! question ("What is the Invoice Number?") and lets a document
//! question-answering engine read the page as a human would — no templates,
//! no per-vendor rules, and a user-supplied field list works as well as the
//! built-in one.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image bytes
//!  │
//!  ├─ 1. Ingest      decode + validate (PNG/JPEG, dimensions > 0)
//!  ├─ 2. Preprocess  grayscale + Gaussian adaptive binarisation (CPU-bound)
//!  ├─ 3. Schema      language defaults or user override (no image dependency)
//!  ├─ 4. Extract     concurrent per-field DocQA calls, bounded worker pool
//!  └─ 5. Persist     one new record in the document store (explicit, optional)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fieldlens::{run, CancelToken, ExtractionConfig, Language};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Engine auto-detected from FIELDLENS_QA_URL
//!     let config = ExtractionConfig::default();
//!     let bytes = std::fs::read("invoice.png")?;
//!     let run = run(&bytes, Language::English, None, &config, CancelToken::new()).await?;
//!     for field in &run.result().expect("extraction ran").fields {
//!         println!("{}: {:?}", field.key, field.answer);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Schema order**: the result always holds exactly one entry per schema
//!   key, in schema order, no matter what order the engine answered in.
//! - **Failure isolation**: one field's engine failure never aborts the run;
//!   it becomes `NoAnswer` with the error recorded on that field.
//! - **Monotonic progress**: `on_field_complete(completed, total)` counts up
//!   through a single atomic counter and reaches `total` exactly once on an
//!   un-cancelled run.
//! - **Cooperative cancellation**: after the signal, in-flight calls finish
//!   but nothing new is dispatched; the partial result comes back marked
//!   `Cancelled`.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fieldlens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fieldlens = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod questions;
pub mod run;
pub mod schema;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelToken;
pub use config::{ExtractionConfig, ExtractionConfigBuilder, ENGINE_URL_ENV};
pub use engine::{AnswerCandidate, DocumentQaEngine, EngineError, HttpQaEngine};
pub use error::{FieldError, FieldlensError};
pub use extract::extract;
pub use output::{ExtractionResult, ExtractionStats, FieldAnswer, FieldResult, RunStatus};
pub use pipeline::ingest::{ingest, ingest_file, DocumentImage};
pub use pipeline::preprocess::{preprocess, PreprocessedImage};
pub use progress::{ExtractionProgress, NoopProgress, ProgressCallback};
pub use run::{run, ExtractionRun, RunState};
pub use schema::{default_keys, parse_override, KeySchema, Language, OverridePolicy, SchemaSource};
pub use store::{DocumentStore, HttpDocumentStore, InMemoryStore, PersistedRecord};
pub use stream::{extract_stream, FieldStream};
