//! End-to-end pipeline tests with a scripted DocQA engine.
//!
//! No network and no real model: the engine collaborator is swapped for a
//! scripted implementation, so these tests pin down the pipeline's own
//! guarantees — schema ordering, failure isolation, monotonic progress,
//! cooperative cancellation, and the store wire shape.

use async_trait::async_trait;
use fieldlens::{
    default_keys, extract, extract_stream, ingest, preprocess, run, AnswerCandidate, CancelToken,
    DocumentQaEngine, DocumentStore, EngineError, ExtractionConfig, ExtractionProgress,
    FieldAnswer, InMemoryStore, KeySchema, Language, OverridePolicy, PreprocessedImage, RunState,
    RunStatus,
};
use futures::StreamExt;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A synthetic scanned invoice: light paper with a few dark text bands.
fn invoice_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(width, height, Rgb([240, 240, 240]));
    for band in 0..3u32 {
        let top = (band + 1) * height / 5;
        for y in top..(top + 3).min(height) {
            for x in width / 10..width - width / 10 {
                img.put_pixel(x, y, Rgb([25, 25, 25]));
            }
        }
    }
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("PNG encoding must succeed");
    buf
}

fn preprocessed(width: u32, height: u32) -> Arc<PreprocessedImage> {
    let doc = ingest(&invoice_png(width, height)).expect("ingest must succeed");
    Arc::new(preprocess(&doc).expect("preprocess must succeed"))
}

/// What the scripted engine should do for one question.
#[derive(Clone)]
enum Script {
    Answer(&'static str),
    Empty,
    Fail,
}

/// A [`DocumentQaEngine`] that replays a fixed script, keyed by question.
struct ScriptedEngine {
    by_question: HashMap<String, Script>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedEngine {
    fn new(delay: Duration) -> Self {
        ScriptedEngine {
            by_question: HashMap::new(),
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    fn script(mut self, key: &str, script: Script) -> Self {
        self.by_question
            .insert(format!("What is the {key}?"), script);
        self
    }

    /// Script an answer for every default key of `language`.
    fn answer_all_defaults(mut self, language: Language) -> Self {
        for key in default_keys(language) {
            self = self.script(key, Script::Answer("extracted value"));
        }
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentQaEngine for ScriptedEngine {
    async fn answer(
        &self,
        question: &str,
        _image: &PreprocessedImage,
    ) -> Result<Vec<AnswerCandidate>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.by_question.get(question).cloned().unwrap_or(Script::Empty) {
            Script::Answer(text) => Ok(vec![
                AnswerCandidate {
                    text: text.to_string(),
                    confidence: 0.91,
                },
                AnswerCandidate {
                    text: "runner-up".to_string(),
                    confidence: 0.4,
                },
            ]),
            Script::Empty => Ok(vec![]),
            Script::Fail => Err(EngineError::Request("HTTP 503".into())),
        }
    }
}

/// Records every `(completed, total)` progress event.
#[derive(Default)]
struct CollectingProgress {
    events: Mutex<Vec<(usize, usize)>>,
}

impl ExtractionProgress for CollectingProgress {
    fn on_field_complete(&self, completed: usize, total: usize) {
        self.events.lock().unwrap().push((completed, total));
    }
}

/// Cancels the shared token once `after` fields have completed.
struct CancelAfter {
    after: usize,
    token: CancelToken,
}

impl ExtractionProgress for CancelAfter {
    fn on_field_complete(&self, completed: usize, _total: usize) {
        if completed == self.after {
            self.token.cancel();
        }
    }
}

fn config_with(engine: Arc<dyn DocumentQaEngine>) -> fieldlens::ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .engine(engine)
        .retry_backoff_ms(1)
}

// ── Scenario: 9 of 10 default keys answered ──────────────────────────────────

#[tokio::test]
async fn nine_of_ten_fields_resolve_in_schema_order() {
    let mut engine = ScriptedEngine::new(Duration::ZERO);
    for key in default_keys(Language::English) {
        engine = engine.script(key, Script::Answer("value"));
    }
    let engine = engine.script("Tax Information", Script::Empty);

    let progress = Arc::new(CollectingProgress::default());
    let config = config_with(Arc::new(engine))
        .concurrency(3)
        .progress_callback(progress.clone())
        .build()
        .expect("valid config");

    let schema = KeySchema::resolve(Language::English, None, OverridePolicy::Strict)
        .expect("defaults must resolve");
    let image = preprocessed(800, 600);

    let result = extract(image, &schema, &config, CancelToken::new())
        .await
        .expect("extraction must run");

    // Exactly one entry per key, in schema order.
    assert_eq!(result.len(), 10);
    let keys: Vec<&str> = result.fields.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, default_keys(Language::English));

    // 9 answered, the empty-candidate field is an explicit NoAnswer.
    assert_eq!(result.answered_count(), 9);
    assert_eq!(result.get("Tax Information"), Some(&FieldAnswer::NoAnswer));
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.dispatched_fields, 10);
    assert_eq!(result.stats.no_answer_fields, 1);

    // Progress is monotonic, one event per field, ending at n/n.
    let events = progress.events.lock().unwrap();
    assert_eq!(events.len(), 10);
    assert_eq!(*events, (1..=10).map(|i| (i, 10)).collect::<Vec<_>>());

    // Persisting yields one record whose field set matches the schema.
    let store = InMemoryStore::new();
    let record = store.persist(&result).await.expect("persist must succeed");
    assert!(record.id.starts_with("mem-"));
    assert_eq!(store.len(), 1);

    let stored = &store.records()[0];
    let stored_keys: HashSet<&str> = stored
        .as_object()
        .expect("record is a flat object")
        .keys()
        .map(|k| k.as_str())
        .collect();
    let schema_keys: HashSet<&str> = schema.keys().iter().map(|k| k.as_str()).collect();
    assert_eq!(stored_keys, schema_keys);
    assert_eq!(stored["Invoice Number"], "value");
    assert!(stored["Tax Information"].is_null());
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failing_field_does_not_abort_the_run() {
    let engine = ScriptedEngine::new(Duration::ZERO)
        .answer_all_defaults(Language::English)
        .script("Vendor", Script::Fail);

    let progress = Arc::new(CollectingProgress::default());
    let config = config_with(Arc::new(engine))
        .max_retries(1)
        .progress_callback(progress.clone())
        .build()
        .expect("valid config");

    let schema = KeySchema::from_defaults(Language::English);
    let result = extract(preprocessed(400, 300), &schema, &config, CancelToken::new())
        .await
        .expect("extraction must run");

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.get("Vendor"), Some(&FieldAnswer::NoAnswer));
    assert_eq!(result.answered_count(), 9);

    let vendor = result
        .fields
        .iter()
        .find(|f| f.key == "Vendor")
        .expect("Vendor field present");
    assert!(vendor.error.is_some(), "absorbed error must be recorded");

    // The failure still counts as completed work.
    assert_eq!(progress.events.lock().unwrap().last(), Some(&(10, 10)));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_stops_dispatch_but_keeps_resolved_fields() {
    let engine = Arc::new(
        ScriptedEngine::new(Duration::from_millis(5)).answer_all_defaults(Language::English),
    );

    let token = CancelToken::new();
    let config = config_with(engine.clone())
        .concurrency(1)
        .progress_callback(Arc::new(CancelAfter {
            after: 4,
            token: token.clone(),
        }))
        .build()
        .expect("valid config");

    let schema = KeySchema::from_defaults(Language::English);
    let result = extract(preprocessed(400, 300), &schema, &config, token)
        .await
        .expect("extraction must run");

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.stats.dispatched_fields, 4);
    assert_eq!(result.answered_count(), 4);
    assert_eq!(engine.calls(), 4, "no engine calls after the signal");

    // With a single worker, dispatch follows schema order: the first four
    // fields resolved, the rest were never dispatched.
    for field in &result.fields[..4] {
        assert!(field.answer.is_answered(), "field '{}' should be answered", field.key);
    }
    for field in &result.fields[4..] {
        assert_eq!(field.answer, FieldAnswer::NoAnswer);
        assert!(field.error.is_none(), "skipped fields carry no error");
    }

    // Every key is still present, in schema order.
    let keys: Vec<&str> = result.fields.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, default_keys(Language::English));
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn extract_stream_yields_exactly_one_item_per_key() {
    let engine = Arc::new(
        ScriptedEngine::new(Duration::from_millis(1)).answer_all_defaults(Language::French),
    );
    let config = config_with(engine).concurrency(4).build().expect("valid config");
    let schema = KeySchema::from_defaults(Language::French);

    let stream = extract_stream(preprocessed(200, 200), &schema, &config, CancelToken::new())
        .expect("stream must build");
    let mut fields: Vec<_> = stream.collect().await;

    assert_eq!(fields.len(), 10);
    fields.sort_by_key(|f| f.index);
    let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, default_keys(Language::French));
    assert!(fields.iter().all(|f| f.answer.is_answered()));
}

// ── Full pipeline driver ─────────────────────────────────────────────────────

#[tokio::test]
async fn run_drives_the_pipeline_to_persisted() {
    let engine = Arc::new(
        ScriptedEngine::new(Duration::ZERO).answer_all_defaults(Language::English),
    );
    let config = config_with(engine).build().expect("valid config");

    let bytes = invoice_png(640, 480);
    let mut run = run(&bytes, Language::English, None, &config, CancelToken::new())
        .await
        .expect("pipeline must run");

    assert_eq!(*run.state(), RunState::Completed);
    let result = run.result().expect("result present");
    assert_eq!(result.len(), 10);
    assert_eq!(result.answered_count(), 10);

    let store = InMemoryStore::new();
    run.persist(&store).await.expect("persist must succeed");
    assert_eq!(*run.state(), RunState::Persisted);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn run_with_override_extracts_only_those_keys() {
    let engine = Arc::new(
        ScriptedEngine::new(Duration::ZERO)
            .script("Invoice Number", Script::Answer("INV-2024-001"))
            .script("IBAN", Script::Answer("DE89 3704 0044 0532 0130 00")),
    );
    let config = config_with(engine).build().expect("valid config");

    let labels = vec!["Invoice Number".to_string(), "IBAN".to_string()];
    let run = run(
        &invoice_png(320, 240),
        Language::English,
        Some(&labels),
        &config,
        CancelToken::new(),
    )
    .await
    .expect("pipeline must run");

    let result = run.result().expect("result present");
    assert_eq!(result.len(), 2);
    assert_eq!(
        result.get("Invoice Number").and_then(|a| a.as_text()),
        Some("INV-2024-001")
    );
    assert_eq!(
        result.get("IBAN").and_then(|a| a.as_text()),
        Some("DE89 3704 0044 0532 0130 00")
    );
}

#[tokio::test]
async fn run_rejects_undecodable_bytes() {
    let config = ExtractionConfig::default();
    let err = run(
        b"not an image at all",
        Language::English,
        None,
        &config,
        CancelToken::new(),
    )
    .await
    .expect_err("garbage must fail at ingest");
    assert!(matches!(err, fieldlens::FieldlensError::DecodeFailed { .. }));
}
