//! CLI binary for fieldlens.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, renders progress, and prints or persists results.

use anyhow::{Context, Result};
use clap::Parser;
use fieldlens::{
    parse_override, CancelToken, ExtractionConfig, ExtractionProgress, ExtractionRun, FieldAnswer,
    HttpDocumentStore, Language, OverridePolicy, ProgressCallback, RunStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus per-field log lines.
/// Fields complete out of order under concurrency; the bar position follows
/// the engine's monotonic completed count, so it never moves backwards.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_extraction_start
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>2}/{len} fields  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgress for CliProgress {
    fn on_extraction_start(&self, total_fields: usize) {
        self.bar.set_length(total_fields as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_fields} fields…"))
        ));
    }

    fn on_field_start(&self, key: &str) {
        self.bar.set_message(key.to_string());
    }

    fn on_field_complete(&self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }

    fn on_field_error(&self, key: &str, error: &str) {
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), key, dim(&msg)));
    }

    fn on_extraction_complete(&self, status: RunStatus, answered: usize, total: usize) {
        self.bar.finish_and_clear();
        match status {
            RunStatus::Completed => eprintln!(
                "{} {}/{} fields answered",
                green("✔"),
                bold(&answered.to_string()),
                total
            ),
            RunStatus::Cancelled => eprintln!(
                "{} cancelled — {}/{} fields answered",
                red("✘"),
                bold(&answered.to_string()),
                total
            ),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract the default English invoice fields
  fieldlens invoice.png

  # French defaults, JSON output
  fieldlens --language french --json facture.jpg

  # Custom field list (comma-separated, order preserved)
  fieldlens --keys "Invoice Number, Total Amount, IBAN" invoice.png

  # Write the result to a file
  fieldlens invoice.png -o result.json

  # Persist to a document store collection
  fieldlens invoice.png --persist --store-url http://localhost:9200 --collection invoices

ENVIRONMENT VARIABLES:
  FIELDLENS_QA_URL      DocQA inference endpoint (required unless --engine-url)
  FIELDLENS_STORE_URL   Document store base URL

SETUP:
  1. Point at an engine:   export FIELDLENS_QA_URL=http://localhost:8080/qa
  2. Extract:              fieldlens invoice.png
"#;

/// Extract key/value fields from a scanned document image.
#[derive(Parser, Debug)]
#[command(
    name = "fieldlens",
    version,
    about = "Extract key/value fields from scanned document images using Document-QA models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the document image (PNG or JPEG).
    input: PathBuf,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "FIELDLENS_OUTPUT")]
    output: Option<PathBuf>,

    /// Language of the default field set.
    #[arg(long, env = "FIELDLENS_LANGUAGE", value_enum, default_value = "english")]
    language: LanguageArg,

    /// Comma-separated field labels overriding the defaults.
    #[arg(long, env = "FIELDLENS_KEYS")]
    keys: Option<String>,

    /// Drop blank override tokens instead of rejecting them (falls back to
    /// the language defaults if nothing survives).
    #[arg(long)]
    allow_blank_keys: bool,

    /// DocQA inference endpoint URL.
    #[arg(long, env = "FIELDLENS_QA_URL")]
    engine_url: Option<String>,

    /// Number of concurrent engine calls.
    #[arg(short, long, env = "FIELDLENS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per field on engine failure.
    #[arg(long, env = "FIELDLENS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-field engine call timeout in seconds.
    #[arg(long, env = "FIELDLENS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Custom question template containing {key}.
    #[arg(long, env = "FIELDLENS_QUESTION_TEMPLATE")]
    question_template: Option<String>,

    /// Persist the result to the document store after extraction.
    #[arg(long)]
    persist: bool,

    /// Document store base URL (required with --persist).
    #[arg(long, env = "FIELDLENS_STORE_URL")]
    store_url: Option<String>,

    /// Document store collection name.
    #[arg(long, env = "FIELDLENS_COLLECTION", default_value = "extractions")]
    collection: String,

    /// Output the full structured result as JSON instead of a field table.
    #[arg(long, env = "FIELDLENS_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "FIELDLENS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FIELDLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "FIELDLENS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LanguageArg {
    English,
    French,
    Arabic,
}

impl From<LanguageArg> for Language {
    fn from(v: LanguageArg) -> Self {
        match v {
            LanguageArg::English => Language::English,
            LanguageArg::French => Language::French,
            LanguageArg::Arabic => Language::Arabic,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback that matters; suppress INFO
    // logs while it is active.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let policy = if cli.allow_blank_keys {
        OverridePolicy::FallbackToDefaults
    } else {
        OverridePolicy::Strict
    };

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as ProgressCallback)
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .override_policy(policy);
    if let Some(ref url) = cli.engine_url {
        builder = builder.engine_url(url.clone());
    }
    if let Some(ref template) = cli.question_template {
        builder = builder.question_template(template.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let override_labels = cli.keys.as_deref().map(|raw| parse_override(raw, ','));

    // ── Ctrl-C → cooperative cancellation ────────────────────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", dim("cancelling — in-flight fields will finish"));
                cancel.cancel();
            }
        });
    }

    // ── Run the pipeline ─────────────────────────────────────────────────
    let mut run = ExtractionRun::new();
    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read image '{}'", cli.input.display()))?;
    run.ingest(&bytes).context("Image validation failed")?;
    run.preprocess().context("Preprocessing failed")?;
    run.resolve_schema(cli.language.into(), override_labels.as_deref(), policy)
        .context("Schema resolution failed")?;
    run.extract(&config, cancel).await.context("Extraction failed")?;

    let result = run
        .result()
        .context("Extraction produced no result")?
        .clone();

    // ── Print result ─────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
    } else {
        for field in &result.fields {
            match &field.answer {
                FieldAnswer::Answered(text) => {
                    println!("{}  {}", bold(&format!("{:<40}", field.key)), text)
                }
                FieldAnswer::NoAnswer => println!(
                    "{}  {}",
                    bold(&format!("{:<40}", field.key)),
                    dim("(no answer)")
                ),
            }
        }
    }

    if let Some(ref output_path) = cli.output {
        write_json_atomically(output_path, &result)?;
        if !cli.quiet {
            eprintln!("{} wrote {}", green("✔"), bold(&output_path.display().to_string()));
        }
    }

    // ── Persist (explicitly gated) ───────────────────────────────────────
    if cli.persist {
        let store_url = cli
            .store_url
            .as_deref()
            .context("--persist requires --store-url (or FIELDLENS_STORE_URL)")?;
        let store = HttpDocumentStore::new(store_url, cli.collection.clone(), cli.api_timeout)
            .context("Failed to build store client")?;
        let record = run.persist(&store).await.context("Persist failed")?;
        if !cli.quiet {
            eprintln!(
                "{} persisted as {} in '{}'",
                green("✔"),
                bold(&record.id),
                record.collection
            );
        }
    }

    Ok(())
}

/// Write the JSON result via temp file + rename to avoid partial files.
fn write_json_atomically(path: &PathBuf, result: &fieldlens::ExtractionResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(result).context("Failed to serialise result")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write '{}'", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move result into '{}'", path.display()))?;
    Ok(())
}
