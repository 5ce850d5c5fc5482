//! Deterministic cleanup of engine answer text.
//!
//! DocQA engines occasionally return answers with artefacts that are
//! correct from the model's perspective but noisy as field values: embedded
//! line breaks from multi-line regions, runs of spaces from token joins,
//! invisible Unicode from the source document. These rules fix the noise
//! without touching content. Each rule is a pure `&str → String` function,
//! independently testable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw engine answer.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, word joiners)
/// 2. Collapse all whitespace runs (including newlines) to single spaces
/// 3. Trim surrounding whitespace
///
/// A whitespace-only answer cleans to the empty string; the caller treats
/// that as no answer.
pub fn clean_answer(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = collapse_whitespace(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 2: Collapse whitespace runs ─────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").to_string()
}
