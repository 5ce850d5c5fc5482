//! Question synthesis for schema keys.
//!
//! Centralising the template here keeps wording changes in one place and
//! lets tests inspect the exact question a key produces without running an
//! engine. The default can be overridden per run via
//! [`crate::config::ExtractionConfig::question_template`]; `{key}` marks
//! where the field label is substituted.

/// Default question template applied to every schema key.
pub const DEFAULT_QUESTION_TEMPLATE: &str = "What is the {key}?";

/// Placeholder that a custom template must contain.
pub const KEY_PLACEHOLDER: &str = "{key}";

/// Render the question for one schema key.
pub fn question_for(template: &str, key: &str) -> String {
    template.replace(KEY_PLACEHOLDER, key)
}
