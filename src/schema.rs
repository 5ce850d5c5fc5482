//! Key schema resolution: which fields to extract, in which order.
//!
//! A [`KeySchema`] is the ordered, de-duplicated list of field labels the
//! extraction engine will turn into questions. It comes from one of two
//! places: a language-keyed default set (ten invoice field labels per
//! supported language) or a caller-supplied override list. Once resolved a
//! schema is immutable; the extraction result always carries exactly one
//! entry per schema key, in schema order.
//!
//! ## Blank-token policy
//!
//! What to do with an override like `"Invoice Number,, ,Total"` is a policy
//! choice, not a guess: [`OverridePolicy::Strict`] rejects blank tokens
//! loudly, [`OverridePolicy::FallbackToDefaults`] drops them and falls back
//! to the language defaults if nothing survives. Both behaviours are explicit
//! and tested; `Strict` is the default.

use crate::error::FieldlensError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Languages with a built-in default field set.
///
/// This is a closed enumeration: default keys are defined for exactly these
/// three values and callers select one explicitly (the CLI exposes them as
/// `--language english|french|arabic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    French,
    Arabic,
}

impl Language {
    /// All supported languages, in a stable order.
    pub const ALL: [Language; 3] = [Language::English, Language::French, Language::Arabic];

    /// Lowercase identifier used on the CLI and in serialised output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::French => "french",
            Language::Arabic => "arabic",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = FieldlensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "french" | "fr" => Ok(Language::French),
            "arabic" | "ar" => Ok(Language::Arabic),
            other => Err(FieldlensError::InvalidConfig(format!(
                "unknown language '{other}' (expected english, french, or arabic)"
            ))),
        }
    }
}

/// The ten default invoice field labels for a language.
///
/// The lists are fixed: same labels, same order, on every call.
pub fn default_keys(language: Language) -> [&'static str; 10] {
    match language {
        Language::English => [
            "Invoice Number",
            "Total Amount",
            "Due Date",
            "Vendor",
            "Billing Address",
            "Client/Company Name",
            "Purchase Order Number (P.O. Number)",
            "Invoice Date",
            "Description/Item Details",
            "Tax Information",
        ],
        Language::French => [
            "Numéro de la facture",
            "Montant total",
            "Date d'échéance",
            "Vendeur",
            "Adresse de facturation",
            "Nom du client/de l'entreprise",
            "Numéro de commande (Numéro de bon de commande)",
            "Date de la facture",
            "Détails de l'article/description",
            "Informations fiscales",
        ],
        Language::Arabic => [
            "رقم الفاتورة",
            "المبلغ الإجمالي",
            "تاريخ الاستحقاق",
            "البائع",
            "عنوان الفواتير",
            "اسم العميل/الشركة",
            "رقم أمر الشراء (P.O. Number)",
            "تاريخ الفاتورة",
            "تفاصيل السلعة/الوصف",
            "معلومات الضرائب",
        ],
    }
}

/// How to treat blank tokens in a schema override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// A blank token anywhere in the override is an error. (default)
    #[default]
    Strict,
    /// Blank tokens are dropped; if nothing survives, the language defaults
    /// are used as if no override had been supplied.
    FallbackToDefaults,
}

/// Where a resolved schema's keys came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    /// The built-in default list for the schema's language.
    Defaults,
    /// A caller-supplied override list.
    Override,
}

/// An ordered, validated list of unique field labels tagged with a language.
///
/// Invariants (enforced at construction, relied upon everywhere else):
/// at least one key, no duplicates, no blank labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    keys: Vec<String>,
    language: Language,
    source: SchemaSource,
}

impl KeySchema {
    /// Resolve a schema from the language defaults or an override list.
    ///
    /// A present, non-empty-after-validation override replaces the defaults
    /// with its order preserved; otherwise the default list for `language`
    /// is used. Tokens are trimmed of surrounding whitespace before
    /// validation. Duplicate labels are rejected in both policies; blank
    /// labels follow `policy`.
    pub fn resolve(
        language: Language,
        override_labels: Option<&[String]>,
        policy: OverridePolicy,
    ) -> Result<Self, FieldlensError> {
        let labels = match override_labels {
            Some(labels) if !labels.is_empty() => labels,
            _ => {
                debug!(%language, "no override supplied, using default keys");
                return Ok(Self::from_defaults(language));
            }
        };

        let mut keys = Vec::with_capacity(labels.len());
        for (position, raw) in labels.iter().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                match policy {
                    OverridePolicy::Strict => {
                        return Err(FieldlensError::BlankKey { position });
                    }
                    OverridePolicy::FallbackToDefaults => continue,
                }
            }
            keys.push(trimmed.to_string());
        }

        if keys.is_empty() {
            // Only reachable under FallbackToDefaults: every token was blank.
            debug!(%language, "override empty after validation, using default keys");
            return Ok(Self::from_defaults(language));
        }

        Self::from_keys(language, keys, SchemaSource::Override)
    }

    /// The default schema for a language.
    pub fn from_defaults(language: Language) -> Self {
        KeySchema {
            keys: default_keys(language).iter().map(|k| k.to_string()).collect(),
            language,
            source: SchemaSource::Defaults,
        }
    }

    /// Build a schema from explicit keys, validating the invariants.
    pub fn from_keys(
        language: Language,
        keys: Vec<String>,
        source: SchemaSource,
    ) -> Result<Self, FieldlensError> {
        if keys.is_empty() {
            return Err(FieldlensError::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(keys.len());
        for key in &keys {
            if key.trim().is_empty() {
                return Err(FieldlensError::BlankKey {
                    position: keys.iter().position(|k| k == key).unwrap_or(0),
                });
            }
            if !seen.insert(key.as_str()) {
                return Err(FieldlensError::DuplicateKey { key: key.clone() });
            }
        }
        Ok(KeySchema {
            keys,
            language,
            source,
        })
    }

    /// The field labels, in extraction order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of fields in the schema. Always ≥ 1.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn source(&self) -> SchemaSource {
        self.source
    }
}

/// Split a delimited override string into raw label tokens.
///
/// Tokens are trimmed but otherwise untouched — blank tokens are kept so the
/// [`OverridePolicy`] applied by [`KeySchema::resolve`] can see them.
pub fn parse_override(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter).map(|t| t.trim().to_string()).collect()
}
