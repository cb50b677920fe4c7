//! Locale tag grammar and the culture lookup table, split out of `mod.rs` so
//! the rule-set enum doesn't carry the validation machinery inline.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::DbError;
use crate::Result;

const REJECTED_TAGS: &[&str] = &["xx", "zz", "iv", "invalid"];

/// Known cultures the engine ships a comparison/sort table for. A
/// well-formed tag not in this set still parses (spec.md §4.7 distinguishes
/// malformed-tag rejection from unknown-culture rejection) but fails at
/// first comparison with `DbError::UnknownLocale`.
static KNOWN_CULTURES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "en", "en-US", "en-GB", "en-CA", "en-AU", "fr", "fr-FR", "fr-CA", "de", "de-DE", "es",
        "es-ES", "es-MX", "it", "it-IT", "pt", "pt-BR", "pt-PT", "nl", "nl-NL", "sv", "sv-SE",
        "pl", "pl-PL", "ru", "ru-RU", "tr", "tr-TR", "ja", "ja-JP", "ko", "ko-KR", "zh", "zh-CN",
        "zh-TW",
    ]
    .into_iter()
    .collect()
});

/// Memoized culture membership table. A `HashSet` lookup is already O(1);
/// this wrapper exists so repeated `contains` calls from hot comparison
/// paths don't re-derive the static each time and so the table has a name
/// to grow into (e.g. loading a richer table at startup) without touching
/// `Collation`.
pub struct LocaleTable;

impl LocaleTable {
    pub fn new() -> Self {
        LocaleTable
    }

    pub fn contains(&self, tag: &str) -> bool {
        KNOWN_CULTURES.contains(tag)
    }
}

impl Default for LocaleTable {
    fn default() -> Self {
        Self::new()
    }
}

fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Validates and normalizes a raw locale tag: `_` is folded to `-`, the
/// language subtag must be 2-3 ASCII letters, an optional region subtag must
/// be 2 letters or 3 digits, and the explicit invalid markers are rejected
/// regardless of shape (spec.md §4.7).
pub fn validate_locale_tag(raw: &str) -> Result<String> {
    let folded = raw.replace('_', "-");
    let lower = folded.to_ascii_lowercase();

    if REJECTED_TAGS.contains(&lower.as_str())
        || lower
            .split('-')
            .any(|part| REJECTED_TAGS[..3].contains(&part))
    {
        return Err(DbError::UnknownLocale(format!(
            "locale tag '{raw}' is an explicit invalid indicator"
        )));
    }

    let parts: Vec<&str> = folded.split('-').collect();
    match parts.as_slice() {
        [language] => {
            if is_alpha(language) && (2..=3).contains(&language.len()) {
                Ok(language.to_ascii_lowercase())
            } else {
                Err(DbError::InvariantViolation(format!(
                    "locale tag '{raw}' has a malformed language subtag"
                )))
            }
        }
        [language, region] => {
            let language_ok = is_alpha(language) && (2..=3).contains(&language.len());
            let region_ok = (is_alpha(region) && region.len() == 2)
                || (is_digits(region) && region.len() == 3);
            if language_ok && region_ok {
                Ok(format!(
                    "{}-{}",
                    language.to_ascii_lowercase(),
                    region.to_ascii_uppercase()
                ))
            } else {
                Err(DbError::InvariantViolation(format!(
                    "locale tag '{raw}' has a malformed region subtag"
                )))
            }
        }
        _ => Err(DbError::InvariantViolation(format!(
            "locale tag '{raw}' has too many subtags"
        ))),
    }
}
