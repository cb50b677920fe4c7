//! Collation rule sets: the single source of truth for equality, ordering,
//! and hashing of text values, threaded through WHERE predicates, DISTINCT,
//! GROUP BY, ORDER BY, index build/probe, and PK uniqueness (spec.md §4.7).

mod locale;

pub use locale::{validate_locale_tag, LocaleTable};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use unicode_normalization::UnicodeNormalization;

use crate::error::DbError;
use crate::Result;

/// The closed set of rule sets spec.md §4.7 enumerates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collation {
    Binary,
    NoCase,
    RTrim,
    UnicodeCaseInsensitive,
    /// Normalized BCP-47/POSIX tag, hyphen-separated.
    Locale(String),
}

static LOCALE_TABLE: Lazy<LocaleTable> = Lazy::new(LocaleTable::new);

impl Collation {
    /// Parses a raw locale tag (accepting `_` or `-` separators),
    /// validating its shape and rejecting the explicit invalid markers,
    /// per spec.md §4.7. Does not check the culture table — that's deferred
    /// to first use so construction alone never fails lookups.
    pub fn locale(raw_tag: &str) -> Result<Collation> {
        let normalized = validate_locale_tag(raw_tag)?;
        Ok(Collation::Locale(normalized))
    }

    fn normalized_culture(&self, tag: &str) -> Result<()> {
        if LOCALE_TABLE.contains(tag) {
            Ok(())
        } else {
            Err(DbError::UnknownLocale(tag.to_string()))
        }
    }

    /// Case/whitespace-normalized form used to build hash-index keys, so a
    /// lookup under NoCase matches regardless of input case, per spec.md
    /// §4.7's `normalizeForComparison`.
    pub fn normalize_for_comparison(&self, s: &str) -> Result<String> {
        match self {
            Collation::Binary => Ok(s.to_string()),
            Collation::NoCase => Ok(s.to_ascii_lowercase()),
            Collation::RTrim => Ok(s.trim_end_matches(' ').to_string()),
            Collation::UnicodeCaseInsensitive => Ok(s.nfkc().collect::<String>().to_lowercase()),
            Collation::Locale(tag) => {
                self.normalized_culture(tag)?;
                Ok(s.nfkc().collect::<String>().to_lowercase())
            }
        }
    }

    pub fn equals(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.normalize_for_comparison(a)? == self.normalize_for_comparison(b)?)
    }

    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering> {
        Ok(self
            .normalize_for_comparison(a)?
            .cmp(&self.normalize_for_comparison(b)?))
    }

    pub fn hash(&self, s: &str) -> Result<u64> {
        let normalized = self.normalize_for_comparison(s)?;
        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        Ok(hasher.finish())
    }

    /// Byte form usable as a B-tree key so range comparisons are plain
    /// `[u8]` lexicographic comparisons once built.
    pub fn sort_key_bytes(&self, s: &str) -> Result<Vec<u8>> {
        Ok(self.normalize_for_comparison(s)?.into_bytes())
    }

    /// Two nulls compare equal; null sorts before every string, matching
    /// the ordering `Value`'s `PartialOrd` impl already gives non-text
    /// values (spec.md §4.7).
    pub fn compare_optional(&self, a: Option<&str>, b: Option<&str>) -> Result<Ordering> {
        match (a, b) {
            (None, None) => Ok(Ordering::Equal),
            (None, Some(_)) => Ok(Ordering::Less),
            (Some(_), None) => Ok(Ordering::Greater),
            (Some(a), Some(b)) => self.compare(a, b),
        }
    }
}
