//! Identifier types: the vocabulary shared by every other localization component.
//!
//! `LocaleId`, `TableId` and `TextKey` are small immutable value types. They compare
//! by value and are cheap to clone, so they can be used freely as map keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Error raised when an identifier cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Locale code must be non-empty")]
    EmptyLocale,

    #[error("Invalid locale code '{0}'")]
    InvalidLocale(String),
}

/// A normalized locale code (e.g. `en-US`, `fr`, `zh-Hant-TW`).
///
/// Codes are normalized on construction:
/// - surrounding whitespace is trimmed and `_` separators become `-`
/// - the language subtag is lowercased
/// - 2-letter region subtags are uppercased
/// - 4-letter script subtags are title-cased
/// - everything else is lowercased
///
/// so `"en_us"`, `"EN-us"` and `"en-US"` all produce the same `LocaleId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocaleId {
    code: Arc<str>,
}

impl LocaleId {
    /// Create a locale from a code string.
    ///
    /// # Returns
    /// * `Ok(LocaleId)` with the normalized code
    /// * `Err(IdError::EmptyLocale)` if the code is empty or whitespace
    /// * `Err(IdError::InvalidLocale)` if a subtag is empty or not alphanumeric
    pub fn new(code: &str) -> Result<Self, IdError> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(IdError::EmptyLocale);
        }

        let mut normalized = String::with_capacity(trimmed.len());
        for (index, subtag) in trimmed.split(['-', '_']).enumerate() {
            if subtag.is_empty() || !subtag.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(IdError::InvalidLocale(trimmed.to_string()));
            }

            if index > 0 {
                normalized.push('-');
            }
            normalized.push_str(&normalize_subtag(index, subtag));
        }

        Ok(Self {
            code: Arc::from(normalized),
        })
    }

    /// The normalized locale code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The language subtag (e.g. `en` for `en-US`).
    pub fn language(&self) -> &str {
        self.code.split('-').next().unwrap_or(&self.code)
    }

    /// Derive the language-only locale.
    ///
    /// # Returns
    /// * `Some(LocaleId)` for codes with more than one subtag (`en-US` → `en`)
    /// * `None` when the code already is language-only
    pub fn language_only(&self) -> Option<LocaleId> {
        if !self.code.contains('-') {
            return None;
        }

        Some(Self {
            code: Arc::from(self.language()),
        })
    }
}

fn normalize_subtag(index: usize, subtag: &str) -> String {
    if index == 0 {
        return subtag.to_ascii_lowercase();
    }

    match subtag.len() {
        2 if subtag.chars().all(|c| c.is_ascii_alphabetic()) => subtag.to_ascii_uppercase(),
        4 if subtag.chars().all(|c| c.is_ascii_alphabetic()) => {
            let lower = subtag.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => lower,
            }
        }
        _ => subtag.to_ascii_lowercase(),
    }
}

impl fmt::Display for LocaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl FromStr for LocaleId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LocaleId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<LocaleId> for String {
    fn from(value: LocaleId) -> Self {
        value.code.to_string()
    }
}

/// A named group of related text keys (e.g. `UI`, `Errors`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TableId(Arc<str>);

impl TableId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Blank table names are accepted but never tracked for locale switches.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TableId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<TableId> for String {
    fn from(value: TableId) -> Self {
        value.0.to_string()
    }
}

/// A dotted key inside a table (e.g. `MainMenu.Title`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TextKey(Arc<str>);

impl TextKey {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TextKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TextKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<TextKey> for String {
    fn from(value: TextKey) -> Self {
        value.0.to_string()
    }
}
