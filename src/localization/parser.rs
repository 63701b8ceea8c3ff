//! JSON table format.
//!
//! ```json
//! {
//!   "locale": "en-US",
//!   "table": "UI",
//!   "entries": { "MainMenu.Title": "Ultimate Tic-Tac-Toe" }
//! }
//! ```
//!
//! `locale` and `table` are optional metadata; when present they must match the
//! locale and table the content was requested for.

use crate::localization::{ContentError, LocaleId, Table, TableId, TableParser, TextKey};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct TablePayload {
    locale: Option<String>,
    table: Option<String>,
    entries: Option<Value>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTableParser;

impl JsonTableParser {
    pub fn new() -> Self {
        Self
    }
}

impl TableParser for JsonTableParser {
    fn parse(
        &self,
        bytes: &[u8],
        expected_locale: &LocaleId,
        expected_table: &TableId,
    ) -> Result<Table, ContentError> {
        if bytes.is_empty() {
            return Err(ContentError::Format("payload is empty".to_string()));
        }

        let root: Value = serde_json::from_slice(bytes)
            .map_err(|e| ContentError::Format(format!("invalid JSON: {}", e)))?;
        if !root.is_object() {
            return Err(ContentError::Format("root must be an object".to_string()));
        }
        let payload: TablePayload = serde_json::from_value(root)
            .map_err(|e| ContentError::Format(format!("invalid table metadata: {}", e)))?;

        if let Some(locale) = payload.locale.as_deref() {
            let embedded = LocaleId::new(locale).map_err(|e| {
                ContentError::Format(format!("invalid embedded locale '{}': {}", locale, e))
            })?;
            if &embedded != expected_locale {
                return Err(ContentError::Format(format!(
                    "Locale mismatch: expected '{}', found '{}'",
                    expected_locale, embedded
                )));
            }
        }

        if let Some(table) = payload.table.as_deref() {
            if table != expected_table.name() {
                return Err(ContentError::Format(format!(
                    "Table mismatch: expected '{}', found '{}'",
                    expected_table, table
                )));
            }
        }

        let entries = payload
            .entries
            .ok_or_else(|| ContentError::Format("missing 'entries'".to_string()))?;
        let entries = entries
            .as_object()
            .ok_or_else(|| ContentError::Format("'entries' must be an object".to_string()))?;

        let mut templates = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            let template = value.as_str().ok_or_else(|| {
                ContentError::Format(format!("entry '{}' must be a string", key))
            })?;
            templates.insert(TextKey::new(key), template.to_string());
        }

        Ok(Table::new(
            expected_locale.clone(),
            expected_table.clone(),
            templates,
        ))
    }
}
