//! Immutable text table snapshots.

use crate::localization::{LocaleId, TableId, TextKey};
use std::collections::HashMap;

/// A parsed table: every raw template of one (locale, table) pair.
///
/// Tables are never mutated after construction. Reloading a locale/table pair
/// replaces the whole snapshot in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    locale: LocaleId,
    id: TableId,
    entries: HashMap<TextKey, String>,
}

impl Table {
    pub fn new(locale: LocaleId, id: TableId, entries: HashMap<TextKey, String>) -> Self {
        Self { locale, id, entries }
    }

    pub fn locale(&self) -> &LocaleId {
        &self.locale
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    /// Raw template for `key`, unformatted.
    pub fn template(&self, key: &TextKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TextKey> {
        self.entries.keys()
    }
}
