//! Interfaces to the externally-owned subsystems the service orchestrates.
//!
//! Each trait is a seam: the crate ships default adapters (see `catalog`,
//! `loader`, `parser`, `storage` and `formatter`), and applications can plug in
//! their own content pipeline by implementing these traits.

use crate::localization::{ContentError, LocaleId, Table, TableId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Enumerates supported locales and tables and maps them to content addresses.
pub trait Catalog: Send + Sync {
    fn supported_locales(&self) -> Vec<LocaleId>;

    /// Tables eagerly preloaded at startup; failures are not fatal.
    fn startup_tables(&self) -> Vec<TableId>;

    /// Tables that must load for initialization to succeed.
    fn required_tables(&self) -> Vec<TableId>;

    /// Deterministic content address for a (locale, table) pair.
    fn content_address(&self, locale: &LocaleId, table: &TableId) -> String;
}

/// Fetches raw table bytes.
#[async_trait]
pub trait ContentLoader: Send + Sync {
    /// Fetch the bytes stored at `address`.
    ///
    /// Must return `ContentError::Cancelled` (not another error) when `cancel`
    /// fires before the fetch completes.
    async fn fetch_bytes(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ContentError>;

    /// Called once after every fetch attempt, successful or not, for
    /// reference-counted content systems.
    fn release(&self, _address: &str) {}
}

/// Turns raw bytes into a table.
pub trait TableParser: Send + Sync {
    fn parse(
        &self,
        bytes: &[u8],
        expected_locale: &LocaleId,
        expected_table: &TableId,
    ) -> Result<Table, ContentError>;
}

/// Persists the user's last selected locale.
#[async_trait]
pub trait LocaleStorage: Send + Sync {
    async fn load_selected_locale(&self) -> Result<Option<LocaleId>, ContentError>;

    async fn save_selected_locale(&self, locale: &LocaleId) -> Result<(), ContentError>;
}

/// Formats a raw template with arguments.
///
/// Implementations must be pure and must not panic on missing arguments.
pub trait TextFormatter: Send + Sync {
    fn format(&self, template: &str, locale: &LocaleId, args: Option<&TextArgs>) -> String;
}

/// Named format arguments, passed opaquely to the formatter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextArgs(BTreeMap<String, String>);

impl TextArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, returning the updated set.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for TextArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.to_string()))
                .collect(),
        )
    }
}
