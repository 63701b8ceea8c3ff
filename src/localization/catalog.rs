//! Convention-based catalog.

use crate::localization::{Catalog, LocaleId, TableId};

/// A fixed catalog with deterministic content addresses.
///
/// Addresses follow `loc_<locale>_<table>`, e.g. `loc_en_us_ui`. The full locale
/// (including region) is used so `en-US` and `en-GB` never collide.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    supported: Vec<LocaleId>,
    startup: Vec<TableId>,
    required: Vec<TableId>,
}

impl StaticCatalog {
    pub fn new(supported: Vec<LocaleId>) -> Self {
        Self {
            supported,
            startup: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn with_startup_tables(mut self, tables: Vec<TableId>) -> Self {
        self.startup = tables;
        self
    }

    pub fn with_required_tables(mut self, tables: Vec<TableId>) -> Self {
        self.required = tables;
        self
    }
}

impl Catalog for StaticCatalog {
    fn supported_locales(&self) -> Vec<LocaleId> {
        self.supported.clone()
    }

    fn startup_tables(&self) -> Vec<TableId> {
        self.startup.clone()
    }

    fn required_tables(&self) -> Vec<TableId> {
        self.required.clone()
    }

    fn content_address(&self, locale: &LocaleId, table: &TableId) -> String {
        format!(
            "loc_{}_{}",
            locale.code().to_lowercase().replace('-', "_"),
            table.name().trim().to_lowercase()
        )
    }
}
