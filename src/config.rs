use crate::localization::{LocaleId, ServiceOptions, StaticCatalog, TableId};
use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    // Locales
    pub default_locale: LocaleId,
    pub fallback_locales: Vec<LocaleId>,
    pub supported_locales: Vec<LocaleId>,

    // Tables
    pub startup_tables: Vec<TableId>,
    pub required_tables: Vec<TableId>,

    // Storage
    pub content_dir: PathBuf,
    pub locale_file: PathBuf,

    // Runtime behavior
    pub missing_key_placeholders: bool,
    pub max_reported_missing_keys: usize,
    pub fetch_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default_locale = LocaleId::new(
            &std::env::var("LOCALIZATION_DEFAULT_LOCALE").unwrap_or_else(|_| "en-US".to_string()),
        )
        .context("LOCALIZATION_DEFAULT_LOCALE is not a valid locale code")?;

        let fallback_locales = parse_locales("LOCALIZATION_FALLBACK_LOCALES")?;

        // Supported locales always include the default one
        let mut supported_locales = parse_locales("LOCALIZATION_SUPPORTED_LOCALES")?;
        if !supported_locales.contains(&default_locale) {
            supported_locales.insert(0, default_locale.clone());
        }

        Ok(Self {
            default_locale,
            fallback_locales,
            supported_locales,

            startup_tables: parse_tables("LOCALIZATION_STARTUP_TABLES"),
            required_tables: parse_tables("LOCALIZATION_REQUIRED_TABLES"),

            content_dir: std::env::var("LOCALIZATION_CONTENT_DIR")
                .unwrap_or_else(|_| "content".to_string())
                .into(),
            locale_file: std::env::var("LOCALIZATION_LOCALE_FILE")
                .unwrap_or_else(|_| "selected_locale.json".to_string())
                .into(),

            missing_key_placeholders: std::env::var("LOCALIZATION_MISSING_KEY_PLACEHOLDERS")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            max_reported_missing_keys: std::env::var("LOCALIZATION_MAX_REPORTED_MISSING_KEYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&max: &usize| max > 0)
                .unwrap_or(4096),
            fetch_attempts: std::env::var("LOCALIZATION_FETCH_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&attempts: &u32| attempts >= 1)
                .unwrap_or(3),
        })
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            use_missing_key_placeholders: self.missing_key_placeholders,
            max_reported_missing_keys: self.max_reported_missing_keys,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.fetch_attempts,
            ..RetryConfig::content_fetch()
        }
    }

    pub fn catalog(&self) -> StaticCatalog {
        StaticCatalog::new(self.supported_locales.clone())
            .with_startup_tables(self.startup_tables.clone())
            .with_required_tables(self.required_tables.clone())
    }
}

/// Comma-separated list items, trimmed, empty items dropped.
fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_locales(var: &str) -> Result<Vec<LocaleId>> {
    let Ok(value) = std::env::var(var) else {
        return Ok(Vec::new());
    };

    let mut locales: Vec<LocaleId> = Vec::new();
    for code in split_list(&value) {
        let locale = LocaleId::new(code)
            .with_context(|| format!("{} contains an invalid locale code: '{}'", var, code))?;
        if !locales.contains(&locale) {
            locales.push(locale);
        }
    }
    Ok(locales)
}

fn parse_tables(var: &str) -> Vec<TableId> {
    let value = std::env::var(var).unwrap_or_default();
    let mut tables: Vec<TableId> = Vec::new();
    for name in split_list(&value) {
        let table = TableId::new(name);
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    tables
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
