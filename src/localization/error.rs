//! Error types: collaborator failures, hard service failures, and the structured
//! error events published on the service's error stream.

use crate::localization::{LocaleId, TableId, TextKey};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an external collaborator (loader, parser, storage).
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Content '{address}' not found")]
    NotFound { address: String },

    #[error("Failed to read content '{address}': {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid table format: {0}")]
    Format(String),

    #[error("Locale storage failure: {0}")]
    Storage(String),
}

impl ContentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ContentError::Cancelled)
    }

    pub fn is_format(&self) -> bool {
        matches!(self, ContentError::Format(_))
    }
}

/// Hard failure of a service operation.
///
/// Everything else the service runs into is published as a [`LocalizationError`]
/// event instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Operation was cancelled by the caller")]
    Cancelled,

    #[error("Required localization table '{table}' could not be loaded for locale '{locale}'")]
    RequiredTableUnavailable { table: TableId, locale: LocaleId },
}

/// Classification of error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    UnsupportedLocale,
    AddressLoadFailed,
    ParseFailed,
    MissingKey,
    /// Locale storage reported a storage failure.
    PersistenceFailed,
    /// A collaborator failed in a way its contract does not describe, e.g. locale
    /// storage returning a non-storage error.
    Unknown,
}

/// A structured error event.
#[derive(Debug, Clone)]
pub struct LocalizationError {
    pub code: ErrorCode,
    pub message: String,
    pub cause: Option<Arc<ContentError>>,
    pub locale: Option<LocaleId>,
    pub table: Option<TableId>,
    pub key: Option<TextKey>,
}

impl LocalizationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            locale: None,
            table: None,
            key: None,
        }
    }

    pub fn with_cause(mut self, cause: ContentError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_locale(mut self, locale: LocaleId) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_table(mut self, table: TableId) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_key(mut self, key: TextKey) -> Self {
        self.key = Some(key);
        self
    }
}

impl fmt::Display for LocalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for LocalizationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
