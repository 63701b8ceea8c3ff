//! Persistence of the last selected locale.

use crate::localization::{ContentError, LocaleId, LocaleStorage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Serialize, Deserialize)]
struct SelectedLocale {
    locale: LocaleId,
}

/// Stores the selection as a small JSON document: `{"locale": "fr-FR"}`.
#[derive(Debug, Clone)]
pub struct FileLocaleStorage {
    path: PathBuf,
}

impl FileLocaleStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LocaleStorage for FileLocaleStorage {
    async fn load_selected_locale(&self) -> Result<Option<LocaleId>, ContentError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ContentError::Storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let selected: SelectedLocale = serde_json::from_slice(&bytes).map_err(|e| {
            ContentError::Storage(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(selected.locale))
    }

    async fn save_selected_locale(&self, locale: &LocaleId) -> Result<(), ContentError> {
        let document = SelectedLocale {
            locale: locale.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| ContentError::Storage(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ContentError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        tokio::fs::write(&self.path, bytes).await.map_err(|e| {
            ContentError::Storage(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

/// Keeps the selection in memory only.
#[derive(Debug, Default)]
pub struct MemoryLocaleStorage {
    selected: Mutex<Option<LocaleId>>,
}

impl MemoryLocaleStorage {
    pub fn new(selected: Option<LocaleId>) -> Self {
        Self {
            selected: Mutex::new(selected),
        }
    }

    pub fn selected(&self) -> Option<LocaleId> {
        self.selected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LocaleStorage for MemoryLocaleStorage {
    async fn load_selected_locale(&self) -> Result<Option<LocaleId>, ContentError> {
        Ok(self.selected())
    }

    async fn save_selected_locale(&self, locale: &LocaleId) -> Result<(), ContentError> {
        *self.selected.lock().unwrap_or_else(PoisonError::into_inner) = Some(locale.clone());
        Ok(())
    }
}
