//! Content loaders: filesystem, in-memory bundle, and a retrying wrapper.

use crate::localization::{ContentError, ContentLoader};
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reads `<root>/<address>.json`.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, address: &str) -> PathBuf {
        self.root.join(format!("{}.json", address))
    }
}

#[async_trait]
impl ContentLoader for FsLoader {
    async fn fetch_bytes(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ContentError> {
        let path = self.path_for(address);
        debug!("Reading localization content from {}", path.display());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ContentError::Cancelled),
            result = tokio::fs::read(&path) => result.map_err(|source| {
                if source.kind() == ErrorKind::NotFound {
                    ContentError::NotFound { address: address.to_string() }
                } else {
                    ContentError::Io { address: address.to_string(), source }
                }
            }),
        }
    }
}

/// Serves content from memory, e.g. bytes embedded with `include_bytes!`.
///
/// Tracks outstanding fetches per address so reference-counting behavior can be
/// verified.
#[derive(Debug, Default)]
pub struct BundleLoader {
    content: HashMap<String, Arc<[u8]>>,
    outstanding: Mutex<HashMap<String, usize>>,
}

impl BundleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, address: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        self.content.insert(address.into(), Arc::from(bytes));
        self
    }

    /// Fetches of `address` that have not been released yet.
    pub fn outstanding(&self, address: &str) -> usize {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ContentLoader for BundleLoader {
    async fn fetch_bytes(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ContentError> {
        if cancel.is_cancelled() {
            return Err(ContentError::Cancelled);
        }

        *self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_string())
            .or_insert(0) += 1;

        self.content
            .get(address)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| ContentError::NotFound {
                address: address.to_string(),
            })
    }

    fn release(&self, address: &str) {
        let mut outstanding = self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = outstanding.get_mut(address) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Retries transient failures of an inner loader with exponential backoff.
pub struct RetryingLoader<L> {
    inner: L,
    config: RetryConfig,
}

impl<L: ContentLoader> RetryingLoader<L> {
    pub fn new(inner: L, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

/// Only I/O failures are transient; missing content and bad payloads will not
/// change on a second attempt.
fn is_retryable(error: &ContentError) -> bool {
    matches!(error, ContentError::Io { .. })
}

#[async_trait]
impl<L: ContentLoader> ContentLoader for RetryingLoader<L> {
    async fn fetch_bytes(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ContentError> {
        let result = with_retry_if(
            &self.config,
            &format!("Fetch '{}'", address),
            cancel,
            || self.inner.fetch_bytes(address, cancel),
            is_retryable,
        )
        .await;

        match result {
            Err(_) if cancel.is_cancelled() => Err(ContentError::Cancelled),
            other => other,
        }
    }

    fn release(&self, address: &str) {
        self.inner.release(address);
    }
}
