//! Credential lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::document::{load_credentials, CredentialMap};
use crate::credentials::model::Credential;

/// Errors raised by credential stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse credentials: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid credentials: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// The backing store could not answer.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only lookup of credential records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a credential by association id.
    async fn find(&self, id: &str) -> StoreResult<Option<Arc<Credential>>>;
}

/// In-memory store, optionally backed by a credentials file.
///
/// Lookups never block reloads: the record map is swapped atomically.
pub struct StaticCredentialStore {
    records: ArcSwap<CredentialMap>,
    path: Option<PathBuf>,
}

impl StaticCredentialStore {
    /// Build a store from already-resolved records.
    pub fn new(records: impl IntoIterator<Item = Credential>) -> Self {
        let map = records
            .into_iter()
            .map(|c| (c.id.clone(), Arc::new(c)))
            .collect::<CredentialMap>();
        Self {
            records: ArcSwap::from_pointee(map),
            path: None,
        }
    }

    /// Load from a credentials file; the path is remembered for [`reload`](Self::reload).
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let map = load_credentials(path)?;
        tracing::info!(path = ?path, credentials = map.len(), "Credentials loaded");
        Ok(Self {
            records: ArcSwap::from_pointee(map),
            path: Some(path.to_path_buf()),
        })
    }

    /// Re-read the backing file. On error the current records stay in place.
    pub fn reload(&self) -> StoreResult<usize> {
        let Some(path) = &self.path else {
            return Ok(self.len());
        };
        let map = load_credentials(path)?;
        let count = map.len();
        self.records.store(Arc::new(map));
        Ok(count)
    }

    /// Replace every record at once.
    pub fn replace(&self, records: impl IntoIterator<Item = Credential>) {
        let map = records
            .into_iter()
            .map(|c| (c.id.clone(), Arc::new(c)))
            .collect::<CredentialMap>();
        self.records.store(Arc::new(map));
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn find(&self, id: &str) -> StoreResult<Option<Arc<Credential>>> {
        Ok(self.records.load().get(id).cloned())
    }
}
