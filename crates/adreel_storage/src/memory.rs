//! In-memory artifact store for testing.
//!
//! Stores artifacts in a map protected by an RwLock. All data is lost when
//! the store is dropped.

use crate::{ArtifactStore, StoredArtifact, content_hash, validate_key};
use adreel_core::{ArtifactKey, RunId, StageId};
use adreel_error::{AdreelResult, StorageError, StorageErrorKind};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory artifact store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Arc<RwLock<BTreeMap<ArtifactKey, Vec<u8>>>>,
    writes: Arc<RwLock<u64>>,
}

impl InMemoryArtifactStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts (for testing).
    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    /// Check if the store is empty (for testing).
    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }

    /// Total number of `put` calls so far, including overwrites (for testing).
    pub async fn write_count(&self) -> u64 {
        *self.writes.read().await
    }
}

#[async_trait::async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &ArtifactKey, data: &[u8]) -> AdreelResult<StoredArtifact> {
        validate_key(key)?;
        self.artifacts.write().await.insert(key.clone(), data.to_vec());
        *self.writes.write().await += 1;
        Ok(StoredArtifact {
            key: key.clone(),
            content_hash: content_hash(data),
            size_bytes: data.len() as u64,
            location: None,
        })
    }

    async fn get(&self, key: &ArtifactKey) -> AdreelResult<Vec<u8>> {
        validate_key(key)?;
        self.artifacts
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::new(StorageErrorKind::NotFound(key.to_string())).into())
    }

    async fn exists(&self, key: &ArtifactKey) -> AdreelResult<bool> {
        validate_key(key)?;
        Ok(self.artifacts.read().await.contains_key(key))
    }

    async fn list(&self, run: &RunId, stage: StageId) -> AdreelResult<Vec<ArtifactKey>> {
        Ok(self
            .artifacts
            .read()
            .await
            .keys()
            .filter(|k| &k.run == run && k.stage == Some(stage))
            .cloned()
            .collect())
    }

    fn local_path(&self, _key: &ArtifactKey) -> Option<PathBuf> {
        None
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
