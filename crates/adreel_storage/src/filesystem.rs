//! Filesystem-backed artifact store.
//!
//! Keys map directly onto directories under a root, so a run can be browsed
//! and replayed by hand.

use crate::{ArtifactStore, StoredArtifact, content_hash, validate_key};
use adreel_core::{ArtifactKey, RunId, StageId};
use adreel_error::{AdreelResult, StorageError, StorageErrorKind};
use std::path::{Path, PathBuf};

/// Filesystem storage backend.
///
/// # Example Structure
///
/// ```text
/// /var/adreel/runs/
/// └── acme_0101_1200/
///     ├── generate_scene_prompts/
///     │   ├── output
///     │   └── debug/
///     │       └── scene_prompts.json
///     └── generate_first_frames/
///         ├── output
///         ├── scene_1.png
///         └── debug/
///             └── scene_1.json
/// ```
///
/// Writes go to a uniquely named temp file first and are renamed into
/// place, so readers never observe a partial artifact.
#[derive(Debug, Clone)]
pub struct FileSystemArtifactStore {
    base_path: PathBuf,
}

impl FileSystemArtifactStore {
    /// Create a new filesystem store rooted at `base_path`.
    ///
    /// Creates the base directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    #[tracing::instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> AdreelResult<Self> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;

        tracing::info!(path = %base_path.display(), "Created filesystem artifact store");
        Ok(Self { base_path })
    }

    /// Root directory of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        key.segments()
            .into_iter()
            .fold(self.base_path.clone(), |path, segment| path.join(segment))
    }

    fn stage_dir(&self, run: &RunId, stage: StageId) -> PathBuf {
        self.base_path.join(run.as_str()).join(stage.name())
    }
}

/// Remove a partially written temp file after a failed put.
async fn discard_temp(temp_path: &Path) {
    match tokio::fs::remove_file(temp_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %temp_path.display(),
            error = %e,
            "Failed to remove temp file"
        ),
    }
}

#[async_trait::async_trait]
impl ArtifactStore for FileSystemArtifactStore {
    #[tracing::instrument(skip(self, data), fields(key = %key, size = data.len()))]
    async fn put(&self, key: &ArtifactKey, data: &[u8]) -> AdreelResult<StoredArtifact> {
        validate_key(key)?;
        let path = self.path_for(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        // Write to temp file first, then rename for atomicity
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name,
            uuid::Uuid::new_v4().simple()
        ));
        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            discard_temp(&temp_path).await;
            return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
            .into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            discard_temp(&temp_path).await;
            return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            )))
            .into());
        }

        let hash = content_hash(data);
        tracing::debug!(
            hash = %hash,
            path = %path.display(),
            "Stored artifact"
        );

        Ok(StoredArtifact {
            key: key.clone(),
            content_hash: hash,
            size_bytes: data.len() as u64,
            location: Some(path),
        })
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &ArtifactKey) -> AdreelResult<Vec<u8>> {
        validate_key(key)?;
        let path = self.path_for(key);

        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::new(StorageErrorKind::NotFound(key.to_string()))
            } else {
                StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        })?;

        Ok(data)
    }

    async fn exists(&self, key: &ArtifactKey) -> AdreelResult<bool> {
        validate_key(key)?;
        let path = self.path_for(key);
        tokio::fs::try_exists(&path).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()
        })
    }

    #[tracing::instrument(skip(self), fields(run = %run, stage = %stage))]
    async fn list(&self, run: &RunId, stage: StageId) -> AdreelResult<Vec<ArtifactKey>> {
        let root = self.stage_dir(run, stage);
        let mut keys = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::new(StorageErrorKind::Listing(format!(
                        "{}: {}",
                        dir.display(),
                        e
                    )))
                    .into());
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StorageError::new(StorageErrorKind::Listing(format!(
                    "{}: {}",
                    dir.display(),
                    e
                )))
            })? {
                let path = entry.path();
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    pending.push(path);
                    continue;
                }
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                if let Some(key) = key_from_relative(run, stage, &root, &path) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn local_path(&self, key: &ArtifactKey) -> Option<PathBuf> {
        validate_key(key).ok()?;
        Some(self.path_for(key))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

fn key_from_relative(run: &RunId, stage: StageId, root: &Path, path: &Path) -> Option<ArtifactKey> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    match segments.split_first() {
        Some((first, rest)) if first == "debug" && !rest.is_empty() => {
            Some(ArtifactKey::debug(run, stage, rest.join("/")))
        }
        Some(_) => Some(ArtifactKey::unit(run, stage, segments.join("/"))),
        None => None,
    }
}
