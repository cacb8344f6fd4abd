//! The artifact store trait.

use adreel_core::{ArtifactKey, RunId, StageId};
use adreel_error::{AdreelResult, StorageError, StorageErrorKind};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Trait for pluggable artifact storage backends.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write an artifact, replacing any previous value under the key.
    async fn put(&self, key: &ArtifactKey, data: &[u8]) -> AdreelResult<StoredArtifact>;

    /// Read an artifact.
    ///
    /// Returns a `NotFound` storage error when the key is absent.
    async fn get(&self, key: &ArtifactKey) -> AdreelResult<Vec<u8>>;

    /// Check whether an artifact exists.
    async fn exists(&self, key: &ArtifactKey) -> AdreelResult<bool>;

    /// List every key written under a run's stage, outputs and debug context alike.
    ///
    /// Keys are returned sorted.
    async fn list(&self, run: &RunId, stage: StageId) -> AdreelResult<Vec<ArtifactKey>>;

    /// Local filesystem location of the key, if the backend has one.
    ///
    /// External tools that need file paths (the media merger) rely on this.
    fn local_path(&self, key: &ArtifactKey) -> Option<PathBuf>;

    /// Backend name for logs and reports.
    fn backend_name(&self) -> &'static str;
}

/// Receipt for a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Key the artifact was written under
    pub key: ArtifactKey,
    /// SHA-256 of the content
    pub content_hash: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Local path, for filesystem-backed stores
    pub location: Option<PathBuf>,
}

/// Compute the SHA-256 hex digest of data.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Reject keys that could escape the run directory or collide with debug space.
///
/// # Examples
///
/// ```
/// use adreel_core::{ArtifactKey, RunId, StageId};
/// use adreel_storage::validate_key;
///
/// let run = RunId::new("r1");
/// assert!(validate_key(&ArtifactKey::unit(&run, StageId::MergeClips, "final.mp4")).is_ok());
/// assert!(validate_key(&ArtifactKey::unit(&run, StageId::MergeClips, "../escape")).is_err());
/// assert!(validate_key(&ArtifactKey::unit(&run, StageId::MergeClips, "debug/x")).is_err());
/// assert!(validate_key(&ArtifactKey::run_record(&run, "merge_clips")).is_err());
/// ```
pub fn validate_key(key: &ArtifactKey) -> Result<(), StorageError> {
    let invalid = |reason: &str| {
        Err(StorageError::new(StorageErrorKind::InvalidKey(format!(
            "{}: {}",
            key, reason
        ))))
    };

    if !is_safe_segment(key.run.as_str()) {
        return invalid("run id must be a single non-empty path segment");
    }
    if key.unit.is_empty() {
        return invalid("unit id is empty");
    }
    if key.unit.split('/').any(|s| !is_safe_segment(s)) {
        return invalid("unit id contains an empty, relative or invalid segment");
    }
    let first = key.unit.split('/').next().unwrap_or_default();
    if !key.debug && first == "debug" {
        return invalid("unit ids may not start with the reserved `debug` segment");
    }
    if key.stage.is_none() && (key.debug || first.parse::<StageId>().is_ok()) {
        return invalid("run-level records may not shadow a stage directory");
    }
    Ok(())
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
        && !segment.ends_with(".tmp")
}
