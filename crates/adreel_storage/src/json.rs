//! JSON helpers over any store.

use crate::ArtifactStore;
use adreel_core::ArtifactKey;
use adreel_error::{AdreelResult, JsonError};
use serde::{Serialize, de::DeserializeOwned};

/// Serialize a value as pretty JSON and store it.
pub async fn put_json<S, T>(store: &S, key: &ArtifactKey, value: &T) -> AdreelResult<()>
where
    S: ArtifactStore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| JsonError::new(format!("Failed to serialize {}: {}", key, e)))?;
    store.put(key, &bytes).await?;
    Ok(())
}

/// Load and deserialize a JSON artifact.
///
/// Storage errors (including `NotFound`) pass through unchanged so callers
/// can tell an absent artifact from a corrupt one.
pub async fn get_json<S, T>(store: &S, key: &ArtifactKey) -> AdreelResult<T>
where
    S: ArtifactStore + ?Sized,
    T: DeserializeOwned,
{
    let bytes = store.get(key).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!(key = %key, error = %e, "Stored artifact failed to deserialize");
        JsonError::new(format!("Failed to deserialize {}: {}", key, e)).into()
    })
}
