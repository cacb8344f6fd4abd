//! Run-scoped artifact storage for adreel.
//!
//! Every stage output (text, structured records, images, clips) and every
//! unit's debug context lives under a hierarchical key:
//!
//! ```text
//! {run-id}/{stage}/{unit-id}
//! {run-id}/{stage}/debug/{unit-id}
//! ```
//!
//! Stores are append/overwrite-by-key. Concurrent units write disjoint keys,
//! so backends need no locking beyond atomic single-key writes.
//!
//! # Example
//!
//! ```rust
//! use adreel_core::{ArtifactKey, RunId, StageId};
//! use adreel_storage::{ArtifactStore, FileSystemArtifactStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileSystemArtifactStore::new("/tmp/adreel")?;
//! let run = RunId::new("acme_0101_1200");
//! let key = ArtifactKey::unit(&run, StageId::GenerateFirstFrames, "scene_1.png");
//!
//! store.put(&key, &[0u8; 16]).await?;
//! assert!(store.exists(&key).await?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod filesystem;
mod json;
mod memory;
mod store;

pub use adreel_error::{StorageError, StorageErrorKind};
pub use filesystem::FileSystemArtifactStore;
pub use json::{get_json, put_json};
pub use memory::InMemoryArtifactStore;
pub use store::{ArtifactStore, StoredArtifact, content_hash, validate_key};
