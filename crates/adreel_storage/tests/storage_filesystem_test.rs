//! Tests for the filesystem artifact store.

use adreel_core::{ArtifactKey, RunId, StageId};
use adreel_storage::{ArtifactStore, FileSystemArtifactStore, content_hash, get_json, put_json};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[tokio::test]
async fn test_put_and_get() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("acme_0101_1200");
    let key = ArtifactKey::unit(&run, StageId::GenerateFirstFrames, "scene_1.png");

    let data = b"png bytes";
    let stored = store.put(&key, data).await.unwrap();

    assert_eq!(stored.content_hash, content_hash(data));
    assert_eq!(stored.size_bytes, data.len() as u64);
    let expected_path = temp_dir
        .path()
        .join("acme_0101_1200")
        .join("generate_first_frames")
        .join("scene_1.png");
    assert_eq!(stored.location.as_deref(), Some(expected_path.as_path()));
    assert_eq!(store.get(&key).await.unwrap(), data);
}

#[tokio::test]
async fn test_debug_layout() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let key = ArtifactKey::debug(&run, StageId::GenerateVideoClips, "scene_3.json");

    store.put(&key, b"{}").await.unwrap();

    assert!(
        temp_dir
            .path()
            .join("r1/generate_video_clips/debug/scene_3.json")
            .exists()
    );
}

#[tokio::test]
async fn test_overwrite_replaces_content() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let key = ArtifactKey::manifest(&run, StageId::GenerateUniverse);

    store.put(&key, b"first").await.unwrap();
    store.put(&key, b"second").await.unwrap();

    assert_eq!(store.get(&key).await.unwrap(), b"second");
}

#[tokio::test]
async fn test_missing_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let key = ArtifactKey::manifest(&run, StageId::MergeClips);

    assert!(!store.exists(&key).await.unwrap());
    let err = store.get(&key).await.unwrap_err();
    assert!(format!("{}", err).contains("not found"));
}

#[tokio::test]
async fn test_list_outputs_and_debug() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let stage = StageId::GenerateReferenceImages;

    store
        .put(&ArtifactKey::unit(&run, stage, "character/maya/young.png"), b"a")
        .await
        .unwrap();
    store
        .put(&ArtifactKey::debug(&run, stage, "maya.json"), b"b")
        .await
        .unwrap();
    store
        .put(&ArtifactKey::manifest(&run, stage), b"c")
        .await
        .unwrap();
    // Another stage must not leak into the listing
    store
        .put(&ArtifactKey::manifest(&run, StageId::GenerateUniverse), b"d")
        .await
        .unwrap();

    let keys = store.list(&run, stage).await.unwrap();
    let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

    assert_eq!(keys.len(), 3);
    assert!(rendered.contains(&"r1/generate_reference_images/character/maya/young.png".to_string()));
    assert!(rendered.contains(&"r1/generate_reference_images/debug/maya.json".to_string()));
    assert!(keys.iter().any(|k| k.is_manifest()));
}

#[tokio::test]
async fn test_list_missing_stage_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");

    assert!(store.list(&run, StageId::MergeClips).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejects_escaping_keys() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let key = ArtifactKey::unit(&run, StageId::MergeClips, "../../etc/passwd");

    assert!(store.put(&key, b"x").await.is_err());
    assert!(store.local_path(&key).is_none());
}

#[tokio::test]
async fn test_json_helpers() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        score: u32,
    }

    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let key = ArtifactKey::manifest(&run, StageId::JudgeConcepts);

    put_json(&store, &key, &Record { score: 82 }).await.unwrap();
    let loaded: Record = get_json(&store, &key).await.unwrap();
    assert_eq!(loaded, Record { score: 82 });

    store.put(&key, b"not json").await.unwrap();
    assert!(get_json::<_, Record>(&store, &key).await.is_err());
}

#[tokio::test]
async fn test_run_record_lives_beside_stages() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");

    let stored = store
        .put(&ArtifactKey::run_record(&run, "run_report.json"), b"{}")
        .await
        .unwrap();

    assert_eq!(
        stored.location.unwrap(),
        temp_dir.path().join("r1").join("run_report.json")
    );
    assert!(store.list(&run, StageId::MergeClips).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_put_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemArtifactStore::new(temp_dir.path()).unwrap();
    let run = RunId::new("r1");
    let key = ArtifactKey::unit(&run, StageId::GenerateFirstFrames, "scene_1.png");

    // A non-empty directory where the artifact should land makes the rename fail
    let stage_dir = temp_dir.path().join("r1/generate_first_frames");
    std::fs::create_dir_all(stage_dir.join("scene_1.png")).unwrap();
    std::fs::write(stage_dir.join("scene_1.png/occupied"), b"x").unwrap();

    assert!(store.put(&key, b"png bytes").await.is_err());

    let leftovers: Vec<_> = std::fs::read_dir(&stage_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
