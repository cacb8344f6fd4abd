//! Stage manifests: the committed output record of each stage.
//!
//! A stage's manifest lives at `{run}/{stage}/output`. Its presence is what
//! skip-if-exists and dependency checks look for, and its payload is what
//! downstream stages read.

use crate::StageOutcome;
use adreel_core::{ArtifactKey, ConceptCandidate, ConceptRecord, EvaluationGroup, RunId, StageId, Universe};
use adreel_error::{AdreelResult, PipelineError, PipelineErrorKind};
use adreel_storage::{ArtifactStore, get_json, put_json};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Envelope around a stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageManifest<T> {
    /// Producing stage
    pub stage: StageId,
    /// Owning run
    pub run_id: RunId,
    /// Commit time
    pub created_at: DateTime<Utc>,
    /// Outcome the stage finished with
    pub outcome: StageOutcome,
    /// Stage-specific payload
    pub payload: T,
}

/// Commit a stage manifest.
#[tracing::instrument(skip(store, payload), fields(run = %run, stage = %stage, outcome = %outcome))]
pub async fn write_manifest<T: Serialize>(
    store: &dyn ArtifactStore,
    run: &RunId,
    stage: StageId,
    outcome: StageOutcome,
    payload: &T,
) -> AdreelResult<()> {
    let manifest = StageManifest {
        stage,
        run_id: run.clone(),
        created_at: Utc::now(),
        outcome,
        payload,
    };
    put_json(store, &ArtifactKey::manifest(run, stage), &manifest).await?;
    tracing::debug!("Committed stage manifest");
    Ok(())
}

/// Read a stage payload, checking the envelope belongs to the stage.
///
/// # Errors
///
/// A missing manifest is reported as a missing dependency of `consumer`;
/// a manifest that does not deserialize or names another stage is an
/// invalid artifact.
pub async fn read_payload<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    run: &RunId,
    stage: StageId,
    consumer: StageId,
) -> AdreelResult<T> {
    let key = ArtifactKey::manifest(run, stage);
    if !store.exists(&key).await? {
        return Err(PipelineError::new(PipelineErrorKind::MissingDependency {
            stage: consumer.to_string(),
            upstream: stage.to_string(),
        })
        .into());
    }

    let manifest: StageManifest<T> = get_json(store, &key).await.map_err(|e| {
        PipelineError::new(PipelineErrorKind::InvalidArtifact(format!("{}: {}", key, e)))
    })?;

    if manifest.stage != stage || &manifest.run_id != run {
        return Err(PipelineError::new(PipelineErrorKind::InvalidArtifact(format!(
            "{} belongs to {}/{}",
            key, manifest.run_id, manifest.stage
        )))
        .into());
    }
    Ok(manifest.payload)
}

/// Revise-stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionPayload {
    /// Concept that was revised, with its evaluation
    pub original: ConceptRecord,
    /// Revised concept
    pub revised: ConceptRecord,
}

/// Scene-prompt stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePayload {
    /// Validated scene plans with normalized durations
    pub scenes: adreel_core::ScenePlanSet,
    /// Resolved durations
    pub duration: crate::NormalizedDuration,
}

/// Per-scene media payload for first frames and clips.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Scene number to unit key under the stage
    pub units: BTreeMap<u32, String>,
}

/// Merge-stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePayload {
    /// Unit key of the merged video
    pub output: String,
    /// Clip unit keys in merge order
    pub clips: Vec<String>,
    /// Scenes without a clip
    pub missing: Vec<u32>,
}

/// Payload type committed by each stage, for manifest verification.
pub(crate) async fn verify_payload(
    store: &dyn ArtifactStore,
    run: &RunId,
    stage: StageId,
) -> AdreelResult<()> {
    match stage {
        StageId::ExpandConcept | StageId::ExtractBestConcept => {
            read_payload::<ConceptRecord>(store, run, stage, stage).await?;
        }
        StageId::GenerateConcepts => {
            read_payload::<Vec<ConceptCandidate>>(store, run, stage, stage).await?;
        }
        StageId::JudgeConcepts => {
            read_payload::<Vec<EvaluationGroup>>(store, run, stage, stage).await?;
        }
        StageId::ReviseConcept => {
            read_payload::<RevisionPayload>(store, run, stage, stage).await?;
        }
        StageId::ArbitrateRevision => {
            read_payload::<crate::ArbiterDecision>(store, run, stage, stage).await?;
        }
        StageId::GenerateUniverse | StageId::GenerateReferenceImages => {
            read_payload::<Universe>(store, run, stage, stage).await?;
        }
        StageId::GenerateScenePrompts => {
            let payload = read_payload::<ScenePayload>(store, run, stage, stage).await?;
            if let Some(problem) = payload.scenes.numbering_error() {
                return Err(PipelineError::new(PipelineErrorKind::InvalidArtifact(problem)).into());
            }
        }
        StageId::GenerateFirstFrames | StageId::GenerateVideoClips => {
            let payload = read_payload::<MediaPayload>(store, run, stage, stage).await?;
            for unit in payload.units.values() {
                require_unit(store, run, stage, unit).await?;
            }
        }
        StageId::MergeClips => {
            let payload = read_payload::<MergePayload>(store, run, stage, stage).await?;
            require_unit(store, run, stage, &payload.output).await?;
        }
    }
    Ok(())
}

async fn require_unit(
    store: &dyn ArtifactStore,
    run: &RunId,
    stage: StageId,
    unit: &str,
) -> AdreelResult<()> {
    let key = ArtifactKey::unit(run, stage, unit);
    if store.exists(&key).await? {
        Ok(())
    } else {
        Err(PipelineError::new(PipelineErrorKind::InvalidArtifact(format!(
            "manifest lists {} but it is absent",
            key
        )))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_error::ErrorClass;
    use adreel_storage::InMemoryArtifactStore;

    #[tokio::test]
    async fn test_round_trip_and_missing() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");

        let err = read_payload::<ConceptRecord>(&store, &run, StageId::ExpandConcept, StageId::GenerateUniverse)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::MissingDependency);

        let record = ConceptRecord::new("expanded", "A watch that stops time");
        write_manifest(&store, &run, StageId::ExpandConcept, StageOutcome::Success, &record)
            .await
            .unwrap();
        let read: ConceptRecord =
            read_payload(&store, &run, StageId::ExpandConcept, StageId::GenerateUniverse)
                .await
                .unwrap();
        assert_eq!(read, record);
        assert!(verify_payload(&store, &run, StageId::ExpandConcept).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_manifest_fails_verification() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        store
            .put(&ArtifactKey::manifest(&run, StageId::GenerateUniverse), b"{\"truncated\": ")
            .await
            .unwrap();

        let err = verify_payload(&store, &run, StageId::GenerateUniverse)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::SchemaConformance);
    }

    #[tokio::test]
    async fn test_media_manifest_requires_units() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let stage = StageId::GenerateFirstFrames;
        let payload = MediaPayload {
            units: BTreeMap::from([(1, "scene_1.png".to_string())]),
        };
        write_manifest(&store, &run, stage, StageOutcome::Success, &payload)
            .await
            .unwrap();
        assert!(verify_payload(&store, &run, stage).await.is_err());

        store
            .put(&ArtifactKey::unit(&run, stage, "scene_1.png"), b"png")
            .await
            .unwrap();
        assert!(verify_payload(&store, &run, stage).await.is_ok());
    }
}
