//! The fixed stage catalogue.

use crate::ArtifactKind;
use serde::{Deserialize, Serialize};

/// A named pipeline step. The set is closed and ordered by ordinal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageId {
    /// Expand raw concept text into a full ad concept.
    ExpandConcept,
    /// Generate one concept per (ad style, model) combination.
    GenerateConcepts,
    /// Score concepts with a judge model.
    JudgeConcepts,
    /// Pick the highest scoring concept.
    ExtractBestConcept,
    /// Revise the chosen concept against its weaknesses.
    ReviseConcept,
    /// Decide between the original and the revised concept.
    ArbitrateRevision,
    /// Derive recurring characters, props and locations.
    GenerateUniverse,
    /// Render reference images for recurring elements.
    GenerateReferenceImages,
    /// Break the concept into per-scene generation contracts.
    GenerateScenePrompts,
    /// Render the opening frame of every scene.
    GenerateFirstFrames,
    /// Render one video clip per scene.
    GenerateVideoClips,
    /// Concatenate clips into the final ad.
    MergeClips,
}

impl StageId {
    /// Position of the stage in the fixed order.
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// Stable name used in artifact keys.
    pub fn name(&self) -> &'static str {
        match self {
            StageId::ExpandConcept => "expand_concept",
            StageId::GenerateConcepts => "generate_concepts",
            StageId::JudgeConcepts => "judge_concepts",
            StageId::ExtractBestConcept => "extract_best_concept",
            StageId::ReviseConcept => "revise_concept",
            StageId::ArbitrateRevision => "arbitrate_revision",
            StageId::GenerateUniverse => "generate_universe",
            StageId::GenerateReferenceImages => "generate_reference_images",
            StageId::GenerateScenePrompts => "generate_scene_prompts",
            StageId::GenerateFirstFrames => "generate_first_frames",
            StageId::GenerateVideoClips => "generate_video_clips",
            StageId::MergeClips => "merge_clips",
        }
    }

    /// The artifact kind this stage produces.
    pub fn produces(&self) -> ArtifactKind {
        match self {
            StageId::ExpandConcept | StageId::GenerateConcepts | StageId::ReviseConcept => {
                ArtifactKind::RawText
            }
            StageId::JudgeConcepts | StageId::ArbitrateRevision => ArtifactKind::EvaluationRecord,
            StageId::ExtractBestConcept
            | StageId::GenerateUniverse
            | StageId::GenerateScenePrompts => ArtifactKind::StructuredRecord,
            StageId::GenerateReferenceImages | StageId::GenerateFirstFrames => {
                ArtifactKind::ImageReference
            }
            StageId::GenerateVideoClips | StageId::MergeClips => ArtifactKind::VideoReference,
        }
    }
}
