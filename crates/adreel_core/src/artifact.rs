//! Artifact kinds and hierarchical keys.

use crate::{RunId, StageId};
use serde::{Deserialize, Serialize};

/// Unit id under which a stage commits its manifest.
pub const MANIFEST_UNIT: &str = "output";

/// Typed output categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ArtifactKind {
    /// Free-form text such as a concept.
    RawText,
    /// Parsed and validated JSON record.
    StructuredRecord,
    /// Generated image.
    ImageReference,
    /// Generated video clip.
    VideoReference,
    /// Judge output.
    EvaluationRecord,
}

/// Address of one artifact: `{run}/{stage}/{unit}` or `{run}/{stage}/debug/{unit}`.
///
/// Unit ids may contain `/` to group related artifacts, for example
/// `character/maya/young.png`. Run-level records such as the run report have
/// no stage and live at `{run}/{unit}`.
///
/// # Examples
///
/// ```
/// use adreel_core::{ArtifactKey, RunId, StageId};
///
/// let run = RunId::new("acme_0101_1200");
/// let key = ArtifactKey::debug(&run, StageId::GenerateFirstFrames, "scene_2.json");
/// assert_eq!(key.to_string(), "acme_0101_1200/generate_first_frames/debug/scene_2.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Owning run
    pub run: RunId,
    /// Producing stage, `None` for run-level records
    pub stage: Option<StageId>,
    /// Unit id within the stage
    pub unit: String,
    /// Whether the key addresses debug context rather than output
    pub debug: bool,
}

impl ArtifactKey {
    /// Key of a unit output.
    pub fn unit(run: &RunId, stage: StageId, unit: impl Into<String>) -> Self {
        Self {
            run: run.clone(),
            stage: Some(stage),
            unit: unit.into(),
            debug: false,
        }
    }

    /// Key of a run-level record.
    pub fn run_record(run: &RunId, name: impl Into<String>) -> Self {
        Self {
            run: run.clone(),
            stage: None,
            unit: name.into(),
            debug: false,
        }
    }

    /// Key of a unit's debug context.
    pub fn debug(run: &RunId, stage: StageId, unit: impl Into<String>) -> Self {
        Self {
            run: run.clone(),
            stage: Some(stage),
            unit: unit.into(),
            debug: true,
        }
    }

    /// Key of the stage manifest.
    pub fn manifest(run: &RunId, stage: StageId) -> Self {
        Self::unit(run, stage, MANIFEST_UNIT)
    }

    /// Path segments in order, suitable for joining onto a storage root.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec![self.run.as_str()];
        if let Some(stage) = self.stage {
            segments.push(stage.name());
        }
        if self.debug {
            segments.push("debug");
        }
        segments.extend(self.unit.split('/'));
        segments
    }

    /// Returns true if this key addresses a stage manifest.
    pub fn is_manifest(&self) -> bool {
        self.stage.is_some() && !self.debug && self.unit == MANIFEST_UNIT
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments().join("/"))
    }
}
