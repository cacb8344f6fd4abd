//! Stage sequences per entry mode and their declared dependencies.

use adreel_core::{EntryMode, StageId};
use serde::{Deserialize, Serialize};

/// Stages every entry mode converges on.
pub const DOWNSTREAM: [StageId; 6] = [
    StageId::GenerateUniverse,
    StageId::GenerateReferenceImages,
    StageId::GenerateScenePrompts,
    StageId::GenerateFirstFrames,
    StageId::GenerateVideoClips,
    StageId::MergeClips,
];

/// Ordered stages of one run.
///
/// # Examples
///
/// ```
/// use adreel_core::{EntryMode, StageId};
/// use adreel_pipeline::StagePlan;
///
/// let plan = StagePlan::new(EntryMode::PreEvaluated, true);
/// assert_eq!(plan.stages()[0], StageId::ExtractBestConcept);
/// assert_eq!(
///     plan.requirements(StageId::GenerateUniverse),
///     vec![StageId::ArbitrateRevision]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    mode: EntryMode,
    stages: Vec<StageId>,
}

impl StagePlan {
    /// Plan for an entry mode.
    ///
    /// `judge_and_revise` only affects direct-concept runs.
    pub fn new(mode: EntryMode, judge_and_revise: bool) -> Self {
        let mut stages = match mode {
            EntryMode::DirectConcept if judge_and_revise => vec![
                StageId::ExpandConcept,
                StageId::JudgeConcepts,
                StageId::ReviseConcept,
                StageId::ArbitrateRevision,
            ],
            EntryMode::DirectConcept => vec![StageId::ExpandConcept],
            EntryMode::BrandBrief => vec![
                StageId::GenerateConcepts,
                StageId::JudgeConcepts,
                StageId::ExtractBestConcept,
                StageId::ReviseConcept,
                StageId::ArbitrateRevision,
            ],
            EntryMode::PreEvaluated => vec![
                StageId::ExtractBestConcept,
                StageId::ReviseConcept,
                StageId::ArbitrateRevision,
            ],
        };
        stages.extend(DOWNSTREAM);
        Self { mode, stages }
    }

    /// Entry mode the plan was built for.
    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// Whether the plan runs a stage.
    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.contains(&stage)
    }

    /// Stage whose manifest holds the concept downstream stages consume.
    pub fn concept_source(&self) -> StageId {
        if self.contains(StageId::ArbitrateRevision) {
            StageId::ArbitrateRevision
        } else {
            StageId::ExpandConcept
        }
    }

    /// Upstream stages whose manifests must exist before `stage` runs.
    pub fn requirements(&self, stage: StageId) -> Vec<StageId> {
        match stage {
            StageId::ExpandConcept | StageId::GenerateConcepts => Vec::new(),
            StageId::JudgeConcepts => match self.mode {
                EntryMode::DirectConcept => vec![StageId::ExpandConcept],
                _ => vec![StageId::GenerateConcepts],
            },
            StageId::ExtractBestConcept => match self.mode {
                EntryMode::BrandBrief => vec![StageId::JudgeConcepts],
                // Reads the external evaluation file instead
                _ => Vec::new(),
            },
            StageId::ReviseConcept => match self.mode {
                EntryMode::DirectConcept => {
                    vec![StageId::ExpandConcept, StageId::JudgeConcepts]
                }
                _ => vec![StageId::ExtractBestConcept],
            },
            StageId::ArbitrateRevision => vec![StageId::ReviseConcept],
            StageId::GenerateUniverse => vec![self.concept_source()],
            StageId::GenerateReferenceImages => vec![StageId::GenerateUniverse],
            StageId::GenerateScenePrompts => {
                vec![self.concept_source(), StageId::GenerateUniverse]
            }
            StageId::GenerateFirstFrames => vec![
                StageId::GenerateScenePrompts,
                StageId::GenerateReferenceImages,
            ],
            StageId::GenerateVideoClips => {
                vec![StageId::GenerateScenePrompts, StageId::GenerateFirstFrames]
            }
            StageId::MergeClips => vec![StageId::GenerateVideoClips],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_all_modes_converge() {
        for mode in EntryMode::iter() {
            for judge_and_revise in [true, false] {
                let plan = StagePlan::new(mode, judge_and_revise);
                let tail = &plan.stages()[plan.stages().len() - DOWNSTREAM.len()..];
                assert_eq!(tail, &DOWNSTREAM);
            }
        }
    }

    #[test]
    fn test_stages_in_ordinal_order() {
        for mode in EntryMode::iter() {
            let plan = StagePlan::new(mode, true);
            assert!(plan.stages().windows(2).all(|w| w[0].ordinal() < w[1].ordinal()));
        }
    }

    #[test]
    fn test_requirements_precede_stage() {
        for mode in EntryMode::iter() {
            for judge_and_revise in [true, false] {
                let plan = StagePlan::new(mode, judge_and_revise);
                for (index, stage) in plan.stages().iter().enumerate() {
                    for upstream in plan.requirements(*stage) {
                        let position = plan.stages().iter().position(|s| *s == upstream);
                        assert!(
                            position.is_some_and(|p| p < index),
                            "{:?}: {} requires {} which does not run first",
                            mode,
                            stage,
                            upstream
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_direct_without_revision_feeds_universe_from_expansion() {
        let plan = StagePlan::new(EntryMode::DirectConcept, false);
        assert_eq!(plan.stages()[0], StageId::ExpandConcept);
        assert_eq!(plan.stages()[1], StageId::GenerateUniverse);
        assert_eq!(
            plan.requirements(StageId::GenerateUniverse),
            vec![StageId::ExpandConcept]
        );
    }
}
