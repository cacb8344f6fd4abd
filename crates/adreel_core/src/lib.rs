//! Core data types for adreel.
//!
//! This crate provides the fundamental data structures shared by every stage
//! of the ad-generation pipeline: runs and stages, universe elements and
//! their versions, scene plans, evaluation records, and the request and
//! response types exchanged with LLM, image and video services.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod artifact;
mod concept;
mod evaluation;
mod llm;
mod media;
mod run;
mod scene;
mod stage;
mod universe;

pub use artifact::{ArtifactKey, ArtifactKind, MANIFEST_UNIT};
pub use concept::{ConceptCandidate, ConceptRecord};
pub use evaluation::{EvaluationGroup, EvaluationRecord, ScoredConcept, Winner};
pub use llm::{
    Channel, LlmRequest, LlmRequestBuilder, LlmResponse, Message, Role, SchemaConstraint,
    Segment,
};
pub use media::{
    GeneratedMedia, ImageRequest, ImageRequestBuilder, MediaInput, VideoRequest,
    VideoRequestBuilder,
};
pub use run::{EntryMode, RunId};
pub use scene::{ElementUsage, ScenePlan, ScenePlanSet};
pub use stage::StageId;
pub use universe::{
    Category, ElementKey, RawElement, RawVersion, Universe, UniverseDocument, UniverseElement,
    UniverseSection, Version, disambiguate, slugify,
};
