//! Prompt construction for the text stages.
//!
//! System prompts are stable across calls of a stage and are marked as a
//! cacheable prefix; the per-call material goes in the user message.

use crate::{BriefSection, NormalizedDuration};
use adreel_core::{ConceptRecord, EvaluationRecord, Message, SchemaConstraint, Universe};
use serde_json::json;

const VIDEO_CONTEXT: &str = "The ad will be produced with generative video models. \
Impossible visuals and transformations are welcome when they serve the story.";

fn brief_block(brief: &BriefSection) -> String {
    let mut block = format!(
        "BRAND: {}\nPRODUCT: {}",
        brief.brand_name(),
        brief.product_description()
    );
    if let Some(tagline) = brief.tagline() {
        block.push_str(&format!("\nTAGLINE: {}", tagline));
    }
    if let Some(audience) = brief.target_audience() {
        block.push_str(&format!("\nAUDIENCE: {}", audience));
    }
    if !brief.creative_direction().trim().is_empty() {
        block.push_str(&format!("\nCREATIVE DIRECTION: {}", brief.creative_direction()));
    }
    block
}

/// Expand a short concept into a full five-scene treatment.
pub fn expand_concept(brief: &BriefSection, concept: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are an ad creative who expands a rough idea into a complete \
             video ad concept with five numbered scenes, a clear emotional arc \
             and a natural brand moment. {}",
            VIDEO_CONTEXT
        ))
        .cached(),
        Message::user(format!(
            "{}\n\nROUGH CONCEPT:\n{}\n\nWrite the expanded concept as plain text.",
            brief_block(brief),
            concept.trim()
        )),
    ]
}

/// Write one original concept in a given ad style.
pub fn generate_concept(brief: &BriefSection, ad_style: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are an award-winning ad creative writing original video ad \
             concepts. Each concept has a title, a logline and five numbered \
             scenes. {}",
            VIDEO_CONTEXT
        ))
        .cached(),
        Message::user(format!(
            "{}\n\nAD STYLE: {}\n\nWrite one concept in this style as plain text.",
            brief_block(brief),
            ad_style
        )),
    ]
}

/// Score one concept out of 100.
pub fn judge_concept(brief: &BriefSection, ad_style: Option<&str>, concept: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are an expert advertising judge. Score the concept out of 100: \
             narrative quality (20), emotional impact (20), brand integration (15), \
             memorability (15), visual clarity (15), success likelihood (15). {} \
             Respond with JSON only: {{\"score\": number, \"explanation\": string, \
             \"strengths\": [string], \"weaknesses\": [string]}}",
            VIDEO_CONTEXT
        ))
        .cached(),
        Message::user(format!(
            "{}\nAD STYLE: {}\n\nCONCEPT TO EVALUATE:\n{}",
            brief_block(brief),
            ad_style.unwrap_or("unspecified"),
            concept.trim()
        )),
    ]
}

/// Revise a concept to address the judge's weaknesses.
pub fn revise_concept(
    brief: &BriefSection,
    concept: &ConceptRecord,
    evaluation: &EvaluationRecord,
) -> Vec<Message> {
    let list = |items: &[String]| {
        items
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    };
    vec![
        Message::system(format!(
            "You are a creative director revising an ad concept. Keep what works, \
             fix the named weaknesses, and do not introduce new ones. Keep five \
             numbered scenes. {}",
            VIDEO_CONTEXT
        ))
        .cached(),
        Message::user(format!(
            "{}\n\nCONCEPT (scored {}/100):\n{}\n\nSTRENGTHS:\n{}\n\nWEAKNESSES:\n{}\n\n\
             Write the revised concept as plain text.",
            brief_block(brief),
            evaluation.score,
            concept.text.trim(),
            list(&evaluation.strengths),
            list(&evaluation.weaknesses)
        )),
    ]
}

/// Extract the recurring characters, props and locations of a concept.
pub fn universe(brief: &BriefSection, concept: &str) -> Vec<Message> {
    vec![
        Message::system(
            "You are a production designer building the story universe for a video \
             ad. List every character, prop and location with the scenes it appears \
             in. When an element changes appearance, give it multiple versions, mark \
             the original and whether later versions reference it. Every version \
             needs a visual description and an image generation prompt. Respond with \
             JSON only: {\"universe\": {\"locations\": [...], \"props\": [...]}, \
             \"characters\": [...]}",
        )
        .cached(),
        Message::user(format!(
            "{}\n\nCONCEPT:\n{}",
            brief_block(brief),
            concept.trim()
        )),
    ]
}

/// Break a concept into timed scene plans that reference universe elements.
pub fn scene_prompts(
    brief: &BriefSection,
    concept: &str,
    universe: &Universe,
    duration: &NormalizedDuration,
) -> Vec<Message> {
    let elements = universe
        .elements
        .iter()
        .map(|e| {
            let versions = e
                .versions
                .iter()
                .map(|v| v.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("- {} ({}): {}", e.name, e.category, versions)
        })
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        Message::system(
            "You are a director writing a scene-by-scene shot plan for a video ad. \
             For each scene give scene_number, duration_seconds, video_summary, \
             audio_summary, first_frame_image_prompt, elements_used (characters, \
             props, locations as \"Name\" or \"Name (Version)\"), and optional \
             dialogue and visual_effect. Respond with JSON only: {\"scenes\": [...]}",
        )
        .cached(),
        Message::user(format!(
            "{}\n\nSCENES: exactly {} scenes of {} seconds each ({} seconds total).\n\n\
             UNIVERSE ELEMENTS:\n{}\n\nCONCEPT:\n{}",
            brief_block(brief),
            duration.unit_count,
            duration.unit_seconds,
            duration.total_seconds,
            elements,
            concept.trim()
        )),
    ]
}

/// Schema for judge output, sent to providers that enforce one.
pub fn evaluation_schema() -> SchemaConstraint {
    SchemaConstraint {
        name: "evaluation".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "score": { "type": "number", "minimum": 0, "maximum": 100 },
                "explanation": { "type": "string" },
                "strengths": { "type": "array", "items": { "type": "string" } },
                "weaknesses": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["score", "strengths", "weaknesses"]
        }),
    }
}

/// Schema for universe output.
pub fn universe_schema() -> SchemaConstraint {
    let version = json!({
        "type": "object",
        "properties": {
            "version_name": { "type": "string" },
            "scenes_used": { "type": "array", "items": { "type": "integer" } },
            "description": { "type": "string" },
            "image_generation_prompt": { "type": "string" },
            "is_original": { "type": "boolean" },
            "references_original_version": { "type": "boolean" }
        },
        "required": ["version_name", "scenes_used", "description", "image_generation_prompt"]
    });
    let element = json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "scenes_used": { "type": "array", "items": { "type": "integer" } },
            "has_multiple_versions": { "type": "boolean" },
            "versions": { "type": "array", "items": version },
            "description": { "type": "string" },
            "image_generation_prompt": { "type": "string" }
        },
        "required": ["name", "scenes_used"]
    });
    SchemaConstraint {
        name: "universe".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "universe": {
                    "type": "object",
                    "properties": {
                        "locations": { "type": "array", "items": element },
                        "props": { "type": "array", "items": element }
                    }
                },
                "characters": { "type": "array", "items": element }
            },
            "required": ["universe", "characters"]
        }),
    }
}

/// Schema for scene-plan output.
pub fn scenes_schema() -> SchemaConstraint {
    let names = json!({ "type": "array", "items": { "type": "string" } });
    SchemaConstraint {
        name: "scenes".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "scenes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "scene_number": { "type": "integer" },
                            "duration_seconds": { "type": "number" },
                            "video_summary": { "type": "string" },
                            "audio_summary": { "type": "string" },
                            "first_frame_image_prompt": { "type": "string" },
                            "elements_used": {
                                "type": "object",
                                "properties": {
                                    "characters": names,
                                    "props": names,
                                    "locations": names
                                }
                            },
                            "dialogue": { "type": "string" },
                            "visual_effect": { "type": "string" }
                        },
                        "required": ["scene_number", "video_summary", "first_frame_image_prompt"]
                    }
                }
            },
            "required": ["scenes"]
        }),
    }
}
