//! Scene prompt planning.

use super::{StageContext, StageExecution, json_bytes};
use crate::{
    NormalizedDuration, ScenePayload, SchemaShape, StructuredCaller, UnitAttempt, normalize,
    prompts, read_payload, write_manifest,
};
use adreel_core::{LlmRequestBuilder, ScenePlanSet, StageId, Universe};
use adreel_error::{AdreelResult, ConfigError, OutputError, OutputErrorKind};

/// Plan every scene of the ad at the normalized clip length.
pub(crate) async fn generate_scene_prompts(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::GenerateScenePrompts;
    let concept = ctx.canonical_concept(stage).await?;
    let universe: Universe =
        read_payload(ctx.store, ctx.run, StageId::GenerateUniverse, stage).await?;
    let duration = normalize(
        &ctx.config.duration_request(),
        &ctx.config.allowed_durations(),
    )?;
    if duration.adjusted {
        tracing::info!(
            requested = duration.requested_unit_seconds,
            resolved = duration.unit_seconds,
            "Clip length snapped to the model's allowed durations"
        );
    }

    let request = LlmRequestBuilder::default()
        .messages(prompts::scene_prompts(
            ctx.config.brief(),
            &concept.text,
            &universe,
            &duration,
        ))
        .model(Some(ctx.config.models().llm_model().clone()))
        .schema(Some(prompts::scenes_schema()))
        .temperature(Some(0.6f32))
        .build()
        .map_err(|e| ConfigError::new(format!("Failed to build scene request: {}", e)))?;

    let shape = SchemaShape::new("scenes", &["scenes"]);
    let shape = &shape;
    let duration_ref = &duration;
    let caller = StructuredCaller::new(ctx.services.llm.as_ref());
    let caller = &caller;
    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![("scene_prompts".to_string(), request)], |request| async move {
            let attempt = caller.call::<ScenePlanSet>(request, shape).await;
            let attempt = UnitAttempt {
                debug: attempt.debug,
                result: attempt
                    .result
                    .and_then(|scenes| conform_scenes(scenes, duration_ref).map_err(Into::into)),
            };
            ctx.persist(stage, "scene_prompts.json", attempt, json_bytes).await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, scenes)) = run.successes().into_iter().next() {
        let payload = ScenePayload { scenes, duration };
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &payload).await?;
    }
    Ok(execution)
}

/// Check numbering, order scenes and pin every clip to the normalized length.
fn conform_scenes(
    mut scenes: ScenePlanSet,
    duration: &NormalizedDuration,
) -> Result<ScenePlanSet, OutputError> {
    if scenes.scenes.is_empty() {
        return Err(OutputError::new(OutputErrorKind::SchemaConformance(
            "scene plan has no scenes".to_string(),
        )));
    }
    if let Some(problem) = scenes.numbering_error() {
        return Err(OutputError::new(OutputErrorKind::SchemaConformance(problem)));
    }
    if scenes.scenes.len() as u32 != duration.unit_count {
        tracing::warn!(
            expected = duration.unit_count,
            received = scenes.scenes.len(),
            "Scene count differs from the requested count"
        );
    }

    scenes.scenes.sort_by_key(|s| s.scene_number);
    for scene in &mut scenes.scenes {
        scene.duration_seconds = duration.unit_seconds;
    }
    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn duration() -> NormalizedDuration {
        NormalizedDuration {
            unit_seconds: 6,
            unit_count: 2,
            requested_unit_seconds: 6.0,
            total_seconds: 12,
            adjusted: false,
        }
    }

    fn plan(numbers: &[u32]) -> ScenePlanSet {
        let scenes: Vec<_> = numbers
            .iter()
            .map(|n| {
                json!({
                    "scene_number": n,
                    "duration_seconds": 7.5,
                    "video_summary": "A shot",
                    "audio_summary": "Music",
                    "first_frame_image_prompt": "A frame",
                })
            })
            .collect();
        serde_json::from_value(json!({ "scenes": scenes })).unwrap()
    }

    #[test]
    fn test_conform_orders_and_pins_duration() {
        let scenes = conform_scenes(plan(&[2, 1]), &duration()).unwrap();
        assert_eq!(scenes.scenes[0].scene_number, 1);
        assert!(scenes.scenes.iter().all(|s| s.duration_seconds == 6));
    }

    #[test]
    fn test_conform_rejects_gaps_and_empty() {
        assert!(conform_scenes(plan(&[1, 3]), &duration()).is_err());
        assert!(conform_scenes(plan(&[]), &duration()).is_err());
    }
}
