//! Per-scene media: first frames, video clips and the final merge.

use super::{StageContext, StageExecution, image_resolution};
use crate::{
    MediaPayload, MergePayload, ReferenceSelector, ScenePayload, SelectedReference, StageOutcome,
    UnitAttempt, read_payload, write_manifest,
};
use adreel_core::{ImageRequestBuilder, MediaInput, ScenePlan, StageId, Universe, VideoRequestBuilder};
use adreel_error::{AdreelError, AdreelResult, ConfigError, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::collections::BTreeMap;

fn required_scene_units(ctx: &StageContext<'_>) -> Vec<String> {
    ctx.config
        .execution()
        .required_scenes()
        .iter()
        .map(|n| format!("scene_{}", n))
        .collect()
}

fn scene_units(payload: &ScenePayload) -> Vec<(String, u32)> {
    payload
        .scenes
        .scenes
        .iter()
        .map(|s| (s.unit_key(), s.scene_number))
        .collect()
}

fn media_payload(successes: Vec<(String, (u32, String))>) -> MediaPayload {
    MediaPayload {
        units: successes.into_iter().map(|(_, entry)| entry).collect::<BTreeMap<_, _>>(),
    }
}

/// Generate the opening frame of every scene with its reference images.
pub(crate) async fn generate_first_frames(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::GenerateFirstFrames;
    let scenes: ScenePayload =
        read_payload(ctx.store, ctx.run, StageId::GenerateScenePrompts, stage).await?;
    let universe: Universe =
        read_payload(ctx.store, ctx.run, StageId::GenerateReferenceImages, stage).await?;

    let selector = ReferenceSelector::with_cap(ctx.services.image.max_reference_images());
    let (scenes_ref, universe_ref, selector_ref) = (&scenes, &universe, &selector);
    let policy = ctx
        .policy(*ctx.config.execution().workers())?
        .with_required_units(required_scene_units(ctx));
    let executor = ctx.executor(stage, policy);
    let run = executor
        .execute(scene_units(&scenes), |number: u32| async move {
            let Some(scene) = scenes_ref.scenes.scene(number) else {
                return UnitAttempt::bare(Err(missing_scene(stage, number)));
            };
            let references = selector_ref.select(scene, universe_ref);
            first_frame(ctx, stage, scene, references).await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if execution.outcome != StageOutcome::Fatal {
        let payload = media_payload(run.successes());
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &payload).await?;
    }
    Ok(execution)
}

async fn first_frame(
    ctx: &StageContext<'_>,
    stage: StageId,
    scene: &ScenePlan,
    selected: Vec<SelectedReference>,
) -> UnitAttempt<(u32, String)> {
    let video = ctx.config.video();
    let resolution = image_resolution(video.resolution());

    let mut references = Vec::with_capacity(selected.len());
    for reference in &selected {
        let key = ctx.key(StageId::GenerateReferenceImages, reference.image.as_str());
        match ctx.store.get(&key).await {
            Ok(data) => references.push(MediaInput {
                label: format!("{} ({})", reference.element, reference.version),
                mime_type: "image/png".to_string(),
                data,
            }),
            Err(e) => {
                tracing::warn!(
                    scene = scene.scene_number,
                    image = %reference.image,
                    error = %e,
                    "Reference image unavailable, continuing without it"
                );
            }
        }
    }

    let debug = json!({
        "prompt": scene.first_frame_image_prompt,
        "references": selected,
        "aspect_ratio": video.aspect_ratio(),
        "resolution": resolution,
    });

    let request = match ImageRequestBuilder::default()
        .prompt(scene.first_frame_image_prompt.clone())
        .references(references)
        .aspect_ratio(video.aspect_ratio().clone())
        .resolution(Some(resolution.to_string()))
        .output_format("png")
        .build()
    {
        Ok(request) => request,
        Err(e) => {
            let e = AdreelError::from(ConfigError::new(format!(
                "Failed to build image request: {}",
                e
            )));
            return UnitAttempt::new(debug, Err(e));
        }
    };

    let unit = format!("{}.png", scene.unit_key());
    let result = match ctx.services.image.generate_image(&request).await {
        Ok(media) => ctx
            .store
            .put(&ctx.key(stage, unit.as_str()), &media.data)
            .await
            .map(|_| (scene.scene_number, unit)),
        Err(e) => Err(e),
    };
    UnitAttempt::new(debug, result)
}

/// Animate every scene from its first frame.
pub(crate) async fn generate_video_clips(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::GenerateVideoClips;
    let scenes: ScenePayload =
        read_payload(ctx.store, ctx.run, StageId::GenerateScenePrompts, stage).await?;
    let frames: MediaPayload =
        read_payload(ctx.store, ctx.run, StageId::GenerateFirstFrames, stage).await?;

    let (scenes_ref, frames_ref) = (&scenes, &frames);
    let policy = ctx
        .policy(*ctx.config.execution().workers())?
        .with_required_units(required_scene_units(ctx));
    let executor = ctx.executor(stage, policy);
    let run = executor
        .execute(scene_units(&scenes), |number: u32| async move {
            let Some(scene) = scenes_ref.scenes.scene(number) else {
                return UnitAttempt::bare(Err(missing_scene(stage, number)));
            };
            let Some(frame) = frames_ref.units.get(&number) else {
                return UnitAttempt::bare(Err(PipelineError::new(
                    PipelineErrorKind::MissingDependency {
                        stage: format!("{}/{}", stage, scene.unit_key()),
                        upstream: StageId::GenerateFirstFrames.to_string(),
                    },
                )
                .into()));
            };
            clip(ctx, stage, scene, frame, scenes_ref).await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if execution.outcome != StageOutcome::Fatal {
        let payload = media_payload(run.successes());
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &payload).await?;
    }
    Ok(execution)
}

async fn clip(
    ctx: &StageContext<'_>,
    stage: StageId,
    scene: &ScenePlan,
    frame: &str,
    payload: &ScenePayload,
) -> UnitAttempt<(u32, String)> {
    let video = ctx.config.video();
    let prompt = scene.video_prompt();
    let debug = json!({
        "prompt": prompt,
        "first_frame": frame,
        "duration": {
            "requested": payload.duration.requested_unit_seconds,
            "resolved": payload.duration.unit_seconds,
        },
        "resolution": video.resolution(),
        "aspect_ratio": video.aspect_ratio(),
        "generate_audio": video.generate_audio(),
    });

    let data = match ctx
        .store
        .get(&ctx.key(StageId::GenerateFirstFrames, frame))
        .await
    {
        Ok(data) => data,
        Err(e) => return UnitAttempt::new(debug, Err(e)),
    };

    let request = match VideoRequestBuilder::default()
        .prompt(prompt)
        .first_frame(MediaInput {
            label: "first_frame".to_string(),
            mime_type: "image/png".to_string(),
            data,
        })
        .duration_seconds(payload.duration.unit_seconds)
        .resolution(video.resolution().clone())
        .aspect_ratio(video.aspect_ratio().clone())
        .generate_audio(*video.generate_audio())
        .build()
    {
        Ok(request) => request,
        Err(e) => {
            let e = AdreelError::from(ConfigError::new(format!(
                "Failed to build video request: {}",
                e
            )));
            return UnitAttempt::new(debug, Err(e));
        }
    };

    let unit = format!("{}.mp4", scene.unit_key());
    let result = match ctx.services.video.generate_video(&request).await {
        Ok(media) => ctx
            .store
            .put(&ctx.key(stage, unit.as_str()), &media.data)
            .await
            .map(|_| (scene.scene_number, unit)),
        Err(e) => Err(e),
    };
    UnitAttempt::new(debug, result)
}

/// Concatenate the clips in scene order.
pub(crate) async fn merge_clips(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::MergeClips;
    let clips: MediaPayload =
        read_payload(ctx.store, ctx.run, StageId::GenerateVideoClips, stage).await?;
    let scenes: ScenePayload =
        read_payload(ctx.store, ctx.run, StageId::GenerateScenePrompts, stage).await?;

    let mut ordered = Vec::new();
    let mut missing = Vec::new();
    for scene in &scenes.scenes.scenes {
        match clips.units.get(&scene.scene_number) {
            Some(unit) => ordered.push(unit.clone()),
            None => missing.push(scene.scene_number),
        }
    }
    if !missing.is_empty() {
        tracing::warn!(?missing, "Merging without clips for some scenes");
    }

    let (ordered_ref, missing_ref) = (&ordered, &missing);
    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![("final".to_string(), ())], |_| async move {
            merge(ctx, stage, ordered_ref, missing_ref).await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, output)) = run.successes().into_iter().next() {
        let payload = MergePayload {
            output,
            clips: ordered,
            missing,
        };
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &payload).await?;
    }
    Ok(execution)
}

async fn merge(
    ctx: &StageContext<'_>,
    stage: StageId,
    clips: &[String],
    missing: &[u32],
) -> UnitAttempt<String> {
    let unit = "final.mp4".to_string();
    let no_local = || {
        AdreelError::from(PipelineError::new(PipelineErrorKind::StageFailed {
            stage: stage.to_string(),
            message: format!(
                "the {} store has no local files to merge",
                ctx.store.backend_name()
            ),
        }))
    };

    let mut inputs = Vec::with_capacity(clips.len());
    for clip in clips {
        match ctx.store.local_path(&ctx.key(StageId::GenerateVideoClips, clip.as_str())) {
            Some(path) => inputs.push(path),
            None => return UnitAttempt::bare(Err(no_local())),
        }
    }
    let Some(output) = ctx.store.local_path(&ctx.key(stage, unit.as_str())) else {
        return UnitAttempt::bare(Err(no_local()));
    };

    let debug = json!({
        "clips": inputs,
        "missing": missing,
        "output": output,
    });

    if let Some(parent) = output.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        let e = AdreelError::from(PipelineError::new(PipelineErrorKind::StageFailed {
            stage: stage.to_string(),
            message: format!("Failed to create {}: {}", parent.display(), e),
        }));
        return UnitAttempt::new(debug, Err(e));
    }

    let result = ctx
        .services
        .merger
        .merge(&inputs, &output)
        .await
        .map(|_| unit);
    UnitAttempt::new(debug, result)
}

fn missing_scene(stage: StageId, number: u32) -> AdreelError {
    PipelineError::new(PipelineErrorKind::InvalidArtifact(format!(
        "{} has no scene {}",
        stage, number
    )))
    .into()
}
