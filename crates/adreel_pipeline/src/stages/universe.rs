//! Story universe extraction and reference image generation.

use super::{StageContext, StageExecution, image_resolution, json_bytes};
use crate::{SchemaShape, StageOutcome, StructuredCaller, UnitAttempt, prompts, read_payload, write_manifest};
use adreel_core::{
    ImageRequestBuilder, LlmRequestBuilder, MediaInput, StageId, Universe, UniverseDocument,
    UniverseElement, Version, disambiguate, slugify,
};
use adreel_error::{AdreelError, AdreelResult, ConfigError};
use serde_json::json;
use std::collections::HashMap;

/// Extract the recurring elements of the canonical concept.
pub(crate) async fn generate_universe(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::GenerateUniverse;
    let concept = ctx.canonical_concept(stage).await?;

    let request = LlmRequestBuilder::default()
        .messages(prompts::universe(ctx.config.brief(), &concept.text))
        .model(Some(ctx.config.models().llm_model().clone()))
        .schema(Some(prompts::universe_schema()))
        .temperature(Some(0.4f32))
        .build()
        .map_err(|e| ConfigError::new(format!("Failed to build universe request: {}", e)))?;

    let shape = SchemaShape::new("universe", &["universe", "characters"]);
    let shape = &shape;
    let caller = StructuredCaller::new(ctx.services.llm.as_ref());
    let caller = &caller;
    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![("universe".to_string(), request)], |request| async move {
            let attempt = caller.call::<UniverseDocument>(request, shape).await;
            let attempt = UnitAttempt {
                debug: attempt.debug,
                result: attempt.result.map(Universe::from_document),
            };
            ctx.persist(stage, "universe.json", attempt, json_bytes).await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, universe)) = run.successes().into_iter().next() {
        let needing = universe.elements.iter().filter(|e| e.needs_reference()).count();
        tracing::info!(
            elements = universe.elements.len(),
            needing_reference = needing,
            "Universe extracted"
        );
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &universe).await?;
    }
    Ok(execution)
}

/// Image paths generated for one element, by version name.
type ElementImages = (String, Vec<(String, String)>);

/// Generate one reference image per version of every recurring element.
pub(crate) async fn generate_reference_images(
    ctx: &StageContext<'_>,
) -> AdreelResult<StageExecution> {
    let stage = StageId::GenerateReferenceImages;
    let universe: Universe =
        read_payload(ctx.store, ctx.run, StageId::GenerateUniverse, stage).await?;

    let units = reference_units(&universe);

    let elements = &universe.elements;
    let executor = ctx.executor(stage, ctx.policy(*ctx.config.execution().workers())?);
    let run = executor
        .execute(units, |(dir, index): (String, usize)| async move {
            element_images(ctx, stage, &dir, &elements[index]).await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if execution.outcome != StageOutcome::Fatal {
        let mut with_images = universe.clone();
        for (_, (name, images)) in run.successes() {
            let Some(element) = with_images.find_mut(&name) else {
                continue;
            };
            for (version, image) in images {
                if let Some(v) = element.versions.iter_mut().find(|v| v.name == version) {
                    v.image = Some(image);
                }
            }
        }
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &with_images).await?;
    }
    Ok(execution)
}

/// Elements needing a reference, keyed by a `{category}/{slug}` directory
/// unique within the run.
fn reference_units(universe: &Universe) -> Vec<(String, (String, usize))> {
    let needing: Vec<(usize, &UniverseElement)> = universe
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| e.needs_reference())
        .collect();
    let dirs = disambiguate(
        needing
            .iter()
            .map(|(_, e)| format!("{}/{}", e.category, e.slug())),
    );
    dirs.into_iter()
        .zip(needing)
        .map(|(dir, (index, _))| (dir.clone(), (dir, index)))
        .collect()
}

/// Originals first so derived versions can reference their source image.
fn generation_order(element: &UniverseElement) -> Vec<&Version> {
    let (roots, derived): (Vec<&Version>, Vec<&Version>) = element
        .versions
        .iter()
        .partition(|v| v.derived_from.is_none());
    roots.into_iter().chain(derived).collect()
}

fn image_prompt(element: &UniverseElement, version: &Version) -> String {
    let base = if version.image_prompt.trim().is_empty() {
        &version.description
    } else {
        &version.image_prompt
    };
    format!(
        "{}. Reference sheet of the {} \"{}\" ({}), neutral background, full view.",
        base.trim().trim_end_matches('.'),
        element.category,
        element.name,
        version.name
    )
}

async fn element_images(
    ctx: &StageContext<'_>,
    stage: StageId,
    dir: &str,
    element: &UniverseElement,
) -> UnitAttempt<ElementImages> {
    let video = ctx.config.video();
    let mut generated: HashMap<&str, MediaInput> = HashMap::new();
    let mut images = Vec::new();
    let mut debug = Vec::new();

    let order = generation_order(element);
    let files = disambiguate(order.iter().map(|v| slugify(&v.name)));
    for (version, file) in order.into_iter().zip(files) {
        let references: Vec<MediaInput> = version
            .derived_from
            .as_deref()
            .and_then(|source| generated.get(source))
            .map(|media| vec![media.clone()])
            .unwrap_or_default();
        let aspect_ratio = if references.is_empty() {
            video.aspect_ratio().clone()
        } else {
            "match_input_image".to_string()
        };
        let prompt = image_prompt(element, version);
        let unit = format!("{}/{}.png", dir, file);
        debug.push(json!({
            "version": version.name,
            "prompt": prompt,
            "derived_from": version.derived_from,
            "references": references.len(),
            "aspect_ratio": aspect_ratio,
            "unit": unit,
        }));

        let request = match ImageRequestBuilder::default()
            .prompt(prompt)
            .references(references)
            .aspect_ratio(aspect_ratio)
            .resolution(Some(image_resolution(video.resolution()).to_string()))
            .output_format("png")
            .build()
        {
            Ok(request) => request,
            Err(e) => {
                let e = AdreelError::from(ConfigError::new(format!(
                    "Failed to build image request: {}",
                    e
                )));
                return UnitAttempt::new(json!({ "versions": debug }), Err(e));
            }
        };

        let media = match ctx.services.image.generate_image(&request).await {
            Ok(media) => media,
            Err(e) => return UnitAttempt::new(json!({ "versions": debug }), Err(e)),
        };
        if let Err(e) = ctx.store.put(&ctx.key(stage, unit.as_str()), &media.data).await {
            return UnitAttempt::new(json!({ "versions": debug }), Err(e));
        }
        tracing::debug!(element = %element.name, version = %version.name, "Reference image stored");

        images.push((version.name.clone(), unit));
        generated.insert(
            version.name.as_str(),
            MediaInput {
                label: version.name.clone(),
                mime_type: media.mime_type,
                data: media.data,
            },
        );
    }

    UnitAttempt::new(
        json!({ "versions": debug }),
        Ok((element.name.clone(), images)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::Category;
    use std::collections::BTreeSet;

    fn version(name: &str, derived_from: Option<&str>) -> Version {
        Version {
            name: name.to_string(),
            scenes: BTreeSet::from([1, 2]),
            description: format!("{} look", name),
            image_prompt: String::new(),
            is_original: derived_from.is_none(),
            derived_from: derived_from.map(str::to_string),
            image: None,
        }
    }

    #[test]
    fn test_originals_generate_first() {
        let element = UniverseElement {
            name: "Hero".to_string(),
            category: Category::Character,
            versions: vec![
                version("Wet", Some("Dry")),
                version("Dry", None),
            ],
        };
        let order: Vec<&str> = generation_order(&element)
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(order, vec!["Dry", "Wet"]);
    }

    #[test]
    fn test_reference_dirs_stay_unique() {
        let universe = Universe {
            elements: vec![
                UniverseElement {
                    name: "Bold".to_string(),
                    category: Category::Prop,
                    versions: vec![version("Plain", None)],
                },
                UniverseElement {
                    name: "Bold!".to_string(),
                    category: Category::Prop,
                    versions: vec![version("Plain", None)],
                },
                UniverseElement {
                    name: "Bold".to_string(),
                    category: Category::Location,
                    versions: vec![version("Plain", None)],
                },
            ],
        };
        let units = reference_units(&universe);
        let dirs: Vec<&str> = units.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(dirs, vec!["prop/bold", "prop/bold_2", "location/bold"]);
        assert_eq!(units[1].1, ("prop/bold_2".to_string(), 1));
    }

    #[test]
    fn test_image_prompt_falls_back_to_description() {
        let element = UniverseElement {
            name: "Hero".to_string(),
            category: Category::Character,
            versions: vec![version("Dry", None)],
        };
        let prompt = image_prompt(&element, &element.versions[0]);
        assert!(prompt.starts_with("Dry look."));
        assert!(prompt.contains("character \"Hero\""));
    }
}
