//! Concept stages: expansion, generation, judging, extraction, revision and
//! arbitration.

use super::{StageContext, StageExecution, json_bytes};
use crate::{
    Arbiter, ArbiterDecision, ConceptJudge, RevisionPayload, StructuredCaller, UnitAttempt,
    prompts, read_payload, write_manifest,
};
use adreel_core::{
    ConceptCandidate, ConceptRecord, EntryMode, EvaluationGroup, ScoredConcept, StageId,
    disambiguate, slugify,
};
use adreel_error::{AdreelError, AdreelResult, ConfigError, OutputError, OutputErrorKind};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

const EXPANDED_ID: &str = "expanded_concept";

/// Expand the user's concept into a full treatment.
pub(crate) async fn expand_concept(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::ExpandConcept;
    let raw = raw_concept(ctx).await?;
    let request = ctx.text_request(prompts::expand_concept(ctx.config.brief(), &raw), 0.7)?;

    let caller = StructuredCaller::new(ctx.services.llm.as_ref());
    let caller = &caller;
    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![(EXPANDED_ID.to_string(), request)], |request| async move {
            let attempt = caller.call_text(request).await;
            ctx.persist(stage, "expanded_concept.txt", attempt, |text| {
                Ok(text.as_bytes().to_vec())
            })
            .await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, text)) = run.successes().into_iter().next() {
        let mut record = ConceptRecord::new(EXPANDED_ID, text);
        record.model = Some(ctx.config.models().llm_model().clone());
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &record).await?;
    }
    Ok(execution)
}

async fn raw_concept(ctx: &StageContext<'_>) -> AdreelResult<String> {
    let entry = ctx.config.entry();
    if let Some(concept) = entry.concept()
        && !concept.trim().is_empty()
    {
        return Ok(concept.clone());
    }
    match entry.concept_file() {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigError::new(format!("Failed to read concept file {}: {}", path.display(), e))
                .into()
        }),
        None => Err(ConfigError::new("direct-concept runs need a concept or concept_file").into()),
    }
}

/// Generate one concept per ad style and model.
pub(crate) async fn generate_concepts(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::GenerateConcepts;
    let generation = ctx.config.concept_generation();

    let units = concept_units(generation.ad_styles(), generation.models());

    let caller = StructuredCaller::new(ctx.services.llm.as_ref());
    let caller = &caller;
    let executor = ctx.executor(stage, ctx.policy(*generation.workers())?);
    let run = executor
        .execute(units, |(concept_id, style, model): (String, String, String)| async move {
            let request = match ctx.request(
                prompts::generate_concept(ctx.config.brief(), &style),
                &model,
                0.9,
            ) {
                Ok(request) => request,
                Err(e) => return UnitAttempt::bare(Err(e)),
            };
            let attempt = caller.call_text(request).await;
            let attempt = ctx
                .persist(stage, &format!("{}.txt", concept_id), attempt, |text| {
                    Ok(text.as_bytes().to_vec())
                })
                .await;
            UnitAttempt {
                debug: attempt.debug,
                result: attempt.result.map(|text| ConceptCandidate {
                    concept_id,
                    ad_style: style,
                    model,
                    text,
                }),
            }
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if execution.outcome != crate::StageOutcome::Fatal {
        let candidates: Vec<ConceptCandidate> =
            run.successes().into_iter().map(|(_, c)| c).collect();
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &candidates).await?;
    }
    Ok(execution)
}

/// One unit per style and model, keyed by a concept id unique within the run.
fn concept_units(
    styles: &[String],
    models: &[String],
) -> Vec<(String, (String, String, String))> {
    let pairs: Vec<(&String, &String)> = styles
        .iter()
        .flat_map(|style| models.iter().map(move |model| (style, model)))
        .collect();
    let ids = disambiguate(
        pairs
            .iter()
            .map(|(style, model)| format!("{}__{}", slugify(style), slugify(model))),
    );
    ids.into_iter()
        .zip(pairs)
        .map(|(id, (style, model))| (id.clone(), (id, style.clone(), model.clone())))
        .collect()
}

/// Score every candidate concept.
pub(crate) async fn judge_concepts(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::JudgeConcepts;
    let concepts: Vec<ConceptRecord> = match ctx.plan.mode() {
        EntryMode::DirectConcept => {
            vec![read_payload(ctx.store, ctx.run, StageId::ExpandConcept, stage).await?]
        }
        _ => {
            let candidates: Vec<ConceptCandidate> =
                read_payload(ctx.store, ctx.run, StageId::GenerateConcepts, stage).await?;
            candidates
                .into_iter()
                .map(|c| {
                    let mut record = ConceptRecord::new(c.concept_id, c.text);
                    record.ad_style = Some(c.ad_style);
                    record.model = Some(c.model);
                    record
                })
                .collect()
        }
    };

    let units: Vec<(String, ConceptRecord)> = concepts
        .into_iter()
        .map(|c| (c.concept_id.clone(), c))
        .collect();

    let judge = ConceptJudge::new(
        ctx.services.llm.as_ref(),
        ctx.config.brief(),
        ctx.config.evaluation().judge_model(),
    );
    let judge = &judge;
    let executor = ctx.executor(stage, ctx.policy(*ctx.config.evaluation().workers())?);
    let run = executor
        .execute(units, |concept: ConceptRecord| async move {
            let attempt = judge
                .evaluate(concept.ad_style.as_deref(), &concept.text)
                .await;
            let attempt = ctx
                .persist(
                    stage,
                    &format!("{}.json", concept.concept_id),
                    attempt,
                    json_bytes,
                )
                .await;
            UnitAttempt {
                debug: attempt.debug,
                result: attempt.result.map(|evaluation| ScoredConcept {
                    concept_id: Some(concept.concept_id),
                    ad_style: concept.ad_style,
                    model: concept.model,
                    file: None,
                    concept: Some(concept.text),
                    evaluation,
                }),
            }
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if execution.outcome != crate::StageOutcome::Fatal {
        let groups = group_by_style(run.successes().into_iter().map(|(_, s)| s));
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &groups).await?;
    }
    Ok(execution)
}

/// Group scored concepts by ad style, in first-seen order.
fn group_by_style(scored: impl IntoIterator<Item = ScoredConcept>) -> Vec<EvaluationGroup> {
    let mut groups: Vec<EvaluationGroup> = Vec::new();
    for item in scored {
        match groups.iter_mut().find(|g| g.ad_style == item.ad_style) {
            Some(group) => group.evaluations.push(item),
            None => groups.push(EvaluationGroup {
                ad_style: item.ad_style.clone(),
                evaluations: vec![item],
            }),
        }
    }
    groups
}

/// External evaluation file: either wrapped or a bare list of groups.
#[derive(Deserialize)]
#[serde(untagged)]
enum EvaluationFile {
    Wrapped { evaluations: Vec<EvaluationGroup> },
    Groups(Vec<EvaluationGroup>),
}

/// Pick the highest-scoring concept.
pub(crate) async fn extract_best_concept(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::ExtractBestConcept;
    let (groups, base_dir) = match ctx.plan.mode() {
        EntryMode::PreEvaluated => load_evaluation_file(ctx).await?,
        _ => {
            let groups: Vec<EvaluationGroup> =
                read_payload(ctx.store, ctx.run, StageId::JudgeConcepts, stage).await?;
            (groups, None)
        }
    };
    let groups = &groups;
    let base_dir = base_dir.as_deref();

    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![("best_concept".to_string(), ())], |_| async move {
            let considered: usize = groups.iter().map(|g| g.evaluations.len()).sum();
            let Some(best) = best_concept(groups) else {
                return UnitAttempt::new(
                    json!({ "considered": considered }),
                    Err(OutputError::new(OutputErrorKind::Empty(
                        "no scored concepts to choose from".to_string(),
                    ))
                    .into()),
                );
            };
            let debug = json!({
                "considered": considered,
                "chosen": best.concept_id,
                "file": best.file,
                "score": best.evaluation.score,
            });
            let record = best_record(best, base_dir).await;
            let attempt = UnitAttempt::new(debug, record);
            ctx.persist(stage, "best_concept.json", attempt, json_bytes)
                .await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, record)) = run.successes().into_iter().next() {
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &record).await?;
    }
    Ok(execution)
}

async fn load_evaluation_file(
    ctx: &StageContext<'_>,
) -> AdreelResult<(Vec<EvaluationGroup>, Option<std::path::PathBuf>)> {
    let Some(path) = ctx.config.entry().evaluation_path() else {
        return Err(ConfigError::new("pre-evaluated runs need entry.evaluation_path").into());
    };
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        ConfigError::new(format!("Failed to read evaluations {}: {}", path.display(), e))
    })?;
    let file: EvaluationFile = serde_json::from_str(&text).map_err(|e| {
        ConfigError::new(format!("Failed to parse evaluations {}: {}", path.display(), e))
    })?;
    let groups = match file {
        EvaluationFile::Wrapped { evaluations } => evaluations,
        EvaluationFile::Groups(groups) => groups,
    };
    tracing::info!(path = %path.display(), groups = groups.len(), "Loaded external evaluations");
    Ok((groups, path.parent().map(Path::to_path_buf)))
}

/// Highest score wins; the first one seen wins a tie.
fn best_concept(groups: &[EvaluationGroup]) -> Option<&ScoredConcept> {
    let mut best: Option<&ScoredConcept> = None;
    for item in groups.iter().flat_map(|g| g.evaluations.iter()) {
        if best.is_none_or(|b| item.evaluation.score > b.evaluation.score) {
            best = Some(item);
        }
    }
    best
}

async fn best_record(best: &ScoredConcept, base_dir: Option<&Path>) -> AdreelResult<ConceptRecord> {
    let text = match (&best.concept, &best.file) {
        (Some(text), _) if !text.trim().is_empty() => text.clone(),
        (_, Some(file)) => {
            let path = match base_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                AdreelError::from(ConfigError::new(format!(
                    "Failed to read concept {}: {}",
                    path.display(),
                    e
                )))
            })?
        }
        _ => {
            return Err(OutputError::new(OutputErrorKind::SchemaConformance(
                "winning evaluation has neither concept text nor file".to_string(),
            ))
            .into());
        }
    };

    let concept_id = best
        .concept_id
        .clone()
        .or_else(|| {
            best.file
                .as_ref()
                .and_then(|f| f.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "best_concept".to_string());

    let mut record = ConceptRecord::new(concept_id, text).with_evaluation(best.evaluation.clone());
    record.ad_style = best.ad_style.clone();
    record.model = best.model.clone();
    Ok(record)
}

/// Revise the chosen concept against its weaknesses.
pub(crate) async fn revise_concept(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::ReviseConcept;
    let original = match ctx.plan.mode() {
        EntryMode::DirectConcept => {
            let record: ConceptRecord =
                read_payload(ctx.store, ctx.run, StageId::ExpandConcept, stage).await?;
            let groups: Vec<EvaluationGroup> =
                read_payload(ctx.store, ctx.run, StageId::JudgeConcepts, stage).await?;
            let scored = groups
                .iter()
                .flat_map(|g| g.evaluations.iter())
                .find(|s| s.concept_id.as_deref() == Some(record.concept_id.as_str()));
            match scored {
                Some(scored) => record.with_evaluation(scored.evaluation.clone()),
                None => record,
            }
        }
        _ => read_payload(ctx.store, ctx.run, StageId::ExtractBestConcept, stage).await?,
    };

    let Some(evaluation) = original.evaluation.clone() else {
        return Err(adreel_error::PipelineError::new(
            adreel_error::PipelineErrorKind::InvalidArtifact(format!(
                "concept {} has no evaluation to revise against",
                original.concept_id
            )),
        )
        .into());
    };

    let request = ctx.text_request(
        prompts::revise_concept(ctx.config.brief(), &original, &evaluation),
        0.7,
    )?;
    let caller = StructuredCaller::new(ctx.services.llm.as_ref());
    let caller = &caller;
    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![("revised_concept".to_string(), request)], |request| async move {
            let attempt = caller.call_text(request).await;
            ctx.persist(stage, "revised_concept.txt", attempt, |text| {
                Ok(text.as_bytes().to_vec())
            })
            .await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, text)) = run.successes().into_iter().next() {
        let mut revised = ConceptRecord::new(format!("{}_revised", original.concept_id), text);
        revised.ad_style = original.ad_style.clone();
        revised.model = Some(ctx.config.models().llm_model().clone());
        let payload = RevisionPayload { original, revised };
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &payload).await?;
    }
    Ok(execution)
}

/// Keep the revision only when it scores strictly higher.
pub(crate) async fn arbitrate_revision(ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    let stage = StageId::ArbitrateRevision;
    let payload: RevisionPayload =
        read_payload(ctx.store, ctx.run, StageId::ReviseConcept, stage).await?;
    let payload = &payload;

    let judge = ConceptJudge::new(
        ctx.services.llm.as_ref(),
        ctx.config.brief(),
        ctx.config.evaluation().judge_model(),
    );
    let judge = &judge;
    let executor = ctx.executor(stage, ctx.policy(1)?);
    let run = executor
        .execute(vec![("arbitration".to_string(), ())], |_| async move {
            let attempt = Arbiter::new(judge)
                .arbitrate(&payload.original, &payload.revised)
                .await;
            let attempt = ctx
                .persist(stage, "arbitration.json", attempt, json_bytes)
                .await;
            ctx.persist(stage, "canonical_concept.txt", attempt, |d: &ArbiterDecision| {
                Ok(d.canonical.text.as_bytes().to_vec())
            })
            .await
        })
        .await;

    let execution = StageExecution::from_run(&run, executor.policy());
    if let Some((_, decision)) = run.successes().into_iter().next() {
        write_manifest(ctx.store, ctx.run, stage, execution.outcome, &decision).await?;
    }
    Ok(execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::EvaluationRecord;

    fn scored(id: &str, style: &str, score: f64) -> ScoredConcept {
        ScoredConcept {
            concept_id: Some(id.to_string()),
            ad_style: Some(style.to_string()),
            model: None,
            file: None,
            concept: Some(format!("{} text", id)),
            evaluation: EvaluationRecord::new(score),
        }
    }

    #[test]
    fn test_best_concept_first_wins_tie() {
        let groups = group_by_style([
            scored("a", "bold", 80.0),
            scored("b", "quiet", 91.0),
            scored("c", "bold", 91.0),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].evaluations.len(), 2);

        let best = best_concept(&groups).unwrap();
        assert_eq!(best.concept_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_concept_ids_stay_unique() {
        let styles = vec!["Bold".to_string(), "Bold!".to_string()];
        let models = vec!["openai/gpt-5".to_string()];
        let units = concept_units(&styles, &models);
        let ids: Vec<&str> = units.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(ids, vec!["bold__openai_gpt_5", "bold__openai_gpt_5_2"]);
        assert_eq!(units[1].1.0, "bold__openai_gpt_5_2");
        assert_eq!(units[1].1.1, "Bold!");
    }

    #[test]
    fn test_best_concept_empty() {
        assert!(best_concept(&[]).is_none());
        assert!(best_concept(&[EvaluationGroup::default()]).is_none());
    }

    #[tokio::test]
    async fn test_best_record_reads_relative_file() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("concepts")).await.unwrap();
        tokio::fs::write(dir.path().join("concepts/acme_bold.txt"), "A bold concept")
            .await
            .unwrap();

        let mut item = scored("ignored", "bold", 87.0);
        item.concept_id = None;
        item.concept = None;
        item.file = Some("concepts/acme_bold.txt".into());

        let record = best_record(&item, Some(dir.path())).await.unwrap();
        assert_eq!(record.concept_id, "acme_bold");
        assert_eq!(record.text, "A bold concept");
        assert_eq!(record.evaluation.unwrap().score, 87.0);
    }

    #[test]
    fn test_evaluation_file_shapes() {
        let wrapped = r#"{"evaluations": [{"ad_style": "bold", "evaluations": [{"score": 70}]}]}"#;
        let bare = r#"[{"ad_style": "bold", "evaluations": [{"score": 70}]}]"#;
        for text in [wrapped, bare] {
            let groups = match serde_json::from_str::<EvaluationFile>(text).unwrap() {
                EvaluationFile::Wrapped { evaluations } => evaluations,
                EvaluationFile::Groups(groups) => groups,
            };
            assert_eq!(groups[0].evaluations[0].evaluation.score, 70.0);
        }
    }
}
