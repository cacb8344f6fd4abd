//! Scripted fakes for the LLM, image, video and merge services.

use adreel_core::{
    GeneratedMedia, ImageRequest, LlmRequest, LlmResponse, Role, VideoRequest,
};
use adreel_error::{AdreelResult, ServiceError, ServiceErrorKind};
use adreel_interface::{ImageService, LlmService, MediaMerger, VideoService};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const UNIVERSE_JSON: &str = r#"Here is the universe:
```json
{
  "universe": {
    "locations": [
      {"name": "Beach", "scenes_used": [1], "description": "A sunny beach",
       "image_generation_prompt": "A sunny beach at noon"}
    ],
    "props": [
      {"name": "Watch", "scenes_used": [1, 2], "description": "A gold watch",
       "image_generation_prompt": "A gold wristwatch"}
    ]
  },
  "characters": [
    {"name": "Hero", "has_multiple_versions": true, "versions": [
      {"version_name": "Dry", "scenes_used": [1], "description": "Hero in a suit",
       "image_generation_prompt": "A man in a grey suit", "is_original": true},
      {"version_name": "Wet", "scenes_used": [2], "description": "Hero soaked",
       "image_generation_prompt": "The same man soaked", "references_original_version": true}
    ]}
  ],
}
```"#;

const SCENES_JSON: &str = r#"{"scenes": [
  {"scene_number": 1, "duration_seconds": 6.0, "video_summary": "Hero checks the watch on the beach",
   "audio_summary": "Waves", "first_frame_image_prompt": "Hero on the beach",
   "elements_used": {"characters": ["Hero (Dry)"], "props": ["Watch"], "locations": ["Beach"]}},
  {"scene_number": 2, "duration_seconds": 5.5, "video_summary": "Hero dives in and the watch keeps ticking",
   "audio_summary": "Splash", "first_frame_image_prompt": "Hero underwater",
   "elements_used": {"characters": ["Hero"], "props": ["Watch"]}}
]}"#;

/// LLM fake that answers by recognizing the stage from the system prompt.
pub struct ScriptedLlm {
    calls: AtomicUsize,
    revision_score: f64,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            revision_score: 90.0,
        }
    }
}

#[allow(dead_code)]
impl ScriptedLlm {
    /// Fake whose revisions receive `score`.
    pub fn with_revision_score(score: f64) -> Self {
        Self {
            revision_score: score,
            ..Self::default()
        }
    }

    /// Completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn judge(&self, concept: &str) -> String {
        let score = if concept.contains("REVISED") {
            self.revision_score
        } else if concept.contains("Quiet") {
            85.0
        } else {
            70.0
        };
        // Fenced with a trailing comma to go through extraction and repair
        format!(
            "```json\n{{\"score\": {}, \"explanation\": \"Solid\", \"strengths\": [\"hook\"], \"weaknesses\": [\"pacing\"],}}\n```",
            score
        )
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(&self, request: &LlmRequest) -> AdreelResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = request
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<String>();
        let user = request
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<String>();

        let text = if system.contains("expert advertising judge") {
            self.judge(&user)
        } else if system.contains("award-winning ad creative") {
            let style = user
                .lines()
                .find_map(|l| l.strip_prefix("AD STYLE: "))
                .unwrap_or("Plain");
            format!("A {} concept: the watch stops time for one perfect wave.", style)
        } else if system.contains("ad creative who expands") {
            "EXPANDED concept in five scenes about a watch and a wave.".to_string()
        } else if system.contains("creative director revising") {
            "REVISED concept with tighter pacing.".to_string()
        } else if system.contains("production designer") {
            UNIVERSE_JSON.to_string()
        } else if system.contains("scene-by-scene shot plan") {
            SCENES_JSON.to_string()
        } else {
            return Err(ServiceError::from_status(400, "unrecognized prompt").into());
        };
        Ok(LlmResponse::text(text))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted/model"
    }
}

/// Image fake that records requests and can reject prompts.
#[derive(Default)]
pub struct FakeImage {
    requests: Mutex<Vec<ImageRequest>>,
    reject_prompt: Option<String>,
}

#[allow(dead_code)]
impl FakeImage {
    /// Fake that refuses any prompt containing `marker`.
    pub fn rejecting(marker: &str) -> Self {
        Self {
            reject_prompt: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageService for FakeImage {
    async fn generate_image(&self, request: &ImageRequest) -> AdreelResult<GeneratedMedia> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(marker) = &self.reject_prompt
            && request.prompt().contains(marker.as_str())
        {
            return Err(ServiceError::new(ServiceErrorKind::ContentPolicy("flagged".into())).into());
        }
        Ok(GeneratedMedia {
            data: format!("PNG {}", request.prompt()).into_bytes(),
            mime_type: "image/png".to_string(),
            source_url: None,
        })
    }

    fn model_name(&self) -> &str {
        "fake/image"
    }
}

/// Video fake that can reject prompts and fail transiently.
#[derive(Default)]
pub struct FakeVideo {
    calls: AtomicUsize,
    reject_prompt: Option<String>,
    transient_failures: AtomicUsize,
}

#[allow(dead_code)]
impl FakeVideo {
    /// Fake that refuses any prompt containing `marker`.
    pub fn rejecting(marker: &str) -> Self {
        Self {
            reject_prompt: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// Fake whose first `n` calls fail with a rate limit.
    pub fn flaky(n: usize) -> Self {
        Self {
            transient_failures: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoService for FakeVideo {
    async fn generate_video(&self, request: &VideoRequest) -> AdreelResult<GeneratedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::from_status(429, "slow down").into());
        }
        if let Some(marker) = &self.reject_prompt
            && request.prompt().contains(marker.as_str())
        {
            return Err(ServiceError::new(ServiceErrorKind::ContentPolicy("flagged".into())).into());
        }
        Ok(GeneratedMedia {
            data: format!("MP4 {}s", request.duration_seconds()).into_bytes(),
            mime_type: "video/mp4".to_string(),
            source_url: None,
        })
    }

    fn model_name(&self) -> &str {
        "fake/video"
    }
}

/// Merger that concatenates its inputs.
pub struct FakeMerger;

#[async_trait]
impl MediaMerger for FakeMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> AdreelResult<()> {
        if inputs.is_empty() {
            return Err(ServiceError::new(ServiceErrorKind::Tool("no clips".into())).into());
        }
        let mut merged = Vec::new();
        for input in inputs {
            let data = tokio::fs::read(input)
                .await
                .map_err(|e| ServiceError::new(ServiceErrorKind::Tool(e.to_string())))?;
            merged.extend(data);
        }
        tokio::fs::write(output, merged)
            .await
            .map_err(|e| ServiceError::new(ServiceErrorKind::Tool(e.to_string())))?;
        Ok(())
    }
}
