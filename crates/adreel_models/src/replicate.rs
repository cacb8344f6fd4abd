//! Replicate prediction client for image and video models.

use crate::http::{env_credential, retry_transient, transport_error};
use adreel_core::{GeneratedMedia, ImageRequest, MediaInput, VideoRequest};
use adreel_error::{AdreelResult, ServiceError, ServiceErrorKind};
use adreel_interface::{ImageService, VideoService};
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

const REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

/// Error fragments Replicate models use when a safety filter trips.
const POLICY_MARKERS: &[&str] = &[
    "sensitive",
    "safety",
    "nsfw",
    "content policy",
    "flagged",
    "e005",
];

/// A Replicate prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Prediction id
    pub id: String,
    /// `starting`, `processing`, `succeeded`, `failed` or `canceled`
    pub status: String,
    /// Output URL or list of URLs
    #[serde(default)]
    pub output: Option<Value>,
    /// Error text for failed predictions
    #[serde(default)]
    pub error: Option<Value>,
    /// Polling links
    #[serde(default)]
    pub urls: PredictionUrls,
}

/// Polling links for a prediction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionUrls {
    /// URL to poll
    #[serde(default)]
    pub get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL, whether the model returns a string or a list.
    pub fn output_url(&self) -> Option<&str> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url),
            Value::Array(items) => items.iter().find_map(|v| v.as_str()),
            _ => None,
        }
    }

    /// Map a failed or canceled prediction onto a service error.
    pub fn failure(&self) -> ServiceError {
        let message = match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {} {}", self.id, self.status),
        };
        let lowered = message.to_lowercase();
        if POLICY_MARKERS.iter().any(|m| lowered.contains(m)) {
            ServiceError::new(ServiceErrorKind::ContentPolicy(message))
        } else {
            ServiceError::new(ServiceErrorKind::InvalidResponse(format!(
                "prediction {} {}: {}",
                self.id, self.status, message
            )))
        }
    }
}

/// Replicate API client.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    client: Client,
    api_token: String,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReplicateClient {
    /// Creates a new client.
    ///
    /// Reads the token from the `REPLICATE_API_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not set.
    pub fn new() -> AdreelResult<Self> {
        let token = env_credential("REPLICATE_API_TOKEN")?;
        Ok(Self::with_token(token))
    }

    /// Creates a new client with an explicit token.
    pub fn with_token(api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_token: api_token.into(),
            base_url: REPLICATE_API_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(900),
        }
    }

    /// Override the polling cadence and overall deadline.
    pub fn with_polling(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_wait = max_wait;
        self
    }

    /// Run a prediction to completion and download its output.
    #[instrument(skip(self, input), fields(model = %model))]
    pub async fn run(&self, model: &str, input: Value, fallback_mime: &str) -> AdreelResult<GeneratedMedia> {
        let url = format!("{}/models/{}/predictions", self.base_url, model);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait=60")
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| transport_error("replicate", e))?;

        let mut prediction = Self::read_prediction(response).await?;
        info!(prediction = %prediction.id, status = %prediction.status, "Prediction created");

        while !prediction.is_terminal() {
            if started.elapsed() > self.max_wait {
                warn!(prediction = %prediction.id, "Prediction exceeded deadline");
                return Err(ServiceError::new(ServiceErrorKind::Timeout(format!(
                    "prediction {} still {} after {}s",
                    prediction.id,
                    prediction.status,
                    self.max_wait.as_secs()
                )))
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;

            let poll_url = prediction.urls.get.clone().ok_or_else(|| {
                ServiceError::new(ServiceErrorKind::InvalidResponse(format!(
                    "prediction {} has no polling url",
                    prediction.id
                )))
            })?;
            let poll_url = poll_url.as_str();
            let this = self;
            prediction = retry_transient("replicate poll", move || async move {
                let response = this
                    .client
                    .get(poll_url)
                    .bearer_auth(&this.api_token)
                    .send()
                    .await
                    .map_err(|e| transport_error("replicate", e))?;
                Self::read_prediction(response).await
            })
            .await?;
            debug!(prediction = %prediction.id, status = %prediction.status, "Polled prediction");
        }

        if prediction.status != "succeeded" {
            let failure = prediction.failure();
            error!(prediction = %prediction.id, error = %failure, "Prediction failed");
            return Err(failure.into());
        }

        let output_url = prediction.output_url().ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::InvalidResponse(format!(
                "prediction {} succeeded without an output url",
                prediction.id
            )))
        })?;

        let client = &self.client;
        let data = retry_transient("replicate download", move || async move {
            let response = client
                .get(output_url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| transport_error("replicate", e))?;
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| transport_error("replicate", e))
        })
        .await?;

        info!(
            prediction = %prediction.id,
            size = data.len(),
            elapsed_secs = started.elapsed().as_secs(),
            "Downloaded prediction output"
        );

        Ok(GeneratedMedia {
            data,
            mime_type: mime_from_url(output_url).unwrap_or(fallback_mime).to_string(),
            source_url: Some(output_url.to_string()),
        })
    }

    async fn read_prediction(response: reqwest::Response) -> Result<Prediction, ServiceError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Replicate returned error");
            return Err(ServiceError::from_status(status.as_u16(), body));
        }
        response.json().await.map_err(|e| {
            ServiceError::new(ServiceErrorKind::InvalidResponse(format!(
                "Failed to parse prediction: {}",
                e
            )))
        })
    }
}

/// Encode an input as a `data:` URI.
pub fn data_uri(input: &MediaInput) -> String {
    format!(
        "data:{};base64,{}",
        input.mime_type,
        base64::engine::general_purpose::STANDARD.encode(&input.data)
    )
}

fn mime_from_url(url: &str) -> Option<&'static str> {
    let path = url.split('?').next()?;
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

/// Build the prediction input for an image model.
pub fn image_input(request: &ImageRequest) -> Value {
    let mut input = json!({
        "prompt": request.prompt(),
        "aspect_ratio": request.aspect_ratio(),
        "output_format": request.output_format(),
    });
    if let Some(resolution) = request.resolution() {
        input["resolution"] = json!(resolution);
    }
    if !request.references().is_empty() {
        let refs: Vec<String> = request.references().iter().map(data_uri).collect();
        input["image_input"] = json!(refs);
    }
    input
}

/// Build the prediction input for a video model.
///
/// Sora takes `seconds` and an orientation word; Veo-style models take
/// `duration`, `resolution` and an explicit ratio.
pub fn video_input(model: &str, request: &VideoRequest) -> Value {
    let frame = data_uri(request.first_frame());
    if model.contains("sora") {
        let orientation = if request.aspect_ratio() == "9:16" {
            "portrait"
        } else {
            "landscape"
        };
        json!({
            "prompt": request.prompt(),
            "seconds": request.duration_seconds(),
            "aspect_ratio": orientation,
            "input_reference": frame,
        })
    } else {
        json!({
            "prompt": request.prompt(),
            "image": frame,
            "duration": request.duration_seconds(),
            "resolution": request.resolution(),
            "aspect_ratio": request.aspect_ratio(),
            "generate_audio": request.generate_audio(),
        })
    }
}

/// An image model served by Replicate.
#[derive(Debug, Clone)]
pub struct ReplicateImageModel {
    client: ReplicateClient,
    model: String,
}

impl ReplicateImageModel {
    /// Bind a client to an image model such as `google/nano-banana-pro`.
    pub fn new(client: ReplicateClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl ImageService for ReplicateImageModel {
    #[instrument(skip(self, request), fields(model = %self.model, references = request.references().len()))]
    async fn generate_image(&self, request: &ImageRequest) -> AdreelResult<GeneratedMedia> {
        self.client
            .run(&self.model, image_input(request), "image/png")
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// A video model served by Replicate.
#[derive(Debug, Clone)]
pub struct ReplicateVideoModel {
    client: ReplicateClient,
    model: String,
}

impl ReplicateVideoModel {
    /// Bind a client to a video model such as `google/veo-3-fast`.
    pub fn new(client: ReplicateClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl VideoService for ReplicateVideoModel {
    #[instrument(skip(self, request), fields(model = %self.model, duration = request.duration_seconds()))]
    async fn generate_video(&self, request: &VideoRequest) -> AdreelResult<GeneratedMedia> {
        self.client
            .run(&self.model, video_input(&self.model, request), "video/mp4")
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::{ImageRequestBuilder, VideoRequestBuilder};

    fn frame() -> MediaInput {
        MediaInput {
            label: "scene_1.png".into(),
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(data_uri(&frame()), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_image_input_omits_empty_references() {
        let request = ImageRequestBuilder::default()
            .prompt("A pier at dusk")
            .build()
            .unwrap();
        let input = image_input(&request);
        assert_eq!(input["aspect_ratio"], "16:9");
        assert!(input.get("image_input").is_none());
    }

    #[test]
    fn test_video_input_per_family() {
        let request = VideoRequestBuilder::default()
            .prompt("The watch spins")
            .first_frame(frame())
            .duration_seconds(8u32)
            .build()
            .unwrap();

        let veo = video_input("google/veo-3-fast", &request);
        assert_eq!(veo["duration"], 8);
        assert_eq!(veo["generate_audio"], true);
        assert!(veo["image"].as_str().unwrap().starts_with("data:image/png"));

        let sora = video_input("openai/sora-2", &request);
        assert_eq!(sora["seconds"], 8);
        assert_eq!(sora["aspect_ratio"], "landscape");
        assert!(sora.get("duration").is_none());
    }

    #[test]
    fn test_failure_classification() {
        let mut prediction = Prediction {
            id: "p1".into(),
            status: "failed".into(),
            output: None,
            error: Some(json!("The input was flagged as sensitive (E005)")),
            urls: PredictionUrls::default(),
        };
        assert!(matches!(prediction.failure().kind, ServiceErrorKind::ContentPolicy(_)));

        prediction.error = Some(json!("CUDA out of memory"));
        assert!(matches!(prediction.failure().kind, ServiceErrorKind::InvalidResponse(_)));
    }

    #[test]
    fn test_output_url_shapes() {
        let mut prediction = Prediction {
            id: "p1".into(),
            status: "succeeded".into(),
            output: Some(json!("https://x/out.mp4")),
            error: None,
            urls: PredictionUrls::default(),
        };
        assert_eq!(prediction.output_url(), Some("https://x/out.mp4"));
        prediction.output = Some(json!(["https://x/a.png", "https://x/b.png"]));
        assert_eq!(prediction.output_url(), Some("https://x/a.png"));
        assert_eq!(mime_from_url("https://x/a.png?sig=1"), Some("image/png"));
    }
}
