//! Image generation over an OpenAI-compatible `/images/generations` endpoint.
//!
//! The client always asks for `b64_json`. Some compatible servers ignore
//! that and answer with a `url`; in that case the image is downloaded.
//! Whatever arrives must sniff as a real image format, otherwise the call
//! counts as an [`AiErrorKind::InvalidResponse`].

use crate::config::ServiceConfig;
use crate::error::{AiErrorKind, StoryError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
    #[allow(dead_code)]
    revised_prompt: Option<String>,
}

/// What the endpoint handed back for the first image.
#[derive(Debug, PartialEq, Eq)]
pub enum ImagePayload {
    Bytes(Vec<u8>),
    Url(String),
}

/// HTTP client for the image endpoint.
#[derive(Debug, Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    size: String,
}

impl ImageClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        size: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoryError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            size: size.into(),
        })
    }

    /// Build a client from the service config; the key falls back to
    /// `OPENAI_API_KEY`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StoryError> {
        let api_key = config
            .image_api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("No image API key configured; image requests will be unauthenticated");
        }
        Self::new(
            config.image_base_url.clone(),
            api_key,
            config.image_model.clone(),
            config.image_size.clone(),
            Duration::from_secs(config.image_timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    /// Generate one image for `prompt` and return its raw bytes.
    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>, StoryError> {
        let context = "Image generation";
        let start = Instant::now();
        let body = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
            response_format: "b64_json",
        };

        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| transport_error(context, e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| transport_error(context, e))?;
        if !status.is_success() {
            let kind = AiErrorKind::from_status(status.as_u16(), AiErrorKind::ImageGenerationFailed);
            return Err(StoryError::ai(
                kind,
                context,
                format!("HTTP {}: {}", status.as_u16(), truncate(&text, 300)),
            ));
        }

        let bytes = match parse_image_response(&text)? {
            ImagePayload::Bytes(bytes) => bytes,
            ImagePayload::Url(url) => {
                debug!("Image endpoint returned a URL; downloading");
                self.download(&url).await?
            }
        };

        if image::guess_format(&bytes).is_err() {
            return Err(StoryError::ai(
                AiErrorKind::InvalidResponse,
                context,
                "Image payload is not a recognised image format",
            ));
        }

        info!(
            "Image generated: {} bytes in {:?}",
            bytes.len(),
            start.elapsed()
        );
        Ok(bytes)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StoryError> {
        let context = "Image download";
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(context, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoryError::ai(
                AiErrorKind::from_status(status.as_u16(), AiErrorKind::ImageGenerationFailed),
                context,
                format!("HTTP {}", status.as_u16()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(context, e))?;
        Ok(bytes.to_vec())
    }
}

/// Decode the JSON body of a successful image response.
pub fn parse_image_response(body: &str) -> Result<ImagePayload, StoryError> {
    let context = "Image generation";
    let parsed: ImageResponse = serde_json::from_str(body).map_err(|e| {
        StoryError::ai(
            AiErrorKind::InvalidResponse,
            context,
            format!("Response is not valid JSON: {e}"),
        )
    })?;
    let first = parsed.data.into_iter().next().ok_or_else(|| {
        StoryError::ai(AiErrorKind::InvalidResponse, context, "Response contained no images")
    })?;

    if let Some(b64) = first.b64_json.filter(|s| !s.is_empty()) {
        let bytes = BASE64.decode(b64.trim()).map_err(|e| {
            StoryError::ai(
                AiErrorKind::InvalidResponse,
                context,
                format!("Invalid base64 image data: {e}"),
            )
        })?;
        return Ok(ImagePayload::Bytes(bytes));
    }
    if let Some(url) = first.url.filter(|s| !s.is_empty()) {
        return Ok(ImagePayload::Url(url));
    }
    Err(StoryError::ai(
        AiErrorKind::InvalidResponse,
        context,
        "Image entry had neither b64_json nor url",
    ))
}

fn transport_error(context: &str, e: reqwest::Error) -> StoryError {
    let kind = if e.is_timeout() || e.is_connect() {
        AiErrorKind::ServiceUnavailable
    } else {
        e.status()
            .map(|s| AiErrorKind::from_status(s.as_u16(), AiErrorKind::ImageGenerationFailed))
            .unwrap_or(AiErrorKind::ImageGenerationFailed)
    };
    StoryError::ai(kind, context, e.to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
