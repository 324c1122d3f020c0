//! Configuration types for story generation.
//!
//! Two layers of configuration exist:
//!
//! * [`StoryConfig`]: per-request options chosen by the uploader
//!   (language, mood, keywords).
//! * [`ServiceConfig`]: per-process settings (models, endpoints, retries,
//!   storage, cache lifetime), built via [`ServiceConfigBuilder`].

use crate::error::StoryError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// ── Per-request options ──────────────────────────────────────────────────

/// Language the story is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// German (default).
    #[default]
    De,
    /// English.
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::De => "de",
            Language::En => "en",
        }
    }
}

impl FromStr for Language {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "de" => Ok(Language::De),
            "en" => Ok(Language::En),
            other => Err(StoryError::InvalidArgument(format!(
                "language must be 'de' or 'en', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall tone of the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Adventure,
    Epic,
    Happy,
    Sad,
    Horror,
    Dramatic,
    Romantic,
    Mysterious,
    Inspirational,
    Dark,
}

impl Mood {
    pub const ALL: [Mood; 11] = [
        Mood::Neutral,
        Mood::Adventure,
        Mood::Epic,
        Mood::Happy,
        Mood::Sad,
        Mood::Horror,
        Mood::Dramatic,
        Mood::Romantic,
        Mood::Mysterious,
        Mood::Inspirational,
        Mood::Dark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Adventure => "adventure",
            Mood::Epic => "epic",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Horror => "horror",
            Mood::Dramatic => "dramatic",
            Mood::Romantic => "romantic",
            Mood::Mysterious => "mysterious",
            Mood::Inspirational => "inspirational",
            Mood::Dark => "dark",
        }
    }

    /// Parse a mood name; unknown names fall back to [`Mood::Neutral`].
    pub fn parse_lenient(s: &str) -> Self {
        let wanted = s.trim().to_ascii_lowercase();
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .unwrap_or_default()
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options chosen by the uploader for a single story.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryConfig {
    pub language: Language,
    pub mood: Mood,
    /// Words the model is asked to weave into the story.
    pub keywords: Vec<String>,
}

impl StoryConfig {
    /// Build a config from the raw form values of an upload request.
    pub fn from_form(
        language: Option<&str>,
        mood: Option<&str>,
        keywords: Option<&str>,
    ) -> Result<Self, StoryError> {
        let language = match language {
            Some(l) if !l.trim().is_empty() => l.parse()?,
            _ => Language::default(),
        };
        Ok(Self {
            language,
            mood: mood.map(Mood::parse_lenient).unwrap_or_default(),
            keywords: keywords.map(parse_keywords).unwrap_or_default(),
        })
    }
}

/// Split a comma-separated keyword list, trimming and dropping empties.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Service configuration ────────────────────────────────────────────────

/// Sub-directory of the storage root that holds rendered story PDFs.
pub const STORAGE_FOLDER: &str = "generated-stories";

/// Process-wide configuration for [`crate::StoryService`].
///
/// # Example
/// ```rust
/// use dragonscale_storyteller::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .model("gpt-4.1-mini")
///     .image_model("dall-e-3")
///     .cache_ttl(Duration::from_secs(3600))
///     .build()
///     .unwrap();
/// assert_eq!(config.cache_ttl, Duration::from_secs(3600));
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Chat model identifier. If None, uses `gpt-4.1-mini`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for chat completions. Default: 0.7.
    ///
    /// Story writing wants some creativity; analysis still parses reliably
    /// at this level because the prompt pins the JSON shape.
    pub temperature: f32,

    /// Maximum tokens per chat completion. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a transient chat failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-chat-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Base URL of the OpenAI-compatible image endpoint.
    pub image_base_url: String,

    /// Image model identifier. Default: `dall-e-3`.
    pub image_model: String,

    /// Bearer token for the image endpoint. Falls back to `OPENAI_API_KEY`.
    pub image_api_key: Option<String>,

    /// Requested image size. Default: `1024x1024`.
    pub image_size: String,

    /// Per-image-call timeout in seconds. Default: 120.
    pub image_timeout_secs: u64,

    /// How many phases may have their prompt/image calls in flight at once.
    /// Default: 1 (strictly sequential). Output order is always phase order.
    pub phase_concurrency: usize,

    /// Root directory under which `generated-stories/` is created.
    pub storage_dir: PathBuf,

    /// Absolute lifetime of a cached story. Default: 24 hours.
    pub cache_ttl: Duration,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Explicit path to libpdfium. If None, `PDFIUM_LIB_PATH`, the working
    /// directory and the system library path are tried in that order.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.7,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            image_base_url: "https://api.openai.com/v1".into(),
            image_model: "dall-e-3".into(),
            image_api_key: None,
            image_size: "1024x1024".into(),
            image_timeout_secs: 120,
            phase_concurrency: 1,
            storage_dir: PathBuf::from("wwwroot"),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_upload_bytes: 10 * 1024 * 1024,
            pdfium_lib_path: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("image_base_url", &self.image_base_url)
            .field("image_model", &self.image_model)
            .field("image_api_key", &self.image_api_key.as_ref().map(|_| "<redacted>"))
            .field("phase_concurrency", &self.phase_concurrency)
            .field("storage_dir", &self.storage_dir)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Chat model in effect.
    pub fn chat_model(&self) -> &str {
        self.model.as_deref().unwrap_or("gpt-4.1-mini")
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn image_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.image_base_url = url.into();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn image_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.image_api_key = Some(key.into());
        self
    }

    pub fn image_size(mut self, size: impl Into<String>) -> Self {
        self.config.image_size = size.into();
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn phase_concurrency(mut self, n: usize) -> Self {
        self.config.phase_concurrency = n.max(1);
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, StoryError> {
        let c = &self.config;
        if c.phase_concurrency == 0 {
            return Err(StoryError::InvalidConfig(
                "Phase concurrency must be ≥ 1".into(),
            ));
        }
        if c.cache_ttl.is_zero() {
            return Err(StoryError::InvalidConfig(
                "Cache TTL must be greater than zero".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(StoryError::InvalidConfig(
                "Upload limit must be greater than zero".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.image_timeout_secs == 0 {
            return Err(StoryError::InvalidConfig(
                "Request timeouts must be greater than zero".into(),
            ));
        }
        if c.image_base_url.trim().is_empty() {
            return Err(StoryError::InvalidConfig(
                "Image endpoint base URL is not configured".into(),
            ));
        }
        if c.image_model.trim().is_empty() {
            return Err(StoryError::InvalidConfig(
                "Image model is not configured".into(),
            ));
        }
        Ok(self.config)
    }
}
