//! The AI seam of the service: content analysis, story writing, image
//! prompts and images.
//!
//! [`StoryAi`] is what [`crate::StoryService`] talks to. The production
//! implementation, [`ProviderStoryAi`], sends chat calls through an
//! `edgequake-llm` provider and image calls through [`ImageClient`]; tests
//! substitute a scripted fake.

use crate::config::{ServiceConfig, StoryConfig};
use crate::error::{AiErrorKind, StoryError};
use crate::pipeline::images::ImageClient;
use crate::pipeline::llm::{self, ChatSettings};
use crate::prompts;
use crate::story::{ContentAnalysis, StoryDraft, StoryPhase};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, info};

/// Model-backed operations of the story pipeline.
#[async_trait]
pub trait StoryAi: Send + Sync {
    /// Extract facts, entities and concepts from document text.
    async fn analyze_content(&self, text: &str) -> Result<ContentAnalysis, StoryError>;

    /// Write a four-phase story from an analysis.
    async fn generate_story(
        &self,
        analysis: &ContentAnalysis,
        config: &StoryConfig,
    ) -> Result<StoryDraft, StoryError>;

    /// Describe one phase as an image-generation prompt.
    async fn generate_image_prompt(&self, phase: &StoryPhase) -> Result<String, StoryError>;

    /// Produce image bytes for a prompt.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, StoryError>;
}

/// [`StoryAi`] backed by an `edgequake-llm` chat provider and an
/// OpenAI-compatible image endpoint.
pub struct ProviderStoryAi {
    provider: Arc<dyn LLMProvider>,
    settings: ChatSettings,
    images: ImageClient,
}

impl ProviderStoryAi {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: ChatSettings, images: ImageClient) -> Self {
        Self {
            provider,
            settings,
            images,
        }
    }

    /// Resolve the chat provider and build the image client from `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StoryError> {
        let provider = resolve_provider(config)?;
        let images = ImageClient::from_config(config)?;
        Ok(Self::new(provider, ChatSettings::from(config), images))
    }
}

#[async_trait]
impl StoryAi for ProviderStoryAi {
    async fn analyze_content(&self, text: &str) -> Result<ContentAnalysis, StoryError> {
        if text.trim().is_empty() {
            return Err(StoryError::InvalidArgument(
                "Text content cannot be empty".into(),
            ));
        }
        info!("Starting content analysis ({} chars)", text.len());
        let reply = llm::chat_with_retry(
            &self.provider,
            prompts::ANALYSIS_SYSTEM_PROMPT,
            &prompts::analysis_prompt(text),
            &self.settings,
            "Content analysis",
            AiErrorKind::ContentAnalysisFailed,
        )
        .await?;
        let analysis = llm::parse_content_analysis(&reply)?;
        info!(
            "Content analysis completed: {} facts, {} entities, {} concepts",
            analysis.key_facts.len(),
            analysis.entities.len(),
            analysis.concepts.len()
        );
        Ok(analysis)
    }

    async fn generate_story(
        &self,
        analysis: &ContentAnalysis,
        config: &StoryConfig,
    ) -> Result<StoryDraft, StoryError> {
        info!(
            "Starting story generation: language={}, mood={}, {} keywords",
            config.language,
            config.mood,
            config.keywords.len()
        );
        let reply = llm::chat_with_retry(
            &self.provider,
            prompts::STORYTELLER_SYSTEM_PROMPT,
            &prompts::story_prompt(analysis, config),
            &self.settings,
            "Story generation",
            AiErrorKind::StoryGenerationFailed,
        )
        .await?;
        let draft = llm::parse_story_draft(&reply)?;
        info!("Story generated: '{}'", draft.title);
        Ok(draft)
    }

    async fn generate_image_prompt(&self, phase: &StoryPhase) -> Result<String, StoryError> {
        let context = format!("Image prompt generation for phase: {}", phase.name);
        let reply = llm::chat_with_retry(
            &self.provider,
            prompts::IMAGE_PROMPT_SYSTEM_PROMPT,
            &prompts::image_prompt_request(phase),
            &self.settings,
            &context,
            AiErrorKind::ImagePromptGenerationFailed,
        )
        .await?;
        let prompt = llm::clean_image_prompt(&reply, &phase.name)?;
        debug!("Image prompt for {}: {} chars", phase.name, prompt.len());
        Ok(prompt)
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, StoryError> {
        if prompt.trim().is_empty() {
            return Err(StoryError::InvalidArgument(
                "Image prompt cannot be empty".into(),
            ));
        }
        self.images.generate(prompt).await
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_chat_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, StoryError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StoryError::InvalidConfig(format!("LLM provider '{provider_name}' unavailable: {e}"))
    })
}

/// Resolve the chat provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI, when `OPENAI_API_KEY` is set
/// 5. whatever [`ProviderFactory::from_env`] can detect
pub fn resolve_provider(config: &ServiceConfig) -> Result<Arc<dyn LLMProvider>, StoryError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_chat_provider(name, config.chat_model());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_chat_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_chat_provider("openai", config.chat_model());
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        StoryError::InvalidConfig(format!(
            "No LLM provider could be auto-detected from environment. \
             Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider. Error: {e}"
        ))
    })?;

    Ok(llm_provider)
}
