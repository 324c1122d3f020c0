//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dragonscale_storyteller::prompts::PHASE_NAMES;
use dragonscale_storyteller::story::PhaseDraft;
use dragonscale_storyteller::{
    AiErrorKind, ContentAnalysis, GeneratedStory, PdfErrorKind, PdfTextExtractor, ServiceConfig,
    StoryAi, StoryConfig, StoryDraft, StoryError, StoryPhase, StoryRenderer, StoryService,
    StoryStorage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAKE_PDF: &[u8] = b"%PDF-1.7 rendered story";
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake image";

/// Returns fixed text, or `NoTextContent` when built with `None`.
pub struct FakeExtractor(pub Option<String>);

impl PdfTextExtractor for FakeExtractor {
    fn extract_text(&self, _bytes: &[u8]) -> Result<String, StoryError> {
        self.0
            .clone()
            .ok_or_else(|| StoryError::pdf(PdfErrorKind::NoTextContent, "no text"))
    }
}

/// Scripted AI. Images fail for phases named in `image_failures`, prompts
/// fail for the phase named in `prompt_failure`.
#[derive(Default)]
pub struct FakeAi {
    pub image_failures: Vec<&'static str>,
    pub prompt_failure: Option<&'static str>,
    /// Delay each phase's prompt by `(4 - order) * step` to scramble completion order.
    pub stagger: Option<Duration>,
    pub configs_seen: Mutex<Vec<StoryConfig>>,
    pub image_calls: AtomicUsize,
}

#[async_trait]
impl StoryAi for FakeAi {
    async fn analyze_content(&self, text: &str) -> Result<ContentAnalysis, StoryError> {
        Ok(ContentAnalysis {
            key_facts: vec![text.to_string()],
            overall_context: "a test document".into(),
            source_type: "manual".into(),
            ..Default::default()
        })
    }

    async fn generate_story(
        &self,
        _analysis: &ContentAnalysis,
        config: &StoryConfig,
    ) -> Result<StoryDraft, StoryError> {
        self.configs_seen.lock().unwrap().push(config.clone());
        Ok(StoryDraft {
            title: "The Lantern Keeper".into(),
            phases: PHASE_NAMES
                .iter()
                .map(|name| PhaseDraft {
                    name: name.to_string(),
                    summary: format!("{name} happens."),
                    mood: "calm".into(),
                })
                .collect(),
        })
    }

    async fn generate_image_prompt(&self, phase: &StoryPhase) -> Result<String, StoryError> {
        if let Some(step) = self.stagger {
            tokio::time::sleep(step * (4 - phase.order as u32)).await;
        }
        if self.prompt_failure == Some(phase.name.as_str()) {
            return Err(StoryError::ai(
                AiErrorKind::ImagePromptGenerationFailed,
                format!("Image prompt generation for phase: {}", phase.name),
                "model refused",
            ));
        }
        Ok(format!("A painting of {}", phase.name))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, StoryError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if self.image_failures.iter().any(|name| prompt.ends_with(name)) {
            return Err(StoryError::ai(
                AiErrorKind::RateLimitExceeded,
                "Image generation",
                "HTTP 429",
            ));
        }
        Ok(FAKE_PNG.to_vec())
    }
}

/// Counts renders and returns fixed bytes.
#[derive(Default)]
pub struct FakeRenderer {
    pub renders: AtomicUsize,
}

impl StoryRenderer for FakeRenderer {
    fn render(&self, story: &GeneratedStory) -> Result<Vec<u8>, StoryError> {
        if story.phases.is_empty() {
            return Err(StoryError::InvalidArgument("no phases".into()));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(FAKE_PDF.to_vec())
    }
}

pub struct Harness {
    pub service: StoryService,
    pub ai: Arc<FakeAi>,
    pub renderer: Arc<FakeRenderer>,
    pub dir: tempfile::TempDir,
}

/// Route pipeline logs through the test writer; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn harness_with(ai: FakeAi, extractor: FakeExtractor, config: ServiceConfig) -> Harness {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = StoryStorage::new(dir.path()).await.unwrap();
    let ai = Arc::new(ai);
    let renderer = Arc::new(FakeRenderer::default());
    let service = StoryService::new(
        Arc::new(extractor),
        ai.clone(),
        renderer.clone(),
        storage,
        &config,
    );
    Harness {
        service,
        ai,
        renderer,
        dir,
    }
}

pub async fn harness(ai: FakeAi) -> Harness {
    harness_with(
        ai,
        FakeExtractor(Some("Insert tab A into slot B.".into())),
        ServiceConfig::default(),
    )
    .await
}
