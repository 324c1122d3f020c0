//! Story orchestration: PDF upload → finished, cached, stored story.
//!
//! [`StoryService`] composes five collaborators: a text extractor, the AI
//! seam, a renderer, on-disk storage and the in-memory cache. The first
//! three sit behind traits so tests can substitute fakes.

use crate::ai::{ProviderStoryAi, StoryAi};
use crate::cache::StoryCache;
use crate::config::{ServiceConfig, StoryConfig};
use crate::error::{AiErrorKind, PdfErrorKind, PhaseImageError, StoryError};
use crate::pipeline::extract::{PdfTextExtractor, PdfiumExtractor};
use crate::pipeline::render::{PdfiumRenderer, StoryRenderer};
use crate::progress::{NoopProgressCallback, PipelineStep, ProgressCallback};
use crate::storage::StoryStorage;
use crate::story::{new_story_id, GeneratedStory, StoryPhase};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct StoryService {
    extractor: Arc<dyn PdfTextExtractor>,
    ai: Arc<dyn StoryAi>,
    renderer: Arc<dyn StoryRenderer>,
    storage: StoryStorage,
    cache: StoryCache,
    phase_concurrency: usize,
    max_upload_bytes: usize,
    progress: ProgressCallback,
}

impl StoryService {
    /// Assemble a service from explicit collaborators. Limits and the cache
    /// lifetime are taken from `config`.
    pub fn new(
        extractor: Arc<dyn PdfTextExtractor>,
        ai: Arc<dyn StoryAi>,
        renderer: Arc<dyn StoryRenderer>,
        storage: StoryStorage,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            extractor,
            ai,
            renderer,
            storage,
            cache: StoryCache::new(config.cache_ttl),
            phase_concurrency: config.phase_concurrency.max(1),
            max_upload_bytes: config.max_upload_bytes,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Build the production service: pdfium for extraction and rendering,
    /// an `edgequake-llm` provider plus the image endpoint for AI calls.
    pub async fn from_config(config: ServiceConfig) -> Result<Self, StoryError> {
        let ai = ProviderStoryAi::from_config(&config)?;
        let storage = StoryStorage::new(&config.storage_dir).await?;
        info!(
            "Story service ready: chat model {}, image model {}, storage {}",
            config.chat_model(),
            config.image_model,
            config.storage_dir.display()
        );
        Ok(Self::new(
            Arc::new(PdfiumExtractor::new(config.pdfium_lib_path.clone())),
            Arc::new(ai),
            Arc::new(PdfiumRenderer::new(config.pdfium_lib_path.clone())),
            storage,
            &config,
        ))
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = callback;
        self
    }

    pub fn cache(&self) -> &StoryCache {
        &self.cache
    }

    pub fn storage(&self) -> &StoryStorage {
        &self.storage
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    // ── Create ───────────────────────────────────────────────────────────

    /// Run the full pipeline on an uploaded PDF.
    ///
    /// Image-generation failures are recorded on the affected phase and do
    /// not fail the story; every other failure is returned.
    pub async fn create_story_from_pdf(
        &self,
        pdf: &[u8],
        file_name: &str,
        config: Option<StoryConfig>,
    ) -> Result<GeneratedStory, StoryError> {
        let start = Instant::now();
        info!("Starting story generation from PDF: {}", file_name);

        let result = self.run_pipeline(pdf, file_name, config.unwrap_or_default()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(story) => {
                info!(
                    "Story generation completed: {} ('{}'), {}/{} phases illustrated, {}ms",
                    story.id,
                    story.title,
                    story.illustrated_phases(),
                    story.phases.len(),
                    elapsed_ms
                );
                self.progress.on_story_complete(&story.id, elapsed_ms);
            }
            Err(e) => error!(
                "Story generation failed for {} after {}ms: [{}] {}",
                file_name,
                elapsed_ms,
                e.code(),
                e
            ),
        }
        result
    }

    async fn run_pipeline(
        &self,
        pdf: &[u8],
        file_name: &str,
        config: StoryConfig,
    ) -> Result<GeneratedStory, StoryError> {
        // ── Step 1: Validate input ───────────────────────────────────────
        if file_name.trim().is_empty() {
            return Err(StoryError::InvalidArgument("File name cannot be empty".into()));
        }
        if pdf.len() > self.max_upload_bytes {
            return Err(StoryError::pdf(
                PdfErrorKind::FileSizeExceeded,
                format!(
                    "File '{}' is {} bytes; the limit is {} bytes",
                    file_name,
                    pdf.len(),
                    self.max_upload_bytes
                ),
            ));
        }

        // ── Step 2: Extract text ─────────────────────────────────────────
        self.progress.on_step(PipelineStep::ExtractingText);
        let step = Instant::now();
        let text = self.extract_text(pdf).await?;
        info!("Extracted {} characters in {:?}", text.len(), step.elapsed());

        // ── Step 3: Analyse content ──────────────────────────────────────
        self.progress.on_step(PipelineStep::AnalyzingContent);
        let step = Instant::now();
        let analysis = self.ai.analyze_content(&text).await?;
        info!("Content analysed in {:?}", step.elapsed());

        // ── Step 4: Write the story ──────────────────────────────────────
        self.progress.on_step(PipelineStep::WritingStory);
        let step = Instant::now();
        let draft = self.ai.generate_story(&analysis, &config).await?;
        info!(
            "Story '{}' with {} phases written in {:?}",
            draft.title,
            draft.phases.len(),
            step.elapsed()
        );

        // ── Step 5: Prompts and images, in phase order ───────────────────
        self.progress.on_step(PipelineStep::Illustrating);
        let step = Instant::now();
        let total = draft.phases.len();
        let pending: Vec<StoryPhase> = draft
            .phases
            .iter()
            .enumerate()
            .map(|(order, d)| StoryPhase::from_draft(d, order))
            .collect();
        let phases: Vec<StoryPhase> = stream::iter(
            pending
                .into_iter()
                .map(|phase| self.illustrate_phase(phase, total)),
        )
        .buffered(self.phase_concurrency)
        .try_collect()
        .await?;
        info!("Phases illustrated in {:?}", step.elapsed());

        // ── Step 6: Assemble ─────────────────────────────────────────────
        let mut story = GeneratedStory {
            id: new_story_id(),
            title: draft.title,
            phases,
            created_at: Utc::now(),
            source_file_name: file_name.to_string(),
            pdf_file_path: None,
        };

        // ── Step 7: Render and save ──────────────────────────────────────
        let (path, _) = self.render_and_save(&story).await?;
        story.pdf_file_path = Some(path);

        // ── Step 8: Cache ────────────────────────────────────────────────
        self.cache.insert(story.clone()).await;
        Ok(story)
    }

    async fn extract_text(&self, pdf: &[u8]) -> Result<String, StoryError> {
        let extractor = Arc::clone(&self.extractor);
        let bytes = pdf.to_vec();
        tokio::task::spawn_blocking(move || extractor.extract_text(&bytes))
            .await
            .map_err(|e| StoryError::Internal(format!("Extraction task panicked: {e}")))?
    }

    /// Generate the image prompt (fatal on failure) and the image (recorded
    /// on the phase on failure) for one phase.
    async fn illustrate_phase(
        &self,
        mut phase: StoryPhase,
        total: usize,
    ) -> Result<StoryPhase, StoryError> {
        let order = phase.order;
        debug!("Phase {}/{}: {}", order + 1, total, phase.name);

        phase.image_prompt = self.ai.generate_image_prompt(&phase).await?;

        let image = match self.ai.generate_image(&phase.image_prompt).await {
            Ok(bytes) if bytes.is_empty() => Err(StoryError::ai(
                AiErrorKind::InvalidResponse,
                "Image generation",
                "Image endpoint returned no data",
            )),
            other => other,
        };
        match image {
            Ok(bytes) => {
                phase.image_data = Some(BASE64.encode(&bytes));
            }
            Err(e) => {
                warn!(
                    "Image generation failed for phase {} ({}); continuing without image: {}",
                    order, phase.name, e
                );
                let kind = match &e {
                    StoryError::Ai { kind, .. } => *kind,
                    _ => AiErrorKind::ImageGenerationFailed,
                };
                let detail = e.to_string();
                self.progress.on_image_failed(order, &detail);
                phase.image_error = Some(PhaseImageError::GenerationFailed {
                    order,
                    kind,
                    detail,
                });
            }
        }

        self.progress.on_phase_complete(order, total, phase.has_image());
        Ok(phase)
    }

    /// Render `story`, store the bytes and return `(relative_path, bytes)`.
    async fn render_and_save(&self, story: &GeneratedStory) -> Result<(String, Vec<u8>), StoryError> {
        self.progress.on_step(PipelineStep::RenderingPdf);
        let step = Instant::now();
        let renderer = Arc::clone(&self.renderer);
        let snapshot = story.clone();
        let bytes = tokio::task::spawn_blocking(move || renderer.render(&snapshot))
            .await
            .map_err(|e| StoryError::Internal(format!("Render task panicked: {e}")))??;
        info!("PDF rendered ({} bytes) in {:?}", bytes.len(), step.elapsed());

        self.progress.on_step(PipelineStep::Saving);
        let path = self.storage.save_story_pdf(&story.id, &bytes).await?;
        Ok((path, bytes))
    }

    // ── Lookup and export ────────────────────────────────────────────────

    /// The cached story for `id`, or `None` if absent or expired.
    pub async fn get_story(&self, id: &str) -> Result<Option<GeneratedStory>, StoryError> {
        if id.trim().is_empty() {
            return Err(StoryError::InvalidArgument("Story ID cannot be empty".into()));
        }
        let story = self.cache.get(id).await;
        if story.is_none() {
            debug!("Story {} not in cache", id);
        }
        Ok(story)
    }

    async fn require_story(&self, id: &str) -> Result<GeneratedStory, StoryError> {
        self.get_story(id)
            .await?
            .ok_or_else(|| StoryError::StoryNotFound { id: id.to_string() })
    }

    /// Indented camelCase JSON of a cached story.
    pub async fn export_story_json(&self, id: &str) -> Result<String, StoryError> {
        let story = self.require_story(id).await?;
        let json = story.to_pretty_json()?;
        info!("Exported story {} as JSON ({} bytes)", id, json.len());
        Ok(json)
    }

    /// PDF bytes of a cached story. A story without a stored PDF is rendered
    /// and saved now, and the cache entry updated with the new path.
    pub async fn export_story_pdf(&self, id: &str) -> Result<Vec<u8>, StoryError> {
        let story = self.require_story(id).await?;
        let bytes = match story.pdf_file_path.as_deref() {
            Some(path) => self.storage.get_story_pdf(path).await?,
            None => {
                info!("Story {} has no stored PDF; rendering", id);
                let (path, bytes) = self.render_and_save(&story).await?;
                self.cache
                    .update(id, |s| s.pdf_file_path = Some(path))
                    .await;
                bytes
            }
        };
        info!("Exported story {} as PDF ({} bytes)", id, bytes.len());
        Ok(bytes)
    }

    /// Drop expired cache entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }
}
