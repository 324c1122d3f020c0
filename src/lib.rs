//! # dragonscale-storyteller
//!
//! Turn a PDF (a manual, an article, a shopping list) into an illustrated
//! four-phase story: introduction, conflict, climax, resolution.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Extract   validate upload, pull page text via pdfium (spawn_blocking)
//!  ├─ 2. Analyse   chat model → facts / entities / concepts (JSON)
//!  ├─ 3. Write     chat model → title + 4 phases in the chosen language/mood
//!  ├─ 4. Prompt    chat model → one image prompt per phase   (failure is fatal)
//!  ├─ 5. Draw      image model → one picture per phase       (failure is swallowed)
//!  ├─ 6. Render    A4 PDF via pdfium, saved under generated-stories/
//!  └─ 7. Cache     in-memory, 24 h absolute TTL, JSON / PDF export
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dragonscale_storyteller::{Language, Mood, ServiceConfig, StoryConfig, StoryService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Chat provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let service = StoryService::from_config(ServiceConfig::default()).await?;
//!     let pdf = std::fs::read("manual.pdf")?;
//!     let options = StoryConfig {
//!         language: Language::En,
//!         mood: Mood::Adventure,
//!         keywords: vec!["dragon".into()],
//!     };
//!     let story = service.create_story_from_pdf(&pdf, "manual.pdf", Some(options)).await?;
//!     println!("{} ({} phases)", story.title, story.phases.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP API ([`server::router`], [`server::serve`]) |
//! | `cli`    | on      | The `storyteller` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when embedding only the library:
//! ```toml
//! dragonscale-storyteller = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod ai;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod storage;
pub mod story;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use ai::{ProviderStoryAi, StoryAi};
pub use cache::StoryCache;
pub use config::{Language, Mood, ServiceConfig, ServiceConfigBuilder, StoryConfig};
pub use error::{AiErrorKind, PdfErrorKind, PhaseImageError, StorageErrorKind, StoryError};
pub use pipeline::extract::{PdfTextExtractor, PdfiumExtractor};
pub use pipeline::render::{PdfiumRenderer, StoryRenderer};
pub use progress::{NoopProgressCallback, PipelineStep, StoryProgressCallback};
pub use service::StoryService;
pub use storage::StoryStorage;
pub use story::{ContentAnalysis, GeneratedStory, StoryDraft, StoryPhase, StoryResponse};
