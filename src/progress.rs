//! Progress-callback trait for story-generation events.
//!
//! Inject an [`Arc<dyn StoryProgressCallback>`] via
//! [`crate::StoryService::with_progress`] to follow a story through the
//! pipeline: the CLI drives a terminal spinner from it, a web host could
//! forward the events to a WebSocket.
//!
//! # Example
//!
//! ```rust
//! use dragonscale_storyteller::{PipelineStep, StoryProgressCallback};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountImages(AtomicUsize);
//!
//! impl StoryProgressCallback for CountImages {
//!     fn on_phase_complete(&self, _order: usize, _total: usize, has_image: bool) {
//!         if has_image {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let cb = CountImages(AtomicUsize::new(0));
//! cb.on_step(PipelineStep::ExtractingText);
//! cb.on_phase_complete(0, 4, true);
//! assert_eq!(cb.0.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::Arc;

/// Coarse stages of [`crate::StoryService::create_story_from_pdf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    ExtractingText,
    AnalyzingContent,
    WritingStory,
    Illustrating,
    RenderingPdf,
    Saving,
}

impl PipelineStep {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStep::ExtractingText => "Extracting text",
            PipelineStep::AnalyzingContent => "Analyzing content",
            PipelineStep::WritingStory => "Writing story",
            PipelineStep::Illustrating => "Illustrating phases",
            PipelineStep::RenderingPdf => "Rendering PDF",
            PipelineStep::Saving => "Saving",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the story pipeline as it moves through its steps.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `phase_concurrency > 1` the phase methods may
/// be called from several tasks at once.
pub trait StoryProgressCallback: Send + Sync {
    /// Called when a pipeline step begins.
    fn on_step(&self, step: PipelineStep) {
        let _ = step;
    }

    /// Called when a phase has its prompt and (possibly) its image.
    ///
    /// # Arguments
    /// * `order`    : zero-based phase position
    /// * `total`    : number of phases
    /// * `has_image`: `false` when image generation failed
    fn on_phase_complete(&self, order: usize, total: usize, has_image: bool) {
        let _ = (order, total, has_image);
    }

    /// Called when a phase's image could not be generated.
    fn on_image_failed(&self, order: usize, error: &str) {
        let _ = (order, error);
    }

    /// Called once the story is rendered, saved and cached.
    fn on_story_complete(&self, story_id: &str, elapsed_ms: u64) {
        let _ = (story_id, elapsed_ms);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl StoryProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn StoryProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<PipelineStep>>,
        failures: Mutex<Vec<(usize, String)>>,
    }

    impl StoryProgressCallback for Recorder {
        fn on_step(&self, step: PipelineStep) {
            self.steps.lock().unwrap().push(step);
        }

        fn on_image_failed(&self, order: usize, error: &str) {
            self.failures.lock().unwrap().push((order, error.to_string()));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_step(PipelineStep::RenderingPdf);
        cb.on_phase_complete(0, 4, false);
        cb.on_image_failed(1, "boom");
        cb.on_story_complete("abc", 12);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_step(PipelineStep::ExtractingText);
        rec.on_step(PipelineStep::WritingStory);
        rec.on_phase_complete(0, 4, true);
        rec.on_image_failed(2, "rate limited");

        assert_eq!(
            *rec.steps.lock().unwrap(),
            vec![PipelineStep::ExtractingText, PipelineStep::WritingStory]
        );
        assert_eq!(rec.failures.lock().unwrap()[0], (2, "rate limited".to_string()));
    }

    #[test]
    fn step_labels() {
        assert_eq!(PipelineStep::Illustrating.to_string(), "Illustrating phases");
    }
}
