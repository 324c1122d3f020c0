//! Pipeline stages for PDF-to-story generation.
//!
//! Each submodule implements exactly one external collaboration, so each
//! can be tested (or faked) on its own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ llm ──────────▶ llm ──────▶ llm ──────────▶ images ──▶ render
//! (pdfium)    (analysis)      (story)     (image prompt)  (b64 PNG)  (pdfium)
//! ```
//!
//! 1. [`extract`]: validate the upload and pull text out of every page;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`llm`]    : chat calls with retry/backoff plus parsing of the JSON the
//!    model was asked to return
//! 3. [`images`] : the image-generation HTTP client
//! 4. [`render`] : lay the story out on A4 pages and draw it with pdfium

pub mod extract;
pub mod images;
pub mod llm;
pub mod render;

use crate::error::StoryError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bind to a pdfium library.
///
/// Resolution order: explicit `lib_path`, `PDFIUM_LIB_PATH`, the working
/// directory, then the system library search path. A path may name either
/// the library file itself or the directory containing it.
pub(crate) fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, StoryError> {
    let explicit: Option<PathBuf> = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match explicit {
        Some(path) => {
            let file = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| StoryError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}
