//! Error types for the dragonscale-storyteller library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StoryError`]: **Fatal**: the story cannot be produced at all (the
//!   upload is not a PDF, the model returned garbage, the PDF could not be
//!   stored). Returned as `Err(StoryError)` from every [`crate::StoryService`]
//!   operation.
//!
//! * [`PhaseImageError`]: **Non-fatal**: the illustration for one phase
//!   could not be generated. Stored on the [`crate::story::StoryPhase`] so the
//!   story still completes without that picture.
//!
//! Every fatal error carries a stable machine code ([`StoryError::code`]) and
//! a sentence that can be shown to an end user ([`StoryError::user_message`]).

use std::fmt;
use thiserror::Error;

/// Why a PDF upload could not be turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PdfErrorKind {
    InvalidFormat,
    FileSizeExceeded,
    CorruptedFile,
    NoTextContent,
    ExtractionFailed,
}

/// Why a call to the chat or image model failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AiErrorKind {
    AuthenticationFailed,
    RateLimitExceeded,
    ServiceUnavailable,
    InvalidResponse,
    ContentAnalysisFailed,
    StoryGenerationFailed,
    ImagePromptGenerationFailed,
    ImageGenerationFailed,
}

impl AiErrorKind {
    /// Classify an HTTP status code, using `fallback` for anything that is
    /// not an auth, rate-limit or availability problem.
    pub fn from_status(status: u16, fallback: AiErrorKind) -> Self {
        match status {
            401 | 403 => AiErrorKind::AuthenticationFailed,
            429 => AiErrorKind::RateLimitExceeded,
            503 => AiErrorKind::ServiceUnavailable,
            _ => fallback,
        }
    }
}

/// Why the rendered story PDF could not be written or read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StorageErrorKind {
    FileNotFound,
    SaveFailed,
    ReadFailed,
    DirectoryCreationFailed,
}

// The codes are `PascalCase` names upper-cased without separators,
// e.g. `RateLimitExceeded` → `RATELIMITEXCEEDED`.
macro_rules! upper_code {
    ($ty:ty) => {
        impl $ty {
            /// Upper-cased variant name used in machine-readable error codes.
            pub fn code(&self) -> String {
                format!("{:?}", self).to_uppercase()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

upper_code!(PdfErrorKind);
upper_code!(AiErrorKind);
upper_code!(StorageErrorKind);

/// All fatal errors returned by the dragonscale-storyteller library.
///
/// Phase-level image failures use [`PhaseImageError`] and are stored on the
/// phase rather than propagated here.
#[derive(Debug, Error)]
pub enum StoryError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload could not be read as a text-bearing PDF.
    #[error("PDF processing failed ({kind}): {message}")]
    PdfProcessing { kind: PdfErrorKind, message: String },

    /// A required argument was blank or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ── AI errors ─────────────────────────────────────────────────────────
    /// A chat or image model call failed.
    #[error("AI service error during {context} ({kind}): {message}")]
    Ai {
        kind: AiErrorKind,
        context: String,
        message: String,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Writing or reading a story PDF failed.
    #[error("Storage error ({kind}) for '{path}': {message}")]
    Storage {
        kind: StorageErrorKind,
        path: String,
        message: String,
    },

    /// No cached story has the given id (never created, or expired).
    #[error("Story with ID '{id}' was not found")]
    StoryNotFound { id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation or provider resolution failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoryError {
    pub fn pdf(kind: PdfErrorKind, message: impl Into<String>) -> Self {
        Self::PdfProcessing {
            kind,
            message: message.into(),
        }
    }

    pub fn ai(kind: AiErrorKind, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ai {
            kind,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn storage(
        kind: StorageErrorKind,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, e.g. `PDF_NOTEXTCONTENT` or `AI_RATELIMITEXCEEDED`.
    pub fn code(&self) -> String {
        match self {
            StoryError::PdfProcessing { kind, .. } => format!("PDF_{}", kind.code()),
            StoryError::Ai { kind, .. } => format!("AI_{}", kind.code()),
            StoryError::Storage { kind, .. } => format!("STORAGE_{}", kind.code()),
            StoryError::StoryNotFound { .. } => "STORY_NOT_FOUND".into(),
            StoryError::InvalidArgument(_) => "INVALID_ARGUMENT".into(),
            StoryError::InvalidConfig(_) => "INVALID_CONFIG".into(),
            StoryError::PdfiumBindingFailed(_) | StoryError::Internal(_) => {
                "INTERNAL_ERROR".into()
            }
        }
    }

    /// A sentence suitable for showing to the person who uploaded the file.
    pub fn user_message(&self) -> &'static str {
        match self {
            StoryError::PdfProcessing { kind, .. } => match kind {
                PdfErrorKind::InvalidFormat => {
                    "The file format is not supported. Please upload a valid PDF file."
                }
                PdfErrorKind::FileSizeExceeded => {
                    "The file size exceeds the maximum allowed size of 10MB."
                }
                PdfErrorKind::CorruptedFile => "The PDF file appears to be corrupted or unreadable.",
                PdfErrorKind::NoTextContent => "The PDF file contains no extractable text content.",
                PdfErrorKind::ExtractionFailed => "Failed to extract text from the PDF file.",
            },
            StoryError::Ai { kind, .. } => match kind {
                AiErrorKind::AuthenticationFailed => {
                    "AI service authentication failed. Please contact support."
                }
                AiErrorKind::RateLimitExceeded => {
                    "Too many requests. Please try again in a few moments."
                }
                AiErrorKind::ServiceUnavailable => {
                    "AI service is temporarily unavailable. Please try again later."
                }
                AiErrorKind::InvalidResponse => {
                    "Received an invalid response from AI service. Please try again."
                }
                _ => "An error occurred while generating the story. Please try again.",
            },
            StoryError::Storage { .. } => "Failed to save or load the story PDF. Please try again.",
            StoryError::StoryNotFound { .. } => {
                "The requested story could not be found. It may have expired or never existed."
            }
            StoryError::InvalidArgument(_) => "The request was missing a required value.",
            StoryError::InvalidConfig(_) => "The service is misconfigured. Please contact support.",
            StoryError::PdfiumBindingFailed(_) | StoryError::Internal(_) => {
                "We encountered an error while processing your file. Please try again later."
            }
        }
    }

    /// `true` for failures worth retrying (rate limits, outages, timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoryError::Ai {
                kind: AiErrorKind::RateLimitExceeded | AiErrorKind::ServiceUnavailable,
                ..
            }
        )
    }
}

/// A non-fatal error for a single phase illustration.
///
/// Stored on the phase when image generation fails; the story is still
/// rendered and cached without that image.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseImageError {
    /// The image endpoint failed or returned an unusable payload.
    #[error("Phase {order}: image generation failed ({kind}): {detail}")]
    GenerationFailed {
        order: usize,
        kind: AiErrorKind,
        detail: String,
    },
}
