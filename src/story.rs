//! Story data model: what the models return and what the service produces.
//!
//! JSON uses camelCase throughout so exports match what browser clients
//! expect. Model output is parsed leniently: object keys are matched without
//! regard to case or underscores (`keyFacts`, `KEYFACTS` and `key_facts` all
//! land on the same field) and `null` members count as missing.

use crate::error::{PhaseImageError, StoryError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Facts, entities and concepts extracted from the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct ContentAnalysis {
    pub key_facts: Vec<String>,
    pub entities: Vec<String>,
    pub concepts: Vec<String>,
    pub overall_context: String,
    pub source_type: String,
}

/// The chat model's story before images are attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct StoryDraft {
    pub title: String,
    pub phases: Vec<PhaseDraft>,
}

/// One narrative beat as returned by the chat model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct PhaseDraft {
    pub name: String,
    pub summary: String,
    pub mood: String,
}

/// Lower-case object keys, drop `_`/`-` from them, and remove `null`
/// members and array items.
fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let key: String = k
                        .chars()
                        .filter(|c| *c != '_' && *c != '-')
                        .flat_map(char::to_lowercase)
                        .collect();
                    (key, normalize_keys(v))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(normalize_keys)
                .collect(),
        ),
        other => other,
    }
}

fn from_model_json<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(normalize_keys(value))
}

#[derive(Deserialize)]
struct AnalysisFields {
    #[serde(default, rename = "keyfacts")]
    key_facts: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default, rename = "overallcontext")]
    overall_context: String,
    #[serde(default, rename = "sourcetype")]
    source_type: String,
}

impl TryFrom<Value> for ContentAnalysis {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let f: AnalysisFields = from_model_json(value)?;
        Ok(Self {
            key_facts: f.key_facts,
            entities: f.entities,
            concepts: f.concepts,
            overall_context: f.overall_context,
            source_type: f.source_type,
        })
    }
}

#[derive(Deserialize)]
struct DraftFields {
    #[serde(default)]
    title: String,
    #[serde(default)]
    phases: Vec<PhaseDraft>,
}

impl TryFrom<Value> for StoryDraft {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let f: DraftFields = from_model_json(value)?;
        Ok(Self {
            title: f.title,
            phases: f.phases,
        })
    }
}

#[derive(Deserialize)]
struct PhaseFields {
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    mood: String,
}

impl TryFrom<Value> for PhaseDraft {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let f: PhaseFields = from_model_json(value)?;
        Ok(Self {
            name: f.name,
            summary: f.summary,
            mood: f.mood,
        })
    }
}

/// A finished phase: the draft plus its image prompt and optional image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPhase {
    pub name: String,
    pub summary: String,
    pub mood: String,
    pub image_prompt: String,
    /// Zero-based position in the story.
    pub order: usize,
    /// Base64-encoded image bytes, absent when generation failed.
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_error: Option<PhaseImageError>,
}

impl StoryPhase {
    /// Start a phase from its draft; the image prompt is filled in later.
    pub fn from_draft(draft: &PhaseDraft, order: usize) -> Self {
        Self {
            name: draft.name.clone(),
            summary: draft.summary.clone(),
            mood: draft.mood.clone(),
            image_prompt: String::new(),
            order,
            image_data: None,
            image_error: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_data.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// A complete story as cached, rendered and exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStory {
    /// 32 lowercase hex characters.
    pub id: String,
    pub title: String,
    pub phases: Vec<StoryPhase>,
    pub created_at: DateTime<Utc>,
    pub source_file_name: String,
    /// Storage-relative path of the rendered PDF, once saved.
    pub pdf_file_path: Option<String>,
}

impl GeneratedStory {
    /// Indented camelCase JSON, as offered for download.
    pub fn to_pretty_json(&self) -> Result<String, StoryError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StoryError::Internal(format!("Failed to serialise story: {e}")))
    }

    /// Phases sorted by `order`.
    pub fn ordered_phases(&self) -> Vec<&StoryPhase> {
        let mut phases: Vec<&StoryPhase> = self.phases.iter().collect();
        phases.sort_by_key(|p| p.order);
        phases
    }

    /// Number of phases that carry an image.
    pub fn illustrated_phases(&self) -> usize {
        self.phases.iter().filter(|p| p.has_image()).count()
    }
}

/// Generate a fresh story identifier (UUID v4 as 32 hex chars, no dashes).
pub fn new_story_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Envelope returned by the upload and lookup endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryResponse {
    pub success: bool,
    pub story_id: Option<String>,
    pub story: Option<GeneratedStory>,
    pub error_message: Option<String>,
}

impl StoryResponse {
    pub fn ok(story: GeneratedStory) -> Self {
        Self {
            success: true,
            story_id: Some(story.id.clone()),
            story: Some(story),
            error_message: None,
        }
    }
}
