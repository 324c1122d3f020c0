//! Prompts for the three chat-model steps of the pipeline.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing how stories are written requires
//!    editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect the assembled prompts without
//!    calling a model.

use crate::config::{Language, Mood, StoryConfig};
use crate::story::{ContentAnalysis, StoryPhase};

/// System prompt for the content-analysis step.
pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are an expert content analyzer. Always respond with valid JSON only.";

/// System prompt for the story-generation step.
pub const STORYTELLER_SYSTEM_PROMPT: &str =
    "You are a creative storyteller. Always respond with valid JSON only.";

/// System prompt for the image-prompt step.
pub const IMAGE_PROMPT_SYSTEM_PROMPT: &str =
    "You are an expert at creating detailed image generation prompts. Respond with only the prompt text.";

/// Names of the four narrative beats, in order.
pub const PHASE_NAMES: [&str; 4] = ["Introduction", "Conflict", "Climax", "Resolution"];

/// Build the user prompt asking for a structured analysis of `text`.
pub fn analysis_prompt(text: &str) -> String {
    format!(
        r#"Analyze the following text extracted from a document.
Identify key facts, entities, concepts, and contextual information.
The document may be of any type (manual, article, list, etc.).
Extract elements that could be creatively transformed into narrative components.

Text: {text}

Return a JSON object with the following structure:
{{
  "keyFacts": ["fact1", "fact2", ...],
  "entities": ["entity1", "entity2", ...],
  "concepts": ["concept1", "concept2", ...],
  "overallContext": "description of the overall context",
  "sourceType": "type of document (e.g., manual, article, list)"
}}

Respond ONLY with valid JSON, no additional text."#
    )
}

/// Instruction pinning the output language.
pub fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::En => "Write the story in English.",
        Language::De => "Schreibe die Geschichte auf Deutsch.",
    }
}

/// Instruction describing the requested tone, in the story's language.
pub fn mood_instruction(mood: Mood, language: Language) -> &'static str {
    let (en, de) = match mood {
        Mood::Adventure => (
            "The story should be adventurous, exciting, and full of exploration and discovery with a sense of journey and wonder.",
            "Die Geschichte soll abenteuerlich, aufregend und voller Entdeckungen sein mit einem Gefühl von Reise und Staunen.",
        ),
        Mood::Epic => (
            "The story should be epic, grand, and heroic with larger-than-life characters and monumental events.",
            "Die Geschichte soll episch, großartig und heroisch sein mit überdimensionalen Charakteren und monumentalen Ereignissen.",
        ),
        Mood::Happy => (
            "The story should be funny, lighthearted, and humorous with comedic elements.",
            "Die Geschichte soll lustig, heiter und humorvoll mit komödiantischen Elementen sein.",
        ),
        Mood::Sad => (
            "The story should be sad, melancholic, and emotionally touching.",
            "Die Geschichte soll traurig, melancholisch und emotional berührend sein.",
        ),
        Mood::Horror => (
            "The story should be scary, suspenseful, and create a sense of dread and horror.",
            "Die Geschichte soll gruselig, spannend sein und ein Gefühl von Angst und Horror erzeugen.",
        ),
        Mood::Dramatic => (
            "The story should be dramatic, intense, and emotionally powerful with high stakes.",
            "Die Geschichte soll dramatisch, intensiv und emotional kraftvoll mit hohen Einsätzen sein.",
        ),
        Mood::Romantic => (
            "The story should be romantic, passionate, and emotionally intimate with themes of love and connection.",
            "Die Geschichte soll romantisch, leidenschaftlich und emotional intim sein mit Themen von Liebe und Verbindung.",
        ),
        Mood::Mysterious => (
            "The story should be mysterious, enigmatic, and intriguing with secrets to uncover and puzzles to solve.",
            "Die Geschichte soll mysteriös, rätselhaft und faszinierend sein mit Geheimnissen zum Aufdecken und Rätseln zum Lösen.",
        ),
        Mood::Inspirational => (
            "The story should be inspirational, uplifting, and motivational with themes of overcoming challenges and personal growth.",
            "Die Geschichte soll inspirierend, erhebend und motivierend sein mit Themen des Überwindens von Herausforderungen und persönlichem Wachstum.",
        ),
        Mood::Dark => (
            "The story should be dark, gritty, and somber with mature themes and a pessimistic or cynical tone.",
            "Die Geschichte soll düster, rau und ernst sein mit reifen Themen und einem pessimistischen oder zynischen Ton.",
        ),
        Mood::Neutral => (
            "The story should have a balanced, neutral tone.",
            "Die Geschichte soll einen ausgewogenen, neutralen Ton haben.",
        ),
    };
    match language {
        Language::En => en,
        Language::De => de,
    }
}

/// Instruction listing keywords to weave in; empty when there are none.
pub fn keywords_instruction(keywords: &[String], language: Language) -> String {
    if keywords.is_empty() {
        return String::new();
    }
    let list = keywords.join(", ");
    match language {
        Language::En => format!("Incorporate these keywords into the story: {list}"),
        Language::De => format!("Baue diese Schlüsselwörter in die Geschichte ein: {list}"),
    }
}

/// Build the user prompt asking for a four-phase story from `analysis`.
pub fn story_prompt(analysis: &ContentAnalysis, config: &StoryConfig) -> String {
    let analysis_json =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| format!("{analysis:?}"));
    let language = language_instruction(config.language);
    let mood = mood_instruction(config.mood, config.language);
    let keywords = keywords_instruction(&config.keywords, config.language);

    format!(
        r#"Create a creative, engaging story based on the following analysis.
Transform the source material into a narrative with 4 distinct phases:
1. Introduction
2. Conflict
3. Climax
4. Resolution

IMPORTANT INSTRUCTIONS:
{language}
{mood}
{keywords}

Source Analysis:
{analysis_json}

For each phase, provide:
- Phase name (e.g., "Introduction", "Conflict", "Climax", "Resolution")
- Detailed summary (2-3 sentences)
- Mood/atmosphere that matches the overall story mood

Be creative and imaginative while incorporating elements from the source material.

Return a JSON object with the following structure:
{{
  "title": "Creative Story Title",
  "phases": [
    {{ "name": "Introduction", "summary": "Detailed summary of this phase...", "mood": "mysterious" }},
    {{ "name": "Conflict", "summary": "Detailed summary of this phase...", "mood": "tense" }},
    {{ "name": "Climax", "summary": "Detailed summary of this phase...", "mood": "dramatic" }},
    {{ "name": "Resolution", "summary": "Detailed summary of this phase...", "mood": "triumphant" }}
  ]
}}

Respond ONLY with valid JSON, no additional text."#
    )
}

/// Build the user prompt asking for an image-generation prompt for `phase`.
pub fn image_prompt_request(phase: &StoryPhase) -> String {
    format!(
        r#"Create a detailed image generation prompt for the following story phase.
The prompt should be suitable for AI image generation models.

Phase: {}
Summary: {}
Mood: {}

Generate a prompt that includes:
- Visual composition and framing
- Lighting and atmosphere
- Art style and mood
- Key visual elements

Format: Single paragraph, descriptive, specific.
Respond with ONLY the image prompt text, no additional formatting or explanation."#,
        phase.name, phase.summary, phase.mood
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::PhaseDraft;

    #[test]
    fn analysis_prompt_embeds_text() {
        let p = analysis_prompt("Insert tab A into slot B.");
        assert!(p.contains("Insert tab A into slot B."));
        assert!(p.contains("\"overallContext\""));
    }

    #[test]
    fn every_mood_has_distinct_instructions_per_language() {
        for mood in Mood::ALL {
            let en = mood_instruction(mood, Language::En);
            let de = mood_instruction(mood, Language::De);
            assert!(en.starts_with("The story should"), "{mood}: {en}");
            assert!(de.starts_with("Die Geschichte soll"), "{mood}: {de}");
        }
    }

    #[test]
    fn story_prompt_carries_language_mood_and_keywords() {
        let config = StoryConfig {
            language: Language::En,
            mood: Mood::Horror,
            keywords: vec!["lantern".into(), "fog".into()],
        };
        let p = story_prompt(&ContentAnalysis::default(), &config);
        assert!(p.contains("Write the story in English."));
        assert!(p.contains("scary, suspenseful"));
        assert!(p.contains("Incorporate these keywords into the story: lantern, fog"));
        for name in PHASE_NAMES {
            assert!(p.contains(name));
        }
    }

    #[test]
    fn german_is_default_language() {
        let p = story_prompt(&ContentAnalysis::default(), &StoryConfig::default());
        assert!(p.contains("Schreibe die Geschichte auf Deutsch."));
        assert!(p.contains("ausgewogenen, neutralen Ton"));
        assert!(!p.contains("Schlüsselwörter"));
    }

    #[test]
    fn image_prompt_request_mentions_phase() {
        let phase = StoryPhase::from_draft(
            &PhaseDraft {
                name: "Climax".into(),
                summary: "The bridge collapses.".into(),
                mood: "dramatic".into(),
            },
            2,
        );
        let p = image_prompt_request(&phase);
        assert!(p.contains("Phase: Climax"));
        assert!(p.contains("Summary: The bridge collapses."));
        assert!(p.contains("Mood: dramatic"));
    }
}
