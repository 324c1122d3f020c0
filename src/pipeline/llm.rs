//! Chat-model interaction: send a prompt, retry transient failures, and
//! parse the JSON the model was asked to return.
//!
//! The prompts live in [`crate::prompts`]; this module only deals with
//! transport, retries and turning free-form model text into typed values.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) gives 500 ms → 1 s with the default two
//! retries. Authentication failures are never retried.

use crate::config::ServiceConfig;
use crate::error::{AiErrorKind, StoryError};
use crate::prompts::PHASE_NAMES;
use crate::story::{ContentAnalysis, StoryDraft};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Transport settings for chat calls, taken from [`ServiceConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl From<&ServiceConfig> for ChatSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }
}

/// Send one system + user exchange and return the model's text.
///
/// `context` names the pipeline step for logs and errors; `fallback` is the
/// error kind used when a failure is neither auth, rate-limit nor outage.
pub async fn chat_with_retry(
    provider: &Arc<dyn LLMProvider>,
    system: &str,
    user: &str,
    settings: &ChatSettings,
    context: &str,
    fallback: AiErrorKind,
) -> Result<String, StoryError> {
    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    let options = build_options(settings);
    let start = Instant::now();

    let mut last_err: Option<StoryError> = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = settings.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                context, attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = provider.chat(&messages, Some(&options));
        let err = match timeout(Duration::from_secs(settings.timeout_secs), call).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    context,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                StoryError::ai(classify_message(&message, fallback), context, message)
            }
            Err(_) => StoryError::ai(
                AiErrorKind::ServiceUnavailable,
                context,
                format!("timed out after {}s", settings.timeout_secs),
            ),
        };

        warn!("{}: attempt {} failed: {}", context, attempt + 1, err);
        let retryable = err.is_transient() || matches!(&err, StoryError::Ai { kind, .. } if *kind == fallback);
        last_err = Some(err);
        if !retryable {
            break;
        }
    }

    Err(last_err.unwrap_or_else(|| StoryError::ai(fallback, context, "Unknown error")))
}

/// Build `CompletionOptions` from the chat settings.
fn build_options(settings: &ChatSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

static RE_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(401|403|429|503)\b").unwrap());

/// Classify a provider error message by the status code or phrase it contains.
pub fn classify_message(message: &str, fallback: AiErrorKind) -> AiErrorKind {
    if let Some(caps) = RE_STATUS.captures(message) {
        if let Ok(status) = caps[1].parse::<u16>() {
            return AiErrorKind::from_status(status, fallback);
        }
    }
    let lower = message.to_ascii_lowercase();
    if lower.contains("rate limit") || lower.contains("too many requests") {
        AiErrorKind::RateLimitExceeded
    } else if lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
    {
        AiErrorKind::AuthenticationFailed
    } else if lower.contains("unavailable") || lower.contains("overloaded") {
        AiErrorKind::ServiceUnavailable
    } else {
        fallback
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").unwrap());

/// Locate the JSON object inside a free-form model reply.
///
/// Models sometimes wrap the object in ```json fences or add a sentence
/// before or after it despite the prompt. The first fenced block holding a
/// `{` wins; otherwise the slice from the first `{` to the last `}` of the
/// whole reply is returned.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = RE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|b| b.contains('{'))
        .unwrap_or(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Parse the content-analysis reply.
pub fn parse_content_analysis(text: &str) -> Result<ContentAnalysis, StoryError> {
    let json = extract_json_object(text).ok_or_else(|| {
        StoryError::ai(
            AiErrorKind::InvalidResponse,
            "Content analysis",
            "Failed to parse AI response. The response was not valid JSON.",
        )
    })?;
    serde_json::from_str(json).map_err(|e| {
        StoryError::ai(
            AiErrorKind::InvalidResponse,
            "Content analysis",
            format!("Failed to parse AI response. The response was not valid JSON: {e}"),
        )
    })
}

/// Parse and validate the story-generation reply.
///
/// Fewer than four phases, an empty title or a phase without name or
/// summary is a [`AiErrorKind::StoryGenerationFailed`]; extra phases are
/// dropped so the story always has exactly the four beats.
pub fn parse_story_draft(text: &str) -> Result<StoryDraft, StoryError> {
    let context = "Story generation";
    let json = extract_json_object(text).ok_or_else(|| {
        StoryError::ai(
            AiErrorKind::InvalidResponse,
            context,
            "Failed to parse AI response. The response was not valid JSON.",
        )
    })?;
    let mut draft: StoryDraft = serde_json::from_str(json).map_err(|e| {
        StoryError::ai(
            AiErrorKind::InvalidResponse,
            context,
            format!("Failed to parse AI response. The response was not valid JSON: {e}"),
        )
    })?;

    if draft.phases.len() < PHASE_NAMES.len() {
        return Err(StoryError::ai(
            AiErrorKind::StoryGenerationFailed,
            context,
            format!(
                "Failed to generate a complete story with 4 phases. Received {} phases",
                draft.phases.len()
            ),
        ));
    }
    if draft.phases.len() > PHASE_NAMES.len() {
        warn!(
            "Model returned {} phases; keeping the first {}",
            draft.phases.len(),
            PHASE_NAMES.len()
        );
        draft.phases.truncate(PHASE_NAMES.len());
    }

    draft.title = draft.title.trim().to_string();
    if draft.title.is_empty() {
        return Err(StoryError::ai(
            AiErrorKind::StoryGenerationFailed,
            context,
            "Story has no title",
        ));
    }

    for (i, phase) in draft.phases.iter_mut().enumerate() {
        phase.name = phase.name.trim().to_string();
        phase.summary = phase.summary.trim().to_string();
        phase.mood = phase.mood.trim().to_string();
        if phase.name.is_empty() {
            phase.name = PHASE_NAMES[i].to_string();
        }
        if phase.summary.is_empty() {
            return Err(StoryError::ai(
                AiErrorKind::StoryGenerationFailed,
                context,
                format!("Phase {} ({}) has no summary", i, phase.name),
            ));
        }
    }

    Ok(draft)
}

/// Tidy an image-prompt reply: trim, drop fences and wrapping quotes.
pub fn clean_image_prompt(text: &str, phase_name: &str) -> Result<String, StoryError> {
    let mut s = text.trim();
    if let Some(inner) = RE_FENCE.captures(s).and_then(|c| c.get(1)) {
        s = inner.as_str().trim();
    }
    let s = s
        .trim_matches(|c| c == '"' || c == '\u{201C}' || c == '\u{201D}')
        .trim();
    if s.is_empty() {
        return Err(StoryError::ai(
            AiErrorKind::InvalidResponse,
            format!("Image prompt generation for phase: {phase_name}"),
            "Model returned an empty image prompt",
        ));
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY_JSON: &str = r#"{
      "title": "  The Lantern Keeper ",
      "phases": [
        {"name": "Introduction", "summary": "A keeper tends the light.", "mood": "calm"},
        {"name": "Conflict", "summary": "A storm rises.", "mood": "tense"},
        {"name": "Climax", "summary": "The lamp fails.", "mood": "dramatic"},
        {"name": "Resolution", "summary": "Dawn breaks.", "mood": "hopeful"}
      ]
    }"#;

    #[test]
    fn build_options_defaults() {
        let settings = ChatSettings::from(&ServiceConfig::default());
        let opts = build_options(&settings);
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "Sure! Here it is:\n```json\n{\"a\": 1}\n```\nEnjoy.";
        assert_eq!(extract_json_object(reply), Some("{\"a\": 1}"));
    }

    #[test]
    fn non_json_fence_falls_back_to_whole_reply() {
        let reply = "Run it like this:\n```\ncargo run\n```\nResult: {\"a\": 1}";
        assert_eq!(extract_json_object(reply), Some("{\"a\": 1}"));
    }

    #[test]
    fn extracts_json_from_prose() {
        let reply = "The analysis is {\"a\": {\"b\": 2}} as requested.";
        assert_eq!(extract_json_object(reply), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn parses_story_and_trims_fields() {
        let draft = parse_story_draft(STORY_JSON).unwrap();
        assert_eq!(draft.title, "The Lantern Keeper");
        assert_eq!(draft.phases.len(), 4);
        assert_eq!(draft.phases[3].name, "Resolution");
    }

    #[test]
    fn story_with_three_phases_fails() {
        let reply = r#"{"title":"T","phases":[
            {"name":"a","summary":"s","mood":"m"},
            {"name":"b","summary":"s","mood":"m"},
            {"name":"c","summary":"s","mood":"m"}]}"#;
        match parse_story_draft(reply).unwrap_err() {
            StoryError::Ai { kind, message, .. } => {
                assert_eq!(kind, AiErrorKind::StoryGenerationFailed);
                assert!(message.contains("Received 3 phases"), "{message}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn extra_phases_are_truncated_and_missing_names_filled() {
        let reply = r#"{"Title":"T","Phases":[
            {"Name":"","Summary":"s1","Mood":"m"},
            {"name":"b","summary":"s2","mood":"m"},
            {"name":"c","summary":"s3","mood":"m"},
            {"name":"d","summary":"s4","mood":"m"},
            {"name":"epilogue","summary":"s5","mood":"m"}]}"#;
        let draft = parse_story_draft(reply).unwrap();
        assert_eq!(draft.phases.len(), 4);
        assert_eq!(draft.phases[0].name, "Introduction");
        assert_eq!(draft.phases[3].summary, "s4");
    }

    #[test]
    fn upper_case_keys_and_null_moods_parse() {
        let reply = r#"{"TITLE":"T","PHASES":[
            {"NAME":"Introduction","SUMMARY":"s1","MOOD":null},
            {"NAME":"Conflict","SUMMARY":"s2","MOOD":"tense"},
            {"NAME":"Climax","SUMMARY":"s3"},
            {"NAME":"Resolution","SUMMARY":"s4","MOOD":"calm"}]}"#;
        let draft = parse_story_draft(reply).unwrap();
        assert_eq!(draft.title, "T");
        assert_eq!(draft.phases.len(), 4);
        assert_eq!(draft.phases[0].mood, "");
        assert_eq!(draft.phases[3].summary, "s4");

        let analysis =
            parse_content_analysis(r#"{"KEYFACTS":["f1"],"ENTITIES":null,"SOURCETYPE":"memo"}"#)
                .unwrap();
        assert_eq!(analysis.key_facts, vec!["f1"]);
        assert!(analysis.entities.is_empty());
    }

    #[test]
    fn garbage_is_invalid_response() {
        match parse_content_analysis("I cannot help with that.").unwrap_err() {
            StoryError::Ai { kind, .. } => assert_eq!(kind, AiErrorKind::InvalidResponse),
            other => panic!("unexpected: {other:?}"),
        }
        match parse_story_draft("{not json}").unwrap_err() {
            StoryError::Ai { kind, .. } => assert_eq!(kind, AiErrorKind::InvalidResponse),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn analysis_parses_inside_fences() {
        let reply = "```json\n{\"keyFacts\":[\"water boils at 100C\"],\"entities\":[],\"concepts\":[\"heat\"],\"overallContext\":\"cooking\",\"sourceType\":\"manual\"}\n```";
        let a = parse_content_analysis(reply).unwrap();
        assert_eq!(a.key_facts, vec!["water boils at 100C"]);
        assert_eq!(a.source_type, "manual");
    }

    #[test]
    fn image_prompt_cleanup() {
        assert_eq!(
            clean_image_prompt("  \"A misty harbour at dawn\"  ", "Intro").unwrap(),
            "A misty harbour at dawn"
        );
        assert_eq!(
            clean_image_prompt("```\nOil painting of a bridge\n```", "Climax").unwrap(),
            "Oil painting of a bridge"
        );
        assert!(clean_image_prompt("  \"\" ", "x").is_err());
    }

    #[test]
    fn message_classification() {
        let fb = AiErrorKind::ContentAnalysisFailed;
        assert_eq!(
            classify_message("HTTP 429: slow down", fb),
            AiErrorKind::RateLimitExceeded
        );
        assert_eq!(
            classify_message("status 401 Unauthorized", fb),
            AiErrorKind::AuthenticationFailed
        );
        assert_eq!(
            classify_message("Service Unavailable", fb),
            AiErrorKind::ServiceUnavailable
        );
        assert_eq!(
            classify_message("Authentication error: bad key", fb),
            AiErrorKind::AuthenticationFailed
        );
        assert_eq!(classify_message("model exploded", fb), fb);
        assert_eq!(classify_message("token 4290 used", fb), fb);
    }

    // ── chat_with_retry ──────────────────────────────────────────────────

    use async_trait::async_trait;
    use edgequake_llm::{LLMResponse, LlmError, MockProvider};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `error()` for the first `failures` calls, then answers.
    struct FlakyProvider {
        failures: u32,
        error: fn() -> LlmError,
        hang: bool,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32, error: fn() -> LlmError) -> Self {
            Self {
                failures,
                error,
                hang: false,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "flaky-model"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[ChatMessage::user(prompt)], None).await
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if n < self.failures {
                return Err((self.error)());
            }
            Ok(LLMResponse::new("ok", "flaky-model"))
        }
    }

    fn settings(max_retries: u32) -> ChatSettings {
        ChatSettings {
            temperature: 0.7,
            max_tokens: 256,
            max_retries,
            retry_backoff_ms: 500,
            timeout_secs: 30,
        }
    }

    async fn run(
        provider: &Arc<dyn LLMProvider>,
        settings: &ChatSettings,
    ) -> Result<String, StoryError> {
        chat_with_retry(
            provider,
            "system",
            "user",
            settings,
            "Content analysis",
            AiErrorKind::ContentAnalysisFailed,
        )
        .await
    }

    fn kind(err: StoryError) -> AiErrorKind {
        match err {
            StoryError::Ai { kind, .. } => kind,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_are_retried_with_backoff() {
        let flaky = Arc::new(FlakyProvider::new(2, || {
            LlmError::RateLimited("429 Too Many Requests".into())
        }));
        let provider: Arc<dyn LLMProvider> = flaky.clone();

        let started = tokio::time::Instant::now();
        let reply = run(&provider, &settings(2)).await.unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        // 500 ms then 1 s of backoff.
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_the_budget() {
        let flaky = Arc::new(FlakyProvider::new(10, || {
            LlmError::RateLimited("429 Too Many Requests".into())
        }));
        let provider: Arc<dyn LLMProvider> = flaky.clone();

        let err = run(&provider, &settings(2)).await.unwrap_err();
        assert_eq!(kind(err), AiErrorKind::RateLimitExceeded);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failures_are_not_retried() {
        let flaky = Arc::new(FlakyProvider::new(10, || {
            LlmError::AuthError("401 invalid key".into())
        }));
        let provider: Arc<dyn LLMProvider> = flaky.clone();

        let err = run(&provider, &settings(2)).await.unwrap_err();
        assert_eq!(kind(err), AiErrorKind::AuthenticationFailed);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempts_time_out_as_unavailable() {
        let mut hanging = FlakyProvider::new(0, || LlmError::Timeout);
        hanging.hang = true;
        let hanging = Arc::new(hanging);
        let provider: Arc<dyn LLMProvider> = hanging.clone();

        let err = run(&provider, &settings(1)).await.unwrap_err();
        assert_eq!(kind(err), AiErrorKind::ServiceUnavailable);
        assert_eq!(hanging.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mock_provider_reply_is_returned() {
        let mock = MockProvider::new();
        mock.add_response("{\"title\": \"T\"}").await;
        let provider: Arc<dyn LLMProvider> = Arc::new(mock);
        let reply = run(&provider, &settings(0)).await.unwrap();
        assert_eq!(reply, "{\"title\": \"T\"}");
    }
}
