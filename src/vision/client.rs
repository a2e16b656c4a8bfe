//! Gemini-style vision model client
//!
//! Structured JSON calls against a `generateContent` endpoint: readiness
//! classification and analysis use schema-constrained responses, the
//! extraction loop uses function declarations mirroring the browser action
//! set. Transient API failures are retried a bounded number of times.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::types::{
    ChatPart, ChatRole, ExtractionChat, ModelTurn, ProposedAction, ReadinessVerdict, VisionError,
};
use crate::browser::Action;
use crate::config::LlmSettings;

const MAX_RETRIES: u32 = 2;

fn is_retryable_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..=599).contains(&status)
}

/// Truncate to at most `limit` characters on a char boundary. Error
/// bodies can carry arbitrary non-ASCII payloads.
fn truncate_chars(message: &str, limit: usize) -> &str {
    match message.char_indices().nth(limit) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

/// Vision model operations used across the orchestrator.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Classify the current page from a screenshot.
    async fn classify_page(&self, screenshot_png: &[u8]) -> Result<ReadinessVerdict, VisionError>;

    /// Advance an extraction conversation by one turn.
    async fn extraction_turn(&self, chat: &ExtractionChat) -> Result<ModelTurn, VisionError>;

    /// Run a schema-constrained analysis prompt, returning raw JSON.
    async fn analyze(&self, prompt: &str) -> Result<Value, VisionError>;
}

/// Function declarations exposing the action set to the model.
static ACTION_DECLARATIONS: Lazy<Value> = Lazy::new(|| {
    let point = |desc: &str| {
        json!({
            "type": "object",
            "properties": {
                "x": {"type": "integer", "description": "0-999 normalized"},
                "y": {"type": "integer", "description": "0-999 normalized"}
            },
            "required": ["x", "y"],
            "description": desc
        })
    };
    json!([
        {"name": "click", "description": "Click at a point", "parameters": point("target")},
        {"name": "type_text", "description": "Click a field and type into it", "parameters": {
            "type": "object",
            "properties": {
                "x": {"type": "integer"}, "y": {"type": "integer"},
                "text": {"type": "string"},
                "press_enter": {"type": "boolean"},
                "clear_first": {"type": "boolean"}
            },
            "required": ["x", "y", "text"]
        }},
        {"name": "drag", "description": "Drag between two points", "parameters": {
            "type": "object",
            "properties": {
                "x0": {"type": "integer"}, "y0": {"type": "integer"},
                "x1": {"type": "integer"}, "y1": {"type": "integer"}
            },
            "required": ["x0", "y0", "x1", "y1"]
        }},
        {"name": "scroll", "description": "Scroll the page", "parameters": {
            "type": "object",
            "properties": {
                "direction": {"type": "string", "enum": ["up", "down", "left", "right"]},
                "magnitude": {"type": "integer"},
                "x": {"type": "integer"}, "y": {"type": "integer"}
            },
            "required": ["direction"]
        }},
        {"name": "key_press", "description": "Press a key or chord like Control+A", "parameters": {
            "type": "object",
            "properties": {"chord": {"type": "string"}},
            "required": ["chord"]
        }},
        {"name": "navigate", "description": "Navigate to a URL", "parameters": {
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"]
        }},
        {"name": "wait", "description": "Wait for the page to progress", "parameters": {
            "type": "object",
            "properties": {"seconds": {"type": "number"}},
            "required": ["seconds"]
        }},
        {"name": "hover", "description": "Hover over a point", "parameters": point("target")},
        {"name": "move_mouse", "description": "Move the cursor", "parameters": point("target")}
    ])
});

/// Map a function name from the model onto an action `type` tag.
fn action_tag(function_name: &str) -> &str {
    match function_name {
        "type_text" => "type",
        "key_press" => "key",
        "move_mouse" => "move",
        other => other,
    }
}

const PROBE_PROMPT: &str = "You are watching a flight search results page load. Classify the \
current state of the page in the screenshot. Use results_ready only when multiple flight cards \
are visible, each showing airline, price and times, with no loading indicators, no CAPTCHA, and \
stable rendering. Use captcha when any interactive anti-bot challenge is visible. Use no_results \
when the site states no flights match. Use error for site error pages. Otherwise use loading or \
unknown.";

static PROBE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "is_ready": {"type": "boolean"},
            "page_state": {
                "type": "string",
                "enum": ["loading", "captcha", "error", "results_ready", "no_results", "unknown"]
            },
            "confidence": {"type": "number"},
            "reasoning": {"type": "string"}
        },
        "required": ["is_ready", "page_state", "confidence", "reasoning"]
    })
});

/// reqwest-backed client for a Gemini-compatible vision API.
pub struct GeminiVision {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl GeminiVision {
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self { client, settings }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model,
            self.settings.api_key
        )
    }

    /// One `generateContent` call with bounded retry on transient failures.
    async fn generate(&self, body: Value) -> Result<Value, VisionError> {
        let mut last_error = VisionError::Empty;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(500 * u64::from(attempt));
                warn!(attempt, "retrying vision call after {delay:?}");
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(self.endpoint()).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = VisionError::Transport(e.to_string());
                    continue;
                }
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                error!(status, "vision API error: {}", truncate_chars(&message, 300));
                last_error = VisionError::Api { status, message };
                if is_retryable_status(status) {
                    continue;
                }
                return Err(last_error);
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| VisionError::Transport(format!("response decode: {e}")));
        }
        Err(last_error)
    }

    fn format_chat(chat: &ExtractionChat) -> Vec<Value> {
        chat.turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                };
                let parts: Vec<Value> = turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        ChatPart::Text(text) => json!({"text": text}),
                        ChatPart::InlineImage { data_base64 } => json!({
                            "inlineData": {"mimeType": "image/png", "data": data_base64}
                        }),
                        ChatPart::FunctionCall { name, args } => json!({
                            "functionCall": {"name": name, "args": args}
                        }),
                        ChatPart::FunctionResponse { name, response } => json!({
                            "functionResponse": {"name": name, "response": {"result": response}}
                        }),
                    })
                    .collect();
                json!({"role": role, "parts": parts})
            })
            .collect()
    }

    /// Collect text and function-call parts from the first candidate.
    fn parse_candidate(response: &Value) -> Result<(String, Vec<ProposedAction>), VisionError> {
        let parts = response["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or(VisionError::Empty)?;

        let mut text = String::new();
        let mut calls = Vec::new();
        for part in parts {
            if let Some(t) = part["text"].as_str() {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc["name"].as_str().unwrap_or_default().to_string();
                let args = fc.get("args").cloned().unwrap_or(json!({}));
                let mut tagged = args.clone();
                if let Some(map) = tagged.as_object_mut() {
                    map.insert("type".into(), json!(action_tag(&name)));
                }
                let action = Action::from_value(&tagged);
                calls.push(ProposedAction { name, args, action });
            }
        }
        Ok((text, calls))
    }

    fn screenshot_part(screenshot_png: &[u8]) -> Value {
        json!({
            "inlineData": {"mimeType": "image/png", "data": BASE64.encode(screenshot_png)}
        })
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn classify_page(&self, screenshot_png: &[u8]) -> Result<ReadinessVerdict, VisionError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": PROBE_PROMPT},
                    Self::screenshot_part(screenshot_png)
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": PROBE_SCHEMA.clone()
            }
        });
        let response = self.generate(body).await?;
        let (text, _) = Self::parse_candidate(&response)?;
        let verdict: ReadinessVerdict = serde_json::from_str(&text)
            .map_err(|e| VisionError::Transport(format!("probe schema violation: {e}")))?;
        debug!(
            state = ?verdict.page_state,
            confidence = verdict.confidence,
            "readiness probe verdict"
        );
        Ok(verdict)
    }

    async fn extraction_turn(&self, chat: &ExtractionChat) -> Result<ModelTurn, VisionError> {
        let body = json!({
            "contents": Self::format_chat(chat),
            "tools": [{"functionDeclarations": ACTION_DECLARATIONS.clone()}]
        });
        let response = self.generate(body).await?;
        let (text, calls) = Self::parse_candidate(&response)?;
        if calls.is_empty() {
            Ok(ModelTurn::Text(text))
        } else {
            Ok(ModelTurn::Actions(calls))
        }
    }

    async fn analyze(&self, prompt: &str) -> Result<Value, VisionError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseMimeType": "application/json"}
        });
        let response = self.generate(body).await?;
        let (text, _) = Self::parse_candidate(&response)?;
        serde_json::from_str(&text)
            .map_err(|e| VisionError::Transport(format!("analysis decode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let short = "plain ascii error";
        assert_eq!(truncate_chars(short, 300), short);
        // 4-byte scalar values: a byte-offset slice at the limit would panic.
        let wide: String = "🛫".repeat(400);
        let cut = truncate_chars(&wide, 300);
        assert_eq!(cut.chars().count(), 300);
    }

    #[test]
    fn function_names_map_to_action_tags() {
        assert_eq!(action_tag("click"), "click");
        assert_eq!(action_tag("type_text"), "type");
        assert_eq!(action_tag("key_press"), "key");
        assert_eq!(action_tag("move_mouse"), "move");
    }

    #[test]
    fn parse_candidate_extracts_actions() {
        let response = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "click", "args": {"x": 500, "y": 250}}},
                {"functionCall": {"name": "teleport", "args": {}}}
            ]}}]
        });
        let (_, calls) = GeminiVision::parse_candidate(&response).expect("parses");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].action, Action::Click { x: 500, y: 250 });
        assert!(matches!(calls[1].action, Action::Unsupported { ref name } if name == "teleport"));
    }

    #[test]
    fn parse_candidate_concatenates_text() {
        let response = json!({
            "candidates": [{"content": {"parts": [
                {"text": "{\"flights\":"},
                {"text": "[]}"}
            ]}}]
        });
        let (text, calls) = GeminiVision::parse_candidate(&response).expect("parses");
        assert_eq!(text, "{\"flights\":[]}");
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn classify_page_round_trips_through_mock_api() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "candidates": [{"content": {"parts": [{"text":
                        "{\"is_ready\":true,\"page_state\":\"results_ready\",\"confidence\":0.92,\"reasoning\":\"cards visible\"}"
                    }]}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let vision = GeminiVision::new(LlmSettings {
            api_key: "k".into(),
            model: "m".into(),
            base_url: server.url(),
        });
        let verdict = vision.classify_page(b"png").await.expect("classifies");
        assert!(verdict.is_ready);
        assert_eq!(verdict.page_state, super::super::types::PageState::ResultsReady);
    }
}
