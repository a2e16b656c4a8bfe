//! Vision model I/O types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser::Action;

/// Vision-classified page state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Loading,
    Captcha,
    ResultsReady,
    NoResults,
    Error,
    Unknown,
}

/// Outcome of one readiness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessVerdict {
    pub is_ready: bool,
    pub page_state: PageState,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    pub reasoning: String,
}

/// Vision service failures. These are infrastructure errors; schema-level
/// garbage from the model is handled by callers, not here.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("vision transport failure: {0}")]
    Transport(String),

    #[error("vision API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("vision model returned an empty response")]
    Empty,
}

/// Conversation roles, mapped to the wire by each client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

/// One part of a conversation turn.
#[derive(Debug, Clone)]
pub enum ChatPart {
    Text(String),
    /// Base64 PNG screenshot.
    InlineImage { data_base64: String },
    FunctionCall { name: String, args: Value },
    FunctionResponse { name: String, response: Value },
}

/// One conversation turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<ChatPart>,
}

/// Conversation state for one extraction run. The driver owns this; the
/// vision client is stateless across calls.
#[derive(Debug, Clone, Default)]
pub struct ExtractionChat {
    pub turns: Vec<ChatTurn>,
}

impl ExtractionChat {
    /// Start a chat with the task text and the first screenshot.
    #[must_use]
    pub fn begin(task: &str, screenshot_base64: String) -> Self {
        Self {
            turns: vec![ChatTurn {
                role: ChatRole::User,
                parts: vec![
                    ChatPart::Text(task.to_string()),
                    ChatPart::InlineImage {
                        data_base64: screenshot_base64,
                    },
                ],
            }],
        }
    }

    /// Echo the model's tool calls back into the history.
    pub fn push_model_calls(&mut self, calls: &[ProposedAction]) {
        self.turns.push(ChatTurn {
            role: ChatRole::Model,
            parts: calls
                .iter()
                .map(|call| ChatPart::FunctionCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                })
                .collect(),
        });
    }

    /// Report tool outcomes plus a fresh screenshot.
    pub fn push_feedback(&mut self, responses: Vec<(String, Value)>, screenshot_base64: String) {
        let mut parts: Vec<ChatPart> = responses
            .into_iter()
            .map(|(name, response)| ChatPart::FunctionResponse { name, response })
            .collect();
        parts.push(ChatPart::InlineImage {
            data_base64: screenshot_base64,
        });
        self.turns.push(ChatTurn {
            role: ChatRole::User,
            parts,
        });
    }
}

/// One tool call proposed by the model.
#[derive(Debug, Clone)]
pub struct ProposedAction {
    /// Function name as emitted by the model.
    pub name: String,
    /// Raw arguments as emitted by the model.
    pub args: Value,
    /// Parsed action (possibly `Unsupported`).
    pub action: Action,
}

/// What the model did with an extraction turn.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    /// Execute these actions and come back with results.
    Actions(Vec<ProposedAction>),
    /// Final structured answer as text.
    Text(String),
}
