//! Vision model integration
//!
//! The Gemini-style client, the readiness prober, and the extraction
//! agent loop.

mod client;
mod extractor;
mod prober;
mod types;

pub use client::{GeminiVision, VisionModel};
pub use extractor::{Extraction, ExtractionDriver};
pub use prober::ReadinessProber;
pub use types::{
    ChatPart, ChatRole, ChatTurn, ExtractionChat, ModelTurn, PageState, ProposedAction,
    ReadinessVerdict, VisionError,
};
