//! LLM extraction driver
//!
//! Drives the vision model through an agent loop over one results page:
//! each turn either executes proposed browser actions and reports back, or
//! accepts the model's final structured answer. A single bad turn never
//! aborts the whole extraction.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::client::VisionModel;
use super::types::{ExtractionChat, ModelTurn};
use crate::browser::PageDriver;
use crate::model::Flight;
use crate::search_events::{SearchEvent, SearchEventBus};

/// Structured payload expected in the model's final turn.
#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    flights: Vec<Flight>,
    #[serde(default)]
    summary: String,
}

/// Result of one extraction run.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub success: bool,
    pub final_url: String,
    pub flights: Vec<Flight>,
    pub summary: String,
}

/// Agent-loop extraction driver for a single page.
pub struct ExtractionDriver {
    vision: Arc<dyn VisionModel>,
    events: Arc<SearchEventBus>,
    max_iterations: u32,
}

impl ExtractionDriver {
    #[must_use]
    pub fn new(vision: Arc<dyn VisionModel>, events: Arc<SearchEventBus>, max_iterations: u32) -> Self {
        Self {
            vision,
            events,
            max_iterations,
        }
    }

    /// Run the loop until the model answers or the iteration cap is
    /// reached; failed turns consume iterations.
    pub async fn run(&self, driver: &dyn PageDriver, pair_id: u32, task: &str) -> Extraction {
        let first_shot = match driver.screenshot().await {
            Ok(shot) => shot,
            Err(e) => {
                warn!("Extraction could not capture initial screenshot: {e}");
                return Extraction {
                    success: false,
                    final_url: driver.current_url().await,
                    flights: Vec::new(),
                    summary: format!("screenshot failed: {e}"),
                };
            }
        };

        let mut chat = ExtractionChat::begin(task, BASE64.encode(&first_shot.data));
        let mut final_url = first_shot.url;

        for iteration in 0..self.max_iterations {
            let turn = match self.vision.extraction_turn(&chat).await {
                Ok(turn) => turn,
                Err(e) => {
                    // One transient model failure costs an iteration, not
                    // the extraction.
                    warn!("Extraction iteration {iteration} failed for pair {pair_id}: {e}");
                    continue;
                }
            };

            match turn {
                ModelTurn::Text(text) => {
                    let (flights, summary, parsed) = parse_extraction(&text);
                    debug!(
                        "Extraction finished for pair {pair_id}: {} flights ({})",
                        flights.len(),
                        if parsed { "parsed" } else { "parse error" }
                    );
                    return Extraction {
                        success: true,
                        final_url,
                        flights,
                        summary,
                    };
                }
                ModelTurn::Actions(calls) => {
                    chat.push_model_calls(&calls);
                    let mut responses = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let outcome = driver.execute(&call.action).await;
                        let _ = self.events.publish(SearchEvent::loading(format!(
                            "worker {pair_id}: {} ({})",
                            call.action.kind(),
                            if outcome.ok { "ok" } else { "failed" }
                        )));
                        let url = driver.current_url().await;
                        if !url.is_empty() {
                            final_url = url.clone();
                        }
                        responses.push((
                            call.name.clone(),
                            json!({
                                "ok": outcome.ok,
                                "error": outcome.error,
                                "url": url,
                            }),
                        ));
                    }
                    match driver.screenshot().await {
                        Ok(shot) => {
                            if !shot.url.is_empty() {
                                final_url = shot.url.clone();
                            }
                            chat.push_feedback(responses, BASE64.encode(&shot.data));
                        }
                        Err(e) => {
                            warn!("Post-action screenshot failed for pair {pair_id}: {e}");
                            chat.push_feedback(responses, String::new());
                        }
                    }
                }
            }
        }

        warn!(
            "Extraction hit the {}-iteration cap for pair {pair_id}",
            self.max_iterations
        );
        Extraction {
            success: false,
            final_url,
            flights: Vec::new(),
            summary: "iteration cap reached without a final answer".to_string(),
        }
    }
}

/// Parse the model's final text. A parse failure yields an empty
/// extraction, never an error.
fn parse_extraction(text: &str) -> (Vec<Flight>, String, bool) {
    match serde_json::from_str::<ExtractionPayload>(text) {
        Ok(payload) => (payload.flights, payload.summary, true),
        Err(e) => {
            warn!("Extraction payload did not parse: {e}");
            (Vec::new(), "parse error".to_string(), false)
        }
    }
}
