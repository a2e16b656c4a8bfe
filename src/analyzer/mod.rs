//! Progressive result analysis
//!
//! After every worker completion the orchestrator re-analyzes the whole
//! aggregate: an LLM digest when the model cooperates, a deterministic
//! numeric digest when it does not. Partialness is a hard contract -
//! consumers key "updating" indicators off `is_partial`.

use log::warn;
use std::sync::Arc;

use crate::model::{Analysis, CheapestOption, WorkerResult, parse_price};
use crate::vision::VisionModel;

/// LLM-backed analyzer over the current aggregate.
pub struct ProgressiveAnalyzer {
    vision: Arc<dyn VisionModel>,
}

impl ProgressiveAnalyzer {
    #[must_use]
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }

    /// Analyze the aggregate so far.
    ///
    /// `is_partial` is `completed < total_expected`; it is stamped on the
    /// returned analysis regardless of what the model says. Never fails:
    /// any model trouble falls back to [`deterministic_digest`].
    pub async fn analyze(
        &self,
        results: &[WorkerResult],
        total_expected: usize,
        from: &str,
        to: &str,
    ) -> Analysis {
        let is_partial = results.len() < total_expected;
        let prompt = build_prompt(results, total_expected, from, to, is_partial);

        match self.vision.analyze(&prompt).await {
            Ok(value) => match serde_json::from_value::<Analysis>(value) {
                Ok(mut analysis) => {
                    analysis.is_partial = is_partial;
                    analysis
                }
                Err(e) => {
                    warn!("Analysis response did not match schema: {e}");
                    deterministic_digest(results, total_expected, is_partial)
                }
            },
            Err(e) => {
                warn!("Analysis call failed, using deterministic digest: {e}");
                deterministic_digest(results, total_expected, is_partial)
            }
        }
    }
}

fn build_prompt(
    results: &[WorkerResult],
    total_expected: usize,
    from: &str,
    to: &str,
    is_partial: bool,
) -> String {
    let voice = if is_partial {
        "Results are PARTIAL: only some date pairs have finished. Use hedging language \
         (\"so far\", \"based on current data\") in every free-text field."
    } else {
        "All date pairs have finished. Write definitive language; no hedging."
    };
    let data = serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are analyzing round-trip flight search results from {from} to {to}. \
         {done} of {total_expected} searches have completed. {voice}\n\
         Respond with JSON matching this shape exactly: \
         {{\"cheapest_option\":{{\"dep_date\":\"YYYY-MM-DD\",\"ret_date\":\"YYYY-MM-DD\",\
         \"price\":\"string\",\"airline\":\"string\",\"reasoning\":\"string\"}},\
         \"trends\":[{{\"observation\":\"string\",\"impact\":\"string\"}}],\
         \"recommendations\":[\"string\"],\"summary\":\"string\"}}\n\
         Compare prices numerically, not lexically. Results:\n{data}",
        done = results.len(),
    )
}

/// Model-free digest: the numerically cheapest row wins, trends and
/// recommendations stay empty, the summary is synthesized from counts.
///
/// Deterministic: identical inputs produce identical output.
#[must_use]
pub fn deterministic_digest(
    results: &[WorkerResult],
    total_expected: usize,
    is_partial: bool,
) -> Analysis {
    let cheapest = results
        .iter()
        .flat_map(|result| {
            result
                .flights
                .iter()
                .filter_map(move |flight| {
                    parse_price(&flight.price).map(|value| (value, result, flight))
                })
        })
        .min_by(|a, b| a.0.total_cmp(&b.0));

    let cheapest_option = match cheapest {
        Some((value, result, flight)) => CheapestOption {
            dep_date: Some(result.dep_date),
            ret_date: Some(result.ret_date),
            price: Some(flight.price.clone()),
            airline: Some(flight.airline.clone()),
            reasoning: format!("Lowest parsed price ({value:.2}) across all completed searches"),
        },
        None => CheapestOption {
            reasoning: "No priced flights in the completed searches yet".to_string(),
            ..CheapestOption::default()
        },
    };

    let flights_seen: usize = results.iter().map(|r| r.flights.len()).sum();
    let summary = if is_partial {
        format!(
            "So far {done} of {total_expected} searches have completed with {flights_seen} \
             flight options collected.",
            done = results.len(),
        )
    } else {
        format!(
            "All {total_expected} searches completed with {flights_seen} flight options collected.",
        )
    };

    Analysis {
        cheapest_option,
        trends: Vec::new(),
        recommendations: Vec::new(),
        summary,
        is_partial,
    }
}
