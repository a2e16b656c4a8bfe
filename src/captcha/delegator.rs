//! CAPTCHA delegation loop
//!
//! Offers the current page to the solving sidecar and walks its
//! action–observe–assess loop until the challenge is solved or the
//! iteration cap is hit. An unreachable sidecar means an immediate `false`
//! with no actions executed.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::human::HumanSolveRegistry;
use super::sidecar::{AssessRequest, CaptchaSidecar, SolveRequest, StrategyRequest};
use crate::browser::{Action, PageDriver};
use crate::search_events::{SearchEvent, SearchEventBus};

const OBSERVE_PAUSE: Duration = Duration::from_secs(1);

const SOLVE_TASK: &str =
    "Solve the CAPTCHA challenge visible in the screenshot so the flight results can load.";

/// Sidecar-driven CAPTCHA solver for one worker.
pub struct CaptchaDelegator {
    sidecar: Arc<dyn CaptchaSidecar>,
    events: Arc<SearchEventBus>,
    max_iterations: u32,
}

impl CaptchaDelegator {
    #[must_use]
    pub fn new(
        sidecar: Arc<dyn CaptchaSidecar>,
        events: Arc<SearchEventBus>,
        max_iterations: u32,
    ) -> Self {
        Self {
            sidecar,
            events,
            max_iterations,
        }
    }

    async fn capture(&self, driver: &dyn PageDriver) -> (String, String) {
        match driver.screenshot().await {
            Ok(shot) => (BASE64.encode(&shot.data), shot.url),
            Err(e) => {
                warn!("CAPTCHA screenshot failed: {e}");
                (String::new(), driver.current_url().await)
            }
        }
    }

    /// Run the AI solve loop. Returns whether the sidecar reported the
    /// challenge complete.
    pub async fn resolve(&self, driver: &dyn PageDriver, pair_id: u32) -> bool {
        if !self.sidecar.healthy().await {
            warn!("CAPTCHA sidecar unreachable; worker {pair_id} continues unaided");
            return false;
        }

        // Phase 1: strategy. Failure here is tolerated; the solve loop can
        // still make progress without a plan.
        let (screenshot, current_url) = self.capture(driver).await;
        match self
            .sidecar
            .strategy(StrategyRequest {
                screenshot: screenshot.clone(),
                current_url: current_url.clone(),
            })
            .await
        {
            Ok(plan) => {
                let _ = self.events.publish(SearchEvent::strategy_ready(
                    pair_id,
                    plan.reasoning,
                    Some(screenshot),
                ));
            }
            Err(e) => warn!("CAPTCHA strategy phase failed for worker {pair_id}: {e}"),
        }

        // Phase 2: action–observe–assess.
        let viewport = driver.viewport();
        for iteration in 0..self.max_iterations {
            let (screenshot, current_url) = self.capture(driver).await;
            let solve = match self
                .sidecar
                .solve(SolveRequest {
                    screenshot,
                    task: SOLVE_TASK.to_string(),
                    screen_width: viewport.width,
                    screen_height: viewport.height,
                    current_url: current_url.clone(),
                })
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("CAPTCHA solve round {iteration} failed for worker {pair_id}: {e}");
                    continue;
                }
            };

            if solve.complete || solve.actions.is_empty() {
                info!("CAPTCHA reported solved for worker {pair_id} after {iteration} rounds");
                return true;
            }

            // Execute only the first proposed action; the next round
            // re-observes before anything else happens.
            let raw_action = solve.actions[0].clone();
            let action = Action::from_value(&raw_action);
            let outcome = driver.execute(&action).await;
            if !outcome.ok {
                warn!(
                    "CAPTCHA action {} failed for worker {pair_id}: {:?}",
                    action.kind(),
                    outcome.error
                );
            }

            tokio::time::sleep(OBSERVE_PAUSE).await;
            let (after_shot, after_url) = self.capture(driver).await;
            let _ = self.events.publish(SearchEvent::gemini_action(
                pair_id,
                action,
                solve.message.clone(),
                Some(after_shot.clone()),
            ));

            match self
                .sidecar
                .assess(AssessRequest {
                    screenshot: after_shot,
                    previous_action: raw_action,
                    current_url: after_url,
                })
                .await
            {
                Ok(assessment) if assessment.complete => {
                    info!("CAPTCHA assessed solved for worker {pair_id}");
                    return true;
                }
                Ok(_) => {}
                Err(e) => warn!("CAPTCHA assess failed for worker {pair_id}: {e}"),
            }
        }

        warn!(
            "CAPTCHA unsolved after {} rounds for worker {pair_id}",
            self.max_iterations
        );
        false
    }

    /// Human mode: announce the CAPTCHA and wait for an external solved
    /// signal instead of driving the sidecar.
    pub async fn resolve_human(
        &self,
        pair_id: u32,
        live_view_url: Option<String>,
        registry: &HumanSolveRegistry,
        timeout: Duration,
    ) -> bool {
        let _ = self.events.publish(SearchEvent::captcha_detected(
            pair_id,
            live_view_url,
            None,
        ));
        registry.wait_solved(pair_id, timeout).await
    }
}

/// Raw sidecar action list helper, exposed for tests.
#[must_use]
pub fn first_action(actions: &[Value]) -> Option<Action> {
    actions.first().map(Action::from_value)
}
