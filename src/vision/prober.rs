//! Page readiness probing
//!
//! A single-shot vision classification over the current screenshot. The
//! worker drives the cadence; this module only answers "what is on the
//! page right now".

use std::sync::Arc;

use super::client::VisionModel;
use super::types::{ReadinessVerdict, VisionError};
use crate::browser::PageDriver;

/// Vision-based readiness prober for one page.
pub struct ReadinessProber {
    vision: Arc<dyn VisionModel>,
}

impl ReadinessProber {
    #[must_use]
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }

    /// Capture the page and classify it.
    ///
    /// Errors here are infrastructure failures (screenshot or vision API);
    /// the caller backs off and probes again.
    pub async fn probe(&self, driver: &dyn PageDriver) -> Result<ReadinessVerdict, VisionError> {
        let screenshot = driver
            .screenshot()
            .await
            .map_err(|e| VisionError::Transport(format!("screenshot failed: {e}")))?;
        if screenshot.data.is_empty() {
            // Capture raced a navigation; report as still loading rather
            // than burning a vision call on an empty image.
            return Ok(ReadinessVerdict {
                is_ready: false,
                page_state: super::types::PageState::Loading,
                confidence: 0.0,
                reasoning: "screenshot unavailable during navigation".to_string(),
            });
        }
        self.vision.classify_page(&screenshot.data).await
    }
}
