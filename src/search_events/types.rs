//! Event type definitions for the search event stream
//!
//! One subscriber per request consumes these over a line-framed stream
//! (see `sse.rs`). Consumers must ignore fields they do not know; the
//! `type` tag and the fields listed here are the stable contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::Action;
use crate::model::{Analysis, Flight, WorkerResult};

/// A point on the page, in normalized 0..999 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i64,
    pub y: i64,
}

/// Events emitted during a search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    /// The search space has been generated.
    CombinationsGenerated {
        total: usize,
        timestamp: DateTime<Utc>,
    },
    /// A worker's remote-browser session is live and observable.
    SessionCreated {
        pair_id: u32,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        live_view_url: Option<String>,
        dep_date: chrono::NaiveDate,
        ret_date: chrono::NaiveDate,
        timestamp: DateTime<Utc>,
    },
    /// Coarse progress message for the UI.
    Loading {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Human mode: a CAPTCHA needs outside help on the given live view.
    CaptchaDetected {
        pair_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        live_view_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        captcha_type: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// The CAPTCHA sidecar produced a solve plan.
    StrategyReady {
        pair_id: u32,
        reasoning: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screenshot: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// One solver action, for UI observability. Emitted per action.
    GeminiAction {
        pair_id: u32,
        action: Action,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coordinates: Option<ScreenPoint>,
        reasoning: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screenshot: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Terminal success of one worker.
    MinionCompleted {
        pair_id: u32,
        dep_date: chrono::NaiveDate,
        ret_date: chrono::NaiveDate,
        flights: Vec<Flight>,
        timestamp: DateTime<Utc>,
    },
    /// Terminal failure of one worker, after all retries.
    MinionFailedFinal {
        pair_id: u32,
        dep_date: chrono::NaiveDate,
        ret_date: chrono::NaiveDate,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Snapshot of the aggregate plus its analysis.
    ProgressiveResults {
        total: usize,
        completed: usize,
        failed: usize,
        all_results: Vec<WorkerResult>,
        analysis: Analysis,
        is_complete: bool,
        timestamp: DateTime<Utc>,
    },
    /// Terminal request failure (configuration errors only).
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl SearchEvent {
    #[must_use]
    pub fn combinations_generated(total: usize) -> Self {
        Self::CombinationsGenerated {
            total,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn session_created(
        pair: &crate::model::DatePair,
        session_id: String,
        live_view_url: Option<String>,
    ) -> Self {
        Self::SessionCreated {
            pair_id: pair.pair_id,
            session_id,
            live_view_url,
            dep_date: pair.dep_date,
            ret_date: pair.ret_date,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn loading(message: impl Into<String>) -> Self {
        Self::Loading {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn captcha_detected(
        pair_id: u32,
        live_view_url: Option<String>,
        captcha_type: Option<String>,
    ) -> Self {
        Self::CaptchaDetected {
            pair_id,
            live_view_url,
            captcha_type,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn strategy_ready(pair_id: u32, reasoning: String, screenshot: Option<String>) -> Self {
        Self::StrategyReady {
            pair_id,
            reasoning,
            screenshot,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn gemini_action(
        pair_id: u32,
        action: Action,
        reasoning: String,
        screenshot: Option<String>,
    ) -> Self {
        let coordinates = action.coordinates().map(|(x, y)| ScreenPoint { x, y });
        Self::GeminiAction {
            pair_id,
            action,
            coordinates,
            reasoning,
            screenshot,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn minion_completed(result: &WorkerResult) -> Self {
        Self::MinionCompleted {
            pair_id: result.pair_id,
            dep_date: result.dep_date,
            ret_date: result.ret_date,
            flights: result.flights.clone(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn minion_failed_final(pair: &crate::model::DatePair, error: String) -> Self {
        Self::MinionFailedFinal {
            pair_id: pair.pair_id,
            dep_date: pair.dep_date,
            ret_date: pair.ret_date,
            error,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn progressive_results(
        total: usize,
        completed: usize,
        failed: usize,
        all_results: Vec<WorkerResult>,
        analysis: Analysis,
        is_complete: bool,
    ) -> Self {
        Self::ProgressiveResults {
            total,
            completed,
            failed,
            all_results,
            analysis,
            is_complete,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wire name of the event kind (the `type` tag).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CombinationsGenerated { .. } => "combinations_generated",
            Self::SessionCreated { .. } => "session_created",
            Self::Loading { .. } => "loading",
            Self::CaptchaDetected { .. } => "captcha_detected",
            Self::StrategyReady { .. } => "strategy_ready",
            Self::GeminiAction { .. } => "gemini_action",
            Self::MinionCompleted { .. } => "minion_completed",
            Self::MinionFailedFinal { .. } => "minion_failed_final",
            Self::ProgressiveResults { .. } => "progressive_results",
            Self::Error { .. } => "error",
        }
    }
}
