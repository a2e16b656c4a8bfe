//! High-level browser actions and coordinate handling
//!
//! Actions arrive from the vision model and the CAPTCHA sidecar with
//! coordinates in a 0..999 normalized space; the adapter denormalizes them
//! against the live viewport before dispatch.

use serde::{Deserialize, Serialize};

/// Normalized coordinate range emitted by the vision model.
pub const NORMALIZED_RANGE: f64 = 1000.0;

/// Scroll directions understood by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Closed set of page actions.
///
/// Coordinates are normalized 0..999. Variants the adapter cannot dispatch
/// produce a structured `unimplemented` outcome, never a panic or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: i64,
        y: i64,
    },
    Type {
        x: i64,
        y: i64,
        text: String,
        #[serde(default)]
        press_enter: bool,
        #[serde(default)]
        clear_first: bool,
    },
    Drag {
        x0: i64,
        y0: i64,
        x1: i64,
        y1: i64,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        magnitude: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<i64>,
    },
    Key {
        chord: String,
    },
    Navigate {
        url: String,
    },
    Wait {
        seconds: f64,
    },
    Hover {
        x: i64,
        y: i64,
    },
    Move {
        x: i64,
        y: i64,
    },
    /// Action kind the model emitted but this adapter does not know.
    Unsupported {
        name: String,
    },
}

impl Action {
    /// Parse an action from loose JSON, mapping unknown tags to
    /// [`Action::Unsupported`] instead of failing.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(action) => action,
            Err(_) => Action::Unsupported {
                name: value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            },
        }
    }

    /// Primary coordinate of the action, if it has one (for event payloads).
    #[must_use]
    pub fn coordinates(&self) -> Option<(i64, i64)> {
        match self {
            Action::Click { x, y }
            | Action::Type { x, y, .. }
            | Action::Hover { x, y }
            | Action::Move { x, y } => Some((*x, *y)),
            Action::Drag { x0, y0, .. } => Some((*x0, *y0)),
            Action::Scroll { x, y, .. } => x.zip(*y),
            _ => None,
        }
    }

    /// Short wire name of the action kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Drag { .. } => "drag",
            Action::Scroll { .. } => "scroll",
            Action::Key { .. } => "key",
            Action::Navigate { .. } => "navigate",
            Action::Wait { .. } => "wait",
            Action::Hover { .. } => "hover",
            Action::Move { .. } => "move",
            Action::Unsupported { .. } => "unsupported",
        }
    }
}

/// Outcome of dispatching one action against the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }

    /// Outcome for action variants this adapter does not implement.
    #[must_use]
    pub fn unimplemented() -> Self {
        Self::failure("unimplemented")
    }
}

/// Denormalize a 0..999 coordinate against a viewport dimension.
#[must_use]
pub fn denormalize(value: i64, dimension: u32) -> i64 {
    ((value as f64 / NORMALIZED_RANGE) * f64::from(dimension)).floor() as i64
}

/// Normalize a pixel coordinate back to the 0..999 space.
#[must_use]
pub fn normalize(pixels: i64, dimension: u32) -> i64 {
    if dimension == 0 {
        return 0;
    }
    ((pixels as f64 / f64::from(dimension)) * NORMALIZED_RANGE).floor() as i64
}
