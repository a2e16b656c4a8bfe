//! CAPTCHA handling
//!
//! Sidecar HTTP client, the delegation loop, and the human-mode solved
//! signal registry.

mod delegator;
mod human;
mod sidecar;

pub use delegator::CaptchaDelegator;
pub use human::HumanSolveRegistry;
pub use sidecar::{
    AssessRequest, AssessResponse, CaptchaError, CaptchaSidecar, HttpCaptchaSidecar,
    SolveRequest, SolveResponse, StrategyRequest, StrategyResponse,
};
