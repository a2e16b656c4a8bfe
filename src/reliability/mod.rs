//! Reliability primitives shared across the orchestrator
//!
//! Bounded retry with exponential backoff, the process-wide circuit
//! breaker guarding session creation, and the best-effort proxy probe.

mod circuit_breaker;
mod proxy_health;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use proxy_health::{ECHO_ENDPOINT, probe_proxy_health};
pub use retry::{RetryPolicy, default_retryable, retry_with_backoff};
