//! Search event system
//!
//! Event types, the per-request broadcast bus, and SSE wire framing.

mod bus;
mod errors;
mod metrics;
mod sse;
pub mod types;

pub use bus::SearchEventBus;
pub use errors::EventBusError;
pub use metrics::{EventBusMetrics, MetricsSnapshot};
pub use sse::{SseFrameBuffer, encode_frame, frame_stream};
pub use types::{ScreenPoint, SearchEvent};
