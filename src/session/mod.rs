//! Remote-browser session lifecycle
//!
//! Provider REST client, session handle types, and the optional per-user
//! context cache.

mod context_cache;
mod provider;
mod types;

pub use context_cache::ContextCache;
pub use provider::{HttpSessionProvider, SessionError, SessionProvider};
pub use types::{
    CreateSessionRequest, CreateSessionResponse, Fingerprint, LiveViewResponse, ProxyRequest,
    SessionHandle,
};
