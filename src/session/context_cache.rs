//! Opt-in cache of provider browser contexts per user
//!
//! Repeat searches from the same user can reuse a provider context id
//! instead of building a fresh fingerprint each time. Entries expire after
//! 24 hours. Process-wide, no persistence.

use dashmap::DashMap;
use std::time::{Duration, Instant};

const CONTEXT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Maps user id to a provider context id with a TTL.
#[derive(Debug, Default)]
pub struct ContextCache {
    entries: DashMap<String, (String, Instant)>,
}

impl ContextCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live context id for the user, evicting it when expired.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<String> {
        let expired = match self.entries.get(user_id) {
            Some(entry) => {
                let (context_id, stored_at) = entry.value();
                if stored_at.elapsed() < CONTEXT_TTL {
                    return Some(context_id.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(user_id);
        }
        None
    }

    /// Remember the context id for a user, replacing any prior entry.
    pub fn put(&self, user_id: impl Into<String>, context_id: impl Into<String>) {
        self.entries
            .insert(user_id.into(), (context_id.into(), Instant::now()));
    }

    /// Number of cached entries, including not-yet-evicted expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = ContextCache::new();
        cache.put("user-1", "ctx-abc");
        assert_eq!(cache.get("user-1").as_deref(), Some("ctx-abc"));
        assert_eq!(cache.get("user-2"), None);
    }

    #[test]
    fn put_replaces_existing_entry() {
        let cache = ContextCache::new();
        cache.put("user-1", "ctx-old");
        cache.put("user-1", "ctx-new");
        assert_eq!(cache.get("user-1").as_deref(), Some("ctx-new"));
        assert_eq!(cache.len(), 1);
    }
}
