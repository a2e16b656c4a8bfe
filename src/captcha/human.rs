//! Human-mode solved-signal registry
//!
//! In human mode the worker announces the CAPTCHA on the event stream and
//! waits here for an external "solved" signal keyed by its pair id. The
//! embedding server wires its own endpoint to [`HumanSolveRegistry::signal_solved`].

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Process-wide registry of pending human CAPTCHA solves.
#[derive(Debug, Default)]
pub struct HumanSolveRegistry {
    pending: DashMap<u32, Arc<AtomicBool>>,
}

impl HumanSolveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a worker's CAPTCHA as solved.
    pub fn signal_solved(&self, pair_id: u32) {
        if let Some(flag) = self.pending.get(&pair_id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Wait until the worker's CAPTCHA is signalled solved, polling
    /// periodically, or until the timeout elapses.
    pub async fn wait_solved(&self, pair_id: u32, timeout: Duration) -> bool {
        let flag = Arc::new(AtomicBool::new(false));
        self.pending.insert(pair_id, Arc::clone(&flag));

        let deadline = tokio::time::Instant::now() + timeout;
        let solved = loop {
            if flag.load(Ordering::SeqCst) {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            let remaining = deadline - tokio::time::Instant::now();
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        };

        self.pending.remove(&pair_id);
        solved
    }
}
