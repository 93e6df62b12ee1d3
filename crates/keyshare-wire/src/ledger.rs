//! Request-id reuse window.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keyshare_types::error::{KeyShareError, KeyShareResult};
use std::time::{Duration, Instant};
use tracing::debug;

/// Remembers when each request id was last accepted and rejects reuse
/// inside `window`. A zero window disables the check.
#[derive(Debug)]
pub struct RequestLedger {
    window: Duration,
    seen: DashMap<u64, Instant>,
}

impl RequestLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Accept `request_id` and record it, or fail with `DuplicateRequest`
    /// if it was accepted less than `window` ago. A rejected attempt does
    /// not extend the window.
    pub fn check_and_record(&self, request_id: u64) -> KeyShareResult<()> {
        if self.window.is_zero() {
            return Ok(());
        }
        let now = Instant::now();
        match self.seen.entry(request_id) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    return Err(KeyShareError::DuplicateRequest(request_id));
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }
        Ok(())
    }

    /// Drop `request_id` so it can be used again straight away.
    pub fn forget(&self, request_id: u64) {
        self.seen.remove(&request_id);
    }

    /// Forget ids whose window has passed. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen.retain(|_, at| at.elapsed() < window);
        let dropped = before.saturating_sub(self.seen.len());
        if dropped > 0 {
            debug!(dropped, "Pruned request ledger");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
