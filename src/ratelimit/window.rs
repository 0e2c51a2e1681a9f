//! In-memory sliding window store.

use dashmap::DashMap;
use std::collections::VecDeque;

use super::client::WindowKey;
use super::tier::TierLimits;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was counted
    Allowed {
        /// Requests still available in the current window
        remaining: u64,
    },
    /// The window is full; nothing was recorded
    Rejected {
        /// Milliseconds until the oldest counted request leaves the window
        retry_after_ms: u64,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Recent request timestamps of one client, kept sorted oldest first.
#[derive(Debug, Default)]
pub struct ClientWindow {
    timestamps: VecDeque<u64>,
}

impl ClientWindow {
    /// Drop every timestamp at or before `window_start`.
    fn prune(&mut self, window_start: u64) {
        while self.timestamps.front().is_some_and(|&ts| ts <= window_start) {
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Start of the window ending at `now`, or `None` when the window reaches back
/// before the epoch and nothing can be stale yet.
fn window_start(now_ms: u64, window_ms: u64) -> Option<u64> {
    now_ms.checked_sub(window_ms)
}

/// Process-local map from window key to recent timestamps.
///
/// Each key's window lives in a DashMap shard; holding the entry guard for the
/// whole prune-count-append sequence makes admission atomic per key while
/// unrelated keys proceed in parallel.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: DashMap<WindowKey, ClientWindow>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit and record a request at `now_ms` if the key's window has room.
    ///
    /// A rejected request leaves the window untouched.
    pub fn record(&self, key: &WindowKey, now_ms: u64, limits: TierLimits) -> Admission {
        let mut window = self.windows.entry(key.clone()).or_default();

        if let Some(start) = window_start(now_ms, limits.window_ms) {
            window.prune(start);
        }

        let count = window.len() as u64;
        if count >= limits.limit {
            let oldest = window.timestamps.front().copied().unwrap_or(now_ms);
            let retry_after_ms = (oldest + limits.window_ms).saturating_sub(now_ms);
            return Admission::Rejected { retry_after_ms };
        }

        // Clock readings can reach the lock out of order; keep the deque sorted
        // so front-only pruning stays exact.
        let at = window.timestamps.partition_point(|&ts| ts <= now_ms);
        window.timestamps.insert(at, now_ms);
        Admission::Allowed {
            remaining: limits.limit - count - 1,
        }
    }

    /// Drop the key's timestamps at or before `window_start`.
    pub fn prune(&self, key: &WindowKey, window_start: u64) {
        if let Some(mut window) = self.windows.get_mut(key) {
            window.prune(window_start);
        }
    }

    /// Prune every key and forget those left empty. Returns the number of keys
    /// removed.
    pub fn sweep(&self, window_start: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window.prune(window_start);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of timestamps currently held for a key.
    pub fn count(&self, key: &WindowKey) -> usize {
        self.windows.get(key).map(|w| w.len()).unwrap_or(0)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.windows.clear();
    }
}
