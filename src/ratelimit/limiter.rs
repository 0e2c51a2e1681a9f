//! Sliding window rate limiter.

use tracing::{debug, trace};

use super::client::{ClientKey, WindowKey};
use super::tier::{ThrottleTier, TierTable};
use super::window::{Admission, WindowStore};

/// The rate limiter that admits or rejects requests per client and tier.
///
/// Counting is a trailing window: at most `limit` requests per `window_ms` are
/// admitted for each `(tier, client)` pair. This struct is thread-safe and can
/// be shared across multiple tasks.
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamp windows indexed by tier and client
    store: WindowStore,
    /// Configured limits per tier
    tiers: TierTable,
}

impl RateLimiter {
    /// Create a new rate limiter with the given tier limits.
    pub fn new(tiers: TierTable) -> Self {
        Self {
            store: WindowStore::new(),
            tiers,
        }
    }

    /// Check the rate limit for a client at `now_ms`.
    ///
    /// An allowed request is counted; a rejected one is not.
    pub fn check(&self, client: &ClientKey, tier: ThrottleTier, now_ms: u64) -> Admission {
        let key = WindowKey::new(tier, client.clone());
        let limits = self.tiers.limits(tier);

        trace!(key = %key, limit = limits.limit, window_ms = limits.window_ms, "Checking rate limit");

        let admission = self.store.record(&key, now_ms, limits);

        if let Admission::Rejected { retry_after_ms } = admission {
            debug!(
                key = %key,
                limit = limits.limit,
                retry_after_ms,
                "Rate limit exceeded"
            );
        }

        admission
    }

    /// Drop stale timestamps for every client and forget idle ones.
    ///
    /// Uses the widest tier window so no tier loses timestamps it still counts.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let Some(window_start) = now_ms.checked_sub(self.tiers.max_window_ms()) else {
            return 0;
        };

        let removed = self.store.sweep(window_start);
        debug!(
            removed,
            remaining = self.store.len(),
            "Swept rate limit windows"
        );
        removed
    }

    /// Get the number of requests currently counted for a client and tier.
    pub fn counted(&self, client: &ClientKey, tier: ThrottleTier) -> usize {
        self.store.count(&WindowKey::new(tier, client.clone()))
    }

    /// Get the number of tracked windows.
    pub fn window_count(&self) -> usize {
        self.store.len()
    }

    /// Get the configured tier limits.
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(TierTable::default())
    }
}
