//! Throttle tiers and their configured limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Throttle tier a route is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleTier {
    /// Authentication and other abusable actions
    Strict,
    /// General API traffic
    Relaxed,
}

impl ThrottleTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleTier::Strict => "strict",
            ThrottleTier::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for ThrottleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit and window length for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum requests admitted inside one window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl TierLimits {
    pub const fn new(limit: u64, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    /// Get the window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Limits for every tier, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "default_strict")]
    pub strict: TierLimits,
    #[serde(default = "default_relaxed")]
    pub relaxed: TierLimits,
}

impl TierTable {
    /// Get the limits configured for a tier.
    pub fn limits(&self, tier: ThrottleTier) -> TierLimits {
        match tier {
            ThrottleTier::Strict => self.strict,
            ThrottleTier::Relaxed => self.relaxed,
        }
    }

    /// The widest window across all tiers. Sweeping at this width never drops
    /// a timestamp some tier still counts.
    pub fn max_window_ms(&self) -> u64 {
        self.strict.window_ms.max(self.relaxed.window_ms)
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            relaxed: default_relaxed(),
        }
    }
}

fn default_strict() -> TierLimits {
    TierLimits::new(5, 60_000)
}

fn default_relaxed() -> TierLimits {
    TierLimits::new(60, 60_000)
}
