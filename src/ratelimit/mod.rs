//! Rate limiting logic and state management.

mod client;
mod limiter;
mod sweeper;
mod tier;
mod window;

pub use client::{ClientIdentityConfig, ClientKey, WindowKey};
pub use limiter::RateLimiter;
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use tier::{ThrottleTier, TierLimits, TierTable};
pub use window::{Admission, ClientWindow, WindowStore};
