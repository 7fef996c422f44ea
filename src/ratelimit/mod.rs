//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod presets;
mod rules;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::WindowKey;
pub use limiter::{RateLimiter, DEFAULT_CLEANUP_INTERVAL};
pub use presets::Preset;
pub use rules::{RouteRule, RouteRules};
pub use window::{Quota, RateLimitConfig, RateWindow, Verdict};
