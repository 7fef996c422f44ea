//! Shared state handed to every handler and middleware.

use std::sync::Arc;

use crate::ratelimit::{Clock, RateLimiter, RouteRules, SystemClock};

/// The limiter, its route table and the identifier policy.
pub struct GuardState<C: Clock = SystemClock> {
    pub limiter: Arc<RateLimiter<C>>,
    pub rules: Arc<RouteRules>,
    pub trust_forwarded_headers: bool,
}

impl<C: Clock> GuardState<C> {
    pub fn new(limiter: Arc<RateLimiter<C>>, rules: RouteRules, trust_forwarded_headers: bool) -> Self {
        Self {
            limiter,
            rules: Arc::new(rules),
            trust_forwarded_headers,
        }
    }
}

// Manual impl: cloning shares the limiter, it never requires `C: Clone`.
impl<C: Clock> Clone for GuardState<C> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            rules: Arc::clone(&self.rules),
            trust_forwarded_headers: self.trust_forwarded_headers,
        }
    }
}
