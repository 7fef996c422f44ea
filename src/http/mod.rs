//! HTTP binding for the rate limiter.
//!
//! Request handlers embed [`protect`] as axum middleware; services that
//! cannot embed it call the decision API served by [`HttpServer`].

mod identifier;
mod middleware;
mod response;
mod server;
mod service;
mod state;

pub use identifier::{client_identifier, UNKNOWN_CLIENT};
pub use middleware::{enforce_rate_limit, protect};
pub use response::{
    iso_timestamp, RateLimitRejection, DEFAULT_DENIAL_MESSAGE, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::HttpServer;
pub use service::{admin_router, decision_router, CheckRequest, WindowQuery};
pub use state::GuardState;
