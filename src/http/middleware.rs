//! Axum middleware gating requests through the limiter.

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{error, trace, warn};

use super::identifier;
use super::response::RateLimitRejection;
use super::state::GuardState;
use crate::ratelimit::Clock;

/// Wrap every route of `router` with [`enforce_rate_limit`].
pub fn protect<S, C>(router: Router<S>, state: GuardState<C>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    router.layer(middleware::from_fn_with_state(state, enforce_rate_limit::<C>))
}

/// Consume one request from the limit covering the request path.
///
/// Unprotected paths and admitted requests reach the inner service untouched.
/// Throttled requests get a 429 [`RateLimitRejection`]. A rule that cannot be
/// resolved fails the request with a 500 instead of letting it through.
pub async fn enforce_rate_limit<C: Clock + 'static>(
    State(state): State<GuardState<C>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let config = match state.rules.find_limit(&path) {
        Ok(Some(config)) => config,
        Ok(None) => return next.run(request).await,
        Err(e) => {
            error!(error = %e, path = %path, "Route rule does not resolve");
            return e.into_response();
        }
    };

    let identifier = identifier::from_request(&request, state.trust_forwarded_headers);
    let now = state.limiter.clock().now_ms();

    match state
        .limiter
        .check_and_consume_at(&identifier, &path, &config, now)
    {
        Ok(verdict) if verdict.allowed => {
            trace!(
                identifier = %identifier,
                path = %path,
                remaining = verdict.remaining,
                "Request admitted"
            );
            next.run(request).await
        }
        Ok(verdict) => {
            warn!(
                identifier = %identifier,
                path = %path,
                limit = verdict.limit,
                "Request throttled"
            );
            RateLimitRejection::new(&verdict, &config, now).into_response()
        }
        Err(e) => {
            error!(error = %e, path = %path, "Rate limit check failed");
            e.into_response()
        }
    }
}
