//! Decision and admin API handlers.
//!
//! The decision API lets a web tier that cannot embed the middleware ask for a
//! verdict over HTTP. The admin API exposes reset, clear and sweep and must
//! only be bound to a trusted interface.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::response::RateLimitRejection;
use super::state::GuardState;
use crate::error::Result;
use crate::ratelimit::{Clock, Preset, RateLimitConfig};

/// A verdict request from a remote caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    /// Caller identifier, usually the client IP
    pub identifier: String,
    /// Protected resource, usually the request path
    pub resource: String,
    /// Preset to apply instead of the route table
    #[serde(default)]
    pub preset: Option<Preset>,
}

/// Query parameters naming a single window.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowQuery {
    pub identifier: String,
    pub resource: String,
    #[serde(default)]
    pub preset: Option<Preset>,
}

/// Build the decision API router.
pub fn decision_router<C: Clock + 'static>(state: GuardState<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ratelimit/check", post(check::<C>))
        .route("/api/ratelimit/peek", get(peek::<C>))
        .with_state(state)
}

/// Build the admin API router.
pub fn admin_router<C: Clock + 'static>(state: GuardState<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/ratelimit", delete(reset::<C>))
        .route("/admin/ratelimit/all", delete(clear_all::<C>))
        .route("/admin/ratelimit/sweep", post(sweep::<C>))
        .route("/admin/ratelimit/stats", get(stats::<C>))
        .with_state(state)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Pick the limit for a resource.
///
/// An explicit route rule always wins, so a caller cannot loosen a protected
/// route by naming a laxer preset. The preset applies to resources no route
/// covers, ahead of the table's default.
fn resolve_limit<C: Clock>(
    state: &GuardState<C>,
    resource: &str,
    preset: Option<Preset>,
) -> Result<Option<RateLimitConfig>> {
    if let Some(config) = state.rules.find_route_limit(resource)? {
        return Ok(Some(config));
    }
    match preset {
        Some(preset) => Ok(Some(preset.config())),
        None => state.rules.find_limit(resource),
    }
}

fn not_limited(resource: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("No rate limit covers '{}'", resource) })),
    )
        .into_response()
}

/// POST /api/ratelimit/check
///
/// Consumes one request. Responds 200 with the verdict when admitted and 429
/// with the rejection payload when throttled. A resource no limit covers is
/// admitted without counting, and the body is then only `{"allowed": true}`
/// since there is no window to report on.
async fn check<C: Clock + 'static>(
    State(state): State<GuardState<C>>,
    Json(request): Json<CheckRequest>,
) -> Response {
    let config = match resolve_limit(&state, &request.resource, request.preset) {
        Ok(Some(config)) => config,
        Ok(None) => {
            debug!(resource = %request.resource, "Resource is not rate limited");
            return Json(json!({ "allowed": true })).into_response();
        }
        Err(e) => {
            error!(error = %e, resource = %request.resource, "Route rule does not resolve");
            return e.into_response();
        }
    };

    let now = state.limiter.clock().now_ms();
    match state
        .limiter
        .check_and_consume_at(&request.identifier, &request.resource, &config, now)
    {
        Ok(verdict) if verdict.allowed => Json(verdict).into_response(),
        Ok(verdict) => RateLimitRejection::new(&verdict, &config, now).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/ratelimit/peek
async fn peek<C: Clock + 'static>(
    State(state): State<GuardState<C>>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let config = match resolve_limit(&state, &query.resource, query.preset) {
        Ok(Some(config)) => config,
        Ok(None) => return not_limited(&query.resource),
        Err(e) => return e.into_response(),
    };

    match state.limiter.peek(&query.identifier, &query.resource, &config) {
        Ok(quota) => Json(quota).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /admin/ratelimit?identifier=..&resource=..
async fn reset<C: Clock + 'static>(
    State(state): State<GuardState<C>>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let reset = state.limiter.reset(&query.identifier, &query.resource);
    info!(
        identifier = %query.identifier,
        resource = %query.resource,
        reset = reset,
        "Rate window reset via admin API"
    );
    Json(json!({ "reset": reset })).into_response()
}

/// DELETE /admin/ratelimit/all
async fn clear_all<C: Clock + 'static>(State(state): State<GuardState<C>>) -> Response {
    let cleared = state.limiter.window_count();
    state.limiter.clear_all();
    info!(cleared = cleared, "All rate windows cleared via admin API");
    Json(json!({ "cleared": cleared })).into_response()
}

/// POST /admin/ratelimit/sweep
async fn sweep<C: Clock + 'static>(State(state): State<GuardState<C>>) -> Response {
    let evicted = state.limiter.sweep_expired();
    Json(json!({ "evicted": evicted })).into_response()
}

/// GET /admin/ratelimit/stats
async fn stats<C: Clock + 'static>(State(state): State<GuardState<C>>) -> Response {
    Json(json!({
        "windows": state.limiter.window_count(),
        "sweeping": state.limiter.is_sweeping(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::ratelimit::{ManualClock, RateLimiter, RouteRule, RouteRules};

    const T: u64 = 1_700_000_000_000;

    fn state() -> (GuardState<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T));
        let limiter = Arc::new(RateLimiter::with_clock(Arc::clone(&clock)));
        (GuardState::new(limiter, RouteRules::default(), true), clock)
    }

    fn check_request(identifier: &str, resource: &str) -> Request<Body> {
        check_body(json!({ "identifier": identifier, "resource": resource }))
    }

    fn check_body(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ratelimit/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state();
        let response = decision_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_check_counts_down_then_rejects() {
        let (state, _) = state();
        let app = decision_router(state);

        for expected in (0..10).rev() {
            let response = app
                .clone()
                .oneshot(check_request("192.168.1.1", "/api/cv"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = json_body(response).await;
            assert_eq!(body["allowed"], true);
            assert_eq!(body["remaining"], expected);
            assert_eq!(body["limit"], 10);
            assert_eq!(body["resetAt"], T + 60_000);
        }

        let response = app
            .oneshot(check_request("192.168.1.1", "/api/cv"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        let body = json_body(response).await;
        assert_eq!(body["error"], Preset::CvOperations.message());
        assert_eq!(body["resetTime"], "2023-11-14T22:14:20.000Z");
    }

    #[tokio::test]
    async fn test_check_with_explicit_preset() {
        let (state, _) = state();
        let app = decision_router(state);

        let request = check_body(json!({
            "identifier": "user@example.com",
            "resource": "password-reset-email",
            "preset": "email_send",
        }));

        let body = json_body(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["limit"], 3);
        assert_eq!(body["remaining"], 2);
    }

    #[tokio::test]
    async fn test_route_rule_beats_preset_override() {
        let (state, _) = state();
        let app = decision_router(state);

        for _ in 0..5 {
            let request = check_body(json!({
                "identifier": "10.0.0.1",
                "resource": "/api/auth/login",
                "preset": "api_general",
            }));
            let body = json_body(app.clone().oneshot(request).await.unwrap()).await;
            assert_eq!(body["limit"], 5);
        }

        let request = check_body(json!({
            "identifier": "10.0.0.1",
            "resource": "/api/auth/login",
            "preset": "api_general",
        }));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_check_unprotected_resource_is_admitted_uncounted() {
        let clock = Arc::new(ManualClock::new(T));
        let limiter = Arc::new(RateLimiter::with_clock(Arc::clone(&clock)));
        let state = GuardState::new(Arc::clone(&limiter), RouteRules::empty(), true);

        let response = decision_router(state)
            .oneshot(check_request("10.0.0.1", "/public"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "allowed": true }));
        assert_eq!(limiter.window_count(), 0);
    }

    #[tokio::test]
    async fn test_check_broken_rule_is_a_server_error() {
        let clock = Arc::new(ManualClock::new(T));
        let limiter = Arc::new(RateLimiter::with_clock(clock));
        let rules = RouteRules {
            default: Some(Preset::ApiGeneral),
            routes: vec![RouteRule::custom(
                "/api/export",
                RateLimitConfig {
                    max_requests: 1,
                    window_ms: 0,
                    message: None,
                },
            )],
        };
        let app = decision_router(GuardState::new(Arc::clone(&limiter), rules, true));

        let response = app
            .clone()
            .oneshot(check_request("10.0.0.1", "/api/export/9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = app
            .oneshot(
                Request::get("/api/ratelimit/peek?identifier=10.0.0.1&resource=/api/export")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(limiter.window_count(), 0);
    }

    #[tokio::test]
    async fn test_check_rejects_empty_identifier() {
        let (state, _) = state();
        let response = decision_router(state)
            .oneshot(check_request("", "/api/cv"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_peek_reports_without_consuming() {
        let (state, _) = state();
        let limiter = Arc::clone(&state.limiter);
        let app = decision_router(state);

        app.clone()
            .oneshot(check_request("10.0.0.1", "/api/auth/login"))
            .await
            .unwrap();

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/api/ratelimit/peek?identifier=10.0.0.1&resource=/api/auth/login")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["remaining"], 4);
            assert_eq!(body["limit"], 5);
        }

        assert_eq!(limiter.current_count("10.0.0.1", "/api/auth/login"), Some(1));
    }

    #[tokio::test]
    async fn test_admin_reset_clear_and_stats() {
        let (state, clock) = state();
        let limiter = Arc::clone(&state.limiter);
        let app = admin_router(state.clone());

        let config = Preset::CvOperations.config();
        limiter.check_and_consume("A", "/api/cv", &config).unwrap();
        limiter.check_and_consume("B", "/api/cv", &config).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::delete("/admin/ratelimit?identifier=A&resource=/api/cv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["reset"], true);
        assert_eq!(limiter.current_count("A", "/api/cv"), None);

        let response = app
            .clone()
            .oneshot(Request::get("/admin/ratelimit/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["windows"], 1);
        assert_eq!(body["sweeping"], false);

        clock.advance(60_000);
        let response = app
            .clone()
            .oneshot(Request::post("/admin/ratelimit/sweep").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["evicted"], 1);

        limiter.check_and_consume("C", "/api/cv", &config).unwrap();
        let response = app
            .oneshot(Request::delete("/admin/ratelimit/all").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["cleared"], 1);
        assert_eq!(limiter.window_count(), 0);
    }
}
