//! Mapping limiter outcomes onto HTTP responses.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::CvGuardError;
use crate::ratelimit::{RateLimitConfig, Verdict};

/// Denial text used when the limit carries no message.
pub const DEFAULT_DENIAL_MESSAGE: &str = "Too many requests, please try again later.";

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// The 429 body sent to a throttled caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    /// Human-readable denial text
    pub error: String,
    /// Seconds until the window resets, rounded up
    pub retry_after: u64,
    /// Window reset as an ISO-8601 UTC timestamp
    pub reset_time: String,
    #[serde(skip)]
    pub limit: u32,
    #[serde(skip)]
    pub remaining: u32,
}

impl RateLimitRejection {
    /// Build the rejection for a denied verdict observed at `now`.
    pub fn new(verdict: &Verdict, config: &RateLimitConfig, now: u64) -> Self {
        Self {
            error: config
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_DENIAL_MESSAGE.to_string()),
            retry_after: verdict.retry_after_secs(now),
            reset_time: iso_timestamp(verdict.reset_at),
            limit: verdict.limit,
            remaining: verdict.remaining,
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        if let Ok(reset) = HeaderValue::from_str(&self.reset_time) {
            headers.insert(X_RATELIMIT_RESET, reset);
        }
        headers
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let headers = self.headers();
        (StatusCode::TOO_MANY_REQUESTS, headers, Json(self)).into_response()
    }
}

impl IntoResponse for CvGuardError {
    fn into_response(self) -> Response {
        let status = match self {
            CvGuardError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Render epoch milliseconds the way browsers' `toISOString` does.
pub fn iso_timestamp(epoch_ms: u64) -> String {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| epoch_ms.to_string())
}
