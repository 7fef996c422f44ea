//! Fixed rate window state and limit configuration.

use serde::{Deserialize, Serialize};

use crate::error::{CvGuardError, Result};

/// Configuration for a rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per window
    pub max_requests: u32,
    /// Window duration in milliseconds
    pub window_ms: u64,
    /// Optional denial text returned to throttled callers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitConfig {
    /// Create a validated rate limit configuration.
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self> {
        let config = Self {
            max_requests,
            window_ms,
            message: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach a denial message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Reject limits that would admit nothing or never roll over.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(CvGuardError::InvalidLimit(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(CvGuardError::InvalidLimit(
                "window_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The counting state for one key.
///
/// `reset_at` is fixed when the window is created and never moved; an
/// expired window is replaced, not extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests admitted in this window
    pub count: u32,
    /// Absolute expiry, milliseconds since the Unix epoch
    pub reset_at: u64,
}

impl RateWindow {
    /// Open a new, empty window starting at `now`.
    pub fn fresh(now: u64, window_ms: u64) -> Self {
        Self {
            count: 0,
            reset_at: now.saturating_add(window_ms),
        }
    }

    /// Whether the window no longer counts at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_at <= now
    }

    /// Admit one request if capacity remains.
    ///
    /// Returns `true` and increments the count when `count < max_requests`.
    pub fn try_consume(&mut self, max_requests: u32) -> bool {
        if self.count < max_requests {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Capacity left in this window.
    pub fn remaining(&self, max_requests: u32) -> u32 {
        max_requests.saturating_sub(self.count)
    }
}

/// Outcome of a check-and-consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: u64,
    pub limit: u32,
}

impl Verdict {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).div_ceil(1000)
    }
}

/// Read-only view of a key's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub remaining: u32,
    pub reset_at: u64,
    pub limit: u32,
}
