//! Named rate limit presets used across the application.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::window::RateLimitConfig;
use crate::error::CvGuardError;

/// A named limit shared by every route that protects the same kind of action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Login and registration, brute-force protection
    AuthStrict,
    /// Outbound email (verification, password reset)
    EmailSend,
    /// CV document create/update/delete/export
    CvOperations,
    /// Profile mutations
    ProfileUpdate,
    /// Catch-all for API routes
    ApiGeneral,
    /// Credential changes
    PasswordChange,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::AuthStrict,
        Preset::EmailSend,
        Preset::CvOperations,
        Preset::ProfileUpdate,
        Preset::ApiGeneral,
        Preset::PasswordChange,
    ];

    /// The snake_case name used in rule files.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::AuthStrict => "auth_strict",
            Preset::EmailSend => "email_send",
            Preset::CvOperations => "cv_operations",
            Preset::ProfileUpdate => "profile_update",
            Preset::ApiGeneral => "api_general",
            Preset::PasswordChange => "password_change",
        }
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> u32 {
        match self {
            Preset::AuthStrict => 5,
            Preset::EmailSend => 3,
            Preset::CvOperations => 10,
            Preset::ProfileUpdate => 5,
            Preset::ApiGeneral => 100,
            Preset::PasswordChange => 3,
        }
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        match self {
            Preset::AuthStrict => 15 * 60 * 1000,
            Preset::EmailSend => 60 * 60 * 1000,
            Preset::CvOperations => 60 * 1000,
            Preset::ProfileUpdate => 5 * 60 * 1000,
            Preset::ApiGeneral => 60 * 1000,
            Preset::PasswordChange => 60 * 60 * 1000,
        }
    }

    /// Denial text shown to throttled callers.
    pub fn message(&self) -> &'static str {
        match self {
            Preset::AuthStrict => {
                "Too many authentication attempts. Please try again in 15 minutes."
            }
            Preset::EmailSend => "Too many emails sent. Please try again in an hour.",
            Preset::CvOperations => "Too many CV operations. Please slow down.",
            Preset::ProfileUpdate => "Too many profile updates. Please try again in a few minutes.",
            Preset::ApiGeneral => "Too many requests. Please try again later.",
            Preset::PasswordChange => "Too many password change attempts. Please try again in an hour.",
        }
    }

    /// Build the limit configuration for this preset.
    pub fn config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests(),
            window_ms: self.window_ms(),
            message: Some(self.message().to_string()),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = CvGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CvGuardError::Config(format!("Unknown rate limit preset: {}", s)))
    }
}

impl From<Preset> for RateLimitConfig {
    fn from(preset: Preset) -> Self {
        preset.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_values() {
        let expected = [
            (Preset::AuthStrict, 5, 900_000),
            (Preset::EmailSend, 3, 3_600_000),
            (Preset::CvOperations, 10, 60_000),
            (Preset::ProfileUpdate, 5, 300_000),
            (Preset::ApiGeneral, 100, 60_000),
            (Preset::PasswordChange, 3, 3_600_000),
        ];

        for (preset, max_requests, window_ms) in expected {
            let config = preset.config();
            assert_eq!(config.max_requests, max_requests, "{}", preset);
            assert_eq!(config.window_ms, window_ms, "{}", preset);
            assert!(config.validate().is_ok());
            assert!(config.message.is_some());
        }
    }

    #[test]
    fn test_preset_name_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
        assert_eq!("AUTH_STRICT".parse::<Preset>().unwrap(), Preset::AuthStrict);
        assert!("nope".parse::<Preset>().is_err());
    }

    #[test]
    fn test_preset_deserializes_snake_case() {
        let preset: Preset = serde_yaml::from_str("cv_operations").unwrap();
        assert_eq!(preset, Preset::CvOperations);
    }
}
