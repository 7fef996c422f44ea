//! Route rules configuration and matching.
//!
//! This module maps request paths to the limit that protects them. Rules are
//! matched by longest path prefix on segment boundaries, with an optional
//! default for everything else.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::presets::Preset;
use super::window::RateLimitConfig;
use crate::error::{CvGuardError, Result};

/// A table of route rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRules {
    /// Limit applied to paths no rule matches; `None` leaves them unprotected
    #[serde(default)]
    pub default: Option<Preset>,
    /// Per-route rules
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A single route rule.
///
/// A rule names either a preset or a custom limit, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix this rule covers
    pub path: String,
    /// Named preset to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    /// Custom limit to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<RateLimitConfig>,
}

impl RouteRule {
    /// Create a rule backed by a preset.
    pub fn preset(path: &str, preset: Preset) -> Self {
        Self {
            path: path.to_string(),
            preset: Some(preset),
            limit: None,
        }
    }

    /// Create a rule backed by a custom limit.
    pub fn custom(path: &str, limit: RateLimitConfig) -> Self {
        Self {
            path: path.to_string(),
            preset: None,
            limit: Some(limit),
        }
    }

    /// Resolve the limit this rule applies.
    pub fn resolve(&self) -> Result<RateLimitConfig> {
        match (&self.preset, &self.limit) {
            (Some(preset), None) => Ok(preset.config()),
            (None, Some(limit)) => {
                limit.validate()?;
                Ok(limit.clone())
            }
            _ => Err(CvGuardError::Config(format!(
                "Route '{}' must set exactly one of 'preset' or 'limit'",
                self.path
            ))),
        }
    }

    /// Whether this rule covers `path`.
    fn matches(&self, path: &str) -> bool {
        let prefix = self.path.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }

        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl Default for RouteRules {
    /// The application's built-in protection map.
    fn default() -> Self {
        Self {
            default: Some(Preset::ApiGeneral),
            routes: vec![
                RouteRule::preset("/api/auth/login", Preset::AuthStrict),
                RouteRule::preset("/api/auth/register", Preset::AuthStrict),
                RouteRule::preset("/api/auth/forgot-password", Preset::EmailSend),
                RouteRule::preset("/api/auth/resend-verification", Preset::EmailSend),
                RouteRule::preset("/api/user/password", Preset::PasswordChange),
                RouteRule::preset("/api/user/profile", Preset::ProfileUpdate),
                RouteRule::preset("/api/cv", Preset::CvOperations),
            ],
        }
    }
}

impl RouteRules {
    /// Create a table with no rules and no default.
    pub fn empty() -> Self {
        Self {
            default: None,
            routes: Vec::new(),
        }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RouteRules = serde_yaml::from_str(yaml)
            .map_err(|e| CvGuardError::Config(format!("Failed to parse route rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check every rule resolves to a usable limit.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.routes {
            if !rule.path.starts_with('/') {
                return Err(CvGuardError::Config(format!(
                    "Route path '{}' must start with '/'",
                    rule.path
                )));
            }
            rule.resolve()?;
        }
        Ok(())
    }

    /// Find the limit protecting `path`.
    ///
    /// The rule with the longest matching prefix wins; unmatched paths get the
    /// default, if any. A matching rule that does not resolve is an error, so a
    /// broken rule never leaves its routes unprotected.
    pub fn find_limit(&self, path: &str) -> Result<Option<RateLimitConfig>> {
        match self.find_route_limit(path)? {
            Some(limit) => Ok(Some(limit)),
            None => Ok(self.default.map(|preset| preset.config())),
        }
    }

    /// Find the limit of the most specific route rule covering `path`,
    /// ignoring the default.
    pub fn find_route_limit(&self, path: &str) -> Result<Option<RateLimitConfig>> {
        self.routes
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.path.trim_end_matches('/').len())
            .map(RouteRule::resolve)
            .transpose()
    }
}
