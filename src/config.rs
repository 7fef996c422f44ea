//! Configuration management for cvguard.
//!
//! Settings come from an optional YAML file, overridden by `CVGUARD__*`
//! environment variables (`CVGUARD__SERVER__HTTP_ADDR=0.0.0.0:8081`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{CvGuardError, Result};
use crate::ratelimit::{RouteRules, DEFAULT_CLEANUP_INTERVAL};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "CVGUARD";

/// Main configuration for the cvguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Decision API address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Admin API address; keep this on loopback
    #[serde(default = "default_admin_addr")]
    pub admin_addr: SocketAddr,

    /// Whether to key on X-Forwarded-For / X-Real-IP instead of the peer address
    #[serde(default = "default_trust_forwarded_headers")]
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            admin_addr: default_admin_addr(),
            trust_forwarded_headers: default_trust_forwarded_headers(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_trust_forwarded_headers() -> bool {
    true
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a route rules file; the built-in table is used when unset
    pub rules_path: Option<String>,

    /// Interval between expired-window sweeps, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL.as_secs()
}

impl RateLimitingConfig {
    /// The sweep interval as a duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Load the configured route rules, or the built-in table.
    pub fn load_rules(&self) -> Result<RouteRules> {
        match &self.rules_path {
            Some(path) => RouteRules::from_file(path),
            None => {
                info!("No rules file configured, using built-in route rules");
                Ok(RouteRules::default())
            }
        }
    }
}

impl GuardConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: GuardConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CvGuardError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.cleanup_interval_secs == 0 {
            return Err(CvGuardError::Config(
                "cleanup_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
