//! Identity Store client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `IDENTITY_API_URL` - Base URL of the Identity Store API
//! - `IDENTITY_API_TOKEN` - Service access token for the Identity Store
//!
//! ## Optional
//! - `IDENTITY_TIMEOUT_SECS` - Per-request timeout budget (default: 30)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Identity Store client configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Base URL of the Identity Store API
    pub base_url: Url,
    /// Service access token presented on every request
    pub api_token: SecretString,
    /// Per-request timeout budget
    pub timeout: Duration,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IdentityConfig {
    /// Create a configuration from parts.
    ///
    /// Useful in tests and anywhere the environment is not the source of
    /// truth.
    #[must_use]
    pub fn new(base_url: Url, api_token: SecretString) -> Self {
        Self {
            base_url,
            api_token,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_required_env("IDENTITY_API_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("IDENTITY_API_URL".to_string(), e.to_string())
            })?;
        let api_token = get_required_secret("IDENTITY_API_TOKEN")?;
        let timeout_secs = match get_optional_env("IDENTITY_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("IDENTITY_TIMEOUT_SECS".to_string(), e.to_string())
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            api_token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
