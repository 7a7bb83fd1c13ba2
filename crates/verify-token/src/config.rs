//! Strategy configuration.
//!
//! Configuration is loaded from environment variables. Client IDs and
//! endpoint URLs are public values, so `Debug` is derived.

use crate::auth::id_token::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use crate::provider::{
    GoogleProvider, ProviderEndpoints, GOOGLE_CERTS_URL, GOOGLE_TOKEN_INFO_URL,
    GOOGLE_USERINFO_URL,
};
use crate::strategy::{StrategyOptions, DEFAULT_PROVIDER_TIMEOUT};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on the provider timeout in seconds.
pub const MAX_PROVIDER_TIMEOUT_SECONDS: u64 = 60;

/// Verification configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Accepted OAuth client IDs (`GOOGLE_CLIENT_ID`, comma-separated).
    pub client_ids: Vec<String>,

    /// Audience override (`GOOGLE_AUDIENCE`, comma-separated).
    pub audience: Option<Vec<String>>,

    /// Hand the request to the user verifier.
    pub pass_req_to_callback: bool,

    /// Require access tokens to be issued to one of the audience.
    pub enforce_access_token_audience: bool,

    pub certs_url: String,
    pub token_info_url: String,
    pub userinfo_url: String,

    /// Bound on each identity provider call, in seconds.
    pub provider_timeout_seconds: u64,

    /// Leeway for ID token time claims, in seconds.
    pub jwt_clock_skew_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid provider timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid flag: {0}")]
    InvalidFlag(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let client_ids = vars
            .get("GOOGLE_CLIENT_ID")
            .map(|value| split_list(value))
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID".to_string()))?;

        let audience = vars
            .get("GOOGLE_AUDIENCE")
            .map(|value| split_list(value))
            .filter(|aud| !aud.is_empty());

        let pass_req_to_callback = parse_flag(vars, "GOOGLE_PASS_REQ_TO_CALLBACK")?;
        let enforce_access_token_audience =
            parse_flag(vars, "GOOGLE_ENFORCE_ACCESS_TOKEN_AUDIENCE")?;

        let certs_url = vars
            .get("GOOGLE_CERTS_URL")
            .cloned()
            .unwrap_or_else(|| GOOGLE_CERTS_URL.to_string());

        let token_info_url = vars
            .get("GOOGLE_TOKENINFO_URL")
            .cloned()
            .unwrap_or_else(|| GOOGLE_TOKEN_INFO_URL.to_string());

        let userinfo_url = vars
            .get("GOOGLE_USERINFO_URL")
            .cloned()
            .unwrap_or_else(|| GOOGLE_USERINFO_URL.to_string());

        let provider_timeout_seconds = if let Some(value_str) = vars.get("PROVIDER_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "PROVIDER_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "PROVIDER_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_PROVIDER_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidTimeout(format!(
                    "PROVIDER_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                    MAX_PROVIDER_TIMEOUT_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_PROVIDER_TIMEOUT.as_secs()
        };

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value.unsigned_abs() > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value.unsigned_abs()
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        tracing::debug!(
            target: "vt.config",
            client_id_count = client_ids.len(),
            audience_override = audience.is_some(),
            provider_timeout_seconds,
            jwt_clock_skew_seconds,
            "Configuration loaded"
        );

        Ok(Config {
            client_ids,
            audience,
            pass_req_to_callback,
            enforce_access_token_audience,
            certs_url,
            token_info_url,
            userinfo_url,
            provider_timeout_seconds,
            jwt_clock_skew_seconds,
        })
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds)
    }

    /// Options for [`crate::TokenStrategy::builder`].
    pub fn strategy_options(&self) -> StrategyOptions {
        let mut options = StrategyOptions::with_client_ids(self.client_ids.iter().cloned())
            .with_pass_req_to_callback(self.pass_req_to_callback)
            .with_enforce_access_token_audience(self.enforce_access_token_audience)
            .with_provider_timeout(self.provider_timeout());
        if let Some(audience) = &self.audience {
            options = options.with_audience(audience.iter().cloned());
        }
        options
    }

    pub fn provider_endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            certs_url: self.certs_url.clone(),
            token_info_url: self.token_info_url.clone(),
            userinfo_url: self.userinfo_url.clone(),
        }
    }

    /// Google provider using the configured endpoints, timeout and clock skew.
    pub fn google_provider(&self) -> GoogleProvider {
        GoogleProvider::with_endpoints(
            self.provider_endpoints(),
            self.provider_timeout(),
            self.clock_skew(),
        )
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_flag(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(ConfigError::InvalidFlag(format!(
                "{} must be true or false, got '{}'",
                name, value
            ))),
        },
    }
}
