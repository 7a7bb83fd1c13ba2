//! Google identity provider over HTTPS.
//!
//! - ID tokens are verified locally against the cached certificate set.
//! - Access tokens are looked up at the token-info endpoint (form POST) and
//!   then exchanged for a profile at the userinfo endpoint.
//!
//! # Security
//!
//! - Access tokens travel in the request body or query string as Google
//!   requires, and are never logged
//! - Every request carries a client-level timeout

use crate::auth::claims::TokenInfoResponse;
use crate::auth::id_token::{IdTokenVerifier, DEFAULT_CLOCK_SKEW};
use crate::auth::{JwksClient, TokenInfo, VerifiedClaims};
use crate::errors::ProviderError;
use crate::observability::metrics;
use crate::provider::{IdTokenRequest, IdentityProvider, LoginTicket, ProviderEndpoints};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default timeout for provider HTTP calls in seconds.
const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 5;

/// OAuth2 error body returned with non-2xx token-info responses.
#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Google-backed [`IdentityProvider`].
pub struct GoogleProvider {
    http_client: reqwest::Client,
    id_tokens: IdTokenVerifier,
    endpoints: ProviderEndpoints,
}

impl GoogleProvider {
    /// Provider against Google's public endpoints with default timeouts.
    pub fn new() -> Self {
        Self::with_endpoints(
            ProviderEndpoints::default(),
            Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS),
            DEFAULT_CLOCK_SKEW,
        )
    }

    /// Provider against custom endpoints.
    ///
    /// # Arguments
    ///
    /// * `endpoints` - Certificate, token-info and userinfo URLs
    /// * `http_timeout` - Per-request timeout for all three endpoints
    /// * `clock_skew` - Leeway applied to ID token time claims
    pub fn with_endpoints(
        endpoints: ProviderEndpoints,
        http_timeout: Duration,
        clock_skew: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "vt.provider.google", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        let jwks_client = Arc::new(JwksClient::new(
            endpoints.certs_url.clone(),
            http_client.clone(),
        ));

        Self {
            http_client,
            id_tokens: IdTokenVerifier::new(jwks_client, clock_skew),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    async fn request_token_info(
        &self,
        access_token: &str,
    ) -> Result<Option<TokenInfo>, ProviderError> {
        let response = self
            .http_client
            .post(&self.endpoints.token_info_url)
            .form(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "vt.provider.google", error = %e, "Token info request failed");
                ProviderError::from(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(ProviderError::from)?;

        if !status.is_success() {
            let detail: OAuthErrorBody = serde_json::from_str(&body).unwrap_or_default();
            tracing::debug!(
                target: "vt.provider.google",
                status = %status,
                error = ?detail.error,
                "Token info rejected access token"
            );
            return Err(ProviderError::Rejected(
                detail
                    .error_description
                    .or(detail.error)
                    .unwrap_or_else(|| format!("Token info request failed: {}", status)),
            ));
        }

        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }

        let raw: TokenInfoResponse = serde_json::from_str(trimmed).map_err(|e| {
            tracing::warn!(target: "vt.provider.google", error = %e, "Failed to parse token info");
            ProviderError::InvalidResponse("Failed to parse token info response".to_string())
        })?;

        TokenInfo::from_response(raw, chrono::Utc::now().timestamp_millis())
            .map(Some)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("Token info response has no expiry".to_string())
            })
    }

    async fn request_userinfo(&self, access_token: &str) -> Result<VerifiedClaims, ProviderError> {
        let response = self
            .http_client
            .get(&self.endpoints.userinfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "vt.provider.google", error = %e, "Userinfo request failed");
                ProviderError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(target: "vt.provider.google", status = %status, "Userinfo endpoint returned error");
            return Err(ProviderError::Rejected(format!(
                "Userinfo request failed: {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            tracing::warn!(target: "vt.provider.google", error = %e, "Failed to parse userinfo");
            ProviderError::InvalidResponse("Failed to parse userinfo response".to_string())
        })
    }
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    #[instrument(skip_all, name = "vt.provider.google.verify_id_token")]
    async fn verify_id_token(
        &self,
        request: IdTokenRequest<'_>,
    ) -> Result<Option<LoginTicket>, ProviderError> {
        let start = Instant::now();
        let result = self
            .id_tokens
            .verify(request.id_token, request.audience)
            .await;
        metrics::record_provider_request("id_token", status_label(&result), start.elapsed());
        Ok(Some(LoginTicket::new(Some(result?))))
    }

    #[instrument(skip_all, name = "vt.provider.google.get_token_info")]
    async fn get_token_info(&self, access_token: &str) -> Result<Option<TokenInfo>, ProviderError> {
        let start = Instant::now();
        let result = self.request_token_info(access_token).await;
        metrics::record_provider_request("token_info", status_label(&result), start.elapsed());
        result
    }

    #[instrument(skip_all, name = "vt.provider.google.fetch_userinfo")]
    async fn fetch_userinfo(&self, access_token: &str) -> Result<VerifiedClaims, ProviderError> {
        let start = Instant::now();
        let result = self.request_userinfo(access_token).await;
        metrics::record_provider_request("userinfo", status_label(&result), start.elapsed());
        result
    }
}

fn status_label<T>(result: &Result<T, ProviderError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ProviderError::Timeout) => "timeout",
        Err(_) => "error",
    }
}
