//! Identity provider seam.
//!
//! The strategy talks to Google only through [`IdentityProvider`]. The
//! production implementation is [`GoogleProvider`]; [`mock::MockProvider`]
//! returns canned answers for tests.

pub mod google;
pub mod mock;

use crate::auth::{TokenInfo, VerifiedClaims};
use crate::errors::ProviderError;
use async_trait::async_trait;

pub use google::GoogleProvider;

/// Google's signing-certificate endpoint.
pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Google's token-info endpoint.
pub const GOOGLE_TOKEN_INFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Google's userinfo endpoint.
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Endpoint URLs used by [`GoogleProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub certs_url: String,
    pub token_info_url: String,
    pub userinfo_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            certs_url: GOOGLE_CERTS_URL.to_string(),
            token_info_url: GOOGLE_TOKEN_INFO_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

/// Arguments for ID token verification.
#[derive(Debug, Clone, Copy)]
pub struct IdTokenRequest<'a> {
    /// Client IDs the token may be issued to.
    pub audience: &'a [String],
    pub id_token: &'a str,
}

/// Result of a successful ID token verification.
///
/// A ticket without a payload is a valid ticket that carries no identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginTicket {
    payload: Option<VerifiedClaims>,
}

impl LoginTicket {
    pub fn new(payload: Option<VerifiedClaims>) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> Option<&VerifiedClaims> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<VerifiedClaims> {
        self.payload
    }
}

/// Operations the strategy needs from an identity provider.
///
/// `Ok(None)` means the provider answered but returned nothing usable;
/// the strategy treats it as a failed authentication, not an error.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an ID token for the given audience.
    async fn verify_id_token(
        &self,
        request: IdTokenRequest<'_>,
    ) -> Result<Option<LoginTicket>, ProviderError>;

    /// Look up token-info metadata for an access token.
    async fn get_token_info(&self, access_token: &str) -> Result<Option<TokenInfo>, ProviderError>;

    /// Fetch the profile of the access token's owner.
    async fn fetch_userinfo(&self, access_token: &str) -> Result<VerifiedClaims, ProviderError>;
}
