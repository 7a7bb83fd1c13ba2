//! Google ID token verification.
//!
//! Verifies the RS256 signature against Google's published certificates and
//! checks the claims Google's own client libraries check: audience, issuer,
//! expiry, issued-at, and maximum lifetime.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only RS256 is accepted; the algorithm is pinned, never read from the token
//! - Expiry and issued-at are validated with clock skew tolerance

use crate::auth::claims::VerifiedClaims;
use crate::auth::jwks::{Jwk, JwksClient};
use crate::errors::ProviderError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Maximum accepted ID token size in bytes (8KB).
///
/// Google ID tokens are ~1KB. Larger inputs are rejected before any base64
/// decoding or signature work.
pub const MAX_ID_TOKEN_SIZE_BYTES: usize = 8192;

/// Maximum allowed `exp - iat` (one day), as in Google's client libraries.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Default clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound on configurable clock skew (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Issuers Google uses for ID tokens.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// ID token verifier backed by the certificate cache.
pub struct IdTokenVerifier {
    jwks_client: Arc<JwksClient>,
    clock_skew: Duration,
}

impl IdTokenVerifier {
    pub fn new(jwks_client: Arc<JwksClient>, clock_skew: Duration) -> Self {
        Self {
            jwks_client,
            clock_skew,
        }
    }

    /// Verify an ID token for any of `audience` and return its payload.
    ///
    /// # Checks
    ///
    /// 1. Size and envelope (three segments, RS256, non-empty `kid`)
    /// 2. Signing key lookup by `kid`
    /// 3. Signature, `aud`, `iss`, `exp` (with leeway)
    /// 4. `iat` present, not in the future, lifetime at most one day
    ///
    /// # Errors
    ///
    /// `ProviderError::InvalidToken` with a descriptive message for every
    /// rejected token; `Http`/`InvalidResponse` if certificates are unavailable.
    #[instrument(skip_all, name = "vt.auth.id_token.verify")]
    pub async fn verify(
        &self,
        id_token: &str,
        audience: &[String],
    ) -> Result<VerifiedClaims, ProviderError> {
        let kid = extract_kid(id_token)?;
        let jwk = self.jwks_client.get_key(&kid).await?;
        let claims = verify_signature(id_token, &jwk, audience, self.clock_skew)?;
        validate_lifetime(&claims, chrono::Utc::now().timestamp(), self.clock_skew)?;

        tracing::debug!(target: "vt.auth.id_token", "ID token verified");
        Ok(claims)
    }
}

/// Read the `kid` from the token envelope without verifying anything.
///
/// Rejects oversized tokens, tokens without three segments, envelopes that
/// are not base64url JSON, algorithms other than RS256, and missing `kid`.
pub(crate) fn extract_kid(token: &str) -> Result<String, ProviderError> {
    if token.len() > MAX_ID_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "vt.auth.id_token",
            token_size = token.len(),
            max_size = MAX_ID_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(ProviderError::InvalidToken(
            "Token exceeds maximum size".to_string(),
        ));
    }

    let mut segments = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ProviderError::InvalidToken(
            "Wrong number of segments in token".to_string(),
        ));
    };

    let envelope: serde_json::Value = URL_SAFE_NO_PAD
        .decode(header_part)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| {
            tracing::debug!(target: "vt.auth.id_token", "Envelope is not base64url JSON");
            ProviderError::InvalidToken("Can't parse token envelope".to_string())
        })?;

    if envelope.get("alg").and_then(|v| v.as_str()) != Some("RS256") {
        return Err(ProviderError::InvalidToken(
            "Invalid token algorithm".to_string(),
        ));
    }

    envelope
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|kid| !kid.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| ProviderError::InvalidToken("No pem found for envelope".to_string()))
}

fn verify_signature(
    token: &str,
    jwk: &Jwk,
    audience: &[String],
    clock_skew: Duration,
) -> Result<VerifiedClaims, ProviderError> {
    if jwk.kty != "RSA" {
        tracing::warn!(target: "vt.auth.id_token", kty = %jwk.kty, "Unexpected JWK key type");
        return Err(ProviderError::InvalidToken(
            "No pem found for envelope".to_string(),
        ));
    }

    let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
        tracing::error!(target: "vt.auth.id_token", kid = %jwk.kid, "JWK missing modulus or exponent");
        return Err(ProviderError::InvalidToken(
            "No pem found for envelope".to_string(),
        ));
    };

    let decoding_key = DecodingKey::from_rsa_components(n, e).map_err(|e| {
        tracing::error!(target: "vt.auth.id_token", error = %e, "Invalid RSA key components");
        ProviderError::InvalidToken("No pem found for envelope".to_string())
    })?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    validation.leeway = clock_skew.as_secs();
    validation.set_audience(audience);
    validation.set_issuer(&GOOGLE_ISSUERS);
    validation.set_required_spec_claims(&["exp", "aud", "iss"]);

    let token_data = decode::<VerifiedClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "vt.auth.id_token", error = %e, "Token verification failed");
        ProviderError::InvalidToken(describe(e.kind()))
    })?;

    Ok(token_data.claims)
}

fn describe(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::InvalidSignature => "Invalid token signature".to_string(),
        ErrorKind::ExpiredSignature => "Token used too late".to_string(),
        ErrorKind::ImmatureSignature => "Token used too early".to_string(),
        ErrorKind::InvalidAudience => {
            "Wrong recipient, payload audience != requiredAudience".to_string()
        }
        ErrorKind::InvalidIssuer => format!(
            "Invalid issuer, expected one of [{}]",
            GOOGLE_ISSUERS.join(", ")
        ),
        ErrorKind::MissingRequiredClaim(claim) => format!("No {} field in token", claim),
        _ => "Invalid token".to_string(),
    }
}

/// Issued-at and lifetime checks the JWT library does not perform.
fn validate_lifetime(
    claims: &VerifiedClaims,
    now: i64,
    clock_skew: Duration,
) -> Result<(), ProviderError> {
    #[allow(clippy::cast_possible_wrap)] // bounded by MAX_CLOCK_SKEW
    let skew = clock_skew.as_secs() as i64;

    let iat = claims
        .iat
        .ok_or_else(|| ProviderError::InvalidToken("No issue time in token".to_string()))?;
    let exp = claims
        .exp
        .ok_or_else(|| ProviderError::InvalidToken("No expiration time in token".to_string()))?;

    if exp.saturating_sub(iat) > MAX_TOKEN_LIFETIME_SECS {
        return Err(ProviderError::InvalidToken(
            "Expiration time too far in future".to_string(),
        ));
    }

    if iat > now.saturating_add(skew) {
        tracing::debug!(
            target: "vt.auth.id_token",
            iat = iat,
            now = now,
            "Token rejected: iat too far in the future"
        );
        return Err(ProviderError::InvalidToken(
            "Token used too early".to_string(),
        ));
    }

    Ok(())
}
