//! Identity payloads produced by verification.
//!
//! `VerifiedClaims` is what the host verify callback receives, whichever path
//! produced it: the signature-verified payload of an ID token, or the userinfo
//! profile fetched with an access token. `TokenInfo` is the token-info
//! metadata for an access token.
//!
//! `sub` and `email` identify a person and are redacted in Debug output.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Audience claim. Google sets a single string; other issuers may use a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Verified identity claims.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Subject (Google account id). Userinfo responses may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Authorized party (the client the token was issued to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Expiration (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued-at (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "bool_or_string"
    )]
    pub email_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Hosted domain, present for Google Workspace accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd: Option<String>,

    /// Any other field the provider returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("aud", &self.aud)
            .field("iss", &self.iss)
            .field("azp", &self.azp)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .field("hd", &self.hd)
            .field("extra_fields", &self.extra.len())
            .finish()
    }
}

impl VerifiedClaims {
    /// The subject identifier, if present and non-empty.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().filter(|sub| !sub.is_empty())
    }
}

/// Raw token-info response as Google sends it.
///
/// Numeric fields arrive as JSON strings (`"expires_in": "3599"`).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenInfoResponse {
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub access_type: Option<String>,
    #[serde(default, deserialize_with = "i64_or_string")]
    pub expires_in: Option<i64>,
    #[serde(default, deserialize_with = "i64_or_string")]
    pub exp: Option<i64>,
}

/// Token-info metadata for an access token.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub aud: Option<String>,
    pub azp: Option<String>,
    pub sub: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub access_type: Option<String>,
    pub scopes: Vec<String>,

    /// Expiry in milliseconds since the Unix epoch.
    pub expiry_date: i64,
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("aud", &self.aud)
            .field("azp", &self.azp)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .field("expiry_date", &self.expiry_date)
            .finish()
    }
}

impl TokenInfo {
    /// Token info with only an expiry set.
    pub fn expiring_at(expiry_date: i64) -> Self {
        Self {
            aud: None,
            azp: None,
            sub: None,
            email: None,
            email_verified: None,
            access_type: None,
            scopes: Vec::new(),
            expiry_date,
        }
    }

    /// Normalize a raw response.
    ///
    /// `expiry_date` is `now + expires_in` when `expires_in` is present,
    /// otherwise `exp` converted to milliseconds. Returns `None` when the
    /// response carries neither.
    pub(crate) fn from_response(raw: TokenInfoResponse, now_millis: i64) -> Option<Self> {
        let expiry_date = match (raw.expires_in, raw.exp) {
            (Some(expires_in), _) => now_millis.saturating_add(expires_in.saturating_mul(1000)),
            (None, Some(exp)) => exp.saturating_mul(1000),
            (None, None) => return None,
        };

        Some(Self {
            aud: raw.aud,
            azp: raw.azp,
            sub: raw.sub,
            email: raw.email,
            email_verified: raw.email_verified,
            access_type: raw.access_type,
            scopes: raw
                .scope
                .as_deref()
                .map(|scope| scope.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
            expiry_date,
        })
    }

    /// Whether the token was issued to one of `audience` (checks `aud`, then `azp`).
    pub fn issued_to_any(&self, audience: &[String]) -> bool {
        [&self.aud, &self.azp]
            .into_iter()
            .flatten()
            .any(|party| audience.iter().any(|client_id| client_id == party))
    }
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => Some(value),
        Some(Flag::Text(text)) => text.parse().ok(),
        None => None,
    })
}

fn i64_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Number>::deserialize(deserializer)? {
        Some(Number::Int(value)) => Some(value),
        Some(Number::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}
