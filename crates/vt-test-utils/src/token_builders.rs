//! Builders for test ID-token claims and provider response bodies.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

/// Issuer Google puts in ID tokens.
pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// Client ID used by default in test tokens.
pub const TEST_CLIENT_ID: &str = "test-client-1.apps.googleusercontent.com";

/// Builder for ID-token claims.
///
/// # Example
/// ```rust,ignore
/// let claims = TestIdTokenBuilder::new()
///     .for_subject("110169484474386276334")
///     .with_audience("my-client.apps.googleusercontent.com")
///     .expires_in(3600)
///     .build();
/// let token = TestSigningKey::primary().sign(&claims);
/// ```
pub struct TestIdTokenBuilder {
    sub: Option<String>,
    aud: Value,
    iss: String,
    email: Option<String>,
    name: Option<String>,
    iat: i64,
    exp: i64,
}

impl TestIdTokenBuilder {
    /// Defaults: subject `"test-subject"`, audience `TEST_CLIENT_ID`,
    /// Google issuer, valid for one hour from now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: Some("test-subject".to_string()),
            aud: json!(TEST_CLIENT_ID),
            iss: GOOGLE_ISSUER.to_string(),
            email: Some("alice@example.com".to_string()),
            name: Some("Alice Example".to_string()),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
        }
    }

    pub fn for_subject(mut self, sub: &str) -> Self {
        self.sub = Some(sub.to_string());
        self
    }

    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    pub fn with_audience(mut self, aud: &str) -> Self {
        self.aud = json!(aud);
        self
    }

    pub fn with_issuer(mut self, iss: &str) -> Self {
        self.iss = iss.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for expired tokens).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at in seconds from now.
    pub fn issued_in(mut self, seconds: i64) -> Self {
        self.iat = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn build(self) -> Value {
        let mut claims = json!({
            "iss": self.iss,
            "aud": self.aud,
            "azp": self.aud,
            "iat": self.iat,
            "exp": self.exp,
            "email_verified": true,
        });
        if let Some(sub) = self.sub {
            claims["sub"] = json!(sub);
        }
        if let Some(email) = self.email {
            claims["email"] = json!(email);
        }
        if let Some(name) = self.name {
            claims["name"] = json!(name);
        }
        claims
    }
}

impl Default for TestIdTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Token-info body the way Google returns it (numbers as strings).
pub fn token_info_json(aud: &str, expires_in: i64) -> Value {
    json!({
        "azp": aud,
        "aud": aud,
        "sub": "110169484474386276334",
        "scope": "openid https://www.googleapis.com/auth/userinfo.email",
        "exp": (Utc::now() + Duration::seconds(expires_in)).timestamp().to_string(),
        "expires_in": expires_in.to_string(),
        "email": "alice@example.com",
        "email_verified": "true",
        "access_type": "online"
    })
}

/// Userinfo profile body.
pub fn userinfo_json(sub: &str) -> Value {
    json!({
        "sub": sub,
        "name": "Alice Example",
        "given_name": "Alice",
        "family_name": "Example",
        "picture": "https://lh3.googleusercontent.com/a/photo.jpg",
        "email": "alice@example.com",
        "email_verified": true,
        "locale": "en"
    })
}
