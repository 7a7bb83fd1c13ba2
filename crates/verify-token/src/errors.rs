//! Error types for token verification.
//!
//! `AuthError` maps to HTTP status codes via the `IntoResponse` impl and is
//! what the middleware returns to clients. Messages for server-side faults are
//! generic; the actual cause is logged.
//!
//! `ProviderError` covers everything that can go wrong while talking to the
//! identity provider. The strategy never propagates it: its `Display` text
//! becomes the message of a failed authentication.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Authentication error type.
///
/// Maps to HTTP status codes:
/// - Configuration, Internal: 500 Internal Server Error
/// - InvalidToken: 401 Unauthorized
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Configuration(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Configuration(_) | AuthError::Internal => 500,
            AuthError::InvalidToken(_) => 401,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::Configuration(reason) => {
                tracing::error!(target: "vt.errors", reason = %reason, "Strategy misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AuthError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"google-verify-token\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Errors raised while talking to the identity provider.
///
/// The `Display` text is surfaced verbatim as the failure message, so variants
/// carrying a provider message print only that message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport-level failure (connect, TLS, reset).
    #[error("{0}")]
    Http(String),

    /// The provider answered with a body we could not interpret.
    #[error("{0}")]
    InvalidResponse(String),

    /// The provider explicitly rejected the credential.
    #[error("{0}")]
    Rejected(String),

    /// The ID token failed local signature or claim verification.
    #[error("{0}")]
    InvalidToken(String),

    /// The provider did not answer within the configured bound.
    #[error("identity provider request timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_configuration_is_bare_message() {
        let error = AuthError::Configuration(
            "GoogleVerifyTokenStrategy requires a verify function".to_string(),
        );
        assert_eq!(
            error.to_string(),
            "GoogleVerifyTokenStrategy requires a verify function"
        );
    }

    #[test]
    fn test_display_invalid_token() {
        let error = AuthError::InvalidToken("access token expired".to_string());
        assert_eq!(format!("{}", error), "Invalid token: access token expired");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::Configuration("x".to_string()).status_code(), 500);
        assert_eq!(AuthError::InvalidToken("x".to_string()).status_code(), 401);
        assert_eq!(AuthError::Internal.status_code(), 500);
    }

    #[test]
    fn test_provider_error_display_is_the_provider_message() {
        assert_eq!(
            ProviderError::Rejected("Invalid Value".to_string()).to_string(),
            "Invalid Value"
        );
        assert_eq!(
            ProviderError::InvalidToken("Token used too late".to_string()).to_string(),
            "Token used too late"
        );
        assert_eq!(
            ProviderError::Timeout.to_string(),
            "identity provider request timed out"
        );
    }

    #[tokio::test]
    async fn test_into_response_invalid_token() {
        let response = AuthError::InvalidToken("no Google authentication token provided".to_string())
            .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response
            .headers()
            .get("WWW-Authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(www_auth.contains("Bearer realm=\"google-verify-token\""));

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "INVALID_TOKEN");
        assert_eq!(
            body_json["error"]["message"],
            "no Google authentication token provided"
        );
    }

    #[tokio::test]
    async fn test_into_response_configuration_hides_details() {
        let response = AuthError::Configuration("no client id".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "CONFIGURATION_ERROR");
        assert_eq!(body_json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_into_response_internal_hides_details() {
        let response = AuthError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body_json["error"]["message"], "An internal error occurred");
    }
}
