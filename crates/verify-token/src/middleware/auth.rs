//! Authentication middleware for protected routes.
//!
//! Builds an [`AuthRequest`] from the incoming request (headers, query,
//! matched path params and a small JSON or form body), runs the strategy,
//! and injects the authenticated user into request extensions.
//!
//! Bodies over [`MAX_BODY_BYTES`] or bodies that fail to read contribute no
//! fields; they reach the handler byte for byte and the other sources still
//! apply.

use crate::errors::AuthError;
use crate::request::AuthRequest;
use crate::strategy::{AuthOutcome, TokenStrategy};
use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Query, RawPathParams, Request, State},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Largest body read for credential extraction (64KB).
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// State for the authentication middleware.
pub struct AuthState<U> {
    pub strategy: Arc<TokenStrategy<U>>,
}

impl<U> Clone for AuthState<U> {
    fn clone(&self) -> Self {
        Self {
            strategy: Arc::clone(&self.strategy),
        }
    }
}

/// The authenticated identity, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser<U> {
    pub user: U,
    pub info: Option<Value>,
}

/// Authentication middleware backed by a [`TokenStrategy`].
///
/// # Response
///
/// - 401 Unauthorized with WWW-Authenticate header when the credential is
///   missing or rejected, or the verifier declines the user
/// - 500 Internal Server Error when the verifier fails
/// - Otherwise continues to the next handler with [`AuthenticatedUser`] in
///   extensions
#[instrument(skip_all, name = "vt.middleware.auth")]
pub async fn require_token_auth<U>(
    State(state): State<Arc<AuthState<U>>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError>
where
    U: Clone + Send + Sync + 'static,
{
    let (auth_request, mut req) = extract_auth_request(req).await;

    match state.strategy.authenticate(&auth_request).await {
        AuthOutcome::Success { user, info } => {
            req.extensions_mut()
                .insert(AuthenticatedUser { user, info });
            Ok(next.run(req).await)
        }
        outcome @ AuthOutcome::Fail { .. } => {
            let message = outcome.failure_message().unwrap_or("Unauthorized");
            tracing::debug!(target: "vt.middleware.auth", reason = %message, "Request rejected");
            Err(AuthError::InvalidToken(message.to_string()))
        }
        AuthOutcome::Error(e) => {
            tracing::error!(target: "vt.middleware.auth", error = %e, "User verification failed");
            Err(AuthError::Internal)
        }
    }
}

/// Split out the credential sources and hand back an equivalent request.
///
/// The body is only buffered for JSON and form content types within
/// [`MAX_BODY_BYTES`]; it is restored unchanged for downstream handlers.
async fn extract_auth_request(req: Request) -> (AuthRequest, Request) {
    let (mut parts, body) = req.into_parts();

    let params = RawPathParams::from_request_parts(&mut parts, &())
        .await
        .ok()
        .map(|raw| {
            raw.iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect::<HashMap<_, _>>()
        })
        .filter(|params| !params.is_empty());

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .map(|Query(query)| query)
        .filter(|query| !query.is_empty());

    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let body_kind = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(BodyKind::from_content_type);

    let declared_oversize = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_some_and(|len| len > MAX_BODY_BYTES);

    let (body_fields, body) = match body_kind {
        Some(_) if declared_oversize => {
            tracing::debug!(target: "vt.middleware.auth", "Body over limit, not inspected");
            (None, body)
        }
        Some(kind) => match buffer_body(body).await {
            Buffered::Complete(bytes) => (kind.parse(&bytes), Body::from(bytes)),
            Buffered::Passthrough(body) => (None, body),
        },
        None => (None, body),
    };

    let auth_request = AuthRequest {
        body: body_fields,
        query,
        headers: Some(headers),
        params,
    };

    (auth_request, Request::from_parts(parts, body))
}

enum Buffered {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// The body could not be inspected; replays what was read, then the rest.
    Passthrough(Body),
}

async fn buffer_body(mut body: Body) -> Buffered {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    loop {
        let next = body.frame().await;
        match next {
            None => return Buffered::Complete(Bytes::from(chunks.concat())),
            Some(Ok(frame)) => {
                // Trailers are not credential sources
                if let Ok(data) = frame.into_data() {
                    total += data.len();
                    chunks.push(data);
                    if total > MAX_BODY_BYTES {
                        tracing::debug!(target: "vt.middleware.auth", "Body over limit, not inspected");
                        return Buffered::Passthrough(replay(chunks, Ok(body)));
                    }
                }
            }
            Some(Err(e)) => {
                tracing::debug!(target: "vt.middleware.auth", error = %e, "Failed to read request body");
                return Buffered::Passthrough(replay(chunks, Err(e)));
            }
        }
    }
}

/// A body yielding `chunks` followed by the rest of the original body (or its
/// read error).
fn replay(chunks: Vec<Bytes>, rest: Result<Body, axum::Error>) -> Body {
    let prefix = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
    match rest {
        Ok(rest) => Body::from_stream(prefix.chain(rest.into_data_stream())),
        Err(e) => Body::from_stream(prefix.chain(stream::once(async move { Err(e) }))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

impl BodyKind {
    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/json" => Some(BodyKind::Json),
            "application/x-www-form-urlencoded" => Some(BodyKind::Form),
            _ => None,
        }
    }

    /// String-valued top-level fields, or `None` if the body does not parse.
    fn parse(self, bytes: &[u8]) -> Option<HashMap<String, String>> {
        let fields: HashMap<String, String> = match self {
            BodyKind::Json => serde_json::from_slice::<serde_json::Map<String, Value>>(bytes)
                .ok()?
                .into_iter()
                .filter_map(|(name, value)| match value {
                    Value::String(value) => Some((name, value)),
                    _ => None,
                })
                .collect(),
            BodyKind::Form => serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
                .ok()?
                .into_iter()
                .collect(),
        };
        Some(fields).filter(|fields| !fields.is_empty())
    }
}

/// Extension trait for extracting the authenticated user from a request.
pub trait AuthenticatedUserExt {
    /// Get the authenticated user from request extensions.
    ///
    /// Returns `None` if the auth middleware was not applied to this request.
    fn authenticated_user<U>(&self) -> Option<&AuthenticatedUser<U>>
    where
        U: Clone + Send + Sync + 'static;
}

impl<B> AuthenticatedUserExt for axum::http::Request<B> {
    fn authenticated_user<U>(&self) -> Option<&AuthenticatedUser<U>>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.extensions().get::<AuthenticatedUser<U>>()
    }
}
