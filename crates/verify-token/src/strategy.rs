//! The `google-verify-token` authentication strategy.
//!
//! [`TokenStrategy::authenticate`] extracts a credential from an
//! [`AuthRequest`], verifies it with the identity provider, hands the
//! verified claims to the host's [`UserVerifier`], and returns exactly one
//! [`AuthOutcome`].
//!
//! # Flow
//!
//! ```text
//! id_token param / bearer header -> verify_id_token --------------+
//! access_token param -> token info -> expiry check -> userinfo ---+-> done -> UserVerifier
//! nothing -> Fail(401)
//! ```
//!
//! Provider problems never surface as `AuthOutcome::Error`: they become
//! failures. Only an error returned by the host verifier is a system fault.

use crate::auth::id_token::DEFAULT_CLOCK_SKEW;
use crate::auth::VerifiedClaims;
use crate::errors::{AuthError, ProviderError};
use crate::observability::metrics;
use crate::provider::{
    GoogleProvider, IdTokenRequest, IdentityProvider, ProviderEndpoints,
};
use crate::request::{AuthRequest, Credential};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Name the strategy registers under.
pub const STRATEGY_NAME: &str = "google-verify-token";

/// Default bound on each identity provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

const MISSING_VERIFY_MESSAGE: &str = "GoogleVerifyTokenStrategy requires a verify function";
const MISSING_AUDIENCE_MESSAGE: &str = "GoogleVerifyTokenStrategy requires a client ID";
const NO_TOKEN_MESSAGE: &str = "no Google authentication token provided";
const NO_TICKET_MESSAGE: &str = "No login ticket returned";
const INVALID_ACCESS_TOKEN_MESSAGE: &str = "invalid access token";
const EXPIRED_ACCESS_TOKEN_MESSAGE: &str = "access token expired";
const AUDIENCE_MISMATCH_MESSAGE: &str = "access token audience mismatch";
const USERINFO_FAILED_MESSAGE: &str = "failed to get userinfo";

/// Strategy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOptions {
    /// Accepted OAuth client IDs.
    pub client_ids: Vec<String>,

    /// Explicit audience; replaces `client_ids` for token checks when set.
    pub audience: Option<Vec<String>>,

    /// Hand the request to the verifier.
    pub pass_req_to_callback: bool,

    /// Require access tokens to be issued to one of the audience.
    pub enforce_access_token_audience: bool,

    /// Bound on each identity provider call.
    pub provider_timeout: Duration,
}

impl StrategyOptions {
    /// Options for a single client ID.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_client_ids([client_id])
    }

    /// Options for several client IDs (multi-client backends).
    pub fn with_client_ids<I, S>(client_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_ids: client_ids.into_iter().map(Into::into).collect(),
            audience: None,
            pass_req_to_callback: false,
            enforce_access_token_audience: false,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_pass_req_to_callback(mut self, enabled: bool) -> Self {
        self.pass_req_to_callback = enabled;
        self
    }

    #[must_use]
    pub fn with_enforce_access_token_audience(mut self, enabled: bool) -> Self {
        self.enforce_access_token_audience = enabled;
        self
    }

    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// The audience tokens are checked against.
    ///
    /// The explicit override when given, otherwise the client IDs. Empty
    /// entries are dropped.
    pub fn effective_audience(&self) -> Vec<String> {
        self.audience
            .as_ref()
            .unwrap_or(&self.client_ids)
            .iter()
            .filter(|id| !id.is_empty())
            .cloned()
            .collect()
    }
}

/// Result of one authentication attempt.
#[derive(Debug)]
pub enum AuthOutcome<U> {
    /// The verifier accepted the identity.
    Success { user: U, info: Option<Value> },

    /// The credential was missing or rejected, or the verifier declined it.
    Fail {
        info: Option<Value>,
        status: Option<u16>,
    },

    /// The verifier failed.
    Error(anyhow::Error),
}

impl<U> AuthOutcome<U> {
    fn fail_with_message(message: &str, status: Option<u16>) -> Self {
        AuthOutcome::Fail {
            info: Some(message_info(message)),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    /// Label used in metrics: `success`, `fail` or `error`.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthOutcome::Success { .. } => "success",
            AuthOutcome::Fail { .. } => "fail",
            AuthOutcome::Error(_) => "error",
        }
    }

    /// The `message` field of a failure's info, if any.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            AuthOutcome::Fail {
                info: Some(info), ..
            } => info.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Status attached to a failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthOutcome::Fail { status, .. } => *status,
            _ => None,
        }
    }
}

/// Identifier handed to the verifier alongside the claims.
///
/// The subject when the claims carry a non-empty `sub`, otherwise the claims
/// themselves (userinfo responses may lack `sub`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subject<'a> {
    Id(&'a str),
    Claims(&'a VerifiedClaims),
}

impl<'a> Subject<'a> {
    fn of(claims: &'a VerifiedClaims) -> Self {
        match claims.subject() {
            Some(sub) => Subject::Id(sub),
            None => Subject::Claims(claims),
        }
    }
}

/// What the verifier decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Verified<U> {
    /// `None` declines the identity (the attempt fails).
    pub user: Option<U>,
    pub info: Option<Value>,
}

impl<U> Verified<U> {
    /// Accept with `user`.
    pub fn user(user: U) -> Self {
        Self {
            user: Some(user),
            info: None,
        }
    }

    /// Decline the identity.
    pub fn rejected() -> Self {
        Self {
            user: None,
            info: None,
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }
}

/// Host callback that maps verified claims to an application user.
///
/// `request` is `Some` only when `pass_req_to_callback` is enabled. An `Err`
/// is reported as [`AuthOutcome::Error`].
#[async_trait]
pub trait UserVerifier: Send + Sync {
    type User: Send;

    async fn verify(
        &self,
        claims: &VerifiedClaims,
        subject: Subject<'_>,
        request: Option<&AuthRequest>,
    ) -> Result<Verified<Self::User>, anyhow::Error>;
}

/// Verifier backed by an async closure. See [`verify_fn`].
pub struct FnVerifier<F, U> {
    f: F,
    _user: PhantomData<fn() -> U>,
}

/// Use an async closure as a [`UserVerifier`].
///
/// The closure receives owned copies of the claims and (when enabled) the
/// request; the subject is available as `claims.subject()`.
///
/// ```rust,ignore
/// let verifier = verify_fn(|claims: VerifiedClaims, _req| async move {
///     Ok(Verified::user(claims.email.unwrap_or_default()))
/// });
/// ```
pub fn verify_fn<F, Fut, U>(f: F) -> FnVerifier<F, U>
where
    F: Fn(VerifiedClaims, Option<AuthRequest>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Verified<U>, anyhow::Error>> + Send,
    U: Send,
{
    FnVerifier {
        f,
        _user: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, U> UserVerifier for FnVerifier<F, U>
where
    F: Fn(VerifiedClaims, Option<AuthRequest>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Verified<U>, anyhow::Error>> + Send,
    U: Send + 'static,
{
    type User = U;

    async fn verify(
        &self,
        claims: &VerifiedClaims,
        _subject: Subject<'_>,
        request: Option<&AuthRequest>,
    ) -> Result<Verified<U>, anyhow::Error> {
        (self.f)(claims.clone(), request.cloned()).await
    }
}

/// Builder for [`TokenStrategy`].
pub struct TokenStrategyBuilder<U> {
    options: StrategyOptions,
    provider: Option<Arc<dyn IdentityProvider>>,
    verifier: Option<Arc<dyn UserVerifier<User = U>>>,
}

impl<U: Send + 'static> TokenStrategyBuilder<U> {
    /// Use `provider` instead of Google's public endpoints.
    #[must_use]
    pub fn provider(self, provider: impl IdentityProvider + 'static) -> Self {
        self.shared_provider(Arc::new(provider))
    }

    #[must_use]
    pub fn shared_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the host verify callback (required).
    #[must_use]
    pub fn verify(mut self, verifier: impl UserVerifier<User = U> + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Build the strategy.
    ///
    /// # Errors
    ///
    /// `AuthError::Configuration` when no verifier was set, the audience is
    /// empty, or the provider timeout is zero.
    pub fn build(self) -> Result<TokenStrategy<U>, AuthError> {
        let verifier = self
            .verifier
            .ok_or_else(|| AuthError::Configuration(MISSING_VERIFY_MESSAGE.to_string()))?;

        let audience = self.options.effective_audience();
        if audience.is_empty() {
            return Err(AuthError::Configuration(
                MISSING_AUDIENCE_MESSAGE.to_string(),
            ));
        }

        if self.options.provider_timeout.is_zero() {
            return Err(AuthError::Configuration(
                "provider timeout must be greater than zero".to_string(),
            ));
        }

        let provider: Arc<dyn IdentityProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(GoogleProvider::with_endpoints(
                ProviderEndpoints::default(),
                self.options.provider_timeout,
                DEFAULT_CLOCK_SKEW,
            )),
        };

        tracing::debug!(
            target: "vt.strategy",
            audience_count = audience.len(),
            pass_req_to_callback = self.options.pass_req_to_callback,
            "Strategy configured"
        );

        Ok(TokenStrategy {
            audience,
            options: self.options,
            provider,
            verifier,
        })
    }
}

/// Outcome of a verification path, before the host verifier runs.
enum Verification {
    Claims(VerifiedClaims),
    Rejected(Option<Value>),
}

/// Authenticates requests carrying a Google ID token or access token.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct TokenStrategy<U> {
    audience: Vec<String>,
    options: StrategyOptions,
    provider: Arc<dyn IdentityProvider>,
    verifier: Arc<dyn UserVerifier<User = U>>,
}

impl<U: Send + 'static> TokenStrategy<U> {
    pub fn builder(options: StrategyOptions) -> TokenStrategyBuilder<U> {
        TokenStrategyBuilder {
            options,
            provider: None,
            verifier: None,
        }
    }

    /// Strategy against Google's public endpoints.
    ///
    /// # Errors
    ///
    /// See [`TokenStrategyBuilder::build`].
    pub fn new(
        options: StrategyOptions,
        verifier: impl UserVerifier<User = U> + 'static,
    ) -> Result<Self, AuthError> {
        Self::builder(options).verify(verifier).build()
    }

    pub fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    pub fn options(&self) -> &StrategyOptions {
        &self.options
    }

    /// Authenticate one request.
    ///
    /// An ID token (named parameter or bearer header) takes priority over an
    /// access token. Without either the attempt fails with status 401 and no
    /// provider call is made.
    #[instrument(skip_all, name = "vt.strategy.authenticate")]
    pub async fn authenticate(&self, req: &AuthRequest) -> AuthOutcome<U> {
        let start = Instant::now();

        let (path, outcome) = match req.credential() {
            Some(credential) => {
                let path = credential.kind();
                let verification = match &credential {
                    Credential::IdToken(token) => self.verify_id_token(token).await,
                    Credential::AccessToken(token) => self.verify_access_token(token).await,
                };
                (path, self.done(verification, req).await)
            }
            None => {
                tracing::debug!(target: "vt.strategy", "No credential on request");
                ("none", AuthOutcome::fail_with_message(NO_TOKEN_MESSAGE, Some(401)))
            }
        };

        match &outcome {
            AuthOutcome::Success { .. } => {
                tracing::debug!(target: "vt.strategy", path, "Authentication succeeded");
            }
            AuthOutcome::Fail { status, .. } => {
                tracing::debug!(
                    target: "vt.strategy",
                    path,
                    status = ?status,
                    reason = outcome.failure_message().unwrap_or("declined"),
                    "Authentication failed"
                );
            }
            AuthOutcome::Error(e) => {
                tracing::warn!(target: "vt.strategy", path, error = %e, "User verifier failed");
            }
        }

        metrics::record_auth_attempt(path, outcome.kind(), start.elapsed());
        outcome
    }

    async fn verify_id_token(
        &self,
        id_token: &SecretString,
    ) -> Result<Verification, ProviderError> {
        let request = IdTokenRequest {
            audience: &self.audience,
            id_token: id_token.expose_secret(),
        };

        match self.bounded(self.provider.verify_id_token(request)).await {
            Ok(Some(ticket)) => Ok(match ticket.into_payload() {
                Some(claims) => Verification::Claims(claims),
                None => Verification::Rejected(None),
            }),
            Ok(None) => Ok(rejected(NO_TICKET_MESSAGE)),
            Err(e) => downgrade(e),
        }
    }

    async fn verify_access_token(
        &self,
        access_token: &SecretString,
    ) -> Result<Verification, ProviderError> {
        let token = access_token.expose_secret();

        let info = match self.bounded(self.provider.get_token_info(token)).await {
            Ok(Some(info)) => info,
            Ok(None) => return Ok(rejected(INVALID_ACCESS_TOKEN_MESSAGE)),
            Err(e) => return downgrade(e),
        };

        if info.expiry_date < chrono::Utc::now().timestamp_millis() {
            return Ok(rejected(EXPIRED_ACCESS_TOKEN_MESSAGE));
        }

        if self.options.enforce_access_token_audience && !info.issued_to_any(&self.audience) {
            return Ok(rejected(AUDIENCE_MISMATCH_MESSAGE));
        }

        match self.bounded(self.provider.fetch_userinfo(token)).await {
            Ok(profile) => Ok(Verification::Claims(profile)),
            Err(e) => {
                tracing::debug!(target: "vt.strategy", error = %e, "Userinfo fetch failed");
                Ok(rejected(USERINFO_FAILED_MESSAGE))
            }
        }
    }

    /// Single funnel every verification path reports through.
    async fn done(
        &self,
        verification: Result<Verification, ProviderError>,
        req: &AuthRequest,
    ) -> AuthOutcome<U> {
        let claims = match verification {
            Err(e) => return AuthOutcome::fail_with_message(&e.to_string(), Some(401)),
            Ok(Verification::Rejected(info)) => return AuthOutcome::Fail { info, status: None },
            Ok(Verification::Claims(claims)) => claims,
        };

        let request = self.options.pass_req_to_callback.then_some(req);

        match self
            .verifier
            .verify(&claims, Subject::of(&claims), request)
            .await
        {
            Ok(Verified {
                user: Some(user),
                info,
            }) => AuthOutcome::Success { user, info },
            Ok(Verified { user: None, info }) => AuthOutcome::Fail { info, status: None },
            Err(e) => AuthOutcome::Error(e),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.options.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    target: "vt.strategy",
                    timeout_ms = self.options.provider_timeout.as_millis() as u64,
                    "Identity provider call timed out"
                );
                Err(ProviderError::Timeout)
            }
        }
    }
}

fn message_info(message: &str) -> Value {
    json!({ "message": message })
}

fn rejected(message: &str) -> Verification {
    Verification::Rejected(Some(message_info(message)))
}

/// Split provider errors between the two failure shapes.
///
/// Rejections of the credential itself carry a 401; transport faults fail
/// without a status.
fn downgrade(err: ProviderError) -> Result<Verification, ProviderError> {
    match err {
        ProviderError::InvalidToken(_) | ProviderError::Rejected(_) => Err(err),
        ProviderError::Http(_) | ProviderError::InvalidResponse(_) | ProviderError::Timeout => {
            Ok(rejected(&err.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::TokenInfo;
    use crate::provider::mock::MockProvider;
    use crate::provider::LoginTicket;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct TestUser {
        id: String,
    }

    /// Verifier that accepts every identity and records what it was given.
    #[derive(Default)]
    struct RecordingVerifier {
        subjects: Mutex<Vec<String>>,
        requests_seen: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl UserVerifier for RecordingVerifier {
        type User = TestUser;

        async fn verify(
            &self,
            claims: &VerifiedClaims,
            subject: Subject<'_>,
            request: Option<&AuthRequest>,
        ) -> Result<Verified<TestUser>, anyhow::Error> {
            let label = match subject {
                Subject::Id(id) => format!("id:{}", id),
                Subject::Claims(c) => format!("claims:{}", c.email.as_deref().unwrap_or("")),
            };
            self.subjects.lock().unwrap().push(label);
            self.requests_seen.lock().unwrap().push(request.is_some());

            Ok(Verified::user(TestUser {
                id: claims.subject().unwrap_or("anonymous").to_string(),
            })
            .with_info(json!({"scope": "read"})))
        }
    }

    fn strategy_with(
        options: StrategyOptions,
        provider: Arc<MockProvider>,
        verifier: Arc<RecordingVerifier>,
    ) -> TokenStrategy<TestUser> {
        TokenStrategy::builder(options)
            .shared_provider(provider)
            .verify(SharedVerifier(verifier))
            .build()
            .unwrap()
    }

    /// Lets a test keep a handle on the verifier it passes to the builder.
    struct SharedVerifier(Arc<RecordingVerifier>);

    #[async_trait]
    impl UserVerifier for SharedVerifier {
        type User = TestUser;

        async fn verify(
            &self,
            claims: &VerifiedClaims,
            subject: Subject<'_>,
            request: Option<&AuthRequest>,
        ) -> Result<Verified<TestUser>, anyhow::Error> {
            self.0.verify(claims, subject, request).await
        }
    }

    fn options() -> StrategyOptions {
        StrategyOptions::new("client-a.apps.googleusercontent.com")
    }

    fn expect_success(outcome: AuthOutcome<TestUser>) -> (TestUser, Option<Value>) {
        match outcome {
            AuthOutcome::Success { user, info } => (user, info),
            other => panic!("expected success, got {:?}", other),
        }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // --- construction ---

    #[test]
    fn test_build_without_verifier_fails() {
        let result = TokenStrategy::<TestUser>::builder(options())
            .provider(MockProvider::accepting())
            .build();

        match result {
            Err(AuthError::Configuration(msg)) => {
                assert_eq!(msg, "GoogleVerifyTokenStrategy requires a verify function");
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("build succeeded without a verifier"),
        }
    }

    #[test]
    fn test_build_without_client_id_fails() {
        let result = TokenStrategy::builder(StrategyOptions::with_client_ids(Vec::<String>::new()))
            .provider(MockProvider::accepting())
            .verify(RecordingVerifier::default())
            .build();
        assert!(matches!(result, Err(AuthError::Configuration(_))));

        let result = TokenStrategy::builder(StrategyOptions::new(""))
            .provider(MockProvider::accepting())
            .verify(RecordingVerifier::default())
            .build();
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_build_with_zero_timeout_fails() {
        let result = TokenStrategy::builder(options().with_provider_timeout(Duration::ZERO))
            .provider(MockProvider::accepting())
            .verify(RecordingVerifier::default())
            .build();
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_name_and_default_audience() {
        let strategy = TokenStrategy::builder(options())
            .provider(MockProvider::accepting())
            .verify(RecordingVerifier::default())
            .build()
            .unwrap();

        assert_eq!(strategy.name(), "google-verify-token");
        assert_eq!(
            strategy.audience(),
            &["client-a.apps.googleusercontent.com".to_string()]
        );
    }

    #[test]
    fn test_new_uses_google_provider() {
        let strategy = TokenStrategy::new(options(), RecordingVerifier::default()).unwrap();
        assert_eq!(strategy.name(), STRATEGY_NAME);
        assert!(!strategy.options().pass_req_to_callback);
    }

    #[tokio::test]
    async fn test_audience_override_is_sent_to_provider() {
        let provider = Arc::new(MockProvider::accepting());
        let strategy = strategy_with(
            options().with_audience(["override-aud"]),
            provider.clone(),
            Arc::default(),
        );

        let req = AuthRequest::new().with_body_field("id_token", "token");
        assert!(strategy.authenticate(&req).await.is_success());
        assert_eq!(provider.last_audience(), Some(vec!["override-aud".to_string()]));
    }

    #[tokio::test]
    async fn test_multiple_client_ids_are_all_sent() {
        let provider = Arc::new(MockProvider::accepting());
        let strategy = strategy_with(
            StrategyOptions::with_client_ids(["client-a", "client-b"]),
            provider.clone(),
            Arc::default(),
        );

        let req = AuthRequest::new().with_header("authorization", "Bearer token");
        assert!(strategy.authenticate(&req).await.is_success());
        assert_eq!(
            provider.last_audience(),
            Some(vec!["client-a".to_string(), "client-b".to_string()])
        );
    }

    // --- credential resolution ---

    #[tokio::test]
    async fn test_no_credential_fails_with_401_and_no_provider_call() {
        let provider = Arc::new(MockProvider::accepting());
        let strategy = strategy_with(options(), provider.clone(), Arc::default());

        let outcome = strategy.authenticate(&AuthRequest::new()).await;

        assert_eq!(outcome.kind(), "fail");
        assert_eq!(outcome.status(), Some(401));
        assert_eq!(
            outcome.failure_message(),
            Some("no Google authentication token provided")
        );
        assert_eq!(provider.id_token_calls(), 0);
        assert_eq!(provider.token_info_calls(), 0);
    }

    #[tokio::test]
    async fn test_id_token_in_every_location_succeeds() {
        let requests = [
            AuthRequest::new().with_body_field("id_token", "token"),
            AuthRequest::new().with_query_param("id_token", "token"),
            AuthRequest::new().with_header("authorization", "Bearer token"),
            AuthRequest::new().with_path_param("id_token", "token"),
        ];

        for req in requests {
            let provider = Arc::new(MockProvider::accepting());
            let strategy = strategy_with(options(), provider.clone(), Arc::default());

            let (user, info) = expect_success(strategy.authenticate(&req).await);
            assert_eq!(user, TestUser { id: "1234".to_string() });
            assert_eq!(info, Some(json!({"scope": "read"})));
            assert_eq!(provider.id_token_calls(), 1);
            assert_eq!(provider.token_info_calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_access_token_in_body_or_query_succeeds() {
        let requests = [
            AuthRequest::new().with_body_field("access_token", "ya29.token"),
            AuthRequest::new().with_query_param("access_token", "ya29.token"),
        ];

        for req in requests {
            let provider = Arc::new(MockProvider::accepting());
            let strategy = strategy_with(options(), provider.clone(), Arc::default());

            let (user, _) = expect_success(strategy.authenticate(&req).await);
            assert_eq!(user.id, "1234");
            assert_eq!(provider.token_info_calls(), 1);
            assert_eq!(provider.userinfo_calls(), 1);
            assert_eq!(provider.id_token_calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_id_token_wins_over_access_token() {
        let provider = Arc::new(MockProvider::accepting());
        let strategy = strategy_with(options(), provider.clone(), Arc::default());

        let req = AuthRequest::new()
            .with_body_field("access_token", "ya29.token")
            .with_query_param("id_token", "token");
        assert!(strategy.authenticate(&req).await.is_success());

        assert_eq!(provider.id_token_calls(), 1);
        assert_eq!(provider.token_info_calls(), 0);
        assert_eq!(provider.userinfo_calls(), 0);
    }

    // --- id token path ---

    #[tokio::test]
    async fn test_id_token_rejection_fails_with_message_and_401() {
        let provider = Arc::new(MockProvider::accepting().with_id_token_response(Err(
            ProviderError::InvalidToken("Token used too late".to_string()),
        )));
        let strategy = strategy_with(options(), provider, Arc::default());

        let req = AuthRequest::new().with_body_field("id_token", "token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("Token used too late"));
        assert_eq!(outcome.status(), Some(401));
    }

    #[tokio::test]
    async fn test_id_token_transport_error_fails_without_status() {
        let provider = Arc::new(MockProvider::accepting().with_id_token_response(Err(
            ProviderError::Http("connection refused".to_string()),
        )));
        let strategy = strategy_with(options(), provider, Arc::default());

        let req = AuthRequest::new().with_body_field("id_token", "token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.kind(), "fail");
        assert_eq!(outcome.failure_message(), Some("connection refused"));
        assert_eq!(outcome.status(), None);
    }

    #[tokio::test]
    async fn test_missing_login_ticket_fails() {
        let provider = Arc::new(MockProvider::accepting().with_id_token_response(Ok(None)));
        let strategy = strategy_with(options(), provider, Arc::default());

        let req = AuthRequest::new().with_body_field("id_token", "token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("No login ticket returned"));
        assert_eq!(outcome.status(), None);
    }

    #[tokio::test]
    async fn test_ticket_without_payload_fails_without_info() {
        let provider = Arc::new(
            MockProvider::accepting().with_id_token_response(Ok(Some(LoginTicket::new(None)))),
        );
        let verifier = Arc::new(RecordingVerifier::default());
        let strategy = strategy_with(options(), provider, verifier.clone());

        let req = AuthRequest::new().with_body_field("id_token", "token");
        let outcome = strategy.authenticate(&req).await;

        assert!(matches!(
            outcome,
            AuthOutcome::Fail {
                info: None,
                status: None
            }
        ));
        assert!(verifier.subjects.lock().unwrap().is_empty());
    }

    // --- access token path ---

    #[tokio::test]
    async fn test_missing_token_info_is_invalid_access_token() {
        let provider = Arc::new(MockProvider::accepting().with_token_info_response(Ok(None)));
        let strategy = strategy_with(options(), provider.clone(), Arc::default());

        let req = AuthRequest::new().with_query_param("access_token", "ya29.token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("invalid access token"));
        assert_eq!(provider.userinfo_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_access_token_skips_userinfo() {
        let provider = Arc::new(MockProvider::accepting().with_token_info_response(Ok(Some(
            TokenInfo::expiring_at(now_millis() - 1_000),
        ))));
        let strategy = strategy_with(options(), provider.clone(), Arc::default());

        let req = AuthRequest::new().with_query_param("access_token", "ya29.token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("access token expired"));
        assert_eq!(provider.token_info_calls(), 1);
        assert_eq!(provider.userinfo_calls(), 0);
    }

    #[tokio::test]
    async fn test_token_info_rejection_fails_with_provider_message() {
        let provider = Arc::new(MockProvider::accepting().with_token_info_response(Err(
            ProviderError::Rejected("Invalid Value".to_string()),
        )));
        let strategy = strategy_with(options(), provider.clone(), Arc::default());

        let req = AuthRequest::new().with_body_field("access_token", "ya29.token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("Invalid Value"));
        assert_eq!(outcome.status(), Some(401));
        assert_eq!(provider.userinfo_calls(), 0);
    }

    #[tokio::test]
    async fn test_userinfo_failure_is_generic() {
        let provider = Arc::new(MockProvider::accepting().with_userinfo_response(Err(
            ProviderError::Rejected("Userinfo request failed: 401 Unauthorized".to_string()),
        )));
        let strategy = strategy_with(options(), provider, Arc::default());

        let req = AuthRequest::new().with_body_field("access_token", "ya29.token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("failed to get userinfo"));
        assert_eq!(outcome.status(), None);
    }

    #[tokio::test]
    async fn test_audience_not_checked_for_access_tokens_by_default() {
        let mut info = TokenInfo::expiring_at(now_millis() + 60_000);
        info.aud = Some("someone-else".to_string());
        let provider = Arc::new(MockProvider::accepting().with_token_info_response(Ok(Some(info))));
        let strategy = strategy_with(options(), provider, Arc::default());

        let req = AuthRequest::new().with_body_field("access_token", "ya29.token");
        assert!(strategy.authenticate(&req).await.is_success());
    }

    #[tokio::test]
    async fn test_enforced_access_token_audience() {
        let mut foreign = TokenInfo::expiring_at(now_millis() + 60_000);
        foreign.aud = Some("someone-else".to_string());
        let provider =
            Arc::new(MockProvider::accepting().with_token_info_response(Ok(Some(foreign))));
        let strategy = strategy_with(
            StrategyOptions::with_client_ids(["client-a", "client-b"])
                .with_enforce_access_token_audience(true),
            provider.clone(),
            Arc::default(),
        );

        let req = AuthRequest::new().with_body_field("access_token", "ya29.token");
        let outcome = strategy.authenticate(&req).await;
        assert_eq!(outcome.failure_message(), Some("access token audience mismatch"));
        assert_eq!(provider.userinfo_calls(), 0);

        let mut ours = TokenInfo::expiring_at(now_millis() + 60_000);
        ours.azp = Some("client-b".to_string());
        let provider = Arc::new(MockProvider::accepting().with_token_info_response(Ok(Some(ours))));
        let strategy = strategy_with(
            StrategyOptions::with_client_ids(["client-a", "client-b"])
                .with_enforce_access_token_audience(true),
            provider,
            Arc::default(),
        );
        assert!(strategy.authenticate(&req).await.is_success());
    }

    // --- done / verifier ---

    #[tokio::test]
    async fn test_subject_is_sub_when_present() {
        let verifier = Arc::new(RecordingVerifier::default());
        let strategy = strategy_with(options(), Arc::new(MockProvider::accepting()), verifier.clone());

        let req = AuthRequest::new().with_body_field("id_token", "token");
        strategy.authenticate(&req).await;

        assert_eq!(*verifier.subjects.lock().unwrap(), vec!["id:1234".to_string()]);
    }

    #[tokio::test]
    async fn test_subject_falls_back_to_claims_without_sub() {
        let profile = VerifiedClaims {
            sub: None,
            email: Some("alice@example.com".to_string()),
            ..Default::default()
        };
        let provider = Arc::new(MockProvider::accepting().with_userinfo_response(Ok(profile)));
        let verifier = Arc::new(RecordingVerifier::default());
        let strategy = strategy_with(options(), provider, verifier.clone());

        let req = AuthRequest::new().with_body_field("access_token", "ya29.token");
        let (user, _) = expect_success(strategy.authenticate(&req).await);

        assert_eq!(user.id, "anonymous");
        assert_eq!(
            *verifier.subjects.lock().unwrap(),
            vec!["claims:alice@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_request_passed_only_when_enabled() {
        let req = AuthRequest::new().with_body_field("id_token", "token");

        let verifier = Arc::new(RecordingVerifier::default());
        let strategy = strategy_with(options(), Arc::new(MockProvider::accepting()), verifier.clone());
        strategy.authenticate(&req).await;

        let passing = Arc::new(RecordingVerifier::default());
        let strategy = strategy_with(
            options().with_pass_req_to_callback(true),
            Arc::new(MockProvider::accepting()),
            passing.clone(),
        );
        strategy.authenticate(&req).await;

        assert_eq!(*verifier.requests_seen.lock().unwrap(), vec![false]);
        assert_eq!(*passing.requests_seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_verifier_error_is_error_outcome() {
        let strategy = TokenStrategy::builder(options())
            .provider(MockProvider::accepting())
            .verify(verify_fn(|_claims, _req| async {
                Err::<Verified<TestUser>, _>(anyhow::anyhow!("database unavailable"))
            }))
            .build()
            .unwrap();

        let req = AuthRequest::new().with_body_field("id_token", "token");
        match strategy.authenticate(&req).await {
            AuthOutcome::Error(e) => assert_eq!(e.to_string(), "database unavailable"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verifier_declining_fails_with_its_info() {
        let strategy = TokenStrategy::builder(options())
            .provider(MockProvider::accepting())
            .verify(verify_fn(|_claims, _req| async {
                Ok(Verified::<TestUser>::rejected().with_info(json!({"message": "unknown user"})))
            }))
            .build()
            .unwrap();

        let req = AuthRequest::new().with_body_field("id_token", "token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(outcome.failure_message(), Some("unknown user"));
        assert_eq!(outcome.status(), None);
    }

    #[tokio::test]
    async fn test_verify_fn_receives_request_copy() {
        let strategy = TokenStrategy::builder(options().with_pass_req_to_callback(true))
            .provider(MockProvider::accepting())
            .verify(verify_fn(|claims: VerifiedClaims, req: Option<AuthRequest>| async move {
                let tenant = req
                    .as_ref()
                    .and_then(|r| r.param_from_request("tenant"))
                    .unwrap_or("none")
                    .to_string();
                Ok(Verified::user(format!(
                    "{}@{}",
                    claims.subject().unwrap_or(""),
                    tenant
                )))
            }))
            .build()
            .unwrap();

        let req = AuthRequest::new()
            .with_body_field("id_token", "token")
            .with_path_param("tenant", "acme");
        match strategy.authenticate(&req).await {
            AuthOutcome::Success { user, info } => {
                assert_eq!(user, "1234@acme");
                assert!(info.is_none());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    // --- timeouts ---

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_times_out_as_failure() {
        let provider = Arc::new(MockProvider::accepting().with_delay(Duration::from_secs(3600)));
        let strategy = strategy_with(
            options().with_provider_timeout(Duration::from_secs(2)),
            provider.clone(),
            Arc::default(),
        );

        let req = AuthRequest::new().with_body_field("access_token", "ya29.token");
        let outcome = strategy.authenticate(&req).await;

        assert_eq!(
            outcome.failure_message(),
            Some("identity provider request timed out")
        );
        assert_eq!(outcome.status(), None);
        assert_eq!(provider.userinfo_calls(), 0);
    }

    #[test]
    fn test_downgrade_split() {
        assert!(downgrade(ProviderError::InvalidToken("x".to_string())).is_err());
        assert!(downgrade(ProviderError::Rejected("x".to_string())).is_err());
        assert!(matches!(
            downgrade(ProviderError::Timeout),
            Ok(Verification::Rejected(Some(_)))
        ));
        assert!(matches!(
            downgrade(ProviderError::InvalidResponse("x".to_string())),
            Ok(Verification::Rejected(Some(_)))
        ));
    }

    #[test]
    fn test_effective_audience() {
        assert_eq!(
            StrategyOptions::with_client_ids(["a", "", "b"]).effective_audience(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            StrategyOptions::new("a").with_audience(["x"]).effective_audience(),
            vec!["x".to_string()]
        );
    }
}
