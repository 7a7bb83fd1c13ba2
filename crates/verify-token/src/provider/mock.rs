//! Canned [`IdentityProvider`] for tests.
//!
//! Each operation returns a fixed response and counts its calls. An optional
//! delay lets tests exercise the strategy's provider timeout.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock identity provider.
pub struct MockProvider {
    id_token_response: Result<Option<LoginTicket>, ProviderError>,
    token_info_response: Result<Option<TokenInfo>, ProviderError>,
    userinfo_response: Result<VerifiedClaims, ProviderError>,
    delay: Option<Duration>,
    id_token_calls: AtomicUsize,
    token_info_calls: AtomicUsize,
    userinfo_calls: AtomicUsize,
    last_audience: Mutex<Option<Vec<String>>>,
}

impl MockProvider {
    /// A provider that accepts every credential for subject `"1234"`.
    ///
    /// Access tokens expire one hour from construction.
    pub fn accepting() -> Self {
        let claims = VerifiedClaims {
            sub: Some("1234".to_string()),
            ..Default::default()
        };
        let expiry = chrono::Utc::now().timestamp_millis() + 3_600_000;

        Self {
            id_token_response: Ok(Some(LoginTicket::new(Some(claims.clone())))),
            token_info_response: Ok(Some(TokenInfo::expiring_at(expiry))),
            userinfo_response: Ok(claims),
            delay: None,
            id_token_calls: AtomicUsize::new(0),
            token_info_calls: AtomicUsize::new(0),
            userinfo_calls: AtomicUsize::new(0),
            last_audience: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_id_token_response(
        mut self,
        response: Result<Option<LoginTicket>, ProviderError>,
    ) -> Self {
        self.id_token_response = response;
        self
    }

    #[must_use]
    pub fn with_token_info_response(
        mut self,
        response: Result<Option<TokenInfo>, ProviderError>,
    ) -> Self {
        self.token_info_response = response;
        self
    }

    #[must_use]
    pub fn with_userinfo_response(mut self, response: Result<VerifiedClaims, ProviderError>) -> Self {
        self.userinfo_response = response;
        self
    }

    /// Sleep this long before answering any call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn id_token_calls(&self) -> usize {
        self.id_token_calls.load(Ordering::SeqCst)
    }

    pub fn token_info_calls(&self) -> usize {
        self.token_info_calls.load(Ordering::SeqCst)
    }

    pub fn userinfo_calls(&self) -> usize {
        self.userinfo_calls.load(Ordering::SeqCst)
    }

    /// Audience passed to the most recent `verify_id_token` call.
    pub fn last_audience(&self) -> Option<Vec<String>> {
        self.last_audience
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn verify_id_token(
        &self,
        request: IdTokenRequest<'_>,
    ) -> Result<Option<LoginTicket>, ProviderError> {
        self.id_token_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_audience.lock() {
            *guard = Some(request.audience.to_vec());
        }
        self.pause().await;
        self.id_token_response.clone()
    }

    async fn get_token_info(&self, _access_token: &str) -> Result<Option<TokenInfo>, ProviderError> {
        self.token_info_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.token_info_response.clone()
    }

    async fn fetch_userinfo(&self, _access_token: &str) -> Result<VerifiedClaims, ProviderError> {
        self.userinfo_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.userinfo_response.clone()
    }
}
