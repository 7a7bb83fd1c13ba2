//! Wiremock harness standing in for Google's OAuth2 endpoints.
//!
//! Paths mirror the real services so only the base URL differs:
//!
//! - `GET  /oauth2/v3/certs`     signing keys
//! - `POST /tokeninfo`           access-token metadata (form body)
//! - `GET  /oauth2/v3/userinfo`  profile (`access_token` query parameter)

use crate::keys::TestSigningKey;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CERTS_PATH: &str = "/oauth2/v3/certs";
pub const TOKEN_INFO_PATH: &str = "/tokeninfo";
pub const USERINFO_PATH: &str = "/oauth2/v3/userinfo";

/// Mock Google server.
pub struct MockGoogleServer {
    server: MockServer,
}

impl MockGoogleServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn certs_url(&self) -> String {
        format!("{}{}", self.server.uri(), CERTS_PATH)
    }

    pub fn token_info_url(&self) -> String {
        format!("{}{}", self.server.uri(), TOKEN_INFO_PATH)
    }

    pub fn userinfo_url(&self) -> String {
        format!("{}{}", self.server.uri(), USERINFO_PATH)
    }

    /// Publish the given keys on the certificate endpoint.
    pub async fn mount_certs(&self, keys: &[TestSigningKey]) {
        let body = json!({
            "keys": keys.iter().map(TestSigningKey::jwk_json).collect::<Vec<_>>()
        });
        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer token-info lookups for `access_token`.
    pub async fn mount_token_info(&self, access_token: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(TOKEN_INFO_PATH))
            .and(body_string_contains(format!("access_token={}", access_token)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer userinfo requests made with `access_token`.
    pub async fn mount_userinfo(&self, access_token: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(USERINFO_PATH))
            .and(query_param("access_token", access_token))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Fail the test (on drop) if the userinfo endpoint is hit at all.
    pub async fn expect_no_userinfo(&self) {
        Mock::given(method("GET"))
            .and(path(USERINFO_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Fail the test (on drop) if the token-info endpoint is hit at all.
    pub async fn expect_no_token_info(&self) {
        Mock::given(method("POST"))
            .and(path(TOKEN_INFO_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Underlying server, for one-off mocks.
    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}
