//! Test utilities for google-verify-token.
//!
//! - `keys` - RSA signing keys and JWKs
//! - `token_builders` - ID-token claims and provider response bodies
//! - `mock_google` - wiremock server for the Google endpoints

pub mod keys;
pub mod mock_google;
pub mod token_builders;

pub use keys::TestSigningKey;
pub use mock_google::MockGoogleServer;
pub use token_builders::{
    token_info_json, userinfo_json, TestIdTokenBuilder, GOOGLE_ISSUER, TEST_CLIENT_ID,
};
