//! Token verification building blocks.
//!
//! # Components
//!
//! - `claims` - Verified identity payload and token-info metadata
//! - `jwks` - Cache of Google's signing certificates
//! - `id_token` - RS256 signature and claim verification for ID tokens

pub mod claims;
pub mod id_token;
pub mod jwks;

pub use claims::{Audience, TokenInfo, VerifiedClaims};
pub use id_token::IdTokenVerifier;
pub use jwks::JwksClient;
