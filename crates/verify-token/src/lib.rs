//! Google token verification strategy.
//!
//! This library authenticates incoming requests that carry a Google-issued
//! credential:
//!
//! - an **ID token** (signed JWT, verified locally against Google's certificates)
//! - an **access token** (opaque, redeemed against Google's token-info and
//!   userinfo endpoints)
//!
//! and reports a uniform success / failure / error outcome to the host.
//!
//! # Architecture
//!
//! ```text
//! middleware/auth.rs -> strategy.rs -> provider/*.rs -> auth/*.rs
//!                            |
//!                            +-> UserVerifier (host callback)
//! ```
//!
//! # Modules
//!
//! - `auth` - Claims types, certificate cache, ID token verification
//! - `config` - Configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `middleware` - Axum middleware wiring a strategy into a router
//! - `observability` - Metrics
//! - `provider` - Identity provider seam and the Google implementation
//! - `request` - Credential extraction from requests
//! - `strategy` - The authentication strategy itself

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;
pub mod provider;
pub mod request;
pub mod strategy;

pub use auth::{TokenInfo, VerifiedClaims};
pub use errors::AuthError;
pub use request::AuthRequest;
pub use strategy::{
    verify_fn, AuthOutcome, StrategyOptions, Subject, TokenStrategy, UserVerifier, Verified,
    STRATEGY_NAME,
};
