//! Middleware wiring a [`crate::TokenStrategy`] into an axum router.
//!
//! # Components
//!
//! - `auth` - Authentication middleware for protected routes

pub mod auth;

pub use auth::{require_token_auth, AuthState, AuthenticatedUser, AuthenticatedUserExt};
