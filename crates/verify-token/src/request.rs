//! Credential extraction from incoming requests.
//!
//! A request exposes four optional string maps. Named parameters are looked
//! up in a fixed order (body, query, headers, path params) and the first
//! non-empty value wins, so a body or query value always overrides a header
//! of the same name.
//!
//! The bearer rule is separate and strict: only `authorization: Bearer <token>`
//! with exactly one space yields a token.

use secrecy::SecretString;
use std::collections::HashMap;

/// Parameter name carrying an ID token.
pub const ID_TOKEN_PARAM: &str = "id_token";

/// Parameter name carrying an access token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Credential carried by a request.
#[derive(Debug)]
pub enum Credential {
    IdToken(SecretString),
    AccessToken(SecretString),
}

impl Credential {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::IdToken(_) => "id_token",
            Credential::AccessToken(_) => "access_token",
        }
    }
}

/// Request data consulted during authentication.
///
/// None of the maps are required. Header names are expected in lower case,
/// which is how `http::HeaderMap` stores them.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub body: Option<HashMap<String, String>>,
    pub query: Option<HashMap<String, String>>,
    pub headers: Option<HashMap<String, String>>,
    pub params: Option<HashMap<String, String>>,
}

impl AuthRequest {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_body_field(mut self, name: &str, value: &str) -> Self {
        insert(&mut self.body, name, value);
        self
    }

    #[must_use]
    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        insert(&mut self.query, name, value);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        insert(&mut self.headers, &name.to_ascii_lowercase(), value);
        self
    }

    #[must_use]
    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        insert(&mut self.params, name, value);
        self
    }

    /// Look up `name` in body, query, headers, then path params.
    ///
    /// Returns the first non-empty value, or `None`.
    pub fn param_from_request(&self, name: &str) -> Option<&str> {
        [&self.body, &self.query, &self.headers, &self.params]
            .into_iter()
            .find_map(|source| lookup(source, name))
    }

    /// Extract the token from an `authorization: Bearer <token>` header.
    ///
    /// The value must split on a single space into exactly two parts, the
    /// first being `Bearer`. Any other shape yields `None`.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = lookup(&self.headers, "authorization")?;
        let mut parts = value.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    /// Resolve the credential to verify.
    ///
    /// An ID token (named parameter, then bearer header) wins over an
    /// access token; an access token is only read from named parameters.
    pub fn credential(&self) -> Option<Credential> {
        if let Some(token) = self
            .param_from_request(ID_TOKEN_PARAM)
            .or_else(|| self.bearer_token())
        {
            return Some(Credential::IdToken(SecretString::from(token.to_string())));
        }

        self.param_from_request(ACCESS_TOKEN_PARAM)
            .map(|token| Credential::AccessToken(SecretString::from(token.to_string())))
    }
}

fn lookup<'a>(source: &'a Option<HashMap<String, String>>, name: &str) -> Option<&'a str> {
    source
        .as_ref()
        .and_then(|map| map.get(name))
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn insert(target: &mut Option<HashMap<String, String>>, name: &str, value: &str) {
    target
        .get_or_insert_with(HashMap::new)
        .insert(name.to_string(), value.to_string());
}
