//! RSA signing fixtures for test ID tokens.
//!
//! Two fixed 2048-bit keys stand in for Google's rotating signing keys. The
//! private halves live in `fixtures/`; the public halves are published as
//! JWKs exactly as Google's `/oauth2/v3/certs` endpoint does.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

const PRIMARY_PEM: &str = include_str!("../fixtures/signing_key_primary.pem");
const PRIMARY_MODULUS: &str = "sLHFvszFoLSj8ZSBnH9zuOAq0Bg6RurK4SOkstzG45XhQ2KGnr7tjBNFYpDd20BnuG0YeDQWelU39lSWUg8OkHL6ePui7tpWlWVX67UD-SC8V7N5BPxDdA2q5L-ZWEJQuy-p9qo-4JrHqIRNhf-IRXvnELe40GN-SK0Nq8X3-OrGPV9aNhZYNoteybVjZF3atcKERlihFaMZVk64-uETWkdGisyn2p8OpX5PTr4rXVWtqWLM7qT7pm2az_6yic5CaIJUouem8D-AXIb97Sg8cX-ZHQIJJQBhnv7OFJICnHd73b0Hcox2aLyp1pJN2JvYIhrYdxtR1qgBxfwYhMkH_w";

const SECONDARY_PEM: &str = include_str!("../fixtures/signing_key_secondary.pem");
const SECONDARY_MODULUS: &str = "t59fIjU4SCEkEvgdWWCDH25IUril-QGWaPqI1A-phXkIoenpnxLuUnk581HCFYmdCF644ZiFu5996VQodsTKt0blp9y7Od5QdcTfOQhzFZY8cJcUNeJnNFb084ZHWMP-G84bh-EDYU7ncau_jkR1uCLvqsBxAZIiSNBZExds0ptLcc8GAsxbvy9_X234i9x4NSgI9gMtX2cSWobTZHyms_Y0L4sZeqLlSlTTPvEJS0PVkMDNq8d54t19eCHtRQ7bbA9xCuPThF1YypKW_T748PsmkZf6cL5Yo_vso21WD1qZFMv4fLMbAXltzo0ARhakUQfKNiaE82my5D2mxD8M_w";

/// Public exponent 65537, base64url.
const EXPONENT: &str = "AQAB";

/// A test signing key with a key ID.
#[derive(Debug, Clone, Copy)]
pub struct TestSigningKey {
    kid: &'static str,
    private_pem: &'static str,
    modulus: &'static str,
}

impl TestSigningKey {
    /// The key most tests sign with.
    pub fn primary() -> Self {
        Self {
            kid: "test-google-key-01",
            private_pem: PRIMARY_PEM,
            modulus: PRIMARY_MODULUS,
        }
    }

    /// A second key, for rotation and wrong-key scenarios.
    pub fn secondary() -> Self {
        Self {
            kid: "test-google-key-02",
            private_pem: SECONDARY_PEM,
            modulus: SECONDARY_MODULUS,
        }
    }

    /// The same key material published under a different key ID.
    pub fn with_kid(self, kid: &'static str) -> Self {
        Self { kid, ..self }
    }

    pub fn kid(&self) -> &str {
        self.kid
    }

    /// Public JWK as served by the certificate endpoint.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "n": self.modulus,
            "e": EXPONENT,
            "alg": "RS256",
            "use": "sig"
        })
    }

    /// Sign claims as an RS256 JWT carrying this key's `kid`.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_kid(claims, Some(self.kid))
    }

    /// Sign claims with an arbitrary (or absent) `kid` header.
    pub fn sign_with_kid(&self, claims: &Value, kid: Option<&str>) -> String {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes())
            .expect("fixture PEM must be a valid RSA key");
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = kid.map(ToString::to_string);

        encode(&header, claims, &encoding_key).expect("Failed to sign test token")
    }
}
