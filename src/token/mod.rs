//! Compact, stateless bearer tokens.
//!
//! A token is three base64url segments joined by `.`: a header naming the
//! algorithm, a JSON claims object, and a signature over the first two
//! segments exactly as they appear in the token.
//!
//! ```rust
//! use fcodex::token::{Algorithm, Lifetime, TokenCodec, TokenConfig};
//!
//! let codec = TokenCodec::new(
//!     TokenConfig::new(Algorithm::HS256)
//!         .secret("change-me")
//!         .expires_in(Lifetime::minutes(30)),
//! )
//! .unwrap();
//!
//! let token = codec.issue(&serde_json::json!({ "sub": "alice" })).unwrap();
//! let claims = codec.verify(&token).unwrap();
//! assert_eq!(claims["sub"], "alice");
//! ```
//!
//! Verification checks, in order: segment count, signature, payload, expiry.
//! The first failure wins, so a token that is both tampered with and expired
//! reports [`VerifyError::InvalidSignature`].

mod algorithm;
mod keys;

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub use algorithm::{Algorithm, Lifetime};

use keys::Signer;

/// The decoded payload of a token, including the reserved `iat` and `exp`.
pub type Claims = serde_json::Map<String, Value>;

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of the current time, in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A codec could not be built from its configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} requires a non-empty secret")]
    MissingSecret(Algorithm),

    #[error("{0} requires a private or public key")]
    MissingKeyMaterial(Algorithm),

    #[error("the key material configured does not fit {0}")]
    AlgorithmMismatch(Algorithm),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid lifetime `{0}`: expected a count with an s, m or h suffix")]
    Lifetime(String),

    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),
}

/// A token could not be issued.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("token claims must serialize to a JSON object")]
    NotAnObject,

    #[error("failed to serialize claims: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("codec has no private key and can only verify")]
    MissingSigningKey,

    #[error("signing failed")]
    Signing,
}

/// Why a token was rejected.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum VerifyError {
    #[error("Incomplete token")]
    Incomplete,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid payload")]
    InvalidPayload,

    #[error("Token expired")]
    Expired,
}

// ── Config ────────────────────────────────────────────────────────────────────

/// Everything needed to build a [`TokenCodec`].
#[derive(Clone)]
pub struct TokenConfig {
    algorithm: Algorithm,
    secret: Option<Vec<u8>>,
    private_key: Option<String>,
    public_key: Option<String>,
    lifetime: Lifetime,
}

impl TokenConfig {
    /// A configuration for `algorithm` with the default one-hour lifetime.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            secret: None,
            private_key: None,
            public_key: None,
            lifetime: Lifetime::default(),
        }
    }

    /// The shared secret for the `HS*` family.
    pub fn secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.secret = Some(secret.as_ref().to_vec());
        self
    }

    /// A PEM private key (`PRIVATE KEY` or `RSA PRIVATE KEY`) for the `RS*` family.
    pub fn private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.private_key = Some(pem.into());
        self
    }

    /// A PEM public key (`PUBLIC KEY` or `RSA PUBLIC KEY`) for the `RS*` family.
    pub fn public_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.public_key = Some(pem.into());
        self
    }

    pub fn expires_in(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key.is_some())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Issues and verifies tokens for one configuration.
///
/// Codecs are independent: two codecs with different secrets reject each
/// other's tokens. Share one across tasks behind an `Arc`.
pub struct TokenCodec {
    algorithm: Algorithm,
    lifetime: Lifetime,
    signer: Signer,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: TokenConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds a codec that reads the time from `clock`.
    pub fn with_clock(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let TokenConfig { algorithm, secret, private_key, public_key, lifetime } = config;
        let signer = if algorithm.is_symmetric() {
            Signer::hmac(algorithm, secret.as_deref().unwrap_or_default())?
        } else {
            Signer::rsa(algorithm, private_key.as_deref(), public_key.as_deref())?
        };
        Ok(Self { algorithm, lifetime, signer, clock })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Signs `claims` into a token.
    ///
    /// `claims` must serialize to a JSON object. `iat` is set to now and
    /// `exp` to now plus the configured lifetime, replacing any values the
    /// caller supplied under those keys.
    pub fn issue<T: Serialize + ?Sized>(&self, claims: &T) -> Result<String, IssueError> {
        let Value::Object(mut payload) = serde_json::to_value(claims)? else {
            return Err(IssueError::NotAnObject);
        };
        let now = self.clock.now();
        payload.insert("iat".to_owned(), now.into());
        payload.insert("exp".to_owned(), now.saturating_add(self.lifetime.as_secs()).into());

        let header = json!({ "alg": self.algorithm.as_str(), "typ": "JWT" });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?),
        );
        let signature = self.signer.sign(self.algorithm, signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks a token and returns its claims.
    ///
    /// The header's `alg` is never consulted; the codec's own algorithm is
    /// the only one accepted.
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VerifyError::Incomplete);
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(VerifyError::Incomplete);
        }

        let signed = &token[..header.len() + 1 + payload.len()];
        if !self.signer.verify(self.algorithm, signed.as_bytes(), signature) {
            return Err(VerifyError::InvalidSignature);
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(VerifyError::InvalidPayload)?;

        match claims.get("exp") {
            None => {}
            Some(exp) => {
                let exp = exp.as_u64().ok_or(VerifyError::InvalidPayload)?;
                if self.clock.now() > exp {
                    return Err(VerifyError::Expired);
                }
            }
        }
        Ok(claims)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
