//! Key material and the raw sign/verify primitives.
//!
//! HMAC signatures are compared in constant time against the third token
//! segment. RSA tokens are signed with `ring` and checked through
//! `jsonwebtoken`, which also reads the public key formats.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use ring::hmac;
use ring::rand::SystemRandom;
use ring::signature::{self, KeyPair, RsaKeyPair};
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use subtle::ConstantTimeEq;

use super::{Algorithm, ConfigError, IssueError};

pub(super) enum Signer {
    Hmac(hmac::Key),
    Rsa {
        signing: Option<RsaKeyPair>,
        verifying: DecodingKey,
        rng: SystemRandom,
    },
}

impl Signer {
    pub(super) fn hmac(algorithm: Algorithm, secret: &[u8]) -> Result<Self, ConfigError> {
        let family = match algorithm {
            Algorithm::HS256 => hmac::HMAC_SHA256,
            Algorithm::HS384 => hmac::HMAC_SHA384,
            Algorithm::HS512 => hmac::HMAC_SHA512,
            rsa => return Err(ConfigError::AlgorithmMismatch(rsa)),
        };
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret(algorithm));
        }
        Ok(Self::Hmac(hmac::Key::new(family, secret)))
    }

    pub(super) fn rsa(
        algorithm: Algorithm,
        private_pem: Option<&str>,
        public_pem: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if algorithm.is_symmetric() {
            return Err(ConfigError::AlgorithmMismatch(algorithm));
        }
        let signing = private_pem.map(parse_private_key).transpose()?;
        let verifying = match (public_pem, &signing) {
            (Some(pem), _) => parse_public_key(pem)?,
            (None, Some(pair)) => DecodingKey::from_rsa_der(pair.public_key().as_ref()),
            (None, None) => return Err(ConfigError::MissingKeyMaterial(algorithm)),
        };
        Ok(Self::Rsa { signing, verifying, rng: SystemRandom::new() })
    }

    pub(super) fn sign(&self, algorithm: Algorithm, data: &[u8]) -> Result<Vec<u8>, IssueError> {
        match self {
            Self::Hmac(key) => Ok(hmac::sign(key, data).as_ref().to_vec()),
            Self::Rsa { signing: None, .. } => Err(IssueError::MissingSigningKey),
            Self::Rsa { signing: Some(pair), rng, .. } => {
                let mut sig = vec![0; pair.public().modulus_len()];
                pair.sign(rsa_padding(algorithm), rng, data, &mut sig)
                    .map_err(|_| IssueError::Signing)?;
                Ok(sig)
            }
        }
    }

    /// Checks `signature`, the still-encoded third token segment, over `data`.
    pub(super) fn verify(&self, algorithm: Algorithm, data: &[u8], signature: &str) -> bool {
        match self {
            Self::Hmac(key) => {
                let expected = URL_SAFE_NO_PAD.encode(hmac::sign(key, data));
                expected.as_bytes().ct_eq(signature.as_bytes()).into()
            }
            Self::Rsa { verifying, .. } => {
                jsonwebtoken::crypto::verify(signature, data, verifying, jwt_algorithm(algorithm))
                    .unwrap_or(false)
            }
        }
    }
}

fn rsa_padding(algorithm: Algorithm) -> &'static dyn signature::RsaEncoding {
    match algorithm {
        Algorithm::RS384 => &signature::RSA_PKCS1_SHA384,
        Algorithm::RS512 => &signature::RSA_PKCS1_SHA512,
        _ => &signature::RSA_PKCS1_SHA256,
    }
}

fn jwt_algorithm(algorithm: Algorithm) -> jsonwebtoken::Algorithm {
    match algorithm {
        Algorithm::RS384 => jsonwebtoken::Algorithm::RS384,
        Algorithm::RS512 => jsonwebtoken::Algorithm::RS512,
        _ => jsonwebtoken::Algorithm::RS256,
    }
}

// ── PEM ───────────────────────────────────────────────────────────────────────

/// Accepts a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) block.
fn parse_private_key(pem: &str) -> Result<RsaKeyPair, ConfigError> {
    let der = PrivateKeyDer::from_pem_slice(pem.as_bytes())
        .map_err(|e| ConfigError::InvalidKey(format!("private key PEM: {e:?}")))?;
    let pair = match &der {
        PrivateKeyDer::Pkcs8(key) => RsaKeyPair::from_pkcs8(key.secret_pkcs8_der()),
        PrivateKeyDer::Pkcs1(key) => RsaKeyPair::from_der(key.secret_pkcs1_der()),
        _ => return Err(ConfigError::InvalidKey("not an RSA private key".to_owned())),
    };
    pair.map_err(|e| ConfigError::InvalidKey(e.to_string()))
}

/// Accepts an SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) block.
fn parse_public_key(pem: &str) -> Result<DecodingKey, ConfigError> {
    DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| ConfigError::InvalidKey(e.to_string()))
}
