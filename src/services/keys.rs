use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{Config, SigningAlgorithm};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed or has an invalid signature")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for KeyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => KeyError::Expired,
            _ => KeyError::Invalid,
        }
    }
}

/// Owns signing material exclusively. Loaded once at startup; read-only for
/// the life of the process. `kid` is the SHA-256 of the DER-encoded RSA
/// public key, truncated, so it is stable across restarts with the same key
/// even though rotation itself is out of scope.
pub struct KeyManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    kid: String,
    jwks: serde_json::Value,
}

impl KeyManager {
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        match config.signing_algorithm {
            SigningAlgorithm::Rs256 => {
                let pem = config
                    .private_key_pem
                    .as_deref()
                    .context("SIGNING_KEY_B64 is required for RS256")?;
                Self::load_rs256(pem)
            }
            SigningAlgorithm::Hs256 => {
                tracing::warn!(
                    "signing access tokens with HS256 bootstrap key; this is not supported in production"
                );
                let secret = config
                    .symmetric_secret
                    .as_deref()
                    .context("SYMMETRIC_SECRET is required for HS256")?;
                Ok(Self::load_hs256(secret))
            }
        }
    }

    fn load_rs256(private_key_pem: &str) -> anyhow::Result<Self> {
        let private_key = parse_rsa_private_key(private_key_pem)?;
        let public_key = private_key.to_public_key();

        let public_key_der = public_key
            .to_public_key_der()
            .context("failed to encode derived RSA public key")?;
        let mut hasher = Sha256::new();
        hasher.update(public_key_der.as_bytes());
        let kid = hex::encode(&hasher.finalize()[..8]);

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let jwks = serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": kid,
                "n": n,
                "e": e,
            }]
        });

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .context("invalid RSA private key")?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .context("failed to render derived RSA public key as PEM")?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .context("failed to derive RSA decoding key")?;

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm: Algorithm::RS256,
            kid,
            jwks,
        })
    }

    fn load_hs256(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            kid: "bootstrap-hs256".to_string(),
            // A symmetric key cannot be published; the JWKS document is
            // intentionally empty in this mode.
            jwks: serde_json::json!({ "keys": [] }),
        }
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, KeyError> {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).map_err(KeyError::from)
    }

    /// Verifies signature, structure, and `exp`. The caller (`TokenService`)
    /// is responsible for checking `iss`/`aud` since only it knows the
    /// configured issuer, and for consulting the Store for revocation.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, KeyError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        // Audience validation is handled manually by the caller (TokenService
        // checks iss/aud against the configured issuer), not here.
        validation.validate_aud = false;
        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(KeyError::from)
    }

    pub fn public_jwks(&self) -> serde_json::Value {
        self.jwks.clone()
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

fn parse_rsa_private_key(pem: &str) -> anyhow::Result<RsaPrivateKey> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(pem).context("invalid PKCS#1 RSA private key")
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).context("invalid PKCS#8 RSA private key")
    }
}
