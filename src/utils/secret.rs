use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::pkce::constant_time_compare;

/// Generates a high-entropy, URL-safe opaque token (registration tokens,
/// refresh tokens, authorization codes, state values). `byte_len` is the
/// amount of raw entropy before base64url encoding, not the output length.
pub fn generate_opaque_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Registration tokens carry a human-recognisable `reg-` prefix to aid
/// debugging; they are opaque and never parsed as JWTs.
pub fn generate_registration_token() -> String {
    format!("reg-{}", generate_opaque_token(32))
}

/// A high-entropy confidential client secret (for `client_secret_post` /
/// `client_secret_basic` clients).
pub fn generate_client_secret() -> String {
    generate_opaque_token(32)
}

pub fn generate_client_id() -> String {
    generate_opaque_token(18)
}

/// Opaque tokens are already high-entropy, so hashing is deterministic
/// (SHA-256, no salt) — this only protects a Store compromise from handing
/// out live tokens directly, the same posture this codebase's existing
/// opaque-token hashing utility already takes for non-password secrets.
pub fn hash_opaque_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time comparison of a presented token against its stored hash.
pub fn verify_opaque_token(token: &str, stored_hash: &str) -> bool {
    constant_time_compare(hash_opaque_token(token).as_bytes(), stored_hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let token = generate_opaque_token(16);
        assert_eq!(hash_opaque_token(&token), hash_opaque_token(&token));
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let token = generate_opaque_token(16);
        let hash = hash_opaque_token(&token);
        assert!(verify_opaque_token(&token, &hash));
        assert!(!verify_opaque_token("something-else", &hash));
    }

    #[test]
    fn registration_tokens_carry_prefix() {
        assert!(generate_registration_token().starts_with("reg-"));
    }
}
