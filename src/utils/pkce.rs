use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

pub const PKCE_METHOD_S256: &str = "S256";
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

/// `S256` is the only supported PKCE method — `plain` is rejected outright
/// wherever a `code_challenge_method` is read, never reaching this function.
pub fn compute_s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// `base64url(SHA-256(verifier)) == challenge`, compared in constant time.
pub fn verify_pkce(verifier: &str, challenge: &str) -> bool {
    let computed = compute_s256_challenge(verifier);
    constant_time_compare(computed.as_bytes(), challenge.as_bytes())
}

/// RFC 7636 §4.1: 43-128 characters from `[A-Za-z0-9-._~]`.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    (CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len)
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// The challenge is a base64url(no padding) SHA-256 digest: always 43
/// characters from the URL-safe alphabet.
pub fn validate_code_challenge(challenge: &str) -> bool {
    challenge.len() == 43
        && challenge
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
}

pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn appendix_b_vector_matches() {
        assert_eq!(compute_s256_challenge(VERIFIER), CHALLENGE);
        assert!(verify_pkce(VERIFIER, CHALLENGE));
    }

    #[test]
    fn wrong_verifier_is_rejected() {
        assert!(!verify_pkce("not-the-right-verifier-at-all-0000000000000", CHALLENGE));
    }

    #[test]
    fn verifier_length_bounds_are_enforced() {
        assert!(!validate_code_verifier(&"a".repeat(42)));
        assert!(validate_code_verifier(&"a".repeat(43)));
        assert!(validate_code_verifier(&"a".repeat(128)));
        assert!(!validate_code_verifier(&"a".repeat(129)));
    }

    #[test]
    fn verifier_rejects_invalid_characters() {
        assert!(!validate_code_verifier(&"!".repeat(43)));
    }

    #[test]
    fn challenge_shape_is_validated() {
        assert!(validate_code_challenge(CHALLENGE));
        assert!(!validate_code_challenge("too-short"));
    }

    #[test]
    fn constant_time_compare_rejects_mismatched_lengths() {
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }
}
