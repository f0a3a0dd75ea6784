//! Key and signature text encodings.
//!
//! Public keys are `jade-pk-{role}-{base64}` (role may itself contain dashes)
//! or bare base64; signatures are `jade-sig-{base64}` or bare base64. Secret
//! keys are only ever `jade-sk-{role}-{base64}` over the 32-byte seed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::TrustError;

const PK_PREFIX: &str = "jade-pk-";
const SIG_PREFIX: &str = "jade-sig-";
const SK_PREFIX: &str = "jade-sk-";

/// Only algorithm accepted for skill and certificate signatures.
pub const ED25519: &str = "ed25519";

fn invalid_key(key: &str, reason: impl Into<String>) -> TrustError {
    let shown: String = key.chars().take(48).collect();
    TrustError::InvalidKey {
        key: shown,
        reason: reason.into(),
    }
}

/// Decode a public key string.
///
/// # Errors
///
/// Returns [`TrustError::InvalidKey`] for bad base64, wrong length or a point
/// that is not on the curve.
pub fn decode_public_key(text: &str) -> Result<VerifyingKey, TrustError> {
    let text = text.trim();
    let b64 = match text.strip_prefix(PK_PREFIX) {
        Some(rest) => rest
            .rfind('-')
            .map(|idx| &rest[idx + 1..])
            .ok_or_else(|| invalid_key(text, "missing role segment"))?,
        None => text,
    };
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| invalid_key(text, e.to_string()))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| invalid_key(text, "public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&array).map_err(|e| invalid_key(text, e.to_string()))
}

/// Decode a signature string.
///
/// # Errors
///
/// Returns [`TrustError::InvalidSignature`] for bad base64 or wrong length.
pub fn decode_signature(text: &str) -> Result<Signature, TrustError> {
    let text = text.trim();
    let b64 = text.strip_prefix(SIG_PREFIX).unwrap_or(text);
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| TrustError::InvalidSignature(e.to_string()))?;
    Signature::from_slice(&bytes).map_err(|e| TrustError::InvalidSignature(e.to_string()))
}

/// # Errors
///
/// Returns [`TrustError::UnsupportedAlgorithm`] for anything but Ed25519.
pub fn check_algorithm(algorithm: &str) -> Result<(), TrustError> {
    if algorithm.eq_ignore_ascii_case(ED25519) {
        Ok(())
    } else {
        Err(TrustError::UnsupportedAlgorithm(algorithm.to_owned()))
    }
}

/// Strict Ed25519 verification (rejects small-order keys and malleable signatures).
#[must_use]
pub fn verify(key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    key.verify_strict(message, signature).is_ok()
}

#[must_use]
pub fn encode_public_key(role: &str, key: &VerifyingKey) -> String {
    format!("{PK_PREFIX}{role}-{}", BASE64.encode(key.as_bytes()))
}

#[must_use]
pub fn encode_signature(signature: &Signature) -> String {
    format!("{SIG_PREFIX}{}", BASE64.encode(signature.to_bytes()))
}

#[must_use]
pub fn encode_secret_key(role: &str, key: &SigningKey) -> String {
    format!("{SK_PREFIX}{role}-{}", BASE64.encode(key.to_bytes()))
}

/// Decode a secret key written by [`encode_secret_key`].
///
/// # Errors
///
/// Returns [`TrustError::InvalidSecretKey`] without echoing the input.
pub fn decode_secret_key(text: &str) -> Result<SigningKey, TrustError> {
    let b64 = text
        .trim()
        .strip_prefix(SK_PREFIX)
        .and_then(|rest| rest.rfind('-').map(|idx| &rest[idx + 1..]))
        .ok_or_else(|| {
            TrustError::InvalidSecretKey("expected jade-sk-{role}-{base64}".into())
        })?;
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| TrustError::InvalidSecretKey(e.to_string()))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TrustError::InvalidSecretKey("secret key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Fresh signing key from the operating system's random source.
#[must_use]
pub fn generate_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// `SHA256:{base64}` digest of the raw key bytes.
#[must_use]
pub fn fingerprint(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("SHA256:{}", BASE64.encode(digest))
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;

    fn signer(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn public_key_with_dashed_role() {
        let key = signer(7).verifying_key();
        let text = encode_public_key("org-alibaba-cloud", &key);
        assert!(text.starts_with("jade-pk-org-alibaba-cloud-"));
        assert_eq!(decode_public_key(&text).unwrap(), key);
    }

    #[test]
    fn bare_base64_key() {
        let key = signer(9).verifying_key();
        let text = BASE64.encode(key.as_bytes());
        assert_eq!(decode_public_key(&text).unwrap(), key);
    }

    #[test]
    fn short_key_rejected() {
        let text = format!("jade-pk-root-{}", BASE64.encode([1u8; 16]));
        let err = decode_public_key(&text).unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn signature_roundtrip_verifies() {
        let sk = signer(3);
        let sig = sk.sign(b"abc123");
        let decoded = decode_signature(&encode_signature(&sig)).unwrap();
        assert!(verify(&sk.verifying_key(), b"abc123", &decoded));
        assert!(!verify(&sk.verifying_key(), b"abc124", &decoded));
        assert!(!verify(&signer(4).verifying_key(), b"abc123", &decoded));
    }

    #[test]
    fn bad_signature_encoding() {
        assert!(matches!(
            decode_signature("jade-sig-!!!"),
            Err(TrustError::InvalidSignature(_))
        ));
        assert!(matches!(
            decode_signature(&BASE64.encode([0u8; 10])),
            Err(TrustError::InvalidSignature(_))
        ));
    }

    #[test]
    fn algorithm_check() {
        assert!(check_algorithm("ed25519").is_ok());
        assert!(check_algorithm("Ed25519").is_ok());
        assert!(matches!(
            check_algorithm("rsa-sha256"),
            Err(TrustError::UnsupportedAlgorithm(_))
        ));
    }

    mod proptest_decode {
        use proptest::prelude::*;

        use super::super::*;

        proptest! {
            #[test]
            fn decoders_never_panic(text in "\\PC{0,200}") {
                let _ = decode_public_key(&text);
                let _ = decode_signature(&text);
                let _ = decode_public_key(&format!("jade-pk-{text}"));
            }
        }
    }

    #[test]
    fn secret_key_roundtrip() {
        let key = signer(5);
        let text = encode_secret_key("org-acme", &key);
        assert!(text.starts_with("jade-sk-org-acme-"));
        let decoded = decode_secret_key(&format!("{text}\n")).unwrap();
        assert_eq!(decoded.verifying_key(), key.verifying_key());
    }

    #[test]
    fn secret_key_errors_hide_input() {
        let public = encode_public_key("root", &signer(5).verifying_key());
        let err = decode_secret_key(&public).unwrap_err();
        assert!(matches!(err, TrustError::InvalidSecretKey(_)));
        assert!(!err.to_string().contains(&public));

        let short = format!("jade-sk-root-{}", BASE64.encode([7u8; 16]));
        let err = decode_secret_key(&short).unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
        assert!(!err.to_string().contains(&short));
    }

    #[test]
    fn generated_keys_differ() {
        let a = generate_key();
        let b = generate_key();
        assert_ne!(a.verifying_key(), b.verifying_key());
        let sig = a.sign(b"payload");
        assert!(verify(&a.verifying_key(), b"payload", &sig));
    }

    #[test]
    fn fingerprint_is_stable() {
        let key = signer(1).verifying_key();
        assert_eq!(fingerprint(&key), fingerprint(&key));
        assert!(fingerprint(&key).starts_with("SHA256:"));
        assert_ne!(fingerprint(&key), fingerprint(&signer(2).verifying_key()));
    }
}
