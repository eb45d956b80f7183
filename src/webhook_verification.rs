//! HMAC signatures on inbound webhook pushes.
//!
//! Withings pushes are authenticated with an HMAC-SHA256 of the raw request
//! body, hex-encoded in a header. Comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Header carrying the hex-encoded HMAC-SHA256 of the request body
pub const WITHINGS_SIGNATURE_HEADER: &str = "X-Curie-Signature";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature header is missing or empty")]
    Missing,
    #[error("signature is not valid hex")]
    MalformedHex,
    #[error("signature does not match the request body")]
    Mismatch,
}

/// Check a hex-encoded HMAC-SHA256 `signature` under `secret` against `body`
pub fn verify_withings_signature(
    body: &[u8],
    signature: Option<&str>,
    secret: &str,
) -> Result<(), SignatureError> {
    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let provided = hex::decode(signature).map_err(|_| SignatureError::MalformedHex)?;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    // Slice ct_eq handles the length mismatch case without branching on
    // content.
    if expected.as_slice().ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signed_push_is_accepted() {
        let body = br#"{"userid":"42"}"#;
        let signature = sign(body, "hook-secret");
        assert!(verify_withings_signature(body, Some(&signature), "hook-secret").is_ok());
    }

    #[test]
    fn missing_or_empty_header_is_rejected() {
        assert!(matches!(
            verify_withings_signature(b"{}", None, "hook-secret"),
            Err(SignatureError::Missing)
        ));
        assert!(matches!(
            verify_withings_signature(b"{}", Some(""), "hook-secret"),
            Err(SignatureError::Missing)
        ));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        assert!(matches!(
            verify_withings_signature(b"{}", Some("zz-not-hex"), "hook-secret"),
            Err(SignatureError::MalformedHex)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = br#"{"userid":"42"}"#;
        let signature = sign(body, "some-other-secret");
        assert!(matches!(
            verify_withings_signature(body, Some(&signature), "hook-secret"),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let signature = sign(br#"{"userid":"42"}"#, "hook-secret");
        assert!(matches!(
            verify_withings_signature(br#"{"userid":"43"}"#, Some(&signature), "hook-secret"),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let body = br#"{"userid":"42"}"#;
        let full = sign(body, "hook-secret");
        let truncated = &full[..16];
        assert!(matches!(
            verify_withings_signature(body, Some(truncated), "hook-secret"),
            Err(SignatureError::Mismatch)
        ));
    }
}
