//! Shared-secret HMAC verification (`x-hub-signature-256`).
//!
//! The sender computes `HMAC-SHA256(secret, raw_body)` and sends it as
//! `sha256=<lowercase hex>`. We recompute the expected header over the
//! exact bytes we received and compare in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::outcome::VerifyError;
use super::request::HMAC_SIGNATURE_HEADER;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Process-lifetime shared secret. Never printed, never logged.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for SharedSecret {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for SharedSecret {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Compute the `sha256=<hex>` header value for `body`.
pub fn compute_signature(secret: &SharedSecret, body: &[u8]) -> Result<String, VerifyError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VerifyError::InternalError(format!("HMAC key initialization: {}", e)))?;
    mac.update(body);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a signature header against the body, reporting why it failed.
///
/// An absent secret is a server-side misconfiguration and surfaces as
/// [`VerifyError::InternalError`]. An absent header is the caller's fault.
pub fn check(
    secret: Option<&SharedSecret>,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), VerifyError> {
    let secret = secret.ok_or_else(|| {
        VerifyError::InternalError("shared secret is not configured".to_string())
    })?;
    let header = signature_header.ok_or(VerifyError::MissingCredential(HMAC_SIGNATURE_HEADER))?;

    let expected = compute_signature(secret, body)?;

    // Length is public (always 71 bytes for a well-formed header).
    if header.len() != expected.len() {
        return Err(VerifyError::MalformedCredential(format!(
            "signature header has length {}, expected {}",
            header.len(),
            expected.len()
        )));
    }

    if bool::from(header.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(VerifyError::InvalidSignature)
    }
}

/// Verify a shared-secret signature. Returns `false` on every failure path.
pub fn verify(secret: Option<&SharedSecret>, body: &[u8], signature_header: Option<&str>) -> bool {
    match check(secret, body, signature_header) {
        Ok(()) => {
            debug!(body_len = body.len(), "HMAC signature verified");
            true
        }
        Err(e) => {
            warn!(reason = %e.reason(), "HMAC signature rejected: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"a":1}"#;
    const EXPECTED: &str =
        "sha256=24554f6285363dd1791a2b1840bbbb4e4608c0a6ed1d48551ea83184f4e26e42";

    fn secret() -> SharedSecret {
        SharedSecret::from("abc123")
    }

    #[test]
    fn computes_known_signature() {
        assert_eq!(compute_signature(&secret(), BODY).unwrap(), EXPECTED);
    }

    #[test]
    fn matches_published_github_example() {
        let secret = SharedSecret::from("It's a Secret to Everybody");
        assert_eq!(
            compute_signature(&secret, b"Hello, World!").unwrap(),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn accepts_correct_signature() {
        assert!(verify(Some(&secret()), BODY, Some(EXPECTED)));
    }

    #[test]
    fn any_body_bit_flip_is_rejected() {
        for i in 0..BODY.len() * 8 {
            let mut body = BODY.to_vec();
            body[i / 8] ^= 1 << (i % 8);
            assert!(
                !verify(Some(&secret()), &body, Some(EXPECTED)),
                "bit {} flip accepted",
                i
            );
        }
    }

    #[test]
    fn any_signature_bit_flip_is_rejected() {
        // Low seven bits only, so the header stays ASCII.
        for i in 0..EXPECTED.len() {
            for bit in 0..7 {
                let mut sig = EXPECTED.as_bytes().to_vec();
                sig[i] ^= 1 << bit;
                let sig = String::from_utf8(sig).unwrap();
                assert!(!verify(Some(&secret()), BODY, Some(&sig)));
            }
        }
    }

    #[test]
    fn wrong_length_is_false_not_error() {
        let short = &EXPECTED[..EXPECTED.len() - 1];
        assert!(!verify(Some(&secret()), BODY, Some(short)));
        assert!(matches!(
            check(Some(&secret()), BODY, Some(short)),
            Err(VerifyError::MalformedCredential(_))
        ));
    }

    #[test]
    fn missing_header_or_secret_is_false() {
        assert!(!verify(Some(&secret()), BODY, None));
        assert!(!verify(None, BODY, Some(EXPECTED)));
        assert!(matches!(
            check(None, BODY, Some(EXPECTED)),
            Err(VerifyError::InternalError(_))
        ));
        assert!(matches!(
            check(Some(&secret()), BODY, None),
            Err(VerifyError::MissingCredential(_))
        ));
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        let upper = format!("sha256={}", EXPECTED[7..].to_uppercase());
        assert!(!verify(Some(&secret()), BODY, Some(&upper)));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", secret());
        assert!(!rendered.contains("abc123"));
    }
}
