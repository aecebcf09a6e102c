//! Public-key verification against a rotated, remotely published key set.
//!
//! Verification flow for one request:
//!
//! 1. Shape checks (non-empty UTF-8 body, signature, key identifier;
//!    signature must be valid base64). Nothing touches the network yet.
//! 2. Fetch the key set from the [`KeyProvider`]. Any failure: invalid.
//! 3. Exact lookup of the key identifier. Absent: invalid.
//! 4. Verify the signature over the raw body bytes with the matched key.
//!
//! Every failure converges on `false`; nothing here panics or propagates.

use base64::Engine;
use std::sync::Arc;
use tracing::{debug, warn};

use super::keys::{KeyProvider, PublicKey};
use super::outcome::VerifyError;
use super::request::{PUBLIC_KEY_IDENTIFIER_HEADER, PUBLIC_KEY_SIGNATURE_HEADER};

pub struct PublicKeyVerifier {
    provider: Arc<dyn KeyProvider>,
}

impl PublicKeyVerifier {
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self { provider }
    }

    /// Verify `signature_b64` over `raw_body` using key `key_id`.
    pub async fn verify(&self, raw_body: &[u8], signature_b64: &str, key_id: &str) -> bool {
        match self.check(raw_body, Some(signature_b64), Some(key_id)).await {
            Ok(()) => {
                debug!(key_id = %key_id, "Public-key signature verified");
                true
            }
            Err(e) => {
                warn!(
                    key_id = %key_id,
                    reason = %e.reason(),
                    "Public-key signature rejected: {}",
                    e
                );
                false
            }
        }
    }

    /// Same as [`verify`](Self::verify), but reports why verification failed.
    pub async fn check(
        &self,
        raw_body: &[u8],
        signature_b64: Option<&str>,
        key_id: Option<&str>,
    ) -> Result<(), VerifyError> {
        let signature_b64 = signature_b64
            .filter(|s| !s.is_empty())
            .ok_or(VerifyError::MissingCredential(PUBLIC_KEY_SIGNATURE_HEADER))?;
        let key_id = key_id
            .filter(|s| !s.is_empty())
            .ok_or(VerifyError::MissingCredential(PUBLIC_KEY_IDENTIFIER_HEADER))?;

        if raw_body.is_empty() {
            return Err(VerifyError::MalformedCredential("request body is empty".to_string()));
        }
        if std::str::from_utf8(raw_body).is_err() {
            return Err(VerifyError::MalformedCredential(
                "request body is not valid UTF-8".to_string(),
            ));
        }

        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| {
                VerifyError::MalformedCredential(format!("signature is not base64: {}", e))
            })?;

        let keys = self.provider.fetch_key_set().await?;
        let entry = keys
            .find(key_id)
            .ok_or_else(|| VerifyError::UnknownKey(key_id.to_string()))?;

        verify_with_key(&entry.key, raw_body, &signature)
    }
}

fn verify_with_key(key: &PublicKey, message: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
    match key {
        PublicKey::EcdsaP256(vk) => {
            use p256::ecdsa::signature::Verifier;

            let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| {
                VerifyError::MalformedCredential(
                    "signature is not a DER ECDSA signature".to_string(),
                )
            })?;
            vk.verify(message, &sig).map_err(|_| VerifyError::InvalidSignature)
        }
        PublicKey::Rsa(key) => {
            use rsa::signature::Verifier;

            let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| {
                VerifyError::MalformedCredential("signature is not an RSA signature".to_string())
            })?;
            rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(key.clone())
                .verify(message, &sig)
                .map_err(|_| VerifyError::InvalidSignature)
        }
        PublicKey::Ed25519(vk) => {
            let sig = ed25519_dalek::Signature::from_slice(signature).map_err(|_| {
                VerifyError::MalformedCredential("signature is not 64 bytes".to_string())
            })?;
            vk.verify_strict(message, &sig).map_err(|_| VerifyError::InvalidSignature)
        }
    }
}
