//! # Signature verification
//!
//! Authenticates webhook-style callbacks before they reach any handler.
//! Two independent schemes are supported:
//!
//! - **Shared secret**: `x-hub-signature-256: sha256=<hex HMAC-SHA256>` over
//!   the raw body, compared in constant time.
//! - **Public key**: `x-github-public-key-signature` (base64) and
//!   `x-github-public-key-identifier`. The key set is fetched from a remote
//!   authority and the key is selected by exact identifier.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ gate.rs        capture → evaluate → Decision                 │
//! │                bypass paths, auto-reject, 401/500 policy     │
//! ├────────────────────────┬─────────────────────────────────────┤
//! │ shared_secret.rs       │ public_key.rs                       │
//! │ HMAC-SHA256, ct-eq     │ base64 sig, exact key lookup,       │
//! │                        │ ECDSA P-256 / RSA / Ed25519         │
//! │                        ├─────────────────────────────────────┤
//! │                        │ keys.rs  KeyProvider, remote fetch, │
//! │                        │          timeout, optional TTL cache│
//! ├────────────────────────┴─────────────────────────────────────┤
//! │ request.rs  raw bytes + headers   outcome.rs  reasons/errors │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure model
//!
//! Fail closed. Verifiers never raise across their contract: every
//! internal error becomes `false` (or a non-valid [`VerificationOutcome`])
//! plus a log line. Only the gate turns an outcome into a protocol-level
//! rejection, and an ambiguous result is never treated as verified.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hookgate::signature::{Decision, GateConfig, SharedSecret, VerificationGate};
//!
//! let gate = VerificationGate::new(
//!     GateConfig::shared_secret(Some(SharedSecret::from(secret))),
//!     None,
//! )?;
//! let request = gate.capture(path, &headers, raw_body);
//! match gate.evaluate(&request).await {
//!     Decision::Bypass | Decision::Forward(_) => { /* hand to the handler */ }
//!     Decision::Reject(rejection) => { /* respond with rejection.status */ }
//! }
//! ```

mod gate;
mod keys;
mod outcome;
mod public_key;
mod request;
mod shared_secret;

// ── Gate ────────────────────────────────────────────────────────────

pub use self::gate::{Decision, GateConfig, Rejection, RejectionBody, VerificationGate};

// ── Requests & outcomes ─────────────────────────────────────────────

pub use self::outcome::{Reason, VerificationOutcome, VerifyError};
pub use self::request::{
    HEALTH_PATH, HMAC_SIGNATURE_HEADER, PUBLIC_KEY_IDENTIFIER_HEADER, PUBLIC_KEY_SIGNATURE_HEADER,
    Scheme, VerificationRequest,
};

// ── Shared secret ───────────────────────────────────────────────────

pub use self::shared_secret::{
    SIGNATURE_PREFIX, SharedSecret, check as check_shared_secret, compute_signature,
};

/// Verify a `sha256=` header over `body`. `false` on every failure path.
pub fn verify_shared_secret(
    secret: Option<&SharedSecret>,
    body: &[u8],
    signature_header: Option<&str>,
) -> bool {
    shared_secret::verify(secret, body, signature_header)
}

// ── Public keys ─────────────────────────────────────────────────────

pub use self::keys::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_KEYS_URL, DEFAULT_USER_AGENT, KeyAlgorithm, KeyFetchError,
    KeyProvider, KeySet, KeySetEntry, PublicKey, RemoteKeyConfig, RemoteKeyProvider,
    parse_key_set,
};
pub use self::public_key::PublicKeyVerifier;

#[cfg(test)]
pub(crate) use self::keys::{MockKeyProvider, test_keys};
