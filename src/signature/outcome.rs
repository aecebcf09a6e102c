//! Verification outcomes and the error taxonomy behind them.
//!
//! Verifiers never return [`VerifyError`] across their public contract.
//! Internally every failure path is expressed as a `VerifyError`, logged,
//! and then collapsed into a [`VerificationOutcome`] with `valid = false`.

use serde::Serialize;
use thiserror::Error;

/// Why a request was (or was not) verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    Ok,
    MissingCredential,
    MalformedCredential,
    BadSignature,
    UnknownKey,
    UpstreamFailure,
    InternalError,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Ok => "ok",
            Reason::MissingCredential => "missing-credential",
            Reason::MalformedCredential => "malformed-credential",
            Reason::BadSignature => "bad-signature",
            Reason::UnknownKey => "unknown-key",
            Reason::UpstreamFailure => "upstream-failure",
            Reason::InternalError => "internal-error",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single verification attempt.
///
/// Produced once per request and consumed by the gate. There is no way to
/// build a valid outcome with a failure reason or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    valid: bool,
    reason: Reason,
}

impl VerificationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: Reason::Ok,
        }
    }

    pub fn rejected(reason: Reason) -> Self {
        // An "ok" rejection makes no sense; treat it as a bad signature.
        let reason = if reason == Reason::Ok {
            Reason::BadSignature
        } else {
            reason
        };
        Self {
            valid: false,
            reason,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }
}

impl From<Result<(), VerifyError>> for VerificationOutcome {
    fn from(result: Result<(), VerifyError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::rejected(e.reason()),
        }
    }
}

/// Everything that can go wrong while verifying a request.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    #[error("signature does not match")]
    InvalidSignature,

    #[error("no key with identifier {0:?} in the current key set")]
    UnknownKey(String),

    #[error("key authority unavailable: {0}")]
    UpstreamFailure(#[from] super::keys::KeyFetchError),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl VerifyError {
    pub fn reason(&self) -> Reason {
        match self {
            VerifyError::MissingCredential(_) => Reason::MissingCredential,
            VerifyError::MalformedCredential(_) => Reason::MalformedCredential,
            VerifyError::InvalidSignature => Reason::BadSignature,
            VerifyError::UnknownKey(_) => Reason::UnknownKey,
            VerifyError::UpstreamFailure(_) => Reason::UpstreamFailure,
            VerifyError::InternalError(_) => Reason::InternalError,
        }
    }
}
