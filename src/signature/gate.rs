//! Verification gate: the policy layer between raw requests and handlers.
//!
//! Per request the gate runs a two-stage pipeline:
//!
//! ```text
//! UNVERIFIED ──capture──▶ VerificationRequest ──evaluate──▶ Decision
//!   (path, headers,         (raw bytes, claimed              Bypass
//!    raw body bytes)         credentials)                    Forward { outcome }
//!                                                            Reject(Rejection)
//! ```
//!
//! Both stages are independent of any web framework. The HTTP adapter in
//! [`crate::server`] turns a [`Decision`] into a response or a forwarded
//! request. There is no retry state.
//!
//! Policy:
//! - `/health` and configured bypass paths are forwarded unconditionally.
//! - Internal errors (e.g. no shared secret configured) always reject with
//!   500, whatever `auto_reject` says.
//! - Any other failure rejects with 401 when `auto_reject` is set, and is
//!   otherwise forwarded with `valid = false`.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::keys::KeyProvider;
use super::outcome::{Reason, VerificationOutcome, VerifyError};
use super::public_key::PublicKeyVerifier;
use super::request::{HEALTH_PATH, Scheme, VerificationRequest};
use super::shared_secret::{self, SharedSecret};

/// Gate configuration, fixed at construction and shared read-only.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub scheme: Scheme,
    /// Only consulted under [`Scheme::SharedSecret`].
    pub secret: Option<SharedSecret>,
    pub auto_reject: bool,
    /// Exact request paths exempt from verification, in addition to `/health`.
    pub bypass_paths: BTreeSet<String>,
}

impl GateConfig {
    pub fn shared_secret(secret: Option<SharedSecret>) -> Self {
        Self {
            scheme: Scheme::SharedSecret,
            secret,
            auto_reject: true,
            bypass_paths: BTreeSet::new(),
        }
    }

    pub fn public_key() -> Self {
        Self {
            scheme: Scheme::PublicKey,
            secret: None,
            auto_reject: true,
            bypass_paths: BTreeSet::new(),
        }
    }

    pub fn with_auto_reject(mut self, auto_reject: bool) -> Self {
        self.auto_reject = auto_reject;
        self
    }

    pub fn with_bypass_path(mut self, path: impl Into<String>) -> Self {
        self.bypass_paths.insert(path.into());
        self
    }
}

/// What the hosting server should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Exempt path; forward untouched.
    Bypass,
    /// Forward to the handler, annotated with the outcome.
    Forward(VerificationOutcome),
    /// Respond immediately; the handler never sees the request.
    Reject(Rejection),
}

/// A protocol-level rejection: status plus a short JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub reason: Reason,
    pub message: String,
}

/// JSON body sent with a rejection.
#[derive(Debug, Serialize)]
pub struct RejectionBody<'a> {
    pub error: &'a str,
    pub message: &'a str,
}

impl Rejection {
    fn unauthorized(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            reason,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            reason: Reason::InternalError,
            message: message.into(),
        }
    }

    pub fn body(&self) -> RejectionBody<'_> {
        let error = if self.status == StatusCode::UNAUTHORIZED {
            "Unauthorized"
        } else {
            "Internal Server Error"
        };
        RejectionBody {
            error,
            message: &self.message,
        }
    }
}

enum Verifier {
    SharedSecret,
    PublicKey(PublicKeyVerifier),
}

pub struct VerificationGate {
    config: GateConfig,
    verifier: Verifier,
}

impl VerificationGate {
    /// Build a gate for the configured scheme.
    ///
    /// `provider` is required for [`Scheme::PublicKey`] and ignored otherwise.
    pub fn new(config: GateConfig, provider: Option<Arc<dyn KeyProvider>>) -> anyhow::Result<Self> {
        let verifier = match config.scheme {
            Scheme::SharedSecret => Verifier::SharedSecret,
            Scheme::PublicKey => {
                let provider = provider.ok_or_else(|| {
                    anyhow::anyhow!("public-key scheme requires a key provider")
                })?;
                Verifier::PublicKey(PublicKeyVerifier::new(provider))
            }
        };
        Ok(Self { config, verifier })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn scheme(&self) -> Scheme {
        self.config.scheme
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        path == HEALTH_PATH || self.config.bypass_paths.contains(path)
    }

    /// Stage one: freeze the raw bytes and credential headers.
    pub fn capture(&self, path: &str, headers: &HeaderMap, body: Bytes) -> VerificationRequest {
        VerificationRequest::from_headers(self.config.scheme, path, headers, body)
    }

    /// Stage two: verify and apply policy.
    pub async fn evaluate(&self, request: &VerificationRequest) -> Decision {
        if self.is_bypassed(request.path()) {
            debug!(path = %request.path(), "Verification bypassed");
            return Decision::Bypass;
        }

        let result = match &self.verifier {
            Verifier::SharedSecret => shared_secret::check(
                self.config.secret.as_ref(),
                request.body(),
                request.signature(),
            ),
            Verifier::PublicKey(verifier) => {
                verifier
                    .check(request.body(), request.signature(), request.key_id())
                    .await
            }
        };

        self.decide(request.path(), result)
    }

    fn decide(&self, path: &str, result: Result<(), VerifyError>) -> Decision {
        let error = match result {
            Ok(()) => {
                debug!(path = %path, scheme = %self.config.scheme, "Request signature verified");
                return Decision::Forward(VerificationOutcome::ok());
            }
            Err(e) => e,
        };

        let reason = error.reason();
        warn!(
            path = %path,
            scheme = %self.config.scheme,
            reason = %reason,
            auto_reject = self.config.auto_reject,
            "Request signature not verified: {}",
            error
        );

        if let VerifyError::InternalError(_) = error {
            let unconfigured =
                self.config.secret.is_none() && self.config.scheme == Scheme::SharedSecret;
            let message = if unconfigured {
                "Signature verification is not configured"
            } else {
                "Signature verification failed"
            };
            return Decision::Reject(Rejection::internal(message));
        }

        if !self.config.auto_reject {
            return Decision::Forward(VerificationOutcome::rejected(reason));
        }

        let message = match (reason, self.config.scheme) {
            (Reason::MissingCredential, Scheme::PublicKey) => {
                "Missing GitHub public key signature or key ID"
            }
            (Reason::MissingCredential, Scheme::SharedSecret) => "Missing signature",
            _ => "Invalid signature",
        };
        Decision::Reject(Rejection::unauthorized(reason, message))
    }
}
