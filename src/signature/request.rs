//! The immutable input to a verification attempt.

use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Header carrying the shared-secret HMAC (`sha256=<hex>`).
pub const HMAC_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the base64 public-key signature.
pub const PUBLIC_KEY_SIGNATURE_HEADER: &str = "x-github-public-key-signature";

/// Header naming which key in the authority's key set signed the request.
pub const PUBLIC_KEY_IDENTIFIER_HEADER: &str = "x-github-public-key-identifier";

/// Liveness path. Always exempt from verification.
pub const HEALTH_PATH: &str = "/health";

/// Which verification scheme protects the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    SharedSecret,
    PublicKey,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::SharedSecret => "shared-secret",
            Scheme::PublicKey => "public-key",
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "shared-secret" => Ok(Scheme::SharedSecret),
            "public-key" => Ok(Scheme::PublicKey),
            other => anyhow::bail!(
                "Unknown scheme: {} (expected shared-secret or public-key)",
                other
            ),
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw request bytes plus the credentials that claim to cover them.
///
/// `body` must be exactly what the sender transmitted. It is captured
/// before any parsing, and nothing in this crate re-serializes it.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    body: Bytes,
    signature: Option<String>,
    key_id: Option<String>,
    path: String,
}

impl VerificationRequest {
    pub fn new(
        path: impl Into<String>,
        body: Bytes,
        signature: Option<String>,
        key_id: Option<String>,
    ) -> Self {
        Self {
            body,
            signature,
            key_id,
            path: path.into(),
        }
    }

    /// Capture a request for `scheme`, pulling the credential headers it uses.
    ///
    /// Empty header values are treated as absent. Header values that are not
    /// visible ASCII are kept lossily so they fail comparison rather than
    /// vanish into a "missing" outcome.
    pub fn from_headers(scheme: Scheme, path: &str, headers: &HeaderMap, body: Bytes) -> Self {
        let (signature, key_id) = match scheme {
            Scheme::SharedSecret => (header_value(headers, HMAC_SIGNATURE_HEADER), None),
            Scheme::PublicKey => (
                header_value(headers, PUBLIC_KEY_SIGNATURE_HEADER),
                header_value(headers, PUBLIC_KEY_IDENTIFIER_HEADER),
            ),
        };
        Self::new(path, body, signature, key_id)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .filter(|v| !v.is_empty())
}
