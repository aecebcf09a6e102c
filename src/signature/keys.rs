//! Key sets published by a remote trust authority.
//!
//! The authority serves a JSON document:
//!
//! ```json
//! {
//!   "public_keys": [
//!     { "key_identifier": "90a4…", "key": "-----BEGIN PUBLIC KEY-----…", "is_current": true }
//!   ]
//! }
//! ```
//!
//! Each `key` is an SPKI PEM. The algorithm is read from the key itself:
//! P-256 keys verify ECDSA/SHA-256 signatures, RSA keys verify
//! PKCS#1 v1.5 RSA/SHA-256 signatures, and Ed25519 keys verify Ed25519.
//!
//! By default every call to [`KeyProvider::fetch_key_set`] goes to the
//! network. A short TTL cache can be enabled with
//! [`RemoteKeyConfig::cache_ttl`]; failures are never cached.

use async_trait::async_trait;
use ed25519_dalek::pkcs8::DecodePublicKey as _;
use p256::pkcs8::DecodePublicKey as _;
use rsa::pkcs8::DecodePublicKey as _;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Key authority used by GitHub Copilot extensions.
pub const DEFAULT_KEYS_URL: &str = "https://api.github.com/meta/public_keys/copilot_api";

/// Sent with every key fetch.
pub const DEFAULT_USER_AGENT: &str = concat!("hookgate/", env!("CARGO_PKG_VERSION"));

/// Bound on a single key fetch, connect through body.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the key set could not be obtained.
///
/// All variants are treated the same by callers (fail closed); they are
/// distinct only so logs say what happened.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid key document from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("key authority {0} returned no usable keys")]
    EmptyKeySet(String),
}

/// Signature algorithm implied by a key's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    EcdsaP256Sha256,
    RsaSha256,
    Ed25519,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256Sha256 => "ECDSA-P256-SHA256",
            KeyAlgorithm::RsaSha256 => "RSA-SHA256",
            KeyAlgorithm::Ed25519 => "Ed25519",
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed public key material.
#[derive(Debug, Clone)]
pub enum PublicKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    /// PKCS#1 v1.5 with SHA-256.
    Rsa(rsa::RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Parse an SPKI PEM, trying each supported algorithm in turn.
    pub fn from_pem(pem: &str) -> Option<Self> {
        let pem = pem.trim();
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Some(PublicKey::EcdsaP256(key));
        }
        if let Ok(key) = rsa::RsaPublicKey::from_public_key_pem(pem) {
            return Some(PublicKey::Rsa(key));
        }
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_pem(pem) {
            return Some(PublicKey::Ed25519(key));
        }
        None
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::EcdsaP256(_) => KeyAlgorithm::EcdsaP256Sha256,
            PublicKey::Rsa(_) => KeyAlgorithm::RsaSha256,
            PublicKey::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeySetEntry {
    pub identifier: String,
    pub key: PublicKey,
    /// Original PEM, kept for display.
    pub material: String,
    pub is_current: bool,
}

impl KeySetEntry {
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.key.algorithm()
    }
}

/// Ordered set of keys, as published by the authority.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    entries: Vec<KeySetEntry>,
}

impl KeySet {
    pub fn new(entries: Vec<KeySetEntry>) -> Self {
        Self { entries }
    }

    /// Exact, case-sensitive lookup by identifier.
    pub fn find(&self, identifier: &str) -> Option<&KeySetEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    pub fn entries(&self) -> &[KeySetEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Deserialize)]
struct KeysDocument {
    public_keys: Vec<WireKey>,
}

#[derive(Debug, Deserialize)]
struct WireKey {
    key_identifier: String,
    key: String,
    #[serde(default)]
    is_current: bool,
}

/// Decode an authority response body into a [`KeySet`].
///
/// Entries whose key cannot be parsed are dropped with a warning. A
/// document with no usable entries is an error.
pub fn parse_key_set(url: &str, body: &[u8]) -> Result<KeySet, KeyFetchError> {
    let doc: KeysDocument = serde_json::from_slice(body).map_err(|e| KeyFetchError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::with_capacity(doc.public_keys.len());
    for wire in doc.public_keys {
        if wire.key_identifier.is_empty() {
            warn!(url = %url, "Skipping key with empty identifier");
            continue;
        }
        match PublicKey::from_pem(&wire.key) {
            Some(key) => entries.push(KeySetEntry {
                identifier: wire.key_identifier,
                key,
                material: wire.key,
                is_current: wire.is_current,
            }),
            None => warn!(
                url = %url,
                key_id = %wire.key_identifier,
                "Skipping key with unsupported or unparseable material"
            ),
        }
    }

    if entries.is_empty() {
        return Err(KeyFetchError::EmptyKeySet(url.to_string()));
    }
    Ok(KeySet::new(entries))
}

/// Source of the current key set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn fetch_key_set(&self) -> Result<KeySet, KeyFetchError>;
}

/// Configuration for [`RemoteKeyProvider`].
#[derive(Debug, Clone)]
pub struct RemoteKeyConfig {
    pub url: String,
    pub user_agent: String,
    /// Applies to the whole fetch. A timeout is an upstream failure.
    pub timeout: Duration,
    /// `None` fetches on every call.
    pub cache_ttl: Option<Duration>,
}

impl Default for RemoteKeyConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_KEYS_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            cache_ttl: None,
        }
    }
}

struct CachedKeySet {
    keys: KeySet,
    expires_at: Instant,
}

/// Fetches key sets over HTTPS from the configured authority.
pub struct RemoteKeyProvider {
    config: RemoteKeyConfig,
    client: reqwest::Client,
    cache: RwLock<HashMap<String, CachedKeySet>>,
}

impl RemoteKeyProvider {
    pub fn new(config: RemoteKeyConfig) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| KeyFetchError::Client(e.to_string()))?;

        Ok(Self {
            config,
            client,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn get_cached(&self) -> Option<KeySet> {
        self.config.cache_ttl?;
        let cache = self.cache.read().await;
        cache.get(&self.config.url).and_then(|cached| {
            if cached.expires_at > Instant::now() {
                Some(cached.keys.clone())
            } else {
                None
            }
        })
    }

    async fn store(&self, keys: &KeySet) {
        let Some(ttl) = self.config.cache_ttl else {
            return;
        };
        let mut cache = self.cache.write().await;
        cache.insert(
            self.config.url.clone(),
            CachedKeySet {
                keys: keys.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn fetch_remote(&self) -> Result<KeySet, KeyFetchError> {
        let url = &self.config.url;
        debug!(url = %url, "Fetching key set");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyFetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        parse_key_set(url, &body)
    }
}

fn classify(url: &str, e: reqwest::Error) -> KeyFetchError {
    if e.is_timeout() {
        KeyFetchError::Timeout(url.to_string())
    } else {
        KeyFetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl KeyProvider for RemoteKeyProvider {
    async fn fetch_key_set(&self) -> Result<KeySet, KeyFetchError> {
        if let Some(keys) = self.get_cached().await {
            debug!(url = %self.config.url, keys = keys.len(), "Key set served from cache");
            return Ok(keys);
        }

        let keys = self.fetch_remote().await?;
        debug!(url = %self.config.url, keys = keys.len(), "Key set fetched");
        self.store(&keys).await;
        Ok(keys)
    }
}


#[cfg(test)]
mod tests {
    use super::test_keys::*;
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer, cache_ttl: Option<Duration>) -> RemoteKeyProvider {
        RemoteKeyProvider::new(RemoteKeyConfig {
            url: format!("{}/meta/public_keys/copilot_api", server.uri()),
            user_agent: "hookgate-test".to_string(),
            timeout: Duration::from_millis(500),
            cache_ttl,
        })
        .unwrap()
    }

    #[test]
    fn parses_document_and_detects_algorithms() {
        let doc = document(&[("k1", p256_pem(1)), ("k2", ed25519_pem(2)), ("rsa1", rsa_pem())]);
        let keys = parse_key_set("test", doc.to_string().as_bytes()).unwrap();

        assert_eq!(keys.len(), 3);
        assert_eq!(keys.entries()[0].identifier, "k1");
        assert!(keys.entries()[0].is_current);
        assert_eq!(
            keys.find("k1").unwrap().algorithm(),
            KeyAlgorithm::EcdsaP256Sha256
        );
        assert_eq!(keys.find("k2").unwrap().algorithm(), KeyAlgorithm::Ed25519);
        assert_eq!(keys.find("rsa1").unwrap().algorithm(), KeyAlgorithm::RsaSha256);
        assert_eq!(KeyAlgorithm::RsaSha256.to_string(), "RSA-SHA256");
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let doc = document(&[("Key-One", p256_pem(1))]);
        let keys = parse_key_set("test", doc.to_string().as_bytes()).unwrap();

        assert!(keys.find("Key-One").is_some());
        assert!(keys.find("key-one").is_none());
        assert!(keys.find("Key").is_none());
        assert!(keys.find("Key-One-2").is_none());
    }

    #[test]
    fn unparseable_keys_are_dropped() {
        let doc = document(&[("bad", "not a pem".to_string()), ("k1", p256_pem(1))]);
        let keys = parse_key_set("test", doc.to_string().as_bytes()).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.find("bad").is_none());
    }

    #[test]
    fn empty_or_missing_key_list_is_an_error() {
        let empty = parse_key_set("test", br#"{"public_keys": []}"#);
        assert!(matches!(empty, Err(KeyFetchError::EmptyKeySet(_))));

        let missing = parse_key_set("test", br#"{"keys": []}"#);
        assert!(matches!(missing, Err(KeyFetchError::Decode { .. })));

        let garbage = parse_key_set("test", b"<html>");
        assert!(matches!(garbage, Err(KeyFetchError::Decode { .. })));
    }

    #[tokio::test]
    async fn fetches_with_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/public_keys/copilot_api"))
            .and(header("user-agent", "hookgate-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(document(&[("k1", p256_pem(1))])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let keys = provider_for(&server, None).fetch_key_set().await.unwrap();
        assert!(keys.find("k1").is_some());
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = provider_for(&server, None).fetch_key_set().await;
        assert!(matches!(
            result,
            Err(KeyFetchError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn stalled_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(document(&[("k1", p256_pem(1))]))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let result = provider_for(&server, None).fetch_key_set().await;
        assert!(matches!(result, Err(KeyFetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn without_cache_every_call_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(document(&[("k1", p256_pem(1))])),
            )
            .expect(3)
            .mount(&server)
            .await;

        let provider = provider_for(&server, None);
        for _ in 0..3 {
            provider.fetch_key_set().await.unwrap();
        }
    }

    #[tokio::test]
    async fn cache_serves_repeat_calls_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(document(&[("k1", p256_pem(1))])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, Some(Duration::from_secs(60)));
        for _ in 0..3 {
            assert!(provider.fetch_key_set().await.unwrap().find("k1").is_some());
        }
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(document(&[("k1", p256_pem(1))])),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server, Some(Duration::from_secs(60)));
        assert!(provider.fetch_key_set().await.is_err());
        assert!(provider.fetch_key_set().await.is_ok());
    }
}
