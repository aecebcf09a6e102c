use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::Paths;
use crate::signature::{
    DEFAULT_KEYS_URL, DEFAULT_USER_AGENT, GateConfig, RemoteKeyConfig, Scheme, SharedSecret,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    /// File this config was loaded from (not serialized)
    #[serde(skip)]
    pub source: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,

    /// Largest request body accepted for verification (bytes)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Install the verification gate (default: true).
    ///
    /// Disabling it is for local debugging only; every request is then
    /// forwarded unverified.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// "shared-secret" (x-hub-signature-256) or "public-key"
    #[serde(default = "default_scheme")]
    pub scheme: Scheme,

    /// Shared secret, usually an env reference like "${COPILOT_SECRET}".
    /// An env reference that does not resolve counts as unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Respond 401 on failure instead of forwarding with valid=false
    #[serde(default = "default_true")]
    pub auto_reject: bool,

    /// Exact paths exempt from verification (/health always is)
    #[serde(default)]
    pub bypass_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Key authority endpoint
    #[serde(default = "default_keys_url")]
    pub url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Key fetch timeout in milliseconds
    #[serde(default = "default_keys_timeout_ms")]
    pub timeout_ms: u64,

    /// Cache fetched key sets for this many seconds (0 = fetch every request)
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Append logs to this file instead of stderr.
    /// Relative paths are resolved against the state logs directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_max_body_bytes() -> usize {
    102_400 // 100kb
}
fn default_scheme() -> Scheme {
    Scheme::SharedSecret
}
fn default_keys_url() -> String {
    DEFAULT_KEYS_URL.to_string()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_keys_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            scheme: default_scheme(),
            secret: None,
            auto_reject: default_true(),
            bypass_paths: Vec::new(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            url: default_keys_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_keys_timeout_ms(),
            cache_ttl_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load from the default location, creating it from the template on first run.
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        paths.ensure_dirs()?;
        let path = paths.config_file();

        if !path.exists() {
            let config = Config {
                paths,
                source: Some(path),
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let mut config = Self::parse_file(&path)?;
        config.paths = paths;
        Ok(config)
    }

    /// Load from an explicit file. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.paths = Paths::resolve()?;
        Ok(config)
    }

    /// `load_from` when a path was given on the command line, `load` otherwise.
    pub fn load_with_override(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                let expanded = shellexpand::tilde(p);
                Self::load_from(Path::new(expanded.as_ref()))
            }
            None => Self::load(),
        }
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Path that `save` writes to.
    pub fn file_path(&self) -> PathBuf {
        self.source
            .clone()
            .unwrap_or_else(|| self.paths.config_file())
    }

    pub fn save(&self) -> Result<()> {
        let path = self.file_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.file_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    /// The shared secret with env references resolved. Never logged.
    pub fn shared_secret(&self) -> Option<SharedSecret> {
        self.verification
            .secret
            .as_deref()
            .and_then(expand_env)
            .filter(|s| !s.is_empty())
            .map(SharedSecret::from)
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            scheme: self.verification.scheme,
            secret: match self.verification.scheme {
                Scheme::SharedSecret => self.shared_secret(),
                Scheme::PublicKey => None,
            },
            auto_reject: self.verification.auto_reject,
            bypass_paths: self
                .verification
                .bypass_paths
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect::<BTreeSet<_>>(),
        }
    }

    pub fn key_config(&self) -> RemoteKeyConfig {
        RemoteKeyConfig {
            url: self.keys.url.clone(),
            user_agent: self.keys.user_agent.clone(),
            timeout: Duration::from_millis(self.keys.timeout_ms),
            cache_ttl: (self.keys.cache_ttl_secs > 0)
                .then(|| Duration::from_secs(self.keys.cache_ttl_secs)),
        }
    }

    /// Log file location, if file logging is configured.
    pub fn log_file(&self) -> Option<PathBuf> {
        let file = self.logging.file.as_deref()?.trim();
        if file.is_empty() {
            return None;
        }
        let path = PathBuf::from(shellexpand::tilde(file).as_ref());
        if path.is_absolute() {
            Some(path)
        } else {
            Some(self.paths.logs_dir().join(path))
        }
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["server", "max_body_bytes"] => Ok(self.server.max_body_bytes.to_string()),
            ["verification", "enabled"] => Ok(self.verification.enabled.to_string()),
            ["verification", "scheme"] => Ok(self.verification.scheme.to_string()),
            ["verification", "secret"] => Ok(match self.shared_secret() {
                Some(_) => "<set>".to_string(),
                None => "<unset>".to_string(),
            }),
            ["verification", "auto_reject"] => Ok(self.verification.auto_reject.to_string()),
            ["verification", "bypass_paths"] => Ok(self.verification.bypass_paths.join(",")),
            ["keys", "url"] => Ok(self.keys.url.clone()),
            ["keys", "user_agent"] => Ok(self.keys.user_agent.clone()),
            ["keys", "timeout_ms"] => Ok(self.keys.timeout_ms.to_string()),
            ["keys", "cache_ttl_secs"] => Ok(self.keys.cache_ttl_secs.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "format"] => Ok(match self.logging.format {
                LogFormat::Pretty => "pretty".to_string(),
                LogFormat::Json => "json".to_string(),
            }),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "port"] => self.server.port = value.parse()?,
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["server", "max_body_bytes"] => self.server.max_body_bytes = value.parse()?,
            ["verification", "enabled"] => self.verification.enabled = value.parse()?,
            ["verification", "scheme"] => self.verification.scheme = value.parse()?,
            ["verification", "secret"] => {
                self.verification.secret = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            ["verification", "auto_reject"] => self.verification.auto_reject = value.parse()?,
            ["verification", "bypass_paths"] => {
                self.verification.bypass_paths = value
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            }
            ["keys", "url"] => self.keys.url = value.to_string(),
            ["keys", "user_agent"] => self.keys.user_agent = value.to_string(),
            ["keys", "timeout_ms"] => self.keys.timeout_ms = value.parse()?,
            ["keys", "cache_ttl_secs"] => self.keys.cache_ttl_secs = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "format"] => {
                self.logging.format = match value {
                    "pretty" => LogFormat::Pretty,
                    "json" => LogFormat::Json,
                    other => {
                        anyhow::bail!("Unknown log format: {} (expected pretty or json)", other)
                    }
                }
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

/// Resolve `${VAR}` / `$VAR` references.
///
/// Unlike a plain template expansion, an unresolved reference yields `None`
/// so a literal "${COPILOT_SECRET}" can never end up as the HMAC key.
fn expand_env(s: &str) -> Option<String> {
    expand_env_with(s, |name| std::env::var(name).ok())
}

fn expand_env_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        lookup(var_name)
    } else if let Some(var_name) = s.strip_prefix('$') {
        lookup(var_name)
    } else {
        Some(s.to_string())
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# hookgate configuration
# Auto-created on first run. Edit as needed.

[server]
port = 3000
bind = "127.0.0.1"
# max_body_bytes = 102400

[verification]
# enabled = true                  # false forwards everything unverified (debug only)
# "shared-secret" checks x-hub-signature-256 against the secret below.
# "public-key" checks x-github-public-key-signature against the [keys] authority.
scheme = "shared-secret"
secret = "${COPILOT_SECRET}"
auto_reject = true
# bypass_paths = ["/ready"]      # /health is always exempt

[keys]
# url = "https://api.github.com/meta/public_keys/copilot_api"
# timeout_ms = 5000
# cache_ttl_secs = 0              # 0 = fetch the key set on every request

[logging]
level = "info"
# format = "json"                 # pretty | json
# file = "hookgate.log"           # relative to the state logs directory
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.verification.scheme, Scheme::SharedSecret);
        assert!(config.verification.auto_reject);
        assert_eq!(config.keys.url, DEFAULT_KEYS_URL);
        assert_eq!(config.keys.cache_ttl_secs, 0);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parses_public_key_section() {
        let config: Config = toml::from_str(
            r#"
            [verification]
            scheme = "public-key"
            auto_reject = false
            bypass_paths = ["/ready", " ", "/metrics"]

            [keys]
            url = "https://keys.example.test/keys"
            timeout_ms = 250
            cache_ttl_secs = 30
            "#,
        )
        .unwrap();

        let gate = config.gate_config();
        assert_eq!(gate.scheme, Scheme::PublicKey);
        assert!(!gate.auto_reject);
        assert!(gate.secret.is_none());
        assert_eq!(gate.bypass_paths.len(), 2);
        assert!(gate.bypass_paths.contains("/ready"));

        let keys = config.key_config();
        assert_eq!(keys.timeout, Duration::from_millis(250));
        assert_eq!(keys.cache_ttl, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let config = Config::default();
        assert_eq!(config.key_config().cache_ttl, None);
        assert_eq!(config.key_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[verification]\nscheme = \"hmac\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn unresolved_env_reference_is_unset() {
        let lookup = |name: &str| (name == "PRESENT").then(|| "s3cret".to_string());
        assert_eq!(expand_env_with("${PRESENT}", lookup), Some("s3cret".into()));
        assert_eq!(expand_env_with("$PRESENT", lookup), Some("s3cret".into()));
        assert_eq!(expand_env_with("${MISSING}", lookup), None);
        assert_eq!(expand_env_with("literal", lookup), Some("literal".into()));
    }

    #[test]
    fn literal_secret_is_used_and_empty_is_unset() {
        let mut config = Config::default();
        config.verification.secret = Some("abc123".to_string());
        assert!(config.shared_secret().is_some());
        assert!(config.gate_config().secret.is_some());

        config.verification.secret = Some(String::new());
        assert!(config.shared_secret().is_none());
    }

    #[test]
    fn get_and_set_round_trip() {
        let mut config = Config::default();
        config.set_value("server.port", "8080").unwrap();
        config.set_value("verification.scheme", "public-key").unwrap();
        config
            .set_value("verification.bypass_paths", "/ready, /live")
            .unwrap();
        config.set_value("logging.format", "json").unwrap();

        assert_eq!(config.get_value("server.port").unwrap(), "8080");
        assert_eq!(config.get_value("verification.scheme").unwrap(), "public-key");
        assert_eq!(
            config.get_value("verification.bypass_paths").unwrap(),
            "/ready,/live"
        );
        assert_eq!(config.get_value("logging.format").unwrap(), "json");
        assert!(config.set_value("verification.scheme", "bogus").is_err());
        assert!(config.get_value("nope.key").is_err());
    }

    #[test]
    fn secret_is_never_echoed() {
        let mut config = Config::default();
        config.set_value("verification.secret", "abc123").unwrap();
        assert_eq!(config.get_value("verification.secret").unwrap(), "<set>");
    }

    #[test]
    fn save_and_reload_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        let mut config = Config {
            source: Some(path.clone()),
            ..Config::default()
        };
        config.set_value("keys.cache_ttl_secs", "15").unwrap();
        config.set_value("verification.secret", "${COPILOT_SECRET}").unwrap();
        config.save().unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("${COPILOT_SECRET}"));

        let reloaded = Config::parse_file(&path).unwrap();
        assert_eq!(reloaded.keys.cache_ttl_secs, 15);
        assert_eq!(reloaded.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn relative_log_file_lands_in_logs_dir() {
        let mut config = Config::default();
        assert!(config.log_file().is_none());

        config.logging.file = Some("gate.log".to_string());
        let path = config.log_file().unwrap();
        assert!(path.starts_with(config.paths.logs_dir()));

        config.logging.file = Some("/var/log/hookgate.log".to_string());
        assert_eq!(
            config.log_file().unwrap(),
            PathBuf::from("/var/log/hookgate.log")
        );
    }
}
