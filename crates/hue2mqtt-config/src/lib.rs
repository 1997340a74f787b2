//! Configuration for hue2mqtt.
//!
//! A TOML file merged with `HUE2MQTT_`-prefixed environment variables
//! (nested keys separated by `__`, e.g. `HUE2MQTT_MQTT__HOST`), credential
//! resolution (env var or plaintext), and translation into the runtime
//! configs `hue2mqtt-core` and `hue2mqtt-api` consume.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use hue2mqtt_api::discovery::DEFAULT_DISCOVERY_URL;
use hue2mqtt_api::{ApiClientConfig, RatePolicy, TlsMode, TransportConfig};
use hue2mqtt_core::config::DEFAULT_PREFIX;
use hue2mqtt_core::{Bridge, DiscoveryConfig, RouterConfig, StreamConfig};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "HUE2MQTT_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttSettings,

    /// Statically configured bridges. When empty, discovery is used.
    #[serde(default)]
    pub bridges: Vec<BridgeSettings>,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    /// Plaintext password. `password_env` wins when set.
    pub password: Option<String>,
    /// Environment variable holding the password.
    pub password_env: Option<String>,
    pub keep_alive_secs: u64,
    /// Topic prefix for commands and events.
    pub prefix: String,
    /// Publish events as retained messages.
    pub retain: bool,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "hue2mqtt".into(),
            username: None,
            password: None,
            password_env: None,
            keep_alive_secs: 30,
            prefix: DEFAULT_PREFIX.into(),
            retain: false,
        }
    }
}

impl MqttSettings {
    pub fn password(&self) -> Option<SecretString> {
        resolve_secret(self.password.as_deref(), self.password_env.as_deref())
    }
}

/// One `[[bridges]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSettings {
    pub id: String,
    /// `host`, `host:port` or a full base URL.
    pub address: String,
    /// Application key (plaintext, prefer `credential_env`).
    pub credential: Option<String>,
    /// Environment variable holding the application key.
    pub credential_env: Option<String>,
}

impl BridgeSettings {
    pub fn to_bridge(&self) -> Bridge {
        let mut bridge = Bridge::new(self.id.trim(), self.address.trim());
        bridge.credential =
            resolve_secret(self.credential.as_deref(), self.credential_env.as_deref());
        bridge
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub enabled: bool,
    pub url: String,
    /// Application key assigned to discovered bridges.
    pub credential: Option<String>,
    pub credential_env: Option<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_DISCOVERY_URL.into(),
            credential: None,
            credential_env: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    pub retry_budget: u32,
    pub timeout_secs: u64,
    /// Admission window: at most `max_requests` per `interval_ms`.
    pub max_requests: u32,
    pub interval_ms: u64,
    /// CA certificate for bridges with a verifiable certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            timeout_secs: 30,
            max_requests: 10,
            interval_ms: 1000,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSettings {
    pub closed_delay_ms: u64,
    pub error_delay_ms: u64,
    pub connect_retry_delay_ms: u64,
    pub connect_retry_max_delay_ms: u64,
    pub sync_on_connect: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            closed_delay_ms: 1000,
            error_delay_ms: 5000,
            connect_retry_delay_ms: 10_000,
            connect_retry_max_delay_ms: 60_000,
            sync_on_connect: true,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "hue2mqtt").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hue2mqtt");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from `path` (or the default location) plus the environment, then
/// validate. An explicit path must exist; the default one may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => return Err(ConfigError::NotFound { path: p.into() }),
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;

    config.validate()?;
    Ok(config)
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.mqtt.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(invalid("mqtt.prefix", "must not be empty"));
        }
        if prefix.contains(['+', '#']) {
            return Err(invalid("mqtt.prefix", "must not contain MQTT wildcards"));
        }
        if self.mqtt.host.trim().is_empty() {
            return Err(invalid("mqtt.host", "must not be empty"));
        }
        if self.mqtt.port == 0 {
            return Err(invalid("mqtt.port", "must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for (i, bridge) in self.bridges.iter().enumerate() {
            if bridge.id.trim().is_empty() {
                return Err(invalid(format!("bridges[{i}].id"), "must not be empty"));
            }
            if bridge.address.trim().is_empty() {
                return Err(invalid(format!("bridges[{i}].address"), "must not be empty"));
            }
            if !seen.insert(bridge.id.trim()) {
                return Err(invalid(
                    format!("bridges[{i}].id"),
                    format!("duplicate bridge id '{}'", bridge.id),
                ));
            }
            bridge.to_bridge().base_url().map_err(|e| {
                invalid(format!("bridges[{i}].address"), e.to_string())
            })?;
        }

        if self.discovery.enabled {
            Url::parse(&self.discovery.url)
                .map_err(|e| invalid("discovery.url", format!("{e}: {}", self.discovery.url)))?;
        }

        if self.http.retry_budget == 0 {
            return Err(invalid("http.retry_budget", "must be at least 1"));
        }
        if self.http.max_requests == 0 {
            return Err(invalid("http.max_requests", "must be at least 1"));
        }
        if self.http.interval_ms == 0 {
            return Err(invalid("http.interval_ms", "must be greater than zero"));
        }
        if self.stream.connect_retry_max_delay_ms < self.stream.connect_retry_delay_ms {
            return Err(invalid(
                "stream.connect_retry_max_delay_ms",
                "must not be below stream.connect_retry_delay_ms",
            ));
        }
        Ok(())
    }

    // ── Translation to runtime configs ──────────────────────────────

    pub fn prefix(&self) -> String {
        self.mqtt.prefix.trim_end_matches('/').to_owned()
    }

    pub fn bridges(&self) -> Vec<Bridge> {
        self.bridges.iter().map(BridgeSettings::to_bridge).collect()
    }

    pub fn discovery_config(&self) -> Result<DiscoveryConfig, ConfigError> {
        let url = Url::parse(&self.discovery.url)
            .map_err(|e| invalid("discovery.url", e.to_string()))?;
        Ok(DiscoveryConfig {
            enabled: self.discovery.enabled,
            url,
            credential: resolve_secret(
                self.discovery.credential.as_deref(),
                self.discovery.credential_env.as_deref(),
            ),
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: self
                .http
                .ca_cert
                .clone()
                .map_or(TlsMode::DangerAcceptInvalid, TlsMode::CustomCa),
            timeout: Duration::from_secs(self.http.timeout_secs),
            ..TransportConfig::default()
        }
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            transport: self.transport_config(),
            retry_budget: self.http.retry_budget,
            default_rate: RatePolicy::new(self.http.max_requests, self.http.interval_ms),
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            prefix: self.prefix(),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            prefix: self.prefix(),
            closed_delay: Duration::from_millis(self.stream.closed_delay_ms),
            error_delay: Duration::from_millis(self.stream.error_delay_ms),
            connect_retry_delay: Duration::from_millis(self.stream.connect_retry_delay_ms),
            connect_retry_max_delay: Duration::from_millis(self.stream.connect_retry_max_delay_ms),
            sync_on_connect: self.stream.sync_on_connect,
        }
    }

    /// Effective configuration as TOML with every secret masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        mask(&mut shown.mqtt.password);
        mask(&mut shown.discovery.credential);
        for bridge in &mut shown.bridges {
            mask(&mut bridge.credential);
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

fn mask(secret: &mut Option<String>) {
    if secret.is_some() {
        *secret = Some("********".into());
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Env var named by `env` if set and non-empty, else the plaintext value.
pub fn resolve_secret(plain: Option<&str>, env: Option<&str>) -> Option<SecretString> {
    if let Some(name) = env {
        if let Ok(value) = std::env::var(name) {
            if !value.trim().is_empty() {
                return Some(SecretString::from(value));
            }
        }
    }
    plain
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::from(v.to_owned()))
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn load(path: &str) -> Result<Config, figment::Error> {
        load_config(Some(Path::new(path))).map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let config = Config::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.prefix(), "hue2mqtt");
        assert!(config.discovery.enabled);
        assert!(config.validate().is_ok());

        let stream = config.stream_config();
        assert_eq!(stream.closed_delay, Duration::from_secs(1));
        assert_eq!(stream.error_delay, Duration::from_secs(5));
        assert_eq!(stream.connect_retry_delay, Duration::from_secs(10));
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [mqtt]
                host = "broker.lan"
                prefix = "home/hue/"

                [[bridges]]
                id = "b1"
                address = "192.168.1.20"
                credential_env = "B1_KEY"

                [http]
                max_requests = 5
                "#,
            )?;
            jail.set_env("HUE2MQTT_MQTT__PORT", "8883");
            jail.set_env("HUE2MQTT_STREAM__CLOSED_DELAY_MS", "250");
            jail.set_env("B1_KEY", "from-env");

            let config = load("config.toml")?;
            assert_eq!(config.mqtt.host, "broker.lan");
            assert_eq!(config.mqtt.port, 8883);
            assert_eq!(config.prefix(), "home/hue");
            assert_eq!(config.stream_config().closed_delay, Duration::from_millis(250));
            assert_eq!(config.api_client_config().default_rate.max_requests, 5);

            let bridges = config.bridges();
            assert_eq!(bridges.len(), 1);
            assert_eq!(
                bridges[0].credential.as_ref().map(|c| c.expose_secret().to_owned()),
                Some("from-env".to_owned())
            );
            Ok(())
        });
    }

    #[test]
    fn env_credential_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("HUE_KEY", "secret-env");
            let secret = resolve_secret(Some("plain"), Some("HUE_KEY"));
            assert_eq!(secret.map(|s| s.expose_secret().to_owned()).as_deref(), Some("secret-env"));

            let secret = resolve_secret(Some("plain"), Some("UNSET_HUE_KEY"));
            assert_eq!(secret.map(|s| s.expose_secret().to_owned()).as_deref(), Some("plain"));

            assert!(resolve_secret(Some("  "), None).is_none());
            Ok(())
        });
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        Jail::expect_with(|_| {
            let err = load_config(Some(Path::new("nope.toml")));
            assert!(matches!(err, Err(ConfigError::NotFound { .. })));
            Ok(())
        });
    }

    #[test]
    fn duplicate_bridge_ids_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [[bridges]]
                id = "b1"
                address = "10.0.0.2"

                [[bridges]]
                id = "b1"
                address = "10.0.0.3"
                "#,
            )?;
            let err = load_config(Some(Path::new("config.toml")));
            assert!(
                matches!(&err, Err(ConfigError::Validation { field, .. }) if field == "bridges[1].id"),
                "{err:?}"
            );
            Ok(())
        });
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = Config::default();
        config.http.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mqtt.prefix = "hue/#".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.connect_retry_max_delay_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_output_hides_secrets() {
        let mut config = Config::default();
        config.mqtt.password = Some("hunter2".into());
        config.bridges.push(BridgeSettings {
            id: "b1".into(),
            address: "10.0.0.2".into(),
            credential: Some("app-key".into()),
            credential_env: None,
        });
        let rendered = config.to_redacted_toml().expect("serializable");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("app-key"));
        assert!(rendered.contains("10.0.0.2"));
    }

    #[test]
    fn custom_ca_switches_tls_mode() {
        let mut config = Config::default();
        assert!(matches!(config.transport_config().tls, TlsMode::DangerAcceptInvalid));
        config.http.ca_cert = Some(PathBuf::from("/etc/hue/ca.pem"));
        assert!(matches!(config.transport_config().tls, TlsMode::CustomCa(_)));
    }
}
