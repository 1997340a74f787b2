// ── Runtime configuration ──
//
// Tuning handed in by the binary after the config crate has resolved
// files, environment and secrets. Core never reads config files.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Default bus topic prefix.
pub const DEFAULT_PREFIX: &str = "hue2mqtt";

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub prefix: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.into(),
        }
    }
}

/// Reconnect policy for bridge event streams.
///
/// The three delays are independent: an orderly close is part of the
/// bridge's normal keep-alive cycle, an error on an open stream is a fault,
/// and a failed connect escalates up to `connect_retry_max_delay`.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub prefix: String,
    pub closed_delay: Duration,
    pub error_delay: Duration,
    pub connect_retry_delay: Duration,
    pub connect_retry_max_delay: Duration,
    /// Publish a full resource snapshot after each successful connect.
    pub sync_on_connect: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.into(),
            closed_delay: Duration::from_secs(1),
            error_delay: Duration::from_secs(5),
            connect_retry_delay: Duration::from_secs(10),
            connect_retry_max_delay: Duration::from_secs(60),
            sync_on_connect: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub url: Url,
    /// Credential assigned to every discovered bridge.
    pub credential: Option<SecretString>,
}
