// Shared transport configuration for building reqwest::Client instances.
//
// The request client (bounded receive timeout) and the event-stream client
// (no timeout, held open indefinitely) share TLS and user-agent settings
// through this module.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("hue2mqtt/", env!("CARGO_PKG_VERSION"));

/// Bridges present a self-signed certificate, so peer verification is
/// disabled unless a CA file is configured.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed bridge certificates).
    #[default]
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Receive timeout for ordinary calls. Not applied to event streams.
    pub timeout: Duration,
    /// TCP connect timeout, applied to both clients.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build the `reqwest::Client` used for request/response calls.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()?
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build the `reqwest::Client` used for long-lived event streams.
    ///
    /// No overall timeout: the bridge holds the response open until it
    /// has something to send.
    pub fn build_stream_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()?
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Tls(format!("failed to build stream client: {e}")))
    }

    fn builder(&self) -> Result<reqwest::ClientBuilder, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accepts_self_signed() {
        let config = TransportConfig::default();
        assert!(matches!(config.tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_ca_file_is_tls_error() {
        let config = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/ca.pem")),
            ..TransportConfig::default()
        };
        assert!(matches!(config.build_client(), Err(Error::Tls(_))));
    }
}
