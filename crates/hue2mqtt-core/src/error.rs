// ── Core error types ──
//
// Domain errors surfaced by registry, router and supervisor. The
// `From<hue2mqtt_api::Error>` impl folds transport-layer failures into
// variants callers can act on without matching HTTP details.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry ─────────────────────────────────────────────────────
    #[error("Bridge not found: {id}")]
    BridgeNotFound { id: String },

    #[error("No bridges configured or discovered")]
    NoBridges,

    #[error("Bridge(s) without a credential: {}", bridge_ids.join(", "))]
    MissingCredential { bridge_ids: Vec<String> },

    #[error("Invalid bridge {id:?}: {reason}")]
    InvalidBridge { id: String, reason: String },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Invalid payload on {topic}: {reason}")]
    InvalidPayload { topic: String, reason: String },

    #[error("Request rejected: {message}")]
    Rejected { message: String },

    // ── Bridge communication ─────────────────────────────────────────
    #[error("Cannot reach {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Bridge API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Event stream error: {message}")]
    Stream { message: String },

    #[error("Shutting down")]
    Shutdown,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// The only error class that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::NoBridges | Self::Config { .. }
        )
    }
}

impl From<hue2mqtt_api::Error> for CoreError {
    fn from(err: hue2mqtt_api::Error) -> Self {
        use hue2mqtt_api::Error as Api;

        match err {
            Api::Transport(ref e) if e.is_connect() || e.is_timeout() => Self::ConnectionFailed {
                url: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            Api::Transport(e) => Self::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => Self::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            Api::Http { status, body } => Self::Api {
                message: format!("HTTP {status}: {body}"),
                status: Some(status),
            },
            Api::RateLimited { retry_after_secs } => Self::Api {
                message: format!("Rate limited, retry after {retry_after_secs}s"),
                status: Some(429),
            },
            Api::Deserialization { message, .. } => Self::Api {
                message: format!("Unexpected response: {message}"),
                status: None,
            },
            e @ (Api::UnknownResource(_) | Api::MethodNotAllowed { .. }) => Self::Rejected {
                message: e.to_string(),
            },
            Api::Shutdown => Self::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_lists_ids() {
        let err = CoreError::MissingCredential {
            bridge_ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Bridge(s) without a credential: a, b");
        assert!(err.is_fatal());
    }

    #[test]
    fn catalog_errors_become_rejections() {
        let err: CoreError = hue2mqtt_api::Error::UnknownResource("toaster".into()).into();
        assert!(matches!(err, CoreError::Rejected { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn http_status_is_kept() {
        let err: CoreError = hue2mqtt_api::Error::Http {
            status: 503,
            body: "busy".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(503), .. }));
    }
}
