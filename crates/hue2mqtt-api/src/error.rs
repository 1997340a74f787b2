use thiserror::Error;

/// Top-level error type for the `hue2mqtt-api` crate.
///
/// Covers every failure mode of a bridge call: transport, HTTP status,
/// rate limiting, response decoding, and catalog validation.
/// `hue2mqtt-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success status returned by the bridge.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The bridge answered 429. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Catalog ─────────────────────────────────────────────────────
    /// The resource type is not part of the catalog.
    #[error("Unknown resource type '{0}'")]
    UnknownResource(String),

    /// The catalog does not allow this method on this resource scope.
    #[error("{method} is not supported on {resource_type} ({scope})")]
    MethodNotAllowed {
        resource_type: String,
        method: String,
        scope: &'static str,
    },

    // ── Runtime ─────────────────────────────────────────────────────
    /// The call coordinator task has shut down.
    #[error("API client is shut down")]
    Shutdown,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Http { status, .. } => *status >= 500 || *status == 408,
            Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
