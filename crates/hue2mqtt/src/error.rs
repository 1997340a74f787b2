//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` and `CoreError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use hue2mqtt_config::ConfigError;
use hue2mqtt_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Config file not found: {path}")]
    #[diagnostic(
        code(hue2mqtt::no_config),
        help("Pass an existing file with --config, or omit it to use the default location.")
    )]
    NoConfig { path: String },

    #[error("Invalid configuration")]
    #[diagnostic(
        code(hue2mqtt::config),
        help("Fix the value in the config file or the matching HUE2MQTT_* environment variable.")
    )]
    InvalidConfig {
        #[source]
        source: ConfigError,
    },

    // ── Bridges ──────────────────────────────────────────────────────

    #[error("Bridge(s) without a credential: {}", bridge_ids.join(", "))]
    #[diagnostic(
        code(hue2mqtt::missing_credential),
        help(
            "Every bridge needs an application key.\n\
             Set `credential_env` (preferred) or `credential` on the [[bridges]] entry,\n\
             or `discovery.credential_env` for discovered bridges."
        )
    )]
    MissingCredential { bridge_ids: Vec<String> },

    #[error("No bridges configured or discovered")]
    #[diagnostic(
        code(hue2mqtt::no_bridges),
        help("Add a [[bridges]] entry to the config file, or enable discovery.")
    )]
    NoBridges,

    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(hue2mqtt::connection_failed),
        help("Check that the host is reachable from this machine.\nReason: {reason}")
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(hue2mqtt::api))]
    Api { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(hue2mqtt::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::InvalidConfig { .. } => exit_code::USAGE,
            Self::MissingCredential { .. } => exit_code::AUTH,
            Self::NoBridges => exit_code::NOT_FOUND,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Api { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            source => Self::InvalidConfig { source },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingCredential { bridge_ids } => Self::MissingCredential { bridge_ids },
            CoreError::NoBridges => Self::NoBridges,
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Config { message } => Self::InvalidConfig {
                source: ConfigError::Validation {
                    field: "runtime".into(),
                    reason: message,
                },
            },
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}

impl From<hue2mqtt_api::Error> for CliError {
    fn from(err: hue2mqtt_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let missing: CliError = ConfigError::NotFound {
            path: PathBuf::from("/nope.toml"),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::USAGE);

        let creds: CliError = CoreError::MissingCredential {
            bridge_ids: vec!["b1".into()],
        }
        .into();
        assert_eq!(creds.exit_code(), exit_code::AUTH);
        assert_eq!(creds.to_string(), "Bridge(s) without a credential: b1");

        let down: CliError = CoreError::ConnectionFailed {
            url: "https://10.0.0.2/".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(down.exit_code(), exit_code::CONNECTION);

        let none: CliError = CoreError::NoBridges.into();
        assert_eq!(none.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn other_core_errors_are_general() {
        let err: CliError = CoreError::Shutdown.into();
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
