// ── Domain model ──
//
// Bridges as the registry stores them, and the messages exchanged with the
// bus adapter. Payloads stay opaque JSON keyed by resource type and id.

use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use strum::{Display, EnumString};
use url::Url;

use crate::error::CoreError;

// ── Bridge ───────────────────────────────────────────────────────────

/// Connection state of a bridge's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BridgeStatus {
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct Bridge {
    pub id: String,
    /// `host`, `host:port` or a full base URL.
    pub address: String,
    pub credential: Option<SecretString>,
    pub status: Option<BridgeStatus>,
}

impl Bridge {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            credential: None,
            status: None,
        }
    }

    pub fn with_credential(mut self, credential: SecretString) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn has_credential(&self) -> bool {
        self.credential
            .as_ref()
            .is_some_and(|c| !c.expose_secret().trim().is_empty())
    }

    /// Overwrite fields with the non-empty fields of `incoming`. The id
    /// never changes.
    pub fn merge(&mut self, incoming: Self) {
        let has_credential = incoming.has_credential();
        let Self {
            address,
            credential,
            status,
            ..
        } = incoming;
        if !address.trim().is_empty() {
            self.address = address;
        }
        if has_credential {
            self.credential = credential;
        }
        if status.is_some() {
            self.status = status;
        }
    }

    /// Base URL for HTTP calls. Bare addresses default to `https`.
    pub fn base_url(&self) -> Result<Url, CoreError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(CoreError::InvalidBridge {
                id: self.id.clone(),
                reason: "no address".into(),
            });
        }
        let raw = if address.contains("://") {
            address.to_owned()
        } else {
            format!("https://{address}")
        };
        Url::parse(&raw).map_err(|e| CoreError::InvalidBridge {
            id: self.id.clone(),
            reason: format!("bad address {address:?}: {e}"),
        })
    }

    /// Resolve a path against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, CoreError> {
        self.base_url()?
            .join(path)
            .map_err(|e| CoreError::InvalidBridge {
                id: self.id.clone(),
                reason: format!("cannot join {path:?}: {e}"),
            })
    }
}

// ── Bus messages ─────────────────────────────────────────────────────

/// Canonical outbound topic for a resource.
pub fn resource_topic(prefix: &str, resource_type: &str, resource_id: &str) -> String {
    format!("{prefix}/{resource_type}/{resource_id}")
}

/// Message to publish on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Value,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    pub fn resource(prefix: &str, resource_type: &str, resource_id: &str, payload: Value) -> Self {
        Self::new(resource_topic(prefix, resource_type, resource_id), payload)
    }
}

/// Message received from the bus.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_non_empty_fields_only() {
        let mut bridge =
            Bridge::new("b1", "10.0.0.2").with_credential(SecretString::from("key-1"));
        bridge.merge(Bridge::new("ignored", ""));
        assert_eq!(bridge.id, "b1");
        assert_eq!(bridge.address, "10.0.0.2");
        assert!(bridge.has_credential());

        bridge.merge(Bridge::new("b1", "10.0.0.3").with_credential(SecretString::from("  ")));
        assert_eq!(bridge.address, "10.0.0.3");
        assert_eq!(
            bridge.credential.as_ref().map(|c| c.expose_secret().to_owned()),
            Some("key-1".to_owned())
        );

        bridge.merge(Bridge {
            status: Some(BridgeStatus::Connected),
            ..Bridge::new("b1", "")
        });
        assert_eq!(bridge.status, Some(BridgeStatus::Connected));
        assert_eq!(bridge.address, "10.0.0.3");
    }

    #[test]
    fn merge_replaces_address_and_credential_together() {
        let mut bridge = Bridge::new("b1", "10.0.0.2");
        bridge.merge(Bridge::new("b1", "10.0.0.9").with_credential(SecretString::from("key-2")));
        assert_eq!(bridge.address, "10.0.0.9");
        assert_eq!(
            bridge.credential.as_ref().map(|c| c.expose_secret().to_owned()),
            Some("key-2".to_owned())
        );
        assert_eq!(bridge.status, None);
    }

    #[test]
    fn base_url_defaults_to_https() {
        let bridge = Bridge::new("b1", "192.168.1.20:8443");
        assert_eq!(
            bridge.base_url().map(|u| u.to_string()).ok().as_deref(),
            Some("https://192.168.1.20:8443/")
        );

        let bridge = Bridge::new("b1", "http://127.0.0.1:9000");
        let url = bridge.url("/clip/v2/resource/light").ok();
        assert_eq!(
            url.as_ref().map(Url::as_str),
            Some("http://127.0.0.1:9000/clip/v2/resource/light")
        );

        assert!(Bridge::new("b1", "").base_url().is_err());
    }

    #[test]
    fn status_strings() {
        assert_eq!(BridgeStatus::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn resource_topics() {
        let msg = BusMessage::resource("hue2mqtt", "light", "x", Value::Null);
        assert_eq!(msg.topic, "hue2mqtt/light/x");
    }
}
