// Network bridge discovery
//
// The discovery service answers a plain GET with a JSON array of bridges
// seen on the caller's public IP. Requests go through the ApiClient so the
// discovery host gets its own rate window like any other host.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::client::{ApiClient, Body};
use crate::error::Error;

/// Public discovery endpoint.
pub const DEFAULT_DISCOVERY_URL: &str = "https://discovery.meethue.com/";

/// One candidate returned by the discovery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveredBridge {
    pub id: String,
    #[serde(rename = "internalipaddress")]
    pub internal_ip_address: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl DiscoveredBridge {
    /// `host` or `host:port` for the bridge's local API.
    pub fn address(&self) -> String {
        match self.port {
            Some(port) if port != 443 => format!("{}:{port}", self.internal_ip_address),
            _ => self.internal_ip_address.clone(),
        }
    }
}

/// Query the discovery endpoint and return every candidate bridge.
pub async fn discover(api: &ApiClient, url: Url) -> Result<Vec<DiscoveredBridge>, Error> {
    debug!(url = %url, "querying bridge discovery");
    let response = api.get(url).await?;

    let value = match response.body {
        Body::Json(value) => value,
        Body::Empty => return Ok(Vec::new()),
        Body::Text(text) => {
            return Err(Error::Deserialization {
                message: "discovery response is not JSON".into(),
                body: text,
            });
        }
    };

    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(Error::Deserialization {
                message: "unexpected discovery document".into(),
                body: other.to_string(),
            });
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item.clone()).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: item.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_omits_default_port() {
        let bridge = DiscoveredBridge {
            id: "001788fffe000001".into(),
            internal_ip_address: "192.168.1.20".into(),
            port: Some(443),
        };
        assert_eq!(bridge.address(), "192.168.1.20");

        let bridge = DiscoveredBridge {
            port: Some(8443),
            ..bridge
        };
        assert_eq!(bridge.address(), "192.168.1.20:8443");
    }

    #[test]
    fn deserialize_candidate() {
        let candidate: DiscoveredBridge = serde_json::from_str(
            r#"{"id":"001788fffe000001","internalipaddress":"192.168.1.20"}"#,
        )
        .expect("valid candidate");
        assert_eq!(candidate.port, None);
        assert_eq!(candidate.address(), "192.168.1.20");
    }
}
