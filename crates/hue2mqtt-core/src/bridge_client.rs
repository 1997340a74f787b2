// ── Bridge-addressed API access ──
//
// `ApiClient` only knows URLs. This facade resolves bridges through the
// registry, validates requests against the resource catalog and injects
// the `hue-application-key` header, so router and supervisor never build
// URLs or handle credentials themselves.

use hue2mqtt_api::catalog::{self, RESOURCE_BASE};
use hue2mqtt_api::{ApiClient, ApiResponse, CallOptions, HttpMethod};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;
use crate::model::Bridge;
use crate::registry::BridgeRegistry;

/// Credential header every bridge call carries.
pub const APPLICATION_KEY_HEADER: &str = "hue-application-key";

#[derive(Debug, Clone)]
pub struct BridgeClient {
    api: ApiClient,
    registry: BridgeRegistry,
}

impl BridgeClient {
    pub fn new(api: ApiClient, registry: BridgeRegistry) -> Self {
        Self { api, registry }
    }

    pub fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }

    /// Perform a catalog-checked resource request against `bridge`.
    ///
    /// `id` selects instance scope; without it the collection is targeted.
    /// The catalog's rate override, if any, is applied to the call.
    pub async fn request(
        &self,
        bridge: &Bridge,
        method: HttpMethod,
        resource_type: &str,
        id: Option<&str>,
        body: Option<Value>,
    ) -> Result<ApiResponse, CoreError> {
        let spec = catalog::check(resource_type, method, id)?;
        let url = bridge.url(&spec.path(id))?;
        let options = CallOptions {
            rate: spec.rate,
            retry_budget: None,
        };
        debug!(bridge_id = %bridge.id, %method, resource_type, id = ?id, "bridge request");
        Ok(self
            .api
            .call(method, url, auth_headers(bridge)?, body, options)
            .await?)
    }

    /// GET every resource the bridge exposes.
    pub async fn fetch_all(&self, bridge: &Bridge) -> Result<ApiResponse, CoreError> {
        let url = bridge.url(RESOURCE_BASE)?;
        Ok(self
            .api
            .call(
                HttpMethod::Get,
                url,
                auth_headers(bridge)?,
                None,
                CallOptions::default(),
            )
            .await?)
    }
}

/// Headers carrying the bridge credential.
pub fn auth_headers(bridge: &Bridge) -> Result<HeaderMap, CoreError> {
    let credential = bridge
        .credential
        .as_ref()
        .filter(|_| bridge.has_credential())
        .ok_or_else(|| CoreError::MissingCredential {
            bridge_ids: vec![bridge.id.clone()],
        })?;

    let mut value =
        HeaderValue::from_str(credential.expose_secret()).map_err(|e| CoreError::Config {
            message: format!("credential for bridge {} is not a valid header: {e}", bridge.id),
        })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(APPLICATION_KEY_HEADER, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn auth_header_is_sensitive() {
        let bridge = Bridge::new("b1", "10.0.0.2").with_credential(SecretString::from("abc"));
        let headers = auth_headers(&bridge).expect("valid credential");
        let value = headers.get(APPLICATION_KEY_HEADER).expect("header present");
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().ok(), Some("abc"));
    }

    #[test]
    fn missing_credential_is_an_error() {
        let bridge = Bridge::new("b1", "10.0.0.2");
        assert!(matches!(
            auth_headers(&bridge),
            Err(CoreError::MissingCredential { .. })
        ));
    }
}
