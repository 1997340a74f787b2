// ── Bus commands ──
//
// A `Command` is the validated reading of one inbound bus topic. It is
// built once and never changed; any validation failure is recorded in
// `errors` and the command is then only logged, never dispatched.

pub mod topic;

use std::str::FromStr;
use std::sync::Arc;

use hue2mqtt_api::catalog;
use strum::{Display, EnumString};

use crate::model::Bridge;
use crate::registry::BridgeRegistry;

/// Bridge id used when a topic names no bridge.
pub const DEFAULT_BRIDGE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Method {
    #[default]
    Get,
    Set,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub bridge_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub method: Method,
    /// Most recent failure first.
    pub errors: Vec<String>,
    /// The resolved bridge, absent when resolution failed.
    pub bridge: Option<Arc<Bridge>>,
}

impl Command {
    /// Parse `topic` and validate it against the catalog and `registry`.
    ///
    /// Returns `None` when the topic does not match the grammar at all.
    pub fn parse(prefix: &str, topic: &str, registry: &BridgeRegistry) -> Option<Self> {
        let parts = topic::split(prefix, topic)?;
        let mut errors = Vec::new();

        let method = match parts.method {
            None => Method::Get,
            Some(token) => Method::from_str(token).unwrap_or_else(|_| {
                errors.insert(0, format!("unknown method '{token}'"));
                Method::Get
            }),
        };

        if !catalog::contains(parts.resource_type) {
            errors.insert(0, format!("unknown resource type '{}'", parts.resource_type));
        }

        let bridge_id = parts.bridge_id.unwrap_or(DEFAULT_BRIDGE);
        let resolved = if bridge_id == DEFAULT_BRIDGE {
            registry.get_default()
        } else {
            registry.get(bridge_id)
        };
        let bridge = match resolved {
            Ok(bridge) => Some(bridge),
            Err(e) => {
                errors.insert(0, e.to_string());
                None
            }
        };

        Some(Self {
            bridge_id: bridge_id.to_owned(),
            resource_type: parts.resource_type.to_owned(),
            resource_id: parts.resource_id.to_owned(),
            method,
            errors,
            bridge,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
