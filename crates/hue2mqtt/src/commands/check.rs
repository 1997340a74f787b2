//! `check`: validate the configuration and the bridge credentials offline.

use serde::Serialize;
use tabled::Tabled;

use hue2mqtt_config::Config;
use hue2mqtt_core::{Bridge, BridgeRegistry, CoreError};

use crate::cli::{CheckArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Stand-in id reported when discovery would run without a shared key.
const DISCOVERED: &str = "(discovered)";

#[derive(Debug, Clone, Serialize, Tabled)]
struct BridgeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Base URL")]
    url: String,
    #[tabled(rename = "Credential")]
    credential: &'static str,
}

impl From<&Bridge> for BridgeRow {
    fn from(bridge: &Bridge) -> Self {
        Self {
            id: bridge.id.clone(),
            address: bridge.address.clone(),
            url: bridge
                .base_url()
                .map_or_else(|e| e.to_string(), String::from),
            credential: if bridge.has_credential() { "set" } else { "missing" },
        }
    }
}

pub fn handle(config: &Config, args: &CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.print_config {
        output::print_output(&config.to_redacted_toml()?, global.quiet);
    }

    let bridges = config.bridges();
    if bridges.is_empty() {
        return check_discovery(config, global);
    }

    let rows: Vec<BridgeRow> = bridges.iter().map(BridgeRow::from).collect();
    let rendered = output::render_list(global.output, &rows, Clone::clone, |r| r.id.clone())?;
    output::print_output(&rendered, global.quiet);

    let registry = BridgeRegistry::new();
    for bridge in bridges {
        registry.upsert(bridge)?;
    }
    registry.verify()?;

    if !global.quiet {
        eprintln!("Configuration OK: {} bridge(s)", registry.len());
    }
    Ok(())
}

fn check_discovery(config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let discovery = config.discovery_config()?;
    if !discovery.enabled {
        return Err(CoreError::NoBridges.into());
    }
    if discovery.credential.is_none() {
        return Err(CoreError::MissingCredential {
            bridge_ids: vec![DISCOVERED.into()],
        }
        .into());
    }
    if !global.quiet {
        eprintln!("Configuration OK: bridges will be discovered via {}", discovery.url);
    }
    Ok(())
}
