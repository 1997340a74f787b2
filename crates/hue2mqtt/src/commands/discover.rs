//! `discover`: list the bridges the discovery service reports.

use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use hue2mqtt_api::{ApiClient, DiscoveredBridge, discovery};
use hue2mqtt_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
}

impl From<&DiscoveredBridge> for DiscoveredRow {
    fn from(bridge: &DiscoveredBridge) -> Self {
        Self {
            id: bridge.id.clone(),
            address: bridge.address(),
        }
    }
}

pub async fn handle(config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let url = config.discovery_config()?.url;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let api = ApiClient::spawn(&config.api_client_config(), cancel)?;

    let found = discovery::discover(&api, url).await?;
    let rows: Vec<DiscoveredRow> = found.iter().map(DiscoveredRow::from).collect();
    let rendered = output::render_list(global.output, &rows, Clone::clone, |r| r.id.clone())?;
    output::print_output(&rendered, global.quiet);

    if rows.is_empty() && !global.quiet {
        eprintln!("No bridges found");
    }
    Ok(())
}
