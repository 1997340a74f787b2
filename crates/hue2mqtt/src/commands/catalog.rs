//! `catalog`: list the resource types and the methods each accepts.

use serde::Serialize;
use tabled::Tabled;

use hue2mqtt_api::HttpMethod;
use hue2mqtt_api::catalog::CATALOG;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct CatalogRow {
    #[tabled(rename = "Type")]
    resource_type: &'static str,
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Rate limit")]
    rate: String,
}

fn methods(list: &[HttpMethod]) -> String {
    list.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let rows: Vec<CatalogRow> = CATALOG
        .iter()
        .map(|spec| CatalogRow {
            resource_type: spec.resource_type,
            collection: methods(spec.collection),
            instance: methods(spec.instance),
            rate: spec.rate.map_or_else(
                || "host default".into(),
                |r| format!("{}/{}ms", r.max_requests, r.interval.as_millis()),
            ),
        })
        .collect();

    let rendered = output::render_list(global.output, &rows, Clone::clone, |r| {
        r.resource_type.to_owned()
    })?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
