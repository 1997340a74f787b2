//! `run`: start the bridge and serve until a shutdown signal arrives.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hue2mqtt_api::ApiClient;
use hue2mqtt_config::Config;
use hue2mqtt_core::{BridgeClient, BridgeRegistry, CommandRouter, StreamSupervisor};

use crate::bus::MqttBus;
use crate::error::CliError;

const BUS_CAPACITY: usize = 1024;
const INBOUND_CAPACITY: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let api = ApiClient::spawn(&config.api_client_config(), cancel.clone())?;
    let registry = BridgeRegistry::new();
    let bridges = registry
        .initialize(config.bridges(), &config.discovery_config()?, &api)
        .await?;
    info!(
        count = bridges.len(),
        bridges = ?bridges.keys().collect::<Vec<_>>(),
        "bridges ready"
    );

    let stream_http = config.transport_config().build_stream_client()?;
    let client = BridgeClient::new(api, registry);
    let (bus_tx, bus_rx) = mpsc::channel(BUS_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

    let bus = MqttBus::new(&config.mqtt, &config.prefix(), inbound_tx, bus_rx);
    let supervisor = StreamSupervisor::new(
        client.clone(),
        stream_http,
        bus_tx.clone(),
        config.stream_config(),
    );
    let router = CommandRouter::new(client, bus_tx, config.router_config());

    let mut tasks = JoinSet::new();
    tasks.spawn(bus.run(cancel.clone()));
    tasks.spawn(supervisor.run(cancel.clone()));
    tasks.spawn(router.run(inbound_rx, cancel.clone()));
    info!(broker = %config.mqtt.host, port = config.mqtt.port, "hue2mqtt running");

    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        Some(_) = tasks.join_next() => warn!("a service task stopped unexpectedly, shutting down"),
    }

    cancel.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("tasks still running after {SHUTDOWN_GRACE:?}, aborting");
        tasks.abort_all();
    }
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}
