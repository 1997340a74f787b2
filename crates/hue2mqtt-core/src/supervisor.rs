// ── Event-stream supervisor ──
//
// One long-lived GET per bridge on `/eventstream/clip/v2`. Each connection
// attempt is its own task in a `JoinSet`; when it ends the supervisor
// decides the restart delay from how it ended and spawns a fresh attempt.
// A bridge never has more than one attempt alive, and a failing bridge
// never touches another bridge's task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use hue2mqtt_api::catalog::EVENT_STREAM_PATH;
use hue2mqtt_api::eventstream::decode_fragment;
use hue2mqtt_api::{Body, LineBuffer, StreamEvent};
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bridge_client::{BridgeClient, auth_headers};
use crate::config::StreamConfig;
use crate::error::CoreError;
use crate::model::{Bridge, BridgeStatus, BusMessage};
use crate::registry::BridgeSnapshot;

/// How one connection attempt ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The bridge ended an open stream without error.
    Closed,
    /// Transport error on an open stream.
    Failed(CoreError),
    /// The stream could not be opened.
    Unreachable(CoreError),
    Cancelled,
}

/// Restart policy state for one bridge.
#[derive(Debug, Default)]
pub struct Backoff {
    connect_failures: u32,
}

impl Backoff {
    /// Delay before the next attempt after `end`.
    ///
    /// Orderly close and stream errors use their fixed delays and reset the
    /// escalation. Failed connects double the connect-retry delay each time,
    /// capped at the configured maximum.
    pub fn next_delay(&mut self, end: &StreamEnd, config: &StreamConfig) -> Duration {
        match end {
            StreamEnd::Closed => {
                self.connect_failures = 0;
                config.closed_delay
            }
            StreamEnd::Failed(_) => {
                self.connect_failures = 0;
                config.error_delay
            }
            StreamEnd::Unreachable(_) => {
                let factor = 2u32.saturating_pow(self.connect_failures);
                self.connect_failures = self.connect_failures.saturating_add(1);
                config
                    .connect_retry_delay
                    .saturating_mul(factor)
                    .min(config.connect_retry_max_delay)
            }
            StreamEnd::Cancelled => Duration::ZERO,
        }
    }

    pub fn connect_failures(&self) -> u32 {
        self.connect_failures
    }
}

// ── Supervisor ───────────────────────────────────────────────────────

pub struct StreamSupervisor {
    worker: Arc<StreamWorker>,
}

struct Connection {
    task: Id,
    backoff: Backoff,
}

#[derive(Default)]
struct Attempts {
    tasks: JoinSet<StreamEnd>,
    owners: HashMap<Id, String>,
    connections: HashMap<String, Connection>,
}

impl StreamSupervisor {
    /// `http` must have no overall timeout; streams stay open indefinitely.
    pub fn new(
        client: BridgeClient,
        http: reqwest::Client,
        bus: mpsc::Sender<BusMessage>,
        config: StreamConfig,
    ) -> Self {
        Self {
            worker: Arc::new(StreamWorker {
                client,
                http,
                bus,
                config,
            }),
        }
    }

    /// Supervise every registered bridge, including bridges registered
    /// later, until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let registry = self.worker.client.registry().clone();
        let mut bridges = registry.subscribe();
        let mut attempts = Attempts::default();

        let snapshot = bridges.borrow_and_update().clone();
        self.launch_new(&mut attempts, &snapshot, &cancel);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = bridges.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = bridges.borrow_and_update().clone();
                    self.launch_new(&mut attempts, &snapshot, &cancel);
                }
                Some(joined) = attempts.tasks.join_next_with_id() => {
                    let (id, end) = match joined {
                        Ok(done) => done,
                        Err(e) => (e.id(), StreamEnd::Failed(CoreError::Stream {
                            message: format!("stream task died: {e}"),
                        })),
                    };
                    self.restart(&mut attempts, id, &end, &cancel);
                }
            }
        }

        attempts.tasks.shutdown().await;
        debug!("stream supervisor exiting");
    }

    fn launch_new(&self, attempts: &mut Attempts, snapshot: &BridgeSnapshot, cancel: &CancellationToken) {
        for id in snapshot.keys() {
            if attempts.connections.contains_key(id) {
                continue;
            }
            info!(bridge_id = %id, "starting event stream");
            let task = self.spawn_attempt(attempts, id.clone(), Duration::ZERO, cancel);
            attempts.connections.insert(
                id.clone(),
                Connection {
                    task,
                    backoff: Backoff::default(),
                },
            );
        }
    }

    fn restart(&self, attempts: &mut Attempts, finished: Id, end: &StreamEnd, cancel: &CancellationToken) {
        let Some(bridge_id) = attempts.owners.remove(&finished) else {
            return;
        };
        if matches!(end, StreamEnd::Cancelled) || cancel.is_cancelled() {
            return;
        }
        let Some(connection) = attempts.connections.get_mut(&bridge_id) else {
            return;
        };
        if connection.task != finished {
            return;
        }

        let delay = connection.backoff.next_delay(end, &self.worker.config);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match end {
            StreamEnd::Closed => info!(bridge_id = %bridge_id, delay_ms, "event stream closed, reconnecting"),
            StreamEnd::Failed(e) => warn!(bridge_id = %bridge_id, error = %e, delay_ms, "event stream failed, reconnecting"),
            StreamEnd::Unreachable(e) => warn!(
                bridge_id = %bridge_id,
                error = %e,
                delay_ms,
                failures = connection.backoff.connect_failures(),
                "event stream unreachable, retrying"
            ),
            StreamEnd::Cancelled => {}
        }

        self.worker
            .client
            .registry()
            .set_status(&bridge_id, BridgeStatus::Reconnecting);
        let task = self.spawn_attempt(attempts, bridge_id.clone(), delay, cancel);
        if let Some(connection) = attempts.connections.get_mut(&bridge_id) {
            connection.task = task;
        }
    }

    fn spawn_attempt(
        &self,
        attempts: &mut Attempts,
        bridge_id: String,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Id {
        let worker = Arc::clone(&self.worker);
        let span = info_span!("stream", bridge_id = %bridge_id);
        let handle = attempts.tasks.spawn(
            worker
                .attempt(bridge_id.clone(), delay, cancel.clone())
                .instrument(span),
        );
        attempts.owners.insert(handle.id(), bridge_id);
        handle.id()
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

struct StreamWorker {
    client: BridgeClient,
    http: reqwest::Client,
    bus: mpsc::Sender<BusMessage>,
    config: StreamConfig,
}

impl StreamWorker {
    async fn attempt(self: Arc<Self>, bridge_id: String, delay: Duration, cancel: CancellationToken) -> StreamEnd {
        if !delay.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return StreamEnd::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }

        // Re-read so address or credential changes apply on reconnect.
        let bridge = match self.client.registry().get(&bridge_id) {
            Ok(bridge) => bridge,
            Err(e) => return StreamEnd::Unreachable(e),
        };
        self.client
            .registry()
            .set_status(&bridge_id, BridgeStatus::Connecting);

        tokio::select! {
            biased;
            () = cancel.cancelled() => StreamEnd::Cancelled,
            end = self.read_stream(&bridge) => end,
        }
    }

    async fn read_stream(&self, bridge: &Bridge) -> StreamEnd {
        let response = match self.open(bridge).await {
            Ok(response) => response,
            Err(e) => return StreamEnd::Unreachable(e),
        };
        debug!(status = response.status().as_u16(), "event stream open");

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut connected = false;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let err = CoreError::Stream {
                        message: e.to_string(),
                    };
                    return if connected {
                        StreamEnd::Failed(err)
                    } else {
                        StreamEnd::Unreachable(err)
                    };
                }
            };

            if !connected {
                connected = true;
                self.client
                    .registry()
                    .set_status(&bridge.id, BridgeStatus::Connected);
                info!("event stream connected");
                if self.config.sync_on_connect {
                    self.sync(bridge).await;
                }
            }

            for line in lines.push(&chunk) {
                self.publish_fragment(&line).await;
            }
        }

        if let Some(rest) = lines.finish() {
            self.publish_fragment(&rest).await;
        }
        StreamEnd::Closed
    }

    async fn open(&self, bridge: &Bridge) -> Result<reqwest::Response, CoreError> {
        let url = bridge.url(EVENT_STREAM_PATH)?;
        let mut headers = auth_headers(bridge)?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self
            .http
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| CoreError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                message: format!("event stream answered HTTP {status}"),
                status: Some(status.as_u16()),
            });
        }
        Ok(response)
    }

    /// Publish every resource the bridge currently has.
    async fn sync(&self, bridge: &Bridge) {
        let response = match self.client.fetch_all(bridge).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "initial state sync failed");
                return;
            }
        };

        let resources = match response.body {
            Body::Json(Value::Array(items)) => items,
            Body::Json(single @ Value::Object(_)) => vec![single],
            _ => Vec::new(),
        };

        let mut published = 0usize;
        for resource in resources {
            if let Value::Object(object) = resource {
                if let Some(event) = StreamEvent::from_resource(object) {
                    self.publish(event).await;
                    published += 1;
                }
            }
        }
        info!(count = published, "initial state published");
    }

    async fn publish_fragment(&self, line: &str) {
        match decode_fragment(line) {
            Ok(events) => {
                for event in events {
                    self.publish(event).await;
                }
            }
            Err(e) => warn!(error = %e, fragment = line, "skipping malformed stream fragment"),
        }
    }

    async fn publish(&self, event: StreamEvent) {
        let message = BusMessage::resource(
            &self.config.prefix,
            &event.resource_type,
            &event.id,
            Value::Object(event.fields),
        );
        if self.bus.send(message).await.is_err() {
            debug!("bus closed, dropping event");
        }
    }
}
