// ── Command router ──
//
// Turns inbound bus messages into bridge calls. Only valid `set` commands
// reach a bridge; everything else ends in a log line. A successful set is
// echoed to `prefix/type/id` so observers see the effect of their command.
//
// Parsing happens inline in `run`. Sets are queued to one worker task per
// bridge, so commands for a bridge keep their arrival order and a bridge
// waiting out a rate limit never holds up another bridge.

use std::collections::HashMap;

use bytes::Bytes;
use hue2mqtt_api::HttpMethod;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::bridge_client::BridgeClient;
use crate::command::{Command, Method};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::{BusMessage, InboundMessage};

/// Queued sets per bridge before new ones are dropped.
const BRIDGE_QUEUE_CAPACITY: usize = 64;

/// What the router did with one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Topic does not match the command grammar.
    Ignored,
    /// Parsed but failed validation; errors most recent first.
    Invalid(Vec<String>),
    /// A valid `get`. State arrives through the event stream.
    Informational,
    /// The bridge accepted the set; the payload was echoed to `topic`.
    Applied { topic: String },
    /// Dispatch failed after validation.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CommandRouter {
    client: BridgeClient,
    bus: mpsc::Sender<BusMessage>,
    prefix: String,
}

impl CommandRouter {
    pub fn new(client: BridgeClient, bus: mpsc::Sender<BusMessage>, config: RouterConfig) -> Self {
        Self {
            client,
            bus,
            prefix: config.prefix,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parse(&self, topic: &str) -> Option<Command> {
        Command::parse(&self.prefix, topic, self.client.registry())
    }

    /// Handle one inbound message end to end.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Disposition {
        match self.classify(topic) {
            Ok(command) => self.apply(&command, topic, payload).await,
            Err(disposition) => disposition,
        }
    }

    /// Parse and validate `topic`. Returns the command only when it is a
    /// valid `set` that must be dispatched.
    fn classify(&self, topic: &str) -> Result<Command, Disposition> {
        let Some(command) = self.parse(topic) else {
            trace!(topic, "topic outside command grammar");
            return Err(Disposition::Ignored);
        };

        if !command.is_valid() {
            warn!(topic, errors = ?command.errors, "invalid command");
            return Err(Disposition::Invalid(command.errors));
        }

        match command.method {
            Method::Get => {
                trace!(topic, "get command, nothing to dispatch");
                Err(Disposition::Informational)
            }
            Method::Set => Ok(command),
        }
    }

    async fn apply(&self, command: &Command, topic: &str, payload: &[u8]) -> Disposition {
        match self.dispatch(command, topic, payload).await {
            Ok(topic) => Disposition::Applied { topic },
            Err(e) => {
                warn!(topic, error = %e, "command failed");
                Disposition::Failed(e.to_string())
            }
        }
    }

    /// Send a valid `set` command to its bridge and echo the payload.
    /// Returns the topic the confirmation was published on.
    pub async fn dispatch(
        &self,
        command: &Command,
        topic: &str,
        payload: &[u8],
    ) -> Result<String, CoreError> {
        let bridge = command.bridge.as_ref().ok_or_else(|| CoreError::BridgeNotFound {
            id: command.bridge_id.clone(),
        })?;

        let body: Value =
            serde_json::from_slice(payload).map_err(|e| CoreError::InvalidPayload {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })?;

        debug!(
            bridge_id = %bridge.id,
            resource_type = %command.resource_type,
            resource_id = %command.resource_id,
            "dispatching set"
        );
        self.client
            .request(
                bridge,
                HttpMethod::Put,
                &command.resource_type,
                Some(&command.resource_id),
                Some(body.clone()),
            )
            .await?;

        let echo = BusMessage::resource(
            &self.prefix,
            &command.resource_type,
            &command.resource_id,
            body,
        );
        let echo_topic = echo.topic.clone();
        self.bus.send(echo).await.map_err(|_| CoreError::Shutdown)?;
        info!(topic = %echo_topic, "set applied");
        Ok(echo_topic)
    }

    /// Consume inbound messages until cancelled or the channel closes.
    ///
    /// Sets for the same bridge reach the API client in arrival order;
    /// sets for different bridges run independently.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        let span = info_span!("router", prefix = %self.prefix);
        async move {
            let mut queues: HashMap<String, mpsc::Sender<QueuedSet>> = HashMap::new();
            let mut workers = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    message = inbound.recv() => {
                        let Some(message) = message else { break };
                        let Ok(command) = self.classify(&message.topic) else {
                            continue;
                        };
                        self.enqueue(&mut queues, &mut workers, &cancel, QueuedSet {
                            command,
                            topic: message.topic,
                            payload: message.payload,
                        });
                    }
                }
            }

            // Closing the queues lets workers finish what they hold.
            drop(queues);
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "bridge command worker died");
                }
            }
            debug!("router exiting");
        }
        .instrument(span)
        .await;
    }

    fn enqueue(
        &self,
        queues: &mut HashMap<String, mpsc::Sender<QueuedSet>>,
        workers: &mut JoinSet<()>,
        cancel: &CancellationToken,
        set: QueuedSet,
    ) {
        let bridge_id = set
            .command
            .bridge
            .as_ref()
            .map_or_else(|| set.command.bridge_id.clone(), |b| b.id.clone());

        let queue = queues.entry(bridge_id.clone()).or_insert_with(|| {
            debug!(bridge_id = %bridge_id, "starting bridge command worker");
            let (tx, rx) = mpsc::channel(BRIDGE_QUEUE_CAPACITY);
            let span = info_span!("bridge_commands", bridge_id = %bridge_id);
            workers.spawn(self.clone().drain(rx, cancel.clone()).instrument(span));
            tx
        });

        match queue.try_send(set) {
            Ok(()) => {}
            Err(TrySendError::Full(set)) => {
                warn!(bridge_id = %bridge_id, topic = %set.topic, "bridge command queue full, dropping set");
            }
            Err(TrySendError::Closed(set)) => {
                warn!(bridge_id = %bridge_id, topic = %set.topic, "bridge command worker gone, dropping set");
                queues.remove(&bridge_id);
            }
        }
    }

    /// Apply queued sets for one bridge, one at a time.
    async fn drain(self, mut queue: mpsc::Receiver<QueuedSet>, cancel: CancellationToken) {
        loop {
            let set = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                set = queue.recv() => match set {
                    Some(set) => set,
                    None => break,
                },
            };
            self.apply(&set.command, &set.topic, &set.payload).await;
        }
    }
}

/// A validated set waiting for its bridge worker.
struct QueuedSet {
    command: Command,
    topic: String,
    payload: Bytes,
}
