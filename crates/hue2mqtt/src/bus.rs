// MQTT adapter between the broker and the core channels.
//
// Inbound publishes under `<prefix>/#` are forwarded to the command
// router; `BusMessage`s from the router and the stream supervisor are
// serialized and published. The rumqttc event loop reconnects on its own
// after an error as long as it keeps being polled, so the poll side only
// backs off and logs.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use hue2mqtt_config::MqttSettings;
use hue2mqtt_core::{BusMessage, InboundMessage};

const REQUEST_CAPACITY: usize = 100;
const MAX_PACKET_SIZE: usize = 256 * 1024;
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

pub struct MqttBus {
    client: AsyncClient,
    eventloop: EventLoop,
    subscription: String,
    retain: bool,
    inbound: mpsc::Sender<InboundMessage>,
    outbound: mpsc::Receiver<BusMessage>,
}

impl MqttBus {
    pub fn new(
        settings: &MqttSettings,
        prefix: &str,
        inbound: mpsc::Sender<InboundMessage>,
        outbound: mpsc::Receiver<BusMessage>,
    ) -> Self {
        let (client, eventloop) = AsyncClient::new(options(settings), REQUEST_CAPACITY);
        Self {
            client,
            eventloop,
            subscription: format!("{prefix}/#"),
            retain: settings.retain,
            inbound,
            outbound,
        }
    }

    /// Drive the connection until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            client,
            eventloop,
            subscription,
            retain,
            inbound,
            mut outbound,
        } = self;

        let span = info_span!("bus", subscription = %subscription);
        async move {
            tokio::join!(
                publish_loop(&client, &mut outbound, retain, &cancel),
                poll_loop(&client, eventloop, &subscription, &inbound, &cancel),
            );
            if let Err(e) = client.try_disconnect() {
                debug!(error = %e, "disconnect request not queued");
            }
        }
        .instrument(span)
        .await;
    }
}

fn options(settings: &MqttSettings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    if let Some(username) = &settings.username {
        let password = settings
            .password()
            .map(|p| p.expose_secret().to_owned())
            .unwrap_or_default();
        options.set_credentials(username, password);
    }
    options
}

async fn poll_loop(
    client: &AsyncClient,
    mut eventloop: EventLoop,
    subscription: &str,
    inbound: &mpsc::Sender<InboundMessage>,
    cancel: &CancellationToken,
) {
    let mut delay = RECONNECT_MIN;
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                delay = RECONNECT_MIN;
                info!("connected to broker");
                // Clean sessions drop subscriptions on every reconnect.
                if let Err(e) = client.try_subscribe(subscription, QoS::AtLeastOnce) {
                    warn!(error = %e, "subscribe request not queued");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                // Never park the event loop on a slow router.
                match inbound.try_send(InboundMessage::new(publish.topic, publish.payload)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(message)) => {
                        warn!(topic = %message.topic, "router backlog full, dropping command");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("router gone, stopping bus");
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, retry_in = ?delay, "broker connection error");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                delay = delay.saturating_mul(2).min(RECONNECT_MAX);
            }
        }
    }
}

async fn publish_loop(
    client: &AsyncClient,
    outbound: &mut mpsc::Receiver<BusMessage>,
    retain: bool,
    cancel: &CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };

        let payload = match serde_json::to_vec(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "payload not serializable");
                continue;
            }
        };
        if let Err(e) = client
            .publish(&message.topic, QoS::AtLeastOnce, retain, payload)
            .await
        {
            warn!(topic = %message.topic, error = %e, "publish failed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_applied_only_with_a_username() {
        let mut settings = MqttSettings::default();
        assert!(options(&settings).credentials().is_none());

        settings.username = Some("hue".into());
        settings.password = Some("pw".into());
        let creds = options(&settings).credentials();
        assert_eq!(creds, Some(("hue".to_owned(), "pw".to_owned())));
    }

    #[test]
    fn options_follow_settings() {
        let settings = MqttSettings {
            host: "broker.lan".into(),
            port: 8883,
            keep_alive_secs: 45,
            ..MqttSettings::default()
        };
        let options = options(&settings);
        assert_eq!(options.broker_address(), ("broker.lan".to_owned(), 8883));
        assert_eq!(options.keep_alive(), Duration::from_secs(45));
    }
}
