//! Domain layer between `hue2mqtt-api` and the MQTT bus.
//!
//! - **[`BridgeRegistry`]**: the single owner of bridge descriptors, with
//!   upsert-merge semantics and `watch`-based change notification.
//! - **[`BridgeClient`]**: resolves bridges, validates requests against
//!   the resource catalog and adds credentials before handing calls to the
//!   rate-limited [`ApiClient`](hue2mqtt_api::ApiClient).
//! - **[`CommandRouter`]**: parses inbound bus topics into [`Command`]s and
//!   dispatches valid `set` commands.
//! - **[`StreamSupervisor`]**: keeps one event-stream connection per bridge
//!   alive and republishes every event to the bus.

pub mod bridge_client;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod router;
pub mod supervisor;

pub use bridge_client::BridgeClient;
pub use command::{Command, Method};
pub use config::{DiscoveryConfig, RouterConfig, StreamConfig};
pub use error::CoreError;
pub use model::{Bridge, BridgeStatus, BusMessage, InboundMessage};
pub use registry::{BridgeRegistry, BridgeSnapshot};
pub use router::{CommandRouter, Disposition};
pub use supervisor::StreamSupervisor;
