// hue2mqtt-api: Rate-limited async client for the Hue bridge CLIP v2 API

pub mod call_state;
pub mod catalog;
pub mod client;
pub mod discovery;
pub mod error;
pub mod eventstream;
pub mod rate;
pub mod transport;

pub use catalog::{HttpMethod, ResourceSpec, Scope};
pub use client::{ApiClient, ApiClientConfig, ApiResponse, Body, CallOptions, CallRequest};
pub use discovery::DiscoveredBridge;
pub use error::Error;
pub use eventstream::{LineBuffer, StreamEvent};
pub use rate::{RatePolicy, RateWindow};
pub use transport::{TlsMode, TransportConfig};
