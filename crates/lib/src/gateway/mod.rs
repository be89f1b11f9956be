//! Gateway: realtime WebSocket client for the OpenClaw gateway.
//!
//! The connection manager ([`GatewayClient`]) keeps at most one live
//! connection and reconnects with linear backoff; the [`EventDispatcher`]
//! turns inbound frames into typed [`GatewayEvent`]s and fans them out to
//! subscribers. Client-generated `connected` / `disconnected` / `error`
//! events travel the same path as remote ones.

mod client;
mod dispatcher;
mod protocol;
mod singleton;
mod transport;

pub use client::{
    ClientSettings, ConnectionStatus, GatewayClient, ReconnectPolicy, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_INTERVAL,
};
pub use dispatcher::{EventDispatcher, EventFilter, EventHandler, Subscription};
pub use protocol::{parse_frame, Envelope, EventKind, FrameError, GatewayEvent, GatewayRequest, Topic};
pub use singleton::{
    close_gateway_client, gateway_client, init_gateway_client, init_gateway_client_with,
};
pub use transport::{Connector, Transport, TransportError, TransportEvent, WsConnector};
