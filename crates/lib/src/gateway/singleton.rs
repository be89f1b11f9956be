//! Process-wide gateway client.
//!
//! At most one client exists per process. [`init_gateway_client`] builds it if
//! absent and otherwise returns the existing one unchanged (new arguments are
//! ignored); [`close_gateway_client`] disconnects it and clears the slot so the
//! next init starts fresh.

use crate::config::{self, Config};
use crate::gateway::client::{ClientSettings, GatewayClient};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

static CLIENT: OnceLock<Mutex<Option<Arc<GatewayClient>>>> = OnceLock::new();

fn slot() -> MutexGuard<'static, Option<Arc<GatewayClient>>> {
    CLIENT
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Return the client, creating it from `url` / `token` if none exists yet.
/// Missing arguments fall back to `OPENCLAW_GATEWAY_URL` / `OPENCLAW_GATEWAY_TOKEN`, then to the defaults.
pub fn init_gateway_client(url: Option<&str>, token: Option<&str>) -> Arc<GatewayClient> {
    let mut slot = slot();
    if let Some(client) = slot.as_ref() {
        return Arc::clone(client);
    }
    let mut settings = config::client_settings(&Config::default());
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        settings.url = url.to_string();
    }
    if let Some(token) = token {
        settings.token = token.trim().to_string();
    }
    let client = Arc::new(GatewayClient::new(settings));
    *slot = Some(Arc::clone(&client));
    client
}

/// Like [`init_gateway_client`] with fully resolved settings (e.g. from a config file).
pub fn init_gateway_client_with(settings: ClientSettings) -> Arc<GatewayClient> {
    let mut slot = slot();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(GatewayClient::new(settings))))
}

/// The current client, if one was initialised.
pub fn gateway_client() -> Option<Arc<GatewayClient>> {
    slot().clone()
}

/// Disconnect the current client and clear the slot.
pub fn close_gateway_client() {
    let client = slot().take();
    if let Some(client) = client {
        client.disconnect();
    }
}
