//! The process-wide client accessors. One test so nothing else in this binary races on the slot.

use lib::gateway::{close_gateway_client, gateway_client, init_gateway_client, Envelope, EventKind};
use std::sync::Arc;

#[test]
fn init_is_idempotent_and_close_clears_the_slot() {
    assert!(gateway_client().is_none());

    let first = init_gateway_client(Some("ws://10.1.1.1:18789"), Some("one"));
    assert_eq!(first.url(), "ws://10.1.1.1:18789");

    let again = init_gateway_client(Some("ws://10.2.2.2:18789"), Some("two"));
    assert!(Arc::ptr_eq(&first, &again), "existing client returned unchanged");
    assert_eq!(again.url(), "ws://10.1.1.1:18789");
    assert!(Arc::ptr_eq(&first, &gateway_client().unwrap()));

    let stale = first.on(EventKind::Connected, |_: &Envelope| {});
    close_gateway_client();
    assert!(gateway_client().is_none());

    let fresh = init_gateway_client(Some("ws://10.2.2.2:18789"), None);
    assert!(!Arc::ptr_eq(&first, &fresh));
    assert_eq!(fresh.url(), "ws://10.2.2.2:18789");

    // A handle kept from the closed client must not remove the new client's handler.
    let live = fresh.on(EventKind::Connected, |_: &Envelope| {});
    assert!(!fresh.off(&stale));
    assert!(fresh.off(&live));
    close_gateway_client();
}
