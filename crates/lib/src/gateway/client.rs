//! Gateway client: connection lifecycle, reconnection with backoff, and outbound requests.
//!
//! `connect()` and `disconnect()` return immediately. Each connection attempt
//! runs in one spawned task which opens the transport, then reads frames and
//! dispatches them inline, so events from a connection arrive in frame order.
//! Outcomes are only observable through `connected` / `disconnected` / `error`
//! events.

use crate::gateway::dispatcher::{EventDispatcher, EventFilter, Subscription};
use crate::gateway::protocol::{Envelope, GatewayEvent, GatewayRequest};
use crate::gateway::transport::{Connector, Transport, TransportEvent, WsConnector};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

const CLIENT_CLOSE_CODE: u16 = 1000;
const CLIENT_CLOSE_REASON: &str = "client disconnect";

/// Linear backoff: `interval × attempt`, capped at `max_delay`, at most `max_attempts` in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.interval.saturating_mul(attempt).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to connect and how to retry.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub url: String,
    /// Bearer token; empty means none is presented.
    pub token: String,
    pub reconnect: ReconnectPolicy,
}

impl ClientSettings {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Default)]
struct ConnState {
    status: ConnectionStatus,
    /// Consecutive reconnection attempts since the last successful open.
    attempts: u32,
    /// Set once `attempts` hit the ceiling and retrying stopped.
    exhausted: bool,
    /// Bumped by every new attempt and by `disconnect()`; tasks holding an older value are stale.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    connection_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    /// Generation whose `connected` event is being delivered right now.
    announcing: Option<u64>,
    /// A `disconnect()` during that delivery; its `disconnected` is emitted once delivery ends.
    deferred_close: Option<u64>,
}

struct Shared {
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    state: Mutex<ConnState>,
}

/// Client for the gateway's realtime event stream.
pub struct GatewayClient {
    shared: Arc<Shared>,
}

impl GatewayClient {
    pub fn new(settings: ClientSettings) -> Self {
        Self::with_connector(settings, Arc::new(WsConnector))
    }

    pub fn with_connector(settings: ClientSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                connector,
                dispatcher: EventDispatcher::new(),
                state: Mutex::new(ConnState::default()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.settings.url
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.shared.settings.reconnect
    }

    /// Register a handler for one event kind (or [`EventFilter::Any`]).
    pub fn on<F>(&self, filter: impl Into<EventFilter>, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe(filter, handler)
    }

    pub fn off(&self, subscription: &Subscription) -> bool {
        self.shared.dispatcher.unsubscribe(subscription)
    }

    /// Start connecting. No-op while connected or while an attempt is outstanding.
    /// A pending scheduled reconnect is replaced by this immediate attempt.
    pub fn connect(&self) {
        self.shared.start_attempt(true);
    }

    /// Cancel any pending reconnect and close the connection.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Disconnect, then connect again right away.
    pub fn reconnect(&self) {
        self.shared.disconnect();
        self.shared.start_attempt(true);
    }

    /// Write one JSON request. Dropped with a warning unless connected.
    pub fn send<T: Serialize>(&self, request: &T) -> bool {
        self.shared.send(request)
    }

    pub fn request_sessions(&self) -> bool {
        self.send(&GatewayRequest::GetSessions)
    }

    pub fn request_cron_jobs(&self) -> bool {
        self.send(&GatewayRequest::GetCronJobs)
    }

    pub fn request_agents(&self) -> bool {
        self.send(&GatewayRequest::GetAgents)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Consecutive failed attempts counted toward the retry ceiling.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state().attempts
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.state().reconnect_task.is_some()
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state().generation == generation
    }

    fn emit(&self, event: GatewayEvent) {
        self.dispatcher.emit_event(event);
    }

    fn start_attempt(self: &Arc<Self>, explicit: bool) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(e) => {
                log::error!("cannot connect to gateway outside a tokio runtime: {}", e);
                self.emit(GatewayEvent::Error {
                    error: "no async runtime available".to_string(),
                });
                return;
            }
        };
        let mut st = self.state();
        if st.status != ConnectionStatus::Disconnected {
            log::debug!("gateway connect ignored: already {}", st.status);
            return;
        }
        if explicit {
            if let Some(timer) = st.reconnect_task.take() {
                timer.abort();
            }
            if st.exhausted {
                st.attempts = 0;
                st.exhausted = false;
            }
        }
        st.status = ConnectionStatus::Connecting;
        st.generation += 1;
        let generation = st.generation;
        let this = Arc::clone(self);
        st.connection_task = Some(runtime.spawn(async move {
            this.run_connection(generation).await;
        }));
    }

    async fn run_connection(self: Arc<Self>, generation: u64) {
        let url = self.settings.url.clone();
        log::debug!("connecting to gateway {}", url);
        let transport = match self.connector.open(&url, &self.settings.token).await {
            Ok(t) => t,
            Err(e) => {
                log::error!("gateway connection to {} failed: {}", url, e);
                if self.is_current(generation) {
                    self.emit(GatewayEvent::Error {
                        error: e.to_string(),
                    });
                    self.handle_closed(generation, None, e.to_string());
                }
                return;
            }
        };
        let Transport {
            outbound,
            mut inbound,
        } = transport;
        {
            let mut st = self.state();
            if st.generation != generation {
                return;
            }
            st.status = ConnectionStatus::Connected;
            st.attempts = 0;
            st.exhausted = false;
            st.outbound = Some(outbound);
        }
        log::info!("connected to gateway {}", url);
        self.send(&GatewayRequest::subscribe_all());
        {
            let mut st = self.state();
            // A disconnect() since the state update has already reported `disconnected`.
            if st.generation != generation {
                return;
            }
            st.announcing = Some(generation);
        }
        self.emit(GatewayEvent::Connected { url });
        let deferred = {
            let mut st = self.state();
            if st.announcing == Some(generation) {
                st.announcing = None;
            }
            if st.deferred_close == Some(generation) {
                st.deferred_close = None;
                true
            } else {
                false
            }
        };
        if deferred {
            self.emit_client_close();
            return;
        }

        while let Some(event) = inbound.recv().await {
            if !self.is_current(generation) {
                return;
            }
            match event {
                TransportEvent::Frame(text) => {
                    self.dispatcher.dispatch_frame(&text);
                }
                TransportEvent::Failed(error) => {
                    log::error!("gateway websocket error: {}", error);
                    self.emit(GatewayEvent::Error { error });
                }
                TransportEvent::Closed { code, reason } => {
                    self.handle_closed(generation, code, reason);
                    return;
                }
            }
        }
        self.handle_closed(generation, None, String::new());
    }

    fn handle_closed(self: &Arc<Self>, generation: u64, code: Option<u16>, reason: String) {
        {
            let mut st = self.state();
            if st.generation != generation {
                return;
            }
            st.status = ConnectionStatus::Disconnected;
            st.outbound = None;
            st.connection_task = None;
        }
        log::info!("disconnected from gateway: code={:?} reason={:?}", code, reason);
        self.emit(GatewayEvent::Disconnected { code, reason });
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let policy = self.settings.reconnect;
        let mut st = self.state();
        // A handler may already have reconnected or disconnected.
        if st.generation != generation || st.status != ConnectionStatus::Disconnected {
            return;
        }
        if st.attempts >= policy.max_attempts {
            st.exhausted = true;
            log::error!(
                "max gateway reconnection attempts reached ({})",
                policy.max_attempts
            );
            return;
        }
        st.attempts += 1;
        let delay = policy.delay_for(st.attempts);
        log::info!(
            "reconnecting to gateway in {}ms (attempt {})",
            delay.as_millis(),
            st.attempts
        );
        let this = Arc::clone(self);
        st.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut st = this.state();
                if st.generation != generation {
                    return;
                }
                st.reconnect_task = None;
            }
            this.start_attempt(false);
        }));
    }

    fn send<T: Serialize>(&self, request: &T) -> bool {
        let text = match serde_json::to_string(request) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("cannot serialize gateway request: {}", e);
                return false;
            }
        };
        let st = self.state();
        match (&st.status, &st.outbound) {
            (ConnectionStatus::Connected, Some(tx)) => {
                if tx.send(text).is_err() {
                    log::warn!("gateway connection closed, request dropped");
                    return false;
                }
                true
            }
            _ => {
                log::warn!("cannot send, gateway not connected");
                false
            }
        }
    }

    fn disconnect(&self) {
        let was_live = {
            let mut st = self.state();
            st.generation += 1;
            if let Some(timer) = st.reconnect_task.take() {
                timer.abort();
            }
            if let Some(task) = st.connection_task.take() {
                task.abort();
            }
            st.outbound = None;
            let was_live = st.status != ConnectionStatus::Disconnected;
            st.status = ConnectionStatus::Disconnected;
            match st.announcing {
                // `connected` is still being delivered; the connection task reports the close after it.
                Some(announcer) if was_live => {
                    st.deferred_close = Some(announcer);
                    false
                }
                _ => was_live,
            }
        };
        if was_live {
            self.emit_client_close();
        }
    }

    fn emit_client_close(&self) {
        log::info!("disconnecting from gateway {}", self.settings.url);
        self.emit(GatewayEvent::Disconnected {
            code: Some(CLIENT_CLOSE_CODE),
            reason: CLIENT_CLOSE_REASON.to_string(),
        });
    }

    /// Stop all tasks without emitting events.
    fn shutdown(&self) {
        let mut st = self.state();
        st.generation += 1;
        if let Some(timer) = st.reconnect_task.take() {
            timer.abort();
        }
        if let Some(task) = st.connection_task.take() {
            task.abort();
        }
        st.outbound = None;
        st.status = ConnectionStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::EventKind;
    use crate::gateway::transport::TransportError;
    use async_trait::async_trait;
    use tokio::time::Instant;

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Fail,
        Accept,
        Hang,
    }

    /// Server half of an accepted fake connection.
    struct Peer {
        sent: mpsc::UnboundedReceiver<String>,
        push: mpsc::UnboundedSender<TransportEvent>,
    }

    struct FakeConnector {
        mode: Mutex<Mode>,
        opens: Mutex<Vec<Instant>>,
        peers: Mutex<Vec<Peer>>,
    }

    impl FakeConnector {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: Mutex::new(mode),
                opens: Mutex::new(Vec::new()),
                peers: Mutex::new(Vec::new()),
            })
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn opens(&self) -> Vec<Instant> {
            self.opens.lock().unwrap().clone()
        }

        fn take_peer(&self) -> Peer {
            self.peers.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn open(&self, _url: &str, _token: &str) -> Result<Transport, TransportError> {
            self.opens.lock().unwrap().push(Instant::now());
            let mode = *self.mode.lock().unwrap();
            match mode {
                Mode::Fail => Err(TransportError::Handshake(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed,
                )),
                Mode::Hang => std::future::pending::<Result<Transport, TransportError>>().await,
                Mode::Accept => {
                    let (out_tx, out_rx) = mpsc::unbounded_channel();
                    let (in_tx, in_rx) = mpsc::unbounded_channel();
                    self.peers.lock().unwrap().push(Peer {
                        sent: out_rx,
                        push: in_tx,
                    });
                    Ok(Transport {
                        outbound: out_tx,
                        inbound: in_rx,
                    })
                }
            }
        }
    }

    fn client(connector: &Arc<FakeConnector>) -> GatewayClient {
        let connector: Arc<dyn Connector> = connector.clone();
        GatewayClient::with_connector(ClientSettings::new("ws://test", "secret"), connector)
    }

    fn record_kinds(client: &GatewayClient) -> Arc<Mutex<Vec<EventKind>>> {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let k = Arc::clone(&kinds);
        client.on(EventFilter::Any, move |env: &Envelope| {
            k.lock().unwrap().push(env.kind())
        });
        kinds
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn secs_between(a: Instant, b: Instant) -> u64 {
        ((b - a).as_millis() as u64 + 500) / 1000
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let p = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=10).map(|n| p.delay_for(n).as_millis() as u64).collect();
        assert_eq!(
            delays,
            [5000, 10000, 15000, 20000, 25000, 30000, 30000, 30000, 30000, 30000]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice_opens_one_transport() {
        let fake = FakeConnector::new(Mode::Hang);
        let c = client(&fake);
        c.connect();
        c.connect();
        assert_eq!(c.status(), ConnectionStatus::Connecting);
        tokio::time::sleep(Duration::from_secs(60)).await;
        c.connect();
        assert_eq!(fake.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_connected_is_noop() {
        let fake = FakeConnector::new(Mode::Accept);
        let c = client(&fake);
        c.connect();
        settle().await;
        assert!(c.is_connected());
        c.connect();
        settle().await;
        assert_eq!(fake.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_sends_subscribe_then_emits_connected() {
        let fake = FakeConnector::new(Mode::Accept);
        let c = client(&fake);
        let kinds = record_kinds(&c);
        c.connect();
        settle().await;

        let mut peer = fake.take_peer();
        assert_eq!(
            peer.sent.try_recv().unwrap(),
            r#"{"action":"subscribe","events":["sessions","cron","messages","agents"]}"#
        );
        assert_eq!(*kinds.lock().unwrap(), [EventKind::Connected]);

        assert!(c.request_sessions());
        assert!(c.request_cron_jobs());
        assert!(c.request_agents());
        assert_eq!(peer.sent.try_recv().unwrap(), r#"{"action":"getSessions"}"#);
        assert_eq!(peer.sent.try_recv().unwrap(), r#"{"action":"getCronJobs"}"#);
        assert_eq!(peer.sent.try_recv().unwrap(), r#"{"action":"getAgents"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_disconnected_is_dropped() {
        let fake = FakeConnector::new(Mode::Hang);
        let c = client(&fake);
        assert!(!c.request_agents());
        c.connect();
        assert!(!c.send(&serde_json::json!({ "action": "ping" })));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_then_stop_at_ceiling() {
        let fake = FakeConnector::new(Mode::Fail);
        let c = client(&fake);
        let kinds = record_kinds(&c);
        c.connect();
        tokio::time::sleep(Duration::from_secs(1000)).await;

        let opens = fake.opens();
        assert_eq!(opens.len(), 11, "one manual attempt plus ten retries");
        let gaps: Vec<u64> = opens.windows(2).map(|w| secs_between(w[0], w[1])).collect();
        assert_eq!(gaps, [5, 10, 15, 20, 25, 30, 30, 30, 30, 30]);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        assert_eq!(c.reconnect_attempts(), 10);
        assert!(!c.has_pending_reconnect());

        let kinds = kinds.lock().unwrap().clone();
        assert_eq!(kinds.len(), 22);
        assert!(kinds
            .chunks(2)
            .all(|pair| pair == [EventKind::Error, EventKind::Disconnected]));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fake.opens().len(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_connect_after_exhaustion_restarts_backoff() {
        let fake = FakeConnector::new(Mode::Fail);
        let c = client(&fake);
        c.connect();
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(fake.opens().len(), 11);

        c.connect();
        settle().await;
        assert_eq!(fake.opens().len(), 12);
        assert_eq!(c.reconnect_attempts(), 1);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fake.opens().len(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_backoff() {
        let fake = FakeConnector::new(Mode::Fail);
        let c = client(&fake);
        let kinds = record_kinds(&c);
        c.connect();
        // Failures at t=0, 5, 15; the next attempt is due at t=30.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fake.opens().len(), 3);
        assert_eq!(c.reconnect_attempts(), 3);

        fake.set_mode(Mode::Accept);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(c.is_connected());
        assert_eq!(c.reconnect_attempts(), 0);

        fake.set_mode(Mode::Fail);
        let peer = fake.take_peer();
        let closed_at = Instant::now();
        peer.push
            .send(TransportEvent::Closed {
                code: Some(1006),
                reason: "abnormal".to_string(),
            })
            .unwrap();
        settle().await;
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        assert_eq!(c.reconnect_attempts(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let opens = fake.opens();
        assert_eq!(opens.len(), 5);
        assert_eq!(secs_between(closed_at, opens[4]), 5);

        let kinds = kinds.lock().unwrap();
        let connected = kinds.iter().position(|k| *k == EventKind::Connected).unwrap();
        assert_eq!(kinds[connected - 1], EventKind::Disconnected);
        assert_eq!(kinds[connected + 1], EventKind::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let fake = FakeConnector::new(Mode::Fail);
        let c = client(&fake);
        c.connect();
        settle().await;
        assert!(c.has_pending_reconnect());

        c.disconnect();
        assert!(!c.has_pending_reconnect());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fake.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_from_connected_handler_reports_close_after_connected() {
        let fake = FakeConnector::new(Mode::Accept);
        let c = Arc::new(client(&fake));
        let weak = Arc::downgrade(&c);
        c.on(EventKind::Connected, move |_: &Envelope| {
            if let Some(c) = weak.upgrade() {
                c.disconnect();
            }
        });
        let closes = Arc::new(Mutex::new(Vec::new()));
        let cl = Arc::clone(&closes);
        c.on(EventKind::Disconnected, move |env: &Envelope| {
            if let GatewayEvent::Disconnected { code, .. } = &env.event {
                cl.lock().unwrap().push(*code);
            }
        });
        let kinds = record_kinds(&c);

        c.connect();
        settle().await;
        assert_eq!(
            *kinds.lock().unwrap(),
            [EventKind::Connected, EventKind::Disconnected]
        );
        assert_eq!(*closes.lock().unwrap(), [Some(1000)]);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        assert!(!c.has_pending_reconnect());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_disconnect_never_leaves_connected_last() {
        for _ in 0..100 {
            let fake = FakeConnector::new(Mode::Accept);
            let c = client(&fake);
            let kinds = record_kinds(&c);
            c.connect();
            while c.status() != ConnectionStatus::Connected {
                std::hint::spin_loop();
            }
            c.disconnect();

            for _ in 0..100 {
                if kinds.lock().unwrap().last() == Some(&EventKind::Disconnected) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            let kinds = kinds.lock().unwrap().clone();
            assert_eq!(kinds.last(), Some(&EventKind::Disconnected), "{:?}", kinds);
            assert_eq!(
                kinds.iter().filter(|k| **k == EventKind::Disconnected).count(),
                1,
                "{:?}",
                kinds
            );
            assert!(kinds.iter().filter(|k| **k == EventKind::Connected).count() <= 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_live_connection_without_retry() {
        let fake = FakeConnector::new(Mode::Accept);
        let c = client(&fake);
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&events);
        c.on(EventKind::Disconnected, move |env: &Envelope| {
            e.lock().unwrap().push(env.event.clone())
        });
        c.connect();
        settle().await;
        let mut peer = fake.take_peer();

        c.disconnect();
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        settle().await;
        while peer.sent.try_recv().is_ok() {}
        assert!(peer.sent.recv().await.is_none(), "outbound side dropped");
        assert_eq!(
            *events.lock().unwrap(),
            [GatewayEvent::Disconnected {
                code: Some(1000),
                reason: "client disconnect".to_string(),
            }]
        );

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fake.opens().len(), 1);
        assert!(!c.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn frames_dispatch_in_order_and_malformed_frames_are_skipped() {
        let fake = FakeConnector::new(Mode::Accept);
        let c = client(&fake);
        c.connect();
        settle().await;
        let kinds = record_kinds(&c);
        let peer = fake.take_peer();

        for frame in [
            "{{not json",
            r#"{"type":"session.start","data":{"id":"s1","agentId":"friday","status":"active","startTime":"2026-02-19T10:00:00Z"}}"#,
            r#"{"type":"agent.status","data":{"id":"friday","status":"busy"}}"#,
            r#"{"type":"session.end","data":{"id":"s1"}}"#,
        ] {
            peer.push.send(TransportEvent::Frame(frame.to_string())).unwrap();
        }
        settle().await;
        assert_eq!(
            *kinds.lock().unwrap(),
            [
                EventKind::SessionStart,
                EventKind::AgentStatus,
                EventKind::SessionEnd
            ]
        );
        assert!(c.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_emits_error_then_disconnected() {
        let fake = FakeConnector::new(Mode::Accept);
        let c = client(&fake);
        c.connect();
        settle().await;
        let kinds = record_kinds(&c);
        let peer = fake.take_peer();
        peer.push
            .send(TransportEvent::Failed("connection reset".to_string()))
            .unwrap();
        peer.push
            .send(TransportEvent::Closed {
                code: None,
                reason: "connection reset".to_string(),
            })
            .unwrap();
        settle().await;
        assert_eq!(
            *kinds.lock().unwrap(),
            [EventKind::Error, EventKind::Disconnected]
        );
        assert!(c.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_starts_a_fresh_attempt() {
        let fake = FakeConnector::new(Mode::Hang);
        let c = client(&fake);
        c.connect();
        settle().await;
        c.disconnect();
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        c.reconnect();
        settle().await;
        assert_eq!(c.status(), ConnectionStatus::Connecting);
        assert_eq!(fake.opens().len(), 2);
    }
}
