//! Dashboard state accumulated from gateway events.
//!
//! The client keeps no history; views build their own state by applying every
//! event to a [`DashboardState`]. [`attach`] wires one to a client and asks the
//! gateway for current state after every `connected` event.

use crate::agent::{default_roster, Agent, AgentStatus};
use crate::cron::{self, CronJob};
use crate::gateway::{
    ConnectionStatus, Envelope, EventFilter, EventKind, GatewayClient, GatewayEvent, Subscription,
};
use crate::message::RecentMessages;
use crate::session::{Session, SessionId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub connection: ConnectionStatus,
    /// Fixed roster, in roster order.
    pub agents: Vec<Agent>,
    pub sessions: BTreeMap<SessionId, Session>,
    /// Sorted by name.
    pub cron_jobs: Vec<CronJob>,
    pub recent_messages: RecentMessages,
    /// When the last domain event was applied.
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            agents: default_roster(),
            sessions: BTreeMap::new(),
            cron_jobs: Vec::new(),
            recent_messages: RecentMessages::default(),
            last_update: None,
        }
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    fn agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    /// Agents not offline (the "N/M Active" label).
    pub fn active_agent_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| a.status != AgentStatus::Offline)
            .count()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_active()).count()
    }

    pub fn apply(&mut self, envelope: &Envelope) {
        match &envelope.event {
            GatewayEvent::Connected { .. } => {
                self.connection = ConnectionStatus::Connected;
                return;
            }
            GatewayEvent::Disconnected { .. } => {
                self.connection = ConnectionStatus::Disconnected;
                return;
            }
            GatewayEvent::Error { .. } => return,
            GatewayEvent::SessionStart(session) => {
                self.sessions.insert(session.id.clone(), session.clone());
                self.apply_session_to_agent(session);
            }
            GatewayEvent::SessionUpdate(session) => {
                if let Some(existing) = self.sessions.get_mut(&session.id) {
                    *existing = session.clone();
                }
                self.apply_session_to_agent(session);
            }
            GatewayEvent::SessionEnd(ended) => {
                let owner = self
                    .sessions
                    .remove(&ended.id)
                    .map(|s| s.agent_id)
                    .or_else(|| ended.agent_id.clone());
                if let Some(agent) = owner.and_then(|id| self.agent_mut(&id)) {
                    agent.remove_session(&ended.id);
                }
            }
            GatewayEvent::CronUpdate(job) => cron::upsert_sorted(&mut self.cron_jobs, job.clone()),
            GatewayEvent::CronStart(_) | GatewayEvent::CronEnd(_) => {}
            GatewayEvent::AgentStatus(update) => {
                if let Some(agent) = self.agent_mut(&update.id) {
                    agent.merge(update);
                } else {
                    log::debug!("agent.status for unknown agent {:?}", update.id);
                }
            }
            GatewayEvent::Message(message) => self.recent_messages.push(message.clone()),
        }
        self.last_update = Some(envelope.timestamp);
    }

    fn apply_session_to_agent(&mut self, session: &Session) {
        if let Some(agent) = self.agent_mut(&session.agent_id) {
            agent.apply_session(session);
        }
    }
}

/// Handles returned by [`attach`]; pass to [`detach`] to stop updating the state.
pub struct Attachment {
    pub state: Arc<Mutex<DashboardState>>,
    subscriptions: Vec<Subscription>,
}

/// Subscribe a fresh [`DashboardState`] to `client`.
///
/// Every event is applied to the state. On `connected` the gateway is asked for
/// sessions, cron jobs and agents.
pub fn attach(client: &Arc<GatewayClient>) -> Attachment {
    let state = Arc::new(Mutex::new(DashboardState::new()));
    state
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .connection = client.status();

    let s = Arc::clone(&state);
    let apply = client.on(EventFilter::Any, move |env: &Envelope| {
        s.lock().unwrap_or_else(|e| e.into_inner()).apply(env);
    });

    // Weak: the client owns its handlers, so a strong reference would never be released.
    let weak: Weak<GatewayClient> = Arc::downgrade(client);
    let request = client.on(EventKind::Connected, move |_: &Envelope| {
        if let Some(client) = weak.upgrade() {
            client.request_sessions();
            client.request_cron_jobs();
            client.request_agents();
        }
    });

    Attachment {
        state,
        subscriptions: vec![apply, request],
    }
}

impl Attachment {
    /// Connect `client` and show `connecting` until the outcome event arrives.
    pub fn connect(&self, client: &GatewayClient) {
        client.connect();
        self.sync_connection(client);
    }

    /// The manual reconnect button: disconnect, connect, and show `connecting`.
    pub fn reconnect(&self, client: &GatewayClient) {
        client.reconnect();
        self.sync_connection(client);
    }

    // The client changes status before emitting, and the apply handler needs this
    // lock, so a later `connected` / `disconnected` always lands after this write.
    fn sync_connection(&self, client: &GatewayClient) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.connection = client.status();
    }
}

pub fn detach(client: &GatewayClient, attachment: &Attachment) {
    for sub in &attachment.subscriptions {
        client.off(sub);
    }
}
