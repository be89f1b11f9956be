//! Agents: the fixed roster of remote actors shown on the dashboard.
//!
//! Records are seeded from [`default_roster`] and only ever patched in place,
//! either by an `agent.status` update or implicitly by session events.

use crate::session::Session;
use serde::{Deserialize, Deserializer, Serialize};

/// Label used for `last_active` while an agent has a live session.
pub const ACTIVE_NOW: &str = "Active now";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Idle,
    Offline,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Busy => "busy",
            AgentStatus::Idle => "idle",
            AgentStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    pub last_active: String,
    /// Avatar glyph (single letter).
    pub avatar: String,
    /// Accent color (gradient class names in the web dashboard).
    pub color: String,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Partial agent record carried by `agent.status`.
///
/// Omitted fields leave the existing value untouched. For `current_task` an
/// explicit `null` clears the task, which is why it is a double option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_task: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<Session>>,
}

/// `Some(None)` for a present `null`, `None` (via `default`) for an absent field.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Agent {
    fn seed(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: AgentStatus::Offline,
            current_task: None,
            last_active: "Never".to_string(),
            avatar: name.chars().take(1).collect(),
            color: color.to_string(),
            sessions: Vec::new(),
        }
    }

    /// Merge a partial update into this record. Returns false if the ids differ.
    pub fn merge(&mut self, update: &AgentUpdate) -> bool {
        if update.id != self.id {
            return false;
        }
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(task) = &update.current_task {
            self.current_task = task.clone();
        }
        if let Some(last_active) = &update.last_active {
            self.last_active = last_active.clone();
        }
        if let Some(avatar) = &update.avatar {
            self.avatar = avatar.clone();
        }
        if let Some(color) = &update.color {
            self.color = color.clone();
        }
        if let Some(sessions) = &update.sessions {
            self.sessions = sessions.clone();
        }
        true
    }

    /// Reflect a started or updated session on its owning agent.
    pub fn apply_session(&mut self, session: &Session) {
        self.status = if session.is_active() {
            AgentStatus::Busy
        } else {
            AgentStatus::Online
        };
        self.current_task = session.task.clone();
        self.last_active = ACTIVE_NOW.to_string();
        self.sessions.retain(|s| s.id != session.id);
        self.sessions.push(session.clone());
    }

    /// Drop an ended session from this agent's list.
    pub fn remove_session(&mut self, id: &str) {
        self.sessions.retain(|s| s.id != id);
    }
}

/// The agents known at startup, all offline until the gateway reports otherwise.
pub fn default_roster() -> Vec<Agent> {
    vec![
        Agent::seed("jarvis", "Jarvis", "from-purple-600 to-indigo-600"),
        Agent::seed("friday", "Friday", "from-blue-600 to-cyan-600"),
        Agent::seed("glass", "Glass", "from-emerald-600 to-teal-600"),
        Agent::seed("epstein", "Epstein", "from-orange-600 to-amber-600"),
        Agent::seed("yuri", "Yuri", "from-rose-600 to-pink-600"),
    ]
}
