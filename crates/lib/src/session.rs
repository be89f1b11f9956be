//! Agent sessions as reported by the gateway.
//!
//! A session is one in-flight unit of work assigned to an agent. The client
//! does not keep sessions; consumers accumulate them from `session.*` events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique session identifier (assigned by the gateway).
pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Completed,
    Error,
}

/// Full session record carried by `session.start` and `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub agent_id: String,
    pub status: SessionStatus,
    /// Start time as sent by the gateway (usually RFC 3339).
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Payload of `session.end`: only the id is required, the rest of the record is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}
