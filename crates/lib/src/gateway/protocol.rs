//! Gateway WebSocket protocol types (inbound events, outbound requests).
//!
//! Inbound frames are JSON objects `{ "type": <kind>, "data": <payload> }`; when
//! `data` is absent the object itself is the payload. Outbound requests are
//! `{ "action": ... }` objects and are fire-and-forget.

use crate::agent::AgentUpdate;
use crate::cron::{CronJob, CronRef};
use crate::message::Message;
use crate::session::{Session, SessionRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Discriminator of a [`GatewayEvent`], as it appears in the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    SessionUpdate,
    CronStart,
    CronEnd,
    CronUpdate,
    Message,
    AgentStatus,
    Connected,
    Disconnected,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::SessionStart,
        EventKind::SessionEnd,
        EventKind::SessionUpdate,
        EventKind::CronStart,
        EventKind::CronEnd,
        EventKind::CronUpdate,
        EventKind::Message,
        EventKind::AgentStatus,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStart => "session.start",
            EventKind::SessionEnd => "session.end",
            EventKind::SessionUpdate => "session.update",
            EventKind::CronStart => "cron.start",
            EventKind::CronEnd => "cron.end",
            EventKind::CronUpdate => "cron.update",
            EventKind::Message => "message",
            EventKind::AgentStatus => "agent.status",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed gateway event. Remote events come from inbound frames; `Connected`,
/// `Disconnected` and `Error` are produced by the client itself.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    SessionStart(Session),
    SessionEnd(SessionRef),
    SessionUpdate(Session),
    CronStart(CronRef),
    CronEnd(CronRef),
    CronUpdate(CronJob),
    Message(Message),
    AgentStatus(AgentUpdate),
    Connected { url: String },
    Disconnected { code: Option<u16>, reason: String },
    Error { error: String },
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GatewayEvent::SessionStart(_) => EventKind::SessionStart,
            GatewayEvent::SessionEnd(_) => EventKind::SessionEnd,
            GatewayEvent::SessionUpdate(_) => EventKind::SessionUpdate,
            GatewayEvent::CronStart(_) => EventKind::CronStart,
            GatewayEvent::CronEnd(_) => EventKind::CronEnd,
            GatewayEvent::CronUpdate(_) => EventKind::CronUpdate,
            GatewayEvent::Message(_) => EventKind::Message,
            GatewayEvent::AgentStatus(_) => EventKind::AgentStatus,
            GatewayEvent::Connected { .. } => EventKind::Connected,
            GatewayEvent::Disconnected { .. } => EventKind::Disconnected,
            GatewayEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Decode the payload of a remote event of the given kind.
    /// Returns `Ok(None)` for `connected` and `disconnected`, which only the client produces.
    fn from_payload(kind: EventKind, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match kind {
            EventKind::SessionStart => GatewayEvent::SessionStart(serde_json::from_value(data)?),
            EventKind::SessionEnd => GatewayEvent::SessionEnd(serde_json::from_value(data)?),
            EventKind::SessionUpdate => GatewayEvent::SessionUpdate(serde_json::from_value(data)?),
            EventKind::CronStart => GatewayEvent::CronStart(serde_json::from_value(data)?),
            EventKind::CronEnd => GatewayEvent::CronEnd(serde_json::from_value(data)?),
            EventKind::CronUpdate => GatewayEvent::CronUpdate(serde_json::from_value(data)?),
            EventKind::Message => GatewayEvent::Message(serde_json::from_value(data)?),
            EventKind::AgentStatus => GatewayEvent::AgentStatus(serde_json::from_value(data)?),
            EventKind::Error => GatewayEvent::Error {
                error: error_text(data),
            },
            EventKind::Connected | EventKind::Disconnected => {
                log::debug!("ignoring remote {} frame, the client reports its own", kind);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Text of a gateway-sent `error` payload: its `error` or `message` field, else the payload itself.
fn error_text(data: Value) -> String {
    match &data {
        Value::String(s) => s.clone(),
        Value::Object(obj) => ["error", "message"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        _ => data.to_string(),
    }
}

/// A delivered event together with the time it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: GatewayEvent,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn now(event: GatewayEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Render in the inbound frame shape (`type` plus `data`), with the delivery time added.
    pub fn to_json(&self) -> Value {
        let data = match &self.event {
            GatewayEvent::SessionStart(s) | GatewayEvent::SessionUpdate(s) => serde_json::to_value(s),
            GatewayEvent::SessionEnd(r) => serde_json::to_value(r),
            GatewayEvent::CronStart(r) | GatewayEvent::CronEnd(r) => serde_json::to_value(r),
            GatewayEvent::CronUpdate(job) => serde_json::to_value(job),
            GatewayEvent::Message(m) => serde_json::to_value(m),
            GatewayEvent::AgentStatus(u) => serde_json::to_value(u),
            GatewayEvent::Connected { url } => Ok(json!({ "url": url })),
            GatewayEvent::Disconnected { code, reason } => Ok(json!({ "code": code, "reason": reason })),
            GatewayEvent::Error { error } => Ok(json!({ "error": error })),
        }
        .unwrap_or(Value::Null);
        json!({
            "type": self.kind().as_str(),
            "data": data,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one inbound text frame.
///
/// `Ok(None)` means the frame is tolerated noise: not an object, no `type`
/// discriminator, a kind this client does not know, or a remote `connected` /
/// `disconnected`.
pub fn parse_frame(text: &str) -> Result<Option<GatewayEvent>, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut obj) = value else {
        return Ok(None);
    };
    let Some(type_name) = obj.get("type").and_then(|v| v.as_str()).map(str::to_string) else {
        return Ok(None);
    };
    let Some(kind) = EventKind::parse(&type_name) else {
        log::debug!("ignoring gateway frame of unknown type {:?}", type_name);
        return Ok(None);
    };
    let data = match obj.remove("data") {
        Some(data) if is_truthy(&data) => data,
        _ => Value::Object(obj),
    };
    GatewayEvent::from_payload(kind, data).map_err(|source| FrameError::Payload { kind, source })
}

/// `null`, `false`, `0` and `""` do not count as a payload; the whole frame is used instead.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Event categories named in the subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Sessions,
    Cron,
    Messages,
    Agents,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Sessions, Topic::Cron, Topic::Messages, Topic::Agents];
}

/// Outbound request: `{ "action": "subscribe", "events": [...] }`, `{ "action": "getSessions" }`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum GatewayRequest {
    Subscribe { events: Vec<Topic> },
    GetSessions,
    GetCronJobs,
    GetAgents,
}

impl GatewayRequest {
    /// The subscription sent right after every successful open.
    pub fn subscribe_all() -> Self {
        GatewayRequest::Subscribe {
            events: Topic::ALL.to_vec(),
        }
    }
}
