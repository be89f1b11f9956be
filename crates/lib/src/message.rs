//! Messages logged by agents and the bounded recent-messages log.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many messages the recent-messages log retains.
pub const RECENT_MESSAGES_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    pub timestamp: String,
    pub channel: String,
    #[serde(rename = "type")]
    pub direction: Direction,
}

/// Fixed-capacity log of the most recent messages, newest first.
#[derive(Debug, Clone)]
pub struct RecentMessages {
    entries: VecDeque<Message>,
    capacity: usize,
}

impl Default for RecentMessages {
    fn default() -> Self {
        Self::with_capacity(RECENT_MESSAGES_CAPACITY)
    }
}

impl RecentMessages {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a message, evicting the oldest entry once full.
    pub fn push(&mut self, message: Message) {
        self.entries.push_front(message);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
