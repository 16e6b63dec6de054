//! Chat message model and the request context handed to applications.

use serde::{Deserialize, Serialize};

/// Raw timestamps below this value are seconds; at or above it they are already milliseconds.
const SECONDS_SCALE_LIMIT: i64 = 100_000_000_000;

/// A chat message extracted from the page. Timestamp is always epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
}

/// Entries already on the page report seconds while freshly submitted ones report
/// milliseconds; bring both to milliseconds.
pub fn normalize_timestamp(raw: i64) -> i64 {
    if raw < SECONDS_SCALE_LIMIT {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

/// Operator (the account the bot runs as) and owner (the room host), resolved at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identities {
    pub operator: String,
    pub owner: String,
}

/// How a sender relates to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Operator,
    Owner,
    Audience,
}

impl Role {
    /// Operator and owner may run management commands.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Operator | Role::Owner)
    }
}

/// Read-only view of one message passed to applications.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub operator: String,
    pub owner: String,
    pub message: Message,
}

impl RequestContext {
    pub fn new(identities: &Identities, message: Message) -> Self {
        Self {
            operator: identities.operator.clone(),
            owner: identities.owner.clone(),
            message,
        }
    }

    /// Classify the sender. When operator and owner are the same account the sender is the operator.
    pub fn role(&self) -> Role {
        let sender = self.message.sender.as_str();
        if sender == self.operator {
            Role::Operator
        } else if sender == self.owner {
            Role::Owner
        } else {
            Role::Audience
        }
    }
}
