//! Inter-agent messaging envelope types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of payload a message carries; determines which handler in the
/// messaging layer's dispatch table processes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    TaskResult,
    StatusReport,
    ResourceRequest,
    KnowledgeShare,
    CustomerRequest,
    Alert,
    ShutdownRequest,
    PeerQuery,
    PeerResponse,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TaskAssignment => "task_assignment",
            Self::TaskResult => "task_result",
            Self::StatusReport => "status_report",
            Self::ResourceRequest => "resource_request",
            Self::KnowledgeShare => "knowledge_share",
            Self::CustomerRequest => "customer_request",
            Self::Alert => "alert",
            Self::ShutdownRequest => "shutdown_request",
            Self::PeerQuery => "peer_query",
            Self::PeerResponse => "peer_response",
        };
        f.write_str(s)
    }
}

impl FromStr for MessageType {
    type Err = MessageTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_assignment" => Ok(Self::TaskAssignment),
            "task_result" => Ok(Self::TaskResult),
            "status_report" => Ok(Self::StatusReport),
            "resource_request" => Ok(Self::ResourceRequest),
            "knowledge_share" => Ok(Self::KnowledgeShare),
            "customer_request" => Ok(Self::CustomerRequest),
            "alert" => Ok(Self::Alert),
            "shutdown_request" => Ok(Self::ShutdownRequest),
            "peer_query" => Ok(Self::PeerQuery),
            "peer_response" => Ok(Self::PeerResponse),
            other => Err(MessageTypeParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageTypeParseError(pub String);

impl fmt::Display for MessageTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid message type: {:?}", self.0)
    }
}

impl std::error::Error for MessageTypeParseError {}

/// Delivery priority. Ordered so that `Critical` sorts before `Low`:
/// `processInbox` drains its batch highest-priority-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Critical,
    High,
    Normal,
    Low,
}

impl MessagePriority {
    fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

impl PartialOrd for MessagePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessagePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for MessagePriority {
    type Err = MessagePriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(MessagePriorityParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessagePriorityParseError(pub String);

impl fmt::Display for MessagePriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid message priority: {:?}", self.0)
    }
}

impl std::error::Error for MessagePriorityParseError {}

/// An envelope exchanged between the parent agent and a child, or between
/// two children via the parent's relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub from: String,
    pub to: String,
    pub goal_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub content: String,
    pub priority: MessagePriority,
    pub requires_response: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// One unprocessed row in the inbox, as the durable store hands it back:
/// an opaque envelope payload the messaging layer still has to parse.
/// Kept separate from `AgentMessage` because a malformed row is a valid
/// outcome the messaging layer must handle, not a store-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxRow {
    pub id: Uuid,
    pub raw: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_display_roundtrip() {
        let variants = [
            MessageType::TaskAssignment,
            MessageType::TaskResult,
            MessageType::StatusReport,
            MessageType::ResourceRequest,
            MessageType::KnowledgeShare,
            MessageType::CustomerRequest,
            MessageType::Alert,
            MessageType::ShutdownRequest,
            MessageType::PeerQuery,
            MessageType::PeerResponse,
        ];
        for v in &variants {
            let parsed: MessageType = v.to_string().parse().unwrap();
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn priority_ordering_puts_critical_first() {
        let mut priorities = vec![
            MessagePriority::Low,
            MessagePriority::Critical,
            MessagePriority::Normal,
            MessagePriority::High,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                MessagePriority::Critical,
                MessagePriority::High,
                MessagePriority::Normal,
                MessagePriority::Low,
            ]
        );
    }
}
