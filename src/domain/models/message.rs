//! Observed agent-traffic domain model (spec §3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Message,
    Task,
    Handoff,
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Internal,
    ExternalOutbound,
    ExternalInbound,
    Escalation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Direct,
    Email,
    Task,
}

/// Prefix used to represent an external counterparty in `to_agent_id`, so
/// internal and external traffic share one mapping type (spec §3).
pub const EXTERNAL_PREFIX: &str = "ext:";

pub fn external_agent_id(email: &str) -> String {
    format!("{EXTERNAL_PREFIX}{email}")
}

pub fn is_external_agent_id(id: &str) -> bool {
    id.starts_with(EXTERNAL_PREFIX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub org_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub message_type: MessageType,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub metadata: serde_json::Value,
    pub status: String,
    pub priority: String,
    pub direction: Direction,
    pub channel: Channel,
    pub deadline: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
