//! Communication observer: the agent email directory and inter-agent
//! traffic classifier (spec §4.10).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    external_agent_id, is_external_agent_id, AgentMessage, Channel, Direction, MessageType,
};
use crate::domain::ports::Store;

/// Ring cap on messages considered for topology/stats queries (spec §4.10, §5).
const MESSAGE_RING_CAP: u32 = 2000;

const AGENT_TO_AGENT_TOOLS: &[&str] =
    &["message_agent", "call_agent", "check_tasks", "claim_task", "complete_task", "submit_result"];

#[derive(Debug, Clone)]
struct DirectoryEntry {
    agent_id: String,
    org_id: String,
    display_name: String,
}

/// `lowercased email -> {agentId, orgId, displayName}` plus the reverse
/// `orgId -> set(emails)` index, rebuilt on lifecycle events (spec §4.10).
pub struct CommunicationObserver {
    store: Arc<dyn Store>,
    directory: DashMap<String, DirectoryEntry>,
    org_emails: DashMap<String, std::collections::HashSet<String>>,
}

/// Inputs the runtime forwards on every tool call (spec §4.10: "the
/// runtime forwards `(orgId, agentId, toolId, params, result)`").
pub struct ObservedToolCall<'a> {
    pub org_id: &'a str,
    pub agent_id: &'a str,
    pub agent_name: &'a str,
    pub tool_id: &'a str,
    pub params: &'a serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    pub is_external: bool,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
    pub message_count: u64,
    pub channels: HashMap<String, u64>,
    pub direction: Direction,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Topology {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

#[derive(Default)]
pub struct TopologyQuery {
    pub org_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub agent_id: Option<String>,
}

impl CommunicationObserver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, directory: DashMap::new(), org_emails: DashMap::new() }
    }

    /// Rebuild one agent's directory entry. Called on lifecycle
    /// `created/configured/updated/started/stopped` (spec §4.10).
    pub fn upsert_directory_entry(&self, org_id: &str, agent_id: &str, email: Option<&str>, display_name: &str) {
        let Some(email) = email else { return };
        let key = email.to_lowercase();
        self.directory.insert(
            key.clone(),
            DirectoryEntry { agent_id: agent_id.to_string(), org_id: org_id.to_string(), display_name: display_name.to_string() },
        );
        self.org_emails.entry(org_id.to_string()).or_default().insert(key);
    }

    /// Remove an agent's directory entry, called on `destroyed` (spec §4.10).
    pub fn remove_directory_entry(&self, org_id: &str, email: Option<&str>) {
        let Some(email) = email else { return };
        let key = email.to_lowercase();
        self.directory.remove(&key);
        if let Some(mut set) = self.org_emails.get_mut(org_id) {
            set.remove(&key);
        }
    }

    fn lookup(&self, email: &str) -> Option<DirectoryEntry> {
        self.directory.get(&email.to_lowercase()).map(|e| e.clone())
    }

    /// Classify and persist one observed tool call as zero or more
    /// `AgentMessage`s (spec §4.10).
    pub async fn observe(&self, call: ObservedToolCall<'_>) -> DomainResult<Vec<AgentMessage>> {
        if AGENT_TO_AGENT_TOOLS.contains(&call.tool_id) {
            return self.observe_agent_to_agent(call).await;
        }
        if let Some(kind) = email_tool_kind(call.tool_id) {
            return self.observe_email(call, kind).await;
        }
        debug!(tool_id = %call.tool_id, "tool call is not communication-relevant, not observed");
        Ok(Vec::new())
    }

    async fn observe_agent_to_agent(&self, call: ObservedToolCall<'_>) -> DomainResult<Vec<AgentMessage>> {
        if matches!(call.tool_id, "claim_task" | "complete_task" | "submit_result") {
            if let Some(task_id) = call.params.get("taskId").and_then(|v| v.as_str()) {
                self.update_message_by_task_id(call.org_id, task_id, call.tool_id).await?;
            }
            return Ok(Vec::new());
        }

        let to_agent_id = call.params.get("agentId").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let message = AgentMessage {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: call.org_id.to_string(),
            from_agent_id: call.agent_id.to_string(),
            to_agent_id,
            message_type: if call.tool_id == "call_agent" { MessageType::Handoff } else { MessageType::Message },
            subject: None,
            content: call.params.get("message").and_then(|v| v.as_str()).map(str::to_string),
            metadata: call.params.clone(),
            status: "sent".to_string(),
            priority: "normal".to_string(),
            direction: Direction::Internal,
            channel: Channel::Direct,
            deadline: None,
            claimed_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.insert_message(&message).await.map_err(store_err)?;
        Ok(vec![message])
    }

    async fn observe_email(&self, call: ObservedToolCall<'_>, kind: EmailToolKind) -> DomainResult<Vec<AgentMessage>> {
        let recipients = parse_recipients(call.params);
        let mut messages = Vec::with_capacity(recipients.len());

        for email in recipients {
            let hit = self.lookup(&email).filter(|e| e.org_id == call.org_id);
            let (to_agent_id, direction) = match hit {
                Some(entry) => (entry.agent_id, Direction::Internal),
                None => (external_agent_id(&email), Direction::ExternalOutbound),
            };
            let message = AgentMessage {
                id: uuid::Uuid::new_v4().to_string(),
                org_id: call.org_id.to_string(),
                from_agent_id: call.agent_id.to_string(),
                to_agent_id,
                message_type: MessageType::Message,
                subject: call.params.get("subject").and_then(|v| v.as_str()).map(str::to_string),
                content: call.params.get("body").and_then(|v| v.as_str()).map(str::to_string),
                metadata: serde_json::json!({ "emailTool": kind.as_str() }),
                status: "sent".to_string(),
                priority: "normal".to_string(),
                direction,
                channel: Channel::Email,
                deadline: None,
                claimed_at: None,
                completed_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.store.insert_message(&message).await.map_err(store_err)?;
            messages.push(message);
        }
        Ok(messages)
    }

    async fn update_message_by_task_id(&self, org_id: &str, task_id: &str, tool_id: &str) -> DomainResult<()> {
        let messages = self.store.list_messages_by_org(org_id, MESSAGE_RING_CAP).await.map_err(store_err)?;
        if let Some(mut message) = messages
            .into_iter()
            .find(|m| m.metadata.get("taskId").and_then(|v| v.as_str()) == Some(task_id))
        {
            let now = Utc::now();
            message.status = match tool_id {
                "claim_task" => "claimed",
                "complete_task" | "submit_result" => "completed",
                _ => message.status.as_str(),
            }
            .to_string();
            if tool_id == "claim_task" {
                message.claimed_at = Some(now);
            } else {
                message.completed_at = Some(now);
            }
            message.updated_at = now;
            self.store.update_message(&message).await.map_err(store_err)?;
        }
        Ok(())
    }

    /// Fold the recent message ring into a node/edge topology (spec §4.10).
    pub async fn get_topology(&self, query: TopologyQuery) -> DomainResult<Topology> {
        let org_id = query.org_id.unwrap_or_default();
        let messages = self.store.list_messages_by_org(&org_id, MESSAGE_RING_CAP).await.map_err(store_err)?;

        let mut nodes: HashMap<String, TopologyNode> = HashMap::new();
        let mut edges: HashMap<(String, String), TopologyEdge> = HashMap::new();

        for message in messages {
            if let Some(since) = query.since {
                if message.created_at < since {
                    continue;
                }
            }
            if let Some(agent_id) = &query.agent_id {
                if &message.from_agent_id != agent_id && &message.to_agent_id != agent_id {
                    continue;
                }
            }

            for id in [&message.from_agent_id, &message.to_agent_id] {
                nodes.entry(id.clone()).or_insert_with(|| TopologyNode {
                    id: id.clone(),
                    is_external: is_external_agent_id(id),
                    display_name: None,
                });
            }

            let key = (message.from_agent_id.clone(), message.to_agent_id.clone());
            let edge = edges.entry(key).or_insert_with(|| TopologyEdge {
                from: message.from_agent_id.clone(),
                to: message.to_agent_id.clone(),
                message_count: 0,
                channels: HashMap::new(),
                direction: message.direction,
                last_activity: message.created_at,
            });
            edge.message_count += 1;
            *edge.channels.entry(channel_str(message.channel).to_string()).or_insert(0) += 1;
            if message.created_at > edge.last_activity {
                edge.last_activity = message.created_at;
            }
        }

        Ok(Topology { nodes: nodes.into_values().collect(), edges: edges.into_values().collect() })
    }
}

#[derive(Debug, Clone, Copy)]
enum EmailToolKind {
    Send,
    Reply,
    Forward,
}

impl EmailToolKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Reply => "reply",
            Self::Forward => "forward",
        }
    }
}

fn email_tool_kind(tool_id: &str) -> Option<EmailToolKind> {
    if tool_id.ends_with("send") && tool_id.contains("email") {
        Some(EmailToolKind::Send)
    } else if tool_id.ends_with("reply") {
        Some(EmailToolKind::Reply)
    } else if tool_id.ends_with("forward") {
        Some(EmailToolKind::Forward)
    } else {
        None
    }
}

fn channel_str(channel: Channel) -> &'static str {
    match channel {
        Channel::Direct => "direct",
        Channel::Email => "email",
        Channel::Task => "task",
    }
}

/// Parse `to`/`cc`/`bcc` from the tool params, accepting either a JSON
/// array or a comma-delimited string, lowercased and trimmed, deduped
/// (spec §4.10).
fn parse_recipients(params: &serde_json::Value) -> Vec<String> {
    let mut out = Vec::new();
    for field in ["to", "cc", "bcc"] {
        let Some(value) = params.get(field) else { continue };
        match value {
            serde_json::Value::String(s) => {
                out.extend(s.split(',').map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()));
            }
            serde_json::Value::Array(items) => {
                out.extend(
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(|e| e.trim().to_lowercase())
                        .filter(|e| !e.is_empty()),
                );
            }
            _ => {}
        }
    }
    out.sort();
    out.dedup();
    out
}

fn store_err(e: crate::domain::ports::StoreError) -> crate::domain::errors::DomainError {
    crate::domain::errors::DomainError::Validation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{dialect::Dialect, migrations, SqlStore};
    use sqlx::SqlitePool;

    async fn observer() -> CommunicationObserver {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool, Dialect::Sqlite).await.unwrap();
        CommunicationObserver::new(Arc::new(SqlStore::new(pool)))
    }

    #[tokio::test]
    async fn email_to_known_agent_is_internal() {
        let obs = observer().await;
        obs.upsert_directory_entry("o1", "a2", Some("bob@example.com"), "Bob");
        let params = serde_json::json!({ "to": "bob@example.com", "subject": "hi", "body": "hello" });
        let call = ObservedToolCall { org_id: "o1", agent_id: "a1", agent_name: "Alice", tool_id: "email.send", params: &params };
        let messages = obs.observe(call).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Internal);
        assert_eq!(messages[0].to_agent_id, "a2");
    }

    #[tokio::test]
    async fn email_to_unknown_recipient_is_external() {
        let obs = observer().await;
        let params = serde_json::json!({ "to": "stranger@example.com" });
        let call = ObservedToolCall { org_id: "o1", agent_id: "a1", agent_name: "Alice", tool_id: "email.send", params: &params };
        let messages = obs.observe(call).await.unwrap();
        assert_eq!(messages[0].direction, Direction::ExternalOutbound);
        assert!(is_external_agent_id(&messages[0].to_agent_id));
    }

    #[tokio::test]
    async fn comma_delimited_recipients_are_split_and_deduped() {
        let obs = observer().await;
        let params = serde_json::json!({ "to": "a@x.com, B@X.com , a@x.com" });
        let call = ObservedToolCall { org_id: "o1", agent_id: "a1", agent_name: "Alice", tool_id: "email.send", params: &params };
        let messages = obs.observe(call).await.unwrap();
        assert_eq!(messages.len(), 1, "duplicate (case-insensitive) recipients collapse to one message");
    }

    #[tokio::test]
    async fn message_agent_call_is_internal_and_persisted() {
        let obs = observer().await;
        let params = serde_json::json!({ "agentId": "a2", "message": "status?" });
        let call = ObservedToolCall { org_id: "o1", agent_id: "a1", agent_name: "Alice", tool_id: "message_agent", params: &params };
        let messages = obs.observe(call).await.unwrap();
        assert_eq!(messages[0].direction, Direction::Internal);
        assert_eq!(messages[0].to_agent_id, "a2");
    }

    #[tokio::test]
    async fn topology_aggregates_edge_counts() {
        let obs = observer().await;
        for _ in 0..3 {
            let params = serde_json::json!({ "agentId": "a2", "message": "hi" });
            let call = ObservedToolCall { org_id: "o1", agent_id: "a1", agent_name: "Alice", tool_id: "message_agent", params: &params };
            obs.observe(call).await.unwrap();
        }
        let topology = obs.get_topology(TopologyQuery { org_id: Some("o1".to_string()), ..Default::default() }).await.unwrap();
        assert_eq!(topology.edges.len(), 1);
        assert_eq!(topology.edges[0].message_count, 3);
    }
}
