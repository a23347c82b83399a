//! Durable store port (spec §4.1).
//!
//! Two tiers over one relational backend: typed upsert/list/delete
//! accessors per entity, plus a raw escape hatch restricted to `ext_*`
//! tables for dynamically registered schema extensions.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{
    AgentMessage, ApprovalPolicy, ApprovalRequest, ClockRecord, ManagedAgent, Organization,
    PermissionProfile, QueuedTask, WorkSchedule,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("row not found")]
    NotFound,
    #[error("mutation refused: {0}")]
    Refused(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single row returned from the raw query escape hatch — column name to
/// JSON value, since the caller doesn't know the shape ahead of time.
pub type RawRow = std::collections::BTreeMap<String, serde_json::Value>;

/// Durable persistence port consumed by every service. Implementations
/// (see `infrastructure::database::SqlStore`) own dialect-specific SQL;
/// callers never see SQL.
///
/// Per spec §4.1 and §7: store write failures are logged by the
/// implementation and returned here as `Err`, but callers (the
/// write-behind buffer) are expected to treat them as non-fatal — the
/// in-memory value stays authoritative and the next flush retries.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_org(&self, org: &Organization) -> StoreResult<()>;
    async fn get_org(&self, id: &str) -> StoreResult<Option<Organization>>;
    async fn get_org_by_slug(&self, slug: &str) -> StoreResult<Option<Organization>>;
    async fn list_orgs(&self) -> StoreResult<Vec<Organization>>;
    async fn delete_org(&self, id: &str) -> StoreResult<()>;

    async fn upsert_agent(&self, agent: &ManagedAgent) -> StoreResult<()>;
    async fn get_agent(&self, id: &str) -> StoreResult<Option<ManagedAgent>>;
    async fn list_agents_by_org(&self, org_id: &str) -> StoreResult<Vec<ManagedAgent>>;
    async fn delete_agent(&self, id: &str) -> StoreResult<()>;

    async fn upsert_profile(&self, profile: &PermissionProfile) -> StoreResult<()>;
    async fn get_profile(&self, id: &str) -> StoreResult<Option<PermissionProfile>>;
    async fn list_profiles_by_org(&self, org_id: &str) -> StoreResult<Vec<PermissionProfile>>;
    async fn delete_profile(&self, id: &str) -> StoreResult<()>;

    async fn upsert_approval(&self, req: &ApprovalRequest) -> StoreResult<()>;
    async fn get_approval(&self, id: &str) -> StoreResult<Option<ApprovalRequest>>;
    async fn list_approvals_by_org(&self, org_id: &str) -> StoreResult<Vec<ApprovalRequest>>;

    async fn upsert_approval_policy(&self, policy: &ApprovalPolicy) -> StoreResult<()>;
    async fn list_approval_policies(&self, org_id: &str) -> StoreResult<Vec<ApprovalPolicy>>;
    async fn delete_approval_policy(&self, id: &str) -> StoreResult<()>;

    async fn upsert_schedule(&self, schedule: &WorkSchedule) -> StoreResult<()>;
    async fn get_schedule_by_agent(&self, agent_id: &str) -> StoreResult<Option<WorkSchedule>>;
    async fn delete_schedule(&self, agent_id: &str) -> StoreResult<()>;

    async fn insert_clock_record(&self, record: &ClockRecord) -> StoreResult<()>;
    async fn list_clock_records(&self, agent_id: &str, limit: u32) -> StoreResult<Vec<ClockRecord>>;

    async fn upsert_task(&self, task: &QueuedTask) -> StoreResult<()>;
    async fn list_tasks_by_agent(&self, agent_id: &str) -> StoreResult<Vec<QueuedTask>>;
    async fn delete_tasks_by_agent(&self, agent_id: &str) -> StoreResult<()>;

    async fn insert_message(&self, message: &AgentMessage) -> StoreResult<()>;
    async fn update_message(&self, message: &AgentMessage) -> StoreResult<()>;
    async fn list_messages_by_org(&self, org_id: &str, limit: u32) -> StoreResult<Vec<AgentMessage>>;

    /// Register a dynamically-declared table. The implementation MUST
    /// forcibly prefix the stored name with `ext_` regardless of what the
    /// caller passed, isolating it from core tables (spec §4.1).
    async fn register_ext_table(&self, name: &str, columns: &[(String, String)]) -> StoreResult<()>;
    async fn list_ext_tables(&self) -> StoreResult<Vec<String>>;

    /// Raw read-only query escape hatch.
    async fn query(&self, sql: &str, params: Vec<serde_json::Value>) -> StoreResult<Vec<RawRow>>;

    /// Raw mutation escape hatch. MUST refuse (return `StoreError::Refused`)
    /// any statement whose target table is not prefixed `ext_` (spec §4.1,
    /// §6: "mutations restricted to ext_*").
    async fn execute(&self, sql: &str, params: Vec<serde_json::Value>) -> StoreResult<u64>;
}

/// Returns true if `sql` appears to target only `ext_`-prefixed tables.
/// Used by `Store::execute` implementations to enforce the mutation
/// boundary without a full SQL parser: every `INSERT INTO`, `UPDATE`, or
/// `DELETE FROM` target token must start with `ext_`.
pub fn is_ext_only_mutation(sql: &str) -> bool {
    let lower = sql.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    let mut targets = Vec::new();
    for i in 0..tokens.len() {
        match tokens[i] {
            "into" | "from" if i + 1 < tokens.len() => {
                // skip only for insert/delete contexts; update's target is its own token.
                targets.push(tokens[i + 1]);
            }
            "update" if i + 1 < tokens.len() => targets.push(tokens[i + 1]),
            _ => {}
        }
    }
    if targets.is_empty() {
        return false;
    }
    targets.iter().all(|t| {
        let name = t.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        name.starts_with("ext_")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ext_prefixed_mutations() {
        assert!(is_ext_only_mutation("INSERT INTO ext_widgets (a) VALUES (?)"));
        assert!(is_ext_only_mutation("UPDATE ext_widgets SET a = ?"));
        assert!(is_ext_only_mutation("DELETE FROM ext_widgets WHERE id = ?"));
    }

    #[test]
    fn refuses_core_table_mutations() {
        assert!(!is_ext_only_mutation("UPDATE organizations SET plan = ?"));
        assert!(!is_ext_only_mutation("DELETE FROM managed_agents"));
        assert!(!is_ext_only_mutation("INSERT INTO agent_messages (a) VALUES (?)"));
    }
}
