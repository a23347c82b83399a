//! Human-in-the-loop approval workflow (spec §4.5).

use std::sync::Arc;

use chrono::Utc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ApprovalAction, ApprovalDecision, ApprovalPolicy, ApprovalRequest, ApprovalStatus, RiskLevel,
};
use crate::domain::ports::Store;
use crate::services::event_bus::EventBus;

pub struct ApprovalWorkflow {
    store: Arc<dyn Store>,
    event_bus: Arc<EventBus>,
}

pub struct ApprovalRequestInput<'a> {
    pub agent_id: &'a str,
    pub agent_name: &'a str,
    pub org_id: &'a str,
    pub tool_id: &'a str,
    pub tool_name: &'a str,
    pub reason: &'a str,
    pub risk_level: RiskLevel,
    pub side_effects: Vec<String>,
    pub parameters: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn Store>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    /// Create a pending approval. The timeout is resolved from whichever
    /// policy matches the call with the highest `priority`, falling back
    /// to 30 minutes auto-expire (spec §9: "policy matching is a
    /// first-class match with explicit priority").
    pub async fn request(&self, input: ApprovalRequestInput<'_>) -> DomainResult<ApprovalRequest> {
        let policies = self.store.list_approval_policies(input.org_id).await.map_err(store_err)?;
        let policy = best_matching_policy(&policies, input.tool_id, input.risk_level, &input.side_effects);
        let timeout_minutes = policy.map(|p| p.timeout_minutes).unwrap_or(30);

        let now = Utc::now();
        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: input.agent_id.to_string(),
            agent_name: input.agent_name.to_string(),
            org_id: input.org_id.to_string(),
            tool_id: input.tool_id.to_string(),
            tool_name: input.tool_name.to_string(),
            reason: input.reason.to_string(),
            risk_level: input.risk_level,
            side_effects: input.side_effects,
            parameters: input.parameters,
            context: input.context,
            status: ApprovalStatus::Pending,
            decision: None,
            expires_at: now + chrono::Duration::minutes(timeout_minutes as i64),
            created_at: now,
        };
        self.store.upsert_approval(&request).await.map_err(store_err)?;

        self.event_bus
            .publish(
                request.org_id.clone(),
                crate::domain::models::EventPayload::ApprovalRequested {
                    approval_id: request.id.clone(),
                    agent_id: request.agent_id.clone(),
                    tool_id: request.tool_id.clone(),
                    risk: request.risk_level,
                },
            )
            .await;

        Ok(request)
    }

    pub async fn decide(
        &self,
        approval_id: &str,
        action: ApprovalAction,
        decided_by: &str,
        reason: Option<String>,
    ) -> DomainResult<ApprovalRequest> {
        let mut request = self
            .store
            .get_approval(approval_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| DomainError::ApprovalNotFound(approval_id.to_string()))?;

        if request.status.is_terminal() {
            return Err(DomainError::ApprovalNotPending(approval_id.to_string()));
        }

        request.status = match action {
            ApprovalAction::Approved => ApprovalStatus::Approved,
            ApprovalAction::Denied => ApprovalStatus::Denied,
        };
        request.decision = Some(ApprovalDecision {
            by: decided_by.to_string(),
            at: Utc::now(),
            reason,
        });
        self.store.upsert_approval(&request).await.map_err(store_err)?;

        self.event_bus
            .publish(
                request.org_id.clone(),
                crate::domain::models::EventPayload::ApprovalDecided {
                    approval_id: request.id.clone(),
                    status: status_str(request.status).to_string(),
                },
            )
            .await;

        Ok(request)
    }

    /// Expire every pending request whose `expires_at` has passed. Called
    /// by the workforce scheduler's tick (spec §4.9). Policy-driven:
    /// requests under a policy with `auto_deny_on_timeout` become
    /// `auto_denied` instead of `expired`.
    pub async fn sweep_expired(&self, org_id: &str) -> DomainResult<Vec<ApprovalRequest>> {
        let policies = self.store.list_approval_policies(org_id).await.map_err(store_err)?;
        let requests = self.store.list_approvals_by_org(org_id).await.map_err(store_err)?;
        let now = Utc::now();
        let mut expired = Vec::new();

        for mut request in requests {
            if request.status != ApprovalStatus::Pending || request.expires_at > now {
                continue;
            }
            let policy = best_matching_policy(&policies, &request.tool_id, request.risk_level, &request.side_effects);
            let auto_deny = policy.map(|p| p.auto_deny_on_timeout).unwrap_or(false);
            request.status = if auto_deny { ApprovalStatus::AutoDenied } else { ApprovalStatus::Expired };
            self.store.upsert_approval(&request).await.map_err(store_err)?;
            self.event_bus
                .publish(
                    request.org_id.clone(),
                    crate::domain::models::EventPayload::ApprovalDecided {
                        approval_id: request.id.clone(),
                        status: status_str(request.status).to_string(),
                    },
                )
                .await;
            expired.push(request);
        }

        Ok(expired)
    }
}

fn status_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Denied => "denied",
        ApprovalStatus::Expired => "expired",
        ApprovalStatus::AutoDenied => "auto_denied",
    }
}

fn best_matching_policy<'a>(
    policies: &'a [ApprovalPolicy],
    tool_id: &str,
    risk: RiskLevel,
    side_effects: &[String],
) -> Option<&'a ApprovalPolicy> {
    policies
        .iter()
        .filter(|p| p.matches(tool_id, risk, side_effects))
        .max_by_key(|p| p.priority)
}

fn store_err(e: crate::domain::ports::StoreError) -> DomainError {
    DomainError::Validation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{dialect::Dialect, migrations, SqlStore};
    use sqlx::SqlitePool;

    async fn workflow() -> ApprovalWorkflow {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool, Dialect::Sqlite).await.unwrap();
        ApprovalWorkflow::new(Arc::new(SqlStore::new(pool)), Arc::new(EventBus::new()))
    }

    fn input<'a>(org_id: &'a str) -> ApprovalRequestInput<'a> {
        ApprovalRequestInput {
            agent_id: "a1",
            agent_name: "Bot",
            org_id,
            tool_id: "email.send",
            tool_name: "Send Email",
            reason: "followup",
            risk_level: RiskLevel::Medium,
            side_effects: vec!["sends-email".to_string()],
            parameters: None,
            context: None,
        }
    }

    #[tokio::test]
    async fn decide_transitions_pending_to_approved() {
        let wf = workflow().await;
        let request = wf.request(input("o1")).await.unwrap();
        let decided = wf.decide(&request.id, ApprovalAction::Approved, "admin", None).await.unwrap();
        assert_eq!(decided.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn deciding_a_terminal_request_fails() {
        let wf = workflow().await;
        let request = wf.request(input("o1")).await.unwrap();
        wf.decide(&request.id, ApprovalAction::Denied, "admin", None).await.unwrap();
        let err = wf.decide(&request.id, ApprovalAction::Approved, "admin", None).await.unwrap_err();
        assert!(matches!(err, DomainError::ApprovalNotPending(_)));
    }

    #[tokio::test]
    async fn sweep_expires_overdue_pending_requests() {
        let wf = workflow().await;
        let mut request = wf.request(input("o1")).await.unwrap();
        request.expires_at = Utc::now() - chrono::Duration::minutes(1);
        wf.store.upsert_approval(&request).await.unwrap();
        let expired = wf.sweep_expired("o1").await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, ApprovalStatus::Expired);
    }
}
