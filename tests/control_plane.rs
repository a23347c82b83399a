//! End-to-end scenarios wiring every service together against a single
//! in-memory database, mirroring spec §8's walkthroughs. Each test
//! builds its own fully independent stack rather than sharing an
//! `AppContext`, since `AppContext::bootstrap` wants a loaded
//! `ControlPlaneConfig` and a file-backed sqlite path.

use std::sync::Arc;

use async_trait::async_trait;

use foreman::domain::models::{
    AgentConfig, AgentConfigPatch, AgentState, ClockEventType, ClockRecord, DayOfWeek, DayWindow,
    DeploymentConfig, DeploymentTarget, HealthStatus, ModelConfig, OffHoursAction, Plan,
    QuotaResource, ScheduleKind, WeeklyPattern, WorkSchedule,
};
use foreman::domain::ports::{DeployOutcome, DeployStatus, Deployer, ProgressCallback, RunStatus, Store};
use foreman::infrastructure::database::{DatabaseConnection, SqlStore};
use foreman::services::{
    AgentLifecycleManager, AgentRegistry, ApprovalWorkflow, BudgetMeter, CommunicationObserver,
    EventBus, TenantManager, ToolCatalog, WorkforceScheduler,
};

struct FakeDeployer;

#[async_trait]
impl Deployer for FakeDeployer {
    async fn deploy(&self, _config: &AgentConfig, _progress: ProgressCallback<'_>) -> DeployOutcome {
        DeployOutcome::ok()
    }
    async fn stop(&self, _config: &AgentConfig) -> DeployOutcome {
        DeployOutcome::ok()
    }
    async fn restart(&self, _config: &AgentConfig) -> DeployOutcome {
        DeployOutcome::ok()
    }
    async fn update_config(&self, _config: &AgentConfig) -> DeployOutcome {
        DeployOutcome::ok()
    }
    async fn get_status(&self, _config: &AgentConfig) -> DeployStatus {
        DeployStatus { status: RunStatus::Running, health_status: HealthStatus::Healthy, uptime_sec: Some(5), metrics: None }
    }
}

struct Stack {
    store: Arc<dyn Store>,
    tenants: Arc<TenantManager>,
    catalog: Arc<ToolCatalog>,
    lifecycle: Arc<AgentLifecycleManager>,
    approvals: Arc<ApprovalWorkflow>,
    budget: Arc<BudgetMeter>,
    communication: Arc<CommunicationObserver>,
    scheduler: Arc<WorkforceScheduler>,
}

async fn stack() -> Stack {
    let conn = DatabaseConnection::connect_in_memory().await.unwrap();
    let store: Arc<dyn Store> = Arc::new(SqlStore::new(conn.pool));
    let registry = Arc::new(AgentRegistry::new(store.clone()));
    let tenants = Arc::new(TenantManager::new(store.clone()));
    let catalog = Arc::new(ToolCatalog::with_builtin_defaults());
    let event_bus = Arc::new(EventBus::with_store(store.clone()));
    let lifecycle = Arc::new(AgentLifecycleManager::new(registry.clone(), event_bus.clone(), Arc::new(FakeDeployer)));
    let approvals = Arc::new(ApprovalWorkflow::new(store.clone(), event_bus.clone()));
    let budget = Arc::new(BudgetMeter::new(event_bus.clone()));
    let communication = Arc::new(CommunicationObserver::new(store.clone()));
    let scheduler = Arc::new(WorkforceScheduler::new(
        store.clone(),
        registry.clone(),
        lifecycle.clone(),
        tenants.clone(),
        approvals.clone(),
        budget.clone(),
        event_bus.clone(),
    ));
    Stack { store, tenants, catalog, lifecycle, approvals, budget, communication, scheduler }
}

fn complete_patch() -> AgentConfigPatch {
    AgentConfigPatch {
        model: Some(ModelConfig { provider: "openai".into(), model_id: "gpt-4o".into(), temperature: None, max_tokens: None }),
        deployment: Some(DeploymentConfig { target: DeploymentTarget::Local, region: None, resources: None }),
        permission_profile_id: Some("default".into()),
        ..Default::default()
    }
}

/// Scenario 1 (spec §8): single-tenant bootstrap, draft agent through to
/// running, with the lifecycle change durably visible through the store
/// independent of the in-memory registry (the write-behind persistence
/// gap the lifecycle manager closes).
#[tokio::test]
async fn draft_agent_reaches_running_and_survives_a_store_readback() {
    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();

    let draft = s.lifecycle.create_draft(&org.id, "ops-bot").await;
    assert_eq!(draft.state, AgentState::Draft);

    s.lifecycle.update_config(&draft.id, complete_patch()).await.unwrap();
    let deployed = s.lifecycle.deploy(&draft.id).await.unwrap();
    assert_eq!(deployed.state, AgentState::Running);

    let reloaded = s.store.get_agent(&draft.id).await.unwrap().expect("agent persisted to store");
    assert_eq!(reloaded.state, AgentState::Running);
    assert!(reloaded.state_history.len() >= 5);
}

/// Scenario (spec §8): an agent with an incomplete config cannot deploy.
#[tokio::test]
async fn deploy_rejects_an_incomplete_config() {
    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();
    let draft = s.lifecycle.create_draft(&org.id, "half-baked").await;
    let err = s.lifecycle.deploy(&draft.id).await.unwrap_err();
    assert!(matches!(err, foreman::domain::errors::DomainError::IncompleteConfig(_)));
}

/// Scenario (spec §8): tenant quota enforcement blocks agent creation once
/// the plan's agent limit is reached; creating an agent and recording the
/// usage is the caller's responsibility, so the check is independent of
/// the lifecycle manager itself.
#[tokio::test]
async fn agent_quota_blocks_once_the_plan_limit_is_reached() {
    let s = stack().await;
    let org = s.tenants.create_org("Startup", Plan::Free).await.unwrap();

    let limit = s.tenants.check_limit(&org.id, QuotaResource::Agents, 1).await.unwrap();
    assert!(limit.allowed);
    s.tenants.record_usage(&org.id, QuotaResource::Agents, limit.limit).await.unwrap();

    let blocked = s.tenants.check_limit(&org.id, QuotaResource::Agents, 1).await.unwrap();
    assert!(!blocked.allowed);
}

/// Scenario (spec §8): a tool requiring approval under the restricted
/// preset produces a pending request, and deciding it resolves it.
#[tokio::test]
async fn permission_requires_approval_then_workflow_resolves_it() {
    use foreman::domain::models::{ApprovalAction, ApprovalStatus, PermissionProfile, RiskLevel};
    use foreman::services::permission_engine::{PermissionEngine, RateCounters};

    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();

    let mut profile = PermissionProfile::preset_restricted("p1", &org.id);
    profile.skills.list.push("email".to_string());

    let engine = PermissionEngine::new(&s.catalog);
    let decision = engine.evaluate(&profile, "email.send", RateCounters::default(), chrono::Utc::now(), None).unwrap();
    assert!(matches!(decision, foreman::services::permission_engine::PermissionDecision::RequiresApproval { .. }));

    let request = s
        .approvals
        .request(foreman::services::approval_workflow::ApprovalRequestInput {
            agent_id: "a1",
            agent_name: "Mailer",
            org_id: &org.id,
            tool_id: "email.send",
            tool_name: "Send Email",
            reason: "requires approval under this profile".into(),
            risk_level: RiskLevel::Medium,
            side_effects: vec!["sends-email".to_string()],
            parameters: None,
            context: None,
        })
        .await
        .unwrap();
    assert_eq!(request.status, ApprovalStatus::Pending);

    let decided = s.approvals.decide(&request.id, ApprovalAction::Approved, "admin", None).await.unwrap();
    assert_eq!(decided.status, ApprovalStatus::Approved);
}

/// Scenario (spec §8, §4.9): an approval request past its timeout is
/// swept to `expired` by the scheduler tick, not left pending forever.
#[tokio::test]
async fn scheduler_tick_expires_overdue_approvals() {
    use foreman::domain::models::{ApprovalStatus, RiskLevel};

    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();

    let mut request = s
        .approvals
        .request(foreman::services::approval_workflow::ApprovalRequestInput {
            agent_id: "a1",
            agent_name: "Mailer",
            org_id: &org.id,
            tool_id: "email.send",
            tool_name: "Send Email",
            reason: "test".into(),
            risk_level: RiskLevel::Medium,
            side_effects: vec![],
            parameters: None,
            context: None,
        })
        .await
        .unwrap();
    request.expires_at = chrono::Utc::now() - chrono::Duration::minutes(5);
    s.store.upsert_approval(&request).await.unwrap();

    s.scheduler.tick().await.unwrap();

    let reloaded = s.store.get_approval(&request.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ApprovalStatus::Expired);
}

/// Scenario (spec §8, §4.8): three consecutive unhealthy checks degrade a
/// running agent; the next healthy check recovers it, and both
/// transitions are durable.
#[tokio::test]
async fn sustained_unhealthy_checks_degrade_then_recover_durably() {
    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();
    let draft = s.lifecycle.create_draft(&org.id, "watcher").await;
    s.lifecycle.update_config(&draft.id, complete_patch()).await.unwrap();
    s.lifecycle.deploy(&draft.id).await.unwrap();

    for _ in 0..3 {
        s.lifecycle.record_health_check(&draft.id, HealthStatus::Unhealthy, None).await.unwrap();
    }
    let degraded = s.store.get_agent(&draft.id).await.unwrap().unwrap();
    assert_eq!(degraded.state, AgentState::Degraded);

    s.lifecycle.record_health_check(&draft.id, HealthStatus::Healthy, Some(1)).await.unwrap();
    let recovered = s.store.get_agent(&draft.id).await.unwrap().unwrap();
    assert_eq!(recovered.state, AgentState::Running);
}

/// Scenario (spec §8, §4.9): an agent whose work schedule has a shift
/// window that excludes "now" is auto-clocked-out and stopped on the
/// scheduler tick when it was previously clocked in.
#[tokio::test]
async fn off_hours_agent_is_clocked_out_and_stopped() {
    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();
    let draft = s.lifecycle.create_draft(&org.id, "shift-worker").await;
    s.lifecycle.update_config(&draft.id, complete_patch()).await.unwrap();
    s.lifecycle.deploy(&draft.id).await.unwrap();

    // A schedule with a window nobody can currently be inside: no days set.
    let schedule = WorkSchedule {
        id: "sched1".into(),
        agent_id: draft.id.clone(),
        org_id: org.id.clone(),
        timezone: "UTC".into(),
        kind: ScheduleKind::Standard { pattern: WeeklyPattern::default() },
        enforce_clock_in: true,
        enforce_clock_out: true,
        auto_wake_enabled: true,
        off_hours_action: OffHoursAction::Stop,
        grace_period_minutes: 0,
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    s.store.upsert_schedule(&schedule).await.unwrap();

    // Simulate a prior clock-in so the tick has something to reverse.
    let clock_in = ClockRecord {
        id: "c1".into(),
        agent_id: draft.id.clone(),
        org_id: org.id.clone(),
        event_type: ClockEventType::ClockIn,
        triggered_by: "operator".into(),
        scheduled_at: None,
        actual_at: chrono::Utc::now() - chrono::Duration::hours(1),
        reason: None,
        metadata: serde_json::Value::Null,
    };
    s.store.insert_clock_record(&clock_in).await.unwrap();

    s.scheduler.tick().await.unwrap();

    let records = s.store.list_clock_records(&draft.id, 10).await.unwrap();
    assert!(records.iter().any(|r| r.event_type == ClockEventType::AutoPause));

    let agent = s.store.get_agent(&draft.id).await.unwrap().unwrap();
    assert_eq!(agent.state, AgentState::Stopped);
}

/// Scenario (spec §8, §4.6): crossing a monthly token budget publishes an
/// exceeded event exactly once and is reflected back on the agent once
/// flushed by the caller.
#[tokio::test]
async fn budget_exceeded_flows_through_to_the_store() {
    use foreman::services::budget_meter::UsageDelta;

    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();
    let mut draft = s.lifecycle.create_draft(&org.id, "spender").await;
    draft.usage.token_budget_monthly = 1000;
    s.store.upsert_agent(&draft).await.unwrap();

    let mut usage = draft.usage.clone();
    let check = s.budget.record(&org.id, &draft.id, &mut usage, UsageDelta { tokens: 1000, ..Default::default() }).await;
    assert!(!check.is_within_budget());

    draft.usage = usage;
    s.store.upsert_agent(&draft).await.unwrap();
    let reloaded = s.store.get_agent(&draft.id).await.unwrap().unwrap();
    assert_eq!(reloaded.usage.tokens_this_month, 1000);
    assert_eq!(reloaded.usage.exceeded_periods.len(), 1);
}

/// Scenario (spec §8, §4.10): observing an outbound email to an unknown
/// recipient classifies it external; the same address registered to a
/// second agent reclassifies later traffic as internal.
#[tokio::test]
async fn communication_directory_reclassifies_once_the_recipient_is_known() {
    use foreman::services::communication_observer::ObservedToolCall;

    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();

    let params = serde_json::json!({ "to": "new-hire@example.com", "subject": "welcome", "body": "hi" });
    let call = ObservedToolCall { org_id: &org.id, agent_id: "a1", agent_name: "HR-Bot", tool_id: "email.send", params: &params };
    let first = s.communication.observe(call).await.unwrap();
    assert_eq!(first[0].direction, foreman::domain::models::Direction::ExternalOutbound);

    s.communication.upsert_directory_entry(&org.id, "a2", Some("new-hire@example.com"), "New Hire");
    let call2 = ObservedToolCall { org_id: &org.id, agent_id: "a1", agent_name: "HR-Bot", tool_id: "email.send", params: &params };
    let second = s.communication.observe(call2).await.unwrap();
    assert_eq!(second[0].direction, foreman::domain::models::Direction::Internal);
    assert_eq!(second[0].to_agent_id, "a2");
}

/// Scenario (spec §8, §4.3): a day window with an explicit shift still
/// round-trips through the store intact for schedule enforcement to read
/// back on the next tick.
#[tokio::test]
async fn work_schedule_round_trips_through_the_store() {
    let s = stack().await;
    let org = s.tenants.ensure_default_org().await.unwrap();
    let draft = s.lifecycle.create_draft(&org.id, "nine-to-fiver").await;

    let mut pattern = WeeklyPattern::default();
    let window = DayWindow { start: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(), end: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap() };
    for day in [DayOfWeek::Mon, DayOfWeek::Tue, DayOfWeek::Wed, DayOfWeek::Thu, DayOfWeek::Fri] {
        pattern.days.push((day, window.clone()));
    }
    let schedule = WorkSchedule {
        id: "sched2".into(),
        agent_id: draft.id.clone(),
        org_id: org.id.clone(),
        timezone: "UTC".into(),
        kind: ScheduleKind::Standard { pattern },
        enforce_clock_in: true,
        enforce_clock_out: true,
        auto_wake_enabled: true,
        off_hours_action: OffHoursAction::Queue,
        grace_period_minutes: 10,
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    s.store.upsert_schedule(&schedule).await.unwrap();

    let reloaded = s.store.get_schedule_by_agent(&draft.id).await.unwrap().expect("schedule persisted");
    assert_eq!(reloaded.grace_period_minutes, 10);
    match reloaded.kind {
        ScheduleKind::Standard { pattern } => assert_eq!(pattern.days.len(), 5),
        _ => panic!("expected a standard weekly pattern"),
    }
}
