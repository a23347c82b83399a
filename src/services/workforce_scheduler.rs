//! Workforce scheduler: the single periodic tick driving counter resets,
//! approval expiry, and clock-in/clock-out enforcement (spec §4.9).

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::domain::models::{
    ClockEventType, ClockRecord, ClockStatus, EventPayload, OffHoursAction,
};
use crate::domain::ports::Store;
use crate::services::agent_registry::AgentRegistry;
use crate::services::approval_workflow::ApprovalWorkflow;
use crate::services::budget_meter::BudgetMeter;
use crate::services::event_bus::EventBus;
use crate::services::lifecycle_manager::AgentLifecycleManager;
use crate::services::tenant_manager::{PeriodKind, TenantManager};

const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

pub struct WorkforceScheduler {
    store: Arc<dyn Store>,
    registry: Arc<AgentRegistry>,
    lifecycle: Arc<AgentLifecycleManager>,
    tenants: Arc<TenantManager>,
    approvals: Arc<ApprovalWorkflow>,
    budget: Arc<BudgetMeter>,
    event_bus: Arc<EventBus>,
}

impl WorkforceScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<AgentRegistry>,
        lifecycle: Arc<AgentLifecycleManager>,
        tenants: Arc<TenantManager>,
        approvals: Arc<ApprovalWorkflow>,
        budget: Arc<BudgetMeter>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self { store, registry, lifecycle, tenants, approvals, budget, event_bus }
    }

    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.tick().await {
                    warn!(error = %e, "workforce scheduler tick failed");
                }
            }
        })
    }

    /// One full tick: resets, approval sweeps, and clock enforcement, run
    /// per-organization so a failure in one org's processing never blocks
    /// another's (spec §4.9).
    pub async fn tick(&self) -> crate::domain::errors::DomainResult<()> {
        let now = Utc::now();
        let orgs = self.store.list_orgs().await.map_err(store_err)?;

        for org in orgs {
            for kind in [PeriodKind::Daily, PeriodKind::Weekly, PeriodKind::Monthly, PeriodKind::Annual] {
                if let Err(e) = self.tenants.reset_period_if_due(&org.id, kind).await {
                    warn!(org_id = %org.id, error = %e, "org period reset failed");
                }
            }

            if let Err(e) = self.approvals.sweep_expired(&org.id).await {
                warn!(org_id = %org.id, error = %e, "approval sweep failed");
            }

            let agents = self.store.list_agents_by_org(&org.id).await.map_err(store_err)?;
            for agent in agents {
                if let Some(handle) = self.registry.get(&agent.id).await.map_err(store_err)? {
                    let mut dirty = false;
                    {
                        let mut live = handle.lock().await;
                        if self.budget.reset_daily_if_due(&mut live.usage, now) {
                            info!(agent_id = %agent.id, "daily usage counters reset");
                            dirty = true;
                        }
                        if self.budget.reset_monthly_if_due(&mut live.usage, now) {
                            info!(agent_id = %agent.id, "monthly usage counters reset");
                            dirty = true;
                        }
                    }
                    if dirty {
                        self.flush_agent(&handle).await?;
                    }
                }

                if let Err(e) = self.enforce_schedule(&agent.id, &agent.org_id, now).await {
                    warn!(agent_id = %agent.id, error = %e, "schedule enforcement failed");
                }
            }
        }

        Ok(())
    }

    /// Apply one agent's work schedule at `now`: clock the agent in/out of
    /// its shift window, taking its configured `OffHoursAction` when the
    /// agent is running outside its window (spec §4.9).
    async fn enforce_schedule(&self, agent_id: &str, org_id: &str, now: chrono::DateTime<Utc>) -> crate::domain::errors::DomainResult<()> {
        let Some(schedule) = self.store.get_schedule_by_agent(agent_id).await.map_err(store_err)? else {
            return Ok(());
        };
        if !schedule.enabled {
            return Ok(());
        }
        let tz: Tz = schedule.timezone.parse().map_err(|_| {
            crate::domain::errors::DomainError::Validation(format!("invalid timezone: {}", schedule.timezone))
        })?;
        let local = now.with_timezone(&tz);
        let window = schedule.window_for_date(local.date_naive());
        let in_window = window
            .as_ref()
            .map(|w| w.contains(local.time(), schedule.grace_period_minutes as i64))
            .unwrap_or(false);

        let last_event = self
            .store
            .list_clock_records(agent_id, 1)
            .await
            .map_err(store_err)?
            .into_iter()
            .next();
        let status = clock_status(&last_event);

        if in_window && status != ClockStatus::ClockedIn {
            self.clock_event(agent_id, org_id, ClockEventType::AutoWake, now, None).await?;
            if schedule.auto_wake_enabled {
                if let Err(e) = self.lifecycle.restart(agent_id).await {
                    warn!(agent_id = %agent_id, error = %e, "auto-wake restart failed");
                }
                self.event_bus.publish(org_id.to_string(), EventPayload::AutoClockIn { agent_id: agent_id.to_string() }).await;
            }
        } else if !in_window && status == ClockStatus::ClockedIn {
            let reason = Some("outside scheduled working hours".to_string());
            self.clock_event(agent_id, org_id, ClockEventType::AutoPause, now, reason.clone()).await?;
            match schedule.off_hours_action {
                OffHoursAction::Stop => {
                    let _ = self.lifecycle.stop(agent_id, reason).await;
                }
                OffHoursAction::Pause => {
                    let _ = self.lifecycle.stop(agent_id, reason).await;
                }
                OffHoursAction::Queue => {
                    // tasks accumulate in the queue; nothing to stop.
                }
            }
            self.event_bus.publish(org_id.to_string(), EventPayload::AutoClockOut { agent_id: agent_id.to_string() }).await;
        }

        Ok(())
    }

    async fn flush_agent(&self, handle: &Arc<tokio::sync::Mutex<crate::domain::models::ManagedAgent>>) -> crate::domain::errors::DomainResult<()> {
        self.registry.persist(handle).await.map_err(store_err)
    }

    async fn clock_event(
        &self,
        agent_id: &str,
        org_id: &str,
        event_type: ClockEventType,
        now: chrono::DateTime<Utc>,
        reason: Option<String>,
    ) -> crate::domain::errors::DomainResult<()> {
        let record = ClockRecord {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            org_id: org_id.to_string(),
            event_type,
            triggered_by: "scheduler".to_string(),
            scheduled_at: Some(now),
            actual_at: now,
            reason,
            metadata: serde_json::Value::Null,
        };
        self.store.insert_clock_record(&record).await.map_err(store_err)
    }
}

fn clock_status(last: &Option<ClockRecord>) -> ClockStatus {
    match last.as_ref().map(|r| r.event_type) {
        Some(ClockEventType::ClockIn) | Some(ClockEventType::AutoWake) => ClockStatus::ClockedIn,
        Some(ClockEventType::ClockOut) | Some(ClockEventType::AutoPause) => ClockStatus::ClockedOut,
        Some(ClockEventType::OvertimeStart) => ClockStatus::ClockedIn,
        Some(ClockEventType::OvertimeEnd) => ClockStatus::ClockedOut,
        None => ClockStatus::NoSchedule,
    }
}

fn store_err(e: crate::domain::ports::StoreError) -> crate::domain::errors::DomainError {
    crate::domain::errors::DomainError::Validation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentConfig, ManagedAgent, ScheduleKind, WeeklyPattern, WorkSchedule};
    use crate::infrastructure::database::{dialect::Dialect, migrations, SqlStore};
    use async_trait::async_trait;
    use sqlx::SqlitePool;

    struct NoopDeployer;

    #[async_trait]
    impl crate::domain::ports::Deployer for NoopDeployer {
        async fn deploy(&self, _c: &AgentConfig, _p: crate::domain::ports::ProgressCallback<'_>) -> crate::domain::ports::DeployOutcome {
            crate::domain::ports::DeployOutcome::ok()
        }
        async fn stop(&self, _c: &AgentConfig) -> crate::domain::ports::DeployOutcome {
            crate::domain::ports::DeployOutcome::ok()
        }
        async fn restart(&self, _c: &AgentConfig) -> crate::domain::ports::DeployOutcome {
            crate::domain::ports::DeployOutcome::ok()
        }
        async fn update_config(&self, _c: &AgentConfig) -> crate::domain::ports::DeployOutcome {
            crate::domain::ports::DeployOutcome::ok()
        }
        async fn get_status(&self, _c: &AgentConfig) -> crate::domain::ports::DeployStatus {
            crate::domain::ports::DeployStatus {
                status: crate::domain::ports::RunStatus::Running,
                health_status: crate::domain::models::HealthStatus::Healthy,
                uptime_sec: Some(1),
                metrics: None,
            }
        }
    }

    async fn scheduler() -> (WorkforceScheduler, Arc<dyn Store>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool, Dialect::Sqlite).await.unwrap();
        let store: Arc<dyn Store> = Arc::new(SqlStore::new(pool));
        let registry = Arc::new(AgentRegistry::new(store.clone()));
        let event_bus = Arc::new(EventBus::new());
        let lifecycle = Arc::new(AgentLifecycleManager::new(registry.clone(), event_bus.clone(), Arc::new(NoopDeployer)));
        let tenants = Arc::new(TenantManager::new(store.clone()));
        let approvals = Arc::new(ApprovalWorkflow::new(store.clone(), event_bus.clone()));
        let budget = Arc::new(BudgetMeter::new(event_bus.clone()));
        let ws = WorkforceScheduler::new(store.clone(), registry, lifecycle, tenants, approvals, budget, event_bus);
        (ws, store)
    }

    fn always_off_schedule(agent_id: &str, org_id: &str) -> WorkSchedule {
        WorkSchedule {
            id: "s1".into(),
            agent_id: agent_id.to_string(),
            org_id: org_id.to_string(),
            timezone: "UTC".into(),
            kind: ScheduleKind::Standard { pattern: WeeklyPattern::default() },
            enforce_clock_in: true,
            enforce_clock_out: true,
            auto_wake_enabled: true,
            off_hours_action: OffHoursAction::Stop,
            grace_period_minutes: 0,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tick_is_a_noop_with_no_organizations() {
        let (ws, _store) = scheduler().await;
        ws.tick().await.unwrap();
    }

    #[tokio::test]
    async fn agent_outside_window_with_no_prior_clock_event_does_not_panic() {
        let (ws, store) = scheduler().await;
        let tenants = TenantManager::new(store.clone());
        let org = tenants.create_org("Acme", crate::domain::models::Plan::Free).await.unwrap();
        let agent = ManagedAgent::new("a1".into(), org.id.clone(), AgentConfig::new("bot"));
        store.upsert_agent(&agent).await.unwrap();
        store.upsert_schedule(&always_off_schedule("a1", &org.id)).await.unwrap();

        ws.tick().await.unwrap();
        let records = store.list_clock_records("a1", 10).await.unwrap();
        assert!(records.is_empty(), "agent never in window and never clocked in should produce no events");
    }
}
