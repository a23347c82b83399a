//! Agent lifecycle manager: the sole writer of `AgentState` (spec §4.8).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    is_legal_transition, state_change_severity, AgentConfig, AgentConfigPatch, AgentState,
    EventPayload, HealthSample, HealthStatus, ManagedAgent, StateTransition,
};
use crate::domain::ports::{DeployOutcome, Deployer};
use crate::services::agent_registry::AgentRegistry;
use crate::services::event_bus::EventBus;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const MAX_CONSECUTIVE_FAILURES_BEFORE_DEGRADED: u32 = 3;

pub struct AgentLifecycleManager {
    registry: Arc<AgentRegistry>,
    event_bus: Arc<EventBus>,
    deployer: Arc<dyn Deployer>,
}

impl AgentLifecycleManager {
    pub fn new(registry: Arc<AgentRegistry>, event_bus: Arc<EventBus>, deployer: Arc<dyn Deployer>) -> Self {
        Self { registry, event_bus, deployer }
    }

    pub async fn create_draft(&self, org_id: &str, name: &str) -> ManagedAgent {
        let agent = ManagedAgent::new(uuid::Uuid::new_v4().to_string(), org_id.to_string(), AgentConfig::new(name));
        let handle = self.registry.insert(agent.clone());
        self.persist(&handle).await;
        agent
    }

    pub async fn update_config(&self, agent_id: &str, patch: AgentConfigPatch) -> DomainResult<ManagedAgent> {
        let handle = self.require(agent_id).await?;
        let mut agent = handle.lock().await;
        agent.config.apply_patch(patch);
        agent.updated_at = chrono::Utc::now();

        if agent.config.is_complete() && agent.state == AgentState::Draft {
            self.transition_locked(&mut agent, AgentState::Configuring, "config updated", "system", None).await;
            self.transition_locked(&mut agent, AgentState::Ready, "config complete", "system", None).await;
        } else if agent.state == AgentState::Draft {
            self.transition_locked(&mut agent, AgentState::Configuring, "config updated", "system", None).await;
        }
        let result = agent.clone();
        drop(agent);
        self.persist(&handle).await;
        Ok(result)
    }

    /// Deploy a `Ready`/`Stopped`/`Error` agent: Provisioning -> Deploying ->
    /// Starting -> Running|Error (spec §4.8).
    pub async fn deploy(&self, agent_id: &str) -> DomainResult<ManagedAgent> {
        let handle = self.require(agent_id).await?;
        let config = {
            let mut agent = handle.lock().await;
            if !agent.config.is_complete() {
                return Err(DomainError::IncompleteConfig(agent_id.to_string()));
            }
            self.transition_locked(&mut agent, AgentState::Provisioning, "deploy requested", "user", None).await;
            self.transition_locked(&mut agent, AgentState::Deploying, "provisioned", "system", None).await;
            agent.config.clone()
        };

        let outcome = self.deployer.deploy(&config, &|_phase| {}).await;

        let mut agent = handle.lock().await;
        if outcome.success {
            self.transition_locked(&mut agent, AgentState::Starting, "deployed", "system", None).await;
            self.transition_locked(&mut agent, AgentState::Running, "startup complete", "system", None).await;
            agent.last_deployed_at = Some(chrono::Utc::now());
        } else {
            self.transition_locked(&mut agent, AgentState::Error, "deploy failed", "system", outcome.error.clone())
                .await;
        }
        let result = agent.clone();
        drop(agent);
        self.persist(&handle).await;
        Ok(result)
    }

    pub async fn stop(&self, agent_id: &str, reason: Option<String>) -> DomainResult<ManagedAgent> {
        let handle = self.require(agent_id).await?;
        let config = { handle.lock().await.config.clone() };
        let outcome = self.deployer.stop(&config).await;
        let mut agent = handle.lock().await;
        if outcome.success {
            self.transition_locked(&mut agent, AgentState::Stopped, "stop requested", "user", None).await;
            self.event_bus
                .publish(agent.org_id.clone(), EventPayload::Stopped { agent_id: agent.id.clone(), reason })
                .await;
        }
        let result = agent.clone();
        drop(agent);
        self.persist(&handle).await;
        Ok(result)
    }

    pub async fn restart(&self, agent_id: &str) -> DomainResult<ManagedAgent> {
        let handle = self.require(agent_id).await?;
        let config = { handle.lock().await.config.clone() };
        let outcome = self.deployer.restart(&config).await;
        let mut agent = handle.lock().await;
        if outcome.success {
            if agent.state != AgentState::Running {
                self.transition_locked(&mut agent, AgentState::Starting, "restart requested", "user", None).await;
                self.transition_locked(&mut agent, AgentState::Running, "restarted", "system", None).await;
            }
            self.event_bus
                .publish(agent.org_id.clone(), EventPayload::Restarted { agent_id: agent.id.clone() })
                .await;
        } else {
            self.transition_locked(&mut agent, AgentState::Error, "restart failed", "system", outcome.error.clone())
                .await;
        }
        let result = agent.clone();
        drop(agent);
        self.persist(&handle).await;
        Ok(result)
    }

    /// Hot-update config without a full redeploy (spec §4.8: `hotUpdate`).
    pub async fn hot_update(&self, agent_id: &str, patch: AgentConfigPatch) -> DomainResult<ManagedAgent> {
        let handle = self.require(agent_id).await?;
        let mut agent = handle.lock().await;
        if !matches!(agent.state, AgentState::Running | AgentState::Degraded) {
            return Err(DomainError::InvalidTransition {
                from: agent.state.as_str().to_string(),
                to: "updating".to_string(),
            });
        }
        let from = agent.state;
        self.transition_locked(&mut agent, AgentState::Updating, "hot update", "user", None).await;
        agent.config.apply_patch(patch);
        agent.version += 1;
        let outcome: DeployOutcome = self.deployer.update_config(&agent.config).await;
        if outcome.success {
            self.transition_locked(&mut agent, from, "update applied", "system", None).await;
            self.event_bus
                .publish(agent.org_id.clone(), EventPayload::Updated { agent_id: agent.id.clone(), version: agent.version })
                .await;
        } else {
            self.transition_locked(&mut agent, AgentState::Error, "hot update failed", "system", outcome.error).await;
        }
        let result = agent.clone();
        drop(agent);
        self.persist(&handle).await;
        Ok(result)
    }

    pub async fn destroy(&self, agent_id: &str) -> DomainResult<()> {
        let handle = self.require(agent_id).await?;
        {
            let mut agent = handle.lock().await;
            self.transition_locked(&mut agent, AgentState::Destroying, "destroy requested", "user", None).await;
            self.event_bus.publish(agent.org_id.clone(), EventPayload::Destroyed { agent_id: agent.id.clone() }).await;
        }
        self.persist(&handle).await;
        self.registry.remove(agent_id);
        Ok(())
    }

    /// Record one health-check result, applying the auto-recovery rule:
    /// after `MAX_CONSECUTIVE_FAILURES_BEFORE_DEGRADED` unhealthy samples
    /// in a row, `Running` degrades automatically; a subsequent healthy
    /// sample recovers it (spec §4.8: "auto-recovery on sustained health
    /// failure, auto-recovered on the next healthy check").
    pub async fn record_health_check(&self, agent_id: &str, status: HealthStatus, uptime_sec: Option<u64>) -> DomainResult<ManagedAgent> {
        let handle = self.require(agent_id).await?;
        let mut agent = handle.lock().await;

        agent.health.push_sample(HealthSample { at: chrono::Utc::now(), status, uptime_sec });
        agent.last_health_check_at = Some(chrono::Utc::now());

        if status == HealthStatus::Healthy {
            let was_degraded = agent.health.consecutive_failures >= MAX_CONSECUTIVE_FAILURES_BEFORE_DEGRADED;
            agent.health.consecutive_failures = 0;
            agent.health.status = HealthStatus::Healthy;
            if was_degraded && agent.state == AgentState::Degraded {
                self.transition_locked(&mut agent, AgentState::Running, "health recovered", "system", None).await;
                self.event_bus
                    .publish(
                        agent.org_id.clone(),
                        EventPayload::AutoRecovered { agent_id: agent.id.clone(), action: "auto_restart".to_string() },
                    )
                    .await;
            }
        } else {
            agent.health.consecutive_failures += 1;
            agent.health.status = status;
            if agent.health.consecutive_failures >= MAX_CONSECUTIVE_FAILURES_BEFORE_DEGRADED
                && agent.state == AgentState::Running
            {
                self.transition_locked(&mut agent, AgentState::Degraded, "sustained health failure", "system", None)
                    .await;
            }
        }

        self.event_bus
            .publish(agent.org_id.clone(), EventPayload::HealthCheck { agent_id: agent.id.clone(), status })
            .await;

        let result = agent.clone();
        drop(agent);
        self.persist(&handle).await;
        Ok(result)
    }

    /// Spawn the periodic health-check loop for every agent whose state
    /// wants one (spec §4.8: `AgentState::wants_health_loop`). Intended
    /// to run once at startup; new agents are picked up lazily the next
    /// time `tick_health_checks` runs, since it re-reads live agent ids.
    pub fn spawn_health_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                manager.tick_health_checks().await;
            }
        })
    }

    async fn tick_health_checks(&self) {
        for agent_id in self.registry.live_ids() {
            let Ok(Some(handle)) = self.registry.get(&agent_id).await else { continue };
            let (config, wants_loop) = {
                let agent = handle.lock().await;
                (agent.config.clone(), agent.state.wants_health_loop())
            };
            if !wants_loop {
                continue;
            }
            let status = self.deployer.get_status(&config).await;
            if let Err(e) = self.record_health_check(&agent_id, status.health_status, status.uptime_sec).await {
                warn!(agent_id = %agent_id, error = %e, "health check recording failed");
            }
        }
    }

    async fn require(&self, agent_id: &str) -> DomainResult<Arc<tokio::sync::Mutex<ManagedAgent>>> {
        self.registry
            .get(agent_id)
            .await
            .map_err(|e| DomainError::Validation(e.to_string()))?
            .ok_or_else(|| DomainError::AgentNotFound(agent_id.to_string()))
    }

    async fn persist(&self, handle: &Arc<tokio::sync::Mutex<ManagedAgent>>) {
        if let Err(e) = self.registry.persist(handle).await {
            warn!(error = %e, "failed to persist agent state");
        }
    }

    /// Apply one transition in place, rejecting illegal moves and
    /// publishing the corresponding lifecycle event. Logged at `error`
    /// for hard-fault states, `info` otherwise, mirroring the teacher's
    /// severity-by-event-kind convention.
    async fn transition_locked(
        &self,
        agent: &mut ManagedAgent,
        to: AgentState,
        reason: &str,
        triggered_by: &str,
        error_detail: Option<String>,
    ) {
        if !is_legal_transition(agent.state, to) {
            warn!(agent_id = %agent.id, from = ?agent.state, to = ?to, "illegal transition suppressed");
            return;
        }
        let from = agent.state;
        agent.state = to;
        agent.updated_at = chrono::Utc::now();
        agent.push_transition(StateTransition {
            from,
            to,
            reason: reason.to_string(),
            triggered_by: triggered_by.to_string(),
            timestamp: agent.updated_at,
            error: error_detail.clone(),
        });

        let severity = state_change_severity(to);
        if severity == crate::domain::models::EventSeverity::Warning {
            error!(agent_id = %agent.id, from = ?from, to = ?to, "agent entered a degraded/error state");
        } else {
            info!(agent_id = %agent.id, from = ?from, to = ?to, "agent state transition");
        }

        let payload = match to {
            AgentState::Running if from == AgentState::Starting || from == AgentState::Updating => {
                EventPayload::Started { agent_id: agent.id.clone() }
            }
            AgentState::Error => EventPayload::Error {
                agent_id: agent.id.clone(),
                message: error_detail.unwrap_or_else(|| "unspecified error".to_string()),
            },
            _ => return,
        };
        self.event_bus.publish(agent.org_id.clone(), payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{DeployStatus, ProgressCallback, RunStatus};
    use async_trait::async_trait;

    struct AlwaysSucceedsDeployer;

    #[async_trait]
    impl Deployer for AlwaysSucceedsDeployer {
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
            DeployStatus { status: RunStatus::Running, health_status: HealthStatus::Healthy, uptime_sec: Some(10), metrics: None }
        }
    }

    async fn manager() -> AgentLifecycleManager {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::infrastructure::database::migrations::run(&pool, crate::infrastructure::database::dialect::Dialect::Sqlite)
            .await
            .unwrap();
        let store: Arc<dyn crate::domain::ports::Store> = Arc::new(crate::infrastructure::database::SqlStore::new(pool));
        let registry = Arc::new(AgentRegistry::new(store));
        AgentLifecycleManager::new(registry, Arc::new(EventBus::new()), Arc::new(AlwaysSucceedsDeployer))
    }

    fn complete_patch() -> AgentConfigPatch {
        AgentConfigPatch {
            model: Some(crate::domain::models::ModelConfig { provider: "openai".into(), model_id: "gpt".into(), temperature: None, max_tokens: None }),
            deployment: Some(crate::domain::models::DeploymentConfig {
                target: crate::domain::models::DeploymentTarget::Local,
                region: None,
                resources: None,
            }),
            permission_profile_id: Some("profile1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn draft_to_ready_on_complete_config() {
        let mgr = manager().await;
        let agent = mgr.create_draft("o1", "bot").await;
        let updated = mgr.update_config(&agent.id, complete_patch()).await.unwrap();
        assert_eq!(updated.state, AgentState::Ready);
    }

    #[tokio::test]
    async fn deploy_reaches_running() {
        let mgr = manager().await;
        let agent = mgr.create_draft("o1", "bot").await;
        mgr.update_config(&agent.id, complete_patch()).await.unwrap();
        let deployed = mgr.deploy(&agent.id).await.unwrap();
        assert_eq!(deployed.state, AgentState::Running);
        assert!(deployed.state_history.len() >= 5);
    }

    #[tokio::test]
    async fn sustained_failures_degrade_then_recover() {
        let mgr = manager().await;
        let agent = mgr.create_draft("o1", "bot").await;
        mgr.update_config(&agent.id, complete_patch()).await.unwrap();
        mgr.deploy(&agent.id).await.unwrap();

        for _ in 0..3 {
            mgr.record_health_check(&agent.id, HealthStatus::Unhealthy, None).await.unwrap();
        }
        let degraded = mgr.require(&agent.id).await.unwrap().lock().await.clone();
        assert_eq!(degraded.state, AgentState::Degraded);

        let recovered = mgr.record_health_check(&agent.id, HealthStatus::Healthy, Some(1)).await.unwrap();
        assert_eq!(recovered.state, AgentState::Running);
    }
}
