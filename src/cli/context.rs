//! Application bootstrap: wires every service from a loaded config.

use std::sync::Arc;

use crate::domain::ports::Store;
use crate::infrastructure::config::{ConfigError, ConfigLoader, ControlPlaneConfig};
use crate::infrastructure::database::{DatabaseConnection, SqlStore, WriteBehindStore};
use crate::infrastructure::deployer::NullDeployer;
use crate::infrastructure::logging::AuditLogger;
use crate::services::{
    AgentLifecycleManager, AgentRegistry, ApprovalWorkflow, BudgetMeter, CommunicationObserver,
    EventBus, TenantManager, ToolCatalog, WorkforceScheduler,
};

pub struct AppContext {
    pub config: ControlPlaneConfig,
    pub store: Arc<dyn Store>,
    pub registry: Arc<AgentRegistry>,
    pub tenants: Arc<TenantManager>,
    pub catalog: Arc<ToolCatalog>,
    pub event_bus: Arc<EventBus>,
    pub lifecycle: Arc<AgentLifecycleManager>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub budget: Arc<BudgetMeter>,
    pub communication: Arc<CommunicationObserver>,
    pub scheduler: Arc<WorkforceScheduler>,
    pub audit: Arc<AuditLogger>,
}

impl AppContext {
    /// Load config, connect the database, and build every service.
    /// Does not spawn background loops — callers that need the health
    /// loop and scheduler tick running (the daemon path) call
    /// `spawn_background_tasks` explicitly; one-shot CLI commands don't.
    pub async fn bootstrap(config: ControlPlaneConfig) -> anyhow::Result<Self> {
        let conn = DatabaseConnection::connect(&config.database.path).await?;
        let sql_store = SqlStore::new(conn.pool);
        let write_behind = Arc::new(WriteBehindStore::new(sql_store));
        write_behind.spawn_flush_loop();
        let store: Arc<dyn Store> = write_behind;

        let registry = Arc::new(AgentRegistry::new(store.clone()));
        let tenants = Arc::new(TenantManager::new(store.clone()));
        let catalog = Arc::new(ToolCatalog::with_builtin_defaults());
        let audit = Arc::new(AuditLogger::new(&config.logging.audit_log_path)?);
        let event_bus = Arc::new(EventBus::with_store(store.clone()).with_audit(audit.clone()));
        let deployer = Arc::new(NullDeployer);
        let lifecycle = Arc::new(AgentLifecycleManager::new(registry.clone(), event_bus.clone(), deployer));
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

        tenants.ensure_default_org().await?;
        rebuild_communication_directory(&store, &communication).await?;

        Ok(Self {
            config,
            store,
            registry,
            tenants,
            catalog,
            event_bus,
            lifecycle,
            approvals,
            budget,
            communication,
            scheduler,
            audit,
        })
    }

    /// Spawn the health-check loop and the workforce scheduler tick.
    /// Intended for a long-running daemon invocation; one-shot CLI
    /// commands talk to the store directly and exit without these.
    pub fn spawn_background_tasks(&self) {
        self.lifecycle.spawn_health_loop();
        self.scheduler.spawn();
    }
}

pub fn load_config() -> Result<ControlPlaneConfig, ConfigError> {
    ConfigLoader::load()
}

/// Each process starts with an empty in-memory email directory; since the
/// CLI is one-shot per invocation, rebuild it from every agent's
/// configured email on bootstrap rather than relying solely on lifecycle
/// events fired within this process (spec §4.10: "directory rebuilt per
/// org on lifecycle created/configured/updated/destroyed").
async fn rebuild_communication_directory(
    store: &Arc<dyn Store>,
    communication: &Arc<CommunicationObserver>,
) -> anyhow::Result<()> {
    for org in store.list_orgs().await? {
        for agent in store.list_agents_by_org(&org.id).await? {
            communication.upsert_directory_entry(
                &org.id,
                &agent.id,
                agent.config.email.as_deref(),
                &agent.config.identity.name,
            );
        }
    }
    Ok(())
}
