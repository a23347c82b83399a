//! Application services: the orchestration layer between domain models
//! and the store/deployer ports (spec §4).

pub mod agent_registry;
pub mod approval_workflow;
pub mod budget_meter;
pub mod communication_observer;
pub mod event_bus;
pub mod lifecycle_manager;
pub mod permission_engine;
pub mod tenant_manager;
pub mod tool_catalog;
pub mod workforce_scheduler;

pub use agent_registry::AgentRegistry;
pub use approval_workflow::{ApprovalRequestInput, ApprovalWorkflow};
pub use budget_meter::{BudgetCheck, BudgetCounter, BudgetMeter, UsageDelta};
pub use communication_observer::{CommunicationObserver, ObservedToolCall, Topology, TopologyQuery};
pub use event_bus::EventBus;
pub use lifecycle_manager::AgentLifecycleManager;
pub use permission_engine::{PermissionDecision, PermissionEngine, RateCounters};
pub use tenant_manager::{CheckLimitResult, PeriodKind, TenantManager};
pub use tool_catalog::ToolCatalog;
pub use workforce_scheduler::WorkforceScheduler;
