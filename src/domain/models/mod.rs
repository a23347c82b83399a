//! Core domain models for the control plane.

pub mod agent;
pub mod approval;
pub mod event;
pub mod message;
pub mod organization;
pub mod permission;
pub mod schedule;
pub mod task_queue;
pub mod tool_catalog;

pub use agent::{
    is_legal_transition, AgentConfig, AgentConfigPatch, AgentHealth, AgentIdentity, AgentState,
    AgentUsage, DeploymentConfig, HealthSample, HealthStatus, ManagedAgent, ModelConfig,
    StateTransition, MAX_HEALTH_SAMPLES, MAX_STATE_HISTORY,
};
pub use approval::{ApprovalAction, ApprovalDecision, ApprovalPolicy, ApprovalRequest, ApprovalStatus};
pub use event::{state_change_severity, EventPayload, EventSeverity, LifecycleEvent};
pub use message::{
    external_agent_id, is_external_agent_id, AgentMessage, Channel, Direction, MessageType,
    EXTERNAL_PREFIX,
};
pub use organization::{
    plan_limits, BillingInfo, DeploymentTarget, OrgLimits, OrgSettings, OrgUsage, Organization,
    Plan, QuotaResource, DEFAULT_ORG_SLUG,
};
pub use permission::{
    Constraints, PermissionProfile, RateLimits, RequireApproval, RiskLevel, SkillsMode,
    SkillsPolicy, ToolsPolicy, WorkingHoursWindow,
};
pub use schedule::{
    ClockEventType, ClockRecord, ClockStatus, CustomDayRule, DayOfWeek, DayWindow, OffHoursAction,
    ScheduleKind, ShiftPattern, WeeklyPattern, WorkSchedule,
};
pub use task_queue::{queue_order, QueuedTask, QueuedTaskStatus, QueuedTaskType, TaskPriority};
pub use tool_catalog::{RuntimePolicy, SideEffect, ToolCatalogEntry};
