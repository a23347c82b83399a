//! Domain-level error types shared by the engine's services.

use thiserror::Error;

/// Errors surfaced by the core control-plane services.
///
/// These represent validation and lookup failures — the things spec §7
/// classifies as "reject at the entry point, nothing mutates". Quota
/// exceedance, permission denial, and deployer failure are NOT modeled
/// as `DomainError` variants: they are first-class parts of a successful
/// return value (`CheckLimitResult`, `PermissionDecision`, a state
/// transition annotated with an error reason) per spec §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("organization not found: {0}")]
    OrgNotFound(String),

    #[error("organization slug already in use: {0}")]
    DuplicateSlug(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("permission profile not found: {0}")]
    ProfileNotFound(String),

    #[error("approval request not found: {0}")]
    ApprovalNotFound(String),

    #[error("approval request {0} is not pending")]
    ApprovalNotPending(String),

    #[error("work schedule not found for agent: {0}")]
    ScheduleNotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("agent config is incomplete: {0}")]
    IncompleteConfig(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("invalid day-of-week: {0}")]
    InvalidDayOfWeek(u8),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("a health loop is already running for agent: {0}")]
    HealthLoopAlreadyRunning(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Validation(format!("serialization error: {err}"))
    }
}
