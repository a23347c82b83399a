//! Unified event envelope for the engine's event bus (spec §4.8, §4.11, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::{AgentState, HealthStatus};
use super::permission::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// All event kinds carried on the bus: the lifecycle events named in
/// spec §4.8 plus the workforce events named in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Created { agent_id: String, org_id: String },
    Configured { agent_id: String },
    Deployed { agent_id: String },
    Started { agent_id: String },
    Stopped { agent_id: String, reason: Option<String> },
    Restarted { agent_id: String },
    Updated { agent_id: String, version: u64 },
    Error { agent_id: String, message: String },
    HealthCheck { agent_id: String, status: HealthStatus },
    AutoRecovered { agent_id: String, action: String },
    BudgetWarning { agent_id: String, counter: String, pct: f64 },
    BudgetExceeded { agent_id: String, counter: String },
    ToolCall { agent_id: String, tool_id: String, allowed: bool },
    ApprovalRequested { approval_id: String, agent_id: String, tool_id: String, risk: RiskLevel },
    ApprovalDecided { approval_id: String, status: String },
    Destroyed { agent_id: String },

    ScheduleSet { agent_id: String },
    ScheduleRemoved { agent_id: String },
    ClockIn { agent_id: String },
    ClockOut { agent_id: String, reason: Option<String> },
    AutoClockIn { agent_id: String },
    AutoClockOut { agent_id: String },
    TasksPending { agent_id: String, preview: Vec<String> },
}

impl EventPayload {
    /// The agent this event concerns, if any (some events are org- or
    /// process-scoped and carry no single agent id).
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Created { agent_id, .. }
            | Self::Configured { agent_id }
            | Self::Deployed { agent_id }
            | Self::Started { agent_id }
            | Self::Stopped { agent_id, .. }
            | Self::Restarted { agent_id }
            | Self::Updated { agent_id, .. }
            | Self::Error { agent_id, .. }
            | Self::HealthCheck { agent_id, .. }
            | Self::AutoRecovered { agent_id, .. }
            | Self::BudgetWarning { agent_id, .. }
            | Self::BudgetExceeded { agent_id, .. }
            | Self::ToolCall { agent_id, .. }
            | Self::ApprovalRequested { agent_id, .. }
            | Self::Destroyed { agent_id }
            | Self::ScheduleSet { agent_id }
            | Self::ScheduleRemoved { agent_id }
            | Self::ClockIn { agent_id }
            | Self::ClockOut { agent_id, .. }
            | Self::AutoClockIn { agent_id }
            | Self::AutoClockOut { agent_id }
            | Self::TasksPending { agent_id, .. } => Some(agent_id),
            Self::ApprovalDecided { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: String,
    pub org_id: String,
    pub severity: EventSeverity,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Describes an explicit `AgentState` transition that also implies which
/// event kind the lifecycle manager should publish alongside it.
pub fn state_change_severity(to: AgentState) -> EventSeverity {
    match to {
        AgentState::Error | AgentState::Degraded => EventSeverity::Warning,
        _ => EventSeverity::Info,
    }
}
