//! Managed agent domain model and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::organization::DeploymentTarget;

/// Maximum number of `StateTransition` entries retained per agent (spec §3, §5).
pub const MAX_STATE_HISTORY: usize = 50;
/// Maximum number of health-check samples retained per agent (spec §5).
pub const MAX_HEALTH_SAMPLES: usize = 10;

/// Lifecycle state of a managed agent. See spec §4.8 for the legal
/// transition graph; `AgentLifecycleManager` is the only writer of this
/// field and enforces the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Draft,
    Configuring,
    Ready,
    Provisioning,
    Deploying,
    Starting,
    Running,
    Degraded,
    Stopped,
    Error,
    Updating,
    Destroying,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::Provisioning => "provisioning",
            Self::Deploying => "deploying",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Updating => "updating",
            Self::Destroying => "destroying",
        }
    }

    /// Whether the health loop should be running while an agent is in this state.
    pub fn wants_health_loop(&self) -> bool {
        matches!(self, Self::Running | Self::Degraded)
    }
}

/// One recorded state change, appended under the per-agent lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: AgentState,
    pub to: AgentState,
    pub reason: String,
    pub triggered_by: String,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Identity fields of an agent, as declared by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub role: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model_id: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub target: DeploymentTarget,
    pub region: Option<String>,
    pub resources: Option<serde_json::Value>,
}

/// Self-contained descriptor for an agent; mutated via `updateConfig`/`hotUpdate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub identity: AgentIdentity,
    pub model: Option<ModelConfig>,
    pub deployment: Option<DeploymentConfig>,
    pub permission_profile_id: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<chrono::NaiveDate>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identity: AgentIdentity {
                name: name.into(),
                role: None,
                avatar_url: None,
            },
            model: None,
            deployment: None,
            permission_profile_id: None,
            email: None,
            date_of_birth: None,
        }
    }

    /// A config is complete once it carries enough information to deploy:
    /// model, deployment target, and a bound permission profile.
    pub fn is_complete(&self) -> bool {
        self.model.is_some() && self.deployment.is_some() && self.permission_profile_id.is_some()
    }

    /// Merge a JSON patch into this config, returning the merged value.
    /// Shallow merge at the top level; nested objects (`model`, `deployment`)
    /// are replaced wholesale when present in the patch, matching the
    /// teacher's "patch replaces the addressed substructure" convention.
    pub fn apply_patch(&mut self, patch: AgentConfigPatch) {
        if let Some(identity) = patch.identity {
            self.identity = identity;
        }
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(deployment) = patch.deployment {
            self.deployment = Some(deployment);
        }
        if let Some(profile_id) = patch.permission_profile_id {
            self.permission_profile_id = Some(profile_id);
        }
        if let Some(email) = patch.email {
            self.email = Some(email);
        }
        if let Some(dob) = patch.date_of_birth {
            self.date_of_birth = Some(dob);
        }
    }
}

/// A partial update to `AgentConfig`, as received from `updateConfig`/`hotUpdate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigPatch {
    pub identity: Option<AgentIdentity>,
    pub model: Option<ModelConfig>,
    pub deployment: Option<DeploymentConfig>,
    pub permission_profile_id: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    pub at: DateTime<Utc>,
    pub status: HealthStatus,
    pub uptime_sec: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub recent_checks: Vec<HealthSample>,
}

impl Default for AgentHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            recent_checks: Vec::new(),
        }
    }
}

impl AgentHealth {
    pub fn push_sample(&mut self, sample: HealthSample) {
        self.recent_checks.push(sample);
        if self.recent_checks.len() > MAX_HEALTH_SAMPLES {
            let overflow = self.recent_checks.len() - MAX_HEALTH_SAMPLES;
            self.recent_checks.drain(0..overflow);
        }
    }
}

/// Budget/usage counters tracked per agent (spec §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUsage {
    pub tokens_today: u64,
    pub tokens_this_month: u64,
    pub tool_calls_today: u64,
    pub tool_calls_this_month: u64,
    pub cost_today_usd: f64,
    pub cost_this_month_usd: f64,
    pub external_actions_today: u64,
    pub external_actions_this_month: u64,
    pub errors_today: u64,

    pub token_budget_monthly: u64,
    pub cost_budget_monthly_usd: f64,

    /// Idempotency keys for hard-stop events: `(counter_name, period_key)`
    /// pairs for which `budget_exceeded` has already fired this period.
    #[serde(default)]
    pub exceeded_periods: Vec<String>,

    #[serde(default)]
    pub last_daily_reset: Option<String>,
    #[serde(default)]
    pub last_monthly_reset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedAgent {
    pub id: String,
    pub org_id: String,
    pub config: AgentConfig,
    pub state: AgentState,
    pub state_history: Vec<StateTransition>,
    pub health: AgentHealth,
    pub usage: AgentUsage,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub last_health_check_at: Option<DateTime<Utc>>,
}

impl ManagedAgent {
    pub fn new(id: String, org_id: String, config: AgentConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            org_id,
            config,
            state: AgentState::Draft,
            state_history: Vec::new(),
            health: AgentHealth::default(),
            usage: AgentUsage::default(),
            version: 1,
            created_at: now,
            updated_at: now,
            last_deployed_at: None,
            last_health_check_at: None,
        }
    }

    /// Append a transition, enforcing the sliding 50-entry cap (spec §3, §5).
    pub fn push_transition(&mut self, transition: StateTransition) {
        self.state_history.push(transition);
        if self.state_history.len() > MAX_STATE_HISTORY {
            let overflow = self.state_history.len() - MAX_STATE_HISTORY;
            self.state_history.drain(0..overflow);
        }
    }
}

/// Legal transitions of the agent lifecycle state machine (spec §4.8).
/// Returns `true` iff `from -> to` is a legal transition for the named
/// operation; the lifecycle manager is the only caller.
pub fn is_legal_transition(from: AgentState, to: AgentState) -> bool {
    use AgentState::*;
    match (from, to) {
        (Draft, Configuring) => true,
        (Configuring, Ready) => true,
        (Draft, Ready) => true, // updateConfig can complete in one call
        (Ready, Provisioning) | (Stopped, Provisioning) | (Error, Provisioning) => true,
        (Provisioning, Deploying) => true,
        (Deploying, Starting) => true,
        (Starting, Running) => true,
        (Starting, Degraded) => true,
        (Running, Degraded) | (Degraded, Running) => true,
        (Running, Updating) | (Degraded, Updating) => true,
        (Updating, Running) | (Updating, Degraded) => true,
        (Running, Stopped) | (Degraded, Stopped) | (Starting, Stopped) | (Error, Stopped) => true,
        (_, Destroying) => from != Destroying,
        (Deploying, Error) | (Starting, Error) | (Updating, Error) | (Provisioning, Error) => true,
        _ => false,
    }
}
