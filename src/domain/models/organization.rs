//! Organization (tenant) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Billing/capability tier of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Team,
    Enterprise,
    SelfHosted,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
            Self::SelfHosted => "self-hosted",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "team" => Some(Self::Team),
            "enterprise" => Some(Self::Enterprise),
            "self-hosted" | "self_hosted" => Some(Self::SelfHosted),
            _ => None,
        }
    }
}

/// A deployment backend an agent can be pushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTarget {
    Docker,
    Systemd,
    Vps,
    Fly,
    Railway,
    Aws,
    Gcp,
    Azure,
    Local,
}

impl DeploymentTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Systemd => "systemd",
            Self::Vps => "vps",
            Self::Fly => "fly",
            Self::Railway => "railway",
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::Local => "local",
        }
    }
}

/// Quota ceilings for an organization. `0` means unlimited wherever the
/// field documents it (`token_budget_monthly`, and by convention any
/// resource limit consulted through `check_limit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgLimits {
    pub max_agents: u32,
    pub max_users: u32,
    pub max_knowledge_bases: u32,
    pub max_storage_mb: u64,
    /// 0 = unlimited.
    pub token_budget_monthly: u64,
    pub api_calls_per_minute: u32,
    pub deployment_targets: Vec<DeploymentTarget>,
    pub features: Vec<String>,
}

/// Metered usage counters mirroring the limited subset of `OrgLimits`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgUsage {
    pub agents: u32,
    pub users: u32,
    pub knowledge_bases: u32,
    pub storage_mb: u64,
    pub tokens_this_month: u64,
    pub cost_this_month_usd: f64,
    pub api_calls_today: u32,
    pub deployments_this_month: u32,

    /// UTC date keys (`YYYY-MM-DD`/`YYYY-Www`/etc) of the last counter reset
    /// per period kind, so a missed scheduler tick still resets at most
    /// once per period (spec §9: cron-style reset flags).
    #[serde(default)]
    pub last_daily_reset: Option<String>,
    #[serde(default)]
    pub last_weekly_reset: Option<String>,
    #[serde(default)]
    pub last_monthly_reset: Option<String>,
    #[serde(default)]
    pub last_annual_reset: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgSettings {
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingInfo {
    pub provider_customer_id: String,
    pub payment_method_on_file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub plan: Plan,
    pub limits: OrgLimits,
    pub usage: OrgUsage,
    pub settings: OrgSettings,
    pub allowed_domains: Vec<String>,
    pub billing: Option<BillingInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Well-known resources consulted through `TenantManager::check_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    Agents,
    Users,
    KnowledgeBases,
    StorageMb,
    TokensMonthly,
    ApiCallsPerMinute,
}

/// Plan limit templates, seeded for every org created with that plan.
///
/// Grounded in the teacher's `PLAN_LIMITS`-style static tables (see
/// `services::tenant_manager::plan_limits`), expressed here as plain data
/// so the tenant manager stays a thin consumer.
pub fn plan_limits(plan: Plan) -> OrgLimits {
    match plan {
        Plan::Free => OrgLimits {
            max_agents: 2,
            max_users: 3,
            max_knowledge_bases: 1,
            max_storage_mb: 500,
            token_budget_monthly: 500_000,
            api_calls_per_minute: 30,
            deployment_targets: vec![DeploymentTarget::Local, DeploymentTarget::Docker],
            features: vec![],
        },
        Plan::Team => OrgLimits {
            max_agents: 20,
            max_users: 25,
            max_knowledge_bases: 10,
            max_storage_mb: 10_000,
            token_budget_monthly: 10_000_000,
            api_calls_per_minute: 120,
            deployment_targets: vec![
                DeploymentTarget::Local,
                DeploymentTarget::Docker,
                DeploymentTarget::Fly,
                DeploymentTarget::Railway,
                DeploymentTarget::Vps,
            ],
            features: vec!["workforce_scheduling".to_string()],
        },
        Plan::Enterprise => OrgLimits {
            max_agents: 500,
            max_users: 1000,
            max_knowledge_bases: 200,
            max_storage_mb: 1_000_000,
            token_budget_monthly: 0,
            api_calls_per_minute: 1000,
            deployment_targets: vec![
                DeploymentTarget::Docker,
                DeploymentTarget::Vps,
                DeploymentTarget::Aws,
                DeploymentTarget::Gcp,
                DeploymentTarget::Azure,
                DeploymentTarget::Fly,
                DeploymentTarget::Railway,
                DeploymentTarget::Systemd,
            ],
            features: vec![
                "workforce_scheduling".to_string(),
                "sso".to_string(),
                "audit_log_export".to_string(),
            ],
        },
        Plan::SelfHosted => OrgLimits {
            max_agents: 0,
            max_users: 0,
            max_knowledge_bases: 0,
            max_storage_mb: 0,
            token_budget_monthly: 0,
            api_calls_per_minute: 0,
            deployment_targets: vec![
                DeploymentTarget::Docker,
                DeploymentTarget::Systemd,
                DeploymentTarget::Vps,
                DeploymentTarget::Local,
                DeploymentTarget::Aws,
                DeploymentTarget::Gcp,
                DeploymentTarget::Azure,
                DeploymentTarget::Fly,
                DeploymentTarget::Railway,
            ],
            features: vec![
                "workforce_scheduling".to_string(),
                "sso".to_string(),
                "audit_log_export".to_string(),
            ],
        },
    }
}

pub const DEFAULT_ORG_SLUG: &str = "default";
