//! Permission profile domain model (spec §3, §4.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillsMode {
    Allowlist,
    Blocklist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsPolicy {
    pub mode: SkillsMode,
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsPolicy {
    pub blocked: Vec<String>,
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequireApproval {
    pub enabled: bool,
    pub for_risk_levels: Vec<RiskLevel>,
    pub for_side_effects: Vec<String>,
    pub approvers: Vec<String>,
    pub timeout_minutes: u32,
    /// If true, an unanswered request becomes `auto_denied` instead of `expired`.
    #[serde(default)]
    pub auto_deny_on_timeout: bool,
}

impl Default for RequireApproval {
    fn default() -> Self {
        Self {
            enabled: false,
            for_risk_levels: Vec::new(),
            for_side_effects: Vec::new(),
            approvers: Vec::new(),
            timeout_minutes: 30,
            auto_deny_on_timeout: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
    pub external_actions_per_hour: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHoursWindow {
    pub start: String, // "HH:MM"
    pub end: String,
    pub tz: String, // IANA timezone name
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub max_concurrent_tasks: Option<u32>,
    pub max_session_duration_minutes: Option<u32>,
    pub allowed_working_hours: Option<WorkingHoursWindow>,
    pub allowed_ips: Option<Vec<String>>,
    #[serde(default)]
    pub sandbox_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionProfile {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub skills: SkillsPolicy,
    pub tools: ToolsPolicy,
    pub max_risk_level: RiskLevel,
    pub blocked_side_effects: Vec<String>,
    pub require_approval: RequireApproval,
    pub rate_limits: RateLimits,
    pub constraints: Constraints,
}

impl PermissionProfile {
    /// A conservative starter profile: low risk, no side effects, approval
    /// required for anything risky. Mirrors the teacher's "safe defaults"
    /// preset convention (`profiles/presets`, spec §6).
    pub fn preset_restricted(id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            name: "restricted".to_string(),
            skills: SkillsPolicy {
                mode: SkillsMode::Allowlist,
                list: Vec::new(),
            },
            tools: ToolsPolicy::default(),
            max_risk_level: RiskLevel::Low,
            blocked_side_effects: vec![
                "deletes-data".to_string(),
                "financial".to_string(),
                "controls-device".to_string(),
            ],
            require_approval: RequireApproval {
                enabled: true,
                for_risk_levels: vec![RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical],
                for_side_effects: vec!["sends-email".to_string(), "sends-message".to_string()],
                approvers: Vec::new(),
                timeout_minutes: 30,
                auto_deny_on_timeout: false,
            },
            rate_limits: RateLimits::default(),
            constraints: Constraints::default(),
        }
    }

    /// A permissive preset for trusted internal agents.
    pub fn preset_standard(id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            name: "standard".to_string(),
            skills: SkillsPolicy {
                mode: SkillsMode::Blocklist,
                list: Vec::new(),
            },
            tools: ToolsPolicy::default(),
            max_risk_level: RiskLevel::High,
            blocked_side_effects: vec!["deletes-data".to_string()],
            require_approval: RequireApproval {
                enabled: true,
                for_risk_levels: vec![RiskLevel::Critical],
                for_side_effects: vec!["financial".to_string()],
                approvers: Vec::new(),
                timeout_minutes: 15,
                auto_deny_on_timeout: false,
            },
            rate_limits: RateLimits::default(),
            constraints: Constraints::default(),
        }
    }
}
