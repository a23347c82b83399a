//! Approval workflow domain model (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::permission::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
    AutoDenied,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub by: String,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub org_id: String,
    pub tool_id: String,
    pub tool_name: String,
    pub reason: String,
    pub risk_level: RiskLevel,
    pub side_effects: Vec<String>,
    pub parameters: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
    pub status: ApprovalStatus,
    pub decision: Option<ApprovalDecision>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A first-class match rule for approval policy, modeled explicitly per
/// spec §9 ("Approval policy matching is left deliberately abstract...
/// implementations should model it as a first-class match on
/// `{toolId patterns, riskLevel, sideEffects}` with explicit priority").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub id: String,
    pub org_id: String,
    /// Higher priority wins when multiple policies match the same call.
    pub priority: i32,
    /// Glob-ish patterns matched against `toolId` (`*` wildcard only, to
    /// keep matching dependency-free — see `matches_tool_id`).
    pub tool_id_patterns: Vec<String>,
    pub risk_levels: Vec<RiskLevel>,
    pub side_effects: Vec<String>,
    pub timeout_minutes: u32,
    pub auto_deny_on_timeout: bool,
    pub approvers: Vec<String>,
}

impl ApprovalPolicy {
    pub fn matches_tool_id(&self, tool_id: &str) -> bool {
        if self.tool_id_patterns.is_empty() {
            return true;
        }
        self.tool_id_patterns.iter().any(|pat| glob_match(pat, tool_id))
    }

    pub fn matches(&self, tool_id: &str, risk: RiskLevel, side_effects: &[String]) -> bool {
        if !self.matches_tool_id(tool_id) {
            return false;
        }
        let risk_ok = self.risk_levels.is_empty() || self.risk_levels.contains(&risk);
        let effects_ok = self.side_effects.is_empty()
            || side_effects.iter().any(|e| self.side_effects.contains(e));
        risk_ok && effects_ok
    }
}

/// Minimal `*`-only glob matcher: supports a single trailing/leading `*`
/// or an exact match, which is all `tool_id_patterns` needs.
fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_prefix_and_suffix() {
        assert!(glob_match("email.*", "email.send"));
        assert!(glob_match("*.send", "email.send"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("email.*", "sms.send"));
    }

    #[test]
    fn policy_matches_requires_all_clauses() {
        let policy = ApprovalPolicy {
            id: "p1".into(),
            org_id: "o1".into(),
            priority: 0,
            tool_id_patterns: vec!["email.*".into()],
            risk_levels: vec![RiskLevel::High],
            side_effects: vec!["sends-email".into()],
            timeout_minutes: 30,
            auto_deny_on_timeout: false,
            approvers: vec![],
        };
        assert!(policy.matches("email.send", RiskLevel::High, &["sends-email".to_string()]));
        assert!(!policy.matches("sms.send", RiskLevel::High, &["sends-email".to_string()]));
        assert!(!policy.matches("email.send", RiskLevel::Low, &["sends-email".to_string()]));
    }
}
