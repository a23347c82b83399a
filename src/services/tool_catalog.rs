//! Tool catalog: a static, immutable registry of tools an agent may be
//! granted (spec §4.3).

use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PermissionProfile, RiskLevel, RuntimePolicy, SideEffect, ToolCatalogEntry};

pub struct ToolCatalog {
    entries: HashMap<String, ToolCatalogEntry>,
}

impl ToolCatalog {
    pub fn new(entries: Vec<ToolCatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    /// The built-in catalog every org starts with, grounded on the kinds
    /// of side effects spec §6 lists.
    pub fn with_builtin_defaults() -> Self {
        Self::new(vec![
            ToolCatalogEntry {
                id: "email.send".to_string(),
                skill_id: "email".to_string(),
                category: "communication".to_string(),
                risk: RiskLevel::Medium,
                side_effects: vec![SideEffect::SendsEmail],
            },
            ToolCatalogEntry {
                id: "message.send".to_string(),
                skill_id: "messaging".to_string(),
                category: "communication".to_string(),
                risk: RiskLevel::Low,
                side_effects: vec![SideEffect::SendsMessage],
            },
            ToolCatalogEntry {
                id: "code.run".to_string(),
                skill_id: "code_execution".to_string(),
                category: "development".to_string(),
                risk: RiskLevel::High,
                side_effects: vec![SideEffect::RunsCode, SideEffect::ModifiesFiles],
            },
            ToolCatalogEntry {
                id: "files.delete".to_string(),
                skill_id: "filesystem".to_string(),
                category: "filesystem".to_string(),
                risk: RiskLevel::High,
                side_effects: vec![SideEffect::DeletesData, SideEffect::ModifiesFiles],
            },
            ToolCatalogEntry {
                id: "payments.charge".to_string(),
                skill_id: "billing".to_string(),
                category: "finance".to_string(),
                risk: RiskLevel::Critical,
                side_effects: vec![SideEffect::Financial],
            },
            ToolCatalogEntry {
                id: "web.fetch".to_string(),
                skill_id: "browsing".to_string(),
                category: "research".to_string(),
                risk: RiskLevel::Low,
                side_effects: vec![SideEffect::NetworkRequest],
            },
        ])
    }

    pub fn get(&self, tool_id: &str) -> DomainResult<&ToolCatalogEntry> {
        self.entries.get(tool_id).ok_or_else(|| DomainError::UnknownTool(tool_id.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = &ToolCatalogEntry> {
        self.entries.values()
    }

    pub fn by_skill(&self, skill_id: &str) -> Vec<&ToolCatalogEntry> {
        self.entries.values().filter(|e| e.skill_id == skill_id).collect()
    }

    /// Resolve a profile's tool/skill policy into the four-way partition a
    /// deployed runtime consumes (spec §4.3, `generateToolPolicy`), under
    /// the same rules `PermissionEngine::evaluate` applies per call, so a
    /// tool in `allowed_tools`/`approval_required` here must replay to the
    /// matching decision from the engine (spec §8.5).
    ///
    /// `generateToolPolicy` takes no per-call context (no `now`/`ip`), so
    /// working-hours and IP gates — which depend on request context rather
    /// than tool identity — aren't reflected in the partition. Sandbox mode
    /// is a profile-wide constant, so it's applied here exactly as it
    /// pre-empts every other gate in `evaluate`.
    pub fn to_runtime_policy(&self, profile: &PermissionProfile) -> RuntimePolicy {
        use crate::domain::models::SkillsMode;

        let mut allowed_tools = Vec::new();
        let mut blocked_tools = Vec::new();
        let mut approval_required = Vec::new();

        for entry in self.entries.values() {
            if profile.constraints.sandbox_mode {
                allowed_tools.push(entry.id.clone());
                continue;
            }

            if profile.tools.blocked.contains(&entry.id) {
                blocked_tools.push(entry.id.clone());
                continue;
            }

            if profile.tools.allowed.contains(&entry.id) {
                if requires_approval(profile, entry) {
                    approval_required.push(entry.id.clone());
                } else {
                    allowed_tools.push(entry.id.clone());
                }
                continue;
            }

            let skill_allowed = match profile.skills.mode {
                SkillsMode::Allowlist => profile.skills.list.contains(&entry.skill_id),
                SkillsMode::Blocklist => !profile.skills.list.contains(&entry.skill_id),
            };
            if !skill_allowed {
                blocked_tools.push(entry.id.clone());
                continue;
            }

            if entry.risk > profile.max_risk_level {
                blocked_tools.push(entry.id.clone());
                continue;
            }

            let side_effect_blocked = entry
                .side_effects
                .iter()
                .any(|se| profile.blocked_side_effects.contains(&se.as_str().to_string()));
            if side_effect_blocked {
                blocked_tools.push(entry.id.clone());
                continue;
            }

            if requires_approval(profile, entry) {
                approval_required.push(entry.id.clone());
            } else {
                allowed_tools.push(entry.id.clone());
            }
        }

        RuntimePolicy {
            allowed_tools,
            blocked_tools,
            approval_required,
            rate_limits: profile.rate_limits.clone(),
        }
    }
}

fn requires_approval(profile: &PermissionProfile, entry: &ToolCatalogEntry) -> bool {
    profile.require_approval.enabled
        && (profile.require_approval.for_risk_levels.contains(&entry.risk)
            || entry
                .side_effects
                .iter()
                .any(|se| profile.require_approval.for_side_effects.contains(&se.as_str().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PermissionProfile;

    #[test]
    fn restricted_preset_denies_high_risk_tools() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let profile = PermissionProfile::preset_restricted("p1", "o1");
        let policy = catalog.to_runtime_policy(&profile);
        assert!(policy.blocked_tools.contains(&"payments.charge".to_string()));
        assert!(policy.blocked_tools.contains(&"files.delete".to_string()));
    }

    #[test]
    fn standard_preset_allows_low_and_medium_risk() {
        let catalog = ToolCatalog::with_builtin_defaults();
        // Blocklist mode with an empty block list: every skill passes,
        // so risk level is the only remaining gate.
        let profile = PermissionProfile::preset_standard("p1", "o1");
        let policy = catalog.to_runtime_policy(&profile);
        assert!(policy.allowed_tools.contains(&"web.fetch".to_string()));
        assert!(policy.allowed_tools.contains(&"email.send".to_string()));
    }

    #[test]
    fn unknown_tool_lookup_fails() {
        let catalog = ToolCatalog::with_builtin_defaults();
        assert!(matches!(catalog.get("nonexistent"), Err(DomainError::UnknownTool(_))));
    }

    #[test]
    fn sandbox_mode_allows_every_tool_and_skips_approval() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let mut profile = PermissionProfile::preset_restricted("p1", "o1");
        profile.constraints.sandbox_mode = true;
        let policy = catalog.to_runtime_policy(&profile);
        assert!(policy.blocked_tools.is_empty());
        assert!(policy.approval_required.is_empty());
        assert!(policy.allowed_tools.contains(&"payments.charge".to_string()));
    }

    #[test]
    fn approval_required_partition_matches_require_approval_clause() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let mut profile = PermissionProfile::preset_standard("p1", "o1");
        profile.require_approval.enabled = true;
        profile.require_approval.for_risk_levels = vec![RiskLevel::Medium];
        let policy = catalog.to_runtime_policy(&profile);
        assert!(policy.approval_required.contains(&"email.send".to_string()));
        assert!(!policy.allowed_tools.contains(&"email.send".to_string()));
    }

    #[test]
    fn explicitly_allowed_tool_reaches_allowed_partition_without_skill_gate() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let mut profile = PermissionProfile::preset_restricted("p1", "o1");
        profile.require_approval.enabled = false;
        // "email" is deliberately absent from the (empty) skill allowlist.
        profile.tools.allowed.push("email.send".to_string());
        let policy = catalog.to_runtime_policy(&profile);
        assert!(policy.allowed_tools.contains(&"email.send".to_string()));
    }
}
