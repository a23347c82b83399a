//! Permission engine: evaluates whether an agent may invoke a tool call
//! (spec §4.4).
//!
//! Not a `DomainError` producer — per spec §7 a denial is a normal,
//! first-class result, so `evaluate` always returns `Ok(PermissionDecision)`
//! except when the tool itself doesn't exist in the catalog.

use chrono::{NaiveTime, Timelike, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Constraints, PermissionProfile, RateLimits, ToolCatalogEntry};
use crate::services::tool_catalog::ToolCatalog;

#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allowed,
    /// `constraints.sandboxMode` short-circuits everything else: the call
    /// is allowed but the runtime must simulate its side effects rather
    /// than execute them.
    Sandboxed { reason: String },
    Denied { reason: String },
    RequiresApproval { reason: String },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed | Self::Sandboxed { .. })
    }
}

/// Rolling counters consulted for rate-limit enforcement. Actual counting
/// is the runtime's responsibility (spec §4.4 open question); the engine
/// only compares against the limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateCounters {
    pub calls_this_minute: u32,
    pub calls_this_hour: u32,
    pub calls_today: u32,
    pub external_actions_this_hour: u32,
}

pub struct PermissionEngine<'a> {
    catalog: &'a ToolCatalog,
}

impl<'a> PermissionEngine<'a> {
    pub fn new(catalog: &'a ToolCatalog) -> Self {
        Self { catalog }
    }

    /// Evaluation order (spec §4.4), first match wins:
    /// 1. no profile bound to agent (checked by the caller, before `evaluate`)
    /// 2. `constraints.sandboxMode` → allow, simulated
    /// 3. allowed working hours
    /// 4. allowed IPs
    /// 5. `tools.blocked`
    /// 6. `tools.allowed` — short-circuits skill/risk/side-effect gates,
    ///    straight to the rate-limit/approval tail
    /// 7. catalog lookup (unknown tool)
    /// 8. skill policy (allow/block list)
    /// 9. max risk level
    /// 10. blocked side effects
    /// 11. rate limits, then require-approval clause, then default allow
    pub fn evaluate(
        &self,
        profile: &PermissionProfile,
        tool_id: &str,
        counters: RateCounters,
        now: chrono::DateTime<Utc>,
        ip: Option<&str>,
    ) -> DomainResult<PermissionDecision> {
        if profile.constraints.sandbox_mode {
            return Ok(PermissionDecision::Sandboxed { reason: "simulated".to_string() });
        }

        if let Some(reason) = self.check_working_hours(&profile.constraints, now) {
            return Ok(PermissionDecision::Denied { reason });
        }

        if let Some(reason) = check_allowed_ips(&profile.constraints, ip) {
            return Ok(PermissionDecision::Denied { reason });
        }

        if profile.tools.blocked.iter().any(|t| t == tool_id) {
            return Ok(PermissionDecision::Denied {
                reason: format!("tool '{}' is explicitly blocked", tool_id),
            });
        }

        if profile.tools.allowed.iter().any(|t| t == tool_id) {
            let tool = self.catalog.get(tool_id)?;
            return Ok(self.finish(profile, tool, counters));
        }

        let tool = self.catalog.get(tool_id)?;

        if let Some(decision) = self.check_skill_policy(profile, tool) {
            return Ok(decision);
        }

        if tool.risk > profile.max_risk_level {
            return Ok(PermissionDecision::Denied {
                reason: format!(
                    "risk level {:?} exceeds profile maximum {:?}",
                    tool.risk, profile.max_risk_level
                ),
            });
        }

        if let Some(se) = tool
            .side_effects
            .iter()
            .find(|se| profile.blocked_side_effects.contains(&se.as_str().to_string()))
        {
            return Ok(PermissionDecision::Denied {
                reason: format!("side effect '{}' is blocked", se.as_str()),
            });
        }

        Ok(self.finish(profile, tool, counters))
    }

    /// Rate limits and the require-approval clause apply no matter which
    /// path reached here — the `tools.allowed` short-circuit skips the
    /// skill/risk/side-effect gates, not these.
    fn finish(&self, profile: &PermissionProfile, tool: &ToolCatalogEntry, counters: RateCounters) -> PermissionDecision {
        if let Some(reason) = check_rate_limits(&profile.rate_limits, &counters) {
            return PermissionDecision::Denied { reason };
        }

        if profile.require_approval.enabled
            && (profile.require_approval.for_risk_levels.contains(&tool.risk)
                || tool
                    .side_effects
                    .iter()
                    .any(|se| profile.require_approval.for_side_effects.contains(&se.as_str().to_string())))
        {
            return PermissionDecision::RequiresApproval {
                reason: format!("tool '{}' requires approval under this profile", tool.id),
            };
        }

        PermissionDecision::Allowed
    }

    fn check_skill_policy(&self, profile: &PermissionProfile, tool: &ToolCatalogEntry) -> Option<PermissionDecision> {
        use crate::domain::models::SkillsMode;
        let allowed = match profile.skills.mode {
            SkillsMode::Allowlist => profile.skills.list.contains(&tool.skill_id),
            SkillsMode::Blocklist => !profile.skills.list.contains(&tool.skill_id),
        };
        if allowed {
            None
        } else {
            Some(PermissionDecision::Denied {
                reason: format!("skill '{}' is not permitted by this profile", tool.skill_id),
            })
        }
    }

    fn check_working_hours(&self, constraints: &Constraints, now: chrono::DateTime<Utc>) -> Option<String> {
        let window = constraints.allowed_working_hours.as_ref()?;
        let tz: chrono_tz::Tz = window.tz.parse().ok()?;
        let local = now.with_timezone(&tz).time();
        let start = NaiveTime::parse_from_str(&window.start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(&window.end, "%H:%M").ok()?;
        let in_window = if start <= end {
            local >= start && local <= end
        } else {
            local >= start || local <= end
        };
        if in_window {
            None
        } else {
            Some(format!("outside allowed working hours ({}-{} {})", window.start, window.end, window.tz))
        }
    }
}

fn check_allowed_ips(constraints: &Constraints, ip: Option<&str>) -> Option<String> {
    let allowed = constraints.allowed_ips.as_ref()?;
    if allowed.is_empty() {
        return None;
    }
    match ip {
        Some(ip) if allowed.iter().any(|a| a == ip) => None,
        _ => Some("IP not allowlisted".to_string()),
    }
}

fn check_rate_limits(limits: &RateLimits, counters: &RateCounters) -> Option<String> {
    if let Some(max) = limits.per_minute {
        if counters.calls_this_minute >= max {
            return Some("per-minute rate limit exceeded".to_string());
        }
    }
    if let Some(max) = limits.per_hour {
        if counters.calls_this_hour >= max {
            return Some("per-hour rate limit exceeded".to_string());
        }
    }
    if let Some(max) = limits.per_day {
        if counters.calls_today >= max {
            return Some("per-day rate limit exceeded".to_string());
        }
    }
    if let Some(max) = limits.external_actions_per_hour {
        if counters.external_actions_this_hour >= max {
            return Some("external-action rate limit exceeded".to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PermissionProfile, RiskLevel, WorkingHoursWindow};
    use crate::services::tool_catalog::ToolCatalog;

    fn restricted_but_allowlisted_email() -> PermissionProfile {
        let mut p = PermissionProfile::preset_restricted("p1", "o1");
        p.skills.list.push("email".to_string());
        p
    }

    #[test]
    fn fast_path_allows_low_risk_tool_in_allowlisted_skill() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = restricted_but_allowlisted_email();
        profile.max_risk_level = RiskLevel::Medium;
        profile.require_approval.enabled = false;
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), None)
            .unwrap();
        assert_eq!(decision, PermissionDecision::Allowed);
    }

    #[test]
    fn denies_tool_not_in_skill_allowlist() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let profile = PermissionProfile::preset_restricted("p1", "o1");
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), None)
            .unwrap();
        assert!(matches!(decision, PermissionDecision::Denied { .. }));
    }

    #[test]
    fn requires_approval_for_configured_risk_level() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let profile = restricted_but_allowlisted_email();
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), None)
            .unwrap();
        assert!(matches!(decision, PermissionDecision::RequiresApproval { .. }));
    }

    #[test]
    fn rate_limit_denies_before_approval_check() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = restricted_but_allowlisted_email();
        profile.rate_limits.per_minute = Some(1);
        let counters = RateCounters { calls_this_minute: 1, ..Default::default() };
        let decision = engine.evaluate(&profile, "email.send", counters, Utc::now(), None).unwrap();
        assert!(matches!(decision, PermissionDecision::Denied { .. }));
    }

    #[test]
    fn sandbox_mode_allows_and_labels_as_simulated_before_any_other_gate() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = PermissionProfile::preset_restricted("p1", "o1");
        profile.constraints.sandbox_mode = true;
        // "email.send" isn't in the skill allowlist and would normally be
        // denied at the skill gate; sandbox mode must pre-empt that.
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), None)
            .unwrap();
        assert_eq!(decision, PermissionDecision::Sandboxed { reason: "simulated".to_string() });
    }

    #[test]
    fn ip_not_in_allowlist_is_denied() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = restricted_but_allowlisted_email();
        profile.constraints.allowed_ips = Some(vec!["10.0.0.1".to_string()]);
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), Some("10.0.0.2"))
            .unwrap();
        assert!(matches!(decision, PermissionDecision::Denied { ref reason } if reason == "IP not allowlisted"));
    }

    #[test]
    fn ip_in_allowlist_passes_through() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = restricted_but_allowlisted_email();
        profile.max_risk_level = RiskLevel::Medium;
        profile.require_approval.enabled = false;
        profile.constraints.allowed_ips = Some(vec!["10.0.0.1".to_string()]);
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), Some("10.0.0.1"))
            .unwrap();
        assert_eq!(decision, PermissionDecision::Allowed);
    }

    #[test]
    fn explicitly_allowed_tool_skips_skill_gate() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = PermissionProfile::preset_restricted("p1", "o1");
        profile.max_risk_level = RiskLevel::Critical;
        profile.require_approval.enabled = false;
        // "email" is deliberately left out of profile.skills.list; the
        // tools.allowed entry must still short-circuit past that gate.
        profile.tools.allowed.push("email.send".to_string());
        let decision = engine
            .evaluate(&profile, "email.send", RateCounters::default(), Utc::now(), None)
            .unwrap();
        assert_eq!(decision, PermissionDecision::Allowed);
    }

    #[test]
    fn working_hours_outside_window_denies_before_ip_and_blocked_checks() {
        let catalog = ToolCatalog::with_builtin_defaults();
        let engine = PermissionEngine::new(&catalog);
        let mut profile = restricted_but_allowlisted_email();
        profile.constraints.allowed_working_hours = Some(WorkingHoursWindow {
            start: "09:00".to_string(),
            end: "09:01".to_string(),
            tz: "UTC".to_string(),
        });
        let now = "2026-07-29T20:00:00Z".parse::<chrono::DateTime<Utc>>().unwrap();
        let decision = engine.evaluate(&profile, "email.send", RateCounters::default(), now, None).unwrap();
        assert!(matches!(decision, PermissionDecision::Denied { .. }));
    }
}
