//! Budget and usage metering (spec §4.6).
//!
//! Agent usage counters live on the in-memory `ManagedAgent` (owned by
//! `AgentRegistry`), so metering here is plain locked mutation rather
//! than the teacher's free-standing atomics — one agent is one lock,
//! already serialized by `AgentRegistry`. The idempotency technique is
//! the same principle as the teacher's `check_and_record_tokens` CAS
//! loop: record once, then never re-fire a hard-stop event for a period
//! that has already tripped it (`exceeded_periods`).

use std::sync::Arc;

use crate::domain::models::{AgentUsage, EventPayload};
use crate::services::event_bus::EventBus;

const WARNING_THRESHOLD_PCT: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetCounter {
    TokensMonthly,
    CostMonthly,
}

#[derive(Debug, Clone, Default)]
pub struct UsageDelta {
    pub tokens: u64,
    pub tool_calls: u64,
    pub cost_usd: f64,
    pub external_actions: u64,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    pub exceeded: Vec<BudgetCounter>,
    pub warnings: Vec<BudgetCounter>,
}

impl BudgetCheck {
    pub fn is_within_budget(&self) -> bool {
        self.exceeded.is_empty()
    }
}

pub struct BudgetMeter {
    event_bus: Arc<EventBus>,
}

impl BudgetMeter {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    /// Apply a usage delta to `usage`, returning which budgets are now
    /// exceeded or approaching their limit. Publishes `BudgetWarning` /
    /// `BudgetExceeded` events, but only once per period per counter.
    pub async fn record(&self, org_id: &str, agent_id: &str, usage: &mut AgentUsage, delta: UsageDelta) -> BudgetCheck {
        usage.tokens_today += delta.tokens;
        usage.tokens_this_month += delta.tokens;
        usage.tool_calls_today += delta.tool_calls;
        usage.tool_calls_this_month += delta.tool_calls;
        usage.cost_today_usd += delta.cost_usd;
        usage.cost_this_month_usd += delta.cost_usd;
        usage.external_actions_today += delta.external_actions;
        usage.external_actions_this_month += delta.external_actions;
        if delta.is_error {
            usage.errors_today += 1;
        }

        let mut check = BudgetCheck { exceeded: Vec::new(), warnings: Vec::new() };

        if usage.token_budget_monthly > 0 {
            self.evaluate_counter(
                org_id,
                agent_id,
                usage,
                BudgetCounter::TokensMonthly,
                usage.tokens_this_month as f64,
                usage.token_budget_monthly as f64,
                "tokens_monthly",
                &mut check,
            )
            .await;
        }
        if usage.cost_budget_monthly_usd > 0.0 {
            self.evaluate_counter(
                org_id,
                agent_id,
                usage,
                BudgetCounter::CostMonthly,
                usage.cost_this_month_usd,
                usage.cost_budget_monthly_usd,
                "cost_monthly",
                &mut check,
            )
            .await;
        }

        check
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_counter(
        &self,
        org_id: &str,
        agent_id: &str,
        usage: &mut AgentUsage,
        counter: BudgetCounter,
        current: f64,
        limit: f64,
        period_key_prefix: &str,
        check: &mut BudgetCheck,
    ) {
        let pct = current / limit;
        if pct >= 1.0 {
            let key = format!("{period_key_prefix}:exceeded");
            check.exceeded.push(counter);
            if !usage.exceeded_periods.iter().any(|k| k == &key) {
                usage.exceeded_periods.push(key);
                self.event_bus
                    .publish(
                        org_id.to_string(),
                        EventPayload::BudgetExceeded {
                            agent_id: agent_id.to_string(),
                            counter: period_key_prefix.to_string(),
                        },
                    )
                    .await;
            }
        } else if pct >= WARNING_THRESHOLD_PCT {
            check.warnings.push(counter);
            self.event_bus
                .publish(
                    org_id.to_string(),
                    EventPayload::BudgetWarning {
                        agent_id: agent_id.to_string(),
                        counter: period_key_prefix.to_string(),
                        pct,
                    },
                )
                .await;
        }
    }

    /// Idempotent monthly reset (spec §9: cron-style reset keyed by period).
    /// Returns `true` if a reset happened.
    pub fn reset_monthly_if_due(&self, usage: &mut AgentUsage, now: chrono::DateTime<chrono::Utc>) -> bool {
        let key = now.format("%Y-%m").to_string();
        if usage.last_monthly_reset.as_deref() == Some(key.as_str()) {
            return false;
        }
        usage.last_monthly_reset = Some(key);
        usage.tokens_this_month = 0;
        usage.tool_calls_this_month = 0;
        usage.cost_this_month_usd = 0.0;
        usage.external_actions_this_month = 0;
        usage.exceeded_periods.clear();
        true
    }

    pub fn reset_daily_if_due(&self, usage: &mut AgentUsage, now: chrono::DateTime<chrono::Utc>) -> bool {
        let key = now.format("%Y-%m-%d").to_string();
        if usage.last_daily_reset.as_deref() == Some(key.as_str()) {
            return false;
        }
        usage.last_daily_reset = Some(key);
        usage.tokens_today = 0;
        usage.tool_calls_today = 0;
        usage.cost_today_usd = 0.0;
        usage.external_actions_today = 0;
        usage.errors_today = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage_with_budget(tokens: u64) -> AgentUsage {
        AgentUsage { token_budget_monthly: tokens, ..Default::default() }
    }

    #[tokio::test]
    async fn crossing_the_limit_is_reported_exceeded_exactly_once() {
        let meter = BudgetMeter::new(Arc::new(EventBus::new()));
        let mut usage = usage_with_budget(100);
        let delta = UsageDelta { tokens: 100, tool_calls: 0, cost_usd: 0.0, external_actions: 0, is_error: false };
        let first = meter.record("o1", "a1", &mut usage, delta.clone()).await;
        assert!(!first.is_within_budget());
        assert_eq!(usage.exceeded_periods.len(), 1);

        let second = meter.record("o1", "a1", &mut usage, UsageDelta { tokens: 0, ..delta }).await;
        assert!(!second.is_within_budget());
        assert_eq!(usage.exceeded_periods.len(), 1, "must not re-fire for the same period");
    }

    #[tokio::test]
    async fn eighty_percent_triggers_a_warning_not_a_hard_stop() {
        let meter = BudgetMeter::new(Arc::new(EventBus::new()));
        let mut usage = usage_with_budget(100);
        let delta = UsageDelta { tokens: 80, tool_calls: 0, cost_usd: 0.0, external_actions: 0, is_error: false };
        let check = meter.record("o1", "a1", &mut usage, delta).await;
        assert!(check.is_within_budget());
        assert_eq!(check.warnings, vec![BudgetCounter::TokensMonthly]);
    }

    #[test]
    fn monthly_reset_clears_exceeded_periods() {
        let meter = BudgetMeter::new(Arc::new(EventBus::new()));
        let mut usage = usage_with_budget(100);
        usage.exceeded_periods.push("tokens_monthly:exceeded".to_string());
        usage.tokens_this_month = 500;
        let now = chrono::Utc::now();
        assert!(meter.reset_monthly_if_due(&mut usage, now));
        assert!(usage.exceeded_periods.is_empty());
        assert_eq!(usage.tokens_this_month, 0);
        assert!(!meter.reset_monthly_if_due(&mut usage, now));
    }
}
