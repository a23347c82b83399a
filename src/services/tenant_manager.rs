//! Tenant (organization) lifecycle and quota enforcement (spec §4.2).

use std::sync::Arc;

use chrono::{Datelike, Utc};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    plan_limits, BillingInfo, OrgSettings, Organization, Plan, QuotaResource, DEFAULT_ORG_SLUG,
};
use crate::domain::ports::Store;

/// Outcome of a quota check. Deliberately not a `DomainError` (spec §7):
/// exceeding a quota is an expected, first-class result, not a failure
/// to be propagated with `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckLimitResult {
    pub allowed: bool,
    pub resource: QuotaResource,
    pub current: u64,
    pub limit: u64,
}

impl CheckLimitResult {
    fn unlimited(resource: QuotaResource, current: u64) -> Self {
        Self { allowed: true, resource, current, limit: 0 }
    }
}

pub struct TenantManager {
    store: Arc<dyn Store>,
}

impl TenantManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_org(&self, name: impl Into<String>, plan: Plan) -> DomainResult<Organization> {
        let name = name.into();
        let slug = slugify(&name);
        if self.store.get_org_by_slug(&slug).await.map_err(store_err)?.is_some() {
            return Err(DomainError::DuplicateSlug(slug));
        }
        let now = Utc::now();
        let org = Organization {
            id: uuid::Uuid::new_v4().to_string(),
            slug,
            name,
            plan,
            limits: plan_limits(plan),
            usage: Default::default(),
            settings: OrgSettings::default(),
            allowed_domains: Vec::new(),
            billing: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_org(&org).await.map_err(store_err)?;
        Ok(org)
    }

    /// Ensure the single-tenant default org exists (spec §8 scenario 1).
    pub async fn ensure_default_org(&self) -> DomainResult<Organization> {
        if let Some(org) = self.store.get_org_by_slug(DEFAULT_ORG_SLUG).await.map_err(store_err)? {
            return Ok(org);
        }
        self.create_org("Default", Plan::Free).await
    }

    pub async fn get_org(&self, id: &str) -> DomainResult<Organization> {
        self.store
            .get_org(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| DomainError::OrgNotFound(id.to_string()))
    }

    pub async fn set_billing(&self, org_id: &str, billing: BillingInfo) -> DomainResult<Organization> {
        let mut org = self.get_org(org_id).await?;
        org.billing = Some(billing);
        org.updated_at = Utc::now();
        self.store.upsert_org(&org).await.map_err(store_err)?;
        Ok(org)
    }

    /// Check whether consuming `requested` additional units of `resource`
    /// would exceed the organization's plan limit. Does not mutate usage;
    /// callers record usage separately once the underlying action succeeds.
    pub async fn check_limit(
        &self,
        org_id: &str,
        resource: QuotaResource,
        requested: u64,
    ) -> DomainResult<CheckLimitResult> {
        let org = self.get_org(org_id).await?;
        let (current, limit) = match resource {
            QuotaResource::Agents => (org.usage.agents as u64, org.limits.max_agents as u64),
            QuotaResource::Users => (org.usage.users as u64, org.limits.max_users as u64),
            QuotaResource::KnowledgeBases => {
                (org.usage.knowledge_bases as u64, org.limits.max_knowledge_bases as u64)
            }
            QuotaResource::StorageMb => (org.usage.storage_mb, org.limits.max_storage_mb),
            QuotaResource::TokensMonthly => {
                (org.usage.tokens_this_month, org.limits.token_budget_monthly)
            }
            QuotaResource::ApiCallsPerMinute => {
                (org.usage.api_calls_today as u64, org.limits.api_calls_per_minute as u64)
            }
        };
        if limit == 0 {
            return Ok(CheckLimitResult::unlimited(resource, current));
        }
        Ok(CheckLimitResult {
            allowed: current + requested <= limit,
            resource,
            current,
            limit,
        })
    }

    /// Record consumption of `resource` after the caller's action has
    /// already succeeded (spec §4.2: usage mutation is the caller's
    /// responsibility, after the gated action, never before).
    pub async fn record_usage(&self, org_id: &str, resource: QuotaResource, amount: u64) -> DomainResult<()> {
        let mut org = self.get_org(org_id).await?;
        match resource {
            QuotaResource::Agents => org.usage.agents += amount as u32,
            QuotaResource::Users => org.usage.users += amount as u32,
            QuotaResource::KnowledgeBases => org.usage.knowledge_bases += amount as u32,
            QuotaResource::StorageMb => org.usage.storage_mb += amount,
            QuotaResource::TokensMonthly => org.usage.tokens_this_month += amount,
            QuotaResource::ApiCallsPerMinute => org.usage.api_calls_today += amount as u32,
        }
        org.updated_at = Utc::now();
        self.store.upsert_org(&org).await.map_err(store_err)?;
        Ok(())
    }

    /// Idempotent counter reset for the scheduler tick (spec §9: "cron-style
    /// reset keyed by (period-kind, period-key) so a missed tick cannot
    /// double-reset"). Returns `true` if a reset happened.
    pub async fn reset_period_if_due(&self, org_id: &str, period: PeriodKind) -> DomainResult<bool> {
        let mut org = self.get_org(org_id).await?;
        let key = period.key_for(Utc::now());
        let last = match period {
            PeriodKind::Daily => &mut org.usage.last_daily_reset,
            PeriodKind::Weekly => &mut org.usage.last_weekly_reset,
            PeriodKind::Monthly => &mut org.usage.last_monthly_reset,
            PeriodKind::Annual => &mut org.usage.last_annual_reset,
        };
        if last.as_deref() == Some(key.as_str()) {
            return Ok(false);
        }
        *last = Some(key);
        match period {
            PeriodKind::Daily => org.usage.api_calls_today = 0,
            PeriodKind::Monthly => {
                org.usage.tokens_this_month = 0;
                org.usage.cost_this_month_usd = 0.0;
                org.usage.deployments_this_month = 0;
            }
            PeriodKind::Weekly | PeriodKind::Annual => {}
        }
        org.updated_at = Utc::now();
        self.store.upsert_org(&org).await.map_err(store_err)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl PeriodKind {
    fn key_for(&self, now: chrono::DateTime<Utc>) -> String {
        match self {
            Self::Daily => now.format("%Y-%m-%d").to_string(),
            Self::Weekly => format!("{}-W{:02}", now.year(), now.iso_week().week()),
            Self::Monthly => now.format("%Y-%m").to_string(),
            Self::Annual => now.format("%Y").to_string(),
        }
    }
}

fn slugify(name: &str) -> String {
    let mut slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    slug = slug.trim_matches('-').to_string();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    if slug.is_empty() {
        slug = uuid::Uuid::new_v4().to_string();
    }
    slug
}

fn store_err(e: crate::domain::ports::StoreError) -> DomainError {
    DomainError::Validation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{dialect::Dialect, migrations, SqlStore};
    use sqlx::SqlitePool;

    async fn manager() -> TenantManager {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool, Dialect::Sqlite).await.unwrap();
        TenantManager::new(Arc::new(SqlStore::new(pool)))
    }

    #[tokio::test]
    async fn creating_duplicate_slug_is_rejected() {
        let mgr = manager().await;
        mgr.create_org("Acme Inc", Plan::Free).await.unwrap();
        let err = mgr.create_org("acme inc", Plan::Team).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSlug(_)));
    }

    #[tokio::test]
    async fn check_limit_reports_exceeded() {
        let mgr = manager().await;
        let org = mgr.create_org("Acme", Plan::Free).await.unwrap();
        mgr.record_usage(&org.id, QuotaResource::Agents, 2).await.unwrap();
        let result = mgr.check_limit(&org.id, QuotaResource::Agents, 1).await.unwrap();
        assert!(!result.allowed);
    }

    #[tokio::test]
    async fn enterprise_token_budget_is_unlimited() {
        let mgr = manager().await;
        let org = mgr.create_org("BigCo", Plan::Enterprise).await.unwrap();
        let result = mgr.check_limit(&org.id, QuotaResource::TokensMonthly, 10_000_000_000).await.unwrap();
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn reset_is_idempotent_within_the_same_day() {
        let mgr = manager().await;
        let org = mgr.create_org("Acme", Plan::Free).await.unwrap();
        assert!(mgr.reset_period_if_due(&org.id, PeriodKind::Daily).await.unwrap());
        assert!(!mgr.reset_period_if_due(&org.id, PeriodKind::Daily).await.unwrap());
    }
}
