//! Write-behind buffering over a `Store` (spec §4.1: "the in-memory
//! value stays authoritative; the store is a write-behind cache").
//!
//! Hot-path entities (`managed_agents`, `organizations`) are mutated in
//! an in-process `DashMap` first and returned to callers immediately;
//! a background task flushes dirty entries to the inner store on a
//! fixed interval. A store write failure never surfaces to the caller
//! that triggered the mutation — it's retried on the next tick. Every
//! other entity passes straight through, since only agents and orgs
//! see the sustained per-tool-call write volume the buffer is for.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{error, warn};

use crate::domain::models::{
    AgentMessage, ApprovalPolicy, ApprovalRequest, ClockRecord, ManagedAgent, Organization,
    PermissionProfile, QueuedTask, WorkSchedule,
};
use crate::domain::ports::{RawRow, Store, StoreResult};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

pub struct WriteBehindStore<S: Store> {
    inner: Arc<S>,
    agents: Arc<DashMap<String, ManagedAgent>>,
    orgs: Arc<DashMap<String, Organization>>,
    dirty_agents: Arc<DashMap<String, ()>>,
    dirty_orgs: Arc<DashMap<String, ()>>,
}

impl<S: Store + 'static> WriteBehindStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            agents: Arc::new(DashMap::new()),
            orgs: Arc::new(DashMap::new()),
            dirty_agents: Arc::new(DashMap::new()),
            dirty_orgs: Arc::new(DashMap::new()),
        }
    }

    /// Spawn the background flush loop. Call once at startup.
    pub fn spawn_flush_loop(&self) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        let agents = self.agents.clone();
        let orgs = self.orgs.clone();
        let dirty_agents = self.dirty_agents.clone();
        let dirty_orgs = self.dirty_orgs.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DEFAULT_FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                flush_once(&inner, &agents, &orgs, &dirty_agents, &dirty_orgs).await;
            }
        })
    }

    /// Flush all dirty entries immediately. Used on graceful shutdown.
    pub async fn flush_now(&self) {
        flush_once(&self.inner, &self.agents, &self.orgs, &self.dirty_agents, &self.dirty_orgs).await;
    }
}

async fn flush_once<S: Store>(
    inner: &Arc<S>,
    agents: &DashMap<String, ManagedAgent>,
    orgs: &DashMap<String, Organization>,
    dirty_agents: &DashMap<String, ()>,
    dirty_orgs: &DashMap<String, ()>,
) {
    let agent_ids: Vec<String> = dirty_agents.iter().map(|e| e.key().clone()).collect();
    for id in agent_ids {
        if let Some(agent) = agents.get(&id).map(|e| e.clone()) {
            match inner.upsert_agent(&agent).await {
                Ok(()) => {
                    dirty_agents.remove(&id);
                }
                Err(e) => warn!(agent_id = %id, error = %e, "write-behind flush failed, will retry"),
            }
        } else {
            dirty_agents.remove(&id);
        }
    }

    let org_ids: Vec<String> = dirty_orgs.iter().map(|e| e.key().clone()).collect();
    for id in org_ids {
        if let Some(org) = orgs.get(&id).map(|e| e.clone()) {
            match inner.upsert_org(&org).await {
                Ok(()) => {
                    dirty_orgs.remove(&id);
                }
                Err(e) => error!(org_id = %id, error = %e, "write-behind flush failed, will retry"),
            }
        } else {
            dirty_orgs.remove(&id);
        }
    }
}

#[async_trait]
impl<S: Store + 'static> Store for WriteBehindStore<S> {
    async fn upsert_org(&self, org: &Organization) -> StoreResult<()> {
        self.orgs.insert(org.id.clone(), org.clone());
        self.dirty_orgs.insert(org.id.clone(), ());
        Ok(())
    }

    async fn get_org(&self, id: &str) -> StoreResult<Option<Organization>> {
        if let Some(org) = self.orgs.get(id) {
            return Ok(Some(org.clone()));
        }
        let fetched = self.inner.get_org(id).await?;
        if let Some(org) = &fetched {
            self.orgs.insert(org.id.clone(), org.clone());
        }
        Ok(fetched)
    }

    async fn get_org_by_slug(&self, slug: &str) -> StoreResult<Option<Organization>> {
        if let Some(org) = self.orgs.iter().find(|e| e.slug == slug) {
            return Ok(Some(org.clone()));
        }
        self.inner.get_org_by_slug(slug).await
    }

    async fn list_orgs(&self) -> StoreResult<Vec<Organization>> {
        let mut fetched = self.inner.list_orgs().await?;
        for entry in self.orgs.iter() {
            if let Some(slot) = fetched.iter_mut().find(|o| o.id == entry.id) {
                *slot = entry.clone();
            } else {
                fetched.push(entry.clone());
            }
        }
        Ok(fetched)
    }

    async fn delete_org(&self, id: &str) -> StoreResult<()> {
        self.orgs.remove(id);
        self.dirty_orgs.remove(id);
        self.inner.delete_org(id).await
    }

    async fn upsert_agent(&self, agent: &ManagedAgent) -> StoreResult<()> {
        self.agents.insert(agent.id.clone(), agent.clone());
        self.dirty_agents.insert(agent.id.clone(), ());
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> StoreResult<Option<ManagedAgent>> {
        if let Some(agent) = self.agents.get(id) {
            return Ok(Some(agent.clone()));
        }
        let fetched = self.inner.get_agent(id).await?;
        if let Some(agent) = &fetched {
            self.agents.insert(agent.id.clone(), agent.clone());
        }
        Ok(fetched)
    }

    async fn list_agents_by_org(&self, org_id: &str) -> StoreResult<Vec<ManagedAgent>> {
        let mut fetched = self.inner.list_agents_by_org(org_id).await?;
        for entry in self.agents.iter().filter(|e| e.org_id == org_id) {
            if let Some(slot) = fetched.iter_mut().find(|a| a.id == entry.id) {
                *slot = entry.clone();
            } else {
                fetched.push(entry.clone());
            }
        }
        Ok(fetched)
    }

    async fn delete_agent(&self, id: &str) -> StoreResult<()> {
        self.agents.remove(id);
        self.dirty_agents.remove(id);
        self.inner.delete_agent(id).await
    }

    // Everything below passes straight through: these entities don't see
    // the sustained write volume that justifies an in-memory buffer.

    async fn upsert_profile(&self, profile: &PermissionProfile) -> StoreResult<()> {
        self.inner.upsert_profile(profile).await
    }
    async fn get_profile(&self, id: &str) -> StoreResult<Option<PermissionProfile>> {
        self.inner.get_profile(id).await
    }
    async fn list_profiles_by_org(&self, org_id: &str) -> StoreResult<Vec<PermissionProfile>> {
        self.inner.list_profiles_by_org(org_id).await
    }
    async fn delete_profile(&self, id: &str) -> StoreResult<()> {
        self.inner.delete_profile(id).await
    }

    async fn upsert_approval(&self, req: &ApprovalRequest) -> StoreResult<()> {
        self.inner.upsert_approval(req).await
    }
    async fn get_approval(&self, id: &str) -> StoreResult<Option<ApprovalRequest>> {
        self.inner.get_approval(id).await
    }
    async fn list_approvals_by_org(&self, org_id: &str) -> StoreResult<Vec<ApprovalRequest>> {
        self.inner.list_approvals_by_org(org_id).await
    }

    async fn upsert_approval_policy(&self, policy: &ApprovalPolicy) -> StoreResult<()> {
        self.inner.upsert_approval_policy(policy).await
    }
    async fn list_approval_policies(&self, org_id: &str) -> StoreResult<Vec<ApprovalPolicy>> {
        self.inner.list_approval_policies(org_id).await
    }
    async fn delete_approval_policy(&self, id: &str) -> StoreResult<()> {
        self.inner.delete_approval_policy(id).await
    }

    async fn upsert_schedule(&self, schedule: &WorkSchedule) -> StoreResult<()> {
        self.inner.upsert_schedule(schedule).await
    }
    async fn get_schedule_by_agent(&self, agent_id: &str) -> StoreResult<Option<WorkSchedule>> {
        self.inner.get_schedule_by_agent(agent_id).await
    }
    async fn delete_schedule(&self, agent_id: &str) -> StoreResult<()> {
        self.inner.delete_schedule(agent_id).await
    }

    async fn insert_clock_record(&self, record: &ClockRecord) -> StoreResult<()> {
        self.inner.insert_clock_record(record).await
    }
    async fn list_clock_records(&self, agent_id: &str, limit: u32) -> StoreResult<Vec<ClockRecord>> {
        self.inner.list_clock_records(agent_id, limit).await
    }

    async fn upsert_task(&self, task: &QueuedTask) -> StoreResult<()> {
        self.inner.upsert_task(task).await
    }
    async fn list_tasks_by_agent(&self, agent_id: &str) -> StoreResult<Vec<QueuedTask>> {
        self.inner.list_tasks_by_agent(agent_id).await
    }
    async fn delete_tasks_by_agent(&self, agent_id: &str) -> StoreResult<()> {
        self.inner.delete_tasks_by_agent(agent_id).await
    }

    async fn insert_message(&self, message: &AgentMessage) -> StoreResult<()> {
        self.inner.insert_message(message).await
    }
    async fn update_message(&self, message: &AgentMessage) -> StoreResult<()> {
        self.inner.update_message(message).await
    }
    async fn list_messages_by_org(&self, org_id: &str, limit: u32) -> StoreResult<Vec<AgentMessage>> {
        self.inner.list_messages_by_org(org_id, limit).await
    }

    async fn register_ext_table(&self, name: &str, columns: &[(String, String)]) -> StoreResult<()> {
        self.inner.register_ext_table(name, columns).await
    }
    async fn list_ext_tables(&self) -> StoreResult<Vec<String>> {
        self.inner.list_ext_tables().await
    }
    async fn query(&self, sql: &str, params: Vec<serde_json::Value>) -> StoreResult<Vec<RawRow>> {
        self.inner.query(sql, params).await
    }
    async fn execute(&self, sql: &str, params: Vec<serde_json::Value>) -> StoreResult<u64> {
        self.inner.execute(sql, params).await
    }
}
