//! In-memory authoritative agent state (spec §4.1, §4.8).
//!
//! Every live `ManagedAgent` is held behind its own `tokio::sync::Mutex`
//! in a process-wide `DashMap`, so concurrent callers serialize on a
//! single agent without blocking unrelated agents — the same sharding
//! the teacher's `Guardrails` gets from per-resource `RwLock`s, applied
//! here per-agent instead of globally. A miss falls through to the
//! store and populates the map; the map is intentionally never evicted
//! within a process lifetime (spec §4.1: "the in-memory value stays
//! authoritative").

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::domain::models::ManagedAgent;
use crate::domain::ports::{Store, StoreResult};

pub struct AgentRegistry {
    store: Arc<dyn Store>,
    agents: DashMap<String, Arc<Mutex<ManagedAgent>>>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, agents: DashMap::new() }
    }

    /// Return the live handle for `agent_id`, loading it from the store
    /// on first access. `None` if no such agent exists anywhere.
    pub async fn get(&self, agent_id: &str) -> StoreResult<Option<Arc<Mutex<ManagedAgent>>>> {
        if let Some(handle) = self.agents.get(agent_id) {
            return Ok(Some(handle.clone()));
        }
        let Some(agent) = self.store.get_agent(agent_id).await? else {
            return Ok(None);
        };
        let handle = Arc::new(Mutex::new(agent));
        self.agents.insert(agent_id.to_string(), handle.clone());
        Ok(Some(handle))
    }

    /// Register a newly created agent as the live copy.
    pub fn insert(&self, agent: ManagedAgent) -> Arc<Mutex<ManagedAgent>> {
        let handle = Arc::new(Mutex::new(agent.clone()));
        self.agents.insert(agent.id.clone(), handle.clone());
        handle
    }

    pub fn remove(&self, agent_id: &str) {
        self.agents.remove(agent_id);
    }

    /// Snapshot every live agent belonging to `org_id`. Agents never
    /// loaded into memory this process aren't included; callers that
    /// need the full roster should reconcile against `Store::list_agents_by_org`.
    pub async fn live_snapshot_by_org(&self, org_id: &str) -> Vec<ManagedAgent> {
        let mut out = Vec::new();
        for entry in self.agents.iter() {
            let agent = entry.value().lock().await;
            if agent.org_id == org_id {
                out.push(agent.clone());
            }
        }
        out
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.agents.iter().map(|e| e.key().clone()).collect()
    }

    /// Write a live agent's current state back to the store. Callers that
    /// mutate a handle (lifecycle transitions, usage resets) must flush it
    /// afterwards — the in-memory copy is authoritative for reads, but
    /// durability still flows through `Store::upsert_agent` (spec §4.1).
    pub async fn persist(&self, handle: &Arc<Mutex<ManagedAgent>>) -> StoreResult<()> {
        let agent = handle.lock().await.clone();
        self.store.upsert_agent(&agent).await
    }

    /// Flush every agent currently held in memory. Used by the workforce
    /// scheduler's tick so usage-counter resets survive a restart even
    /// without an explicit lifecycle transition.
    pub async fn flush_all(&self) -> StoreResult<()> {
        let handles: Vec<_> = self.agents.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            self.persist(&handle).await?;
        }
        Ok(())
    }
}
