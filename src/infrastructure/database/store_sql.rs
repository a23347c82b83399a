//! SQLite-backed implementation of the `Store` port.
//!
//! Grounded on the teacher's adapter pattern (a thin struct wrapping a
//! pool, one method per port operation) but using a single storage
//! shape across entities: a handful of indexed columns pulled out of
//! the struct, plus the whole value serialized into a `data` JSON
//! column. This keeps one schema migration usable across every backend
//! dialect (spec §6, §9) without a bespoke table per entity shape.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::models::{
    AgentMessage, ApprovalPolicy, ApprovalRequest, ClockRecord, ManagedAgent, Organization,
    PermissionProfile, QueuedTask, WorkSchedule,
};
use crate::domain::ports::{is_ext_only_mutation, RawRow, Store, StoreError, StoreResult};

pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_json(value: &impl serde::Serialize) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl Store for SqlStore {
    async fn upsert_org(&self, org: &Organization) -> StoreResult<()> {
        let data = to_json(org)?;
        sqlx::query(
            "INSERT INTO organizations (id, slug, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET slug = excluded.slug, data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&org.id)
        .bind(&org.slug)
        .bind(data)
        .bind(org.created_at.to_rfc3339())
        .bind(org.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_org(&self, id: &str) -> StoreResult<Option<Organization>> {
        let row = sqlx::query("SELECT data FROM organizations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| from_json(r.get::<String, _>("data").as_str())).transpose()
    }

    async fn get_org_by_slug(&self, slug: &str) -> StoreResult<Option<Organization>> {
        let row = sqlx::query("SELECT data FROM organizations WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| from_json(r.get::<String, _>("data").as_str())).transpose()
    }

    async fn list_orgs(&self) -> StoreResult<Vec<Organization>> {
        let rows = sqlx::query("SELECT data FROM organizations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn delete_org(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM organizations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn upsert_agent(&self, agent: &ManagedAgent) -> StoreResult<()> {
        let data = to_json(agent)?;
        sqlx::query(
            "INSERT INTO managed_agents (id, org_id, state, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state, data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&agent.id)
        .bind(&agent.org_id)
        .bind(agent.state.as_str())
        .bind(data)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> StoreResult<Option<ManagedAgent>> {
        let row = sqlx::query("SELECT data FROM managed_agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| from_json(r.get::<String, _>("data").as_str())).transpose()
    }

    async fn list_agents_by_org(&self, org_id: &str) -> StoreResult<Vec<ManagedAgent>> {
        let rows = sqlx::query("SELECT data FROM managed_agents WHERE org_id = ?")
            .bind(org_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn delete_agent(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM managed_agents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: &PermissionProfile) -> StoreResult<()> {
        let data = to_json(profile)?;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO permission_profiles (id, org_id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&profile.id)
        .bind(&profile.org_id)
        .bind(data)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_profile(&self, id: &str) -> StoreResult<Option<PermissionProfile>> {
        let row = sqlx::query("SELECT data FROM permission_profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| from_json(r.get::<String, _>("data").as_str())).transpose()
    }

    async fn list_profiles_by_org(&self, org_id: &str) -> StoreResult<Vec<PermissionProfile>> {
        let rows = sqlx::query("SELECT data FROM permission_profiles WHERE org_id = ?")
            .bind(org_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn delete_profile(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM permission_profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn upsert_approval(&self, req: &ApprovalRequest) -> StoreResult<()> {
        let data = to_json(req)?;
        let status = serde_json::to_value(req.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO approval_requests (id, org_id, agent_id, status, expires_at, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&req.id)
        .bind(&req.org_id)
        .bind(&req.agent_id)
        .bind(status)
        .bind(req.expires_at.to_rfc3339())
        .bind(data)
        .bind(req.created_at.to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_approval(&self, id: &str) -> StoreResult<Option<ApprovalRequest>> {
        let row = sqlx::query("SELECT data FROM approval_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| from_json(r.get::<String, _>("data").as_str())).transpose()
    }

    async fn list_approvals_by_org(&self, org_id: &str) -> StoreResult<Vec<ApprovalRequest>> {
        let rows = sqlx::query("SELECT data FROM approval_requests WHERE org_id = ?")
            .bind(org_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn upsert_approval_policy(&self, policy: &ApprovalPolicy) -> StoreResult<()> {
        let data = to_json(policy)?;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO approval_policies (id, org_id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&policy.id)
        .bind(&policy.org_id)
        .bind(data)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_approval_policies(&self, org_id: &str) -> StoreResult<Vec<ApprovalPolicy>> {
        let rows = sqlx::query("SELECT data FROM approval_policies WHERE org_id = ?")
            .bind(org_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn delete_approval_policy(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM approval_policies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn upsert_schedule(&self, schedule: &WorkSchedule) -> StoreResult<()> {
        let data = to_json(schedule)?;
        sqlx::query(
            "INSERT INTO work_schedules (id, agent_id, org_id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(agent_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&schedule.id)
        .bind(&schedule.agent_id)
        .bind(&schedule.org_id)
        .bind(data)
        .bind(schedule.created_at.to_rfc3339())
        .bind(schedule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_schedule_by_agent(&self, agent_id: &str) -> StoreResult<Option<WorkSchedule>> {
        let row = sqlx::query("SELECT data FROM work_schedules WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| from_json(r.get::<String, _>("data").as_str())).transpose()
    }

    async fn delete_schedule(&self, agent_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM work_schedules WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn insert_clock_record(&self, record: &ClockRecord) -> StoreResult<()> {
        let data = to_json(record)?;
        sqlx::query(
            "INSERT INTO clock_records (id, agent_id, org_id, data, actual_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.agent_id)
        .bind(&record.org_id)
        .bind(data)
        .bind(record.actual_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_clock_records(&self, agent_id: &str, limit: u32) -> StoreResult<Vec<ClockRecord>> {
        let rows = sqlx::query(
            "SELECT data FROM clock_records WHERE agent_id = ? ORDER BY actual_at DESC LIMIT ?",
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn upsert_task(&self, task: &QueuedTask) -> StoreResult<()> {
        let data = to_json(task)?;
        let priority = serde_json::to_value(task.priority)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let status = serde_json::to_value(task.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO task_queue (id, agent_id, org_id, priority, status, data, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET priority = excluded.priority, status = excluded.status, data = excluded.data",
        )
        .bind(&task.id)
        .bind(&task.agent_id)
        .bind(&task.org_id)
        .bind(priority)
        .bind(status)
        .bind(data)
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_tasks_by_agent(&self, agent_id: &str) -> StoreResult<Vec<QueuedTask>> {
        let rows = sqlx::query("SELECT data FROM task_queue WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn delete_tasks_by_agent(&self, agent_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM task_queue WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn insert_message(&self, message: &AgentMessage) -> StoreResult<()> {
        let data = to_json(message)?;
        let direction = serde_json::to_value(message.direction)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO agent_messages (id, org_id, from_agent_id, to_agent_id, direction, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.org_id)
        .bind(&message.from_agent_id)
        .bind(&message.to_agent_id)
        .bind(direction)
        .bind(data)
        .bind(message.created_at.to_rfc3339())
        .bind(message.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn update_message(&self, message: &AgentMessage) -> StoreResult<()> {
        let data = to_json(message)?;
        sqlx::query("UPDATE agent_messages SET data = ?, updated_at = ? WHERE id = ?")
            .bind(data)
            .bind(message.updated_at.to_rfc3339())
            .bind(&message.id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_messages_by_org(&self, org_id: &str, limit: u32) -> StoreResult<Vec<AgentMessage>> {
        let rows = sqlx::query(
            "SELECT data FROM agent_messages WHERE org_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get::<String, _>("data").as_str())).collect()
    }

    async fn register_ext_table(&self, name: &str, columns: &[(String, String)]) -> StoreResult<()> {
        let safe_name: String = name.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
        let table = format!("ext_{safe_name}");
        let mut cols = vec!["id TEXT PRIMARY KEY".to_string()];
        for (col_name, col_type) in columns {
            let safe_col: String = col_name.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
            let safe_type: String = col_type.chars().filter(|c| c.is_alphanumeric() || *c == ' ').collect();
            cols.push(format!("{safe_col} {safe_type}"));
        }
        let ddl = format!("CREATE TABLE IF NOT EXISTS {table} ({})", cols.join(", "));
        sqlx::raw_sql(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_ext_tables(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'ext_%'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
    }

    async fn query(&self, sql: &str, params: Vec<serde_json::Value>) -> StoreResult<Vec<RawRow>> {
        let mut q = sqlx::query(sql);
        for param in &params {
            q = bind_json_param(q, param);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(|e| StoreError::Query(e.to_string()))?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut map = RawRow::new();
            for col in row.columns() {
                let name = col.name().to_string();
                let value: serde_json::Value = row
                    .try_get::<String, _>(col.ordinal())
                    .map(serde_json::Value::String)
                    .or_else(|_| row.try_get::<i64, _>(col.ordinal()).map(|v| v.into()))
                    .or_else(|_| row.try_get::<f64, _>(col.ordinal()).map(|v| v.into()))
                    .unwrap_or(serde_json::Value::Null);
                map.insert(name, value);
            }
            out.push(map);
        }
        Ok(out)
    }

    async fn execute(&self, sql: &str, params: Vec<serde_json::Value>) -> StoreResult<u64> {
        if !is_ext_only_mutation(sql) {
            return Err(StoreError::Refused(
                "mutations are restricted to ext_* tables".to_string(),
            ));
        }
        let mut q = sqlx::query(sql);
        for param in &params {
            q = bind_json_param(q, param);
        }
        let result = q.execute(&self.pool).await.map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

fn bind_json_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q serde_json::Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        serde_json::Value::String(s) => query.bind(s.as_str()),
        serde_json::Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap()),
        serde_json::Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        serde_json::Value::Bool(b) => query.bind(*b),
        serde_json::Value::Null => query.bind(Option::<String>::None),
        other => query.bind(other.to_string()),
    }
}

use sqlx::Column;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{plan_limits, OrgSettings, OrgUsage, Plan};

    async fn store() -> SqlStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::infrastructure::database::migrations::run(
            &pool,
            crate::infrastructure::database::dialect::Dialect::Sqlite,
        )
        .await
        .unwrap();
        SqlStore::new(pool)
    }

    fn org(slug: &str) -> Organization {
        let now = chrono::Utc::now();
        Organization {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            name: "Acme".to_string(),
            plan: Plan::Team,
            limits: plan_limits(Plan::Team),
            usage: OrgUsage::default(),
            settings: OrgSettings::default(),
            allowed_domains: vec![],
            billing: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn roundtrips_an_organization() {
        let store = store().await;
        let o = org("acme");
        store.upsert_org(&o).await.unwrap();
        let fetched = store.get_org(&o.id).await.unwrap().unwrap();
        assert_eq!(fetched.slug, "acme");
        let by_slug = store.get_org_by_slug("acme").await.unwrap().unwrap();
        assert_eq!(by_slug.id, o.id);
    }

    #[tokio::test]
    async fn refuses_raw_mutation_on_core_table() {
        let store = store().await;
        let err = store
            .execute("UPDATE organizations SET slug = 'x'", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Refused(_)));
    }

    #[tokio::test]
    async fn allows_raw_mutation_on_ext_table() {
        let store = store().await;
        store
            .register_ext_table("notes", &[("body".to_string(), "TEXT".to_string())])
            .await
            .unwrap();
        let affected = store
            .execute(
                "INSERT INTO ext_notes (id, body) VALUES (?, ?)",
                vec![serde_json::json!("n1"), serde_json::json!("hello")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
    }
}
