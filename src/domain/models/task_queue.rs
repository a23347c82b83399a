//! Queued task domain model (spec §3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedTaskType {
    Continue,
    New,
    Scheduled,
    Delegation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedTaskStatus {
    Queued,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    pub agent_id: String,
    pub org_id: String,
    pub task_type: QueuedTaskType,
    pub title: String,
    pub description: Option<String>,
    pub context: serde_json::Value,
    pub priority: TaskPriority,
    pub status: QueuedTaskStatus,
    pub source: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Ordering used by the task queue: `priority DESC, created_at ASC`
/// (spec §4.9). `Ord` on `TaskPriority` is ascending (`Low < Urgent`), so
/// callers sort with `.sort_by(|a, b| queue_order(a, b))`.
pub fn queue_order(a: &QueuedTask, b: &QueuedTask) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(priority: TaskPriority, created_secs: i64) -> QueuedTask {
        QueuedTask {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: "a".into(),
            org_id: "o".into(),
            task_type: QueuedTaskType::New,
            title: "t".into(),
            description: None,
            context: serde_json::json!({}),
            priority,
            status: QueuedTaskStatus::Queued,
            source: "test".into(),
            scheduled_for: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now() + chrono::Duration::seconds(created_secs),
        }
    }

    #[test]
    fn urgent_before_low_regardless_of_age() {
        let mut tasks = vec![task(TaskPriority::Low, 0), task(TaskPriority::Urgent, 10)];
        tasks.sort_by(queue_order);
        assert_eq!(tasks[0].priority, TaskPriority::Urgent);
    }

    #[test]
    fn ties_broken_by_age_ascending() {
        let mut tasks = vec![task(TaskPriority::Normal, 10), task(TaskPriority::Normal, 0)];
        tasks.sort_by(queue_order);
        assert!(tasks[0].created_at < tasks[1].created_at);
    }
}
