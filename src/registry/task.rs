use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted but not yet picked up by a worker
    Pending,
    /// Currently executing
    Running,
    /// Finished normally
    Completed,
    /// Aborted with an error
    Failed,
    /// Ended early because a stop was requested
    Stopped,
}

impl TaskStatus {
    /// Whether the task can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        };
        write!(f, "{}", label)
    }
}

/// A background task tracked by the registry
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// Short identifier handed out to API clients
    pub id: String,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// What the task was started for
    pub description: String,
    /// Latest progress message
    pub message: String,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the status or message last changed
    pub updated_at: DateTime<Utc>,
    /// Append-only progress log, newest last
    pub logs: Vec<String>,
    /// Structured outcome, present once the task finished
    pub result: Option<Value>,
}

impl TaskRecord {
    /// Create a new pending record with a fresh identifier
    pub fn new(description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: short_task_id(),
            status: TaskStatus::Pending,
            description: description.to_string(),
            message: "queued".to_string(),
            created_at: now,
            updated_at: now,
            logs: Vec::new(),
            result: None,
        }
    }
}

/// Generate a short random task identifier
pub fn short_task_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_starts_pending() {
        let record = TaskRecord::new("engagement session");
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.description, "engagement session");
        assert!(record.logs.is_empty());
        assert!(record.result.is_none());
    }

    #[test]
    fn test_task_ids_are_short_and_unique() {
        let a = short_task_id();
        let b = short_task_id();
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
