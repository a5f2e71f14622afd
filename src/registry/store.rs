use chrono::{Local, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::task::TaskRecord;

/// Shared cancellation handle for one task. Once raised it never clears.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cooperative cancellation
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory registry of background tasks and their stop flags
#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: RwLock<HashMap<String, TaskRecord>>,
    stop_flags: RwLock<HashMap<String, StopFlag>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending task, returning its record and stop flag
    pub async fn create(&self, description: &str) -> (TaskRecord, StopFlag) {
        let record = TaskRecord::new(description);
        let flag = StopFlag::new();
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        self.stop_flags
            .write()
            .await
            .insert(record.id.clone(), flag.clone());
        debug!("registered task {} ({})", record.id, description);
        (record, flag)
    }

    /// Snapshot of a single task
    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Snapshot of all tasks, newest first
    pub async fn list_all(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Apply an update to a task record. Returns false if the id is unknown.
    pub async fn update<F>(&self, id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => {
                apply(record);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Append a timestamped line to a task's progress log
    pub async fn append_log(&self, id: &str, line: &str) {
        let stamped = format!("[{}] {}", Local::now().format("%H:%M:%S"), line);
        debug!("task {}: {}", id, line);
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(id) {
            record.logs.push(stamped);
        }
    }

    /// Raise the stop flag for a task. Returns false if the id is unknown.
    pub async fn request_stop(&self, id: &str) -> bool {
        let flag = self.stop_flags.read().await.get(id).cloned();
        match flag {
            Some(flag) => {
                flag.request_stop();
                self.update(id, |record| {
                    if !record.status.is_terminal() {
                        record.message = "stop requested".to_string();
                    }
                })
                .await;
                true
            }
            None => false,
        }
    }

    /// Stop flag for a task, if it exists
    pub async fn stop_flag(&self, id: &str) -> Option<StopFlag> {
        self.stop_flags.read().await.get(id).cloned()
    }
}

/// Cheap handle for streaming progress lines into one task's log
#[derive(Debug, Clone)]
pub struct TaskLog {
    registry: Arc<TaskRegistry>,
    task_id: String,
}

impl TaskLog {
    pub fn new(registry: Arc<TaskRegistry>, task_id: String) -> Self {
        Self { registry, task_id }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Append one line, mirrored to the tracing output
    pub async fn push(&self, line: impl Into<String>) {
        let line = line.into();
        self.registry.append_log(&self.task_id, &line).await;
    }
}
