//! In-memory background task registry.
//!
//! Maps task ids to lifecycle records for HTTP status polling, plus a
//! reverse index from task type to the currently running instance so a
//! job class can refuse concurrent duplicates. All mutations take one
//! lock, and nothing suspends while holding it. Records do not survive
//! restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::defaults::TASK_TTL_HOURS;
use crate::error::TaskError;
use crate::storage::now_utc;

/// Lifecycle state of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Parse from the wire representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Progress of a running task.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TaskProgress {
    /// Items processed so far.
    pub current: u64,
    /// Total items, if known.
    pub total: u64,
    /// Percentage (0-100), derived from current/total.
    pub percentage: f64,
}

/// One background task record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskRecord {
    /// Task id (UUID).
    pub task_id: String,
    /// Job class, e.g. "scrape", "deduplicate", "summarize".
    pub task_type: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
    /// When the task entered `running`.
    pub started_at: Option<String>,
    /// When the task reached a terminal state.
    pub completed_at: Option<String>,
    /// Progress counters.
    pub progress: TaskProgress,
    /// Terminal result payload.
    pub result: Option<serde_json::Value>,
    /// Terminal error message.
    pub error: Option<String>,
}

#[derive(Default)]
struct RegistryInner {
    tasks: HashMap<String, TaskRecord>,
    /// task_type -> task_id of the running instance.
    running: HashMap<String, String>,
}

/// Process-wide task registry.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new pending task and return its id.
    pub fn create(&self, task_type: &str) -> String {
        let task_id = Uuid::new_v4().to_string();
        let record = TaskRecord {
            task_id: task_id.clone(),
            task_type: task_type.to_string(),
            status: TaskStatus::Pending,
            created_at: now_utc(),
            started_at: None,
            completed_at: None,
            progress: TaskProgress::default(),
            result: None,
            error: None,
        };

        let mut inner = self.lock();
        inner.tasks.insert(task_id.clone(), record);
        task_id
    }

    /// Transition a task's status.
    ///
    /// Terminal states are final: updating a completed or failed task is a
    /// conflict. Moving into `running` records the start time and the
    /// running-instance index; leaving it clears the index.
    pub fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), TaskError> {
        let mut inner = self.lock();

        let record = inner.tasks.get_mut(task_id).ok_or_else(|| TaskError::NotFound {
            task_id: task_id.to_string(),
        })?;

        if record.status.is_terminal() {
            return Err(TaskError::Conflict {
                message: format!(
                    "task {task_id} is already {:?} and cannot change state",
                    record.status
                ),
            });
        }

        record.status = status;
        match status {
            TaskStatus::Running => {
                record.started_at = Some(now_utc());
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                record.completed_at = Some(now_utc());
                record.result = result;
                record.error = error;
            }
            TaskStatus::Pending => {}
        }

        let task_type = record.task_type.clone();
        match status {
            TaskStatus::Running => {
                inner.running.insert(task_type, task_id.to_string());
            }
            _ => {
                if inner.running.get(&task_type).map(String::as_str) == Some(task_id) {
                    inner.running.remove(&task_type);
                }
            }
        }

        Ok(())
    }

    /// Update a task's progress counters.
    pub fn update_progress(&self, task_id: &str, current: u64, total: u64) -> Result<(), TaskError> {
        let mut inner = self.lock();
        let record = inner.tasks.get_mut(task_id).ok_or_else(|| TaskError::NotFound {
            task_id: task_id.to_string(),
        })?;

        record.progress = TaskProgress {
            current,
            total,
            percentage: if total > 0 {
                (current as f64 / total as f64 * 100.0).min(100.0)
            } else {
                0.0
            },
        };
        Ok(())
    }

    /// Fetch a task by id.
    pub fn get(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        self.lock()
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Whether a task of this type is currently running.
    pub fn is_running(&self, task_type: &str) -> bool {
        self.lock().running.contains_key(task_type)
    }

    /// List tasks, optionally filtered by status, newest first.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<TaskRecord> {
        let inner = self.lock();
        let mut records: Vec<TaskRecord> = inner
            .tasks
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Delete a task. Running tasks cannot be deleted.
    pub fn delete(&self, task_id: &str) -> Result<(), TaskError> {
        let mut inner = self.lock();
        let record = inner.tasks.get(task_id).ok_or_else(|| TaskError::NotFound {
            task_id: task_id.to_string(),
        })?;

        if record.status == TaskStatus::Running {
            return Err(TaskError::Conflict {
                message: "cannot delete a running task".to_string(),
            });
        }

        inner.tasks.remove(task_id);
        Ok(())
    }

    /// Remove terminal records older than the TTL. Returns how many were swept.
    pub fn sweep_expired(&self) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(TASK_TTL_HOURS);
        let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .tasks
            .values()
            .filter(|r| {
                r.status.is_terminal()
                    && r.completed_at
                        .as_deref()
                        .map(|done| done < cutoff.as_str())
                        .unwrap_or(false)
            })
            .map(|r| r.task_id.clone())
            .collect();

        for task_id in &expired {
            inner.tasks.remove(task_id);
        }
        expired.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // A poisoned lock only means a panic happened mid-update; keep
        // serving the inner state.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Periodically sweep expired terminal tasks until cancelled.
pub async fn run_sweeper(registry: TaskRegistry, cancel: CancellationToken) {
    let interval = Duration::from_secs(3600);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("task sweeper cancelled");
                return;
            }
            () = tokio::time::sleep(interval) => {}
        }

        let swept = registry.sweep_expired();
        if swept > 0 {
            tracing::info!(swept, "swept expired task records");
        }
    }
}
