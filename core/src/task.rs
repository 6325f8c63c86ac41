//! Domain model for a schedulable unit.
//!
//! Kept free of graph mechanics: the [`Task`] record only knows about its
//! own attributes, never about edges or ranks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::priority::Priority;

/// Lifecycle state of a task, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Open,
    Blocked,
    InProgress,
    Closed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Blocked => "blocked",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Closed => "closed",
        }
    }
}

/// A gate reference: the `(kind, id)` pair that must resolve to "open"
/// before a task can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRef {
    pub kind: String,
    pub id: String,
}

/// A schedulable unit. Registered once into the scheduler and thereafter
/// mutated only through scheduler operations or external status updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub priority: Priority,
    pub duration: u32,
    pub estimated_tokens: u32,
    pub used_tokens: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub gate: Option<GateRef>,
}

impl Task {
    /// Build a new, validated, `OPEN` task stamped with the current time.
    pub fn new(
        name: impl Into<String>,
        priority: Priority,
        duration: u32,
        estimated_tokens: u32,
    ) -> Result<Self, SchedulerError> {
        Self::new_at(name, priority, duration, estimated_tokens, Utc::now())
    }

    /// Same as [`Task::new`] but with an explicit `created_at`, primarily
    /// useful for deterministic tests and for reconstructing tasks from
    /// serialized snapshots.
    pub fn new_at(
        name: impl Into<String>,
        priority: Priority,
        duration: u32,
        estimated_tokens: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::BadTask(
                "task name must be a non-empty string".to_string(),
            ));
        }
        if duration == 0 {
            return Err(SchedulerError::BadTask(format!(
                "task '{name}' duration must be positive"
            )));
        }
        if estimated_tokens == 0 {
            return Err(SchedulerError::BadTask(format!(
                "task '{name}' estimated_tokens must be positive"
            )));
        }

        Ok(Task {
            name,
            priority,
            duration,
            estimated_tokens,
            used_tokens: 0,
            status: TaskStatus::Open,
            created_at,
            gate: None,
        })
    }

    /// Attach a gate that must be open before this task is ready.
    pub fn with_gate(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.gate = Some(GateRef {
            kind: kind.into(),
            id: id.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_open_with_no_gate() {
        let t = Task::new("design-api", Priority::High, 2, 1000).unwrap();
        assert_eq!(t.status, TaskStatus::Open);
        assert!(t.gate.is_none());
        assert_eq!(t.used_tokens, 0);
    }

    #[test]
    fn rejects_empty_name() {
        assert!(Task::new("", Priority::High, 1, 1).is_err());
    }

    #[test]
    fn rejects_non_positive_duration_and_tokens() {
        assert!(Task::new("t", Priority::High, 0, 1).is_err());
        assert!(Task::new("t", Priority::High, 1, 0).is_err());
    }

    #[test]
    fn with_gate_sets_both_fields() {
        let t = Task::new("g", Priority::Medium, 1, 1)
            .unwrap()
            .with_gate("human", "ok");
        let gate = t.gate.unwrap();
        assert_eq!(gate.kind, "human");
        assert_eq!(gate.id, "ok");
    }
}
