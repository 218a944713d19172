//! Application-wide events broadcast by the compression manager.
//!
//! Any presentation layer (CLI, GUI, SSE bridge) subscribes to the manager's
//! broadcast channel and receives these. Per-task ordering follows the order
//! the underlying encoder lines were produced; the terminal event for a task
//! is always delivered after its last progress event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted by the [`CompressionManager`](crate::manager::CompressionManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A request passed validation and was queued.
    TaskSubmitted {
        id: Uuid,
        file_name: String,
    },
    /// A pending task was admitted and its encode started.
    TaskStarted {
        id: Uuid,
        file_name: String,
    },
    /// A running task produced new progress information.
    TaskProgress {
        id: Uuid,
        /// 0-100.
        percentage: u8,
        status: String,
    },
    /// A task finished successfully.
    TaskCompleted {
        id: Uuid,
        message: String,
    },
    /// A task failed; it will not be retried.
    TaskFailed {
        id: Uuid,
        error: String,
    },
    /// A task was cancelled by user request.
    TaskCancelled {
        id: Uuid,
    },
    /// No tasks are running and none are pending.
    AllComplete,
}

impl AppEvent {
    /// Create a TaskSubmitted event.
    pub fn submitted(id: Uuid, file_name: impl Into<String>) -> Self {
        AppEvent::TaskSubmitted {
            id,
            file_name: file_name.into(),
        }
    }

    /// Create a TaskStarted event.
    pub fn started(id: Uuid, file_name: impl Into<String>) -> Self {
        AppEvent::TaskStarted {
            id,
            file_name: file_name.into(),
        }
    }

    /// Create a TaskProgress event.
    pub fn progress(id: Uuid, percentage: u8, status: impl Into<String>) -> Self {
        AppEvent::TaskProgress {
            id,
            percentage,
            status: status.into(),
        }
    }

    /// Create a TaskCompleted event.
    pub fn completed(id: Uuid, message: impl Into<String>) -> Self {
        AppEvent::TaskCompleted {
            id,
            message: message.into(),
        }
    }

    /// Create a TaskFailed event.
    pub fn failed(id: Uuid, error: impl Into<String>) -> Self {
        AppEvent::TaskFailed {
            id,
            error: error.into(),
        }
    }

    /// Create a TaskCancelled event.
    pub fn cancelled(id: Uuid) -> Self {
        AppEvent::TaskCancelled { id }
    }

    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            AppEvent::TaskSubmitted { id, .. }
            | AppEvent::TaskStarted { id, .. }
            | AppEvent::TaskProgress { id, .. }
            | AppEvent::TaskCompleted { id, .. }
            | AppEvent::TaskFailed { id, .. }
            | AppEvent::TaskCancelled { id } => Some(*id),
            AppEvent::AllComplete => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_type_tag() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&AppEvent::progress(id, 40, "encoding")).unwrap();
        assert!(json.contains("\"event_type\":\"task_progress\""));
        assert!(json.contains("\"percentage\":40"));

        let back: AppEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id(), Some(id));
    }

    #[test]
    fn all_complete_has_no_task_id() {
        assert_eq!(AppEvent::AllComplete.task_id(), None);
    }
}
