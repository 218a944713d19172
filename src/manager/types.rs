use crate::request::CompressionRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One compression task tracked by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub request: CompressionRequest,
    pub file_name: String,
    pub state: TaskState,
    /// 0-100, monotonically non-decreasing while running.
    pub percentage: u8,
    /// Last formatted status line ("Progress: 40.0% [...]").
    pub status_line: Option<String>,
    /// Success summary or failure message once terminal.
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// True for states a task never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl Task {
    pub fn new(request: CompressionRequest) -> Self {
        let file_name = request
            .input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            request,
            file_name,
            state: TaskState::Pending,
            percentage: 0,
            status_line: None,
            message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a progress update. Percentage never moves backwards; a stale
    /// value keeps the previous high-water mark.
    pub fn update_progress(&mut self, percentage: u8, status_line: &str) {
        self.percentage = self.percentage.max(percentage.min(100));
        self.status_line = Some(status_line.to_string());
    }

    pub fn complete(&mut self, message: &str) {
        self.state = TaskState::Completed;
        self.percentage = 100;
        self.status_line = None;
        self.message = Some(message.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.state = TaskState::Failed;
        self.status_line = None;
        self.message = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.state = TaskState::Cancelled;
        self.status_line = None;
        self.finished_at = Some(Utc::now());
    }
}

/// Aggregate counters over every task the manager has seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct BatchStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchStats {
    /// True when nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(CompressionRequest::new("dir/video.mp4", "dir/out.mp4"))
    }

    #[test]
    fn new_task_is_pending() {
        let t = task();
        assert_eq!(t.state, TaskState::Pending);
        assert_eq!(t.percentage, 0);
        assert_eq!(t.file_name, "video.mp4");
        assert!(t.started_at.is_none());
    }

    #[test]
    fn lifecycle_timestamps() {
        let mut t = task();
        t.start();
        assert_eq!(t.state, TaskState::Running);
        assert!(t.started_at.is_some());

        t.complete("done");
        assert_eq!(t.state, TaskState::Completed);
        assert_eq!(t.percentage, 100);
        assert!(t.finished_at.is_some());
        assert!(t.state.is_terminal());
    }

    #[test]
    fn progress_never_regresses() {
        let mut t = task();
        t.start();
        t.update_progress(40, "Progress: 40.0%");
        t.update_progress(30, "Progress: 30.0%");
        assert_eq!(t.percentage, 40);
        // The status line still reflects the latest parse.
        assert_eq!(t.status_line.as_deref(), Some("Progress: 30.0%"));
    }

    #[test]
    fn progress_clamped_to_100() {
        let mut t = task();
        t.update_progress(150, "x");
        assert_eq!(t.percentage, 100);
    }

    #[test]
    fn fail_records_message() {
        let mut t = task();
        t.start();
        t.fail("ffmpeg exited with status 1");
        assert_eq!(t.state, TaskState::Failed);
        assert_eq!(t.message.as_deref(), Some("ffmpeg exited with status 1"));
    }

    #[test]
    fn batch_stats_idle() {
        let mut stats = BatchStats::default();
        assert!(stats.is_idle());
        stats.pending = 1;
        assert!(!stats.is_idle());
    }
}
