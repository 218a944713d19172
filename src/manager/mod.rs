//! Batch compression manager.
//!
//! The [`CompressionManager`] owns every task from submission to settlement:
//! it validates requests, keeps the FIFO admission queue, enforces the
//! concurrency bound, spawns one tokio task per running encode, and
//! broadcasts [`AppEvent`]s to subscribers.
//!
//! Manager methods are synchronous state transitions guarded by locks; no
//! lock is held across process I/O.

mod types;

pub use types::*;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::events::AppEvent;
use crate::job::EncodeJob;
use crate::request::CompressionRequest;
use crate::tools::ToolRegistry;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct CompressionManager {
    tasks: RwLock<HashMap<Uuid, Task>>,
    pending: RwLock<VecDeque<Uuid>>,
    running: RwLock<HashMap<Uuid, CancellationToken>>,
    max_concurrency: RwLock<usize>,
    settings: Settings,
    registry: ToolRegistry,
    event_tx: broadcast::Sender<AppEvent>,
    /// Self-handle for spawning job tasks that call back into the manager.
    me: Weak<CompressionManager>,
}

impl CompressionManager {
    pub fn new(settings: Settings, registry: ToolRegistry) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);

        Arc::new_cyclic(|me| Self {
            tasks: RwLock::new(HashMap::new()),
            pending: RwLock::new(VecDeque::new()),
            running: RwLock::new(HashMap::new()),
            max_concurrency: RwLock::new(settings.max_concurrent_tasks.max(1)),
            settings,
            registry,
            event_tx,
            me: me.clone(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Get a clone of the event sender for use in other components.
    pub fn event_sender(&self) -> broadcast::Sender<AppEvent> {
        self.event_tx.clone()
    }

    fn broadcast(&self, event: AppEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("No subscribers for event");
        }
    }

    /// Validate a request and queue it. Invalid requests are rejected here
    /// and never receive a task id.
    pub fn submit(&self, request: CompressionRequest) -> Result<Uuid> {
        request.validate()?;

        let task = Task::new(request);
        let id = task.id;
        let file_name = task.file_name.clone();

        {
            let mut tasks = self.tasks.write();
            tasks.insert(id, task);
        }

        // TaskSubmitted must precede TaskStarted: the id only becomes
        // claimable by admission once it is in the pending queue.
        self.broadcast(AppEvent::submitted(id, file_name));
        tracing::info!(%id, "task submitted");

        {
            let mut pending = self.pending.write();
            pending.push_back(id);
        }

        self.admit();
        Ok(id)
    }

    /// Change the concurrency bound. Running tasks are never preempted; a
    /// lowered bound only suppresses admission until enough tasks settle.
    pub fn set_concurrency(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::validation("concurrency must be at least 1"));
        }
        *self.max_concurrency.write() = n;
        self.admit();
        Ok(())
    }

    /// Cancel a task.
    ///
    /// Pending tasks settle Cancelled immediately; running tasks have their
    /// token cancelled and settle when the child dies. Cancelling a terminal
    /// task is a no-op; an unknown id is [`Error::NotFound`].
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        let action = {
            let mut tasks = self.tasks.write();
            let task = tasks
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("task", id))?;

            match task.state {
                TaskState::Pending => {
                    task.cancel();
                    CancelAction::SettledNow
                }
                TaskState::Running => CancelAction::SignalJob,
                _ => CancelAction::Noop,
            }
        };

        match action {
            CancelAction::SettledNow => {
                self.pending.write().retain(|queued| *queued != id);
                self.broadcast(AppEvent::cancelled(id));
                tracing::info!(%id, "pending task cancelled");
                self.finish_if_idle();
            }
            CancelAction::SignalJob => {
                if let Some(token) = self.running.read().get(&id) {
                    token.cancel();
                }
                tracing::info!(%id, "cancellation requested for running task");
            }
            CancelAction::Noop => {}
        }

        Ok(())
    }

    pub fn get_task(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    /// Snapshot of every tracked task, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Drop terminal tasks from the collection; returns how many were
    /// removed. Pending and running tasks are untouched.
    pub fn clear_finished(&self) -> usize {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|_, task| !task.state.is_terminal());
        before - tasks.len()
    }

    pub fn stats(&self) -> BatchStats {
        let tasks = self.tasks.read();
        let mut stats = BatchStats {
            total: tasks.len(),
            ..BatchStats::default()
        };
        for task in tasks.values() {
            match task.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Running => stats.running += 1,
                TaskState::Completed => stats.completed += 1,
                TaskState::Failed => stats.failed += 1,
                TaskState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Promote pending tasks into running slots until the bound is reached
    /// or the queue is empty. Called on submit and after every settlement.
    fn admit(&self) {
        loop {
            let Some((id, request, token)) = self.try_claim_slot() else {
                return;
            };

            let file_name = {
                let tasks = self.tasks.read();
                tasks.get(&id).map(|t| t.file_name.clone()).unwrap_or_default()
            };
            self.broadcast(AppEvent::started(id, file_name));
            tracing::info!(%id, input = %request.input.display(), "task started");

            let (ffmpeg, ffprobe) = match (
                self.registry.require("ffmpeg"),
                self.registry.require("ffprobe"),
            ) {
                (Ok(ffmpeg), Ok(ffprobe)) => (ffmpeg.to_path_buf(), ffprobe.to_path_buf()),
                (Err(e), _) | (_, Err(e)) => {
                    self.settle(id, Err(e));
                    continue;
                }
            };

            let job = EncodeJob::new(
                request,
                self.settings.ffmpeg.clone(),
                ffmpeg,
                ffprobe,
                self.settings.delete_temp_files,
            );

            // The only strong handles live outside the manager; if they are
            // all gone there is nobody left to observe the job.
            let Some(manager) = self.me.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                let progress_manager = Arc::clone(&manager);
                let result = job
                    .run(&token, move |percentage, status| {
                        progress_manager.on_progress(id, percentage, status);
                    })
                    .await;
                manager.settle(id, result);
            });
        }
    }

    /// Pop the next admissible pending task and reserve a running slot for
    /// it. Returns `None` when the bound is reached or nothing is pending.
    fn try_claim_slot(&self) -> Option<(Uuid, CompressionRequest, CancellationToken)> {
        let max = *self.max_concurrency.read();
        let mut running = self.running.write();
        if running.len() >= max {
            return None;
        }

        let mut pending = self.pending.write();
        let mut tasks = self.tasks.write();

        // Ids cancelled while queued are skipped, preserving FIFO order for
        // the rest.
        loop {
            let id = pending.pop_front()?;
            let Some(task) = tasks.get_mut(&id) else {
                continue;
            };
            if task.state != TaskState::Pending {
                continue;
            }

            task.start();
            let token = CancellationToken::new();
            running.insert(id, token.clone());
            return Some((id, task.request.clone(), token));
        }
    }

    fn on_progress(&self, id: Uuid, percentage: u8, status: String) {
        let percentage = {
            let mut tasks = self.tasks.write();
            let Some(task) = tasks.get_mut(&id) else {
                return;
            };
            if task.state != TaskState::Running {
                return;
            }
            task.update_progress(percentage, &status);
            task.percentage
        };

        self.broadcast(AppEvent::progress(id, percentage, status));
    }

    /// Record a job's terminal result, free its slot, and admit the next
    /// pending task.
    fn settle(&self, id: Uuid, result: Result<String>) {
        self.running.write().remove(&id);

        let event = {
            let mut tasks = self.tasks.write();
            let Some(task) = tasks.get_mut(&id) else {
                return;
            };

            match result {
                Ok(summary) => {
                    task.complete(&summary);
                    tracing::info!(%id, "task completed");
                    AppEvent::completed(id, summary)
                }
                Err(Error::Cancelled) => {
                    task.cancel();
                    tracing::info!(%id, "task cancelled");
                    AppEvent::cancelled(id)
                }
                Err(e) => {
                    let message = e.to_string();
                    task.fail(&message);
                    tracing::error!(%id, error = %message, "task failed");
                    AppEvent::failed(id, message)
                }
            }
        };

        self.broadcast(event);
        self.admit();
        self.finish_if_idle();
    }

    fn finish_if_idle(&self) {
        if self.stats().is_idle() {
            self.broadcast(AppEvent::AllComplete);
        }
    }
}

enum CancelAction {
    SettledNow,
    SignalJob,
    Noop,
}
