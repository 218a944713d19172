//! Manager integration tests.
//!
//! These exercise the full submit -> admit -> encode -> settle path against
//! stub ffmpeg/ffprobe shell scripts, so they run without any real encoder
//! installed. Unix-only because the stubs are shell scripts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use vidpress::config::{Settings, ToolsConfig};
use vidpress::events::AppEvent;
use vidpress::manager::{CompressionManager, TaskState};
use vidpress::request::CompressionRequest;
use vidpress::tools::ToolRegistry;

// ---------------------------------------------------------------------------
// Stub tool harness
// ---------------------------------------------------------------------------

/// Stub ffprobe: fixed metadata for any input (10s, 300 frames, ~1MB).
const FFPROBE_STUB: &str = r#"cat <<'EOF'
{"streams":[{"width":1280,"height":720,"duration":"10.0","nb_frames":"300"}],"format":{"duration":"10.0","size":"1000000"}}
EOF
"#;

/// Stub ffmpeg: emits progress on stderr, writes the output file, exits 0.
/// Inputs with "bad" in the name fail with exit 1; inputs with "slow" in the
/// name hang until killed.
const FFMPEG_STUB: &str = r#"in="$2"
for last in "$@"; do :; done
case "$in" in
  *bad*)
    echo "Error while opening encoder for output stream" >&2
    exit 1
    ;;
  *slow*)
    sleep 30
    exit 0
    ;;
esac
echo "frame=  150 fps=30 q=28.0 size=  1024kB time=00:00:05.00 bitrate=1677.7kbits/s speed=1.0x" >&2
sleep 0.1
echo "frame=  300 fps=30 q=28.0 size=  2048kB time=00:00:10.00 bitrate=1677.7kbits/s speed=1.0x" >&2
printf 'compressed' > "$last"
exit 0
"#;

struct Harness {
    dir: TempDir,
    manager: Arc<CompressionManager>,
    events: broadcast::Receiver<AppEvent>,
}

impl Harness {
    fn new(max_concurrent: usize) -> Self {
        let dir = TempDir::new().unwrap();

        let ffmpeg = write_stub(dir.path(), "ffmpeg", FFMPEG_STUB);
        let ffprobe = write_stub(dir.path(), "ffprobe", FFPROBE_STUB);

        let settings = Settings {
            max_concurrent_tasks: max_concurrent,
            tools: ToolsConfig {
                ffmpeg_path: Some(ffmpeg),
                ffprobe_path: Some(ffprobe),
            },
            ..Settings::default()
        };
        let registry = ToolRegistry::discover(&settings.tools);

        let manager = CompressionManager::new(settings, registry);
        let events = manager.subscribe();
        Self {
            dir,
            manager,
            events,
        }
    }

    /// Create an input file and a matching request.
    fn request(&self, name: &str) -> CompressionRequest {
        let input = self.dir.path().join(name);
        fs::write(&input, b"raw video bytes").unwrap();
        let output = self.dir.path().join(format!("out_{name}"));
        CompressionRequest::new(input, output)
    }

    async fn next_event(&mut self) -> AppEvent {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Collect events until AllComplete (inclusive).
    async fn drain_until_idle(&mut self) -> Vec<AppEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = matches!(event, AppEvent::AllComplete);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_encode_emits_full_event_sequence() {
    let mut h = Harness::new(2);
    let req = h.request("movie.mp4");
    let output = req.output.clone();
    let id = h.manager.submit(req).unwrap();

    let events = h.drain_until_idle().await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            AppEvent::TaskSubmitted { .. } => "submitted",
            AppEvent::TaskStarted { .. } => "started",
            AppEvent::TaskProgress { .. } => "progress",
            AppEvent::TaskCompleted { .. } => "completed",
            AppEvent::TaskFailed { .. } => "failed",
            AppEvent::TaskCancelled { .. } => "cancelled",
            AppEvent::AllComplete => "all_complete",
        })
        .collect();

    assert_eq!(kinds.first(), Some(&"submitted"));
    assert_eq!(kinds.get(1), Some(&"started"));
    assert!(kinds.contains(&"progress"), "events were {kinds:?}");
    assert_eq!(kinds.last(), Some(&"all_complete"));
    assert_eq!(kinds[kinds.len() - 2], "completed");

    let task = h.manager.get_task(id).unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.percentage, 100);
    let message = task.message.unwrap();
    assert!(message.contains("Compression successful!"), "{message}");
    assert!(message.contains("Size reduced by"), "{message}");

    // The scratch file was moved into place.
    assert!(output.exists());
    assert!(!output.parent().unwrap().join("temp_out_movie.mp4").exists());
}

#[tokio::test]
async fn failed_finalize_removes_scratch_file() {
    let mut h = Harness::new(1);
    let mut req = h.request("movie.mp4");

    // Scratch goes to its own directory; the final move targets a directory
    // that does not exist, so both the rename and the copy fallback fail.
    let scratch_dir = h.dir.path().join("scratch");
    fs::create_dir_all(&scratch_dir).unwrap();
    req.temp_dir = Some(scratch_dir.clone());
    req.output = h.dir.path().join("missing_dir/out.mp4");

    let id = h.manager.submit(req).unwrap();
    h.drain_until_idle().await;

    let task = h.manager.get_task(id).unwrap();
    assert_eq!(task.state, TaskState::Failed);

    // The encoder wrote temp_out.mp4 before exiting 0; the failed move must
    // not leave it behind.
    assert!(!scratch_dir.join("temp_out.mp4").exists());
}

// ---------------------------------------------------------------------------
// Admission bound and FIFO promotion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn third_task_waits_for_a_free_slot() {
    let mut h = Harness::new(2);
    let ids = [
        h.manager.submit(h.request("a.mp4")).unwrap(),
        h.manager.submit(h.request("b.mp4")).unwrap(),
        h.manager.submit(h.request("c.mp4")).unwrap(),
    ];

    let events = h.drain_until_idle().await;

    let third_started = events
        .iter()
        .position(|e| matches!(e, AppEvent::TaskStarted { id, .. } if *id == ids[2]))
        .expect("third task never started");
    let first_terminal = events
        .iter()
        .position(|e| matches!(e, AppEvent::TaskCompleted { .. } | AppEvent::TaskFailed { .. }))
        .expect("no task settled");

    // The third task is only admitted after one of the first two settles.
    assert!(
        third_started > first_terminal,
        "started at {third_started}, first settle at {first_terminal}"
    );

    let stats = h.manager.stats();
    assert_eq!(stats.completed, 3);
    assert!(stats.is_idle());

    for id in ids {
        assert_eq!(h.manager.get_task(id).unwrap().state, TaskState::Completed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submitted_precedes_started_for_every_task() {
    let mut h = Harness::new(2);
    let ids: Vec<_> = (0..6)
        .map(|i| h.manager.submit(h.request(&format!("v{i}.mp4"))).unwrap())
        .collect();

    let events = h.drain_until_idle().await;

    for id in ids {
        let submitted = events
            .iter()
            .position(|e| matches!(e, AppEvent::TaskSubmitted { id: eid, .. } if *eid == id))
            .expect("missing TaskSubmitted");
        let started = events
            .iter()
            .position(|e| matches!(e, AppEvent::TaskStarted { id: eid, .. } if *eid == id))
            .expect("missing TaskStarted");
        assert!(
            submitted < started,
            "submitted at {submitted}, started at {started}"
        );
    }
}

// ---------------------------------------------------------------------------
// Concurrency bound changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raising_the_bound_admits_queued_tasks() {
    let mut h = Harness::new(1);
    let first = h.manager.submit(h.request("slow_a.mp4")).unwrap();
    let second = h.manager.submit(h.request("slow_b.mp4")).unwrap();

    loop {
        if matches!(h.next_event().await, AppEvent::TaskStarted { id, .. } if id == first) {
            break;
        }
    }
    assert_eq!(h.manager.get_task(second).unwrap().state, TaskState::Pending);

    h.manager.set_concurrency(2).unwrap();
    loop {
        if matches!(h.next_event().await, AppEvent::TaskStarted { id, .. } if id == second) {
            break;
        }
    }
    assert_eq!(h.manager.stats().running, 2);

    // Lowering never preempts; both encodes keep running over the new bound.
    h.manager.set_concurrency(1).unwrap();
    assert_eq!(h.manager.get_task(first).unwrap().state, TaskState::Running);
    assert_eq!(h.manager.get_task(second).unwrap().state, TaskState::Running);

    h.manager.cancel(first).unwrap();
    h.manager.cancel(second).unwrap();
    h.drain_until_idle().await;
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelling_running_task_frees_its_slot() {
    let mut h = Harness::new(1);
    let slow = h.manager.submit(h.request("slow_a.mp4")).unwrap();
    let queued = h.manager.submit(h.request("b.mp4")).unwrap();

    // Wait for the slow task to occupy the only slot.
    loop {
        if matches!(h.next_event().await, AppEvent::TaskStarted { id, .. } if id == slow) {
            break;
        }
    }
    assert_eq!(h.manager.get_task(queued).unwrap().state, TaskState::Pending);

    h.manager.cancel(slow).unwrap();
    let events = h.drain_until_idle().await;

    assert!(events
        .iter()
        .any(|e| matches!(e, AppEvent::TaskCancelled { id } if *id == slow)));
    assert!(events
        .iter()
        .any(|e| matches!(e, AppEvent::TaskStarted { id, .. } if *id == queued)));

    // Killed, not failed.
    assert_eq!(h.manager.get_task(slow).unwrap().state, TaskState::Cancelled);
    assert_eq!(h.manager.get_task(queued).unwrap().state, TaskState::Completed);
}

#[tokio::test]
async fn cancelling_pending_task_settles_it_immediately() {
    let mut h = Harness::new(1);
    let slow = h.manager.submit(h.request("slow_a.mp4")).unwrap();
    let queued = h.manager.submit(h.request("b.mp4")).unwrap();

    loop {
        if matches!(h.next_event().await, AppEvent::TaskStarted { id, .. } if id == slow) {
            break;
        }
    }

    h.manager.cancel(queued).unwrap();
    assert_eq!(
        h.manager.get_task(queued).unwrap().state,
        TaskState::Cancelled
    );

    // The cancelled task is never admitted.
    h.manager.cancel(slow).unwrap();
    let events = h.drain_until_idle().await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, AppEvent::TaskStarted { id, .. } if *id == queued)));
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_task_reports_error_and_leaves_others_alone() {
    let mut h = Harness::new(2);
    let bad = h.manager.submit(h.request("bad.mp4")).unwrap();
    let good = h.manager.submit(h.request("good.mp4")).unwrap();

    let events = h.drain_until_idle().await;

    let error = events
        .iter()
        .find_map(|e| match e {
            AppEvent::TaskFailed { id, error } if *id == bad => Some(error.clone()),
            _ => None,
        })
        .expect("bad task never failed");
    assert!(!error.is_empty());
    assert!(error.contains("ffmpeg"), "{error}");

    let bad_task = h.manager.get_task(bad).unwrap();
    assert_eq!(bad_task.state, TaskState::Failed);
    assert!(bad_task.message.unwrap().contains("Error while opening encoder"));

    assert_eq!(h.manager.get_task(good).unwrap().state, TaskState::Completed);

    // One failure, no retries.
    let failed_count = events
        .iter()
        .filter(|e| matches!(e, AppEvent::TaskFailed { .. }))
        .count();
    assert_eq!(failed_count, 1);
}
