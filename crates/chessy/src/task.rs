//! Per-run task handle: status, message log, progress and a cooperative
//! cancellation flag. One handle per pipeline invocation; clones share it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub name: String,
    pub status: TaskStatus,
    pub messages: Vec<String>,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    messages: Vec<String>,
    done: usize,
    total: usize,
}

#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: Arc<str>,
    state: Arc<Mutex<TaskState>>,
    cancel: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(TaskState {
                status: TaskStatus::Idle,
                messages: Vec::new(),
                done: 0,
                total: 0,
            })),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TaskState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    pub fn start(&self) {
        self.with_state(|s| s.status = TaskStatus::Running);
        self.message(format!("{} started", self.name));
    }

    /// Append a status line to the log.
    pub fn message(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!(task = %self.name, "{msg}");
        self.with_state(|s| s.messages.push(msg));
    }

    pub fn set_progress(&self, done: usize, total: usize) {
        self.with_state(|s| {
            s.done = done;
            s.total = total;
        });
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn complete(&self) {
        let status = if self.is_cancelled() {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Completed
        };
        self.with_state(|s| s.status = status);
        self.message(format!("{} {}", self.name, if status == TaskStatus::Cancelled { "cancelled" } else { "completed" }));
    }

    pub fn fail(&self, error: &dyn std::fmt::Display) {
        self.with_state(|s| s.status = TaskStatus::Failed);
        self.message(format!("{} failed: {error}", self.name));
    }

    pub fn status(&self) -> TaskStatus {
        self.with_state(|s| s.status)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.with_state(|s| TaskSnapshot {
            name: self.name.to_string(),
            status: s.status,
            messages: s.messages.clone(),
            done: s.done,
            total: s.total,
        })
    }
}
