use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque identifier of one server-side job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Position in the lifecycle; both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `next` may follow `self` in one task's timeline.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One status report produced by the backend for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl StatusSnapshot {
    pub fn new(status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::Failed, message)
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// String field of `data`, only meaningful once the task completed.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        if self.status != TaskStatus::Completed {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn download_ready(&self) -> bool {
        if self.status != TaskStatus::Completed {
            return false;
        }
        let Some(data) = self.data.as_ref() else {
            return false;
        };
        let flagged = data
            .get("download_ready")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let has_url = data
            .get("download_url")
            .and_then(Value::as_str)
            .is_some_and(|url| !url.is_empty());
        flagged || has_url
    }
}

/// A snapshot as delivered to the caller, tagged with its delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub seq: u64,
    pub snapshot: StatusSnapshot,
    /// True when the tracker produced the snapshot itself after a transport failure.
    pub synthesized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Active,
    Completed,
    Cancelled,
}

/// Pure state of one tracking session; the engine drives it with [`crate::Msg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSession {
    task_id: TaskId,
    mode: TransportMode,
    phase: SessionPhase,
    seq: u64,
    last_status: Option<TaskStatus>,
    stream_events: usize,
    dropped: usize,
}

impl TrackingSession {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            mode: TransportMode::Idle,
            phase: SessionPhase::Active,
            seq: 0,
            last_status: None,
            stream_events: 0,
            dropped: 0,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn last_status(&self) -> Option<TaskStatus> {
        self.last_status
    }

    /// Number of snapshots delivered so far.
    pub fn delivered(&self) -> u64 {
        self.seq
    }

    /// Number of snapshots discarded because they moved the timeline backwards.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub(crate) fn set_mode(&mut self, mode: TransportMode) {
        self.mode = mode;
    }

    pub(crate) fn stream_events(&self) -> usize {
        self.stream_events
    }

    pub(crate) fn accepts(&self, status: TaskStatus) -> bool {
        match self.last_status {
            Some(last) => last.can_advance_to(status),
            None => true,
        }
    }

    pub(crate) fn note_dropped(&mut self) {
        self.dropped += 1;
    }

    pub(crate) fn record(&mut self, snapshot: StatusSnapshot, synthesized: bool) -> StatusUpdate {
        self.seq += 1;
        if self.mode == TransportMode::Streaming && !synthesized {
            self.stream_events += 1;
        }
        self.last_status = Some(snapshot.status);
        if snapshot.status.is_terminal() {
            self.phase = SessionPhase::Completed;
        }
        StatusUpdate {
            seq: self.seq,
            snapshot,
            synthesized,
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.phase = SessionPhase::Cancelled;
    }
}
