use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use taskwatch_core::{SnapshotView, StatusUpdate, TaskId, TaskStatus, TextFormatter};
use taskwatch_engine::TrackingSink;
use taskwatch_logging::track_debug;

use crate::render::Renderer;

/// Prints each update as it arrives and remembers how the task ended.
pub struct TerminalSink {
    renderer: Renderer,
    formatter: TextFormatter,
    outcome: Mutex<Option<TaskStatus>>,
}

impl TerminalSink {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            formatter: TextFormatter::new(),
            outcome: Mutex::new(None),
        }
    }

    /// Terminal status, or `None` if tracking stopped before the task ended.
    pub fn outcome(&self) -> Option<TaskStatus> {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TrackingSink for TerminalSink {
    fn on_update(&self, task_id: &TaskId, update: &StatusUpdate) {
        if update.synthesized {
            track_debug!("Task {task_id}: local failure report #{}", update.seq);
        }
        let view = SnapshotView::from_snapshot(&update.snapshot, &self.formatter);
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(self.renderer.render_update(update, &view).as_bytes());
        let _ = stdout.flush();
    }

    fn on_complete(&self, _task_id: &TaskId, update: &StatusUpdate) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(update.snapshot.status);
    }
}
