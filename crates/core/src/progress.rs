use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of run progress, pushed to a `ProgressSink` at
/// phase boundaries and periodically during long-running phases (scan,
/// upload). Every field is optional because not every phase knows every
/// count (e.g. the snapshot phase has no `bytes_uploaded`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    pub phase: String,
    pub files_total: Option<u64>,
    pub files_changed: Option<u64>,
    pub chunks_total: Option<u64>,
    pub chunks_done: Option<u64>,
    pub bytes_written: Option<u64>,
    pub bytes_uploaded: Option<u64>,
    pub compose_calls_done: Option<u64>,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: TaskProgress);
}

/// A sink that discards everything; the default when no caller wires a
/// real one (e.g. in unit tests that don't care about progress output).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_progress(&self, _progress: TaskProgress) {}
}
