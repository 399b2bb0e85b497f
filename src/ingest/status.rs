//! Processing status state machine.
//!
//! One status value per process: Idle -> Processing -> {Completed, Failed}
//! -> Idle. The single-job invariant is enforced by an atomic check-and-set
//! under the status mutex; nothing else serializes access. Failure releases
//! the slot so the next upload can start.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the most recent ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Processing,
    Completed,
    Failed,
}

/// History entry for a completed ingestion, keyed by spec identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedFile {
    pub spec_id: String,
    pub file_name: String,
    pub total_chunks: usize,
    pub embedded_at: DateTime<Utc>,
}

/// Observable state of the current (or most recent) ingestion job.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStatus {
    pub state: JobState,
    pub is_processing: bool,
    /// 0-100, monotonic non-decreasing within a job.
    pub progress: u8,
    pub processed_chunks: usize,
    pub total_chunks: usize,
    pub current_file: Option<String>,
    pub error: Option<String>,
    pub embedded_files: Vec<EmbeddedFile>,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            is_processing: false,
            progress: 0,
            processed_chunks: 0,
            total_chunks: 0,
            current_file: None,
            error: None,
            embedded_files: Vec::new(),
        }
    }
}

/// Shared handle to the process-wide status value.
///
/// Single writer (the active job), any number of readers.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<ProcessingStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProcessingStatus> {
        // Status is plain data; a panicked writer leaves it readable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim the single ingestion slot.
    ///
    /// Returns false without touching the active job's state when a job is
    /// already processing.
    pub fn try_begin(&self, file_name: &str) -> bool {
        let mut status = self.lock();
        if status.is_processing {
            return false;
        }

        status.state = JobState::Processing;
        status.is_processing = true;
        status.progress = 0;
        status.processed_chunks = 0;
        status.total_chunks = 0;
        status.current_file = Some(file_name.to_string());
        status.error = None;
        true
    }

    /// Set the chunk total once the document has been chunked.
    pub fn set_total(&self, total_chunks: usize) {
        self.lock().total_chunks = total_chunks;
    }

    /// Advance progress after a committed batch.
    pub fn record_batch(&self, committed: usize) {
        let mut status = self.lock();
        status.processed_chunks += committed;

        let progress = if status.total_chunks == 0 {
            100
        } else {
            (status.processed_chunks * 100 / status.total_chunks) as u8
        };
        // Monotonic within the job.
        status.progress = status.progress.max(progress);
    }

    /// Complete the job, forcing progress to 100 and recording history.
    ///
    /// History de-duplicates on spec identity: re-ingesting the same bytes
    /// replaces its own entry, different content under the same filename
    /// coexists.
    pub fn complete(&self, entry: EmbeddedFile) {
        let mut status = self.lock();
        status.state = JobState::Completed;
        status.is_processing = false;
        status.progress = 100;
        status
            .embedded_files
            .retain(|existing| existing.spec_id != entry.spec_id);
        status.embedded_files.push(entry);
    }

    /// Fail the job and release the slot.
    pub fn fail(&self, message: impl Into<String>) {
        let mut status = self.lock();
        status.state = JobState::Failed;
        status.is_processing = false;
        status.error = Some(message.into());
    }

    /// Replace the history with entries rebuilt from the store.
    pub fn restore_history(&self, mut entries: Vec<EmbeddedFile>) {
        entries.sort_by(|a, b| a.embedded_at.cmp(&b.embedded_at));
        self.lock().embedded_files = entries;
    }

    /// Snapshot of the current status.
    pub fn snapshot(&self) -> ProcessingStatus {
        self.lock().clone()
    }
}
