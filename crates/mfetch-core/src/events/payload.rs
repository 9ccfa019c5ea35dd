//! Event payload published by the coordinator.

use serde::Serialize;

use crate::state_store::DownloadRecord;

/// Why an event was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLabel {
    Started,
    Resumed,
    /// Streaming progress; also sent with 0 bytes when the worker switches files.
    Chunk,
    FileDone,
    /// An optional file could not be fetched; recorded as a warning.
    FileSkipped,
    Paused,
    Cancelled,
    Failed,
    Completed,
}

impl EventLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            EventLabel::Started => "started",
            EventLabel::Resumed => "resumed",
            EventLabel::Chunk => "chunk",
            EventLabel::FileDone => "file_done",
            EventLabel::FileSkipped => "file_skipped",
            EventLabel::Paused => "paused",
            EventLabel::Cancelled => "cancelled",
            EventLabel::Failed => "failed",
            EventLabel::Completed => "completed",
        }
    }

    /// Labels after which the worker is gone.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventLabel::Paused | EventLabel::Cancelled | EventLabel::Failed | EventLabel::Completed
        )
    }
}

impl std::fmt::Display for EventLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an artifact's record at publish time.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadEvent {
    pub artifact_id: String,
    pub label: EventLabel,
    pub record: DownloadRecord,
    /// Fraction of the current file in [0, 1]; 1.0 only on `file_done` and `completed`.
    pub progress_fraction: f64,
}

impl DownloadEvent {
    pub fn new(artifact_id: impl Into<String>, label: EventLabel, record: DownloadRecord) -> Self {
        let progress_fraction = match label {
            EventLabel::FileDone => 1.0,
            _ => record.progress_fraction(),
        };
        Self {
            artifact_id: artifact_id.into(),
            label,
            record,
            progress_fraction,
        }
    }
}
