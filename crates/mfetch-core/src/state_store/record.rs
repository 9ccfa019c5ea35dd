//! Persistent per-artifact download record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Largest fraction reported while a file is still streaming.
pub const ACTIVE_FRACTION_CAP: f64 = 0.999;

/// Download lifecycle state stored in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
    Paused,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Idle => "idle",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable state of one artifact download. Timestamps are wall-clock and for
/// display only. Fields this version does not know about are kept in `extra`
/// and written back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DownloadRecord {
    #[serde(default)]
    pub status: DownloadStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_files: u32,
    #[serde(default)]
    pub completed_files: u32,
    #[serde(default)]
    pub completed_file_paths: BTreeSet<String>,
    /// Optional files that finished; not counted in `completed_files`.
    #[serde(default)]
    pub completed_optional_paths: BTreeSet<String>,
    #[serde(default)]
    pub current_file_path: Option<String>,
    #[serde(default)]
    pub current_file_downloaded_bytes: u64,
    #[serde(default)]
    pub current_file_total_bytes: u64,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub last_error_message: Option<String>,
    #[serde(default)]
    pub chosen_mirror: Option<String>,
    /// Soft failures (optional files that could not be fetched).
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DownloadRecord {
    /// Fresh record for a download that is starting now.
    pub fn started(now: DateTime<Utc>, total_files: u32) -> Self {
        Self {
            status: DownloadStatus::Downloading,
            started_at: Some(now),
            last_update_at: Some(now),
            total_files,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DownloadStatus::Downloading
    }

    /// Add a required file to the completed set, keeping the count in sync.
    pub fn mark_file_done(&mut self, relative: &str) {
        self.completed_file_paths.insert(relative.to_string());
        self.completed_files = self.completed_file_paths.len() as u32;
    }

    /// Point the record at the file the worker is about to transfer.
    pub fn switch_file(&mut self, relative: &str, downloaded: u64, total: u64) {
        self.current_file_path = Some(relative.to_string());
        self.current_file_downloaded_bytes = downloaded;
        self.current_file_total_bytes = total;
    }

    /// Record streamed progress for the current file.
    pub fn record_progress(&mut self, downloaded: u64, total: u64) {
        self.current_file_total_bytes = total;
        self.current_file_downloaded_bytes = if total > 0 { downloaded.min(total) } else { downloaded };
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error_message = Some(message.into());
    }

    /// Back to `idle` with every counter cleared (after cancel).
    pub fn reset_idle(&mut self, now: DateTime<Utc>) {
        let extra = std::mem::take(&mut self.extra);
        let total_files = self.total_files;
        *self = Self {
            status: DownloadStatus::Idle,
            last_update_at: Some(now),
            total_files,
            extra,
            ..Self::default()
        };
    }

    /// Fraction of the current file: clamped to [0, 0.999] while streaming,
    /// 1.0 only once the artifact has completed.
    pub fn progress_fraction(&self) -> f64 {
        if self.status == DownloadStatus::Completed {
            return 1.0;
        }
        if self.current_file_total_bytes == 0 {
            return 0.0;
        }
        let f = self.current_file_downloaded_bytes as f64 / self.current_file_total_bytes as f64;
        f.clamp(0.0, ACTIVE_FRACTION_CAP)
    }

    /// Required files done over required files total.
    pub fn files_fraction(&self) -> f64 {
        if self.total_files == 0 {
            return if self.status == DownloadStatus::Completed { 1.0 } else { 0.0 };
        }
        (self.completed_files as f64 / self.total_files as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let s = serde_json::to_string(&DownloadStatus::Downloading).unwrap();
        assert_eq!(s, "\"downloading\"");
        let p: DownloadStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(p, DownloadStatus::Paused);
        assert_eq!(DownloadStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let json = r#"{
            "status": "paused",
            "total_files": 2,
            "completed_files": 1,
            "completed_file_paths": ["f1"],
            "current_file_path": "f2",
            "current_file_downloaded_bytes": 4096,
            "current_file_total_bytes": 8192,
            "started_at": "2026-01-02T03:04:05Z",
            "ui_color": "blue",
            "nested": {"k": [1, 2]}
        }"#;
        let rec: DownloadRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.status, DownloadStatus::Paused);
        assert_eq!(rec.extra.get("ui_color").and_then(|v| v.as_str()), Some("blue"));

        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["ui_color"], "blue");
        assert_eq!(back["nested"]["k"][1], 2);
        assert_eq!(back["started_at"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn mark_file_done_keeps_count_in_sync() {
        let mut rec = DownloadRecord::started(Utc::now(), 2);
        rec.mark_file_done("f1");
        rec.mark_file_done("f1");
        rec.mark_file_done("f2");
        assert_eq!(rec.completed_files, 2);
        assert_eq!(rec.completed_files as usize, rec.completed_file_paths.len());
    }

    #[test]
    fn progress_fraction_is_capped_until_completed() {
        let mut rec = DownloadRecord::started(Utc::now(), 1);
        assert_eq!(rec.progress_fraction(), 0.0);
        rec.switch_file("f", 0, 1000);
        rec.record_progress(500, 1000);
        assert!((rec.progress_fraction() - 0.5).abs() < 1e-9);
        rec.record_progress(1000, 1000);
        assert_eq!(rec.progress_fraction(), ACTIVE_FRACTION_CAP);
        rec.record_progress(5000, 1000);
        assert_eq!(rec.current_file_downloaded_bytes, 1000);
        rec.status = DownloadStatus::Completed;
        assert_eq!(rec.progress_fraction(), 1.0);
    }

    #[test]
    fn reset_idle_clears_counters_but_keeps_extra() {
        let mut rec = DownloadRecord::started(Utc::now(), 3);
        rec.mark_file_done("a");
        rec.record_error("boom");
        rec.chosen_mirror = Some("https://m1".into());
        rec.extra.insert("note".into(), serde_json::json!("kept"));
        rec.reset_idle(Utc::now());
        assert_eq!(rec.status, DownloadStatus::Idle);
        assert_eq!(rec.completed_files, 0);
        assert!(rec.completed_file_paths.is_empty());
        assert_eq!(rec.error_count, 0);
        assert!(rec.chosen_mirror.is_none());
        assert_eq!(rec.total_files, 3);
        assert_eq!(rec.extra["note"], "kept");
    }
}
