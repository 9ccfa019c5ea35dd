//! Per-artifact worker: required files in order, then optional files.

use anyhow::{Context, Result};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{Artifact, FileDescriptor};
use crate::checksum;
use crate::events::EventLabel;
use crate::logging;
use crate::state_store::{DownloadStatus, StoreError};
use crate::storage;
use crate::transfer::{TransferObserver, TransferOutcome, TransferRequest};

use super::control::StopRequest;
use super::slot::{deliver, ArtifactSlot};
use super::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Required,
    Optional,
}

enum FileResult {
    Done,
    /// Paused or cancelled; the record already reflects it.
    Stopped,
    Failed(String),
}

/// Thread entry point. Unexpected errors and panics end as `failed`.
pub(super) fn run(shared: Arc<Shared>, id: String, slot: Arc<ArtifactSlot>) {
    let _span = logging::worker_span(&id).entered();
    let result = panic::catch_unwind(AssertUnwindSafe(|| drive(&shared, &id, &slot)));
    let failure = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(cause) => Some(
            cause
                .downcast_ref::<&str>()
                .map(|s| format!("worker panicked: {}", s))
                .or_else(|| cause.downcast_ref::<String>().map(|s| format!("worker panicked: {}", s)))
                .unwrap_or_else(|| "worker panicked".to_string()),
        ),
    };
    if let Some(message) = failure {
        tracing::error!(artifact = %id, "download failed: {}", message);
        finish(&shared, &id, &slot, DownloadStatus::Failed, Some(message));
    }
}

fn drive(shared: &Shared, id: &str, slot: &ArtifactSlot) -> Result<()> {
    let artifact = shared
        .catalog
        .get(id)
        .with_context(|| format!("artifact {} is not in the catalog", id))?;

    for file in &artifact.required {
        let done = slot
            .lock()
            .record
            .as_ref()
            .is_some_and(|r| r.completed_file_paths.contains(&file.path));
        if done && shared.layout.file_path(id, &file.path).is_file() {
            continue;
        }
        match fetch_file(shared, artifact, slot, file, Role::Required)? {
            FileResult::Done => {}
            FileResult::Stopped => return Ok(()),
            FileResult::Failed(message) => {
                tracing::warn!(artifact = id, file = %file.path, "required file failed: {}", message);
                finish(shared, id, slot, DownloadStatus::Failed, Some(message));
                return Ok(());
            }
        }
    }

    for file in &artifact.optional {
        let done = slot
            .lock()
            .record
            .as_ref()
            .is_some_and(|r| r.completed_optional_paths.contains(&file.path));
        if done {
            continue;
        }
        match fetch_file(shared, artifact, slot, file, Role::Optional)? {
            FileResult::Done => {}
            FileResult::Stopped => return Ok(()),
            FileResult::Failed(message) => {
                tracing::warn!(artifact = id, file = %file.path, "optional file skipped: {}", message);
                let mut st = slot.lock();
                if let Some(rec) = st.record.as_mut() {
                    rec.warnings.push(format!("{}: {}", file.path, message));
                    rec.last_update_at = Some(shared.clock.wall());
                    let snapshot = rec.clone();
                    shared.store.put_now(id, snapshot)?;
                }
                st.enqueue(id, EventLabel::FileSkipped);
                deliver(&shared.bus, id, slot, st);
            }
        }
    }

    finish(shared, id, slot, DownloadStatus::Completed, None);
    Ok(())
}

fn fetch_file(
    shared: &Shared,
    artifact: &Artifact,
    slot: &ArtifactSlot,
    file: &FileDescriptor,
    role: Role,
) -> Result<FileResult> {
    let id = artifact.id.as_str();
    let target = shared.layout.file_path(id, &file.path);

    if already_present(&target, file)? {
        tracing::info!(artifact = id, file = %file.path, "file already present, skipping download");
        file_done(shared, id, slot, file, role, storage::file_len(&target)?, None)?;
        return Ok(FileResult::Done);
    }

    let offset = storage::file_len(&storage::temp_path(&target))?;
    let switched_at = shared.clock.now();
    {
        let mut st = slot.lock();
        if let Some(rec) = st.record.as_mut() {
            rec.switch_file(&file.path, offset, file.size);
            rec.last_update_at = Some(shared.clock.wall());
            let snapshot = rec.clone();
            shared.store.put_now(id, snapshot)?;
        }
        st.enqueue(id, EventLabel::Chunk);
        deliver(&shared.bus, id, slot, st);
    }

    let observer = ProgressObserver::new(shared, id, slot, switched_at);
    let outcome = shared.engine.fetch(
        &TransferRequest {
            artifact_id: id,
            file,
            target: &target,
        },
        &observer,
    )?;
    if let Some(e) = observer.store_error.into_inner() {
        return Err(e.into());
    }

    match outcome {
        TransferOutcome::Done { bytes, mirror } => {
            file_done(shared, id, slot, file, role, bytes, Some(mirror))?;
            Ok(FileResult::Done)
        }
        TransferOutcome::Cancelled { downloaded } => {
            match slot.control.pending() {
                Some(StopRequest::Cancel) => cancelled(shared, artifact, slot)?,
                _ => paused(shared, id, slot, downloaded)?,
            }
            Ok(FileResult::Stopped)
        }
        TransferOutcome::Poisoned { message } | TransferOutcome::Exhausted { message } => {
            Ok(FileResult::Failed(message))
        }
    }
}

/// A completed file from an earlier run: size and digest must match whatever
/// the catalog declares, and at least one of them must be declared.
fn already_present(target: &Path, file: &FileDescriptor) -> Result<bool> {
    if !target.is_file() || (file.size == 0 && file.sha256.is_none()) {
        return Ok(false);
    }
    if file.size > 0 && storage::file_len(target)? != file.size {
        return Ok(false);
    }
    match file.sha256.as_deref() {
        Some(expected) => checksum::verify_path(target, expected),
        None => Ok(true),
    }
}

fn file_done(
    shared: &Shared,
    id: &str,
    slot: &ArtifactSlot,
    file: &FileDescriptor,
    role: Role,
    bytes: u64,
    mirror: Option<String>,
) -> Result<(), StoreError> {
    let mut st = slot.lock();
    if let Some(rec) = st.record.as_mut() {
        rec.switch_file(&file.path, bytes, bytes);
        match role {
            Role::Required => rec.mark_file_done(&file.path),
            Role::Optional => {
                rec.completed_optional_paths.insert(file.path.clone());
            }
        }
        if mirror.is_some() {
            rec.chosen_mirror = mirror;
        }
        rec.last_update_at = Some(shared.clock.wall());
        let snapshot = rec.clone();
        shared.store.put_now(id, snapshot)?;
    }
    st.enqueue(id, EventLabel::FileDone);
    deliver(&shared.bus, id, slot, st);
    Ok(())
}

fn paused(shared: &Shared, id: &str, slot: &ArtifactSlot, downloaded: u64) -> Result<(), StoreError> {
    let mut st = slot.lock();
    slot.control.disarm();
    if let Some(rec) = st.record.as_mut() {
        let total = rec.current_file_total_bytes;
        rec.record_progress(downloaded, total);
        rec.status = DownloadStatus::Paused;
        rec.last_update_at = Some(shared.clock.wall());
        let snapshot = rec.clone();
        shared.store.put_now(id, snapshot)?;
    }
    tracing::info!(artifact = id, downloaded, "download paused");
    st.enqueue(id, EventLabel::Paused);
    deliver(&shared.bus, id, slot, st);
    Ok(())
}

fn cancelled(shared: &Shared, artifact: &Artifact, slot: &ArtifactSlot) -> Result<()> {
    let id = artifact.id.as_str();
    let mut st = slot.lock();
    slot.control.disarm();
    shared.remove_temp_files(artifact).context("remove temp files")?;
    if let Some(rec) = st.record.as_mut() {
        rec.reset_idle(shared.clock.wall());
        let snapshot = rec.clone();
        shared.store.put_now(id, snapshot)?;
    }
    tracing::info!(artifact = id, "download cancelled");
    st.enqueue(id, EventLabel::Cancelled);
    deliver(&shared.bus, id, slot, st);
    Ok(())
}

/// Terminal transition to `completed` or `failed`. A journal write failure
/// leaves the in-memory record failed.
fn finish(shared: &Shared, id: &str, slot: &ArtifactSlot, status: DownloadStatus, error: Option<String>) {
    let mut st = slot.lock();
    slot.control.disarm();
    let mut label = match status {
        DownloadStatus::Completed => EventLabel::Completed,
        _ => EventLabel::Failed,
    };
    if let Some(rec) = st.record.as_mut() {
        let now = shared.clock.wall();
        rec.status = status;
        rec.ended_at = Some(now);
        rec.last_update_at = Some(now);
        if let Some(message) = error {
            rec.record_error(message);
        }
        let snapshot = rec.clone();
        if let Err(e) = shared.store.put_now(id, snapshot) {
            tracing::error!(artifact = id, "{}", e);
            rec.status = DownloadStatus::Failed;
            rec.record_error(e.to_string());
            label = EventLabel::Failed;
        }
    }
    if label == EventLabel::Completed {
        tracing::info!(artifact = id, "download completed");
    }
    st.enqueue(id, label);
    deliver(&shared.bus, id, slot, st);
}

/// Feeds streaming progress into the record and the journal, emitting
/// throttled `chunk` events.
pub(super) struct ProgressObserver<'a> {
    shared: &'a Shared,
    id: &'a str,
    slot: &'a ArtifactSlot,
    last_emit: Cell<Instant>,
    store_error: RefCell<Option<StoreError>>,
}

impl<'a> ProgressObserver<'a> {
    /// `switched_at` is when the file-switch `chunk` went out; streamed
    /// progress is throttled from there.
    pub(super) fn new(shared: &'a Shared, id: &'a str, slot: &'a ArtifactSlot, switched_at: Instant) -> Self {
        Self {
            shared,
            id,
            slot,
            last_emit: Cell::new(switched_at),
            store_error: RefCell::new(None),
        }
    }
}

impl TransferObserver for ProgressObserver<'_> {
    fn on_progress(&self, downloaded: u64, total: u64, mirror: &str) {
        let mut st = self.slot.lock();
        let Some(rec) = st.record.as_mut() else {
            return;
        };
        rec.record_progress(downloaded, total);
        if rec.chosen_mirror.as_deref() != Some(mirror) {
            rec.chosen_mirror = Some(mirror.to_string());
        }
        rec.last_update_at = Some(self.shared.clock.wall());
        let snapshot = rec.clone();
        if let Err(e) = self.shared.store.put(self.id, snapshot) {
            tracing::error!(artifact = self.id, "{}", e);
            self.store_error.borrow_mut().get_or_insert(e);
        }

        let now = self.shared.clock.now();
        if now.saturating_duration_since(self.last_emit.get()) >= self.shared.progress_interval {
            self.last_emit.set(now);
            st.enqueue(self.id, EventLabel::Chunk);
            deliver(&self.shared.bus, self.id, self.slot, st);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.slot.control.pending().is_some() || self.store_error.borrow().is_some()
    }
}
