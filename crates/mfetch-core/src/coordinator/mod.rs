//! Download coordinator: the single entry point for starting, pausing,
//! resuming and cancelling artifact downloads.
//!
//! One worker thread per active artifact. Each artifact has a slot holding
//! its record under a mutex; control calls and the worker mutate the record
//! under that mutex, write the journal, and queue an event before releasing
//! it. Events are published after the lock is dropped, in queue order.

mod control;
mod slot;
mod worker;


use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Artifact, Catalog};
use crate::clock::{Clock, SystemClock};
use crate::config::FetchConfig;
use crate::events::{DownloadEvent, EventBus, EventLabel, SubscriptionId, Topic};
use crate::layout::ModelLayout;
use crate::mirror::MirrorPolicy;
use crate::retry::RetryPolicy;
use crate::state_store::{DownloadRecord, DownloadStatus, StateStore, StoreError};
use crate::storage;
use crate::transfer::TransferEngine;

use control::StopRequest;
use slot::{deliver, ArtifactSlot, SlotState};

/// Default spacing of streaming progress events per file.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Accepted,
    AlreadyActive,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Accepted,
    NotPaused,
    Unknown,
}

/// Result of `pause` and `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// A worker is running; it will stop at its next chunk boundary.
    Requested,
    /// No worker was running; the record was reset right away (cancel only).
    Cancelled,
    /// Nothing to stop.
    NotActive,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("spawning download worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("removing temp files: {0}")]
    Cleanup(#[source] std::io::Error),
}

pub(crate) struct Shared {
    catalog: Catalog,
    layout: ModelLayout,
    store: StateStore,
    engine: TransferEngine,
    bus: EventBus<DownloadEvent>,
    clock: Arc<dyn Clock>,
    progress_interval: Duration,
    slots: Mutex<HashMap<String, Arc<ArtifactSlot>>>,
}

impl Shared {
    fn slot(&self, id: &str) -> Arc<ArtifactSlot> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(ArtifactSlot::new(self.store.get(id)))),
        )
    }

    /// Copy into `rec` the completed paths of `prev` whose files are still on disk.
    fn carry_present_files(&self, artifact: &Artifact, prev: &DownloadRecord, rec: &mut DownloadRecord) {
        let id = artifact.id.as_str();
        for p in &prev.completed_file_paths {
            if artifact.required.iter().any(|f| &f.path == p) && self.layout.file_path(id, p).is_file() {
                rec.mark_file_done(p);
            }
        }
        for p in &prev.completed_optional_paths {
            if artifact.optional.iter().any(|f| &f.path == p) && self.layout.file_path(id, p).is_file() {
                rec.completed_optional_paths.insert(p.clone());
            }
        }
    }

    /// A control operation could not write the journal: the in-memory record
    /// becomes `failed` (the journal keeps its last durable state) and a
    /// `failed` event goes out.
    fn persistence_failed<'a>(
        &self,
        id: &str,
        slot: &'a ArtifactSlot,
        mut st: MutexGuard<'a, SlotState>,
        mut rec: DownloadRecord,
        err: &StoreError,
    ) {
        tracing::error!(artifact = id, "{}", err);
        let now = self.clock.wall();
        rec.status = DownloadStatus::Failed;
        rec.record_error(err.to_string());
        rec.last_update_at = Some(now);
        rec.ended_at = Some(now);
        st.record = Some(rec);
        st.enqueue(id, EventLabel::Failed);
        deliver(&self.bus, id, slot, st);
    }

    /// Delete every temp file the artifact may have left behind.
    fn remove_temp_files(&self, artifact: &Artifact) -> std::io::Result<()> {
        for f in artifact.files() {
            let tmp = self.layout.temp_file_path(&artifact.id, &f.path);
            if storage::remove_if_exists(&tmp)? {
                tracing::debug!(artifact = %artifact.id, path = %tmp.display(), "removed temp file");
            }
        }
        Ok(())
    }
}

pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(
        catalog: Catalog,
        layout: ModelLayout,
        store: StateStore,
        engine: TransferEngine,
        clock: Arc<dyn Clock>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                layout,
                store,
                engine,
                bus: EventBus::new(),
                clock,
                progress_interval,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Wire everything from configuration with the system clock.
    pub fn from_config(cfg: &FetchConfig, catalog: Catalog) -> Result<Self> {
        Self::from_config_with_clock(cfg, catalog, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(cfg: &FetchConfig, catalog: Catalog, clock: Arc<dyn Clock>) -> Result<Self> {
        let root = match &cfg.root_dir {
            Some(dir) => dir.clone(),
            None => ModelLayout::default_root()?,
        };
        let layout = ModelLayout::new(root);
        let store = StateStore::open(layout.state_path(), Arc::clone(&clock))
            .with_context(|| format!("open state journal {}", layout.state_path().display()))?
            .with_coalesce_interval(cfg.persist_interval());
        let mirrors = Arc::new(MirrorPolicy::new(cfg.mirrors.iter().cloned())?);
        let engine = TransferEngine::new(mirrors, Arc::clone(&clock))
            .with_retry(RetryPolicy::from(&cfg.retry_or_default()))
            .with_config(cfg.transfer_or_default())
            .with_user_agent(cfg.user_agent.clone());
        tracing::debug!(root = %layout.root().display(), mirrors = cfg.mirrors.len(), "coordinator ready");
        Ok(Self::new(catalog, layout, store, engine, clock, cfg.progress_interval()))
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.shared.layout
    }

    pub fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }

    /// Catalog entries sorted by id.
    pub fn list_artifacts(&self) -> Vec<&Artifact> {
        let mut list = self.shared.catalog.list();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn is_installed(&self, id: &str) -> bool {
        self.shared.catalog.is_installed(id, &self.shared.layout)
    }

    pub fn status(&self, id: &str) -> Option<DownloadRecord> {
        let existing = self.shared.slots.lock().get(id).cloned();
        match existing {
            Some(slot) => slot.snapshot(),
            None => self.shared.store.get(id),
        }
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(topic, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    /// Begin (or restart) downloading an artifact.
    ///
    /// Required files recorded as completed are kept if they are still on
    /// disk; any temp file is resumed from its current length.
    pub fn start(&self, id: &str) -> Result<StartOutcome, CoordinatorError> {
        let Some(artifact) = self.shared.catalog.get(id) else {
            return Ok(StartOutcome::Unknown);
        };
        let slot = self.shared.slot(id);
        let mut st = slot.lock();
        if slot.control.is_active() || st.record.as_ref().is_some_and(DownloadRecord::is_active) {
            return Ok(StartOutcome::AlreadyActive);
        }

        let mut rec = DownloadRecord::started(self.shared.clock.wall(), artifact.required.len() as u32);
        if let Some(prev) = st.record.as_ref() {
            self.shared.carry_present_files(artifact, prev, &mut rec);
            rec.chosen_mirror = prev.chosen_mirror.clone();
            rec.extra = prev.extra.clone();
        }
        if let Err(e) = self.shared.store.put_now(id, rec.clone()) {
            self.shared.persistence_failed(id, &slot, st, rec, &e);
            return Err(e.into());
        }
        st.record = Some(rec);
        slot.control.arm();
        st.enqueue(id, EventLabel::Started);
        tracing::info!(artifact = id, "download started");

        let spawned = self.spawn_worker(id, &slot, &mut st);
        deliver(&self.shared.bus, id, &slot, st);
        spawned?;
        Ok(StartOutcome::Accepted)
    }

    /// Continue a paused download on the mirror it last used.
    pub fn resume(&self, id: &str) -> Result<ResumeOutcome, CoordinatorError> {
        let Some(artifact) = self.shared.catalog.get(id) else {
            return Ok(ResumeOutcome::Unknown);
        };
        let slot = self.shared.slot(id);
        let mut st = slot.lock();
        if slot.control.is_active() {
            return Ok(ResumeOutcome::NotPaused);
        }
        let Some(prev) = st.record.as_ref().filter(|r| r.status == DownloadStatus::Paused) else {
            return Ok(ResumeOutcome::NotPaused);
        };

        // Files recorded as done may have been removed since the pause.
        let mut rec = DownloadRecord {
            completed_files: 0,
            completed_file_paths: Default::default(),
            completed_optional_paths: Default::default(),
            ..prev.clone()
        };
        self.shared.carry_present_files(artifact, prev, &mut rec);
        if let Some(mirror) = rec.chosen_mirror.as_deref() {
            if !self.shared.engine.mirrors().prefer(id, mirror) {
                tracing::warn!(artifact = id, mirror, "remembered mirror is no longer configured");
            }
        }
        rec.status = DownloadStatus::Downloading;
        rec.last_update_at = Some(self.shared.clock.wall());
        rec.ended_at = None;
        rec.last_error_message = None;
        if let Err(e) = self.shared.store.put_now(id, rec.clone()) {
            self.shared.persistence_failed(id, &slot, st, rec, &e);
            return Err(e.into());
        }
        st.record = Some(rec);
        slot.control.arm();
        st.enqueue(id, EventLabel::Resumed);
        tracing::info!(artifact = id, "download resumed");

        let spawned = self.spawn_worker(id, &slot, &mut st);
        deliver(&self.shared.bus, id, &slot, st);
        spawned?;
        Ok(ResumeOutcome::Accepted)
    }

    /// Ask the running worker to stop at the next chunk boundary and keep its
    /// temp files. Returns without waiting; watch for the `paused` event.
    pub fn pause(&self, id: &str) -> ControlOutcome {
        if self.shared.catalog.get(id).is_none() {
            return ControlOutcome::Unknown;
        }
        if self.shared.slot(id).control.request(StopRequest::Pause) {
            tracing::info!(artifact = id, "pause requested");
            ControlOutcome::Requested
        } else {
            ControlOutcome::NotActive
        }
    }

    /// Stop the download and discard its temp files; the record returns to
    /// `idle`. A running worker is asked to stop; a paused or failed record
    /// is reset immediately.
    pub fn cancel(&self, id: &str) -> Result<ControlOutcome, CoordinatorError> {
        let Some(artifact) = self.shared.catalog.get(id) else {
            return Ok(ControlOutcome::Unknown);
        };
        let slot = self.shared.slot(id);
        if slot.control.request(StopRequest::Cancel) {
            tracing::info!(artifact = id, "cancel requested");
            return Ok(ControlOutcome::Requested);
        }

        let mut st = slot.lock();
        if slot.control.is_active() {
            // A worker was armed between the request and the lock.
            slot.control.request(StopRequest::Cancel);
            return Ok(ControlOutcome::Requested);
        }
        let resettable = matches!(
            st.record.as_ref().map(|r| r.status),
            Some(DownloadStatus::Paused | DownloadStatus::Failed)
        );
        if !resettable {
            return Ok(ControlOutcome::NotActive);
        }
        self.shared
            .remove_temp_files(artifact)
            .map_err(CoordinatorError::Cleanup)?;
        let Some(mut rec) = st.record.clone() else {
            return Ok(ControlOutcome::NotActive);
        };
        rec.reset_idle(self.shared.clock.wall());
        if let Err(e) = self.shared.store.put_now(id, rec.clone()) {
            self.shared.persistence_failed(id, &slot, st, rec, &e);
            return Err(e.into());
        }
        st.record = Some(rec);
        st.enqueue(id, EventLabel::Cancelled);
        tracing::info!(artifact = id, "download cancelled");
        deliver(&self.shared.bus, id, &slot, st);
        Ok(ControlOutcome::Cancelled)
    }

    /// Drop the journal entry of an artifact that is not downloading.
    /// Files on disk are left alone. Returns whether a record was removed.
    pub fn forget(&self, id: &str) -> Result<bool, CoordinatorError> {
        let slot = self.shared.slot(id);
        let mut st = slot.lock();
        if slot.control.is_active() {
            return Ok(false);
        }
        let removed = self.shared.store.delete(id)?;
        st.record = None;
        self.shared.engine.mirrors().forget(id);
        if removed {
            tracing::info!(artifact = id, "record forgotten");
        }
        Ok(removed)
    }

    /// Block until the artifact's worker (if any) has exited; returns the final record.
    pub fn wait(&self, id: &str) -> Option<DownloadRecord> {
        let existing = self.shared.slots.lock().get(id).cloned();
        if let Some(slot) = existing {
            let handle = slot.worker.lock().take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    tracing::error!(artifact = id, "download worker panicked");
                }
            }
        }
        self.status(id)
    }

    /// Write any coalesced journal update now.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.shared.store.flush()
    }

    fn spawn_worker(
        &self,
        id: &str,
        slot: &Arc<ArtifactSlot>,
        st: &mut MutexGuard<'_, SlotState>,
    ) -> Result<(), CoordinatorError> {
        let shared = Arc::clone(&self.shared);
        let worker_slot = Arc::clone(slot);
        let worker_id = id.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("mfetch-{}", id))
            .spawn(move || worker::run(shared, worker_id, worker_slot));
        match spawned {
            Ok(handle) => {
                // A previous worker for this slot has already disarmed; let it finish on its own.
                *slot.worker.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                slot.control.disarm();
                if let Some(rec) = st.record.as_mut() {
                    rec.status = DownloadStatus::Failed;
                    rec.record_error(format!("could not start worker: {}", e));
                    rec.ended_at = Some(self.shared.clock.wall());
                    let snapshot = rec.clone();
                    if let Err(pe) = self.shared.store.put_now(id, snapshot) {
                        tracing::error!(artifact = id, "{}", pe);
                    }
                }
                st.enqueue(id, EventLabel::Failed);
                Err(CoordinatorError::Spawn(e))
            }
        }
    }
}
