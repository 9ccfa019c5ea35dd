#![allow(dead_code)]

pub mod mirror_server;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mfetch_core::catalog::{Artifact, Catalog};
use mfetch_core::clock::{Clock, ManualClock};
use mfetch_core::coordinator::{Coordinator, DEFAULT_PROGRESS_INTERVAL};
use mfetch_core::events::{DownloadEvent, EventLabel, Topic};
use mfetch_core::layout::ModelLayout;
use mfetch_core::mirror::MirrorPolicy;
use mfetch_core::state_store::StateStore;
use mfetch_core::transfer::TransferEngine;

pub const MIB: usize = 1024 * 1024;

/// Deterministic, non-repeating-looking payload.
pub fn body(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2654435761).rotate_left(seed as u32 % 31) as u8 ^ seed)
        .collect()
}

/// Coordinator over `root` with a virtual clock, so retry backoffs return at once.
pub fn coordinator(root: &Path, mirrors: &[&str], artifacts: Vec<Artifact>) -> (Coordinator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let layout = ModelLayout::new(root);
    let store = StateStore::open(layout.state_path(), clock.clone() as Arc<dyn Clock>).unwrap();
    let policy = Arc::new(MirrorPolicy::new(mirrors.iter().copied()).unwrap());
    let engine = TransferEngine::new(policy, clock.clone());
    let catalog = Catalog::from_artifacts(artifacts).unwrap();
    let coordinator = Coordinator::new(catalog, layout, store, engine, clock.clone(), DEFAULT_PROGRESS_INTERVAL);
    (coordinator, clock)
}

/// Collect every event label published for `id`.
pub fn record_labels(c: &Coordinator, id: &str) -> Arc<Mutex<Vec<EventLabel>>> {
    let labels = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&labels);
    c.subscribe(Topic::key(id), move |ev: &DownloadEvent| sink.lock().unwrap().push(ev.label));
    labels
}

/// Poll `cond` every 10 ms; panics after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(10));
    }
}
