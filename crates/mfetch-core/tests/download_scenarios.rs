//! End-to-end downloads against local mirrors: happy path, failover,
//! integrity failure, and multi-file artifacts with an optional file.

mod common;

use common::mirror_server::{self, ServerOptions};
use common::{body, coordinator, record_labels, MIB};
use mfetch_core::catalog::{Artifact, FileDescriptor};
use mfetch_core::checksum::sha256_bytes;
use mfetch_core::coordinator::StartOutcome;
use mfetch_core::events::EventLabel;
use mfetch_core::state_store::DownloadStatus;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn happy_path_single_file() {
    let payload = body(10 * MIB, 1);
    let server = mirror_server::start(vec![("a1/model.bin", payload.clone())], ServerOptions::default());
    let artifact = Artifact::new("A1", "ten mebibytes")
        .with_required(FileDescriptor::new("model.bin", "a1/model.bin", payload.len() as u64).with_sha256(sha256_bytes(&payload)));
    let root = tempdir().unwrap();
    let (c, _clock) = coordinator(root.path(), &[server.base.as_str()], vec![artifact]);
    let labels = record_labels(&c, "A1");

    assert_eq!(c.start("A1").unwrap(), StartOutcome::Accepted);
    let rec = c.wait("A1").unwrap();
    assert_eq!(rec.status, DownloadStatus::Completed, "error: {:?}", rec.last_error_message);
    assert_eq!(rec.completed_files, 1);
    assert_eq!(rec.chosen_mirror.as_deref(), Some(server.base.as_str()));

    let target = c.layout().file_path("A1", "model.bin");
    assert_eq!(std::fs::read(&target).unwrap(), payload);
    assert!(!c.layout().temp_file_path("A1", "model.bin").exists());
    assert!(c.is_installed("A1"));

    let labels = labels.lock().unwrap().clone();
    assert_eq!(labels.first(), Some(&EventLabel::Started));
    assert!(labels.contains(&EventLabel::Chunk));
    let done = labels.iter().position(|l| *l == EventLabel::FileDone).unwrap();
    assert_eq!(labels.last(), Some(&EventLabel::Completed));
    assert_eq!(done, labels.len() - 2);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].range, None);
    assert!(requests[0].user_agent.as_deref().unwrap_or("").starts_with("mfetch/"));
}

#[test]
fn failover_to_second_mirror_and_stick_to_it() {
    let f1 = body(64 * 1024, 2);
    let f2 = body(32 * 1024, 3);
    let broken = mirror_server::start(
        vec![("a/f1", f1.clone()), ("a/f2", f2.clone())],
        ServerOptions {
            force_status: Some(500),
            ..ServerOptions::default()
        },
    );
    let good = mirror_server::start(vec![("a/f1", f1.clone()), ("a/f2", f2.clone())], ServerOptions::default());
    let artifact = Artifact::new("A1", "two files")
        .with_required(FileDescriptor::new("f1", "a/f1", f1.len() as u64))
        .with_required(FileDescriptor::new("f2", "a/f2", f2.len() as u64));
    let root = tempdir().unwrap();
    let (c, clock) = coordinator(root.path(), &[broken.base.as_str(), good.base.as_str()], vec![artifact]);

    c.start("A1").unwrap();
    let rec = c.wait("A1").unwrap();
    assert_eq!(rec.status, DownloadStatus::Completed, "error: {:?}", rec.last_error_message);
    assert_eq!(rec.chosen_mirror.as_deref(), Some(good.base.as_str()));

    // Three attempts on the broken mirror with 5 s and 10 s backoffs between them.
    assert_eq!(broken.requests_for("a/f1").len(), 3);
    assert_eq!(clock.total_slept(), Duration::from_secs(15));
    // The second file goes straight to the mirror that worked.
    assert!(broken.requests_for("a/f2").is_empty());
    assert_eq!(good.requests_for("a/f2").len(), 1);

    assert_eq!(std::fs::read(c.layout().file_path("A1", "f1")).unwrap(), f1);
    assert_eq!(std::fs::read(c.layout().file_path("A1", "f2")).unwrap(), f2);
}

#[test]
fn integrity_failure_on_every_mirror_fails_artifact() {
    let served = body(128 * 1024, 4);
    let declared = sha256_bytes(b"something else entirely");
    let m1 = mirror_server::start(vec![("a/w.bin", served.clone())], ServerOptions::default());
    let m2 = mirror_server::start(vec![("a/w.bin", served.clone())], ServerOptions::default());
    let artifact = Artifact::new("A1", "bad bytes")
        .with_required(FileDescriptor::new("w.bin", "a/w.bin", served.len() as u64).with_sha256(declared));
    let root = tempdir().unwrap();
    let (c, clock) = coordinator(root.path(), &[m1.base.as_str(), m2.base.as_str()], vec![artifact]);
    let labels = record_labels(&c, "A1");

    c.start("A1").unwrap();
    let rec = c.wait("A1").unwrap();
    assert_eq!(rec.status, DownloadStatus::Failed);
    let message = rec.last_error_message.unwrap_or_default();
    assert!(message.contains("integrity"), "message: {}", message);

    // One attempt per mirror, no backoff, temp file discarded.
    assert_eq!(m1.requests().len(), 1);
    assert_eq!(m2.requests().len(), 1);
    assert_eq!(clock.total_slept(), Duration::ZERO);
    assert!(!c.layout().temp_file_path("A1", "w.bin").exists());
    assert!(!c.layout().file_path("A1", "w.bin").exists());
    assert_eq!(labels.lock().unwrap().last(), Some(&EventLabel::Failed));
}

#[test]
fn missing_optional_file_is_a_warning() {
    let f1 = body(100 * 1024, 5);
    let f2 = body(200 * 1024, 6);
    let server = mirror_server::start(vec![("a2/f1", f1.clone()), ("a2/f2", f2.clone())], ServerOptions::default());
    let artifact = Artifact::new("A2", "multi-file")
        .with_required(FileDescriptor::new("f1", "a2/f1", f1.len() as u64))
        .with_required(FileDescriptor::new("f2", "a2/f2", f2.len() as u64))
        .with_optional(FileDescriptor::new("f3", "a2/f3", 50 * 1024));
    let root = tempdir().unwrap();
    let (c, _clock) = coordinator(root.path(), &[server.base.as_str()], vec![artifact]);
    let labels = record_labels(&c, "A2");

    c.start("A2").unwrap();
    let rec = c.wait("A2").unwrap();
    assert_eq!(rec.status, DownloadStatus::Completed);
    assert_eq!(rec.total_files, 2);
    assert_eq!(rec.completed_files, 2);
    assert_eq!(rec.warnings.len(), 1);
    assert!(rec.warnings[0].starts_with("f3"));
    assert!(rec.completed_optional_paths.is_empty());

    let layout = c.layout();
    assert_eq!(std::fs::read(layout.file_path("A2", "f1")).unwrap(), f1);
    assert_eq!(std::fs::read(layout.file_path("A2", "f2")).unwrap(), f2);
    assert!(!layout.file_path("A2", "f3").exists());

    let labels = labels.lock().unwrap().clone();
    assert_eq!(labels.iter().filter(|l| **l == EventLabel::FileDone).count(), 2);
    assert!(labels.contains(&EventLabel::FileSkipped));
    assert_eq!(labels.last(), Some(&EventLabel::Completed));
}

#[test]
fn completed_files_on_disk_are_not_fetched_again() {
    let payload = body(48 * 1024, 7);
    let server = mirror_server::start(vec![("a/x", payload.clone())], ServerOptions::default());
    let artifact = Artifact::new("A3", "present")
        .with_required(FileDescriptor::new("x", "a/x", payload.len() as u64).with_sha256(sha256_bytes(&payload)));
    let root = tempdir().unwrap();
    let (c, _clock) = coordinator(root.path(), &[server.base.as_str()], vec![artifact]);

    c.start("A3").unwrap();
    assert_eq!(c.wait("A3").unwrap().status, DownloadStatus::Completed);
    c.start("A3").unwrap();
    assert_eq!(c.wait("A3").unwrap().status, DownloadStatus::Completed);
    assert_eq!(server.requests().len(), 1);
}
