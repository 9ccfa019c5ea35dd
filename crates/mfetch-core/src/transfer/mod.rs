//! Single-file transfer engine: resumable ranged GET with per-mirror retry,
//! mirror rotation, and whole-file integrity check.
//!
//! Bytes go to `<target>.tmp` in append mode, so the temp file length is the
//! resume offset. A finished file is hashed (when a digest is declared), then
//! fsynced and renamed into place. The engine returns a terminal outcome;
//! only local I/O failures surface as `Err`.

mod attempt;
mod headers;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::FileDescriptor;
use crate::checksum;
use crate::clock::Clock;
use crate::config::TransferConfig;
use crate::mirror::MirrorPolicy;
use crate::retry::{classify, AttemptError, RetryDecision, RetryPolicy};
use crate::storage::{self, TempFileWriter};

use attempt::{run_attempt, Attempt, AttemptOutcome};

/// Backoff sleeps are split into slices of this length so a pause or cancel
/// does not wait for the whole delay.
const BACKOFF_SLICE: Duration = Duration::from_millis(250);

/// Receives streaming progress and answers cancellation polls. Called on the
/// transfer thread after every chunk.
pub trait TransferObserver {
    fn on_progress(&self, downloaded: u64, total: u64, mirror: &str);
    fn is_cancelled(&self) -> bool;
}

/// One file to fetch for an artifact.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub artifact_id: &'a str,
    pub file: &'a FileDescriptor,
    /// Final path; the temp file is this path plus `.tmp`.
    pub target: &'a Path,
}

/// Terminal outcome of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// File verified and renamed into place.
    Done { bytes: u64, mirror: String },
    /// Stopped at a chunk boundary; the temp file is kept.
    Cancelled { downloaded: u64 },
    /// The last mirror delivered bytes that failed the hash check.
    Poisoned { message: String },
    /// Every mirror used its retry budget.
    Exhausted { message: String },
}

pub struct TransferEngine {
    mirrors: Arc<MirrorPolicy>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    config: TransferConfig,
    user_agent: String,
}

impl TransferEngine {
    pub fn new(mirrors: Arc<MirrorPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            mirrors,
            clock,
            retry: RetryPolicy::default(),
            config: TransferConfig::default(),
            user_agent: format!("mfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn mirrors(&self) -> &MirrorPolicy {
        &self.mirrors
    }

    /// Download one file, resuming from its temp file.
    ///
    /// Transient failures are retried on the same mirror with exponential
    /// backoff; once a mirror's attempts are used up, or it answers with a
    /// permanent error or bad bytes, the artifact's mirror choice is rotated.
    /// At most one full rotation is made.
    pub fn fetch(&self, req: &TransferRequest<'_>, observer: &dyn TransferObserver) -> Result<TransferOutcome> {
        let temp = storage::temp_path(req.target);
        let mut last_error: Option<String> = None;
        let mut poisoned = false;

        for round in 0..self.mirrors.len() {
            if round > 0 {
                let next = self.mirrors.rotate(req.artifact_id);
                tracing::warn!(artifact = req.artifact_id, file = %req.file.path, mirror = %next, "rotating to next mirror");
            }
            let resolved = self.mirrors.resolve(req.artifact_id, req.file);
            let mut attempt_no = 0u32;

            loop {
                attempt_no += 1;
                if observer.is_cancelled() {
                    return Ok(TransferOutcome::Cancelled {
                        downloaded: storage::file_len(&temp)?,
                    });
                }
                let mut writer = TempFileWriter::open_append(&temp)
                    .with_context(|| format!("open {}", temp.display()))?;
                let offset = writer.len();
                tracing::debug!(
                    artifact = req.artifact_id,
                    url = %resolved.url,
                    offset,
                    attempt = attempt_no,
                    "GET"
                );

                let attempt = Attempt {
                    artifact_id: req.artifact_id,
                    mirror: &resolved.mirror,
                    url: &resolved.url,
                    expected_size: req.file.size,
                    user_agent: &self.user_agent,
                    config: &self.config,
                };
                let result = run_attempt(&attempt, &mut writer, &self.mirrors, observer);
                let err = match result {
                    Ok(AttemptOutcome::Cancelled { downloaded }) => {
                        writer.sync().with_context(|| format!("sync {}", temp.display()))?;
                        return Ok(TransferOutcome::Cancelled { downloaded });
                    }
                    Ok(AttemptOutcome::Eof { .. }) => {
                        writer.sync().with_context(|| format!("sync {}", temp.display()))?;
                        drop(writer);
                        match self.verify_and_finalize(req, &temp)? {
                            None => return self.done(req, &resolved.mirror),
                            Some(message) => {
                                tracing::warn!(artifact = req.artifact_id, mirror = %resolved.mirror, "{}", message);
                                poisoned = true;
                                last_error = Some(message);
                                break;
                            }
                        }
                    }
                    Err(AttemptError::RangeNotSatisfiable { offset }) if req.file.size > 0 && offset == req.file.size => {
                        // The temp file already holds every byte.
                        drop(writer);
                        match self.verify_and_finalize(req, &temp)? {
                            None => return self.done(req, &resolved.mirror),
                            Some(message) => {
                                poisoned = true;
                                last_error = Some(message);
                                break;
                            }
                        }
                    }
                    Err(AttemptError::RangeNotSatisfiable { offset }) => {
                        drop(writer);
                        tracing::warn!(artifact = req.artifact_id, offset, "origin rejected resume offset, discarding temp file");
                        storage::remove_if_exists(&temp)
                            .with_context(|| format!("remove {}", temp.display()))?;
                        AttemptError::RangeNotSatisfiable { offset }
                    }
                    Err(AttemptError::Storage(e)) => {
                        return Err(anyhow::Error::new(e).context(format!("write {}", temp.display())));
                    }
                    Err(e) => e,
                };

                let kind = classify(&err);
                poisoned = false;
                last_error = Some(format!("{}: {}", resolved.mirror, err));
                match self.retry.decide(attempt_no, kind) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            artifact = req.artifact_id,
                            mirror = %resolved.mirror,
                            attempt = attempt_no,
                            "attempt failed ({}), retrying in {:?}",
                            err,
                            delay
                        );
                        if self.backoff(delay, observer) {
                            return Ok(TransferOutcome::Cancelled {
                                downloaded: storage::file_len(&temp)?,
                            });
                        }
                    }
                    RetryDecision::NoRetry => {
                        tracing::warn!(
                            artifact = req.artifact_id,
                            mirror = %resolved.mirror,
                            attempt = attempt_no,
                            "giving up on mirror: {}",
                            err
                        );
                        break;
                    }
                }
            }
        }

        let message = last_error.unwrap_or_else(|| "no mirror could serve the file".to_string());
        Ok(if poisoned {
            TransferOutcome::Poisoned { message }
        } else {
            TransferOutcome::Exhausted { message }
        })
    }

    /// Check the whole-file digest and publish the temp file. Returns the
    /// mismatch message (temp file already removed) instead of publishing
    /// when the digest does not match.
    fn verify_and_finalize(&self, req: &TransferRequest<'_>, temp: &Path) -> Result<Option<String>> {
        if let Some(expected) = req.file.sha256.as_deref() {
            let actual = checksum::sha256_path(temp)?;
            if !checksum::digest_matches(expected, &actual) {
                storage::remove_if_exists(temp).with_context(|| format!("remove {}", temp.display()))?;
                return Ok(Some(format!(
                    "integrity mismatch for {}: expected sha256 {}, got {}",
                    req.file.path, expected, actual
                )));
            }
        }
        storage::finalize(temp, req.target)
            .with_context(|| format!("rename {} -> {}", temp.display(), req.target.display()))?;
        Ok(None)
    }

    fn done(&self, req: &TransferRequest<'_>, mirror: &str) -> Result<TransferOutcome> {
        let bytes = storage::file_len(req.target)?;
        tracing::info!(artifact = req.artifact_id, file = %req.file.path, bytes, mirror, "file complete");
        Ok(TransferOutcome::Done {
            bytes,
            mirror: mirror.to_string(),
        })
    }

    /// Sleep `delay` through the clock. Returns true if cancelled meanwhile.
    fn backoff(&self, delay: Duration, observer: &dyn TransferObserver) -> bool {
        let mut left = delay;
        while !left.is_zero() {
            if observer.is_cancelled() {
                return true;
            }
            let step = left.min(BACKOFF_SLICE);
            self.clock.sleep(step);
            left -= step;
        }
        observer.is_cancelled()
    }
}
