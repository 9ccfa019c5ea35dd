//! One GET against one mirror, appending the body to the temp file.

use std::cell::{Cell, RefCell};
use std::str;

use crate::config::TransferConfig;
use crate::mirror::MirrorPolicy;
use crate::retry::AttemptError;
use crate::storage::TempFileWriter;

use super::headers::ResponseHead;
use super::TransferObserver;

/// How an attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AttemptOutcome {
    /// Body fully received; the temp file holds `total` bytes.
    Eof { total: u64 },
    /// The observer asked to stop; `downloaded` bytes are on disk.
    Cancelled { downloaded: u64 },
}

pub(super) struct Attempt<'a> {
    pub artifact_id: &'a str,
    pub mirror: &'a str,
    pub url: &'a str,
    /// Size from the catalog, used when the response advertises none (0 = unknown).
    pub expected_size: u64,
    pub user_agent: &'a str,
    pub config: &'a TransferConfig,
}

/// GET `url` from the writer's current length. 200/206 bodies are appended;
/// anything else is read and discarded and reported as an error afterwards.
pub(super) fn run_attempt(
    a: &Attempt<'_>,
    writer: &mut TempFileWriter,
    mirrors: &MirrorPolicy,
    observer: &dyn TransferObserver,
) -> Result<AttemptOutcome, AttemptError> {
    let offset = writer.len();
    let head = RefCell::new(ResponseHead::default());
    let failure: RefCell<Option<AttemptError>> = RefCell::new(None);
    let cancelled = Cell::new(false);
    let total = Cell::new(a.expected_size);

    let mut easy = curl::easy::Easy::new();
    easy.url(a.url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.useragent(a.user_agent)?;
    easy.buffer_size(a.config.chunk_size)?;
    easy.connect_timeout(a.config.connect_timeout())?;
    // No byte for idle_timeout seconds counts as a timeout.
    easy.low_speed_limit(1)?;
    easy.low_speed_time(a.config.idle_timeout())?;
    easy.progress(true)?;
    if offset > 0 {
        easy.range(&format!("{}-", offset))?;
    }

    let perform_result = {
        let mut started = false;
        let mut accepting = false;
        let mut preferred = false;
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = str::from_utf8(data) {
                head.borrow_mut().feed_line(line);
            }
            true
        })?;
        transfer.write_function(|data| {
            if !started {
                started = true;
                let h = head.borrow();
                match h.status {
                    Some(206) => {
                        if let Some(range) = h.content_range {
                            if range.start != offset {
                                *failure.borrow_mut() = Some(AttemptError::RangeMismatch {
                                    requested: offset,
                                    got: range.start,
                                });
                                return Ok(0);
                            }
                        }
                        accepting = true;
                    }
                    Some(200) => {
                        if offset > 0 {
                            tracing::warn!(
                                artifact = a.artifact_id,
                                mirror = a.mirror,
                                offset,
                                "origin ignored range request, restarting file from zero"
                            );
                            if let Err(e) = writer.truncate() {
                                *failure.borrow_mut() = Some(AttemptError::Storage(e));
                                return Ok(0);
                            }
                        }
                        accepting = true;
                    }
                    _ => {}
                }
                if let Some(t) = h.total_size(offset) {
                    total.set(t);
                }
            }
            if !accepting {
                return Ok(data.len());
            }
            if let Err(e) = writer.append(data) {
                *failure.borrow_mut() = Some(AttemptError::Storage(e));
                return Ok(0);
            }
            if !preferred {
                preferred = true;
                mirrors.prefer(a.artifact_id, a.mirror);
            }
            observer.on_progress(writer.len(), total.get(), a.mirror);
            if observer.is_cancelled() {
                cancelled.set(true);
                return Ok(0);
            }
            Ok(data.len())
        })?;
        // Also polled while the socket is idle, so a stalled origin does not delay a cancel.
        transfer.progress_function(|_, _, _, _| {
            if observer.is_cancelled() {
                cancelled.set(true);
                return false;
            }
            true
        })?;
        transfer.perform()
    };

    if cancelled.get() {
        return Ok(AttemptOutcome::Cancelled {
            downloaded: writer.len(),
        });
    }
    if let Some(err) = failure.into_inner() {
        return Err(err);
    }
    perform_result?;

    let code = easy.response_code()?;
    match code {
        200 | 206 => {}
        416 => return Err(AttemptError::RangeNotSatisfiable { offset }),
        c => return Err(AttemptError::Http(c)),
    }

    let received = writer.len();
    let expected = total.get();
    if expected > 0 && received < expected {
        return Err(AttemptError::PartialTransfer { expected, received });
    }
    Ok(AttemptOutcome::Eof { total: received })
}
