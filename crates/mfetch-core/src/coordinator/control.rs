//! Stop requests for a running worker.
//!
//! The worker polls these flags at every chunk boundary and between backoff
//! slices, so `pause` and `cancel` never wait on the worker.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub(crate) struct WorkerControl {
    active: AtomicBool,
    pause: AtomicBool,
    cancel: AtomicBool,
}

/// What the worker should do when it stops early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRequest {
    Pause,
    Cancel,
}

impl WorkerControl {
    /// Mark a worker as running with no pending stop request.
    pub fn arm(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    /// Mark the worker as gone. Pending requests are dropped.
    pub fn disarm(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns false when no worker is running.
    pub fn request(&self, req: StopRequest) -> bool {
        if !self.is_active() {
            return false;
        }
        match req {
            StopRequest::Pause => self.pause.store(true, Ordering::SeqCst),
            StopRequest::Cancel => self.cancel.store(true, Ordering::SeqCst),
        }
        true
    }

    /// Cancel wins over pause when both were requested.
    pub fn pending(&self) -> Option<StopRequest> {
        if self.cancel.load(Ordering::SeqCst) {
            Some(StopRequest::Cancel)
        } else if self.pause.load(Ordering::SeqCst) {
            Some(StopRequest::Pause)
        } else {
            None
        }
    }
}
