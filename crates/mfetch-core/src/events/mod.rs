//! Topic-keyed publish/subscribe with synchronous delivery.
//!
//! `publish` snapshots the matching subscribers under the bus lock and calls
//! them outside it, on the publisher's thread. A slow callback therefore
//! slows the publisher; a panicking callback is logged and skipped while
//! delivery to the rest continues.

mod payload;

pub use payload::{DownloadEvent, EventLabel};

use parking_lot::{Mutex, MutexGuard};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared callback type.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every published event.
    All,
    /// Events published under this key (an artifact id).
    Key(String),
}

impl Topic {
    pub fn key(key: impl Into<String>) -> Self {
        Topic::Key(key.into())
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            Topic::All => true,
            Topic::Key(k) => k == key,
        }
    }
}

struct Subscriber<T> {
    id: SubscriptionId,
    topic: Topic,
    callback: Callback<T>,
}

pub struct EventBus<T> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscriber {
            id,
            topic,
            callback: Arc::new(callback),
        });
        id
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `payload` to every subscriber of `key` and of `Topic::All`.
    /// Returns the number of callbacks that completed without panicking.
    pub fn publish(&self, key: &str, payload: &T) -> usize {
        let targets: Vec<(SubscriptionId, Callback<T>)> = self
            .lock()
            .iter()
            .filter(|s| s.topic.matches(key))
            .map(|s| (s.id, Arc::clone(&s.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    let msg = cause
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| cause.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic".to_string());
                    tracing::warn!(subscription = id.0, topic = key, "subscriber panicked: {}", msg);
                }
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber<T>>> {
        self.subscribers.lock()
    }
}
