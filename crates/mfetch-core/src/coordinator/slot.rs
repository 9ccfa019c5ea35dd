//! Per-artifact record, worker handle and ordered event delivery.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::thread::JoinHandle;

use crate::events::{DownloadEvent, EventBus, EventLabel};
use crate::state_store::DownloadRecord;

use super::control::WorkerControl;

pub(crate) struct SlotState {
    pub record: Option<DownloadRecord>,
    pending: VecDeque<DownloadEvent>,
    delivering: bool,
}

impl SlotState {
    /// Queue an event carrying the current record. Delivered by `deliver`
    /// after the lock is released.
    pub fn enqueue(&mut self, id: &str, label: EventLabel) {
        if let Some(rec) = &self.record {
            self.pending
                .push_back(DownloadEvent::new(id, label, rec.clone()));
        }
    }
}

pub(crate) struct ArtifactSlot {
    state: Mutex<SlotState>,
    pub control: WorkerControl,
    pub worker: Mutex<Option<JoinHandle<()>>>,
}

impl ArtifactSlot {
    pub fn new(record: Option<DownloadRecord>) -> Self {
        Self {
            state: Mutex::new(SlotState {
                record,
                pending: VecDeque::new(),
                delivering: false,
            }),
            control: WorkerControl::default(),
            worker: Mutex::new(None),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock()
    }

    pub fn snapshot(&self) -> Option<DownloadRecord> {
        self.state.lock().record.clone()
    }
}

/// Release the slot lock and publish queued events in queue order.
///
/// Only one thread delivers for a slot at a time; a thread that finds
/// delivery in progress leaves its events to that thread. Callbacks run
/// without the slot lock, so they may call back into the coordinator.
pub(crate) fn deliver<'a>(
    bus: &EventBus<DownloadEvent>,
    id: &str,
    slot: &'a ArtifactSlot,
    mut st: MutexGuard<'a, SlotState>,
) {
    if st.delivering {
        return;
    }
    st.delivering = true;
    loop {
        let Some(event) = st.pending.pop_front() else {
            st.delivering = false;
            return;
        };
        drop(st);
        bus.publish(id, &event);
        st = slot.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topic;
    use std::sync::Arc;

    #[test]
    fn reentrant_publish_keeps_order() {
        let bus: Arc<EventBus<DownloadEvent>> = Arc::new(EventBus::new());
        let slot = Arc::new(ArtifactSlot::new(Some(DownloadRecord::default())));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let (b, s, log) = (Arc::clone(&bus), Arc::clone(&slot), Arc::clone(&seen));
        bus.subscribe(Topic::key("a"), move |ev: &DownloadEvent| {
            log.lock().unwrap().push(ev.label);
            if ev.label == EventLabel::Started {
                // Publishing from inside a callback must not deadlock.
                let mut st = s.lock();
                st.enqueue("a", EventLabel::Cancelled);
                deliver(&b, "a", &s, st);
            }
        });

        let mut st = slot.lock();
        st.enqueue("a", EventLabel::Started);
        st.enqueue("a", EventLabel::Chunk);
        deliver(&bus, "a", &slot, st);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventLabel::Started, EventLabel::Chunk, EventLabel::Cancelled]
        );
    }
}
