use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Bounded holding area for events awaiting delivery.
///
/// Producers push concurrently; the delivery worker drains. Insertion order
/// is preserved end to end. When the queue is full the incoming event is
/// dropped (older events keep their temporal context) and the drop counter
/// is incremented; producers are never blocked and never see an error.
pub struct EventQueue<E> {
    events: Mutex<VecDeque<E>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<E> EventQueue<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue one event. Never blocks beyond the brief internal lock.
    pub fn push(&self, event: E) {
        #[allow(clippy::expect_used)]
        let mut events = self.events.lock().expect("lock poisoned");
        if events.len() >= self.capacity {
            drop(events);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Event queue at capacity ({}), dropping incoming event",
                self.capacity
            );
            return;
        }
        events.push_back(event);
    }

    /// Atomically remove and return up to `max` events in insertion order.
    pub fn drain_up_to(&self, max: usize) -> Vec<E> {
        #[allow(clippy::expect_used)]
        let mut events = self.events.lock().expect("lock poisoned");
        let count = max.min(events.len());
        events.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let events = self.events.lock().expect("lock poisoned");
        events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
