//! Lock-free Event Queues (C3): single-producer/single-consumer FIFOs
//! linking non-RT threads to the RT thread and back. Bounded, pre-allocated,
//! never allocate past construction (§3, §5).

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};

/// Producer side of an SPSC queue. `push` never blocks and never allocates;
/// a full queue drops the event and bumps [`EventProducer::dropped_count`]
/// rather than failing the caller loudly (§4.5: "dropped events are counted
/// and surfaced as a non-fatal warning").
pub struct EventProducer<T> {
    producer: HeapProd<T>,
    dropped: std::sync::Arc<AtomicU64>,
}

impl<T> EventProducer<T> {
    /// Returns `true` if the event was enqueued, `false` if the queue was
    /// full (the event was dropped and the drop counter incremented).
    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        match self.producer.try_push(value) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of an SPSC queue.
pub struct EventConsumer<T> {
    consumer: HeapCons<T>,
}

impl<T> EventConsumer<T> {
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.consumer.try_pop()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    #[inline]
    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Drain up to `max` pending items, applying `f` to each in FIFO order.
    /// Used at chunk start to bound how much of the queue one chunk drains
    /// (§4.5 step 2: "drain the to-RT queue up to its current size").
    pub fn drain_up_to(&mut self, max: usize, mut f: impl FnMut(T)) -> usize {
        let mut count = 0;
        while count < max {
            match self.consumer.try_pop() {
                Some(value) => {
                    f(value);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }
}

/// Construct a bounded SPSC channel sized at `capacity`, with a shared
/// dropped-event counter the producer bumps on overflow.
pub fn event_channel<T>(capacity: usize) -> (EventProducer<T>, EventConsumer<T>) {
    let rb = HeapRb::new(capacity);
    let (producer, consumer) = rb.split();
    let dropped = std::sync::Arc::new(AtomicU64::new(0));
    (
        EventProducer {
            producer,
            dropped: dropped.clone(),
        },
        EventConsumer { consumer },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trips_in_order() {
        let (mut tx, mut rx) = event_channel::<u32>(4);
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn overflow_drops_and_counts() {
        let (mut tx, _rx) = event_channel::<u32>(2);
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert!(!tx.push(3));
        assert_eq!(tx.dropped_count(), 1);
    }

    #[test]
    fn drain_up_to_respects_bound() {
        let (mut tx, mut rx) = event_channel::<u32>(8);
        for i in 0..5 {
            tx.push(i);
        }
        let mut drained = Vec::new();
        let count = rx.drain_up_to(3, |v| drained.push(v));
        assert_eq!(count, 3);
        assert_eq!(drained, vec![0, 1, 2]);
        assert_eq!(rx.occupied_len(), 2);
    }
}
