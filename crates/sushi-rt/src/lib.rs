//! Lock-free event queues and RT/non-RT handshake primitives (C3).
//!
//! Non-RT ↔ RT communication uses only bounded SPSC lock-free queues and
//! atomic variables (§5) — this crate is where that rule lives.

pub mod deletion;
pub mod handshake;
pub mod queue;

pub use deletion::{DeletionQueue, DeletionQueueHandle};
pub use handshake::{handshake, Signal, Waiter};
pub use queue::{event_channel, EventConsumer, EventProducer};

use sushi_core::rt_event::{Notification, RtEvent};

/// Producer half of the *to-RT* queue (§3): non-RT threads push, the engine
/// drains at the start of every chunk.
pub type ToRtProducer = EventProducer<RtEvent>;
pub type ToRtConsumer = EventConsumer<RtEvent>;

/// Producer half of the *from-RT* queue (§3): the engine publishes
/// notifications, the Event Dispatcher drains them on a non-RT thread.
pub type FromRtProducer = EventProducer<Notification>;
pub type FromRtConsumer = EventConsumer<Notification>;

pub fn to_rt_channel(capacity: usize) -> (ToRtProducer, ToRtConsumer) {
    event_channel(capacity)
}

pub fn from_rt_channel(capacity: usize) -> (FromRtProducer, FromRtConsumer) {
    event_channel(capacity)
}
