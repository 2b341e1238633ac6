//! Event Dispatcher (C8, §4.6): a single non-RT worker thread that
//! - fans from-RT notifications out to registered posters, fairly, and
//! - holds a time-ordered queue of events due to be posted to the RT thread
//!   at a future timestamp, cancellable per-poster.
//!
//! Fairness follows the PUSH_TO_BACK design note (§9): rather than always
//! draining subscriber 0 first, the dispatcher rotates a served poster to
//! the back of its serving order after each notification so no poster is
//! starved behind a chatty one.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use sushi_core::rt_event::{Notification, RtEventKind};
use sushi_core::RtEvent;
use sushi_engine::EngineHandle;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type PosterId = u64;

/// One entry in the future-timestamp queue. Ordered by `(due_micros, seq)` so
/// that two events posted by the same poster at the same due time still
/// apply in submission order (FIFO-per-poster, §4.6).
struct ScheduledEvent {
    due_micros: u64,
    seq: u64,
    poster: PosterId,
    kind: Option<RtEventKind>,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due_micros == other.due_micros && self.seq == other.seq
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    /// Reversed so a `BinaryHeap` (a max-heap) pops the *soonest* due event.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due_micros
            .cmp(&self.due_micros)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct PosterIdAllocator {
    next: AtomicU64,
}

impl PosterIdAllocator {
    fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }
    fn next(&self) -> PosterId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

struct Shared {
    scheduled: Mutex<BinaryHeap<ScheduledEvent>>,
    seq: AtomicU64,
    subscribers: Mutex<HashMap<PosterId, Sender<Notification>>>,
    /// Serving order for PUSH_TO_BACK fairness; kept separate from the
    /// `subscribers` map's own (arbitrary) iteration order.
    serving_order: Mutex<VecDeque<PosterId>>,
    running: AtomicBool,
    id_alloc: PosterIdAllocator,
}

/// Owns the background thread described in §4.6. Dropping it stops the
/// thread; registered posters simply stop receiving notifications.
pub struct EventDispatcher {
    shared: Arc<Shared>,
    engine: EngineHandle,
    thread: Option<std::thread::JoinHandle<()>>,
    tick: Duration,
}

impl EventDispatcher {
    /// `tick` bounds dispatch latency: how often the worker wakes to drain
    /// the from-RT queue, apply due scheduled events, and drain the deletion
    /// queue. Sushi's own background worker polls on a similar short period
    /// rather than blocking, since several of its jobs (deletion, CPU
    /// timings) have no natural wakeup source of their own.
    pub fn new(engine: EngineHandle, tick: Duration) -> Self {
        let shared = Arc::new(Shared {
            scheduled: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
            serving_order: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            id_alloc: PosterIdAllocator::new(),
        });

        let worker_shared = shared.clone();
        let worker_engine = engine.clone();
        let worker_tick = tick;
        let thread = std::thread::Builder::new()
            .name("sushi-event-dispatcher".into())
            .spawn(move || run_worker(worker_shared, worker_engine, worker_tick))
            .expect("failed to spawn event dispatcher thread");

        Self {
            shared,
            engine,
            thread: Some(thread),
            tick,
        }
    }

    /// Register a new poster and return its id plus the channel it will
    /// receive notifications on. Matches §4.6 "posters keyed by id".
    pub fn register_poster(&self) -> (PosterId, Receiver<Notification>) {
        let id = self.shared.id_alloc.next();
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().insert(id, tx);
        self.shared.serving_order.lock().push_back(id);
        (id, rx)
    }

    /// Deregister a poster. Any events still scheduled under this id are
    /// dropped silently on the next worker tick (§4.6 "cancellation").
    pub fn deregister_poster(&self, poster: PosterId) {
        self.shared.subscribers.lock().remove(&poster);
        self.shared.serving_order.lock().retain(|id| *id != poster);
        self.cancel_poster(poster);
    }

    /// Queue `kind` to be posted to the RT thread once `due_micros` (engine
    /// clock time) has passed. `poster` is the id used to cancel this and
    /// any other events from the same source via [`Self::cancel_poster`].
    pub fn schedule_event(&self, poster: PosterId, due_micros: u64, kind: RtEventKind) {
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        self.shared.scheduled.lock().push(ScheduledEvent {
            due_micros,
            seq,
            poster,
            kind: Some(kind),
        });
    }

    /// Drop every event still pending for `poster`, applying none of them
    /// (§4.6: "cancellation drops pending events silently" — not "posts them
    /// early", a distinction the original engine's teardown code conflated
    /// for two of its four subscriber containers).
    pub fn cancel_poster(&self, poster: PosterId) {
        let mut heap = self.shared.scheduled.lock();
        let remaining: Vec<ScheduledEvent> = heap.drain().filter(|e| e.poster != poster).collect();
        *heap = remaining.into_iter().collect();
    }

    pub fn pending_count(&self) -> usize {
        self.shared.scheduled.lock().len()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(shared: Arc<Shared>, engine: EngineHandle, tick: Duration) {
    let started = Instant::now();
    while shared.running.load(Ordering::Acquire) {
        let now_micros = started.elapsed().as_micros() as u64;

        apply_due_events(&shared, &engine, now_micros);
        drain_notifications(&shared, &engine);
        engine.deletion_queue_handle().drain();

        std::thread::sleep(tick);
    }
}

fn apply_due_events(shared: &Shared, engine: &EngineHandle, now_micros: u64) {
    loop {
        let due = {
            let mut heap = shared.scheduled.lock();
            match heap.peek() {
                Some(top) if top.due_micros <= now_micros => heap.pop(),
                _ => None,
            }
        };
        let Some(mut event) = due else { break };
        if let Some(kind) = event.kind.take() {
            let rt_event = RtEvent::at_chunk_start(kind, now_micros);
            engine.post_to_rt(rt_event);
        }
    }
}

/// Drain the from-RT notification queue and fan each item out to every
/// registered poster, rotating the serving order afterward (PUSH_TO_BACK,
/// §9) so repeated ties always favor whoever was served least recently.
fn drain_notifications(shared: &Shared, engine: &EngineHandle) {
    let mut batch = Vec::new();
    engine.drain_notifications(|n| batch.push(n));

    for notification in batch {
        let order = shared.serving_order.lock().clone();
        let subscribers = shared.subscribers.lock();
        for poster in &order {
            if let Some(sender) = subscribers.get(poster) {
                let _ = sender.send(notification.clone());
            }
        }
        drop(subscribers);
        if let Some(first) = shared.serving_order.lock().pop_front() {
            shared.serving_order.lock().push_back(first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sushi_core::config::EngineConfig;
    use sushi_engine::AudioEngine;

    fn handle() -> EngineHandle {
        AudioEngine::new(EngineConfig::default(), 2).1
    }

    #[test]
    fn register_and_deregister_poster() {
        let dispatcher = EventDispatcher::new(handle(), Duration::from_millis(1));
        let (id, _rx) = dispatcher.register_poster();
        assert_eq!(dispatcher.shared.subscribers.lock().len(), 1);
        dispatcher.deregister_poster(id);
        assert_eq!(dispatcher.shared.subscribers.lock().len(), 0);
    }

    #[test]
    fn cancel_poster_drops_only_its_events() {
        let dispatcher = EventDispatcher::new(handle(), Duration::from_millis(50));
        dispatcher.schedule_event(1, 1_000, RtEventKind::Shutdown);
        dispatcher.schedule_event(2, 1_000, RtEventKind::Shutdown);
        assert_eq!(dispatcher.pending_count(), 2);
        dispatcher.cancel_poster(1);
        assert_eq!(dispatcher.pending_count(), 1);
    }
}
