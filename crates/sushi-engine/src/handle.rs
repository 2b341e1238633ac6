//! Non-RT handle to a running [`AudioEngine`] (§5).
//!
//! An `AudioEngine` is moved, by value, into whichever thread actually calls
//! [`AudioEngine::process_chunk`] (a `cpal` callback, an offline loop, a
//! host's reactive callback) — that thread owns it outright and never shares
//! it behind a lock. Every other caller (Controller, Event Dispatcher, MIDI
//! Dispatcher) instead holds an `EngineHandle`, produced alongside the engine
//! by [`AudioEngine::new`]. Every field here is either a lock-free atomic or
//! a `Mutex` that the RT thread itself never locks — mutations always go
//! through the to-RT queue, never a direct borrow of the graph.
use crate::engine::{run_state_from_u32, RunState};
use crate::snapshot::{EngineSnapshot, SnapshotReader};
use crate::timing::CpuMeter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sushi_core::config::EngineConfig;
use sushi_core::rt_event::{GraphMutation, Notification, ParameterChange, RtEventKind, TransportChange};
use sushi_core::{
    BoxedProcessor, Error, IdAllocator, ParameterId, ProcessorId, Result, RtEvent, Track, TrackId, TrackKind,
    Transport,
};
use sushi_rt::{DeletionQueueHandle, FromRtConsumer, Signal, ToRtProducer};

/// Shared non-RT handle. Cheap to clone — every clone reaches the same
/// queues, atomics and snapshot as every other (§4.5, §4.9).
#[derive(Clone)]
pub struct EngineHandle {
    to_rt_tx: Arc<Mutex<ToRtProducer>>,
    from_rt_rx: Arc<Mutex<FromRtConsumer>>,
    transport: Arc<Transport>,
    cpu_meter: Arc<CpuMeter>,
    run_state: Arc<AtomicU32>,
    realtime_enabled: Arc<AtomicBool>,
    pause_signal: Arc<Mutex<Option<Signal>>>,
    snapshot_reader: SnapshotReader,
    deletion_queue_handle: DeletionQueueHandle,
    id_alloc: Arc<IdAllocator>,
    config: EngineConfig,
}

impl EngineHandle {
    pub(crate) fn new(
        to_rt_tx: Arc<Mutex<ToRtProducer>>,
        from_rt_rx: Arc<Mutex<FromRtConsumer>>,
        transport: Arc<Transport>,
        cpu_meter: Arc<CpuMeter>,
        run_state: Arc<AtomicU32>,
        realtime_enabled: Arc<AtomicBool>,
        pause_signal: Arc<Mutex<Option<Signal>>>,
        snapshot_reader: SnapshotReader,
        deletion_queue_handle: DeletionQueueHandle,
        id_alloc: Arc<IdAllocator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            to_rt_tx,
            from_rt_rx,
            transport,
            cpu_meter,
            run_state,
            realtime_enabled,
            pause_signal,
            snapshot_reader,
            deletion_queue_handle,
            id_alloc,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub fn run_state(&self) -> RunState {
        run_state_from_u32(self.run_state.load(Ordering::Acquire))
    }

    pub fn is_realtime_enabled(&self) -> bool {
        self.realtime_enabled.load(Ordering::Acquire)
    }

    pub fn xrun_count(&self) -> u64 {
        self.cpu_meter.metrics().xrun_count
    }

    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshot_reader.load()
    }

    pub fn deletion_queue_handle(&self) -> DeletionQueueHandle {
        self.deletion_queue_handle.clone()
    }

    /// Drain up to every currently-queued notification, fed to `f` in FIFO
    /// order. The only non-RT-side access to the from-RT queue (§4.6): the RT
    /// thread only ever pushes to its own exclusive producer half.
    pub fn drain_notifications(&self, f: impl FnMut(Notification)) -> usize {
        let mut consumer = self.from_rt_rx.lock();
        let max = consumer.occupied_len();
        consumer.drain_up_to(max, f)
    }

    pub fn allocate_track_id(&self) -> TrackId {
        TrackId(self.id_alloc.next())
    }

    pub fn allocate_processor_id(&self) -> ProcessorId {
        ProcessorId(self.id_alloc.next())
    }

    /// Post a raw event to the RT thread. Returns `false` if the queue was
    /// full (§4.5: dropped events are counted, not fatal).
    pub fn post_to_rt(&self, event: RtEvent) -> bool {
        self.to_rt_tx.lock().push(event)
    }

    /// `pause(true)` blocks until the RT thread has ramped to silence and
    /// fired the handshake, or `timeout` elapses (§4.5 state machine, §4.8).
    pub fn pause(&self, paused: bool, timeout: Duration) -> bool {
        if paused {
            let (signal, waiter) = sushi_rt::handshake();
            *self.pause_signal.lock() = Some(signal);
            self.run_state.store(crate::engine::run_state_to_u32(RunState::StoppedTransient), Ordering::Release);
            waiter.wait(timeout)
        } else {
            self.run_state.store(crate::engine::run_state_to_u32(RunState::Running), Ordering::Release);
            true
        }
    }

    // ---- Graph mutations (§4.5). Always posted through the to-RT queue —
    // this handle never has exclusive access to apply anything directly, so
    // validation beyond synchronous range/shape checks is best-effort against
    // the last published snapshot; the RT thread re-checks invariants (PRE/
    // POST uniqueness) before applying (§4.5, §8).

    pub fn create_track(&self, track: Track) -> Result<()> {
        let snapshot = self.snapshot();
        if track.kind() == TrackKind::Pre && snapshot.tracks.iter().any(|t| t.kind == TrackKind::Pre) {
            return Err(Error::InvalidConfig("a PRE track already exists".into()));
        }
        if track.kind() == TrackKind::Post && snapshot.tracks.iter().any(|t| t.kind == TrackKind::Post) {
            return Err(Error::InvalidConfig("a POST track already exists".into()));
        }
        let event = RtEvent::at_chunk_start(RtEventKind::GraphMutation(GraphMutation::AddTrack { track: Box::new(track) }), 0);
        self.post_to_rt(event);
        Ok(())
    }

    pub fn delete_track(&self, id: TrackId) -> Result<()> {
        if self.snapshot().track(id).is_none() {
            return Err(Error::UnknownTrack(id.raw()));
        }
        let event = RtEvent::at_chunk_start(RtEventKind::GraphMutation(GraphMutation::RemoveTrack { track: id }), 0);
        self.post_to_rt(event);
        Ok(())
    }

    pub fn add_plugin_to_track(&self, track: TrackId, processor: BoxedProcessor) -> Result<()> {
        if self.snapshot().track(track).is_none() {
            return Err(Error::UnknownTrack(track.raw()));
        }
        let event = RtEvent::at_chunk_start(RtEventKind::GraphMutation(GraphMutation::AddProcessorToTrack { track, processor }), 0);
        self.post_to_rt(event);
        Ok(())
    }

    pub fn remove_plugin(&self, track: TrackId, processor: ProcessorId) -> Result<()> {
        if self.snapshot().track(track).is_none() {
            return Err(Error::UnknownTrack(track.raw()));
        }
        let event = RtEvent::at_chunk_start(RtEventKind::GraphMutation(GraphMutation::RemoveProcessorFromTrack { track, processor }), 0);
        self.post_to_rt(event);
        Ok(())
    }

    pub fn set_bypass(&self, processor: ProcessorId, bypassed: bool) -> Result<()> {
        self.post_to_rt(RtEvent::at_chunk_start(RtEventKind::SetBypassed { processor, bypassed }, 0));
        Ok(())
    }

    pub fn set_parameter(&self, processor: ProcessorId, parameter: ParameterId, normalized_value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&normalized_value) {
            return Err(Error::OutOfRange(normalized_value));
        }
        let kind = RtEventKind::ParameterChange(ParameterChange { processor, parameter, normalized_value });
        self.post_to_rt(RtEvent::at_chunk_start(kind, 0));
        Ok(())
    }

    pub fn set_tempo(&self, bpm: f32) -> Result<()> {
        if !Transport::is_valid_tempo(bpm) {
            return Err(Error::InvalidTempo(bpm));
        }
        self.post_to_rt(RtEvent::at_chunk_start(RtEventKind::TransportChange(TransportChange::Tempo(bpm)), 0));
        Ok(())
    }

    pub fn set_time_signature(&self, numerator: u32, denominator: u32) -> Result<()> {
        if !Transport::is_valid_time_signature(numerator, denominator) {
            return Err(Error::InvalidTimeSignature { numerator, denominator });
        }
        self.post_to_rt(RtEvent::at_chunk_start(
            RtEventKind::TransportChange(TransportChange::TimeSignature { numerator, denominator }),
            0,
        ));
        Ok(())
    }
}
