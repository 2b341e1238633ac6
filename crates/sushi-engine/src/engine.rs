//! Audio Engine (C7): owns the graph, orchestrates per-chunk processing,
//! applies routing, pumps event queues, coordinates worker threads (§4.5).
//!
//! An `AudioEngine` is produced in a pair with an [`crate::handle::EngineHandle`]
//! — the engine is moved, by value, into whichever thread drives
//! [`AudioEngine::process_chunk`] and never shares itself behind a lock; every
//! other non-RT caller holds a handle instead (§5).

use crate::connection::{ConnectionTable, ConnectionTableReader};
use crate::handle::EngineHandle;
use crate::snapshot::{EngineSnapshot, SnapshotPublisher, SnapshotReader, TrackSnapshot};
use crate::timing::CpuMeter;
use crate::worker_pool::WorkerPool;
use parking_lot::Mutex;
use sushi_core::atomic::VersionCounter;
use sushi_core::config::EngineConfig;
use sushi_core::rt_event::{GraphMutation, Notification, PlayingMode, RtEventKind, TransportChange};
use sushi_core::{
    BoxedProcessor, Clock, Error, IdAllocator, ParameterId, Processor, ProcessorId, Result,
    RtEvent, SampleBuffer, SyncMode, Track, TrackId, TrackKind, Transport, AUDIO_CHUNK_SIZE,
};
use sushi_rt::{from_rt_channel, to_rt_channel, DeletionQueue, FromRtProducer, ToRtConsumer, ToRtProducer};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    StoppedTransient,
}

pub(crate) fn run_state_to_u32(state: RunState) -> u32 {
    match state {
        RunState::Stopped => 0,
        RunState::Running => 1,
        RunState::StoppedTransient => 2,
    }
}

pub(crate) fn run_state_from_u32(value: u32) -> RunState {
    match value {
        1 => RunState::Running,
        2 => RunState::StoppedTransient,
        _ => RunState::Stopped,
    }
}

struct TrackSlot {
    track: Track,
    input: SampleBuffer<'static>,
    output: SampleBuffer<'static>,
}

impl TrackSlot {
    fn new(track: Track) -> Self {
        let channels = track.channel_count();
        Self {
            track,
            input: SampleBuffer::owning(channels),
            output: SampleBuffer::owning(channels),
        }
    }
}

/// The single entry point from any Audio Frontend, plus the non-RT mutation
/// surface described in §4.5. One `AudioEngine` owns exactly one graph, and
/// is owned in turn by exactly one thread — the one calling
/// [`AudioEngine::process_chunk`] (§5). Everything shared with an
/// [`EngineHandle`] is either a lock-free atomic or a `Mutex` the RT path
/// itself never touches.
pub struct AudioEngine {
    config: EngineConfig,
    engine_channels: usize,
    transport: Arc<Transport>,

    pre_track: Option<TrackSlot>,
    regular_tracks: Vec<TrackSlot>,
    post_track: Option<TrackSlot>,

    /// Non-RT writer, exclusive to `AudioEngine` — no production caller ever
    /// needs it from an `EngineHandle` (only test harnesses call
    /// `connection_table()` directly on the owned engine).
    connections: ConnectionTable,
    connections_reader: ConnectionTableReader,

    id_alloc: Arc<IdAllocator>,
    cpu_meter: Arc<CpuMeter>,

    /// Shared with `EngineHandle` so both it and this engine's own direct-call
    /// mutation methods (used for pre-handoff setup and by single-threaded
    /// tests) post through the same producer. The RT thread never locks this
    /// — it only ever touches `to_rt_rx`, below.
    to_rt_tx: Arc<Mutex<ToRtProducer>>,
    /// RT-exclusive consumer half — never shared, never locked.
    to_rt_rx: ToRtConsumer,
    /// RT-exclusive producer half of the from-RT queue. The matching consumer
    /// lives only on `EngineHandle`; this engine never reads its own
    /// notifications back.
    from_rt_tx: FromRtProducer,
    deletion_queue: DeletionQueue,

    version: VersionCounter,
    snapshot_publisher: SnapshotPublisher,

    run_state: Arc<AtomicU32>,
    realtime_enabled: Arc<AtomicBool>,
    pause_signal: Arc<Mutex<Option<sushi_rt::Signal>>>,

    worker_pool: Option<WorkerPool>,
    clock: Clock,

    out_buffer_internal: SampleBuffer<'static>,
    /// Per-chunk engine-input-channel sources, pre-sized to `engine_channels`
    /// at construction and overwritten in place every chunk — never
    /// reallocated on the RT path (§5, fixes the old `Vec::collect()` per
    /// chunk).
    input_source_scratch: Vec<[f32; AUDIO_CHUNK_SIZE]>,
}

impl AudioEngine {
    /// Constructs the engine together with the handle every non-RT caller
    /// should hold instead of the engine itself (§5).
    pub fn new(config: EngineConfig, engine_channels: usize) -> (Self, EngineHandle) {
        let (to_rt_tx, to_rt_rx) = to_rt_channel(config.to_rt_queue_capacity);
        let (from_rt_tx, from_rt_rx) = from_rt_channel(config.from_rt_queue_capacity);
        let worker_pool = if config.rt_cpu_cores > 1 {
            Some(WorkerPool::new(config.rt_cpu_cores))
        } else {
            None
        };
        let connections = ConnectionTable::new(engine_channels);
        let connections_reader = connections.reader();

        let transport = Arc::new(Transport::new(config.sample_rate));
        let cpu_meter = Arc::new(CpuMeter::new(config.sample_rate, AUDIO_CHUNK_SIZE));
        let id_alloc = Arc::new(IdAllocator::new());
        let to_rt_tx = Arc::new(Mutex::new(to_rt_tx));
        let run_state = Arc::new(AtomicU32::new(run_state_to_u32(RunState::Stopped)));
        let realtime_enabled = Arc::new(AtomicBool::new(false));
        let pause_signal = Arc::new(Mutex::new(None));
        let deletion_queue = DeletionQueue::new(config.deletion_queue_capacity);
        let snapshot_publisher = SnapshotPublisher::new();

        let handle = EngineHandle::new(
            to_rt_tx.clone(),
            Arc::new(Mutex::new(from_rt_rx)),
            transport.clone(),
            cpu_meter.clone(),
            run_state.clone(),
            realtime_enabled.clone(),
            pause_signal.clone(),
            snapshot_publisher.reader(),
            deletion_queue.handle(),
            id_alloc.clone(),
            config.clone(),
        );

        let engine = Self {
            cpu_meter,
            transport,
            deletion_queue,
            pre_track: None,
            regular_tracks: Vec::new(),
            post_track: None,
            connections,
            connections_reader,
            id_alloc,
            to_rt_tx,
            to_rt_rx,
            from_rt_tx,
            version: VersionCounter::new(),
            snapshot_publisher,
            run_state,
            realtime_enabled,
            pause_signal,
            worker_pool,
            clock: Clock::new(),
            out_buffer_internal: SampleBuffer::owning(engine_channels),
            input_source_scratch: vec![[0.0f32; AUDIO_CHUNK_SIZE]; engine_channels],
            engine_channels,
            config,
        };

        (engine, handle)
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.snapshot_publisher.reader()
    }

    pub fn run_state(&self) -> RunState {
        run_state_from_u32(self.run_state.load(Ordering::Acquire))
    }

    /// Post an event to the to-RT queue from any non-RT thread. Returns
    /// `false` if the event was dropped due to a full queue (§4.5: dropped
    /// events are counted, not fatal).
    pub fn post_to_rt(&self, event: RtEvent) -> bool {
        self.to_rt_tx.lock().push(event)
    }

    /// `enable_realtime(bool)` (§4.5): toggles whether graph mutations go
    /// through the RT queue, or (when `false`) apply directly — used during
    /// initial load and teardown.
    pub fn enable_realtime(&mut self, enabled: bool) {
        self.realtime_enabled.store(enabled, Ordering::Release);
        self.run_state.store(
            run_state_to_u32(if enabled { RunState::Running } else { RunState::Stopped }),
            Ordering::Release,
        );
    }

    pub fn is_realtime_enabled(&self) -> bool {
        self.realtime_enabled.load(Ordering::Acquire)
    }

    // ---- Graph mutation operations (§4.5) ----

    pub fn allocate_processor_id(&self) -> ProcessorId {
        ProcessorId(self.id_alloc.next())
    }

    pub fn allocate_track_id(&self) -> TrackId {
        TrackId(self.id_alloc.next())
    }

    /// Validates and either applies directly (realtime disabled) or posts a
    /// `GraphMutation::AddTrack` RT event (realtime enabled). The `Track` is
    /// already fully constructed off the RT thread before this is called.
    pub fn create_track(&mut self, track: Track) -> Result<()> {
        if track.kind() == TrackKind::Pre && self.pre_track.is_some() {
            return Err(Error::InvalidConfig("a PRE track already exists".into()));
        }
        if track.kind() == TrackKind::Post && self.post_track.is_some() {
            return Err(Error::InvalidConfig("a POST track already exists".into()));
        }
        if self.is_realtime_enabled() {
            let event = RtEvent::at_chunk_start(
                RtEventKind::GraphMutation(GraphMutation::AddTrack { track: Box::new(track) }),
                0,
            );
            self.post_to_rt(event);
        } else {
            self.apply_add_track(track);
        }
        Ok(())
    }

    /// Applies a queued `AddTrack` (or the direct-call path above). Re-checks
    /// PRE/POST uniqueness here too: two mutations for the same slot can both
    /// pass a caller's best-effort snapshot check before either is applied
    /// (`EngineHandle::create_track` only validates against the last
    /// published snapshot, which can be stale by the time this runs).
    fn apply_add_track(&mut self, track: Track) {
        match track.kind() {
            TrackKind::Pre if self.pre_track.is_some() => {
                self.deletion_queue.retire(track);
                return;
            }
            TrackKind::Post if self.post_track.is_some() => {
                self.deletion_queue.retire(track);
                return;
            }
            _ => {}
        }
        let id = track.id();
        match track.kind() {
            TrackKind::Pre => self.pre_track = Some(TrackSlot::new(track)),
            TrackKind::Post => self.post_track = Some(TrackSlot::new(track)),
            TrackKind::Regular => self.regular_tracks.push(TrackSlot::new(track)),
        }
        self.version.bump();
        self.refresh_snapshot();
        self.from_rt_tx.push(Notification::TrackAdded { track: id });
    }

    pub fn delete_track(&mut self, id: TrackId) -> Result<()> {
        let found = self.find_track_kind(id).ok_or(Error::UnknownTrack(id.raw()))?;
        if self.is_realtime_enabled() {
            let event = RtEvent::at_chunk_start(
                RtEventKind::GraphMutation(GraphMutation::RemoveTrack { track: id }),
                0,
            );
            self.post_to_rt(event);
        } else {
            self.apply_remove_track(id, found);
        }
        Ok(())
    }

    fn find_track_kind(&self, id: TrackId) -> Option<TrackKind> {
        if self.pre_track.as_ref().map(|s| s.track.id()) == Some(id) {
            return Some(TrackKind::Pre);
        }
        if self.post_track.as_ref().map(|s| s.track.id()) == Some(id) {
            return Some(TrackKind::Post);
        }
        self.regular_tracks
            .iter()
            .find(|s| s.track.id() == id)
            .map(|_| TrackKind::Regular)
    }

    fn apply_remove_track(&mut self, id: TrackId, kind: TrackKind) {
        let removed = match kind {
            TrackKind::Pre => self.pre_track.take(),
            TrackKind::Post => self.post_track.take(),
            TrackKind::Regular => {
                let idx = self.regular_tracks.iter().position(|s| s.track.id() == id);
                idx.map(|i| self.regular_tracks.remove(i))
            }
        };
        if let Some(slot) = removed {
            self.deletion_queue.retire(slot);
        }
        self.version.bump();
        self.refresh_snapshot();
        self.from_rt_tx.push(Notification::TrackRemoved { track: id });
    }

    fn track_slot_mut(&mut self, id: TrackId) -> Option<&mut TrackSlot> {
        if self.pre_track.as_ref().map(|s| s.track.id()) == Some(id) {
            return self.pre_track.as_mut();
        }
        if self.post_track.as_ref().map(|s| s.track.id()) == Some(id) {
            return self.post_track.as_mut();
        }
        self.regular_tracks.iter_mut().find(|s| s.track.id() == id)
    }

    pub fn add_plugin_to_track(&mut self, track: TrackId, processor: BoxedProcessor) -> Result<()> {
        if self.find_track_kind(track).is_none() {
            return Err(Error::UnknownTrack(track.raw()));
        }
        if self.is_realtime_enabled() {
            let event = RtEvent::at_chunk_start(
                RtEventKind::GraphMutation(GraphMutation::AddProcessorToTrack { track, processor }),
                0,
            );
            self.post_to_rt(event);
        } else {
            self.apply_add_processor(track, processor);
        }
        Ok(())
    }

    fn apply_add_processor(&mut self, track: TrackId, processor: BoxedProcessor) {
        let processor_id = processor.id();
        if let Some(slot) = self.track_slot_mut(track) {
            slot.track.push_processor(processor);
            self.version.bump();
            self.refresh_snapshot();
            self.from_rt_tx.push(Notification::ProcessorAdded { track, processor: processor_id });
        }
    }

    pub fn remove_plugin(&mut self, track: TrackId, processor: ProcessorId) -> Result<()> {
        if self.find_track_kind(track).is_none() {
            return Err(Error::UnknownTrack(track.raw()));
        }
        if self.is_realtime_enabled() {
            let event = RtEvent::at_chunk_start(
                RtEventKind::GraphMutation(GraphMutation::RemoveProcessorFromTrack { track, processor }),
                0,
            );
            self.post_to_rt(event);
            Ok(())
        } else {
            self.apply_remove_processor(track, processor)
        }
    }

    fn apply_remove_processor(&mut self, track: TrackId, processor: ProcessorId) -> Result<()> {
        let slot = self.track_slot_mut(track).ok_or(Error::UnknownTrack(track.raw()))?;
        let removed = slot.track.remove_processor(processor)?;
        self.deletion_queue.retire(removed);
        self.version.bump();
        self.refresh_snapshot();
        self.from_rt_tx.push(Notification::ProcessorRemoved { track, processor });
        Ok(())
    }

    pub fn set_bypass(&mut self, processor: ProcessorId, bypassed: bool) -> Result<()> {
        let event = RtEvent::at_chunk_start(RtEventKind::SetBypassed { processor, bypassed }, 0);
        if self.is_realtime_enabled() {
            self.post_to_rt(event);
        } else {
            self.dispatch_track_event(event.kind);
        }
        Ok(())
    }

    pub fn set_parameter(&mut self, processor: ProcessorId, parameter: ParameterId, normalized_value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&normalized_value) {
            return Err(Error::OutOfRange(normalized_value));
        }
        let event = RtEvent::at_chunk_start(
            RtEventKind::ParameterChange(sushi_core::rt_event::ParameterChange {
                processor,
                parameter,
                normalized_value,
            }),
            0,
        );
        if self.is_realtime_enabled() {
            self.post_to_rt(event);
        } else {
            self.dispatch_track_event(event.kind);
        }
        Ok(())
    }

    /// Validates synchronously, then either posts a `TransportChange` RT
    /// event (realtime enabled) or applies it in place (disabled) — the
    /// same dual path as [`AudioEngine::set_parameter`]/[`AudioEngine::set_bypass`].
    /// Either way a `Notification::TransportChanged` follows, via
    /// [`AudioEngine::apply_transport_change`] (§4.6, §8 "transport tempo
    /// change reported").
    pub fn set_tempo(&mut self, bpm: f32) -> Result<()> {
        if !Transport::is_valid_tempo(bpm) {
            return Err(Error::InvalidTempo(bpm));
        }
        let kind = RtEventKind::TransportChange(TransportChange::Tempo(bpm));
        if self.is_realtime_enabled() {
            self.post_to_rt(RtEvent::at_chunk_start(kind, 0));
        } else {
            self.dispatch_event(kind);
        }
        Ok(())
    }

    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) -> Result<()> {
        if !Transport::is_valid_time_signature(numerator, denominator) {
            return Err(Error::InvalidTimeSignature { numerator, denominator });
        }
        let kind = RtEventKind::TransportChange(TransportChange::TimeSignature { numerator, denominator });
        if self.is_realtime_enabled() {
            self.post_to_rt(RtEvent::at_chunk_start(kind, 0));
        } else {
            self.dispatch_event(kind);
        }
        Ok(())
    }

    pub fn set_playing_mode(&mut self, mode: PlayingMode) {
        self.transport.set_playing_mode(mode);
    }

    pub fn set_sync_mode(&mut self, mode: SyncMode) {
        self.transport.set_sync_mode(mode);
    }

    /// Exclusive to the owning thread/test harness — no production non-RT
    /// caller reaches routing through here; `EngineHandle` has no equivalent.
    pub fn connection_table(&mut self) -> &mut ConnectionTable {
        &mut self.connections
    }

    pub fn deletion_queue_handle(&self) -> sushi_rt::DeletionQueueHandle {
        self.deletion_queue.handle()
    }

    pub fn dropped_event_count(&self) -> u64 {
        self.to_rt_tx.lock().dropped_count()
    }

    pub fn xrun_count(&self) -> u64 {
        self.cpu_meter.metrics().xrun_count
    }

    /// An Audio Frontend calls this when the OS/device layer reports a
    /// missed callback (§4.8, §5 "audio frontends supply xrun/overrun status
    /// to the engine"), distinct from the CPU-load overrun `process_chunk`
    /// detects internally. RT-safe: only bumps a counter and pushes a
    /// notification onto the lock-free from-RT queue.
    pub fn report_frontend_xrun(&mut self) {
        self.cpu_meter.record_external_xrun();
        self.from_rt_tx.push(Notification::XrunOccurred);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `pause(true)` (§4.5 state machine, §4.8): moves to `STOPPED_TRANSIENT`
    /// and blocks until the thread driving [`AudioEngine::process_chunk`] has
    /// ramped output to silence and fired the handshake, or `timeout`
    /// elapses. `pause(false)` resumes immediately.
    pub fn pause(&mut self, paused: bool, timeout: Duration) -> bool {
        if paused {
            let (signal, waiter) = sushi_rt::handshake();
            *self.pause_signal.lock() = Some(signal);
            self.run_state.store(run_state_to_u32(RunState::StoppedTransient), Ordering::Release);
            waiter.wait(timeout)
        } else {
            self.run_state.store(run_state_to_u32(RunState::Running), Ordering::Release);
            true
        }
    }

    // ---- Per-chunk processing (§4.5 algorithm) ----

    /// The single entry point from any Audio Frontend. Called by the one
    /// thread that owns this `AudioEngine` outright — no lock is ever taken
    /// here except the brief, rare pause handshake (§5).
    pub fn process_chunk(&mut self, input: &SampleBuffer<'_>, output: &mut SampleBuffer<'_>, timestamp_micros: u64, sample_count: u64) {
        let started = self.clock.elapsed_micros();

        // 1. Snapshot timestamp/sample count into Transport.
        self.transport.advance_chunk(timestamp_micros, sample_count);

        // 2. Drain the to-RT queue, dispatch each event in place — no
        // intermediate Vec (§5, fixes the old drain-into-Vec-then-iterate
        // shape).
        let mut mutated = false;
        while let Some(event) = self.to_rt_rx.pop() {
            if matches!(event.kind, RtEventKind::GraphMutation(_)) {
                mutated = true;
            }
            if matches!(event.kind, RtEventKind::Shutdown) {
                self.run_state.store(run_state_to_u32(RunState::Stopped), Ordering::Release);
            }
            self.dispatch_event(event.kind);
        }

        // 3. Zero the engine-internal output buffer.
        output.clear();
        self.out_buffer_internal.clear();

        if self.run_state() == RunState::StoppedTransient {
            // Ramp-to-silence chunk: output already zeroed above, no
            // processor runs. Ack the pending pause handshake, if any. This
            // is the one Mutex the RT thread ever locks — a rare transition,
            // not the steady-state per-chunk path.
            if let Some(signal) = self.pause_signal.lock().take() {
                signal.fire();
            }
            self.run_state.store(run_state_to_u32(RunState::Stopped), Ordering::Release);
            if mutated {
                self.refresh_snapshot();
            }
            return;
        }

        // 4. Execute PRE tracks.
        if let Some(slot) = self.pre_track.as_mut() {
            slot.input.copy_from(input);
            slot.track.process(&slot.input, &mut slot.output, &self.clock);
        }

        // 5. Route engine input channels to track inputs. Write the
        // per-engine-channel source (post-PRE-track if present, else the raw
        // input) into the pre-allocated scratch buffer before taking any
        // mutable borrow of `regular_tracks` — no per-chunk allocation (§5).
        for channel in 0..self.engine_channels {
            self.input_source_scratch[channel] = match &self.pre_track {
                Some(slot) => {
                    let ch = channel.min(slot.output.channel_count().saturating_sub(1));
                    *slot.output.channel_ref(ch)
                }
                None => {
                    let ch = channel.min(input.channel_count().saturating_sub(1));
                    *input.channel_ref(ch)
                }
            };
        }

        // `load()` returns an owned, independent guard (not a borrow of
        // `self`), so it can be held across the `&mut self` calls below and
        // reused for both the input (step 5) and output (step 7) routing
        // passes without a second atomic load.
        let routing = self.connections_reader.load();

        for channel in 0..self.engine_channels {
            let targets = routing.inputs(channel);
            let source = self.input_source_scratch[channel];
            for target in targets {
                if let Some(slot) = self.find_regular_slot_mut(target.track) {
                    if target.track_channel < slot.input.channel_count() {
                        slot.input.channel(target.track_channel).copy_from_slice(&source);
                    }
                }
            }
        }

        // 6. Execute REGULAR tracks (optionally across worker threads).
        self.process_regular_tracks();

        // 7. Route track outputs to engine output channels (summed).
        for channel in 0..self.engine_channels {
            let sources = routing.outputs(channel);
            let mut mixed = [0.0f32; AUDIO_CHUNK_SIZE];
            for source in sources {
                if let Some(slot) = self.find_regular_slot_mut(source.track) {
                    if source.track_channel < slot.output.channel_count() {
                        let src = *slot.output.channel_ref(source.track_channel);
                        for (m, s) in mixed.iter_mut().zip(src.iter()) {
                            *m += *s;
                        }
                    }
                }
            }
            self.out_buffer_internal.channel(channel).copy_from_slice(&mixed);
        }

        // 8. Execute POST tracks on the summed output. When the POST track's
        // channel count matches the internal mix buffer exactly, process
        // straight off a non-owning view of it instead of copying (§5).
        if let Some(slot) = self.post_track.as_mut() {
            if slot.input.channel_count() == self.out_buffer_internal.channel_count() {
                let view = SampleBuffer::view(&mut self.out_buffer_internal, 0, slot.input.channel_count());
                slot.track.process(&view, &mut slot.output, &self.clock);
            } else {
                slot.input.copy_from(&self.out_buffer_internal);
                slot.track.process(&slot.input, &mut slot.output, &self.clock);
            }
            output.copy_from(&slot.output);
        } else {
            output.copy_from(&self.out_buffer_internal);
        }

        // 9. Publish outbound notifications + update CPU timing.
        let elapsed = self.clock.elapsed_micros() - started;
        let xrun = self.cpu_meter.record(elapsed);
        let timings = self.cpu_meter.metrics();
        self.from_rt_tx.push(Notification::CpuTimings {
            average_load: timings.average_load,
            peak_load: timings.peak_load,
            current_load: timings.current_load,
        });
        if xrun {
            self.from_rt_tx.push(Notification::XrunOccurred);
        }
        if mutated {
            self.refresh_snapshot();
        }
    }

    /// Drain and apply whatever is currently queued, without running a
    /// chunk of audio. Lets a test (or a future non-audio-driven frontend)
    /// observe the effect of a queued mutation without waiting for the next
    /// real `process_chunk` call.
    pub fn apply_pending_mutations(&mut self) -> bool {
        let mut mutated = false;
        while let Some(event) = self.to_rt_rx.pop() {
            if matches!(event.kind, RtEventKind::GraphMutation(_)) {
                mutated = true;
            }
            self.dispatch_event(event.kind);
        }
        if mutated {
            self.refresh_snapshot();
        }
        mutated
    }

    fn find_regular_slot_mut(&mut self, id: TrackId) -> Option<&mut TrackSlot> {
        self.regular_tracks.iter_mut().find(|s| s.track.id() == id)
    }

    fn process_regular_tracks(&mut self) {
        let clock = self.clock;
        let worker_count = self.worker_pool.as_ref().map(|p| p.worker_count()).unwrap_or(0);

        if worker_count > 1 && self.regular_tracks.len() > 1 {
            let mut jobs: Vec<Box<dyn FnOnce() + Send + '_>> = Vec::new();
            for slot in self.regular_tracks.iter_mut().take(worker_count) {
                let TrackSlot { track, input, output } = slot;
                jobs.push(Box::new(move || {
                    track.process(input, output, &clock);
                }));
            }
            self.worker_pool.as_ref().unwrap().run(jobs);
            for slot in self.regular_tracks.iter_mut().skip(worker_count) {
                slot.track.process(&slot.input, &mut slot.output, &clock);
            }
        } else {
            for slot in &mut self.regular_tracks {
                slot.track.process(&slot.input, &mut slot.output, &clock);
            }
        }
    }

    fn dispatch_event(&mut self, kind: RtEventKind) {
        match kind {
            RtEventKind::GraphMutation(mutation) => self.apply_graph_mutation(mutation),
            RtEventKind::TransportChange(change) => self.apply_transport_change(change),
            RtEventKind::Shutdown => {
                self.from_rt_tx.push(Notification::Shutdown);
            }
            RtEventKind::ParameterChange(change) => {
                self.from_rt_tx.push(Notification::ParameterChanged {
                    processor: change.processor,
                    parameter: change.parameter,
                    normalized_value: change.normalized_value,
                });
                self.dispatch_track_event(RtEventKind::ParameterChange(change));
            }
            RtEventKind::PropertyChange(change) => {
                self.from_rt_tx.push(Notification::PropertyChanged {
                    processor: change.processor,
                    property: change.property,
                    value: change.value.clone(),
                });
                self.dispatch_track_event(RtEventKind::PropertyChange(change));
            }
            RtEventKind::AsyncWorkCompletion { processor, request_id } => {
                self.from_rt_tx
                    .push(Notification::AsyncWorkCompletion { processor, request_id });
                self.dispatch_track_event(RtEventKind::AsyncWorkCompletion { processor, request_id });
            }
            other => self.dispatch_track_event(other),
        }
    }

    /// Queue an event into track inboxes. Events that name a `TrackId`
    /// (note on/off, aftertouch, controller — §4.7) go only to that track;
    /// everything else (parameter/property/program changes, which name a
    /// `ProcessorId` instead and are filtered per-processor once queued) is
    /// broadcast to every track. Never called with
    /// `GraphMutation`/`TransportChange`/`Shutdown` — those are fully
    /// handled in [`AudioEngine::dispatch_event`] before reaching here.
    fn dispatch_track_event(&mut self, kind: RtEventKind) {
        let target_track = match &kind {
            RtEventKind::NoteOn(e) | RtEventKind::NoteOff(e) | RtEventKind::Aftertouch(e) => Some(e.track),
            RtEventKind::Controller(e) => Some(e.track),
            _ => None,
        };

        if let Some(track_id) = target_track {
            if let Some(slot) = self.track_slot_mut(track_id) {
                slot.track.queue_event(kind);
            }
            return;
        }

        if let Some(slot) = self.pre_track.as_mut() {
            slot.track.queue_event(clone_event(&kind));
        }
        for slot in &mut self.regular_tracks {
            slot.track.queue_event(clone_event(&kind));
        }
        if let Some(slot) = self.post_track.as_mut() {
            slot.track.queue_event(clone_event(&kind));
        }
    }

    fn apply_graph_mutation(&mut self, mutation: GraphMutation) {
        match mutation {
            GraphMutation::AddTrack { track } => self.apply_add_track(*track),
            GraphMutation::RemoveTrack { track } => {
                if let Some(kind) = self.find_track_kind(track) {
                    self.apply_remove_track(track, kind);
                }
            }
            GraphMutation::AddProcessorToTrack { track, processor } => self.apply_add_processor(track, processor),
            GraphMutation::RemoveProcessorFromTrack { track, processor } => {
                let _ = self.apply_remove_processor(track, processor);
            }
            GraphMutation::MoveProcessor {
                processor,
                from_track,
                to_track,
                to_index,
            } => {
                let moved = self
                    .track_slot_mut(from_track)
                    .and_then(|slot| slot.track.remove_processor(processor).ok());
                if let Some(proc) = moved {
                    if let Some(dest) = self.track_slot_mut(to_track) {
                        dest.track.insert_processor_at(to_index, proc);
                        self.from_rt_tx.push(Notification::ProcessorMoved { processor, from_track, to_track });
                    }
                }
                self.version.bump();
                self.refresh_snapshot();
            }
        }
    }

    fn apply_transport_change(&mut self, change: TransportChange) {
        match change {
            TransportChange::Tempo(bpm) => {
                let _ = self.transport.set_tempo(bpm);
            }
            TransportChange::TimeSignature { numerator, denominator } => {
                let _ = self.transport.set_time_signature(numerator, denominator);
            }
            TransportChange::PlayingMode(mode) => self.transport.set_playing_mode(mode),
            TransportChange::SyncMode(mode) => self.transport.set_sync_mode(mode),
            TransportChange::ExternalBeats {
                current_beats,
                current_bar_beats,
            } => self.transport.set_external_beats(current_beats, current_bar_beats),
        }
        self.from_rt_tx.push(Notification::TransportChanged(change));
    }

    /// Rebuilds and publishes the whole-graph snapshot. Only runs on chunks
    /// where a graph mutation was actually applied (`mutated`, in
    /// `process_chunk`/`apply_pending_mutations`) — not every chunk, unlike
    /// the routing/track-processing steps above. The outer `Vec` still
    /// allocates fresh per call: the previous snapshot may still be held by
    /// a reader through its own `Arc`, so it cannot be safely recycled
    /// without unsafe code or generation tracking (documented as a known,
    /// acceptable limitation — see DESIGN.md).
    fn refresh_snapshot(&self) {
        let track_count = self.regular_tracks.len()
            + self.pre_track.is_some() as usize
            + self.post_track.is_some() as usize;
        let mut tracks = Vec::with_capacity(track_count);
        if let Some(slot) = &self.pre_track {
            tracks.push(track_snapshot(&slot.track));
        }
        for slot in &self.regular_tracks {
            tracks.push(track_snapshot(&slot.track));
        }
        if let Some(slot) = &self.post_track {
            tracks.push(track_snapshot(&slot.track));
        }
        self.snapshot_publisher.publish(EngineSnapshot {
            version: self.version.get(),
            tracks,
        });
    }
}

fn track_snapshot(track: &Track) -> TrackSnapshot {
    TrackSnapshot {
        id: track.id(),
        name: track.name_arc(),
        kind: track.kind(),
        channel_count: track.channel_count(),
        gain_normalized: track.gain_normalized(),
        processors: track.processors().iter().map(|p| processor_snapshot(p.as_ref())).collect(),
    }
}

fn processor_snapshot(processor: &dyn Processor) -> crate::snapshot::ProcessorSnapshot {
    crate::snapshot::ProcessorSnapshot {
        id: processor.id(),
        name: processor.name_arc(),
        bypassed: processor.bypassed(),
        parameters: processor
            .parameters()
            .iter()
            .map(|p| crate::snapshot::ParameterSnapshot {
                id: p.id,
                name: p.name.clone(),
                normalized_value: p.normalized(),
            })
            .collect(),
    }
}

/// Clones the small subset of `RtEventKind` that is ever broadcast to track
/// inboxes. `GraphMutation` owns non-`Clone` payloads (boxed trait objects)
/// and is applied directly at the engine, never broadcast — see
/// [`AudioEngine::dispatch_track_event`].
fn clone_event(kind: &RtEventKind) -> RtEventKind {
    match kind {
        RtEventKind::NoteOn(e) => RtEventKind::NoteOn(*e),
        RtEventKind::NoteOff(e) => RtEventKind::NoteOff(*e),
        RtEventKind::Aftertouch(e) => RtEventKind::Aftertouch(*e),
        RtEventKind::Controller(e) => RtEventKind::Controller(*e),
        RtEventKind::ParameterChange(e) => RtEventKind::ParameterChange(*e),
        RtEventKind::PropertyChange(e) => RtEventKind::PropertyChange(e.clone()),
        RtEventKind::SetBypassed { processor, bypassed } => RtEventKind::SetBypassed {
            processor: *processor,
            bypassed: *bypassed,
        },
        RtEventKind::ProgramChange { processor, program } => RtEventKind::ProgramChange {
            processor: *processor,
            program: *program,
        },
        RtEventKind::SetProcessorState { processor, state } => RtEventKind::SetProcessorState {
            processor: *processor,
            state: state.clone(),
        },
        RtEventKind::AsyncWorkRequest { processor, request_id } => RtEventKind::AsyncWorkRequest {
            processor: *processor,
            request_id: *request_id,
        },
        RtEventKind::AsyncWorkCompletion { processor, request_id } => RtEventKind::AsyncWorkCompletion {
            processor: *processor,
            request_id: *request_id,
        },
        RtEventKind::TransportChange(c) => RtEventKind::TransportChange(*c),
        RtEventKind::Shutdown => RtEventKind::Shutdown,
        RtEventKind::GraphMutation(_) => unreachable!("graph mutations are never broadcast to tracks"),
    }
}
