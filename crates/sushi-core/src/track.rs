//! Track (C5): an ordered processor chain with its own routing, gain, pan,
//! and RT event inbox.

use crate::atomic::AtomicFloat;
use crate::buffer::SampleBuffer;
use crate::error::{Error, Result};
use crate::ids::{ProcessorId, TrackId};
use crate::processor::BoxedProcessor;
use crate::rt_event::RtEventKind;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Regular,
    Pre,
    Post,
}

/// Equal-power pan law for a stereo pair, matching the common constant-power
/// curve: `pan` in `[-1, 1]`, 0 is center.
fn equal_power_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let theta = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (theta.cos(), theta.sin())
}

/// `{id, name, type, input_channels, output_channels, ordered_processor_list,
/// gain, pan, input_event_queue}` (§3).
pub struct Track {
    id: TrackId,
    name: Arc<str>,
    kind: TrackKind,
    input_channels: usize,
    output_channels: usize,
    processors: Vec<BoxedProcessor>,
    gain: AtomicFloat,
    pan: AtomicFloat,
    /// Events addressed to this track, drained at the start of each chunk
    /// (§4.3 step 1). Bounded, pre-allocated — never grown on the RT thread.
    pending_events: Vec<RtEventKind>,
    scratch: SampleBuffer<'static>,
    cpu_time_micros: AtomicFloat,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>, kind: TrackKind, channels: usize) -> Self {
        Self {
            id,
            name: Arc::from(name.into()),
            kind,
            input_channels: channels,
            output_channels: channels,
            processors: Vec::new(),
            gain: AtomicFloat::new(1.0),
            pan: AtomicFloat::new(0.0),
            pending_events: Vec::with_capacity(32),
            scratch: SampleBuffer::owning(channels),
            cpu_time_micros: AtomicFloat::new(0.0),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cheap `Arc` clone of the track name, for snapshot publication off the
    /// RT thread without allocating a fresh `String` per chunk (§5).
    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn channel_count(&self) -> usize {
        self.input_channels
    }

    pub fn gain_normalized(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_gain_normalized(&self, value: f32) {
        self.gain.set(value.clamp(0.0, 1.0));
    }

    pub fn pan(&self) -> f32 {
        self.pan.get()
    }

    pub fn set_pan(&self, value: f32) {
        self.pan.set(value.clamp(-1.0, 1.0));
    }

    pub fn cpu_time_micros(&self) -> f32 {
        self.cpu_time_micros.get()
    }

    pub fn processor_ids(&self) -> impl Iterator<Item = ProcessorId> + '_ {
        self.processors.iter().map(|p| p.id())
    }

    pub fn contains_processor(&self, id: ProcessorId) -> bool {
        self.processors.iter().any(|p| p.id() == id)
    }

    /// The processor chain in order, for read-only inspection (snapshot
    /// building, session save) — never used on the RT path itself.
    pub fn processors(&self) -> &[BoxedProcessor] {
        &self.processors
    }

    /// Insert `processor` at the end of the chain. Called only with a
    /// processor already constructed on a non-RT thread (§4.5).
    pub fn push_processor(&mut self, processor: BoxedProcessor) {
        self.processors.push(processor);
    }

    pub fn insert_processor_at(&mut self, index: usize, processor: BoxedProcessor) {
        let index = index.min(self.processors.len());
        self.processors.insert(index, processor);
    }

    /// Detach and return a processor by id, handing ownership back to the
    /// caller — the caller is responsible for routing it to the deletion
    /// queue rather than dropping it on the RT thread.
    pub fn remove_processor(&mut self, id: ProcessorId) -> Result<BoxedProcessor> {
        let idx = self
            .processors
            .iter()
            .position(|p| p.id() == id)
            .ok_or(Error::UnknownProcessor(id.raw()))?;
        Ok(self.processors.remove(idx))
    }

    /// Queue an event for dispatch at the next chunk boundary. The caller
    /// (the Engine, draining the to-RT queue) is responsible for bounding
    /// how many events accumulate before a chunk is processed.
    pub fn queue_event(&mut self, event: RtEventKind) {
        self.pending_events.push(event);
    }

    /// Step 1 of §4.3: dispatch every queued event to its addressed
    /// processor (by scanning `RtEventKind` payloads for a processor id
    /// matching one owned by this track); track-addressed events (transport,
    /// bypass on an owned processor) are applied directly.
    fn drain_pending_events(&mut self) {
        for event in self.pending_events.drain(..) {
            match &event {
                RtEventKind::SetBypassed { processor, bypassed } => {
                    if let Some(p) = self.processors.iter_mut().find(|p| p.id() == *processor) {
                        p.set_bypassed(*bypassed);
                    }
                }
                RtEventKind::ProgramChange { processor, program } => {
                    if let Some(p) = self.processors.iter_mut().find(|p| p.id() == *processor) {
                        let _ = p.set_program(*program);
                    }
                }
                _ => {
                    for p in &mut self.processors {
                        p.process_event(&event);
                    }
                }
            }
        }
    }

    /// §4.3 steps 1-5: drain events, run the chain, apply gain/pan,
    /// accumulate CPU timing. `input`/`output` are the track's pre-allocated
    /// per-chunk buffers, already sized to `channel_count()`.
    pub fn process(&mut self, input: &SampleBuffer<'_>, output: &mut SampleBuffer<'_>, now: &crate::clock::Clock) {
        let started = now.elapsed_micros();

        self.drain_pending_events();

        if self.processors.is_empty() {
            output.copy_from(input);
        } else {
            self.scratch.copy_from(input);
            for processor in &mut self.processors {
                if processor.bypassed() {
                    continue;
                }
                output.clear();
                processor.process_audio(&self.scratch, output);
                self.scratch.copy_from(output);
            }
            output.copy_from(&self.scratch);
        }

        let gain = self.gain.get();
        let (left_gain, right_gain) = equal_power_gains(self.pan.get());
        for ch in 0..output.channel_count() {
            let pan_gain = if output.channel_count() == 2 {
                if ch == 0 {
                    left_gain
                } else {
                    right_gain
                }
            } else {
                1.0
            };
            let samples = output.channel(ch);
            for s in samples.iter_mut() {
                *s *= gain * pan_gain;
            }
        }

        let elapsed = now.elapsed_micros() - started;
        self.cpu_time_micros.set(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::GainProcessor;

    #[test]
    fn empty_track_passes_input_through() {
        let mut track = Track::new(TrackId(1), "t", TrackKind::Regular, 2);
        let mut input = SampleBuffer::owning(2);
        input.channel(0)[0] = 0.3;
        let mut output = SampleBuffer::owning(2);
        let clock = crate::clock::Clock::new();
        track.process(&input, &mut output, &clock);
        assert!((output.channel_ref(0)[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn track_gain_attenuates_output() {
        let mut track = Track::new(TrackId(1), "t", TrackKind::Regular, 2);
        track.set_gain_normalized(0.0);
        let mut input = SampleBuffer::owning(2);
        input.channel(0).fill(1.0);
        let mut output = SampleBuffer::owning(2);
        let clock = crate::clock::Clock::new();
        track.process(&input, &mut output, &clock);
        assert_eq!(output.channel_ref(0)[0], 0.0);
    }

    #[test]
    fn removing_unknown_processor_errors() {
        let mut track = Track::new(TrackId(1), "t", TrackKind::Regular, 2);
        assert!(track.remove_processor(ProcessorId(7)).is_err());
    }

    #[test]
    fn push_and_remove_processor_roundtrip() {
        let mut track = Track::new(TrackId(1), "t", TrackKind::Regular, 2);
        track.push_processor(Box::new(GainProcessor::new(ProcessorId(5), "gain", 2)));
        assert!(track.contains_processor(ProcessorId(5)));
        let removed = track.remove_processor(ProcessorId(5)).unwrap();
        assert_eq!(removed.id(), ProcessorId(5));
        assert!(!track.contains_processor(ProcessorId(5)));
    }
}
