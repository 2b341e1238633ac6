//! Transport (C6): the musical time model — sample clock, tempo, time
//! signature, playing mode, sync source.

use crate::atomic::{AtomicDouble, AtomicFlag, AtomicFloat};
use crate::error::{Error, Result};
use crate::rt_event::{PlayingMode, SyncMode};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const MIN_TEMPO: f32 = 20.0;
const MAX_TEMPO: f32 = 999.0;
const MIDI_CLOCKS_PER_QUARTER: u32 = 24;

/// `{sample_rate, samples_since_start, tempo, time_signature, playing_mode,
/// sync_mode, position_source, current_beats, current_bar_beats,
/// output_latency}` (§3). All mutable fields are atomics so `process_chunk`
/// can update them from the RT thread while non-RT readers poll a
/// consistent-enough snapshot without locking (§5).
pub struct Transport {
    sample_rate: AtomicFloat,
    samples_since_start: AtomicU64,
    tempo: AtomicFloat,
    time_signature_numerator: AtomicU32,
    time_signature_denominator: AtomicU32,
    playing_mode: AtomicU32,
    sync_mode: AtomicU32,
    position_source_external: AtomicFlag,
    current_beats: AtomicDouble,
    current_bar_beats: AtomicDouble,
    output_latency_micros: AtomicFloat,
    midi_clock_count: AtomicU32,
    last_chunk_timestamp_micros: AtomicU64,
}

fn playing_mode_to_u32(mode: PlayingMode) -> u32 {
    match mode {
        PlayingMode::Stopped => 0,
        PlayingMode::Playing => 1,
        PlayingMode::Recording => 2,
    }
}

fn playing_mode_from_u32(value: u32) -> PlayingMode {
    match value {
        1 => PlayingMode::Playing,
        2 => PlayingMode::Recording,
        _ => PlayingMode::Stopped,
    }
}

fn sync_mode_to_u32(mode: SyncMode) -> u32 {
    match mode {
        SyncMode::Internal => 0,
        SyncMode::Midi => 1,
        SyncMode::Gate => 2,
        SyncMode::Link => 3,
    }
}

fn sync_mode_from_u32(value: u32) -> SyncMode {
    match value {
        1 => SyncMode::Midi,
        2 => SyncMode::Gate,
        3 => SyncMode::Link,
        _ => SyncMode::Internal,
    }
}

impl Transport {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: AtomicFloat::new(sample_rate),
            samples_since_start: AtomicU64::new(0),
            tempo: AtomicFloat::new(120.0),
            time_signature_numerator: AtomicU32::new(4),
            time_signature_denominator: AtomicU32::new(4),
            playing_mode: AtomicU32::new(playing_mode_to_u32(PlayingMode::Stopped)),
            sync_mode: AtomicU32::new(sync_mode_to_u32(SyncMode::Internal)),
            position_source_external: AtomicFlag::new(false),
            current_beats: AtomicDouble::new(0.0),
            current_bar_beats: AtomicDouble::new(0.0),
            output_latency_micros: AtomicFloat::new(0.0),
            midi_clock_count: AtomicU32::new(0),
            last_chunk_timestamp_micros: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate.get()
    }

    /// Sample rate is mutable only while stopped (§6).
    pub fn set_sample_rate(&self, value: f32) -> Result<()> {
        if self.playing_mode() != PlayingMode::Stopped {
            return Err(Error::InvalidConfig("sample rate can only change while stopped".into()));
        }
        self.sample_rate.set(value);
        Ok(())
    }

    pub fn samples_since_start(&self) -> u64 {
        self.samples_since_start.load(Ordering::Acquire)
    }

    pub fn tempo(&self) -> f32 {
        self.tempo.get()
    }

    pub fn set_tempo(&self, bpm: f32) -> Result<()> {
        if !Self::is_valid_tempo(bpm) {
            return Err(Error::InvalidTempo(bpm));
        }
        self.tempo.set(bpm);
        Ok(())
    }

    /// Pure precondition check, for callers (the Engine's dual realtime/
    /// non-realtime mutation paths) that need to validate before deciding
    /// whether to post an RT event or apply in place.
    pub fn is_valid_tempo(bpm: f32) -> bool {
        (MIN_TEMPO..=MAX_TEMPO).contains(&bpm)
    }

    pub fn time_signature(&self) -> (u32, u32) {
        (
            self.time_signature_numerator.load(Ordering::Acquire),
            self.time_signature_denominator.load(Ordering::Acquire),
        )
    }

    pub fn set_time_signature(&self, numerator: u32, denominator: u32) -> Result<()> {
        if !Self::is_valid_time_signature(numerator, denominator) {
            return Err(Error::InvalidTimeSignature { numerator, denominator });
        }
        self.time_signature_numerator.store(numerator, Ordering::Release);
        self.time_signature_denominator.store(denominator, Ordering::Release);
        Ok(())
    }

    pub fn is_valid_time_signature(numerator: u32, denominator: u32) -> bool {
        numerator != 0 && denominator != 0 && denominator.is_power_of_two()
    }

    pub fn playing_mode(&self) -> PlayingMode {
        playing_mode_from_u32(self.playing_mode.load(Ordering::Acquire))
    }

    /// Playing mode transitions are sample-accurate at chunk boundary (§4.4)
    /// — callers apply this only between chunks, never mid-chunk.
    pub fn set_playing_mode(&self, mode: PlayingMode) {
        self.playing_mode.store(playing_mode_to_u32(mode), Ordering::Release);
    }

    pub fn sync_mode(&self) -> SyncMode {
        sync_mode_from_u32(self.sync_mode.load(Ordering::Acquire))
    }

    /// Changing sync mode is not sample-accurate; it takes effect at the
    /// next chunk boundary (§4.4) — enforced by callers only invoking this
    /// between `advance_chunk` calls.
    pub fn set_sync_mode(&self, mode: SyncMode) {
        self.sync_mode.store(sync_mode_to_u32(mode), Ordering::Release);
    }

    pub fn set_position_source_external(&self, external: bool) {
        self.position_source_external.set(external);
    }

    pub fn position_source_is_external(&self) -> bool {
        self.position_source_external.get()
    }

    pub fn current_beats(&self) -> f64 {
        self.current_beats.get()
    }

    pub fn current_bar_beats(&self) -> f64 {
        self.current_bar_beats.get()
    }

    pub fn output_latency_micros(&self) -> f32 {
        self.output_latency_micros.get()
    }

    pub fn set_output_latency_micros(&self, value: f32) {
        self.output_latency_micros.set(value);
    }

    /// Host-pushed beat position when `position_source == EXTERNAL` (§4.4):
    /// the transport trusts these values verbatim and does not advance them.
    pub fn set_external_beats(&self, current_beats: f64, current_bar_beats: f64) {
        self.current_beats.set(current_beats);
        self.current_bar_beats.set(current_bar_beats);
    }

    /// One MIDI clock tick received (24 per quarter note) — advances beat
    /// position by `1/24` of a quarter note when `sync_mode == MIDI` (§4.4).
    pub fn tick_midi_clock(&self) {
        if self.sync_mode() != SyncMode::Midi {
            return;
        }
        let count = self.midi_clock_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count % MIDI_CLOCKS_PER_QUARTER == 0 {
            let beats = self.current_beats.get() + 1.0;
            self.current_beats.set(beats);
            self.advance_bar_beats(beats);
        }
    }

    fn advance_bar_beats(&self, beats: f64) {
        let (numerator, _) = self.time_signature();
        let bar_beats = beats % numerator.max(1) as f64;
        self.current_bar_beats.set(bar_beats);
    }

    /// Timestamp (host monotonic clock, microseconds) passed to the most
    /// recent [`Transport::advance_chunk`] call.
    pub fn last_timestamp_micros(&self) -> u64 {
        self.last_chunk_timestamp_micros.load(Ordering::Acquire)
    }

    /// Called once per chunk by the Engine (§4.4): advances the sample clock
    /// and, in `INTERNAL`/`CALCULATED` mode, derives the beat position from
    /// `sample_rate` and `tempo`. Returns `(beats_at_chunk_start,
    /// beats_at_chunk_end)` so subscribers to beat ticks can detect a
    /// boundary crossing within the chunk.
    pub fn advance_chunk(&self, timestamp_micros: u64, sample_count: u64) -> (f64, f64) {
        self.last_chunk_timestamp_micros.store(timestamp_micros, Ordering::Release);
        let start_samples = self.samples_since_start.fetch_add(sample_count, Ordering::AcqRel);
        let beats_at_start = self.current_beats.get();

        if self.position_source_is_external() || self.sync_mode() != SyncMode::Internal {
            return (beats_at_start, self.current_beats.get());
        }

        let sample_rate = self.sample_rate().max(1.0) as f64;
        let tempo = self.tempo() as f64;
        let seconds = sample_count as f64 / sample_rate;
        let beats_advanced = seconds * tempo / 60.0;
        let beats_at_end = beats_at_start + beats_advanced;
        self.current_beats.set(beats_at_end);
        self.advance_bar_beats(beats_at_end);
        let _ = start_samples;
        (beats_at_start, beats_at_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn samples_since_start_is_monotonic() {
        let transport = Transport::new(48000.0);
        transport.set_playing_mode(PlayingMode::Playing);
        transport.advance_chunk(1_000, 64);
        let first = transport.samples_since_start();
        transport.advance_chunk(2_333, 64);
        let second = transport.samples_since_start();
        assert!(second > first);
        assert_eq!(transport.last_timestamp_micros(), 2_333);
    }

    #[test]
    fn set_tempo_rejects_out_of_range() {
        let transport = Transport::new(48000.0);
        assert!(transport.set_tempo(10.0).is_err());
        assert!(transport.set_tempo(1200.0).is_err());
        assert!(transport.set_tempo(120.0).is_ok());
        assert_eq!(transport.tempo(), 120.0);
    }

    #[test]
    fn external_position_source_does_not_auto_advance() {
        let transport = Transport::new(48000.0);
        transport.set_position_source_external(true);
        transport.set_external_beats(3.5, 1.5);
        transport.advance_chunk(0, 64);
        assert_eq!(transport.current_beats(), 3.5);
        assert_eq!(transport.current_bar_beats(), 1.5);
    }

    #[test]
    fn calculated_position_advances_with_tempo() {
        let transport = Transport::new(48000.0);
        transport.set_tempo(120.0).unwrap();
        let (start, end) = transport.advance_chunk(0, 48000);
        assert_eq!(start, 0.0);
        assert_abs_diff_eq!(end, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn invalid_time_signature_rejected() {
        let transport = Transport::new(48000.0);
        assert!(transport.set_time_signature(4, 3).is_err());
        assert!(transport.set_time_signature(0, 4).is_err());
        assert!(transport.set_time_signature(3, 4).is_ok());
    }
}
