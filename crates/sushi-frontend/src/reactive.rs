//! Externally-driven "reactive" frontend (§4.8): passive — a host
//! application drives [`ReactiveFrontend::process_audio`] at its own
//! cadence instead of this crate owning a callback or a file loop. Used
//! when the engine is embedded inside another audio host.

use crate::AudioFrontend;
use std::time::Duration;
use sushi_core::{Clock, Result, SampleBuffer, AUDIO_CHUNK_SIZE};
use sushi_engine::AudioEngine;

pub struct ReactiveFrontendConfig {
    pub channels: usize,
}

impl Default for ReactiveFrontendConfig {
    fn default() -> Self {
        Self { channels: 2 }
    }
}

/// Host-driven frontend: [`AudioFrontend::run`] is a no-op, the embedding
/// host calls [`ReactiveFrontend::process_audio`] itself once per period.
///
/// A single-threaded driver — it owns its [`AudioEngine`] directly, no
/// [`sushi_engine::EngineHandle`] involved, and no lock is ever taken on the
/// audio path (§5). `input`/`output`/`out_interleaved` are sized once here
/// and reused across every call instead of being reallocated per chunk.
pub struct ReactiveFrontend {
    engine: AudioEngine,
    channels: usize,
    clock: Clock,
    sample_count: u64,
    input: SampleBuffer<'static>,
    output: SampleBuffer<'static>,
    out_interleaved: Vec<f32>,
}

impl ReactiveFrontend {
    pub fn new(engine: AudioEngine, config: ReactiveFrontendConfig) -> Self {
        let channels = config.channels;
        Self {
            engine,
            channels,
            clock: Clock::new(),
            sample_count: 0,
            input: SampleBuffer::owning(channels),
            output: SampleBuffer::owning(channels),
            out_interleaved: vec![0.0f32; channels * AUDIO_CHUNK_SIZE],
        }
    }

    /// Deinterleave `in_buffer`, run one (or more, if `sample_count` exceeds
    /// [`AUDIO_CHUNK_SIZE`]) `process_chunk` call, interleave into
    /// `out_buffer`. `timestamp` defaults to this frontend's own monotonic
    /// clock when the host does not supply one (§4.8 "a timestamp from a
    /// monotonic clock or from the host callback's supplied time").
    pub fn process_audio(
        &mut self,
        in_buffer: &[f32],
        out_buffer: &mut [f32],
        frame_count: usize,
        timestamp: Option<Duration>,
    ) {
        let timestamp_micros = timestamp.map(|d| d.as_micros() as u64).unwrap_or_else(|| self.clock.elapsed_micros() as u64);
        let channels = self.channels;

        let mut offset = 0;
        while offset < frame_count {
            let n = (frame_count - offset).min(AUDIO_CHUNK_SIZE);
            let in_slice = &in_buffer[offset * channels..(offset + n) * channels];
            self.input.clear();
            self.input.from_interleaved(in_slice);

            self.engine
                .process_chunk(&self.input, &mut self.output, timestamp_micros, self.sample_count);
            self.sample_count += AUDIO_CHUNK_SIZE as u64;

            self.output.to_interleaved(&mut self.out_interleaved);
            let out_slice = &mut out_buffer[offset * channels..(offset + n) * channels];
            out_slice.copy_from_slice(&self.out_interleaved[..out_slice.len()]);

            offset += n;
        }
    }
}

impl AudioFrontend for ReactiveFrontend {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Passive: the host drives `process_audio` directly.
    fn run(&mut self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}

    fn pause(&mut self, paused: bool) -> bool {
        self.engine.pause(paused, Duration::from_millis(500))
    }

    fn set_output_latency(&mut self, latency: Duration) {
        self.engine.transport().set_output_latency_micros(latency.as_micros() as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sushi_core::config::EngineConfig;

    fn engine() -> AudioEngine {
        AudioEngine::new(EngineConfig::default(), 2).0
    }

    #[test]
    fn silence_in_produces_silence_out() {
        let mut frontend = ReactiveFrontend::new(engine(), ReactiveFrontendConfig { channels: 2 });
        let in_buffer = vec![0.0f32; 2 * AUDIO_CHUNK_SIZE];
        let mut out_buffer = vec![1.0f32; 2 * AUDIO_CHUNK_SIZE];
        frontend.process_audio(&in_buffer, &mut out_buffer, AUDIO_CHUNK_SIZE, None);
        assert!(out_buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn frame_count_larger_than_chunk_size_iterates_multiple_chunks() {
        let mut frontend = ReactiveFrontend::new(engine(), ReactiveFrontendConfig { channels: 2 });
        let frames = AUDIO_CHUNK_SIZE * 3;
        let in_buffer = vec![0.0f32; 2 * frames];
        let mut out_buffer = vec![0.0f32; 2 * frames];
        frontend.process_audio(&in_buffer, &mut out_buffer, frames, Some(Duration::from_millis(1)));
        assert_eq!(frontend.sample_count, frames as u64);
    }
}
