//! File-driven offline frontend (§4.8 "File-driven / offline"): reads an
//! input WAV, calls `process_chunk` in a tight loop with wall-clock-derived
//! timestamps, writes an output WAV. Not realtime-safe in the OS sense (it
//! does disk I/O on the driving thread) but still obeys the engine's RT
//! contract — no allocation happens inside the per-chunk loop itself.

use crate::AudioFrontend;
use hound::{WavReader, WavSpec, WavWriter};
use std::path::PathBuf;
use std::time::Duration;
use sushi_core::{Clock, Error, Result, SampleBuffer, AUDIO_CHUNK_SIZE};
use sushi_engine::AudioEngine;
use tracing::info;

/// Configuration for one offline run.
pub struct OfflineFrontendConfig {
    pub input_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub channels: usize,
    /// Drive `process_chunk` with silence instead of reading a file, useful
    /// for profiling/smoke-testing without a reference WAV on hand.
    pub dummy_mode: bool,
    /// Number of chunks to run in `dummy_mode` (ignored otherwise — the
    /// input file's length determines the chunk count).
    pub dummy_chunk_count: usize,
}

impl Default for OfflineFrontendConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: PathBuf::from("sushi_output.wav"),
            channels: 2,
            dummy_mode: false,
            dummy_chunk_count: 0,
        }
    }
}

/// A single-threaded driver — owns its [`AudioEngine`] directly, no
/// [`sushi_engine::EngineHandle`] involved. Every buffer touched by the
/// per-chunk loop (`input`, `output`, `read_interleaved`, `write_interleaved`)
/// is sized once in [`Self::new`] and reused chunk to chunk.
pub struct OfflineFrontend {
    engine: AudioEngine,
    config: OfflineFrontendConfig,
    clock: Clock,
    sample_count: u64,
    reader: Option<WavReader<std::io::BufReader<std::fs::File>>>,
    writer: Option<WavWriter<std::io::BufWriter<std::fs::File>>>,
    input: SampleBuffer<'static>,
    output: SampleBuffer<'static>,
    read_interleaved: Vec<f32>,
    write_interleaved: Vec<f32>,
}

impl OfflineFrontend {
    pub fn new(engine: AudioEngine, config: OfflineFrontendConfig) -> Self {
        let channels = config.channels;
        Self {
            engine,
            config,
            clock: Clock::new(),
            sample_count: 0,
            reader: None,
            writer: None,
            input: SampleBuffer::owning(channels),
            output: SampleBuffer::owning(channels),
            read_interleaved: vec![0.0f32; channels * AUDIO_CHUNK_SIZE],
            write_interleaved: vec![0.0f32; channels * AUDIO_CHUNK_SIZE],
        }
    }

    fn spec(&self, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: self.config.channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    fn read_chunk(&mut self) -> bool {
        if self.config.dummy_mode {
            self.input.clear();
            return self.sample_count < self.config.dummy_chunk_count as u64 * AUDIO_CHUNK_SIZE as u64;
        }
        let Some(reader) = self.reader.as_mut() else {
            return false;
        };
        let mut read = 0usize;
        let mut samples = reader.samples::<f32>();
        while read < self.read_interleaved.len() {
            match samples.next() {
                Some(Ok(sample)) => {
                    self.read_interleaved[read] = sample;
                    read += 1;
                }
                _ => break,
            }
        }
        if read == 0 {
            return false;
        }
        self.input.from_interleaved(&self.read_interleaved);
        true
    }
}

impl AudioFrontend for OfflineFrontend {
    fn init(&mut self) -> Result<()> {
        let sample_rate = self.engine.config().sample_rate;

        if !self.config.dummy_mode {
            let path = self
                .config
                .input_path
                .as_ref()
                .ok_or_else(|| Error::InvalidConfig("offline frontend requires an input_path unless dummy_mode is set".into()))?;
            self.reader = Some(WavReader::open(path).map_err(|e| Error::Device(e.to_string()))?);
        }

        let spec = self.spec(sample_rate as u32);
        self.writer = Some(WavWriter::create(&self.config.output_path, spec).map_err(|e| Error::Device(e.to_string()))?);
        info!(output = %self.config.output_path.display(), dummy_mode = self.config.dummy_mode, "offline frontend initialized");
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        loop {
            if !self.read_chunk() {
                break;
            }

            let timestamp_micros = self.clock.elapsed_micros() as u64;
            self.engine
                .process_chunk(&self.input, &mut self.output, timestamp_micros, self.sample_count);
            self.sample_count += AUDIO_CHUNK_SIZE as u64;

            self.output.to_interleaved(&mut self.write_interleaved);
            let writer = self.writer.as_mut().expect("writer initialized in init()");
            for sample in &self.write_interleaved {
                writer.write_sample(*sample).map_err(|e| Error::Device(e.to_string()))?;
            }
        }

        info!(frames = self.sample_count, "offline frontend finished");
        Ok(())
    }

    fn cleanup(&mut self) {
        self.reader = None;
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                tracing::warn!(error = %e, "failed to finalize output WAV");
            }
        }
    }

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
    use tempfile::tempdir;

    fn engine() -> AudioEngine {
        AudioEngine::new(EngineConfig::default(), 2).0
    }

    #[test]
    fn dummy_mode_runs_fixed_chunk_count_of_silence() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("out.wav");
        let config = OfflineFrontendConfig {
            dummy_mode: true,
            dummy_chunk_count: 4,
            output_path: output_path.clone(),
            ..Default::default()
        };
        let mut frontend = OfflineFrontend::new(engine(), config);
        frontend.init().unwrap();
        frontend.run().unwrap();
        frontend.cleanup();

        let reader = WavReader::open(&output_path).unwrap();
        let frames = reader.len() / 2;
        assert_eq!(frames as usize, 4 * AUDIO_CHUNK_SIZE);
    }

    #[test]
    fn dummy_mode_without_input_path_needs_no_file() {
        let dir = tempdir().unwrap();
        let config = OfflineFrontendConfig {
            dummy_mode: true,
            dummy_chunk_count: 1,
            output_path: dir.path().join("out.wav"),
            ..Default::default()
        };
        let mut frontend = OfflineFrontend::new(engine(), config);
        assert!(frontend.init().is_ok());
    }

    #[test]
    fn missing_input_path_without_dummy_mode_is_an_error() {
        let dir = tempdir().unwrap();
        let config = OfflineFrontendConfig {
            dummy_mode: false,
            output_path: dir.path().join("out.wav"),
            ..Default::default()
        };
        let mut frontend = OfflineFrontend::new(engine(), config);
        assert!(frontend.init().is_err());
    }
}
