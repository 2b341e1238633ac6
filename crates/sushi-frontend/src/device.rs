//! Device-driven realtime frontend (§4.8 "Device-driven realtime"), behind
//! the `device` feature. A native audio API — here `cpal`, the teacher
//! pack's cross-platform backend (grounded in `sonido-io::cpal_backend`) —
//! invokes a registered callback; the callback maps its buffer to the
//! engine's fixed-size chunked interface, iterating in
//! [`sushi_core::AUDIO_CHUNK_SIZE`]-frame chunks when the host buffer is
//! larger.

use crate::AudioFrontend;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sushi_core::{Error, Result, SampleBuffer, AUDIO_CHUNK_SIZE};
use sushi_engine::{AudioEngine, EngineHandle};
use tracing::{info, warn};

pub struct DeviceFrontendConfig {
    pub output_device_name: Option<String>,
    pub channels: usize,
}

impl Default for DeviceFrontendConfig {
    fn default() -> Self {
        Self {
            output_device_name: None,
            channels: 2,
        }
    }
}

/// Drives [`sushi_engine::AudioEngine`] from a `cpal` output stream.
///
/// Owns the [`AudioEngine`] outright so the RT callback below never takes a
/// lock on it (§5); `handle` is a cheap [`EngineHandle`] clone kept only for
/// the cross-thread calls this struct itself needs to make (`pause`,
/// `set_output_latency`) from whichever thread drives [`AudioFrontend`].
pub struct DeviceFrontend {
    engine: Option<AudioEngine>,
    handle: EngineHandle,
    config: DeviceFrontendConfig,
    stream: Option<cpal::Stream>,
    sample_count: Arc<AtomicU64>,
    origin: Instant,
}

impl DeviceFrontend {
    pub fn new(engine: AudioEngine, handle: EngineHandle, config: DeviceFrontendConfig) -> Self {
        Self {
            engine: Some(engine),
            handle,
            config,
            stream: None,
            sample_count: Arc::new(AtomicU64::new(0)),
            origin: Instant::now(),
        }
    }

    fn find_output_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        match &self.config.output_device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(name.as_str())).unwrap_or(false))
                .ok_or_else(|| Error::Device(format!("no output device matching '{name}'"))),
            None => host.default_output_device().ok_or_else(|| Error::Device("no default output device".into())),
        }
    }
}

impl AudioFrontend for DeviceFrontend {
    fn init(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let device = self.find_output_device(&host)?;
        let sample_rate = self.handle.config().sample_rate;
        let channels = self.config.channels;

        let stream_config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(sample_rate as u32),
            buffer_size: cpal::BufferSize::Fixed(AUDIO_CHUNK_SIZE as u32),
        };

        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| Error::InvalidConfig("device frontend already initialized".into()))?;
        let sample_count = self.sample_count.clone();
        let origin = self.origin;

        let mut input = SampleBuffer::owning(channels);
        let mut output = SampleBuffer::owning(channels);
        let mut interleaved = vec![0.0f32; channels * AUDIO_CHUNK_SIZE];

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    // `data` may be a multiple of AUDIO_CHUNK_SIZE frames; walk
                    // it in fixed-size chunks, each one a single
                    // `process_chunk` call (§4.8 "iterating in K-frame chunks
                    // when the host buffer exceeds K"). `engine` is owned by
                    // this closure outright — no lock is ever taken here (§5).
                    for frame_chunk in data.chunks_mut(channels * AUDIO_CHUNK_SIZE) {
                        input.clear();
                        let timestamp_micros = origin.elapsed().as_micros() as u64;
                        let count = sample_count.load(Ordering::Relaxed);
                        engine.process_chunk(&input, &mut output, timestamp_micros, count);
                        sample_count.fetch_add(AUDIO_CHUNK_SIZE as u64, Ordering::Relaxed);

                        output.to_interleaved(&mut interleaved);
                        let n = frame_chunk.len().min(interleaved.len());
                        frame_chunk[..n].copy_from_slice(&interleaved[..n]);
                    }
                },
                move |err| {
                    warn!(error = %err, "cpal stream error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        self.stream = Some(stream);
        info!(channels, sample_rate, "device frontend initialized");
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or_else(|| Error::InvalidConfig("device frontend not initialized".into()))?;
        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }

    fn pause(&mut self, paused: bool) -> bool {
        if paused {
            if let Some(stream) = &self.stream {
                let _ = stream.pause();
            }
        } else if let Some(stream) = &self.stream {
            let _ = stream.play();
        }
        self.handle.pause(paused, Duration::from_millis(500))
    }

    fn set_output_latency(&mut self, latency: Duration) {
        self.handle.transport().set_output_latency_micros(latency.as_micros() as f32);
    }
}
