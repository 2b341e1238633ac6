//! Audio Frontend (C10, §4.8): owns the OS-side audio callback (or, for the
//! offline variant, the file-read loop), negotiates sample rate/buffer size,
//! and calls [`sushi_engine::AudioEngine::process_chunk`] exactly once per
//! audio period with a monotonically increasing sample count and a
//! timestamp from a monotonic clock. Three variants share the
//! [`AudioFrontend`] trait so the `sushi` binary can pick one at startup
//! without the rest of the wiring caring which.

#[cfg(feature = "device")]
pub mod device;
pub mod offline;
pub mod reactive;

use std::time::Duration;
use sushi_core::Result;

/// Common contract every Audio Frontend variant implements (§6 "Audio
/// frontend boundary"). Chunk size is the workspace-wide compile-time
/// constant [`sushi_core::AUDIO_CHUNK_SIZE`]; sample rate is fixed at
/// [`AudioFrontend::init`] and mutable only while stopped.
pub trait AudioFrontend {
    /// Open whatever backing resource this variant needs (file handles,
    /// device streams) and get it ready to run. Must not be called twice
    /// without an intervening [`AudioFrontend::cleanup`].
    fn init(&mut self) -> Result<()>;

    /// Drive the engine until the frontend's natural end condition (file
    /// exhausted, stream stopped, external shutdown). For the reactive
    /// variant, which is driven externally via `process_audio`, this
    /// returns immediately.
    fn run(&mut self) -> Result<()>;

    /// Release whatever `init` acquired. Idempotent.
    fn cleanup(&mut self);

    /// Pause or resume. Delegates to [`sushi_engine::AudioEngine::pause`],
    /// which ramps output to silence across one chunk before the RT thread
    /// acknowledges (§4.8 "All variants must implement a pause ramp").
    fn pause(&mut self, paused: bool) -> bool;

    /// Report the frontend's measured output latency to the engine so
    /// timestamp-sensitive processors (delay compensation, sync) can
    /// account for it.
    fn set_output_latency(&mut self, latency: Duration);
}
