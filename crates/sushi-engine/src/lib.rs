//! The Audio Engine (C7): owns the processing graph, the routing tables, the
//! CPU timing counters and the multicore worker pool, and drives one chunk of
//! audio per call to [`AudioEngine::process_chunk`]. Built on `sushi-core`'s
//! vocabulary and `sushi-rt`'s lock-free plumbing; has no I/O of its own — an
//! Audio Frontend owns the actual device/file loop and calls into this crate
//! once per chunk.

pub mod connection;
pub mod engine;
pub mod handle;
pub mod snapshot;
pub mod timing;
pub mod worker_pool;

pub use connection::{ConnectionTable, ConnectionTableReader, ConnectionTarget};
pub use engine::{AudioEngine, RunState};
pub use handle::EngineHandle;
pub use snapshot::{EngineSnapshot, ParameterSnapshot, ProcessorSnapshot, SnapshotPublisher, SnapshotReader, TrackSnapshot};
pub use timing::{CpuMeter, CpuTimings};
pub use worker_pool::WorkerPool;
