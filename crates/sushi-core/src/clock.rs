//! Monotonic wall-clock source used for CPU timing statistics and as the
//! default timestamp source for frontends that don't supply their own.

use std::time::Instant;

/// A thin wrapper around [`Instant`] so call sites read as domain concepts
/// ("now", "elapsed_micros") rather than raw `std::time` calls, and so tests
/// can hold a fixed reference point.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Microseconds elapsed since this clock was created.
    pub fn elapsed_micros(&self) -> f32 {
        self.origin.elapsed().as_secs_f32() * 1_000_000.0
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
