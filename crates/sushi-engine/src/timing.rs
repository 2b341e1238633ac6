//! Per-chunk CPU load tracking for the engine and per-track/processor
//! breakdowns (§4.3 step 5, §4.5 step 9 "update CPU timing counters").
//!
//! Grounded in the teacher's CPU meter: an exponential moving average plus a
//! peak, gated by an enable flag so timing collection (`enable_timing_statistics`
//! in the original C++ engine) costs nothing when off.

use sushi_core::atomic::{AtomicFlag, AtomicFloat};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CpuTimings {
    pub average_load: f32,
    pub peak_load: f32,
    pub current_load: f32,
    pub xrun_count: u64,
}

pub struct CpuMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    xruns: AtomicU64,
    samples: AtomicU32,
    chunk_period_micros: f64,
    enabled: AtomicFlag,
}

impl CpuMeter {
    pub fn new(sample_rate: f32, chunk_size: usize) -> Self {
        Self {
            current: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            average: AtomicFloat::new(0.0),
            xruns: AtomicU64::new(0),
            samples: AtomicU32::new(0),
            chunk_period_micros: chunk_size as f64 / sample_rate.max(1.0) as f64 * 1_000_000.0,
            enabled: AtomicFlag::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Record one chunk's processing time. Returns `true` exactly when this
    /// call crossed the xrun threshold (elapsed > 1.8x chunk period, per §8),
    /// so the caller can emit a single notification per occurrence.
    pub fn record(&self, elapsed_micros: f32) -> bool {
        if !self.enabled.get() {
            return false;
        }
        let load = (elapsed_micros as f64 / self.chunk_period_micros) as f32;
        self.current.set(load);
        if load > self.peak.get() {
            self.peak.set(load);
        }

        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        if elapsed_micros as f64 > 1.8 * self.chunk_period_micros {
            self.xruns.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Count an xrun reported by the Audio Frontend rather than detected
    /// from processing time (§4.8, §5).
    pub fn record_external_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> CpuTimings {
        CpuTimings {
            average_load: self.average.get() * 100.0,
            peak_load: self.peak.get() * 100.0,
            current_load: self.current.get() * 100.0,
            xrun_count: self.xruns.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.xruns.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_average_and_peak() {
        let meter = CpuMeter::new(48_000.0, 64);
        let period_micros = 64.0 / 48_000.0 * 1_000_000.0;
        meter.record(period_micros as f32 * 0.5);
        meter.record(period_micros as f32 * 0.2);
        let metrics = meter.metrics();
        assert!(metrics.peak_load >= metrics.average_load);
        assert!(metrics.average_load > 0.0);
    }

    #[test]
    fn reports_single_xrun_past_threshold() {
        let meter = CpuMeter::new(48_000.0, 64);
        let period_micros = 64.0 / 48_000.0 * 1_000_000.0;
        assert!(!meter.record(period_micros as f32 * 1.0));
        assert!(meter.record(period_micros as f32 * 2.0));
        assert_eq!(meter.metrics().xrun_count, 1);
    }

    #[test]
    fn disabled_meter_does_not_record() {
        let meter = CpuMeter::new(48_000.0, 64);
        meter.set_enabled(false);
        meter.record(10_000.0);
        assert_eq!(meter.metrics().average_load, 0.0);
    }
}
