//! Lock-free primitives for real-time audio.
//!
//! These are the only mutable state the RT thread shares with non-RT readers
//! outside of the event queues (§5: "Non-RT ↔ RT communication uses only
//! bounded SPSC lock-free queues and atomic variables").

use atomic_float::{AtomicF32, AtomicF64};
use std::sync::atomic::Ordering;

/// Cache-line aligned atomic f32.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic f64, used for beat positions and sample clocks.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicDouble {
    value: AtomicF64,
}

impl AtomicDouble {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }
}

impl Clone for AtomicDouble {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicDouble {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool, used for flags read every chunk (paused,
/// realtime-enabled, xrun-pending, …).
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: std::sync::atomic::AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: std::sync::atomic::AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// A monotonically increasing version counter, published by the RT thread on
/// every graph mutation and polled by non-RT readers to detect staleness of a
/// cached snapshot (§5: "readers may retry on version change or accept a
/// slightly stale view").
#[derive(Debug, Default)]
pub struct VersionCounter {
    value: std::sync::atomic::AtomicU64,
}

impl VersionCounter {
    pub fn new() -> Self {
        Self {
            value: std::sync::atomic::AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn bump(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_float_roundtrip() {
        let v = AtomicFloat::new(1.0);
        assert_eq!(v.get(), 1.0);
        v.set(2.5);
        assert_eq!(v.get(), 2.5);
        assert_eq!(v.swap(4.0), 2.5);
        assert_eq!(v.get(), 4.0);
    }

    #[test]
    fn atomic_flag_roundtrip() {
        let flag = AtomicFlag::new(false);
        assert!(!flag.get());
        flag.set(true);
        assert!(flag.get());
    }

    #[test]
    fn version_counter_bumps() {
        let v = VersionCounter::new();
        assert_eq!(v.get(), 0);
        assert_eq!(v.bump(), 1);
        assert_eq!(v.bump(), 2);
        assert_eq!(v.get(), 2);
    }
}
