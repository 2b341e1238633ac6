//! Process-wide unique identifiers (§3).
//!
//! Every Processor and every Track receives a 32-bit id at creation, never
//! reused within a run. Parameters and properties carry ids unique within
//! their owning Processor.

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic id allocator. One instance lives in the engine; ids are never
/// reused within a run, matching the spec's identifier invariant.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

macro_rules! declare_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

declare_id!(ProcessorId, "Process-wide unique identifier for a Processor.");
declare_id!(TrackId, "Process-wide unique identifier for a Track.");
declare_id!(ParameterId, "Identifier for a Parameter, unique within its owning Processor.");
declare_id!(PropertyId, "Identifier for a Property, unique within its owning Processor.");

/// Fingerprints a parameter globally: `(processor_id, parameter_id)` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterAddress {
    pub processor: ProcessorId,
    pub parameter: ParameterId,
}

impl ParameterAddress {
    pub fn new(processor: ProcessorId, parameter: ParameterId) -> Self {
        Self { processor, parameter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let alloc = IdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
