//! Audio connection tables: engine-input-channel ↔ (track, track-channel) and
//! the reverse for output (§4.5 steps 5 and 7).
//!
//! Mirrors the teacher's `ArcSwap`-backed routing table shape (build a
//! mutable table off the RT thread, `commit()` an immutable snapshot the RT
//! thread loads once per chunk): a non-RT writer stages changes, an RT
//! reader only ever does zero-allocation lookups against the last committed
//! snapshot.

use arc_swap::ArcSwap;
use sushi_core::TrackId;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub track: TrackId,
    pub track_channel: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RoutingSnapshot {
    /// index = engine channel, value = all (track, channel) sinks fed by it.
    input_routes: Vec<Vec<ConnectionTarget>>,
    /// index = engine channel, value = all (track, channel) sources summed into it.
    output_routes: Vec<Vec<ConnectionTarget>>,
}

impl RoutingSnapshot {
    fn with_channel_count(engine_channels: usize) -> Self {
        Self {
            input_routes: vec![Vec::new(); engine_channels],
            output_routes: vec![Vec::new(); engine_channels],
        }
    }

    /// Zero-allocation lookup: an empty slice for an out-of-range channel,
    /// never an owned `Vec` (§5 — called from the RT thread every chunk).
    #[inline]
    pub(crate) fn inputs(&self, engine_channel: usize) -> &[ConnectionTarget] {
        self.input_routes.get(engine_channel).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn outputs(&self, engine_channel: usize) -> &[ConnectionTarget] {
        self.output_routes.get(engine_channel).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Non-RT-side builder. Stages connect/disconnect calls, `commit()`s an
/// immutable snapshot for the RT thread to load.
pub struct ConnectionTable {
    engine_channels: usize,
    staged: RoutingSnapshot,
    published: Arc<ArcSwap<RoutingSnapshot>>,
}

impl ConnectionTable {
    pub fn new(engine_channels: usize) -> Self {
        let snapshot = RoutingSnapshot::with_channel_count(engine_channels);
        Self {
            engine_channels,
            staged: snapshot.clone(),
            published: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// Idempotent: connecting the same (engine_channel, target) pair twice
    /// produces no duplicate (§8 "Idempotent routing").
    pub fn connect_input(&mut self, engine_channel: usize, target: ConnectionTarget) -> bool {
        if engine_channel >= self.engine_channels {
            return false;
        }
        let bucket = &mut self.staged.input_routes[engine_channel];
        if bucket.contains(&target) {
            return true;
        }
        bucket.push(target);
        true
    }

    /// Exact inverse of [`ConnectionTable::connect_input`] (§8).
    pub fn disconnect_input(&mut self, engine_channel: usize, target: ConnectionTarget) -> bool {
        if engine_channel >= self.engine_channels {
            return false;
        }
        let bucket = &mut self.staged.input_routes[engine_channel];
        let before = bucket.len();
        bucket.retain(|t| *t != target);
        bucket.len() != before
    }

    pub fn connect_output(&mut self, engine_channel: usize, source: ConnectionTarget) -> bool {
        if engine_channel >= self.engine_channels {
            return false;
        }
        let bucket = &mut self.staged.output_routes[engine_channel];
        if bucket.contains(&source) {
            return true;
        }
        bucket.push(source);
        true
    }

    pub fn disconnect_output(&mut self, engine_channel: usize, source: ConnectionTarget) -> bool {
        if engine_channel >= self.engine_channels {
            return false;
        }
        let bucket = &mut self.staged.output_routes[engine_channel];
        let before = bucket.len();
        bucket.retain(|t| *t != source);
        bucket.len() != before
    }

    /// Publish the staged table. The RT thread sees the new routing on its
    /// next chunk (§4.5: graph mutation swaps pointers, never allocates on
    /// the RT thread — here the allocation already happened while staging).
    pub fn commit(&self) {
        self.published.store(Arc::new(self.staged.clone()));
    }

    /// Handle for the RT thread to hold and `load()` once per chunk.
    pub fn reader(&self) -> ConnectionTableReader {
        ConnectionTableReader {
            snapshot: self.published.clone(),
        }
    }
}

/// RT-side read handle.
#[derive(Clone)]
pub struct ConnectionTableReader {
    snapshot: Arc<ArcSwap<RoutingSnapshot>>,
}

impl ConnectionTableReader {
    /// Load the currently-committed routing table. The returned guard is a
    /// cheap, independent handle (an `arc_swap::Guard`, not a borrow of
    /// `self`) so callers can hold it across an unrelated `&mut` borrow of
    /// other engine state while draining routes for every channel in a
    /// chunk — no per-channel allocation (§5, fixes the prior
    /// `input_targets`/`output_sources` Vec-per-call shape).
    #[inline]
    pub(crate) fn load(&self) -> arc_swap::Guard<Arc<RoutingSnapshot>> {
        self.snapshot.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(track: u32, channel: usize) -> ConnectionTarget {
        ConnectionTarget {
            track: TrackId(track),
            track_channel: channel,
        }
    }

    #[test]
    fn connect_is_idempotent() {
        let mut table = ConnectionTable::new(2);
        assert!(table.connect_input(0, target(1, 0)));
        assert!(table.connect_input(0, target(1, 0)));
        table.commit();
        let reader = table.reader();
        assert_eq!(reader.load().inputs(0).len(), 1);
    }

    #[test]
    fn disconnect_is_exact_inverse() {
        let mut table = ConnectionTable::new(2);
        table.connect_input(0, target(1, 0));
        table.commit();
        let reader = table.reader();
        assert_eq!(reader.load().inputs(0).len(), 1);

        table.disconnect_input(0, target(1, 0));
        table.commit();
        assert!(reader.load().inputs(0).is_empty());
    }

    #[test]
    fn output_routes_support_summed_targets() {
        let mut table = ConnectionTable::new(1);
        table.connect_output(0, target(1, 0));
        table.connect_output(0, target(2, 0));
        table.commit();
        let reader = table.reader();
        assert_eq!(reader.load().outputs(0).len(), 2);
    }
}
