//! Process-wide read-only graph view (§4.5 "Query operations"): published by
//! the RT thread only when it acknowledges a graph mutation, read by non-RT
//! threads without locking.

use arc_swap::ArcSwap;
use sushi_core::{ParameterId, ProcessorId, TrackId, TrackKind};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ParameterSnapshot {
    pub id: ParameterId,
    pub name: Arc<str>,
    pub normalized_value: f32,
}

#[derive(Debug, Clone)]
pub struct ProcessorSnapshot {
    pub id: ProcessorId,
    pub name: Arc<str>,
    pub bypassed: bool,
    pub parameters: Vec<ParameterSnapshot>,
}

#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub name: Arc<str>,
    pub kind: TrackKind,
    pub channel_count: usize,
    pub gain_normalized: f32,
    pub processors: Vec<ProcessorSnapshot>,
}

/// An immutable, versioned view of the whole graph (§5: "readers may retry
/// on version change or accept a slightly stale view").
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub version: u64,
    pub tracks: Vec<TrackSnapshot>,
}

impl EngineSnapshot {
    pub fn track(&self, id: TrackId) -> Option<&TrackSnapshot> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_by_name(&self, name: &str) -> Option<&TrackSnapshot> {
        self.tracks.iter().find(|t| t.name.as_ref() == name)
    }

    pub fn processor(&self, id: ProcessorId) -> Option<&ProcessorSnapshot> {
        self.tracks.iter().flat_map(|t| &t.processors).find(|p| p.id == id)
    }

    pub fn processor_by_name(&self, name: &str) -> Option<&ProcessorSnapshot> {
        self.tracks
            .iter()
            .flat_map(|t| &t.processors)
            .find(|p| p.name.as_ref() == name)
    }
}

/// Published side: the RT thread builds a fresh [`EngineSnapshot`] after each
/// chunk where a graph mutation occurred and stores it here.
pub struct SnapshotPublisher {
    current: Arc<ArcSwap<EngineSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(EngineSnapshot::default())),
        }
    }

    pub fn publish(&self, snapshot: EngineSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            current: self.current.clone(),
        }
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-RT-side read handle — any number of these may exist, cloned freely.
#[derive(Clone)]
pub struct SnapshotReader {
    current: Arc<ArcSwap<EngineSnapshot>>,
}

impl SnapshotReader {
    pub fn load(&self) -> Arc<EngineSnapshot> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_sees_published_snapshot() {
        let publisher = SnapshotPublisher::new();
        let reader = publisher.reader();
        assert_eq!(reader.load().version, 0);

        publisher.publish(EngineSnapshot {
            version: 1,
            tracks: vec![TrackSnapshot {
                id: TrackId(1),
                name: Arc::from("master"),
                kind: TrackKind::Regular,
                channel_count: 2,
                gain_normalized: 1.0,
                processors: Vec::new(),
            }],
        });

        let snapshot = reader.load();
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.track_by_name("master").is_some());
    }
}
