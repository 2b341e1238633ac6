//! The real-time event (C2): a tagged union describing one sample-accurate
//! action, carried across the lock-free queues between non-RT and RT threads.

use crate::ids::{ParameterId, ProcessorId, PropertyId, TrackId};
use crate::processor::BoxedProcessor;
use crate::track::Track;

/// MIDI-style note payload, normalized velocity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub track: TrackId,
    pub channel: u8,
    pub note: u8,
    pub velocity: f32,
}

/// A MIDI continuous-controller value, normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerEvent {
    pub track: TrackId,
    pub channel: u8,
    pub controller: u8,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChange {
    pub processor: ProcessorId,
    pub parameter: ParameterId,
    pub normalized_value: f32,
}

#[derive(Debug, Clone)]
pub struct PropertyChange {
    pub processor: ProcessorId,
    pub property: PropertyId,
    pub value: String,
}

/// Graph topology mutations. Per §4.5/§9, the payload here carries ownership
/// of any newly allocated structure already constructed on a non-RT thread;
/// the RT thread only swaps pointers/indices, never allocates.
pub enum GraphMutation {
    AddProcessorToTrack {
        track: TrackId,
        processor: BoxedProcessor,
    },
    RemoveProcessorFromTrack {
        track: TrackId,
        processor: ProcessorId,
    },
    MoveProcessor {
        processor: ProcessorId,
        from_track: TrackId,
        to_track: TrackId,
        to_index: usize,
    },
    AddTrack {
        track: Box<Track>,
    },
    RemoveTrack {
        track: TrackId,
    },
}

impl std::fmt::Debug for GraphMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphMutation::AddProcessorToTrack { track, .. } => f
                .debug_struct("AddProcessorToTrack")
                .field("track", track)
                .finish(),
            GraphMutation::RemoveProcessorFromTrack { track, processor } => f
                .debug_struct("RemoveProcessorFromTrack")
                .field("track", track)
                .field("processor", processor)
                .finish(),
            GraphMutation::MoveProcessor {
                processor,
                from_track,
                to_track,
                to_index,
            } => f
                .debug_struct("MoveProcessor")
                .field("processor", processor)
                .field("from_track", from_track)
                .field("to_track", to_track)
                .field("to_index", to_index)
                .finish(),
            GraphMutation::AddTrack { track } => {
                f.debug_struct("AddTrack").field("track", &track.id()).finish()
            }
            GraphMutation::RemoveTrack { track } => {
                f.debug_struct("RemoveTrack").field("track", track).finish()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncMode {
    Internal,
    Midi,
    Gate,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayingMode {
    Stopped,
    Playing,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportChange {
    Tempo(f32),
    TimeSignature { numerator: u32, denominator: u32 },
    PlayingMode(PlayingMode),
    SyncMode(SyncMode),
    ExternalBeats { current_beats: f64, current_bar_beats: f64 },
}

/// An opaque processor-defined state blob, moved (not allocated) by the RT
/// thread; non-RT callers build it, the RT thread hands it to the processor.
#[derive(Debug, Clone, Default)]
pub struct StateBytes(pub Vec<u8>);

/// The tagged payload of one [`RtEvent`] (§3).
#[derive(Debug)]
pub enum RtEventKind {
    NoteOn(NoteEvent),
    NoteOff(NoteEvent),
    Aftertouch(NoteEvent),
    Controller(ControllerEvent),
    ParameterChange(ParameterChange),
    PropertyChange(PropertyChange),
    SetBypassed { processor: ProcessorId, bypassed: bool },
    ProgramChange { processor: ProcessorId, program: usize },
    SetProcessorState { processor: ProcessorId, state: StateBytes },
    AsyncWorkRequest { processor: ProcessorId, request_id: u64 },
    AsyncWorkCompletion { processor: ProcessorId, request_id: u64 },
    GraphMutation(GraphMutation),
    TransportChange(TransportChange),
    Shutdown,
}

/// A tagged, sample-offset-carrying RT event (§3). `sample_offset` is the
/// frame within the *current* chunk at which the event logically occurs;
/// invariant `sample_offset < AUDIO_CHUNK_SIZE` is checked at construction.
#[derive(Debug)]
pub struct RtEvent {
    pub sample_offset: usize,
    pub timestamp_micros: u64,
    pub kind: RtEventKind,
}

impl RtEvent {
    pub fn new(kind: RtEventKind, sample_offset: usize, timestamp_micros: u64) -> crate::error::Result<Self> {
        if sample_offset >= crate::buffer::AUDIO_CHUNK_SIZE {
            return Err(crate::error::Error::InvalidSampleOffset {
                offset: sample_offset,
                max: crate::buffer::AUDIO_CHUNK_SIZE,
            });
        }
        Ok(Self {
            sample_offset,
            timestamp_micros,
            kind,
        })
    }

    /// Construct at chunk-start (offset 0). All present RT event consumers
    /// apply events in order at the chunk boundary regardless of offset
    /// (§4.2), so most call sites that don't have sub-chunk timing use this.
    pub fn at_chunk_start(kind: RtEventKind, timestamp_micros: u64) -> Self {
        Self {
            sample_offset: 0,
            timestamp_micros,
            kind,
        }
    }
}

/// Outbound traffic on the from-RT queue (§3 "from-RT queue carries
/// notifications... back out", §4.5 step 9). Kept separate from
/// [`RtEventKind`] because every variant here must be `Clone` — the from-RT
/// queue never carries the boxed trait objects a graph mutation owns; by the
/// time a mutation is acknowledged, the engine already holds the processor.
#[derive(Debug, Clone)]
pub enum Notification {
    ParameterChanged {
        processor: ProcessorId,
        parameter: ParameterId,
        normalized_value: f32,
    },
    PropertyChanged {
        processor: ProcessorId,
        property: PropertyId,
        value: String,
    },
    TrackAdded {
        track: TrackId,
    },
    TrackRemoved {
        track: TrackId,
    },
    ProcessorAdded {
        track: TrackId,
        processor: ProcessorId,
    },
    ProcessorRemoved {
        track: TrackId,
        processor: ProcessorId,
    },
    ProcessorMoved {
        processor: ProcessorId,
        from_track: TrackId,
        to_track: TrackId,
    },
    TransportChanged(TransportChange),
    CpuTimings {
        average_load: f32,
        peak_load: f32,
        current_load: f32,
    },
    XrunOccurred,
    AsyncWorkCompletion {
        processor: ProcessorId,
        request_id: u64,
    },
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_sample_offset() {
        let err = RtEvent::new(RtEventKind::Shutdown, 64, 0).unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidSampleOffset { .. }));
    }

    #[test]
    fn accepts_boundary_sample_offset() {
        let ev = RtEvent::new(RtEventKind::Shutdown, 63, 0).unwrap();
        assert_eq!(ev.sample_offset, 63);
    }
}
