//! Core vocabulary of the sushi audio engine: sample buffers, RT events,
//! parameters, ids, the Processor/Track/Transport contracts. No threads of
//! its own, no I/O — everything else in the workspace builds on this.

pub mod atomic;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod parameter;
pub mod processor;
pub mod rt_event;
pub mod track;
pub mod transport;

pub use buffer::{SampleBuffer, AUDIO_CHUNK_SIZE};
pub use clock::Clock;
pub use error::{Error, Result};
pub use ids::{IdAllocator, ParameterAddress, ParameterId, ProcessorId, PropertyId, TrackId};
pub use parameter::{DomainMapping, Parameter, ParameterKind, Property};
pub use processor::{BoxedProcessor, GainProcessor, PassthroughProcessor, Processor};
pub use rt_event::{
    ControllerEvent, GraphMutation, NoteEvent, Notification, ParameterChange, PlayingMode,
    PropertyChange, RtEvent, RtEventKind, StateBytes, SyncMode, TransportChange,
};
pub use track::{Track, TrackKind};
pub use transport::Transport;
