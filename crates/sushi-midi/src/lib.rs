//! MIDI Dispatcher (C9): connection tables mapping raw MIDI bytes to RT
//! events and back, independent of the transport that carries those bytes.

pub mod connection;
pub mod dispatcher;
#[cfg(feature = "midi-io")]
pub mod hardware;

pub use connection::{InputConnectionTable, MidiInputRoute, MidiInputTarget, MidiOutputRoute, OutputConnectionTable};
pub use dispatcher::{MidiDispatcher, MidiOutputPort, NullOutputPort};
