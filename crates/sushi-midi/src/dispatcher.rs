//! MIDI Dispatcher (C9, §4.7): decodes raw MIDI bytes, resolves them against
//! the input connection table, and posts RT events through the shared
//! [`EngineHandle`]; reflects parameter-change notifications from the
//! Event Dispatcher back out as CC messages through the output connection
//! table. Decoupled from whichever layer physically owns the byte stream —
//! [`Self::handle_raw_message`] is the single entry point a hardware port, a
//! file-driven frontend, or a test can all call the same way.

use crate::connection::{InputConnectionTable, MidiInputTarget, OutputConnectionTable};
use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};
use parking_lot::Mutex;
use sushi_core::config::{MidiInputConnection, MidiOutputConnection};
use sushi_core::{NoteEvent, Notification, ParameterChange, RtEvent, RtEventKind, AUDIO_CHUNK_SIZE};
use sushi_dispatch::{EventDispatcher, PosterId};
use sushi_engine::EngineHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sink for outgoing MIDI bytes, one call per virtual output port. Kept
/// trait-object so the dispatcher never depends on a concrete transport —
/// real hardware ports live behind the `midi-io` feature in [`crate::hardware`].
pub trait MidiOutputPort: Send {
    fn send(&mut self, port: usize, bytes: &[u8]);
}

/// Drops every byte written to it; the default sink when no real output
/// port is wired up (and the sink used by tests).
#[derive(Default)]
pub struct NullOutputPort;

impl MidiOutputPort for NullOutputPort {
    fn send(&mut self, port: usize, bytes: &[u8]) {
        debug!(port, len = bytes.len(), "dropping MIDI output (no sink attached)");
    }
}

/// How far into the current chunk a message timestamped `timestamp_micros`
/// logically falls, derived from the engine's configured sample rate (§4.7:
/// "a sample offset derived from the message timestamp").
fn sample_offset_from_timestamp(timestamp_micros: u64, sample_rate: f32) -> usize {
    if sample_rate <= 0.0 {
        return 0;
    }
    let chunk_micros = (AUDIO_CHUNK_SIZE as f64 / sample_rate as f64 * 1_000_000.0).max(1.0);
    let phase = (timestamp_micros as f64) % chunk_micros;
    let offset = (phase / chunk_micros * AUDIO_CHUNK_SIZE as f64) as usize;
    offset.min(AUDIO_CHUNK_SIZE - 1)
}

fn encode_cc(channel: u8, cc_number: u8, normalized_value: f32) -> Vec<u8> {
    let value = (normalized_value.clamp(0.0, 1.0) * 127.0).round() as u8;
    let msg = MidiMsg::ChannelVoice {
        channel: Channel::from_u8(channel),
        msg: ChannelVoiceMsg::ControlChange {
            control: ControlChange::CC { control: cc_number, value },
        },
    };
    msg.to_midi()
}

/// Owns the input/output connection tables and the background thread that
/// fans Event Dispatcher notifications back out as MIDI (§4.7).
pub struct MidiDispatcher {
    engine: EngineHandle,
    input_table: Arc<Mutex<InputConnectionTable>>,
    output_table: Arc<Mutex<OutputConnectionTable>>,
    dispatcher: Arc<EventDispatcher>,
    poster_id: PosterId,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MidiDispatcher {
    pub fn new(engine: EngineHandle, dispatcher: Arc<EventDispatcher>, output_port: Box<dyn MidiOutputPort>) -> Self {
        let input_table = Arc::new(Mutex::new(InputConnectionTable::new()));
        let output_table = Arc::new(Mutex::new(OutputConnectionTable::new()));
        let running = Arc::new(AtomicBool::new(true));

        let (poster_id, receiver) = dispatcher.register_poster();
        let worker_output_table = output_table.clone();
        let worker_running = running.clone();
        let mut output_port = output_port;
        let thread = std::thread::Builder::new()
            .name("sushi-midi-dispatcher".into())
            .spawn(move || {
                while worker_running.load(Ordering::Acquire) {
                    match receiver.recv_timeout(Duration::from_millis(50)) {
                        Ok(Notification::ParameterChanged { processor, normalized_value, .. }) => {
                            let table = worker_output_table.lock();
                            for route in table.matching(processor) {
                                let bytes = encode_cc(route.channel, route.cc_number, normalized_value);
                                output_port.send(route.port, &bytes);
                            }
                        }
                        Ok(_) => {}
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn MIDI dispatcher thread");

        Self {
            engine,
            input_table,
            output_table,
            dispatcher,
            poster_id,
            running,
            thread: Some(thread),
        }
    }

    pub fn set_input_connections(&self, entries: &[MidiInputConnection]) {
        *self.input_table.lock() = InputConnectionTable::from_config(entries);
    }

    pub fn set_output_connections(&self, entries: &[MidiOutputConnection]) {
        *self.output_table.lock() = OutputConnectionTable::from_config(entries);
    }

    /// Decode one raw MIDI message arriving on `port` at `timestamp_micros`
    /// and route it against the input connection table. Unmatched messages
    /// are dropped, never forwarded (§4.7). Returns the number of RT events
    /// posted, for callers (and tests) that want to confirm a match.
    pub fn handle_raw_message(&self, port: usize, timestamp_micros: u64, bytes: &[u8]) -> usize {
        let Ok((msg, _len)) = MidiMsg::from_midi(bytes) else {
            return 0;
        };
        let MidiMsg::ChannelVoice { channel, msg } = msg else {
            return 0;
        };
        let channel_num = channel as u8;
        let table = self.input_table.lock();
        let mut posted = 0;

        match msg {
            ChannelVoiceMsg::NoteOn { note, velocity } if velocity > 0 => {
                posted += self.route_note(&table, port, channel_num, note, velocity, timestamp_micros, true);
            }
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                posted += self.route_note(&table, port, channel_num, note, velocity, timestamp_micros, false);
            }
            ChannelVoiceMsg::NoteOff { note, velocity } => {
                posted += self.route_note(&table, port, channel_num, note, velocity, timestamp_micros, false);
            }
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control: cc_number, value },
            } => {
                for route in table.ccs_matching(port, channel_num, cc_number) {
                    if let MidiInputTarget::ProcessorParameter { processor, parameter } = route.target {
                        let normalized = value as f32 / 127.0;
                        let mapped = route.map_cc(normalized);
                        let kind = RtEventKind::ParameterChange(ParameterChange {
                            processor,
                            parameter,
                            normalized_value: mapped,
                        });
                        if self.post(kind, timestamp_micros) {
                            posted += 1;
                        }
                    }
                }
            }
            ChannelVoiceMsg::ProgramChange { program } => {
                for route in table.programs_matching(port, channel_num) {
                    if let MidiInputTarget::ProcessorProgram { processor } = route.target {
                        let kind = RtEventKind::ProgramChange {
                            processor,
                            program: program as usize,
                        };
                        if self.post(kind, timestamp_micros) {
                            posted += 1;
                        }
                    }
                }
            }
            _ => {}
        }

        if table.any_raw_passthrough(port, channel_num) {
            debug!(port, channel = channel_num, "raw MIDI passthrough requested but no raw sink is wired up");
        }

        posted
    }

    fn route_note(
        &self,
        table: &InputConnectionTable,
        port: usize,
        channel: u8,
        note: u8,
        velocity: u8,
        timestamp_micros: u64,
        is_on: bool,
    ) -> usize {
        let normalized_velocity = velocity as f32 / 127.0;
        let mut posted = 0;
        for route in table.notes_matching(port, channel, note) {
            if let MidiInputTarget::TrackKeyboard(track) = route.target {
                let event = NoteEvent {
                    track,
                    channel,
                    note,
                    velocity: normalized_velocity,
                };
                let kind = if is_on { RtEventKind::NoteOn(event) } else { RtEventKind::NoteOff(event) };
                if self.post(kind, timestamp_micros) {
                    posted += 1;
                }
            }
        }
        posted
    }

    fn post(&self, kind: RtEventKind, timestamp_micros: u64) -> bool {
        let sample_rate = self.engine.config().sample_rate;
        let offset = sample_offset_from_timestamp(timestamp_micros, sample_rate);
        let event = RtEvent::new(kind, offset, timestamp_micros).expect("offset clamped within chunk bounds");
        let accepted = self.engine.post_to_rt(event);
        if !accepted {
            debug!("to-RT queue full, dropping MIDI-derived event");
        }
        accepted
    }
}

impl Drop for MidiDispatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.dispatcher.deregister_poster(self.poster_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sushi_core::config::EngineConfig;
    use sushi_engine::AudioEngine;

    fn handle() -> EngineHandle {
        AudioEngine::new(EngineConfig::default(), 2).1
    }

    #[test]
    fn note_on_within_range_posts_note_on_event() {
        let engine = handle();
        let event_dispatcher = Arc::new(EventDispatcher::new(engine.clone(), Duration::from_millis(5)));
        let midi = MidiDispatcher::new(engine.clone(), event_dispatcher, Box::new(NullOutputPort));
        midi.set_input_connections(&[MidiInputConnection {
            port: 0,
            channel: 0,
            target_track: 7,
            ..Default::default()
        }]);

        let posted = midi.handle_raw_message(0, 0, &[0x90, 60, 100]);
        assert_eq!(posted, 1);
    }

    #[test]
    fn velocity_normalizes_to_expected_fraction() {
        let velocity: u8 = 100;
        let normalized = velocity as f32 / 127.0;
        assert!((normalized - 0.787).abs() < 0.001);
    }

    #[test]
    fn unmatched_port_drops_message() {
        let engine = handle();
        let event_dispatcher = Arc::new(EventDispatcher::new(engine.clone(), Duration::from_millis(5)));
        let midi = MidiDispatcher::new(engine.clone(), event_dispatcher, Box::new(NullOutputPort));
        midi.set_input_connections(&[MidiInputConnection {
            port: 0,
            channel: 0,
            target_track: 7,
            ..Default::default()
        }]);

        let posted = midi.handle_raw_message(1, 0, &[0x90, 60, 100]);
        assert_eq!(posted, 0);
    }

    #[test]
    fn out_of_range_cc_maps_to_value_range() {
        let route = crate::connection::MidiInputRoute::from(&MidiInputConnection {
            port: 0,
            channel: 0,
            target_processor: Some(1),
            target_parameter: Some(2),
            cc_number: Some(74),
            value_min: 20.0,
            value_max: 20000.0,
            ..Default::default()
        });
        let mapped = route.map_cc(0.0);
        assert!((mapped - 20.0).abs() < 1e-3);
    }

    #[test]
    fn drain_sample_offset_stays_within_chunk() {
        let offset = sample_offset_from_timestamp(123_456, 48_000.0);
        assert!(offset < AUDIO_CHUNK_SIZE);
    }

    #[test]
    fn encode_cc_round_trips_through_midi_msg() {
        let bytes = encode_cc(2, 74, 0.5);
        let (msg, _) = MidiMsg::from_midi(&bytes).unwrap();
        match msg {
            MidiMsg::ChannelVoice {
                channel,
                msg: ChannelVoiceMsg::ControlChange {
                    control: ControlChange::CC { control, value },
                },
            } => {
                assert_eq!(channel as u8, 2);
                assert_eq!(control, 74);
                assert_eq!(value, 64);
            }
            _ => panic!("expected a CC message"),
        }
    }
}
