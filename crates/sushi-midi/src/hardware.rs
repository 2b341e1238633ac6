//! Real MIDI hardware ports via `midir`, behind the `midi-io` feature.
//! Everything in [`crate::dispatcher`] is testable without this module —
//! this is just one way to feed [`MidiDispatcher::handle_raw_message`] and
//! to realize [`MidiOutputPort`] against an actual device.

use crate::dispatcher::{MidiDispatcher, MidiOutputPort};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection as MidirOutputConnection};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Opens every available hardware input port and forwards its bytes to
/// `dispatcher.handle_raw_message(virtual_port, ...)`, where `virtual_port`
/// is the port's index in `midir`'s enumeration order — matching the
/// connection table's `port` field (§4.7: "N virtual MIDI inputs").
///
/// Each connection must be kept alive for the duration it should stay open;
/// the caller owns the returned handles.
pub fn open_all_input_ports(dispatcher: Arc<MidiDispatcher>) -> Vec<MidiInputConnection<()>> {
    let midi_in = match MidiInput::new("sushi-midi-in") {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "failed to open MIDI input subsystem");
            return Vec::new();
        }
    };

    let mut connections = Vec::new();
    for (virtual_port, port) in midi_in.ports().iter().enumerate() {
        let midi_in = match MidiInput::new("sushi-midi-in") {
            Ok(m) => m,
            Err(_) => continue,
        };
        let port_name = midi_in.port_name(port).unwrap_or_else(|_| format!("port {virtual_port}"));
        let dispatcher = dispatcher.clone();
        let connection = midi_in.connect(
            port,
            "sushi-midi-in",
            move |_timestamp, bytes, _| {
                dispatcher.handle_raw_message(virtual_port, now_micros(), bytes);
            },
            (),
        );
        match connection {
            Ok(conn) => {
                info!(port = virtual_port, name = %port_name, "opened MIDI input port");
                connections.push(conn);
            }
            Err(e) => warn!(port = virtual_port, error = %e, "failed to open MIDI input port"),
        }
    }
    connections
}

/// A [`MidiOutputPort`] backed by a fixed set of `midir` output connections,
/// one per virtual output index (§4.7: "M virtual outputs").
pub struct HardwareOutputPort {
    connections: Vec<Option<MidirOutputConnection>>,
}

impl HardwareOutputPort {
    pub fn open_all() -> Self {
        let midi_out = match MidiOutput::new("sushi-midi-out") {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to open MIDI output subsystem");
                return Self { connections: Vec::new() };
            }
        };

        let mut connections = Vec::new();
        for (virtual_port, port) in midi_out.ports().iter().enumerate() {
            let midi_out = match MidiOutput::new("sushi-midi-out") {
                Ok(m) => m,
                Err(_) => {
                    connections.push(None);
                    continue;
                }
            };
            match midi_out.connect(port, "sushi-midi-out") {
                Ok(conn) => connections.push(Some(conn)),
                Err(e) => {
                    warn!(port = virtual_port, error = %e, "failed to open MIDI output port");
                    connections.push(None);
                }
            }
        }
        Self { connections }
    }
}

impl MidiOutputPort for HardwareOutputPort {
    fn send(&mut self, port: usize, bytes: &[u8]) {
        if let Some(Some(conn)) = self.connections.get_mut(port) {
            if let Err(e) = conn.send(bytes) {
                warn!(port, error = %e, "failed to send MIDI output");
            }
        }
    }
}
