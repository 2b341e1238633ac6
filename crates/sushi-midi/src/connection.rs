//! Input/output MIDI connection tables (§4.7, §6). Each incoming message is
//! resolved against [`InputConnectionTable`] in O(table size); each outgoing
//! parameter-change notification is resolved against
//! [`OutputConnectionTable`] the same way. Tables are built from the
//! persisted [`MidiInputConnection`]/[`MidiOutputConnection`] entries that
//! travel inside [`sushi_core::config::MidiConfig`].

use sushi_core::config::{MidiInputConnection, MidiOutputConnection};
use sushi_core::{ParameterId, ProcessorId, TrackId};

/// What an incoming message becomes once a [`MidiInputRoute`] matches it.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiInputTarget {
    /// Note on/off messages become keyboard input on this track.
    TrackKeyboard(TrackId),
    /// A CC message is rescaled into `[value_min, value_max]` and applied to
    /// this processor parameter.
    ProcessorParameter { processor: ProcessorId, parameter: ParameterId },
    /// A program-change message selects this processor's program.
    ProcessorProgram { processor: ProcessorId },
}

/// One resolved input route (§4.7: "match(note_range|cc_number|pc),
/// target(...), optional value-range mapping, optional raw-passthrough
/// flag)").
#[derive(Debug, Clone, PartialEq)]
pub struct MidiInputRoute {
    pub port: usize,
    pub channel: u8,
    pub note_low: u8,
    pub note_high: u8,
    pub cc_number: Option<u8>,
    pub value_min: f32,
    pub value_max: f32,
    pub raw_passthrough: bool,
    pub target: MidiInputTarget,
}

impl From<&MidiInputConnection> for MidiInputRoute {
    fn from(entry: &MidiInputConnection) -> Self {
        let target = match (entry.target_processor, entry.target_parameter) {
            (Some(processor), Some(parameter)) => MidiInputTarget::ProcessorParameter {
                processor: ProcessorId(processor),
                parameter: ParameterId(parameter),
            },
            (Some(processor), None) => MidiInputTarget::ProcessorProgram {
                processor: ProcessorId(processor),
            },
            (None, _) => MidiInputTarget::TrackKeyboard(TrackId(entry.target_track)),
        };
        Self {
            port: entry.port,
            channel: entry.channel,
            note_low: entry.note_low,
            note_high: entry.note_high,
            cc_number: entry.cc_number,
            value_min: entry.value_min,
            value_max: entry.value_max,
            raw_passthrough: entry.raw_passthrough,
            target,
        }
    }
}

impl MidiInputRoute {
    /// Rescale a normalized `[0, 1]` CC value into this route's mapped range.
    pub fn map_cc(&self, normalized: f32) -> f32 {
        self.value_min + normalized.clamp(0.0, 1.0) * (self.value_max - self.value_min)
    }

    fn port_channel_match(&self, port: usize, channel: u8) -> bool {
        self.port == port && self.channel == channel
    }

    pub fn matches_note(&self, port: usize, channel: u8, note: u8) -> bool {
        matches!(self.target, MidiInputTarget::TrackKeyboard(_))
            && self.port_channel_match(port, channel)
            && note >= self.note_low
            && note <= self.note_high
    }

    pub fn matches_cc(&self, port: usize, channel: u8, cc_number: u8) -> bool {
        matches!(self.target, MidiInputTarget::ProcessorParameter { .. })
            && self.port_channel_match(port, channel)
            && self.cc_number == Some(cc_number)
    }

    pub fn matches_program(&self, port: usize, channel: u8) -> bool {
        matches!(self.target, MidiInputTarget::ProcessorProgram { .. }) && self.port_channel_match(port, channel)
    }
}

/// Ordered list of input routes, scanned top-to-bottom per message.
#[derive(Debug, Clone, Default)]
pub struct InputConnectionTable {
    routes: Vec<MidiInputRoute>,
}

impl InputConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entries: &[MidiInputConnection]) -> Self {
        Self {
            routes: entries.iter().map(MidiInputRoute::from).collect(),
        }
    }

    pub fn push(&mut self, route: MidiInputRoute) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[MidiInputRoute] {
        &self.routes
    }

    pub fn notes_matching(&self, port: usize, channel: u8, note: u8) -> impl Iterator<Item = &MidiInputRoute> {
        self.routes.iter().filter(move |r| r.matches_note(port, channel, note))
    }

    pub fn ccs_matching(&self, port: usize, channel: u8, cc_number: u8) -> impl Iterator<Item = &MidiInputRoute> {
        self.routes.iter().filter(move |r| r.matches_cc(port, channel, cc_number))
    }

    pub fn programs_matching(&self, port: usize, channel: u8) -> impl Iterator<Item = &MidiInputRoute> {
        self.routes.iter().filter(move |r| r.matches_program(port, channel))
    }

    /// Whether any route on this port/channel asked for the raw bytes too
    /// (§4.7 "optional raw-MIDI passthrough flag").
    pub fn any_raw_passthrough(&self, port: usize, channel: u8) -> bool {
        self.routes.iter().any(|r| r.port_channel_match(port, channel) && r.raw_passthrough)
    }
}

/// One resolved output route: reflects parameter-change notifications from
/// `source_processor` back out as a CC message (§4.7: "for outgoing
/// notifications... it reverses the process").
#[derive(Debug, Clone, PartialEq)]
pub struct MidiOutputRoute {
    pub source_processor: ProcessorId,
    pub cc_number: u8,
    pub port: usize,
    pub channel: u8,
}

impl From<&MidiOutputConnection> for MidiOutputRoute {
    fn from(entry: &MidiOutputConnection) -> Self {
        Self {
            source_processor: ProcessorId(entry.source_processor),
            cc_number: entry.cc_number,
            port: entry.port,
            channel: entry.channel,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputConnectionTable {
    routes: Vec<MidiOutputRoute>,
}

impl OutputConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entries: &[MidiOutputConnection]) -> Self {
        Self {
            routes: entries.iter().map(MidiOutputRoute::from).collect(),
        }
    }

    pub fn push(&mut self, route: MidiOutputRoute) {
        self.routes.push(route);
    }

    pub fn matching(&self, processor: ProcessorId) -> impl Iterator<Item = &MidiOutputRoute> {
        self.routes.iter().filter(move |r| r.source_processor == processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc_entry() -> MidiInputConnection {
        MidiInputConnection {
            port: 0,
            channel: 0,
            target_processor: Some(3),
            target_parameter: Some(1),
            cc_number: Some(7),
            value_min: 0.0,
            value_max: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn cc_route_maps_midpoint_value() {
        let route = MidiInputRoute::from(&cc_entry());
        assert!((route.map_cc(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn note_range_filters_out_of_range_notes() {
        let entry = MidiInputConnection {
            port: 0,
            channel: 0,
            target_track: 5,
            note_low: 60,
            note_high: 72,
            ..Default::default()
        };
        let route = MidiInputRoute::from(&entry);
        assert!(route.matches_note(0, 0, 60));
        assert!(!route.matches_note(0, 0, 59));
        assert!(!route.matches_note(0, 0, 73));
    }

    #[test]
    fn table_resolves_only_matching_cc_route() {
        let table = InputConnectionTable::from_config(&[cc_entry()]);
        assert_eq!(table.ccs_matching(0, 0, 7).count(), 1);
        assert_eq!(table.ccs_matching(0, 0, 8).count(), 0);
        assert_eq!(table.ccs_matching(1, 0, 7).count(), 0);
    }

    #[test]
    fn output_table_finds_routes_by_source_processor() {
        let table = OutputConnectionTable::from_config(&[MidiOutputConnection {
            source_processor: 4,
            cc_number: 10,
            port: 0,
            channel: 2,
        }]);
        assert_eq!(table.matching(ProcessorId(4)).count(), 1);
        assert_eq!(table.matching(ProcessorId(5)).count(), 0);
    }
}
