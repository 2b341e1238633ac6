//! Persistable engine and session configuration (§10.3, §6).

use serde::{Deserialize, Serialize};

/// Ambient engine configuration: everything that's decided once at startup
/// and is not itself part of the DSP graph description (that grammar is a
/// non-goal — see SPEC_FULL §10.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub rt_cpu_cores: usize,
    pub realtime_priority_hint: bool,
    pub to_rt_queue_capacity: usize,
    pub from_rt_queue_capacity: usize,
    pub deletion_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            rt_cpu_cores: 1,
            realtime_priority_hint: true,
            to_rt_queue_capacity: 1024,
            from_rt_queue_capacity: 1024,
            deletion_queue_capacity: 256,
        }
    }
}

/// A single MIDI input connection table entry (§6, §4.7): `{port, channel,
/// match(note_range|cc_number|pc), target(track|processor/parameter|
/// processor/program), optional value-range mapping, optional
/// raw-passthrough flag}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiInputConnection {
    pub port: usize,
    pub channel: u8,
    pub target_track: u32,
    pub target_processor: Option<u32>,
    pub target_parameter: Option<u32>,
    /// Restricts note on/off routing to this inclusive range. Ignored for CC
    /// and program-change targets.
    pub note_low: u8,
    pub note_high: u8,
    /// CC number this entry maps, when `target_parameter` is set. `None`
    /// means the entry routes note/program-change messages instead.
    pub cc_number: Option<u8>,
    /// Range the matched CC's normalized `[0, 1]` value is rescaled into
    /// before being applied as a parameter change.
    pub value_min: f32,
    pub value_max: f32,
    pub raw_passthrough: bool,
}

impl Default for MidiInputConnection {
    fn default() -> Self {
        Self {
            port: 0,
            channel: 0,
            target_track: 0,
            target_processor: None,
            target_parameter: None,
            note_low: 0,
            note_high: 127,
            cc_number: None,
            value_min: 0.0,
            value_max: 1.0,
            raw_passthrough: false,
        }
    }
}

/// A single MIDI output connection table entry (§6, §4.7): reflects
/// parameter-change notifications from `source_processor` back out as CC
/// messages on `port`/`channel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiOutputConnection {
    pub source_processor: u32,
    pub cc_number: u8,
    pub port: usize,
    pub channel: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidiConfig {
    pub input_count: usize,
    pub output_count: usize,
    pub inputs: Vec<MidiInputConnection>,
    pub outputs: Vec<MidiOutputConnection>,
    pub clock_outputs: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorState {
    pub name: String,
    pub uid: String,
    pub kind: String,
    pub path: Option<String>,
    pub state_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    pub kind: String,
    pub channels: usize,
    pub processors: Vec<ProcessorState>,
}

/// The persistable snapshot a session save/restore walks (§4.9, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub midi: MidiConfig,
    pub tracks: Vec<TrackConfig>,
}

impl SessionConfig {
    pub fn empty(engine: EngineConfig) -> Self {
        Self {
            engine,
            midi: MidiConfig::default(),
            tracks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_default_round_trips_toml() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.sample_rate, config.sample_rate);
        assert_eq!(back.rt_cpu_cores, config.rt_cpu_cores);
    }

    #[test]
    fn session_config_round_trips_json() {
        let session = SessionConfig::empty(EngineConfig::default());
        let text = serde_json::to_string(&session).unwrap();
        let back: SessionConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.tracks.len(), 0);
    }
}
