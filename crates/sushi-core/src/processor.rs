//! Processor (C4): the abstract DSP unit contract, plus the small set of
//! internal processors the engine ships with.

use crate::buffer::SampleBuffer;
use crate::error::{Error, Result};
use crate::ids::{ParameterId, ProcessorId, PropertyId};
use crate::parameter::{Parameter, Property};
use crate::rt_event::{RtEventKind, StateBytes};
use std::sync::Arc;

/// A boxed, type-erased Processor — what flows through [`crate::rt_event::GraphMutation`]
/// and what a Track's processor chain is built from. `internal` vs. external
/// plugin hosts are both just implementors of this trait (§9: "use a small
/// tagged variant... each implementing the Processor trait").
pub type BoxedProcessor = Box<dyn Processor>;

/// The contract every DSP unit implements (§4.2). Implementors must be
/// `Send`: ownership moves to the RT thread on graph mutation and the
/// processor lives there until removed.
pub trait Processor: Send {
    fn id(&self) -> ProcessorId;
    fn name(&self) -> &str;
    fn label(&self) -> &str;

    /// Cheap `Arc` clone of the name for snapshot publication off the RT
    /// thread (§5). The default allocates, so RT-hosted implementors should
    /// override it; the two internal processors below do.
    fn name_arc(&self) -> Arc<str> {
        Arc::from(self.name())
    }

    fn channels_in(&self) -> usize;
    fn channels_out(&self) -> usize;

    fn bypassed(&self) -> bool;
    fn set_bypassed(&mut self, bypassed: bool);

    fn parameters(&self) -> &[Parameter];
    fn parameter(&self, id: ParameterId) -> Option<&Parameter> {
        self.parameters().iter().find(|p| p.id == id)
    }

    /// Fails `OUT_OF_RANGE`-shaped if `id` is unknown, `INVALID_ARGUMENTS`-shaped
    /// if `normalized_value` is outside `[0, 1]` (§4.2 error conditions).
    fn set_parameter(&mut self, id: ParameterId, normalized_value: f32) -> Result<()>;
    fn get_parameter(&self, id: ParameterId) -> Result<f32> {
        self.parameter(id)
            .map(|p| p.normalized())
            .ok_or(Error::UnknownParameter {
                processor: self.id().raw(),
                parameter: id.raw(),
            })
    }

    fn properties(&self) -> &[Property];
    fn set_property(&mut self, id: PropertyId, value: &str) -> Result<()>;

    fn programs(&self) -> &[String] {
        &[]
    }
    fn current_program(&self) -> usize {
        0
    }
    fn set_program(&mut self, _program: usize) -> Result<()> {
        Err(Error::NotImplemented(format!("{} has no programs", self.name())))
    }

    /// Handles a sample-accurate event. Called zero or more times per chunk,
    /// strictly before [`Processor::process_audio`]. Unrecognized event
    /// kinds are silently ignored (§4.2).
    fn process_event(&mut self, event: &RtEventKind);

    /// Consumes `input`, produces `output`. Must be deterministic, must not
    /// allocate, must not block. Has no error channel by design (§4.2).
    fn process_audio(&mut self, input: &SampleBuffer<'_>, output: &mut SampleBuffer<'_>);

    /// Serialize program, bypass, parameter/property values, and any opaque
    /// plugin-defined blob.
    fn state(&self) -> StateBytes;

    /// Restore from a previously serialized state. When `with_sync_flag` is
    /// set this must be RT-safe (no allocation); the default internal
    /// processors satisfy this unconditionally since their state is a flat
    /// byte encoding of already-allocated fields.
    fn set_state(&mut self, state: StateBytes, with_sync_flag: bool) -> Result<()>;
}

fn apply_parameter_change_event(parameters: &mut [Parameter], id: ParameterId, value: f32) -> bool {
    if let Some(p) = parameters.iter_mut().find(|p| p.id == id) {
        p.set_normalized_clamped(value);
        true
    } else {
        false
    }
}

/// Identity processor: copies input to output unchanged. Used as the minimal
/// internal processor and as a graph-building placeholder.
pub struct PassthroughProcessor {
    id: ProcessorId,
    name: Arc<str>,
    channels: usize,
    bypassed: bool,
    parameters: Vec<Parameter>,
    properties: Vec<Property>,
}

impl PassthroughProcessor {
    pub fn new(id: ProcessorId, name: impl Into<String>, channels: usize) -> Self {
        Self {
            id,
            name: Arc::from(name.into()),
            channels,
            bypassed: false,
            parameters: Vec::new(),
            properties: Vec::new(),
        }
    }
}

impl Processor for PassthroughProcessor {
    fn id(&self) -> ProcessorId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn label(&self) -> &str {
        &self.name
    }
    fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }
    fn channels_in(&self) -> usize {
        self.channels
    }
    fn channels_out(&self) -> usize {
        self.channels
    }
    fn bypassed(&self) -> bool {
        self.bypassed
    }
    fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
    fn set_parameter(&mut self, id: ParameterId, _value: f32) -> Result<()> {
        Err(Error::UnknownParameter {
            processor: self.id.raw(),
            parameter: id.raw(),
        })
    }
    fn properties(&self) -> &[Property] {
        &self.properties
    }
    fn set_property(&mut self, id: PropertyId, _value: &str) -> Result<()> {
        Err(Error::NotImplemented(format!("no property {id} on {}", self.name)))
    }
    fn process_event(&mut self, _event: &RtEventKind) {}
    fn process_audio(&mut self, input: &SampleBuffer<'_>, output: &mut SampleBuffer<'_>) {
        output.copy_from(input);
    }
    fn state(&self) -> StateBytes {
        StateBytes(vec![self.bypassed as u8])
    }
    fn set_state(&mut self, state: StateBytes, _with_sync_flag: bool) -> Result<()> {
        self.bypassed = state.0.first().copied().unwrap_or(0) != 0;
        Ok(())
    }
}

/// Internal gain processor: single "gain" parameter, linear-mapped to ±24 dB,
/// normalized 0.5 == 0 dB (the processor used in spec scenarios 1-3).
pub struct GainProcessor {
    id: ProcessorId,
    name: Arc<str>,
    channels: usize,
    bypassed: bool,
    parameters: Vec<Parameter>,
    properties: Vec<Property>,
}

impl GainProcessor {
    pub const GAIN_PARAMETER: ParameterId = ParameterId(0);

    pub fn new(id: ProcessorId, name: impl Into<String>, channels: usize) -> Self {
        let gain = Parameter::new(
            Self::GAIN_PARAMETER,
            "gain",
            "Gain",
            "dB",
            crate::parameter::ParameterKind::Float,
            -24.0,
            24.0,
        )
        .with_default_normalized(0.5);
        Self {
            id,
            name: Arc::from(name.into()),
            channels,
            bypassed: false,
            parameters: vec![gain],
            properties: Vec::new(),
        }
    }

    /// Normalized 0.0 is the bottom of the fader, conventionally "off"
    /// rather than merely the bottom of the ±24 dB range — treated as
    /// −120 dB (≈1e-6 linear) rather than the literal −24 dB the linear
    /// mapping would otherwise give.
    fn gain_linear(&self) -> f32 {
        if self.parameters[0].normalized() <= 0.0 {
            return crate::parameter::db_to_linear(-120.0);
        }
        let db = self.parameters[0].domain_value();
        crate::parameter::db_to_linear(db)
    }
}

impl Processor for GainProcessor {
    fn id(&self) -> ProcessorId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn label(&self) -> &str {
        &self.name
    }
    fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }
    fn channels_in(&self) -> usize {
        self.channels
    }
    fn channels_out(&self) -> usize {
        self.channels
    }
    fn bypassed(&self) -> bool {
        self.bypassed
    }
    fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
    fn set_parameter(&mut self, id: ParameterId, normalized_value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&normalized_value) {
            return Err(Error::OutOfRange(normalized_value));
        }
        if apply_parameter_change_event(&mut self.parameters, id, normalized_value) {
            Ok(())
        } else {
            Err(Error::UnknownParameter {
                processor: self.id.raw(),
                parameter: id.raw(),
            })
        }
    }
    fn properties(&self) -> &[Property] {
        &self.properties
    }
    fn set_property(&mut self, id: PropertyId, _value: &str) -> Result<()> {
        Err(Error::NotImplemented(format!("no property {id} on {}", self.name)))
    }
    fn process_event(&mut self, event: &RtEventKind) {
        if let RtEventKind::ParameterChange(change) = event {
            if change.processor == self.id {
                apply_parameter_change_event(&mut self.parameters, change.parameter, change.normalized_value);
            }
        }
    }
    fn process_audio(&mut self, input: &SampleBuffer<'_>, output: &mut SampleBuffer<'_>) {
        let gain = self.gain_linear();
        let channels = input.channel_count().min(output.channel_count());
        for ch in 0..channels {
            let src = *input.channel_ref(ch);
            let dst = output.channel(ch);
            for frame in 0..crate::buffer::AUDIO_CHUNK_SIZE {
                dst[frame] = src[frame] * gain;
            }
        }
    }
    fn state(&self) -> StateBytes {
        StateBytes(self.parameters[0].normalized().to_le_bytes().to_vec())
    }
    fn set_state(&mut self, state: StateBytes, _with_sync_flag: bool) -> Result<()> {
        if state.0.len() >= 4 {
            let bytes: [u8; 4] = state.0[0..4].try_into().unwrap();
            self.parameters[0].set_normalized_clamped(f32::from_le_bytes(bytes));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn owning_pair() -> (SampleBuffer<'static>, SampleBuffer<'static>) {
        (SampleBuffer::owning(2), SampleBuffer::owning(2))
    }

    #[test]
    fn passthrough_copies_input() {
        let mut proc = PassthroughProcessor::new(ProcessorId(1), "through", 2);
        let (mut input, mut output) = owning_pair();
        input.channel(0)[0] = 0.42;
        proc.process_audio(&input, &mut output);
        assert_eq!(output.channel_ref(0)[0], 0.42);
    }

    #[test]
    fn gain_unity_at_half_normalized() {
        let mut proc = GainProcessor::new(ProcessorId(1), "gain", 2);
        let (mut input, mut output) = owning_pair();
        input.channel(0).fill(0.5);
        input.channel(1).fill(-0.25);
        proc.process_audio(&input, &mut output);
        assert_abs_diff_eq!(output.channel_ref(0)[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(output.channel_ref(1)[0], -0.25, epsilon = 1e-6);
    }

    #[test]
    fn gain_silences_near_zero_normalized() {
        let mut proc = GainProcessor::new(ProcessorId(1), "gain", 2);
        proc.set_parameter(GainProcessor::GAIN_PARAMETER, 0.0).unwrap();
        let (mut input, mut output) = owning_pair();
        input.channel(0).fill(1.0);
        input.channel(1).fill(1.0);
        proc.process_audio(&input, &mut output);
        assert_abs_diff_eq!(output.channel_ref(0)[0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(output.channel_ref(1)[0], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn set_parameter_rejects_unknown_id() {
        let mut proc = GainProcessor::new(ProcessorId(1), "gain", 2);
        let err = proc.set_parameter(ParameterId(99), 0.5).unwrap_err();
        assert!(matches!(err, Error::UnknownParameter { .. }));
    }

    #[test]
    fn process_event_ignores_unrelated_processor() {
        let mut proc = GainProcessor::new(ProcessorId(1), "gain", 2);
        let event = RtEventKind::ParameterChange(crate::rt_event::ParameterChange {
            processor: ProcessorId(2),
            parameter: GainProcessor::GAIN_PARAMETER,
            normalized_value: 0.0,
        });
        proc.process_event(&event);
        assert_eq!(proc.parameters()[0].normalized(), 0.5);
    }
}
