//! Error types shared across the engine.

use thiserror::Error;

/// Error type for sushi-core and the engine crates built on top of it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid tempo: {0}. must be between 20.0 and 999.0 BPM")]
    InvalidTempo(f32),

    #[error("invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    #[error("invalid channel count: {0}")]
    InvalidChannelCount(i32),

    #[error("invalid sample offset {offset}, must be in [0, {max})")]
    InvalidSampleOffset { offset: usize, max: usize },

    #[error("unknown processor id: {0}")]
    UnknownProcessor(u32),

    #[error("unknown track id: {0}")]
    UnknownTrack(u32),

    #[error("unknown parameter id {parameter} on processor {processor}")]
    UnknownParameter { processor: u32, parameter: u32 },

    #[error("value {0} out of normalized range [0, 1]")]
    OutOfRange(f32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias used throughout the engine crates.
pub type Result<T> = std::result::Result<T, Error>;
