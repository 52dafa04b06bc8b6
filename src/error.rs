//! Error types for the light-show engine.

use std::time::Duration;
use thiserror::Error;

/// Configuration validation and loading failures.
///
/// Every variant is produced before the frame loop starts; a running engine
/// never sees one.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("need at least 2 output channels, got {0}")]
    TooFewChannels(usize),

    #[error("{field}: expected {expected} per-channel values, got {got}")]
    ChannelCount {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{field}: invalid range [{min}, {max}]")]
    InvalidRange {
        field: &'static str,
        min: f32,
        max: f32,
    },

    #[error("{field}: value {value} out of range")]
    OutOfRange { field: &'static str, value: f32 },

    #[error("{field}: must be non-zero")]
    Zero { field: &'static str },

    #[error("channel index {index} out of range for {channels} channels ({field})")]
    ChannelIndex {
        field: &'static str,
        index: usize,
        channels: usize,
    },

    #[error("spectrum of {spectrum_len} bins cannot hold {channels} non-empty channels")]
    SpectrumTooShort { spectrum_len: usize, channels: usize },

    #[error("invalid initial boundaries {0:?}")]
    Boundaries(Vec<usize>),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runtime failures of the frame pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("spectrum has {got} bins, engine expects {expected}")]
    SpectrumLength { expected: usize, got: usize },

    #[error("audio block has {got} samples, front end expects {expected}")]
    BlockSize { expected: usize, got: usize },

    #[error("frame took {elapsed:?}, budget is {budget:?}; holding fail-safe output")]
    DeadlineOverrun { elapsed: Duration, budget: Duration },

    #[error("a callback is already pending on this timer")]
    TimerBusy,

    #[error("output sink error: {0}")]
    Sink(#[from] std::io::Error),
}

/// Result type alias for frame-level operations
pub type EngineResult<T> = Result<T, EngineError>;
