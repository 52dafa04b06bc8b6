//! Adaptive audio-to-light channel mapping.
//!
//! A spectrum (FFT bins or filter-bank bands) comes in once per frame; a few
//! smoothly varying, decorrelated brightness levels go out. In between, the
//! channel boundaries drift toward a low-cost split of the spectrum and
//! per-channel gain and threshold loops keep each light near its target
//! activity without manual tuning.

pub mod config;
pub mod control;
pub mod dsp;
pub mod embedded;
pub mod engine;
pub mod error;
pub mod io;
pub mod mapping;
pub mod presets;
pub mod spectrum;

pub use config::{ActivationKind, Aggregation, EngineConfig};
pub use control::{ControlState, OutputFrame};
pub use engine::{Engine, FrameStage};
pub use error::{ConfigError, EngineError, EngineResult};
pub use mapping::BoundarySet;
pub use presets::{Preset, PresetManager};
pub use spectrum::{SpectralFrontEnd, SpectralSample};
