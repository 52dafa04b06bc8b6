//! Feedback stages between the channel vector and the lights.

pub mod activation;
pub mod gain;
pub mod history;
pub mod output;
pub mod state;

pub use activation::{Activation, ActivationStage, DifferenceDecorrelator, PcaActivation};
pub use gain::GainController;
pub use history::HistoryBuffer;
pub use output::{clip, quantize, remap, OutputFrame, OutputShaper};
pub use state::ControlState;
