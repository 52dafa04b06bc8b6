//! Sample sources, the sample queue and output sinks.

pub mod queue;
pub mod sink;
pub mod source;

pub use queue::{sample_queue, SampleReader, SampleWriter};
pub use sink::{DutyCycleSink, DutyCycles, FrameSink, PwmSink, SerialSink, FRAME_MAGIC};
#[cfg(feature = "capture")]
pub use source::CaptureSource;
pub use source::{SampleSource, WavSource};
