//! Output sinks.
//!
//! Desktop: a serial byte stream, one packet per frame:
//!
//! ```text
//! DE AD BE EF  c0 c1 .. cN-1
//! ```
//!
//! Embedded: one duty cycle in `[0, 1]` per channel.
//! Port and PWM peripheral setup happen outside the crate.

use crate::control::OutputFrame;
use crate::error::{EngineError, EngineResult};
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Packet header the light board syncs on.
pub const FRAME_MAGIC: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// Consumes one finished frame.
pub trait FrameSink {
    fn emit(&mut self, frame: &OutputFrame) -> EngineResult<()>;
}

// =============================================================================
// Serial
// =============================================================================

pub struct SerialSink<W: Write> {
    out: W,
    packet: Vec<u8>,
    frames_written: u64,
}

impl SerialSink<BufWriter<File>> {
    /// Open an already configured serial device (or any writable path).
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().write(true).open(path)?;
        info!("serial sink: '{}'", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SerialSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            packet: Vec::with_capacity(FRAME_MAGIC.len() + 8),
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for SerialSink<W> {
    fn emit(&mut self, frame: &OutputFrame) -> EngineResult<()> {
        self.packet.clear();
        self.packet.extend_from_slice(&FRAME_MAGIC);
        self.packet.extend_from_slice(&frame.bytes);
        self.out.write_all(&self.packet)?;
        self.out.flush()?;
        self.frames_written += 1;
        Ok(())
    }
}

// =============================================================================
// PWM
// =============================================================================

/// Independent duty-cycle outputs (timer PWM channels or similar).
pub trait DutyCycleSink {
    fn set_duty(&mut self, channel: usize, duty: f32) -> EngineResult<()>;
}

/// Drives a [`DutyCycleSink`] from the frame's float levels.
pub struct PwmSink<D: DutyCycleSink> {
    outputs: D,
}

impl<D: DutyCycleSink> PwmSink<D> {
    pub fn new(outputs: D) -> Self {
        Self { outputs }
    }

    pub fn outputs(&self) -> &D {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut D {
        &mut self.outputs
    }
}

impl<D: DutyCycleSink> FrameSink for PwmSink<D> {
    fn emit(&mut self, frame: &OutputFrame) -> EngineResult<()> {
        for (ch, &level) in frame.levels.iter().enumerate() {
            self.outputs.set_duty(ch, level.clamp(0.0, 1.0))?;
        }
        Ok(())
    }
}

/// Duty cycles held in memory. Stands in for a PWM peripheral on the host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DutyCycles(pub Vec<f32>);

impl DutyCycles {
    pub fn new(channels: usize) -> Self {
        Self(vec![0.0; channels])
    }
}

impl DutyCycleSink for DutyCycles {
    fn set_duty(&mut self, channel: usize, duty: f32) -> EngineResult<()> {
        match self.0.get_mut(channel) {
            Some(slot) => {
                *slot = duty;
                Ok(())
            }
            None => Err(EngineError::Sink(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no PWM output for channel {channel}"),
            ))),
        }
    }
}

/// A borrowed sink is still a sink.
impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn emit(&mut self, frame: &OutputFrame) -> EngineResult<()> {
        (**self).emit(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(levels: &[f32]) -> OutputFrame {
        let mut f = OutputFrame::new(levels.len());
        f.fill(levels, None);
        f
    }

    #[test]
    fn test_serial_packet_layout() {
        let mut sink = SerialSink::new(Vec::new());
        sink.emit(&frame(&[0.0, 1.0, 0.5, 0.2])).unwrap();
        sink.emit(&frame(&[1.0, 1.0, 1.0, 1.0])).unwrap();
        assert_eq!(sink.frames_written(), 2);

        let bytes = sink.into_inner();
        assert_eq!(
            bytes,
            vec![
                0xDE, 0xAD, 0xBE, 0xEF, 0, 255, 128, 51, //
                0xDE, 0xAD, 0xBE, 0xEF, 255, 255, 255, 255,
            ]
        );
    }

    #[test]
    fn test_serial_open_failure_is_reported() {
        assert!(SerialSink::open("/nonexistent-dir/ttyUSB0").is_err());
    }

    #[test]
    fn test_pwm_sink_writes_levels() {
        let mut sink = PwmSink::new(DutyCycles::new(4));
        sink.emit(&frame(&[0.1, 0.2, 0.3, 0.4])).unwrap();
        assert_eq!(sink.outputs().0, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_pwm_sink_rejects_missing_output() {
        let mut sink = PwmSink::new(DutyCycles::new(2));
        assert!(matches!(
            sink.emit(&frame(&[0.1, 0.2, 0.3])),
            Err(EngineError::Sink(_))
        ));
    }
}
