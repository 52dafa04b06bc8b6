//! Raw-sample sources for the desktop loop.

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use log::info;
use std::path::Path;

/// Delivers one fixed-size block of mono samples per frame.
pub trait SampleSource {
    /// Fill `block`. Returns `Ok(false)` once the stream has ended.
    fn read_block(&mut self, block: &mut [f32]) -> Result<bool>;

    fn sample_rate(&self) -> f32;
}

// =============================================================================
// WAV file
// =============================================================================

/// First channel of a WAV file, normalized to `[-1, 1]`.
///
/// A short final block is zero-padded; the next read reports end of stream.
pub struct WavSource {
    samples: Box<dyn Iterator<Item = Result<f32>> + Send>,
    sample_rate: f32,
    finished: bool,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)
            .with_context(|| format!("failed to open WAV '{}'", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;
        info!(
            "wav: '{}', {} Hz, {} ch, {}-bit {:?}",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            spec.sample_format
        );

        let samples: Box<dyn Iterator<Item = Result<f32>> + Send> =
            match (spec.sample_format, spec.bits_per_sample) {
                (SampleFormat::Float, 32) => Box::new(first_channel(
                    reader.into_samples::<f32>().map(|s| s.map_err(Into::into)),
                    channels,
                )),
                (SampleFormat::Int, bits @ 1..=32) => {
                    let scale = 1.0 / (1u64 << (bits - 1)) as f32;
                    Box::new(first_channel(
                        reader
                            .into_samples::<i32>()
                            .map(move |s| s.map(|v| v as f32 * scale).map_err(Into::into)),
                        channels,
                    ))
                }
                (format, bits) => bail!("unsupported WAV format: {bits}-bit {format:?}"),
            };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate as f32,
            finished: false,
        })
    }
}

fn first_channel(
    samples: impl Iterator<Item = Result<f32>> + Send + 'static,
    channels: usize,
) -> impl Iterator<Item = Result<f32>> + Send + 'static {
    samples.step_by(channels)
}

impl SampleSource for WavSource {
    fn read_block(&mut self, block: &mut [f32]) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        for (k, slot) in block.iter_mut().enumerate() {
            match self.samples.next() {
                Some(s) => *slot = s.context("WAV decode error")?,
                None => {
                    self.finished = true;
                    if k == 0 {
                        return Ok(false);
                    }
                    block[k..].fill(0.0);
                    return Ok(true);
                }
            }
        }
        Ok(true)
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

// =============================================================================
// Live capture
// =============================================================================

#[cfg(feature = "capture")]
pub use capture::CaptureSource;

#[cfg(feature = "capture")]
mod capture {
    use super::SampleSource;
    use crate::io::queue::{sample_queue, SampleReader, SampleWriter};
    use anyhow::{anyhow, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SizedSample};
    use log::{error, info, warn};
    use std::time::Duration;

    /// Seconds of audio the queue can hold before dropping.
    const QUEUE_SECONDS: usize = 2;

    /// Default input device, first channel, through a [`SampleReader`].
    pub struct CaptureSource {
        _stream: cpal::Stream,
        reader: SampleReader,
        sample_rate: f32,
        reported_drops: usize,
    }

    impl CaptureSource {
        pub fn open_default() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| anyhow!("no input device available"))?;
            let name = device.name().unwrap_or_else(|_| "unknown".to_string());
            let config = device.default_input_config()?;
            let sample_rate = config.sample_rate().0;
            let channels = config.channels() as usize;
            info!("capture: '{name}', {sample_rate} Hz, {channels} ch");

            let (writer, reader) = sample_queue(sample_rate as usize * QUEUE_SECONDS);
            let stream_config: cpal::StreamConfig = config.clone().into();
            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => build_stream::<f32>,
                cpal::SampleFormat::I16 => build_stream::<i16>,
                cpal::SampleFormat::U16 => build_stream::<u16>,
                other => return Err(anyhow!("unsupported sample format {other:?}")),
            }(&device, &stream_config, channels, writer)?;
            stream.play()?;

            Ok(Self {
                _stream: stream,
                reader,
                sample_rate: sample_rate as f32,
                reported_drops: 0,
            })
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        mut writer: SampleWriter,
    ) -> Result<cpal::Stream>
    where
        T: Sample + SizedSample,
        f32: FromSample<T>,
    {
        let stream = device.build_input_stream(
            config,
            move |data: &[T], _| {
                for frame in data.chunks(channels.max(1)) {
                    writer.push_sample(frame[0].to_sample::<f32>());
                }
            },
            |err| error!("capture stream error: {err}"),
            None,
        )?;
        Ok(stream)
    }

    impl SampleSource for CaptureSource {
        /// Blocks (sleeping) until a whole block has arrived.
        fn read_block(&mut self, block: &mut [f32]) -> Result<bool> {
            while !self.reader.read_block(block) {
                std::thread::sleep(Duration::from_millis(2));
            }
            let dropped = self.reader.dropped();
            if dropped > self.reported_drops {
                warn!("capture: {} samples dropped", dropped - self.reported_drops);
                self.reported_drops = dropped;
            }
            Ok(true)
        }

        fn sample_rate(&self) -> f32 {
            self.sample_rate
        }
    }
}
