use anyhow::{bail, Context, Result};
use clap::Parser;
use leitshow::dsp::{FftFrontEnd, DEFAULT_BUFFER_CYCLE};
use leitshow::io::{FrameSink, SampleSource, SerialSink, WavSource};
use leitshow::{Engine, EngineConfig, Preset, PresetManager, SpectralFrontEnd};
use log::{info, warn};
use std::path::PathBuf;

/// Drive a serial light board from audio.
#[derive(Parser, Debug)]
#[command(name = "leitshow", version, about)]
struct Args {
    /// Serial device of the light board (already configured for baud rate)
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    device: PathBuf,

    /// Play a WAV file instead of live input
    #[arg(short, long, conflicts_with = "live")]
    input: Option<PathBuf>,

    /// Capture from the default input device
    #[arg(long)]
    live: bool,

    /// JSON configuration; overrides --preset
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Preset::DesktopFft)]
    preset: Preset,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    match &args.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load config '{}'", path.display())),
        None => Ok(PresetManager::new().config(args.preset)),
    }
}

fn open_source(args: &Args) -> Result<Box<dyn SampleSource>> {
    if let Some(path) = &args.input {
        return Ok(Box::new(WavSource::open(path)?));
    }
    if args.live {
        #[cfg(feature = "capture")]
        return Ok(Box::new(leitshow::io::CaptureSource::open_default()?));
        #[cfg(not(feature = "capture"))]
        bail!("live capture needs the `capture` feature");
    }
    bail!("no input: pass --input <wav> or --live")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // The loop never starts without a sink
    let mut sink = SerialSink::open(&args.device)
        .with_context(|| format!("failed to open output device '{}'", args.device.display()))?;

    let mut config = load_config(&args)?;
    let mut source = open_source(&args)?;

    let rate = source.sample_rate();
    if (rate - config.sample_rate).abs() > 0.5 {
        warn!(
            "source runs at {rate} Hz, config expects {} Hz; using the source rate",
            config.sample_rate
        );
        config.sample_rate = rate;
    }

    let mut front_end = FftFrontEnd::new(config.buffer_size, DEFAULT_BUFFER_CYCLE);
    if front_end.spectrum_len() != config.spectrum_len {
        bail!(
            "config expects {} bins, a {}-block FFT of {} samples gives {}",
            config.spectrum_len,
            DEFAULT_BUFFER_CYCLE,
            config.buffer_size,
            front_end.spectrum_len()
        );
    }
    let mut engine = Engine::new(config.clone())?;

    let mut block = vec![0.0f32; config.buffer_size];
    let mut frames = 0u64;
    while args.frames.map_or(true, |limit| frames < limit) {
        if !source.read_block(&mut block)? {
            break;
        }
        let spectrum = front_end.push_block(&block)?;
        let frame = engine.process(spectrum)?;
        sink.emit(frame)?;
        frames += 1;
    }

    info!(
        "done: {frames} frames, boundaries {:?}",
        engine.boundaries().as_slice()
    );
    Ok(())
}
