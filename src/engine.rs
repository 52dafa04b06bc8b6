//! Frame Engine
//!
//! Runs one spectrum through the whole chain and produces one [`OutputFrame`]:
//!
//! ```text
//! Idle → FrameReceived → Aggregated → Decorrelated → GainAdjusted
//!      → Smoothed → Thresholded → Quantized → Emitted
//! ```
//!
//! A frame whose total channel power is below `silence_epsilon` skips the
//! boundary search and every adaptive stage and re-emits the previous levels.
//!
//! ## Audio Thread Safety
//! - All buffers allocated in `new()`
//! - `process()` allocates only when the PCA directions are recomputed

use crate::config::EngineConfig;
use crate::control::{
    Activation, ActivationStage, ControlState, GainController, OutputFrame, OutputShaper,
};
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::mapping::{BinAggregator, BoundaryOptimizer, BoundarySet};
use crate::spectrum::SpectralSample;
use log::{info, trace};

/// Where the current frame is in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    FrameReceived,
    Aggregated,
    Decorrelated,
    GainAdjusted,
    Smoothed,
    Thresholded,
    Quantized,
    Emitted,
}

pub struct Engine {
    config: EngineConfig,
    aggregator: BinAggregator,
    optimizer: BoundaryOptimizer,
    activation: Activation,
    gain: GainController,
    shaper: OutputShaper,
    state: ControlState,

    stage: FrameStage,
    frames: u64,
    last_silent: bool,

    // Per-frame scratch
    channels: Vec<f32>,
    activated: Vec<f32>,
    gained: Vec<f32>,
    levels: Vec<f32>,
    frame: OutputFrame,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let n = config.num_channels;
        let bounds = BoundarySet::new(config.boundaries(), config.spectrum_len)?;

        info!(
            "engine: {} channels over {} bins, {:?} activation, boundaries {:?}",
            n,
            config.spectrum_len,
            config.activation,
            bounds.as_slice()
        );

        Ok(Self {
            aggregator: BinAggregator::new(config.aggregation, config.spectrum_len),
            optimizer: BoundaryOptimizer::new(bounds, config.optimizer.clone()),
            activation: Activation::from_config(&config),
            gain: GainController::new(&config),
            shaper: OutputShaper::new(&config),
            state: ControlState::new(&config),
            stage: FrameStage::Idle,
            frames: 0,
            last_silent: false,
            channels: vec![0.0; n],
            activated: vec![0.0; n],
            gained: vec![0.0; n],
            levels: vec![0.0; n],
            frame: OutputFrame::new(n),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Last stage the most recent frame reached.
    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    pub fn boundaries(&self) -> &BoundarySet {
        self.optimizer.boundaries()
    }

    pub fn correlations(&self) -> &[f32] {
        self.optimizer.correlations()
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Raw channel vector of the most recent frame.
    pub fn channel_vector(&self) -> &[f32] {
        &self.channels
    }

    /// Most recently produced frame.
    pub fn last_frame(&self) -> &OutputFrame {
        &self.frame
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Whether the most recent frame was treated as silence.
    pub fn was_silent(&self) -> bool {
        self.last_silent
    }

    #[inline]
    fn enter(&mut self, stage: FrameStage) {
        trace!("frame {}: {:?}", self.frames, stage);
        self.stage = stage;
    }

    /// Run one frame.
    pub fn process(&mut self, spectrum: &[SpectralSample]) -> EngineResult<&OutputFrame> {
        if spectrum.len() != self.config.spectrum_len {
            return Err(EngineError::SpectrumLength {
                expected: self.config.spectrum_len,
                got: spectrum.len(),
            });
        }
        self.enter(FrameStage::FrameReceived);

        self.aggregator.load(spectrum);
        self.aggregator
            .channels(self.optimizer.boundaries(), &mut self.channels);
        self.enter(FrameStage::Aggregated);

        let total: f32 = self.channels.iter().map(|v| v.abs()).sum();
        self.last_silent = total.is_nan() || total < self.config.silence_epsilon;

        if self.last_silent {
            trace!("frame {}: silent ({total:e}), holding output", self.frames);
            self.levels.copy_from_slice(&self.state.previous_output);
        } else {
            self.optimizer.update(&self.aggregator);

            self.activation
                .activate(&self.channels, &self.state, &mut self.activated);
            self.enter(FrameStage::Decorrelated);

            self.gain
                .process(&self.activated, &mut self.state, &mut self.gained);
            self.enter(FrameStage::GainAdjusted);

            self.shaper
                .smooth(&self.gained, &mut self.state, &mut self.levels);
            self.enter(FrameStage::Smoothed);

            self.shaper.threshold(&mut self.levels, &mut self.state);
            self.enter(FrameStage::Thresholded);

            self.state.previous_output.copy_from_slice(&self.levels);
            trace!(
                "gain {:?} threshold {:?}",
                self.state.gain,
                self.state.threshold
            );
        }

        self.frame.fill(&self.levels, self.config.output.swap);
        self.enter(FrameStage::Quantized);

        self.enter(FrameStage::Emitted);
        self.frames += 1;
        Ok(&self.frame)
    }

    /// Back to the freshly constructed state.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        let bounds = BoundarySet::new(self.config.boundaries(), self.config.spectrum_len)?;
        self.optimizer.reset(bounds);
        self.activation.reset();
        self.state = ControlState::new(&self.config);
        self.stage = FrameStage::Idle;
        self.frames = 0;
        self.last_silent = false;
        self.frame = OutputFrame::new(self.config.num_channels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivationKind;
    use crate::presets::{Preset, PresetManager};

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.spectrum_len = 64;
        config
    }

    fn noise_spectrum(len: usize, seed: &mut u32) -> Vec<SpectralSample> {
        (0..len)
            .map(|_| {
                *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let p = (*seed >> 16) as f32 / 65536.0;
                SpectralSample::new(p, p * 6.0 - 3.0)
            })
            .collect()
    }

    #[test]
    fn test_wrong_spectrum_length_rejected() {
        let mut engine = Engine::new(small_config()).unwrap();
        let spectrum = vec![SpectralSample::default(); 32];
        assert!(matches!(
            engine.process(&spectrum),
            Err(EngineError::SpectrumLength {
                expected: 64,
                got: 32
            })
        ));
        assert_eq!(engine.stage(), FrameStage::Idle);
    }

    #[test]
    fn test_invalid_config_refused() {
        let mut config = small_config();
        config.threshold.min = 0.95;
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_frame_reaches_emitted() {
        let mut engine = Engine::new(small_config()).unwrap();
        let mut seed = 1;
        engine.process(&noise_spectrum(64, &mut seed)).unwrap();
        assert_eq!(engine.stage(), FrameStage::Emitted);
        assert_eq!(engine.frames_processed(), 1);
        assert!(!engine.was_silent());
    }

    #[test]
    fn test_silence_holds_last_frame() {
        let mut engine = Engine::new(small_config()).unwrap();
        let mut seed = 99;
        for _ in 0..50 {
            engine.process(&noise_spectrum(64, &mut seed)).unwrap();
        }
        let held = engine.last_frame().clone();
        let state = engine.state().clone();
        let bounds = engine.boundaries().clone();

        let silence = vec![SpectralSample::default(); 64];
        for _ in 0..100 {
            let frame = engine.process(&silence).unwrap();
            assert_eq!(frame, &held);
        }
        assert!(engine.was_silent());
        assert_eq!(engine.state(), &state);
        assert_eq!(engine.boundaries(), &bounds);
    }

    #[test]
    fn test_controls_stay_bounded() {
        for activation in [ActivationKind::Difference, ActivationKind::Pca] {
            let mut config = small_config();
            config.activation = activation;
            config.pca.history_len = 16;
            config.optimizer.update_every = 2;
            config.optimizer.search_radius = 4;
            let (gmax, tmin, tmax) = (config.gain.max, config.threshold.min, config.threshold.max);

            let mut engine = Engine::new(config).unwrap();
            let mut seed = 4242;
            for k in 0..1000 {
                let mut spectrum = noise_spectrum(64, &mut seed);
                // Bursts of silence and of very loud frames
                if k % 97 < 5 {
                    spectrum.fill(SpectralSample::default());
                } else if k % 61 < 3 {
                    for s in &mut spectrum {
                        s.power *= 1000.0;
                    }
                }
                let frame = engine.process(&spectrum).unwrap();
                assert!(frame.levels.iter().all(|v| (0.0..=1.0).contains(v)));

                let state = engine.state();
                assert!(state.gain.iter().all(|g| (0.0..=gmax).contains(g)));
                assert!(state.threshold.iter().all(|t| (tmin..=tmax).contains(t)));
                assert!(engine.boundaries().is_valid());
            }
        }
    }

    #[test]
    fn test_swap_applied_once_to_emitted_frame() {
        let mut config = small_config();
        config.output.swap = Some((0, 2));
        let mut engine = Engine::new(config.clone()).unwrap();
        config.output.swap = None;
        let mut plain = Engine::new(config).unwrap();

        let mut seed = 5;
        for _ in 0..200 {
            let spectrum = noise_spectrum(64, &mut seed);
            let swapped = engine.process(&spectrum).unwrap().clone();
            let straight = plain.process(&spectrum).unwrap().clone();
            assert_eq!(swapped.levels[0], straight.levels[2]);
            assert_eq!(swapped.levels[2], straight.levels[0]);
            assert_eq!(swapped.bytes[1], straight.bytes[1]);
            assert_eq!(swapped.bytes[3], straight.bytes[3]);
        }
    }

    #[test]
    fn test_bytes_match_levels() {
        let mut engine = Engine::new(small_config()).unwrap();
        let mut seed = 77;
        for _ in 0..300 {
            let frame = engine.process(&noise_spectrum(64, &mut seed)).unwrap();
            for (&b, &v) in frame.bytes.iter().zip(&frame.levels) {
                assert_eq!(b, (255.0 * v.clamp(0.0, 1.0)).round() as u8);
            }
        }
    }

    #[test]
    fn test_desktop_preset_settles_on_power_edge() {
        // Unit power in bins [0, 512) of 2048, zero above
        let config = PresetManager::new().config(Preset::DesktopFft);
        assert_eq!(config.spectrum_len, 2048);
        assert_eq!(config.boundaries(), vec![512, 1024, 1536]);
        let mut engine = Engine::new(config).unwrap();

        let spectrum: Vec<SpectralSample> = (0..2048)
            .map(|k| SpectralSample::from_power(if k < 512 { 1.0 } else { 0.0 }))
            .collect();
        for _ in 0..2000 {
            engine.process(&spectrum).unwrap();
            let b = engine.boundaries();
            assert!(b.is_valid());
            assert!(b.as_slice().iter().all(|&x| x < 2048));
        }
        let b0 = engine.boundaries().get(0);
        assert!((510..=514).contains(&b0), "boundary 0 at {b0}");
    }

    #[test]
    fn test_boundary_returns_to_power_edge_from_above() {
        let mut config = PresetManager::new().config(Preset::DesktopFft);
        config.initial_boundaries = Some(vec![540, 1024, 1536]);
        let mut engine = Engine::new(config).unwrap();

        let spectrum: Vec<SpectralSample> = (0..2048)
            .map(|k| SpectralSample::from_power(if k < 512 { 1.0 } else { 0.0 }))
            .collect();
        for _ in 0..2000 {
            engine.process(&spectrum).unwrap();
            assert!(engine.boundaries().is_valid());
        }
        let b0 = engine.boundaries().get(0);
        assert!((510..=514).contains(&b0), "boundary 0 at {b0}");
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let config = small_config();
        let mut engine = Engine::new(config.clone()).unwrap();
        let mut seed = 3;
        for _ in 0..100 {
            engine.process(&noise_spectrum(64, &mut seed)).unwrap();
        }
        engine.reset().unwrap();
        assert_eq!(engine.state(), &ControlState::new(&config));
        assert_eq!(engine.boundaries().as_slice(), config.boundaries().as_slice());
        assert_eq!(engine.stage(), FrameStage::Idle);
    }
}
