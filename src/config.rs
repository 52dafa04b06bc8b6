//! Engine configuration.
//!
//! Every tuning constant of the pipeline lives here. A config is built once at
//! startup (defaults, a preset, or JSON), validated, and handed to the engine,
//! which never re-reads it. None of the numbers are sacred: the feedback
//! constants and cost weights are meant to be tuned per installation.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::path::Path;

// =============================================================================
// Defaults (desktop FFT path, 4 channels)
// =============================================================================

const DEFAULT_CHANNELS: usize = 4;
const DEFAULT_BUFFER_SIZE: usize = 2048;
const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
/// Two-block FFT window, half of it kept: 2 * 2048 / 2
const DEFAULT_SPECTRUM_LEN: usize = 2048;
const DEFAULT_SILENCE_EPSILON: f32 = 1e-5;

// =============================================================================
// Sections
// =============================================================================

/// How a channel's bins are reduced to one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Sum,
}

/// Which decorrelation strategy the activation stage runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    #[default]
    Difference,
    Pca,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainConfig {
    /// Starting gain per channel
    pub initial: Vec<f32>,
    /// Target filtered activity per channel
    pub goal_activity: Vec<f32>,
    /// Activity filter cutoff per channel (Hz)
    pub filter_cutoff_hz: Vec<f32>,
    /// Upper gain clamp
    pub max: f32,
    /// Gain step per unit of normalized error
    pub bump: f32,
    /// Normalized errors smaller than this leave the gain alone
    pub deadband: f32,
    /// Step multiplier while the gained value is saturated (> 1) or dead (<= 0)
    pub edge_gain: f32,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            initial: vec![0.3, 1.5, 1.5, 0.5],
            goal_activity: vec![0.3, 0.3, 0.3, 0.4],
            filter_cutoff_hz: vec![0.02; DEFAULT_CHANNELS],
            max: 22.0,
            bump: 0.001,
            deadband: 0.05,
            edge_gain: 50.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Target fraction of frames above threshold per channel
    pub goal_activity: Vec<f32>,
    /// On/off activity filter cutoff per channel (Hz)
    pub filter_cutoff_hz: Vec<f32>,
    pub min: f32,
    pub max: f32,
    pub bump: f32,
    pub deadband: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            goal_activity: vec![0.3, 0.3, 0.3, 0.1],
            filter_cutoff_hz: vec![0.04; DEFAULT_CHANNELS],
            min: 0.02,
            max: 0.9,
            bump: 0.001,
            deadband: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Output low-pass cutoff per channel (Hz)
    pub cutoff_hz: Vec<f32>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: vec![5.0, 3.0, 3.0, 5.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorrelationConfig {
    pub reference_channel: usize,
    /// Weight of the self-difference term vs. the reference-difference term
    pub percent_derivative: f32,
}

impl Default for DecorrelationConfig {
    fn default() -> Self {
        Self {
            reference_channel: 0,
            percent_derivative: 0.9,
        }
    }
}

/// Weights of the boundary cost terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub variance: f32,
    pub correlation: f32,
    pub min_power: f32,
    pub narrow: f32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            variance: 0.25,
            correlation: 8.0,
            min_power: 1.0,
            narrow: 0.01,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub enabled: bool,
    /// Maximum boundary displacement per search (bins)
    pub search_radius: usize,
    /// Search every K-th frame, track otherwise
    pub update_every: usize,
    /// IIR constant of the per-boundary correlation estimate
    pub corr_filter_constant: f32,
    pub weights: CostWeights,
    /// Divide the power variance by the squared mean power, making the
    /// variance term independent of overall loudness
    pub normalize_variance: bool,
    /// Channels quieter than this are penalized
    pub min_ok_power: f32,
    /// Channels narrower than this (bins) are penalized
    pub min_ok_width: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_radius: 8,
            update_every: 4,
            corr_filter_constant: 0.1,
            weights: CostWeights::default(),
            normalize_variance: true,
            min_ok_power: 0.5,
            min_ok_width: 25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Frames kept in the history ring
    pub history_len: usize,
    /// Recompute the principal directions every N frames
    pub update_every: usize,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            history_len: 64,
            update_every: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Physical wiring correction: swap these two channels on the way out
    pub swap: Option<(usize, usize)>,
    /// Levels held after a fatal deadline overrun
    pub fail_safe_levels: Vec<f32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            swap: Some((0, 2)),
            fail_safe_levels: vec![0.0; DEFAULT_CHANNELS],
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub num_channels: usize,
    /// Audio samples per frame
    pub buffer_size: usize,
    pub sample_rate: f32,
    /// Spectral samples per frame (`F`)
    pub spectrum_len: usize,
    pub aggregation: Aggregation,
    pub activation: ActivationKind,
    /// Total channel power below this is treated as silence
    pub silence_epsilon: f32,
    /// Starting boundaries; evenly spaced when absent
    pub initial_boundaries: Option<Vec<usize>>,
    pub gain: GainConfig,
    pub threshold: ThresholdConfig,
    pub smoothing: SmoothingConfig,
    pub decorrelation: DecorrelationConfig,
    pub optimizer: OptimizerConfig,
    pub pca: PcaConfig,
    pub output: OutputConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_channels: DEFAULT_CHANNELS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            spectrum_len: DEFAULT_SPECTRUM_LEN,
            aggregation: Aggregation::Mean,
            activation: ActivationKind::Difference,
            silence_epsilon: DEFAULT_SILENCE_EPSILON,
            initial_boundaries: None,
            gain: GainConfig::default(),
            threshold: ThresholdConfig::default(),
            smoothing: SmoothingConfig::default(),
            decorrelation: DecorrelationConfig::default(),
            optimizer: OptimizerConfig::default(),
            pca: PcaConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Seconds between frames.
    #[inline]
    pub fn frame_period(&self) -> f32 {
        self.buffer_size as f32 / self.sample_rate
    }

    /// Single-pole IIR constant for a cutoff at this config's frame rate.
    #[inline]
    pub fn iir_alpha(&self, cutoff_hz: f32) -> f32 {
        iir_alpha(cutoff_hz, self.frame_period())
    }

    /// Default boundary layout: `i * F / N`.
    pub fn boundaries(&self) -> Vec<usize> {
        match &self.initial_boundaries {
            Some(b) => b.clone(),
            None => (1..self.num_channels)
                .map(|i| i * self.spectrum_len / self.num_channels)
                .collect(),
        }
    }

    /// Resize every per-channel table to `n` channels, repeating the last
    /// entry. Handy when adapting the 4-channel defaults.
    pub fn with_channels(mut self, n: usize) -> Self {
        fn fit(v: &mut Vec<f32>, n: usize, fill: f32) {
            let last = v.last().copied().unwrap_or(fill);
            v.resize(n, last);
        }
        self.num_channels = n;
        fit(&mut self.gain.initial, n, 1.0);
        fit(&mut self.gain.goal_activity, n, 0.3);
        fit(&mut self.gain.filter_cutoff_hz, n, 0.02);
        fit(&mut self.threshold.goal_activity, n, 0.3);
        fit(&mut self.threshold.filter_cutoff_hz, n, 0.04);
        fit(&mut self.smoothing.cutoff_hz, n, 3.0);
        self.output.fail_safe_levels.resize(n, 0.0);
        if let Some((a, b)) = self.output.swap {
            if a >= n || b >= n {
                self.output.swap = None;
            }
        }
        if self.decorrelation.reference_channel >= n {
            self.decorrelation.reference_channel = 0;
        }
        self.initial_boundaries = None;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.num_channels;
        if n < 2 {
            return Err(ConfigError::TooFewChannels(n));
        }
        if self.spectrum_len < n {
            return Err(ConfigError::SpectrumTooShort {
                spectrum_len: self.spectrum_len,
                channels: n,
            });
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Zero {
                field: "buffer_size",
            });
        }
        positive("sample_rate", self.sample_rate)?;
        non_negative("silence_epsilon", self.silence_epsilon)?;

        // Per-channel tables
        per_channel("gain.initial", &self.gain.initial, n)?;
        per_channel("gain.goal_activity", &self.gain.goal_activity, n)?;
        per_channel("gain.filter_cutoff_hz", &self.gain.filter_cutoff_hz, n)?;
        per_channel("threshold.goal_activity", &self.threshold.goal_activity, n)?;
        per_channel(
            "threshold.filter_cutoff_hz",
            &self.threshold.filter_cutoff_hz,
            n,
        )?;
        per_channel("smoothing.cutoff_hz", &self.smoothing.cutoff_hz, n)?;
        per_channel("output.fail_safe_levels", &self.output.fail_safe_levels, n)?;

        // Gain
        positive("gain.max", self.gain.max)?;
        for &g in &self.gain.initial {
            if !(0.0..=self.gain.max).contains(&g) {
                return Err(ConfigError::OutOfRange {
                    field: "gain.initial",
                    value: g,
                });
            }
        }
        non_negative("gain.bump", self.gain.bump)?;
        non_negative("gain.deadband", self.gain.deadband)?;
        if !self.gain.edge_gain.is_finite() || self.gain.edge_gain < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "gain.edge_gain",
                value: self.gain.edge_gain,
            });
        }

        // Threshold: max < 1 keeps the soft-threshold rescale finite
        let (tmin, tmax) = (self.threshold.min, self.threshold.max);
        if !(tmin >= 0.0 && tmin < tmax && tmax < 1.0) {
            return Err(ConfigError::InvalidRange {
                field: "threshold",
                min: tmin,
                max: tmax,
            });
        }
        non_negative("threshold.bump", self.threshold.bump)?;
        non_negative("threshold.deadband", self.threshold.deadband)?;

        for &v in &self.output.fail_safe_levels {
            unit("output.fail_safe_levels", v)?;
        }
        for &v in self
            .gain
            .filter_cutoff_hz
            .iter()
            .chain(&self.threshold.filter_cutoff_hz)
            .chain(&self.smoothing.cutoff_hz)
        {
            non_negative("filter cutoff", v)?;
        }

        // Decorrelation
        if self.decorrelation.reference_channel >= n {
            return Err(ConfigError::ChannelIndex {
                field: "decorrelation.reference_channel",
                index: self.decorrelation.reference_channel,
                channels: n,
            });
        }
        unit(
            "decorrelation.percent_derivative",
            self.decorrelation.percent_derivative,
        )?;

        // Optimizer
        let opt = &self.optimizer;
        if opt.search_radius == 0 {
            return Err(ConfigError::Zero {
                field: "optimizer.search_radius",
            });
        }
        if opt.update_every == 0 {
            return Err(ConfigError::Zero {
                field: "optimizer.update_every",
            });
        }
        if !(opt.corr_filter_constant > 0.0 && opt.corr_filter_constant <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "optimizer.corr_filter_constant",
                value: opt.corr_filter_constant,
            });
        }
        non_negative("optimizer.weights.variance", opt.weights.variance)?;
        non_negative("optimizer.weights.correlation", opt.weights.correlation)?;
        non_negative("optimizer.weights.min_power", opt.weights.min_power)?;
        non_negative("optimizer.weights.narrow", opt.weights.narrow)?;
        non_negative("optimizer.min_ok_power", opt.min_ok_power)?;

        // PCA
        if self.pca.history_len == 0 {
            return Err(ConfigError::Zero {
                field: "pca.history_len",
            });
        }
        if self.pca.update_every == 0 {
            return Err(ConfigError::Zero {
                field: "pca.update_every",
            });
        }

        // Output wiring
        if let Some((a, b)) = self.output.swap {
            for index in [a, b] {
                if index >= n {
                    return Err(ConfigError::ChannelIndex {
                        field: "output.swap",
                        index,
                        channels: n,
                    });
                }
            }
        }

        // Boundaries
        let bounds = self.boundaries();
        let ordered = bounds.windows(2).all(|w| w[0] < w[1]);
        let inside = bounds
            .first()
            .is_some_and(|&b| b > 0)
            && bounds.last().is_some_and(|&b| b < self.spectrum_len);
        if bounds.len() != n - 1 || !ordered || !inside {
            return Err(ConfigError::Boundaries(bounds));
        }

        Ok(())
    }
}

/// `w / (1 + w)` with `w = 2π · f_c · T`.
#[inline]
pub fn iir_alpha(cutoff_hz: f32, period_s: f32) -> f32 {
    let w = TAU * cutoff_hz * period_s;
    (w / (1.0 + w)).clamp(0.0, 1.0)
}

fn per_channel(field: &'static str, v: &[f32], n: usize) -> Result<(), ConfigError> {
    if v.len() != n {
        return Err(ConfigError::ChannelCount {
            field,
            expected: n,
            got: v.len(),
        });
    }
    Ok(())
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}
