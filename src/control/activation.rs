//! Activation Stage (decorrelation)
//!
//! Keeps channels from moving in lockstep before gain control sees them.
//! Two strategies share the [`ActivationStage`] interface:
//!
//! - [`DifferenceDecorrelator`]: per-frame, no history. Each channel is
//!   replaced by a blend of its deviation from its own long-run level and its
//!   deviation from the reference channel scaled by the ratio of long-run levels.
//! - [`PcaActivation`]: projects the current vector onto the principal
//!   directions of a rolling history. Catches structure that is correlated over
//!   time rather than frame-by-frame, at the price of an SVD per update.
//!
//! Both write finite values only.

use crate::config::{ActivationKind, EngineConfig};
use crate::control::history::HistoryBuffer;
use crate::control::state::ControlState;
use crate::dsp::utils::{finite_or_zero, floor_eps};
use log::{debug, warn};
use nalgebra::{DMatrix, SVD};

/// SVD iteration cap; a history this small converges in a handful.
const SVD_MAX_ITERATIONS: usize = 1000;

/// One decorrelation strategy: `raw` channel vector in, activation vector out.
pub trait ActivationStage {
    fn activate(&mut self, raw: &[f32], state: &ControlState, out: &mut [f32]);

    fn reset(&mut self);
}

// =============================================================================
// Difference Decorrelation
// =============================================================================

#[derive(Clone, Debug)]
pub struct DifferenceDecorrelator {
    reference: usize,
    /// Weight of the self-deviation term
    percent_derivative: f32,
}

impl DifferenceDecorrelator {
    pub fn new(reference: usize, percent_derivative: f32) -> Self {
        Self {
            reference,
            percent_derivative,
        }
    }
}

impl ActivationStage for DifferenceDecorrelator {
    fn activate(&mut self, raw: &[f32], state: &ControlState, out: &mut [f32]) {
        let levels = &state.gain_filter_state;
        let (raw_ref, level_ref) = match (raw.get(self.reference), levels.get(self.reference)) {
            (Some(&r), Some(&l)) => (r, floor_eps(l)),
            _ => (0.0, floor_eps(0.0)),
        };
        let p = self.percent_derivative;

        for (i, ((o, &x), &level)) in out.iter_mut().zip(raw).zip(levels).enumerate() {
            if i == self.reference {
                *o = finite_or_zero(x);
                continue;
            }
            let ratio = level / level_ref;
            let own = (x - level).abs();
            let common = (x - ratio * raw_ref).abs();
            *o = finite_or_zero(p * own + (1.0 - p) * common);
        }
    }

    fn reset(&mut self) {}
}

// =============================================================================
// PCA Activation
// =============================================================================

pub struct PcaActivation {
    history: HistoryBuffer,
    update_every: usize,
    frame: usize,
    mean: Vec<f32>,
    /// Principal directions as rows, strongest first
    directions: DMatrix<f64>,
    /// Sanitized copy of the current input
    current: Vec<f32>,
}

impl PcaActivation {
    pub fn new(history_len: usize, channels: usize, update_every: usize) -> Self {
        Self {
            history: HistoryBuffer::new(history_len, channels),
            update_every: update_every.max(1),
            frame: 0,
            mean: vec![0.0; channels],
            directions: DMatrix::zeros(0, channels),
            current: vec![0.0; channels],
        }
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Current principal directions (rows), strongest first.
    pub fn directions(&self) -> &DMatrix<f64> {
        &self.directions
    }

    /// Recompute the principal directions of the mean-centered history.
    fn update_directions(&mut self) {
        let rows = self.history.len();
        let channels = self.history.channels();
        if rows == 0 {
            return;
        }

        let mean = &self.mean;
        let centered = DMatrix::<f64>::from_row_iterator(
            rows,
            channels,
            self.history
                .rows()
                .flat_map(|row| row.iter().zip(mean).map(|(&v, &m)| (v - m) as f64)),
        );

        let Some(svd) = SVD::try_new(centered, false, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        else {
            warn!("PCA: SVD did not converge, keeping previous directions");
            return;
        };
        let Some(v_t) = svd.v_t else {
            return;
        };

        // Strongest direction first
        let mut order: Vec<usize> = (0..v_t.nrows()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let mut directions = DMatrix::<f64>::zeros(order.len(), channels);
        for (k, &src) in order.iter().enumerate() {
            let mut row = v_t.row(src).into_owned();
            // Fix the sign so repeated decompositions agree
            let pivot = row.iter().copied().fold(0.0f64, |acc, v| {
                if v.abs() > acc.abs() {
                    v
                } else {
                    acc
                }
            });
            if pivot < 0.0 {
                row.neg_mut();
            }
            directions.set_row(k, &row);
        }
        self.directions = directions;
    }
}

impl ActivationStage for PcaActivation {
    fn activate(&mut self, raw: &[f32], _state: &ControlState, out: &mut [f32]) {
        for (c, &x) in self.current.iter_mut().zip(raw) {
            *c = finite_or_zero(x);
        }

        self.history.mean(&mut self.mean);
        if self.frame % self.update_every == 0 || self.directions.nrows() == 0 {
            self.update_directions();
        }
        self.frame = self.frame.wrapping_add(1);

        out.fill(0.0);
        for (k, o) in out.iter_mut().enumerate().take(self.directions.nrows()) {
            let projection: f64 = self
                .directions
                .row(k)
                .iter()
                .zip(self.current.iter().zip(&self.mean))
                .map(|(&d, (&x, &m))| d * (x - m) as f64)
                .sum();
            *o = finite_or_zero(projection as f32);
        }

        self.history.push(&self.current);
    }

    fn reset(&mut self) {
        self.history.clear();
        self.frame = 0;
        self.mean.fill(0.0);
        self.directions = DMatrix::zeros(0, self.history.channels());
    }
}

// =============================================================================
// Selection
// =============================================================================

/// The configured strategy.
pub enum Activation {
    Difference(DifferenceDecorrelator),
    Pca(PcaActivation),
}

impl Activation {
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.activation {
            ActivationKind::Difference => {
                debug!(
                    "activation: difference, reference channel {}",
                    config.decorrelation.reference_channel
                );
                Activation::Difference(DifferenceDecorrelator::new(
                    config.decorrelation.reference_channel,
                    config.decorrelation.percent_derivative,
                ))
            }
            ActivationKind::Pca => {
                debug!("activation: PCA over {} frames", config.pca.history_len);
                Activation::Pca(PcaActivation::new(
                    config.pca.history_len,
                    config.num_channels,
                    config.pca.update_every,
                ))
            }
        }
    }

    pub fn kind(&self) -> ActivationKind {
        match self {
            Activation::Difference(_) => ActivationKind::Difference,
            Activation::Pca(_) => ActivationKind::Pca,
        }
    }
}

impl ActivationStage for Activation {
    fn activate(&mut self, raw: &[f32], state: &ControlState, out: &mut [f32]) {
        match self {
            Activation::Difference(d) => d.activate(raw, state, out),
            Activation::Pca(p) => p.activate(raw, state, out),
        }
    }

    fn reset(&mut self) {
        match self {
            Activation::Difference(d) => d.reset(),
            Activation::Pca(p) => p.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_levels(levels: &[f32]) -> ControlState {
        let mut state = ControlState::new(&EngineConfig::default());
        state.gain_filter_state = levels.to_vec();
        state
    }

    #[test]
    fn test_difference_reference_passes_through() {
        let mut d = DifferenceDecorrelator::new(0, 0.9);
        let state = state_with_levels(&[0.5, 0.5, 0.5, 0.5]);
        let mut out = [0.0; 4];
        d.activate(&[0.8, 0.8, 0.8, 0.8], &state, &mut out);
        assert_eq!(out[0], 0.8);
        // Identical channels: common term vanishes, own term is |0.8 - 0.5|
        for &v in &out[1..] {
            assert!((v - 0.9 * 0.3).abs() < 1e-6);
        }
    }

    #[test]
    fn test_difference_pure_common_mode_cancels() {
        let mut d = DifferenceDecorrelator::new(0, 0.0);
        let state = state_with_levels(&[0.2, 0.4, 0.1, 0.2]);
        let mut out = [0.0; 4];
        // Every channel is its long-run share of the reference
        d.activate(&[1.0, 2.0, 0.5, 1.0], &state, &mut out);
        for &v in &out[1..] {
            assert!(v.abs() < 1e-6);
        }
    }

    #[test]
    fn test_difference_survives_dead_reference() {
        let mut d = DifferenceDecorrelator::new(0, 0.5);
        let state = state_with_levels(&[0.0, 0.3, 0.3, 0.3]);
        let mut out = [0.0; 4];
        d.activate(&[0.0, 0.3, f32::NAN, 0.3], &state, &mut out);
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn test_pca_first_frame_is_zero() {
        let state = ControlState::new(&EngineConfig::default());
        let mut p = PcaActivation::new(16, 4, 1);
        let mut out = [1.0; 4];
        p.activate(&[0.3, 0.1, 0.2, 0.4], &state, &mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(p.history().len(), 1);
    }

    #[test]
    fn test_pca_lockstep_channels_collapse_to_one_component() {
        let state = ControlState::new(&EngineConfig::default());
        let mut p = PcaActivation::new(32, 4, 1);
        let mut out = [0.0; 4];
        for k in 0..32 {
            let a = (k % 7) as f32 * 0.1;
            p.activate(&[a, a, 0.2, 0.2], &state, &mut out);
        }

        p.activate(&[1.0, 1.0, 0.2, 0.2], &state, &mut out);
        // Mean of the 32 rows seen before the last call
        let m: f32 = (0..32).map(|k| (k % 7) as f32 * 0.1).sum::<f32>() / 32.0;
        let expected = (1.0 - m) * std::f32::consts::SQRT_2;
        assert!((out[0].abs() - expected).abs() < 1e-3, "{out:?}");
        for &v in &out[1..] {
            assert!(v.abs() < 1e-3, "{out:?}");
        }
    }

    #[test]
    fn test_pca_short_history_pads_with_zeros() {
        let state = ControlState::new(&EngineConfig::default());
        let mut p = PcaActivation::new(2, 4, 1);
        let mut out = [0.0; 4];
        for k in 0..5 {
            p.activate(&[k as f32, 0.5, (k * k) as f32, 1.0], &state, &mut out);
        }
        assert!(p.directions().nrows() <= 2);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[3], 0.0);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_pca_reset_clears_history() {
        let state = ControlState::new(&EngineConfig::default());
        let mut p = PcaActivation::new(8, 2, 1);
        let mut out = [0.0; 2];
        p.activate(&[1.0, 0.0], &state, &mut out);
        p.reset();
        assert!(p.history().is_empty());
        assert_eq!(p.directions().nrows(), 0);
    }
}
