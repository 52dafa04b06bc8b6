//! Output Shaper
//!
//! Last stage before the lights: per-channel low-pass, adaptive soft
//! threshold, clip, quantize, wiring remap.
//!
//! # Design Notes
//! - Smoothing is a single-pole low-pass whose constant comes from the
//!   per-channel cutoff and the frame period
//! - The soft threshold maps `[t, 1]` back onto `[0, 1]`; the threshold itself
//!   follows the same update-and-clamp loop as the gain controller, driven by
//!   the filtered fraction of frames at or above it
//! - The wiring swap happens once, in [`OutputFrame::fill`], on a copy; every
//!   stage before it works in logical channel order

use crate::config::EngineConfig;
use crate::control::state::ControlState;
use crate::dsp::utils::{feedback_update, finite_or_zero, iir};

/// Levels ready for a sink: floats for duty-cycle outputs, bytes for serial.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputFrame {
    /// `[0, 1]`, physical channel order
    pub levels: Vec<f32>,
    /// `round(255 * level)`, physical channel order
    pub bytes: Vec<u8>,
}

impl OutputFrame {
    pub fn new(num_channels: usize) -> Self {
        Self {
            levels: vec![0.0; num_channels],
            bytes: vec![0; num_channels],
        }
    }

    /// Clip, remap and quantize logical `levels` into this frame.
    pub fn fill(&mut self, levels: &[f32], swap: Option<(usize, usize)>) {
        for (dst, &v) in self.levels.iter_mut().zip(levels) {
            *dst = clip(v);
        }
        remap(&mut self.levels, swap);
        for (b, &v) in self.bytes.iter_mut().zip(&self.levels) {
            *b = quantize(v);
        }
    }

    pub fn num_channels(&self) -> usize {
        self.levels.len()
    }
}

/// Clamp to `[0, 1]`; NaN becomes 0.
#[inline]
pub fn clip(v: f32) -> f32 {
    finite_or_zero(v).clamp(0.0, 1.0)
}

/// `round(255 * clip(v))`
#[inline]
pub fn quantize(v: f32) -> u8 {
    (255.0 * clip(v)).round() as u8
}

/// Physical wiring correction: exchange two channels.
#[inline]
pub fn remap(levels: &mut [f32], swap: Option<(usize, usize)>) {
    if let Some((a, b)) = swap {
        if a < levels.len() && b < levels.len() {
            levels.swap(a, b);
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutputShaper {
    smooth_alpha: Vec<f32>,
    activity_alpha: Vec<f32>,
    goal: Vec<f32>,
    min: f32,
    max: f32,
    bump: f32,
    deadband: f32,
}

impl OutputShaper {
    pub fn new(config: &EngineConfig) -> Self {
        let alphas = |cutoffs: &[f32]| -> Vec<f32> {
            cutoffs.iter().map(|&fc| config.iir_alpha(fc)).collect()
        };
        Self {
            smooth_alpha: alphas(&config.smoothing.cutoff_hz),
            activity_alpha: alphas(&config.threshold.filter_cutoff_hz),
            goal: config.threshold.goal_activity.clone(),
            min: config.threshold.min,
            max: config.threshold.max,
            bump: config.threshold.bump,
            deadband: config.threshold.deadband,
        }
    }

    /// Low-pass each channel into `state.smoothed` and `out`.
    pub fn smooth(&self, input: &[f32], state: &mut ControlState, out: &mut [f32]) {
        for (ch, (o, &x)) in out.iter_mut().zip(input).enumerate() {
            let s = finite_or_zero(iir(x, state.smoothed[ch], self.smooth_alpha[ch]));
            state.smoothed[ch] = s;
            *o = s;
        }
    }

    /// Soft threshold in place, adapt the thresholds, clip to `[0, 1]`.
    pub fn threshold(&self, values: &mut [f32], state: &mut ControlState) {
        for (ch, v) in values.iter_mut().enumerate() {
            let t = state.threshold[ch];
            let active = *v >= t;
            let shaped = if active { (*v - t) / (1.0 - t) } else { 0.0 };

            let activity = iir(
                if active { 1.0 } else { 0.0 },
                state.threshold_filter_state[ch],
                self.activity_alpha[ch],
            );
            state.threshold_filter_state[ch] = activity;

            let update = feedback_update(self.goal[ch], activity);
            let mut next = t;
            if update.abs() > self.deadband {
                next -= self.bump * update;
            }
            state.threshold[ch] = finite_or_zero(next).clamp(self.min, self.max);

            *v = clip(shaped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_rounds_and_clips() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(0.1), 26);
        assert_eq!(quantize(-3.0), 0);
        assert_eq!(quantize(7.0), 255);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_fill_swaps_exactly_once() {
        let mut frame = OutputFrame::new(4);
        let logical = [0.1, 0.2, 0.3, 0.4];
        frame.fill(&logical, Some((0, 2)));
        assert_eq!(frame.levels, vec![0.3, 0.2, 0.1, 0.4]);
        assert_eq!(frame.bytes, vec![77, 51, 26, 102]);
        // Refilling from the same logical levels does not swap back
        frame.fill(&logical, Some((0, 2)));
        assert_eq!(frame.levels, vec![0.3, 0.2, 0.1, 0.4]);

        frame.fill(&logical, None);
        assert_eq!(frame.levels, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_soft_threshold_rescales() {
        let config = EngineConfig::default();
        let shaper = OutputShaper::new(&config);
        let mut state = ControlState::new(&config);
        state.threshold = vec![0.5; 4];

        let mut v = [0.25, 0.5, 0.75, 1.0];
        shaper.threshold(&mut v, &mut state);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 0.0);
        assert!((v[2] - 0.5).abs() < 1e-6);
        assert!((v[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_stays_in_range() {
        let config = EngineConfig::default();
        let shaper = OutputShaper::new(&config);
        let mut state = ControlState::new(&config);
        let (tmin, tmax) = (config.threshold.min, config.threshold.max);

        // Always on, then always off: both ends of the clamp get exercised
        let mut v = [0.0; 4];
        for k in 0..20_000 {
            v.fill(if k < 10_000 { 1.0 } else { 0.0 });
            shaper.threshold(&mut v, &mut state);
            for &t in &state.threshold {
                assert!((tmin..=tmax).contains(&t));
            }
        }
    }

    #[test]
    fn test_constant_activity_raises_threshold() {
        let config = EngineConfig::default();
        let shaper = OutputShaper::new(&config);
        let mut state = ControlState::new(&config);
        let start = state.threshold.clone();
        let mut v = [0.0; 4];
        for _ in 0..500 {
            v.fill(0.8);
            shaper.threshold(&mut v, &mut state);
        }
        for (t, s) in state.threshold.iter().zip(&start) {
            assert!(t > s);
        }
    }

    #[test]
    fn test_smoothing_converges_to_input() {
        let config = EngineConfig::default();
        let shaper = OutputShaper::new(&config);
        let mut state = ControlState::new(&config);
        let mut out = [0.0; 4];
        for _ in 0..500 {
            shaper.smooth(&[0.6; 4], &mut state, &mut out);
        }
        for &v in &out {
            assert!((v - 0.6).abs() < 1e-3);
        }
    }
}
