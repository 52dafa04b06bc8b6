//! Gain Controller
//!
//! Per-channel multiplicative gain, nudged every frame so the filtered
//! magnitude of the gained signal sits near a goal activity level.
//!
//! # Design Notes
//! - Integral-style: `gain += bump * update` where
//!   `update = (goal - filtered) / max(|filtered|, ε)`, skipped inside a deadband
//! - A saturated (`> 1`) or dead (`<= 0`) gained value multiplies the step by
//!   `edge_gain` to get out of the stuck region quickly
//! - Gain is clamped to `[0, max]` after every update

use crate::config::EngineConfig;
use crate::control::state::ControlState;
use crate::dsp::utils::{feedback_update, finite_or_zero, iir};

#[derive(Clone, Debug)]
pub struct GainController {
    goal: Vec<f32>,
    alpha: Vec<f32>,
    max: f32,
    bump: f32,
    deadband: f32,
    edge_gain: f32,
}

impl GainController {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            goal: config.gain.goal_activity.clone(),
            alpha: config
                .gain
                .filter_cutoff_hz
                .iter()
                .map(|&fc| config.iir_alpha(fc))
                .collect(),
            max: config.gain.max,
            bump: config.gain.bump,
            deadband: config.gain.deadband,
            edge_gain: config.gain.edge_gain,
        }
    }

    /// Apply the current gains to `input`, then adapt them for the next frame.
    pub fn process(&self, input: &[f32], state: &mut ControlState, out: &mut [f32]) {
        for (ch, (o, &x)) in out.iter_mut().zip(input).enumerate() {
            let gained = finite_or_zero(x * state.gain[ch]);
            *o = gained;

            let filtered = iir(gained.abs(), state.gain_filter_state[ch], self.alpha[ch]);
            state.gain_filter_state[ch] = filtered;

            let update = feedback_update(self.goal[ch], filtered);
            let edge = if gained > 1.0 || gained <= 0.0 {
                self.edge_gain
            } else {
                1.0
            };

            let mut gain = state.gain[ch];
            if update.abs() > self.deadband {
                gain += self.bump * update * edge;
            }
            state.gain[ch] = finite_or_zero(gain).clamp(0.0, self.max);
        }
    }
}
