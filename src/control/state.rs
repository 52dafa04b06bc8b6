use crate::config::EngineConfig;

/// Per-channel feedback state carried across frames.
///
/// Owned by the engine and handed to each stage by `&mut`; no stage keeps
/// its own copy.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    /// Multiplicative gain, always in `[0, gain.max]`
    pub gain: Vec<f32>,
    /// Filtered magnitude of the gained value
    pub gain_filter_state: Vec<f32>,
    /// Soft threshold, always in `[threshold.min, threshold.max]`
    pub threshold: Vec<f32>,
    /// Filtered fraction of frames at or above threshold
    pub threshold_filter_state: Vec<f32>,
    /// Output low-pass state
    pub smoothed: Vec<f32>,
    /// Last emitted levels in logical channel order, replayed on silence
    pub previous_output: Vec<f32>,
}

impl ControlState {
    pub fn new(config: &EngineConfig) -> Self {
        let n = config.num_channels;
        Self {
            gain: config.gain.initial.clone(),
            gain_filter_state: config.gain.goal_activity.clone(),
            threshold: vec![config.threshold.min; n],
            threshold_filter_state: config.threshold.goal_activity.clone(),
            smoothed: vec![0.0; n],
            previous_output: vec![0.0; n],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.gain.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_follows_config() {
        let config = EngineConfig::default();
        let state = ControlState::new(&config);
        assert_eq!(state.num_channels(), 4);
        assert_eq!(state.gain, config.gain.initial);
        assert_eq!(state.gain_filter_state, config.gain.goal_activity);
        assert!(state.threshold.iter().all(|&t| t == config.threshold.min));
        assert!(state.previous_output.iter().all(|&v| v == 0.0));
    }
}
