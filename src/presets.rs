use crate::config::EngineConfig;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// ENGINE PRESETS
// =============================================================================

/// Starting configurations for the two supported front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Desktop capture, two-block FFT, 2048 bins
    DesktopFft,
    /// Per-sample frames over the 9-band harmonic filter bank
    EmbeddedFilterBank,
}

impl Preset {
    pub fn all_presets() -> [Preset; 2] {
        [Preset::DesktopFft, Preset::EmbeddedFilterBank]
    }

    /// Key in `presets.json`.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::DesktopFft => "desktop_fft",
            Preset::EmbeddedFilterBank => "embedded_filter_bank",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::DesktopFft => "Sound card input, FFT front end, serial light board",
            Preset::EmbeddedFilterBank => "ADC input at 11025 Hz, filter bank, PWM outputs",
        }
    }

    /// Built-in values, used when the baked-in table has no usable entry.
    pub fn builtin(&self) -> EngineConfig {
        match self {
            Preset::DesktopFft => EngineConfig::default(),
            Preset::EmbeddedFilterBank => {
                let mut config = EngineConfig {
                    buffer_size: 1,
                    sample_rate: 11025.0,
                    spectrum_len: 9,
                    silence_epsilon: 1e-6,
                    initial_boundaries: Some(vec![3, 5, 7]),
                    ..EngineConfig::default()
                };
                config.optimizer.search_radius = 1;
                config.optimizer.update_every = 64;
                config.optimizer.min_ok_width = 1;
                config
            }
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Preset::DesktopFft
    }
}

#[derive(Debug)]
pub struct PresetManager {
    presets: HashMap<String, EngineConfig>,
}

impl PresetManager {
    /// Load presets from baked-in JSON. This is fallible but non-fatal:
    /// a malformed table falls back to the built-in values.
    pub fn new() -> Self {
        let presets_str = include_str!("../presets.json");
        match serde_json::from_str::<HashMap<String, EngineConfig>>(presets_str) {
            Ok(presets) => Self { presets },
            Err(e) => {
                warn!("baked-in presets unreadable ({e}), using built-in values");
                Self::default()
            }
        }
    }

    /// A manager holding only the built-in values.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Configuration for `preset`; invalid table entries fall back to the built-in one.
    pub fn config(&self, preset: Preset) -> EngineConfig {
        match self.presets.get(preset.name()) {
            Some(config) => match config.validate() {
                Ok(()) => config.clone(),
                Err(e) => {
                    warn!("preset {}: {e}, using built-in values", preset.name());
                    preset.builtin()
                }
            },
            None => preset.builtin(),
        }
    }
}

impl Default for PresetManager {
    fn default() -> Self {
        let presets = Preset::all_presets()
            .iter()
            .map(|p| (p.name().to_string(), p.builtin()))
            .collect();
        Self { presets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baked_presets_are_valid() {
        let manager = PresetManager::new();
        for preset in Preset::all_presets() {
            assert!(manager.config(preset).validate().is_ok(), "{}", preset.name());
        }
    }

    #[test]
    fn test_baked_presets_match_builtin() {
        let manager = PresetManager::new();
        for preset in Preset::all_presets() {
            assert_eq!(manager.config(preset), preset.builtin(), "{}", preset.name());
        }
    }

    #[test]
    fn test_embedded_preset_fits_filter_bank() {
        let config = PresetManager::new().config(Preset::EmbeddedFilterBank);
        assert_eq!(config.spectrum_len, crate::dsp::NUM_BANDS);
        assert_eq!(config.buffer_size, 1);
    }
}
