//! Spectral front-end interface.
//!
//! The engine consumes one ordered sequence of [`SpectralSample`]s per frame.
//! Whether they come from an FFT or from the harmonic filter bank makes no
//! difference to anything downstream.

use rustfft::num_complex::Complex;

/// One frequency bin (or filter band) for the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpectralSample {
    /// Non-negative magnitude of the bin
    pub power: f32,
    /// Phase in (-π, π]
    pub phase: f32,
}

impl SpectralSample {
    pub fn new(power: f32, phase: f32) -> Self {
        Self { power, phase }
    }

    /// A real-valued band with zero phase (filter-bank output).
    pub fn from_power(power: f32) -> Self {
        Self { power, phase: 0.0 }
    }

    pub fn from_complex(c: Complex<f32>) -> Self {
        Self {
            power: c.norm(),
            phase: c.im.atan2(c.re),
        }
    }

    #[inline]
    pub fn to_complex(self) -> Complex<f32> {
        Complex::from_polar(self.power, self.phase)
    }
}

/// Anything that can produce the per-frame spectrum.
pub trait SpectralFrontEnd {
    /// Number of samples produced per frame (`F`).
    fn spectrum_len(&self) -> usize;

    /// Latest spectrum. Length is always `spectrum_len()`.
    fn spectrum(&self) -> &[SpectralSample];
}
