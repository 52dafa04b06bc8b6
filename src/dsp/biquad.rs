//! Biquad Section (IIR 2nd Order)
//!
//! Building block of the harmonic filter bank. Direct form II transposed, two
//! state words per section, no allocations.
//!
//! # Design Notes
//! - Coefficients follow the usual normalized form (`a0 == 1`):
//!   `y = b0 x + z1`, `z1' = b1 x - a1 y + z2`, `z2' = b2 x - a2 y`
//! - A tiny DC offset is folded into the state to keep it out of denormals on
//!   long silent stretches (the embedded target has no flush-to-zero)

use std::f32::consts::PI;

/// Butterworth Q for a single 2nd-order section
pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Biquad filter implementation (IIR 2nd order)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// Pass-through section.
    pub fn new() -> Self {
        Self::from_coefficients(1.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn from_coefficients(b0: f32, b1: f32, b2: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// RBJ low-pass section.
    pub fn lowpass(cutoff: f32, q: f32, sr: f32) -> Self {
        let mut s = Self::new();
        s.update_lpf(cutoff, q, sr);
        s
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.b0 + self.z1;

        self.z1 = input * self.b1 + self.z2 - self.a1 * out + 1e-25;
        self.z2 = input * self.b2 - self.a2 * out + 1e-25;

        out
    }

    /// Clear the delay line. Coefficient updates never do this implicitly.
    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// `(b0, b1, b2, a1, a2)`
    pub fn coefficients(&self) -> (f32, f32, f32, f32, f32) {
        (self.b0, self.b1, self.b2, self.a1, self.a2)
    }

    pub fn update_lpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.b0 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.b1 = (1.0 - cw0) * inv_a0;
        self.b2 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.a1 = (-2.0 * cw0) * inv_a0;
        self.a2 = (1.0 - alpha) * inv_a0;
    }
}
