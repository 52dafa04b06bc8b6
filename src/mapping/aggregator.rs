//! Bin Aggregator
//!
//! Reduces the per-bin spectrum to one power value per channel.
//!
//! # Design Notes
//! - Prefix sums of power and of the complex bin values are built once per
//!   frame; any window mean afterwards is O(1). The boundary search leans on
//!   this heavily (one window pair per candidate).
//! - Accumulation is f64: a 2048-bin prefix in f32 loses the small bins.
//! - A zero-length window reduces to 0, never NaN.

use crate::config::Aggregation;
use crate::mapping::boundary::BoundarySet;
use crate::spectrum::SpectralSample;
use rustfft::num_complex::Complex;
use std::ops::Range;

pub struct BinAggregator {
    mode: Aggregation,
    power: Vec<f64>,
    re: Vec<f64>,
    im: Vec<f64>,
}

impl BinAggregator {
    pub fn new(mode: Aggregation, spectrum_len: usize) -> Self {
        Self {
            mode,
            power: vec![0.0; spectrum_len + 1],
            re: vec![0.0; spectrum_len + 1],
            im: vec![0.0; spectrum_len + 1],
        }
    }

    pub fn mode(&self) -> Aggregation {
        self.mode
    }

    /// Number of bins currently loaded.
    pub fn len(&self) -> usize {
        self.power.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the prefix sums for this frame's spectrum.
    ///
    /// The spectrum length must match the one given to `new()`; the engine
    /// checks this before calling.
    pub fn load(&mut self, spectrum: &[SpectralSample]) {
        debug_assert_eq!(spectrum.len(), self.len());
        let (mut p, mut r, mut i) = (0.0f64, 0.0f64, 0.0f64);
        for (k, s) in spectrum.iter().enumerate().take(self.len()) {
            let c = s.to_complex();
            p += s.power as f64;
            r += c.re as f64;
            i += c.im as f64;
            self.power[k + 1] = p;
            self.re[k + 1] = r;
            self.im[k + 1] = i;
        }
    }

    /// Clamp a window to the loaded bins.
    #[inline]
    fn clamp(&self, range: Range<usize>) -> Range<usize> {
        let end = range.end.min(self.len());
        range.start.min(end)..end
    }

    /// Raw power sum of a window.
    #[inline]
    pub fn power_sum(&self, range: Range<usize>) -> f32 {
        let r = self.clamp(range);
        (self.power[r.end] - self.power[r.start]) as f32
    }

    /// Channel value of a window under the configured reduction.
    #[inline]
    pub fn window_power(&self, range: Range<usize>) -> f32 {
        let r = self.clamp(range);
        match self.mode {
            Aggregation::Sum => self.power_sum(r),
            Aggregation::Mean => {
                if r.is_empty() {
                    0.0
                } else {
                    self.power_sum(r.clone()) / r.len() as f32
                }
            }
        }
    }

    /// Mean complex value of a window (zero when empty).
    #[inline]
    pub fn window_complex(&self, range: Range<usize>) -> Complex<f32> {
        let r = self.clamp(range);
        if r.is_empty() {
            return Complex::new(0.0, 0.0);
        }
        let n = r.len() as f64;
        Complex::new(
            ((self.re[r.end] - self.re[r.start]) / n) as f32,
            ((self.im[r.end] - self.im[r.start]) / n) as f32,
        )
    }

    /// Channel vector for the loaded spectrum under `bounds`.
    pub fn channels(&self, bounds: &BoundarySet, out: &mut [f32]) {
        for (ch, v) in out.iter_mut().enumerate().take(bounds.num_channels()) {
            *v = self.window_power(bounds.range(ch));
        }
    }

    /// Load `spectrum` and reduce it in one call.
    pub fn aggregate(&mut self, spectrum: &[SpectralSample], bounds: &BoundarySet, out: &mut [f32]) {
        self.load(spectrum);
        self.channels(bounds, out);
    }
}
