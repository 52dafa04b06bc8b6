//! Harmonic Filter Bank (embedded spectral front end)
//!
//! Splits a sample stream into octave bands with a ladder of low-pass filters
//! whose cutoffs double at each rung. Band `k` is the difference between
//! adjacent low-pass outputs, except that band 1 is taken against the
//! rectified lowest band; the top band is whatever the highest low-pass
//! leaves of the input. Runs once per input sample, so the per-frame spectrum
//! is the rectified instantaneous band signal.
//!
//! # Design Notes
//! - 4th-order low-pass per rung (two identical Butterworth sections)
//! - Lowest cutoff defaults to `sample_rate / 1024` (~10.8 Hz at 11025 Hz)
//! - No allocations in `step()`

use super::biquad::{Biquad, BUTTERWORTH_Q};
use crate::spectrum::{SpectralFrontEnd, SpectralSample};

/// Bands produced by the default bank
pub const NUM_BANDS: usize = 9;

/// Sections cascaded per low-pass rung
const SECTIONS_PER_FILTER: usize = 2;

/// Sample rate the embedded target runs the bank at
pub const EMBEDDED_SAMPLE_RATE: f32 = 11025.0;

/// One low-pass rung: cascaded identical sections.
#[derive(Clone, Debug)]
struct Cascade {
    sections: [Biquad; SECTIONS_PER_FILTER],
}

impl Cascade {
    fn lowpass(cutoff: f32, sample_rate: f32) -> Self {
        let s = Biquad::lowpass(cutoff, BUTTERWORTH_Q, sample_rate);
        Self {
            sections: [s; SECTIONS_PER_FILTER],
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        self.sections
            .iter_mut()
            .fold(input, |x, section| section.process(x))
    }

    fn reset(&mut self) {
        for s in &mut self.sections {
            s.reset();
        }
    }
}

pub struct FilterBank {
    filters: Vec<Cascade>,
    bands: Vec<SpectralSample>,
}

impl FilterBank {
    /// The fixed 9-band harmonic bank.
    pub fn harmonic(sample_rate: f32) -> Self {
        Self::design(sample_rate, sample_rate / 1024.0, NUM_BANDS)
    }

    /// `bands - 1` low-pass rungs starting at `base_cutoff`, doubling upward.
    pub fn design(sample_rate: f32, base_cutoff: f32, bands: usize) -> Self {
        let bands = bands.max(2);
        let filters = (0..bands - 1)
            .map(|k| Cascade::lowpass(base_cutoff * (1u32 << k) as f32, sample_rate))
            .collect();
        Self {
            filters,
            bands: vec![SpectralSample::default(); bands],
        }
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Push one input sample and return the new band values.
    pub fn step(&mut self, input: f32) -> &[SpectralSample] {
        // Signed sum of every band below the current rung. It starts from the
        // rectified lowest band, then equals the previous rung's output.
        let mut below = 0.0f32;
        for (k, (filter, band)) in self
            .filters
            .iter_mut()
            .zip(self.bands.iter_mut())
            .enumerate()
        {
            let lp = filter.process(input);
            let value = lp - below;
            *band = SpectralSample::from_power(value.abs());
            below = if k == 0 { value.abs() } else { below + value };
        }
        if let Some(top) = self.bands.last_mut() {
            *top = SpectralSample::from_power((input - below).abs());
        }
        &self.bands
    }

    pub fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
        self.bands.fill(SpectralSample::default());
    }
}

impl SpectralFrontEnd for FilterBank {
    fn spectrum_len(&self) -> usize {
        self.bands.len()
    }

    fn spectrum(&self) -> &[SpectralSample] {
        &self.bands
    }
}
