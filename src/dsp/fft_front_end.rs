//! FFT Front End (desktop spectral path)
//!
//! Keeps the last `cycle` audio blocks as one sliding window and transforms
//! the whole window every frame, so each frame sees `cycle` blocks of context
//! while the frame rate stays at one block.
//!
//! ## Audio Thread Safety
//! - Plan, window and scratch buffers allocated in `new()`
//! - No allocations in `push_block()`

use crate::error::{EngineError, EngineResult};
use crate::spectrum::{SpectralFrontEnd, SpectralSample};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Blocks per transform window
pub const DEFAULT_BUFFER_CYCLE: usize = 2;

pub struct FftFrontEnd {
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    /// Oldest sample first
    window: Vec<f32>,
    buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    spectrum: Vec<SpectralSample>,
}

impl FftFrontEnd {
    pub fn new(block_size: usize, cycle: usize) -> Self {
        let len = block_size.max(1) * cycle.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            block_size: block_size.max(1),
            fft,
            window: vec![0.0; len],
            buf: vec![Complex::new(0.0, 0.0); len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            spectrum: vec![SpectralSample::default(); len / 2],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Slide one block into the window and recompute the spectrum.
    pub fn push_block(&mut self, block: &[f32]) -> EngineResult<&[SpectralSample]> {
        if block.len() != self.block_size {
            return Err(EngineError::BlockSize {
                expected: self.block_size,
                got: block.len(),
            });
        }

        self.window.copy_within(self.block_size.., 0);
        let tail = self.window.len() - self.block_size;
        self.window[tail..].copy_from_slice(block);

        for (c, &x) in self.buf.iter_mut().zip(&self.window) {
            *c = Complex::new(x, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);

        for (s, &c) in self.spectrum.iter_mut().zip(&self.buf) {
            *s = SpectralSample::from_complex(c);
        }
        Ok(&self.spectrum)
    }

    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.spectrum.fill(SpectralSample::default());
    }
}

impl SpectralFrontEnd for FftFrontEnd {
    fn spectrum_len(&self) -> usize {
        self.spectrum.len()
    }

    fn spectrum(&self) -> &[SpectralSample] {
        &self.spectrum
    }
}
