pub mod biquad;
pub mod fft_front_end;
pub mod filter_bank;
pub mod utils;

pub use biquad::Biquad;
pub use fft_front_end::{FftFrontEnd, DEFAULT_BUFFER_CYCLE};
pub use filter_bank::{FilterBank, EMBEDDED_SAMPLE_RATE, NUM_BANDS};
