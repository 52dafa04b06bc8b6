//! Boundary Optimizer
//!
//! Moves each channel boundary a few bins at a time so channels end up about
//! equally loud, not tracking each other, not starved of signal, and not
//! pathologically narrow.
//!
//! # Purpose
//! A fixed split of the spectrum works for one song and fails for the next:
//! bass-heavy material leaves the upper channels dark, a solo instrument
//! drives two neighbouring channels in lockstep. Letting the boundaries drift
//! toward a low-cost layout keeps every light busy without per-track tuning.
//!
//! # Design Notes
//! - One boundary at a time, in order, each over a small window around its
//!   current position. A joint search over all boundaries would be quadratic
//!   in the window size; this is linear in `channels * window`.
//! - The window never reaches a neighbour, so channels can never become empty
//!   and the layout invariant holds after every move.
//! - Every boundary carries an IIR-smoothed correlation between the bins just
//!   below and just above it. It is refreshed every frame ("track"); the cost
//!   search only runs every `update_every` frames.
//! - Narrowness is a cost, not a hard limit.
//! - The variance term is divided by the squared mean power by default. It
//!   is then flat while a boundary moves through bins with no power, and the
//!   correlation term alone decides where a power edge sits.

use crate::config::OptimizerConfig;
use crate::dsp::utils::{iir, mean, min, variance, EPS};
use crate::mapping::aggregator::BinAggregator;
use crate::mapping::boundary::BoundarySet;
use log::{debug, trace};
use rustfft::num_complex::Complex;

/// Costs closer than this count as a tie
const COST_TIE_TOLERANCE: f32 = 1e-5;

/// Normalized correlation of two complex window means:
/// `(reA·reB + imA·imB) / max(|A|·|B|, ε)`.
#[inline]
pub fn complex_correlation(a: Complex<f32>, b: Complex<f32>) -> f32 {
    (a.re * b.re + a.im * b.im) / (a.norm() * b.norm()).max(EPS)
}

/// Spread of the channel powers. Normalized, it is the squared coefficient
/// of variation, bounded by `channels - 1` whatever the input level.
#[inline]
pub fn power_spread(powers: &[f32], normalize: bool) -> f32 {
    let var = variance(powers);
    if !normalize {
        return var;
    }
    let m = mean(powers);
    var / (m * m).max(EPS)
}

/// Scalar cost of one candidate layout.
///
/// `powers` and `widths` are the channel values with the candidate applied.
pub fn boundary_cost(
    config: &OptimizerConfig,
    powers: &[f32],
    widths: &[usize],
    correlation: f32,
) -> f32 {
    let weights = &config.weights;
    let starved = (config.min_ok_power - min(powers)).max(0.0);
    let narrowest = widths.iter().copied().min().unwrap_or(0);
    let narrow = config.min_ok_width.saturating_sub(narrowest) as f32;

    weights.variance * power_spread(powers, config.normalize_variance)
        + weights.correlation * correlation
        + weights.min_power * starved
        + weights.narrow * narrow
}

pub struct BoundaryOptimizer {
    config: OptimizerConfig,
    bounds: BoundarySet,
    correlations: Vec<f32>,
    /// Frames seen so far, starting at 1
    counter: usize,

    // Scratch, sized in new()
    powers: Vec<f32>,
    widths: Vec<usize>,
}

impl BoundaryOptimizer {
    pub fn new(bounds: BoundarySet, config: OptimizerConfig) -> Self {
        let n = bounds.num_channels();
        Self {
            config,
            correlations: vec![0.0; n - 1],
            bounds,
            counter: 1,
            powers: vec![0.0; n],
            widths: vec![0; n],
        }
    }

    pub fn boundaries(&self) -> &BoundarySet {
        &self.bounds
    }

    pub fn correlations(&self) -> &[f32] {
        &self.correlations
    }

    /// Whether the next `update()` will run the cost search.
    pub fn search_due(&self) -> bool {
        self.config.enabled && self.counter % self.config.update_every.max(1) == 0
    }

    /// Advance one frame against the spectrum loaded in `agg`.
    ///
    /// Returns `true` if this frame ran the cost search.
    pub fn update(&mut self, agg: &BinAggregator) -> bool {
        let searching = self.search_due();
        self.counter = self.counter.wrapping_add(1);

        if searching {
            agg.channels(&self.bounds, &mut self.powers);
            for (w, width) in self.widths.iter_mut().zip(self.bounds.widths()) {
                *w = width;
            }
        }

        for i in 0..self.correlations.len() {
            if searching {
                self.search(i, agg);
            } else {
                self.track(i, agg);
            }
        }
        searching
    }

    /// Blend the current correlation across boundary `i` at its present position.
    fn track(&mut self, i: usize, agg: &BinAggregator) {
        let (lo, hi) = self.bounds.neighbours(i);
        let b = self.bounds.get(i);
        let now = complex_correlation(agg.window_complex(lo..b), agg.window_complex(b..hi));
        self.correlations[i] = self.blend(now, self.correlations[i]);
    }

    #[inline]
    fn blend(&self, now: f32, estimate: f32) -> f32 {
        iir(now, estimate, self.config.corr_filter_constant)
    }

    /// Scan the safe window around boundary `i` and move it to the cheapest spot.
    fn search(&mut self, i: usize, agg: &BinAggregator) {
        let (lo, hi) = self.bounds.neighbours(i);
        let current = self.bounds.get(i);
        let radius = self.config.search_radius;

        let first = (lo + 1).max(current.saturating_sub(radius));
        let last = (hi - 1).min(current + radius);
        if first > last {
            trace!("boundary {i}: empty search window, tracking only");
            self.track(i, agg);
            return;
        }

        let estimate = self.correlations[i];
        let (saved_low, saved_high) = (self.powers[i], self.powers[i + 1]);
        let mut best: Option<(f32, usize, f32)> = None;

        for j in first..=last {
            self.powers[i] = agg.window_power(lo..j);
            self.powers[i + 1] = agg.window_power(j..hi);
            self.widths[i] = j - lo;
            self.widths[i + 1] = hi - j;

            let now = complex_correlation(agg.window_complex(lo..j), agg.window_complex(j..hi));
            let blended = self.blend(now, estimate);
            let cost = boundary_cost(&self.config, &self.powers, &self.widths, blended);

            // Lowest index wins unless a later candidate is clearly cheaper
            if best.map_or(true, |(c, _, _)| cost < c - COST_TIE_TOLERANCE) {
                best = Some((cost, j, blended));
            }
        }

        let Some((cost, j, blended)) = best else {
            self.powers[i] = saved_low;
            self.powers[i + 1] = saved_high;
            return;
        };

        if j != current {
            debug!("boundary {i}: {current} -> {j} (cost {cost:.4})");
        }
        self.bounds.set(i, j);
        self.correlations[i] = blended;
        self.powers[i] = agg.window_power(lo..j);
        self.powers[i + 1] = agg.window_power(j..hi);
        self.widths[i] = j - lo;
        self.widths[i + 1] = hi - j;
    }

    /// Restore a starting layout and clear every estimate.
    pub fn reset(&mut self, bounds: BoundarySet) {
        self.bounds = bounds;
        self.correlations.fill(0.0);
        self.counter = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Aggregation, CostWeights};
    use crate::spectrum::SpectralSample;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn optimizer(bounds: Vec<usize>, len: usize, config: OptimizerConfig) -> BoundaryOptimizer {
        BoundaryOptimizer::new(BoundarySet::new(bounds, len).unwrap(), config)
    }

    fn every_frame() -> OptimizerConfig {
        OptimizerConfig {
            update_every: 1,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn test_correlation_of_orthogonal_and_parallel() {
        let a = Complex::new(1.0, 0.0);
        assert!(complex_correlation(a, Complex::new(0.0, 3.0)).abs() < 1e-6);
        assert!((complex_correlation(a, Complex::new(2.0, 0.0)) - 1.0).abs() < 1e-6);
        assert_eq!(complex_correlation(a, Complex::new(0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_cost_terms() {
        let config = OptimizerConfig {
            weights: CostWeights {
                variance: 0.0,
                correlation: 0.0,
                min_power: 2.0,
                narrow: 0.5,
            },
            min_ok_power: 0.5,
            min_ok_width: 10,
            ..OptimizerConfig::default()
        };
        // Starved by 0.25, narrowest channel 6 bins short
        let cost = boundary_cost(&config, &[0.25, 1.0], &[4, 60], 0.9);
        assert!((cost - (2.0 * 0.25 + 0.5 * 6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_power_spread_ignores_level() {
        let quiet = [1.0, 0.0, 0.0, 0.0];
        let loud = [100.0, 0.0, 0.0, 0.0];
        assert!((power_spread(&quiet, true) - 3.0).abs() < 1e-5);
        assert!((power_spread(&loud, true) - 3.0).abs() < 1e-3);
        assert!((power_spread(&quiet, false) - 0.1875).abs() < 1e-6);
        assert_eq!(power_spread(&[0.0; 4], true), 0.0);
    }

    #[test]
    fn test_unequal_channels_move_toward_louder_side() {
        // Loud bins below 32 with alternating phase, quiet quadrature bins above
        let spectrum: Vec<SpectralSample> = (0..64)
            .map(|k| {
                if k < 32 {
                    SpectralSample::new(4.0, if k % 2 == 0 { 0.0 } else { PI })
                } else {
                    SpectralSample::new(1.0, FRAC_PI_2)
                }
            })
            .collect();
        let mut agg = BinAggregator::new(Aggregation::Sum, 64);
        agg.load(&spectrum);

        let config = OptimizerConfig {
            min_ok_width: 4,
            ..every_frame()
        };
        let mut opt = optimizer(vec![32], 64, config);

        let before = variance(&[agg.window_power(0..32), agg.window_power(32..64)]);
        assert!(opt.update(&agg));
        let b = opt.boundaries().get(0);
        let after = variance(&[agg.window_power(0..b), agg.window_power(b..64)]);

        assert!(b < 32, "boundary stayed at {b}");
        assert!(b >= 32 - opt.config.search_radius);
        assert!(after < before);
        assert!(opt.correlations()[0].abs() < 0.1);
    }

    #[test]
    fn test_track_only_between_searches() {
        let spectrum: Vec<SpectralSample> = (0..64)
            .map(|k| SpectralSample::new(if k < 32 { 4.0 } else { 1.0 }, 0.0))
            .collect();
        let mut agg = BinAggregator::new(Aggregation::Mean, 64);
        agg.load(&spectrum);

        let config = OptimizerConfig {
            update_every: 4,
            ..OptimizerConfig::default()
        };
        let mut opt = optimizer(vec![32], 64, config);

        // Frames 1..3 only track: position fixed, estimate rising toward 1
        for _ in 0..3 {
            assert!(!opt.update(&agg));
            assert_eq!(opt.boundaries().get(0), 32);
        }
        let c = opt.correlations()[0];
        assert!(c > 0.0 && c < 1.0);
        assert!(opt.update(&agg));
    }

    #[test]
    fn test_tight_layout_stays_valid() {
        // Single-bin channels leave at most one legal spot for some boundaries
        let spectrum = vec![SpectralSample::from_power(1.0); 8];
        let mut agg = BinAggregator::new(Aggregation::Mean, 8);
        agg.load(&spectrum);
        let mut opt = optimizer(vec![3, 4, 5], 8, every_frame());
        opt.update(&agg);
        assert!(opt.boundaries().is_valid());
        assert!(opt.correlations().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_invariant_holds_under_noise() {
        let mut agg = BinAggregator::new(Aggregation::Mean, 128);
        let mut opt = optimizer(vec![20, 40, 90], 128, every_frame());
        let mut seed = 12345u32;
        for _ in 0..500 {
            let spectrum: Vec<SpectralSample> = (0..128)
                .map(|_| {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    let p = (seed >> 16) as f32 / 65536.0;
                    SpectralSample::new(p * 3.0, p * 6.0 - 3.0)
                })
                .collect();
            agg.load(&spectrum);
            opt.update(&agg);
            assert!(opt.boundaries().is_valid(), "{:?}", opt.boundaries());
        }
    }

    fn power_edge() -> BinAggregator {
        // Unit power in [0, 512), nothing above
        let spectrum: Vec<SpectralSample> = (0..2048)
            .map(|k| SpectralSample::from_power(if k < 512 { 1.0 } else { 0.0 }))
            .collect();
        let mut agg = BinAggregator::new(Aggregation::Mean, 2048);
        agg.load(&spectrum);
        agg
    }

    #[test]
    fn test_boundary_holds_power_edge() {
        let agg = power_edge();
        let mut opt = optimizer(vec![512, 1024, 1536], 2048, OptimizerConfig::default());
        for _ in 0..400 {
            opt.update(&agg);
            assert!(opt.boundaries().is_valid());
        }
        let b0 = opt.boundaries().get(0);
        assert!((510..=514).contains(&b0), "boundary 0 at {b0}");
    }

    #[test]
    fn test_boundary_walks_back_to_power_edge() {
        let agg = power_edge();
        let mut opt = optimizer(vec![540, 1024, 1536], 2048, OptimizerConfig::default());
        for _ in 0..400 {
            opt.update(&agg);
            assert!(opt.boundaries().is_valid());
        }
        let b0 = opt.boundaries().get(0);
        assert!((510..=514).contains(&b0), "boundary 0 at {b0}");
    }

    #[test]
    fn test_raw_variance_drifts_past_power_edge() {
        let agg = power_edge();
        let config = OptimizerConfig {
            normalize_variance: false,
            ..OptimizerConfig::default()
        };
        let mut opt = optimizer(vec![512, 1024, 1536], 2048, config);
        for _ in 0..400 {
            opt.update(&agg);
        }
        assert!(opt.boundaries().get(0) > 520);
    }
}
