//! Channel boundaries over the spectral sequence.
//!
//! `N - 1` strictly increasing indices split `[0, F)` into `N` contiguous,
//! non-empty channel ranges. Channel `i` covers `[b[i-1], b[i])` with the
//! implicit outer edges `b[-1] = 0` and `b[N-1] = F`.

use crate::error::ConfigError;
use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundarySet {
    bounds: Vec<usize>,
    spectrum_len: usize,
}

impl BoundarySet {
    /// Validate and wrap an explicit layout.
    pub fn new(bounds: Vec<usize>, spectrum_len: usize) -> Result<Self, ConfigError> {
        let set = Self {
            bounds,
            spectrum_len,
        };
        if set.bounds.is_empty() || !set.is_valid() {
            return Err(ConfigError::Boundaries(set.bounds));
        }
        Ok(set)
    }

    /// `i * F / N` for `i` in `1..N`.
    pub fn evenly_spaced(num_channels: usize, spectrum_len: usize) -> Result<Self, ConfigError> {
        let bounds = (1..num_channels)
            .map(|i| i * spectrum_len / num_channels.max(1))
            .collect();
        Self::new(bounds, spectrum_len)
    }

    pub fn num_channels(&self) -> usize {
        self.bounds.len() + 1
    }

    pub fn spectrum_len(&self) -> usize {
        self.spectrum_len
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.bounds
    }

    #[inline]
    pub fn get(&self, i: usize) -> usize {
        self.bounds[i]
    }

    /// Lower and upper neighbour of boundary `i` (the sequence ends at the edges).
    #[inline]
    pub fn neighbours(&self, i: usize) -> (usize, usize) {
        let lo = if i == 0 { 0 } else { self.bounds[i - 1] };
        let hi = self
            .bounds
            .get(i + 1)
            .copied()
            .unwrap_or(self.spectrum_len);
        (lo, hi)
    }

    /// Bin range of channel `ch`.
    #[inline]
    pub fn range(&self, ch: usize) -> Range<usize> {
        let start = if ch == 0 { 0 } else { self.bounds[ch - 1] };
        let end = self
            .bounds
            .get(ch)
            .copied()
            .unwrap_or(self.spectrum_len);
        start..end
    }

    /// Width in bins of every channel.
    pub fn widths(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_channels()).map(move |ch| self.range(ch).len())
    }

    /// Move boundary `i`. The caller keeps `pos` strictly between its neighbours.
    pub(crate) fn set(&mut self, i: usize, pos: usize) {
        debug_assert!({
            let (lo, hi) = self.neighbours(i);
            lo < pos && pos < hi
        });
        self.bounds[i] = pos;
    }

    /// Strictly increasing and inside `(0, F)`.
    pub fn is_valid(&self) -> bool {
        self.bounds.windows(2).all(|w| w[0] < w[1])
            && self.bounds.first().is_some_and(|&b| b > 0)
            && self.bounds.last().is_some_and(|&b| b < self.spectrum_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_cover_spectrum() {
        let set = BoundarySet::new(vec![3, 7], 10).unwrap();
        assert_eq!(set.num_channels(), 3);
        assert_eq!(set.range(0), 0..3);
        assert_eq!(set.range(1), 3..7);
        assert_eq!(set.range(2), 7..10);
        assert_eq!(set.widths().sum::<usize>(), 10);
    }

    #[test]
    fn test_neighbours_at_edges() {
        let set = BoundarySet::new(vec![3, 7], 10).unwrap();
        assert_eq!(set.neighbours(0), (0, 7));
        assert_eq!(set.neighbours(1), (3, 10));
    }

    #[test]
    fn test_invalid_layouts_rejected() {
        assert!(BoundarySet::new(vec![0, 5], 10).is_err());
        assert!(BoundarySet::new(vec![5, 5], 10).is_err());
        assert!(BoundarySet::new(vec![5, 10], 10).is_err());
        assert!(BoundarySet::new(vec![], 10).is_err());
    }

    #[test]
    fn test_evenly_spaced() {
        let set = BoundarySet::evenly_spaced(4, 2048).unwrap();
        assert_eq!(set.as_slice(), &[512, 1024, 1536]);
        assert!(BoundarySet::evenly_spaced(4, 3).is_err());
    }
}
