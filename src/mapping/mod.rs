//! Spectrum-to-channel mapping: boundaries, aggregation, boundary search.

pub mod aggregator;
pub mod boundary;
pub mod optimizer;

pub use aggregator::BinAggregator;
pub use boundary::BoundarySet;
pub use optimizer::{boundary_cost, complex_correlation, BoundaryOptimizer};
