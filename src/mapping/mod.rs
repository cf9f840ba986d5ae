// Mapping module

pub mod histogram_grid;

pub use histogram_grid::{saturating_combine, wrap_to_pi, HistogramGrid, HistogramGridConfig};
