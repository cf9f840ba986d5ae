//! Vector Field Histogram obstacle avoidance
//!
//! Three stages reduce raw range readings to a steering decision:
//!
//! - `HistogramGrid` (in `mapping`): local emptiness/occupancy window
//! - `polar_histogram`: per-sector obstacle density of that window
//! - `heading_control`: valley search over the smoothed density
//!
//! # Example
//!
//! ```no_run
//! use nalgebra::DMatrix;
//! use rust_autonav::common::{Point2D, RangeReading};
//! use rust_autonav::mapping::{HistogramGrid, HistogramGridConfig};
//! use rust_autonav::path_planning::vfh::*;
//! use rust_autonav::utils::OccupancyMap;
//!
//! let map = OccupancyMap::from_matrix(DMatrix::zeros(60, 60));
//! let grid = HistogramGrid::new(map, HistogramGridConfig::default()).unwrap();
//! let polar = PolarHistogram::new(grid, PolarHistogramConfig::default()).unwrap();
//! let mut control = HeadingControl::new(polar, HeadingControlConfig::default()).unwrap();
//!
//! control
//!     .polar_histogram_mut()
//!     .grid_mut()
//!     .set_sensor_measurements(vec![RangeReading::new(0.0, 80.0)]);
//! let decision = control.compute_heading(0.0, &Point2D::new(50.0, 30.0), &Point2D::new(30.0, 30.0));
//! ```

pub mod heading_control;
pub mod polar_histogram;

pub use heading_control::{HeadingControl, HeadingControlConfig, Valley};
pub use polar_histogram::{hann_window, PolarHistogram, PolarHistogramConfig};
