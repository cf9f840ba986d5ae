//! Utility modules for rust_autonav

pub mod geometry;
pub mod grid_map;
pub mod visualization;

pub use grid_map::OccupancyMap;
pub use visualization::{colors, PointStyle, Visualizer};
