//! rust_autonav - autonomous navigation core for a small multirotor
//!
//! This crate provides particle-filter localization against a known
//! occupancy map, Vector Field Histogram obstacle avoidance, and the
//! priority-based arbitration of PID channel controllers into the command
//! vector sent to the flight controller.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Algorithm modules
pub mod localization;
pub mod mapping;
pub mod path_planning;
pub mod control;

// Re-export common types for convenience
pub use common::{Attitude, ChannelVector, FeedbackValue, HeadingDecision, Point2D, Pose2D, RangeReading, Segment2D};
pub use common::{ChannelController, FeedbackSource, FlightLink, StateEstimator};
pub use common::{NavigationError, NavigationResult};
pub use config::NavigationConfig;
