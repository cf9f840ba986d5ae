//! Common types used throughout rust_autonav

use nalgebra::Vector2;
use std::ops::{Index, IndexMut};

/// Number of actuator channels driven by the arbitration loop
pub const CHANNEL_COUNT: usize = 5;

/// 2D point representation (map cell units, x along rows, y along columns)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn norm(&self) -> f64 {
        self.distance(&Point2D::origin())
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// 2D pose (position + orientation)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, yaw: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

}

/// Wrap an angle in degrees into [-180, 180)
pub fn wrap_degrees(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Straight segment between two points, used for obstacle edges and rays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment2D {
    pub start: Point2D,
    pub end: Point2D,
}

impl Segment2D {
    pub fn new(start: Point2D, end: Point2D) -> Self {
        Self { start, end }
    }

    pub fn from_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Point2D::new(x1, y1), Point2D::new(x2, y2))
    }

    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }
}

/// One range sensor reading.
///
/// `angle` is the beam bisector in degrees relative to the agent heading
/// (counter-clockwise positive), `distance` is in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeReading {
    pub angle: f64,
    pub distance: f64,
}

impl RangeReading {
    pub fn new(angle: f64, distance: f64) -> Self {
        Self { angle, distance }
    }
}

/// Range readings supplied per control cycle
pub type RangeReadings = Vec<RangeReading>;

/// Attitude reported by the flight-controller link (degrees, seconds)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
    pub timestamp: f64,
}

impl Attitude {
    pub fn new(roll: f64, pitch: f64, heading: f64, timestamp: f64) -> Self {
        Self { roll, pitch, heading, timestamp }
    }
}

/// A value produced by a feedback source and pushed into a controller
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackValue {
    Scalar(f64),
    Attitude(Attitude),
    Ranges(RangeReadings),
    Point(Point2D),
}

impl FeedbackValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FeedbackValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_attitude(&self) -> Option<&Attitude> {
        match self {
            FeedbackValue::Attitude(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_ranges(&self) -> Option<&RangeReadings> {
        match self {
            FeedbackValue::Ranges(r) => Some(r),
            _ => None,
        }
    }
}

/// Raw actuator command values, one per channel (conventionally 1000-2000)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelVector(pub [u16; CHANNEL_COUNT]);

impl ChannelVector {
    /// Neutral command: throttle low, sticks centered, aux low
    pub const NEUTRAL: ChannelVector = ChannelVector([1000, 1500, 1500, 1500, 1000]);

    pub fn values(&self) -> &[u16; CHANNEL_COUNT] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.0.to_vec()
    }
}

impl Default for ChannelVector {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl Index<usize> for ChannelVector {
    type Output = u16;

    fn index(&self, index: usize) -> &u16 {
        &self.0[index]
    }
}

impl IndexMut<usize> for ChannelVector {
    fn index_mut(&mut self, index: usize) -> &mut u16 {
        &mut self.0[index]
    }
}

/// Steering decision produced by the VFH heading control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingDecision {
    /// Heading change in degrees, within [-180, 180]
    pub heading_delta: i32,
    pub speed: i32,
}

impl HeadingDecision {
    pub fn new(heading_delta: i32, speed: i32) -> Self {
        Self { heading_delta, speed }
    }

    /// Keep the current heading and stop
    pub fn hold() -> Self {
        Self { heading_delta: 0, speed: 0 }
    }

    pub fn is_hold(&self) -> bool {
        self.speed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
        assert!((p2.norm() - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(180.0), -180.0);
        assert_eq!(wrap_degrees(45.0), 45.0);
        assert_eq!(wrap_degrees(-725.0), -5.0);
    }

    #[test]
    fn test_channel_vector_default_is_neutral() {
        let channels = ChannelVector::default();
        assert_eq!(channels.values(), &[1000, 1500, 1500, 1500, 1000]);
        assert_eq!(channels[0], 1000);
    }

    #[test]
    fn test_feedback_value_accessors() {
        let scalar = FeedbackValue::Scalar(12.0);
        assert_eq!(scalar.as_scalar(), Some(12.0));
        assert!(scalar.as_attitude().is_none());

        let ranges = FeedbackValue::Ranges(vec![RangeReading::new(0.0, 40.0)]);
        assert_eq!(ranges.as_ranges().map(|r| r.len()), Some(1));
    }
}
