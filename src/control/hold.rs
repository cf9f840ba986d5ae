//! Single channel hold controllers built on the PID engine

use serde::{Deserialize, Serialize};

use crate::common::{wrap_degrees, ChannelController, FeedbackValue, NavigationError, NavigationResult};
use crate::control::pid::{PidConfig, PidController};

/// Holds a target altitude on the throttle channel
#[derive(Debug, Clone)]
pub struct AltitudeHold {
    pid: PidController,
    available: bool,
}

impl AltitudeHold {
    pub fn new(config: PidConfig) -> NavigationResult<Self> {
        Ok(AltitudeHold {
            pid: PidController::new(config)?,
            available: false,
        })
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn pid_mut(&mut self) -> &mut PidController {
        &mut self.pid
    }
}

impl ChannelController for AltitudeHold {
    fn name(&self) -> &str {
        "altitude-hold"
    }

    fn channels(&mut self) -> NavigationResult<Vec<u16>> {
        Ok(vec![self.pid.compute()])
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn set_availability(&mut self, available: bool) {
        self.available = available;
    }

    fn set_target(&mut self, target: f64) {
        self.pid.set_target(target);
    }

    fn set_measurement(&mut self, measurement: f64) {
        self.pid.set_measurement(measurement);
    }
}

/// Holds a target heading [deg] on the yaw channel.
///
/// Target and heading are wrapped into [-180, 180) and the measurement fed
/// to the PID is the heading unrolled next to the target, so the error
/// always takes the short way around.
#[derive(Debug, Clone)]
pub struct YawHold {
    pid: PidController,
    heading: f64,
    available: bool,
}

impl YawHold {
    pub fn new(config: PidConfig) -> NavigationResult<Self> {
        Ok(YawHold {
            pid: PidController::new(config)?,
            heading: 0.0,
            available: false,
        })
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Last heading reported, wrapped
    pub fn heading(&self) -> f64 {
        self.heading
    }

    fn unroll_measurement(&mut self) {
        let target = self.pid.target();
        self.pid.set_measurement(target - wrap_degrees(target - self.heading));
    }
}

impl ChannelController for YawHold {
    fn name(&self) -> &str {
        "yaw-hold"
    }

    fn channels(&mut self) -> NavigationResult<Vec<u16>> {
        Ok(vec![self.pid.compute()])
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn set_availability(&mut self, available: bool) {
        self.available = available;
    }

    fn set_target(&mut self, target: f64) {
        self.pid.set_target(wrap_degrees(target));
        self.unroll_measurement();
    }

    fn set_measurement(&mut self, measurement: f64) {
        self.heading = wrap_degrees(measurement);
        self.unroll_measurement();
    }

    /// Accepts the attitude report or a bare heading
    fn set_feedback(&mut self, feedback: &[FeedbackValue]) -> NavigationResult<()> {
        let heading = match feedback.first() {
            Some(FeedbackValue::Attitude(attitude)) => attitude.heading,
            Some(FeedbackValue::Scalar(heading)) => *heading,
            _ => {
                return Err(NavigationError::InvalidInput(
                    "yaw-hold expects an attitude or heading feedback".to_string(),
                ))
            }
        };
        self.set_measurement(heading);
        Ok(())
    }
}

/// Attitude axis held by an `InclinationHold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InclinationAxis {
    Roll,
    Pitch,
}

/// Holds a roll or pitch angle; the target travels with the feedback
#[derive(Debug, Clone)]
pub struct InclinationHold {
    pid: PidController,
    axis: InclinationAxis,
    available: bool,
}

impl InclinationHold {
    pub fn new(config: PidConfig, axis: InclinationAxis) -> NavigationResult<Self> {
        Ok(InclinationHold {
            pid: PidController::new(config)?,
            axis,
            available: false,
        })
    }

    pub fn axis(&self) -> InclinationAxis {
        self.axis
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }
}

impl ChannelController for InclinationHold {
    fn name(&self) -> &str {
        match self.axis {
            InclinationAxis::Roll => "roll-hold",
            InclinationAxis::Pitch => "pitch-hold",
        }
    }

    fn channels(&mut self) -> NavigationResult<Vec<u16>> {
        Ok(vec![self.pid.compute()])
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn set_availability(&mut self, available: bool) {
        self.available = available;
    }

    fn set_target(&mut self, target: f64) {
        self.pid.set_target(target);
    }

    fn set_measurement(&mut self, measurement: f64) {
        self.pid.set_measurement(measurement);
    }

    /// Expects `[Attitude, Scalar(target)]`
    fn set_feedback(&mut self, feedback: &[FeedbackValue]) -> NavigationResult<()> {
        let attitude = feedback
            .first()
            .and_then(FeedbackValue::as_attitude)
            .ok_or_else(|| NavigationError::InvalidInput(format!("{} expects an attitude", self.name())))?;
        let target = feedback
            .get(1)
            .and_then(FeedbackValue::as_scalar)
            .ok_or_else(|| NavigationError::InvalidInput(format!("{} expects a target", self.name())))?;

        let measurement = match self.axis {
            InclinationAxis::Roll => attitude.roll,
            InclinationAxis::Pitch => attitude.pitch,
        };
        self.pid.set_measurement(measurement);
        self.pid.set_target(target);
        Ok(())
    }
}
