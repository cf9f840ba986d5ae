//! PID engine shared by the channel controllers
//!
//! Works in raw channel units: the output is the previous output plus the
//! weighted error terms, clamped to the configured limits.

use serde::{Deserialize, Serialize};

use crate::common::{NavigationError, NavigationResult};

/// Gains, limits and starting output of one PID loop.
///
/// No field has a serde default: each controller has its own defaults, so a
/// PID table in a config file must be complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub lower_limit: u16,
    pub upper_limit: u16,
    /// Output assumed before the first computation
    pub initial_output: f64,
}

impl PidConfig {
    pub fn altitude() -> Self {
        Self {
            kp: 0.02,
            ki: 0.005,
            kd: 0.01,
            lower_limit: 1000,
            upper_limit: 1600,
            initial_output: 1000.0,
        }
    }

    pub fn yaw() -> Self {
        Self {
            kp: 0.02,
            ki: 0.0,
            kd: 0.01,
            lower_limit: 1400,
            upper_limit: 1600,
            initial_output: 1500.0,
        }
    }

    pub fn inclination() -> Self {
        Self {
            kp: 0.04,
            ..Self::yaw()
        }
    }

    pub fn take_off() -> Self {
        Self {
            kp: 0.002,
            ki: 0.0,
            kd: 0.00085,
            ..Self::altitude()
        }
    }

    pub fn validate(&self) -> NavigationResult<()> {
        if self.lower_limit > self.upper_limit {
            return Err(NavigationError::InvalidParameter(format!(
                "PID lower limit {} above upper limit {}",
                self.lower_limit, self.upper_limit
            )));
        }
        if ![self.kp, self.ki, self.kd, self.initial_output].iter().all(|v| v.is_finite()) {
            return Err(NavigationError::InvalidParameter("PID gains must be finite".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    target: f64,
    measurement: f64,
    previous_error: f64,
    accumulated_error: f64,
    last_output: f64,
}

impl PidController {
    pub fn new(config: PidConfig) -> NavigationResult<Self> {
        config.validate()?;
        Ok(PidController {
            target: 0.0,
            measurement: 0.0,
            previous_error: 0.0,
            accumulated_error: 0.0,
            last_output: config.initial_output,
            config,
        })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_measurement(&mut self, measurement: f64) {
        self.measurement = measurement;
    }

    pub fn measurement(&self) -> f64 {
        self.measurement
    }

    /// Override the output the next step builds on
    pub fn set_last_output(&mut self, output: f64) {
        self.last_output = output;
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    pub fn limits(&self) -> (u16, u16) {
        (self.config.lower_limit, self.config.upper_limit)
    }

    pub fn set_limits(&mut self, lower: u16, upper: u16) -> NavigationResult<()> {
        let config = PidConfig {
            lower_limit: lower,
            upper_limit: upper,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_upper_limit(&mut self, upper: u16) -> NavigationResult<()> {
        self.set_limits(self.config.lower_limit, upper)
    }

    pub fn set_lower_limit(&mut self, lower: u16) -> NavigationResult<()> {
        self.set_limits(lower, self.config.upper_limit)
    }

    /// Clear the error history and restart from the initial output
    pub fn reset(&mut self) {
        self.previous_error = 0.0;
        self.accumulated_error = 0.0;
        self.last_output = self.config.initial_output;
    }

    /// One PID step.
    ///
    /// The error of a step that pushes an already saturated output further
    /// is not accumulated.
    pub fn compute(&mut self) -> u16 {
        let lower = f64::from(self.config.lower_limit);
        let upper = f64::from(self.config.upper_limit);

        let mut error = self.target - self.measurement;
        let output = self.last_output
            + self.config.kp * error
            + self.config.ki * self.accumulated_error
            + self.config.kd * self.previous_error;
        self.previous_error = error;

        if (output >= upper && error > 0.0) || (output <= lower && error < 0.0) {
            error = 0.0;
        }
        self.accumulated_error += error;

        // NaN inputs leave the output at the lower limit
        let clamped = if output.is_nan() { lower } else { output.clamp(lower, upper) };
        self.last_output = clamped;
        clamped.round() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_output_tracks_error() {
        let mut pid = PidController::new(PidConfig::altitude()).unwrap();
        pid.set_target(100.0);
        pid.set_measurement(0.0);

        // 1000 + 0.02 * 100
        assert_eq!(pid.compute(), 1002);
        // 1002 + 2 + 0.005 * 100 + 0.01 * 100
        assert_eq!(pid.compute(), 1006);
        assert_relative_eq!(pid.last_output(), 1005.5);
    }

    #[test]
    fn test_output_within_limits() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pid = PidController::new(PidConfig::yaw()).unwrap();
        for _ in 0..1000 {
            pid.set_target(rng.gen_range(-1.0e6..1.0e6));
            pid.set_measurement(rng.gen_range(-1.0e6..1.0e6));
            let output = pid.compute();
            assert!((1400..=1600).contains(&output));
        }
    }

    #[test]
    fn test_runaway_error_is_clamped() {
        let mut pid = PidController::new(PidConfig::altitude()).unwrap();
        pid.set_target(1.0e9);
        for _ in 0..100 {
            assert!(pid.compute() <= 1600);
        }
        pid.set_target(-1.0e9);
        for _ in 0..100 {
            assert!(pid.compute() >= 1000);
        }
    }

    #[test]
    fn test_saturated_error_not_accumulated() {
        let config = PidConfig {
            kp: 1.0,
            ki: 1.0,
            kd: 0.0,
            lower_limit: 0,
            upper_limit: 10,
            initial_output: 0.0,
        };
        let mut pid = PidController::new(config).unwrap();
        pid.set_target(100.0);
        assert_eq!(pid.compute(), 10);
        assert_eq!(pid.compute(), 10);

        // Once the error flips the output can leave the limit immediately
        pid.set_target(-100.0);
        assert_eq!(pid.compute(), 0);
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let mut pid = PidController::new(PidConfig::yaw()).unwrap();
        assert!(pid.set_limits(1600, 1400).is_err());
        assert!(pid.set_upper_limit(1300).is_err());
        assert_eq!(pid.limits(), (1400, 1600));
        pid.set_lower_limit(1450).unwrap();
        assert_eq!(pid.limits(), (1450, 1600));
    }

    #[test]
    fn test_reset() {
        let mut pid = PidController::new(PidConfig::yaw()).unwrap();
        pid.set_target(50.0);
        pid.compute();
        pid.reset();
        assert_relative_eq!(pid.last_output(), 1500.0);
    }
}
