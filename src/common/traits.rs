//! Common traits defining interfaces between the navigation components
//! and their collaborators

use crate::common::error::NavigationResult;
use crate::common::types::*;

/// Trait for state estimation algorithms (Particle Filter, ...)
pub trait StateEstimator {
    /// State type used by this estimator
    type State;
    /// Measurement type used by this estimator
    type Measurement;
    /// Control input type
    type Control;

    /// Prediction step
    fn predict(&mut self, control: &Self::Control) -> NavigationResult<()>;

    /// Update step with measurement
    fn update(&mut self, measurement: &Self::Measurement) -> NavigationResult<()>;

    /// Get current state estimate
    fn get_state(&self) -> Self::State;
}

/// A controller that can be arbitrated into the channel vector.
///
/// Implementors are shared as `Arc<Mutex<dyn ChannelController>>`; the mutex
/// is the controller's own lock and guards target, measurement and
/// availability.
pub trait ChannelController: Send {
    /// Human readable name, used in logs
    fn name(&self) -> &str;

    /// Compute the raw values for the channels this controller drives
    fn channels(&mut self) -> NavigationResult<Vec<u16>>;

    /// Whether the controller currently has values to contribute
    fn is_available(&self) -> bool;

    fn set_availability(&mut self, available: bool);

    fn set_target(&mut self, target: f64);

    fn set_measurement(&mut self, measurement: f64);

    /// Receive the values read from the registered feedback sources.
    ///
    /// The default takes the first scalar as the measurement.
    fn set_feedback(&mut self, feedback: &[FeedbackValue]) -> NavigationResult<()> {
        match feedback.first().and_then(FeedbackValue::as_scalar) {
            Some(value) => {
                self.set_measurement(value);
                Ok(())
            }
            None => Err(crate::common::NavigationError::InvalidInput(format!(
                "{} expects a scalar feedback value",
                self.name()
            ))),
        }
    }
}

/// Read-only producer of feedback data (altitude sensor, attitude link, ...)
pub trait FeedbackSource: Send + Sync {
    fn read(&self) -> NavigationResult<FeedbackValue>;
}

/// Consumer of the arbitrated channel vector (the flight-controller link)
pub trait FlightLink {
    fn is_open(&self) -> bool;

    fn send_channels(&mut self, channels: &ChannelVector) -> NavigationResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyController {
        measurement: f64,
    }

    impl ChannelController for DummyController {
        fn name(&self) -> &str {
            "dummy"
        }

        fn channels(&mut self) -> NavigationResult<Vec<u16>> {
            Ok(vec![self.measurement as u16])
        }

        fn is_available(&self) -> bool {
            true
        }

        fn set_availability(&mut self, _available: bool) {}

        fn set_target(&mut self, _target: f64) {}

        fn set_measurement(&mut self, measurement: f64) {
            self.measurement = measurement;
        }
    }

    #[test]
    fn test_default_feedback_sets_measurement() {
        let mut controller = DummyController { measurement: 0.0 };
        controller.set_feedback(&[FeedbackValue::Scalar(1200.0)]).unwrap();
        assert_eq!(controller.channels().unwrap(), vec![1200]);
    }

    #[test]
    fn test_default_feedback_rejects_non_scalar() {
        let mut controller = DummyController { measurement: 0.0 };
        let result = controller.set_feedback(&[FeedbackValue::Attitude(Attitude::default())]);
        assert!(result.is_err());
    }
}
