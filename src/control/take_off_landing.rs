//! Take-off and landing: an altitude hold whose target jumps to the cruise
//! altitude on the first request and ramps down while landing

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

use crate::common::{ChannelController, FeedbackValue, NavigationError, NavigationResult};
use crate::control::hold::AltitudeHold;
use crate::control::pid::PidConfig;

// Minimum time between two landing target adjustments
const LANDING_STEP_INTERVAL: Duration = Duration::from_secs(1);
// Altitude dropped per landing step
const LANDING_STEP: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeOffLandingConfig {
    pub pid: PidConfig,
    /// Altitude targeted after take-off
    pub max_altitude: f64,
    /// Value sent on the arming channel
    pub arm_value: u16,
}

impl Default for TakeOffLandingConfig {
    fn default() -> Self {
        Self {
            pid: PidConfig::take_off(),
            max_altitude: 80.0,
            arm_value: 2000,
        }
    }
}

impl TakeOffLandingConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        self.pid.validate()?;
        if !(self.max_altitude > 0.0) {
            return Err(NavigationError::InvalidParameter("max_altitude must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Drives `[throttle, arm]`
#[derive(Debug, Clone)]
pub struct TakeOffLanding {
    hold: AltitudeHold,
    config: TakeOffLandingConfig,
    taking_off: bool,
    landing: bool,
    altitude: f64,
    last_adjustment: Instant,
}

impl TakeOffLanding {
    pub fn new(config: TakeOffLandingConfig) -> NavigationResult<Self> {
        config.validate()?;
        Ok(TakeOffLanding {
            hold: AltitudeHold::new(config.pid.clone())?,
            config,
            taking_off: true,
            landing: false,
            altitude: 0.0,
            last_adjustment: Instant::now(),
        })
    }

    /// Target the cruise altitude
    pub fn take_off(&mut self) {
        info!(altitude = self.config.max_altitude, "taking off");
        self.hold.set_target(self.config.max_altitude);
        self.taking_off = false;
    }

    pub fn set_landing(&mut self, landing: bool) {
        self.landing = landing;
    }

    pub fn is_landing(&self) -> bool {
        self.landing
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn target(&self) -> f64 {
        self.hold.pid().target()
    }

    /// Lower the target one step below the measured altitude once strictly
    /// more than an interval has passed, never below the ground
    fn land(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_adjustment) > LANDING_STEP_INTERVAL {
            self.hold.set_target((self.altitude - LANDING_STEP).max(0.0));
            self.last_adjustment = now;
        }
    }

    /// Channel values at the given instant
    pub fn channels_at(&mut self, now: Instant) -> NavigationResult<Vec<u16>> {
        if self.taking_off {
            self.take_off();
        }
        if self.landing {
            self.land(now);
        }

        let mut channels = self.hold.channels()?;
        channels.push(self.config.arm_value);
        Ok(channels)
    }
}

impl ChannelController for TakeOffLanding {
    fn name(&self) -> &str {
        "take-off-landing"
    }

    fn channels(&mut self) -> NavigationResult<Vec<u16>> {
        self.channels_at(Instant::now())
    }

    fn is_available(&self) -> bool {
        self.hold.is_available()
    }

    fn set_availability(&mut self, available: bool) {
        self.hold.set_availability(available);
    }

    fn set_target(&mut self, target: f64) {
        self.hold.set_target(target);
    }

    fn set_measurement(&mut self, measurement: f64) {
        self.altitude = measurement;
        self.hold.set_measurement(measurement);
    }

    fn set_feedback(&mut self, feedback: &[FeedbackValue]) -> NavigationResult<()> {
        let altitude = feedback
            .first()
            .and_then(FeedbackValue::as_scalar)
            .ok_or_else(|| NavigationError::InvalidInput("take-off-landing expects an altitude".to_string()))?;
        self.set_measurement(altitude);
        Ok(())
    }
}
