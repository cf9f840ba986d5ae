// Priority arbitration of the flight controllers against a logging link.
//
// Take-off, roll and yaw holds run under a manual override; the remote input
// takes over for a few cycles, then the agent lands.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rust_autonav::common::{Attitude, ChannelVector, FeedbackSource, FeedbackValue, FlightLink};
use rust_autonav::control::{
    ControllerArbiter, ControllerRegistration, InclinationAxis, InclinationHold, ManualOverride, TakeOffLanding,
    YawHold,
};
use rust_autonav::{ChannelController, NavigationConfig, NavigationResult};

const THROTTLE: usize = 0;
const ROLL: usize = 1;
const YAW: usize = 3;
const ARM: usize = 4;

/// Altitude that climbs a little on every read
struct SimulatedAltimeter {
    altitude: Mutex<f64>,
}

impl FeedbackSource for SimulatedAltimeter {
    fn read(&self) -> NavigationResult<FeedbackValue> {
        let mut altitude = self.altitude.lock();
        *altitude += 2.5;
        Ok(FeedbackValue::Scalar(*altitude))
    }
}

struct SimulatedAttitude;

impl FeedbackSource for SimulatedAttitude {
    fn read(&self) -> NavigationResult<FeedbackValue> {
        Ok(FeedbackValue::Attitude(Attitude::new(1.5, -0.5, 12.0, 0.0)))
    }
}

struct Constant(f64);

impl FeedbackSource for Constant {
    fn read(&self) -> NavigationResult<FeedbackValue> {
        Ok(FeedbackValue::Scalar(self.0))
    }
}

/// Logs every channel vector instead of writing it to a serial port
struct LoggingLink {
    open: bool,
    sent: usize,
}

impl FlightLink for LoggingLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send_channels(&mut self, channels: &ChannelVector) -> NavigationResult<()> {
        self.sent += 1;
        info!(cycle = self.sent, channels = ?channels.values(), "channels sent");
        Ok(())
    }
}

fn main() -> NavigationResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => NavigationConfig::load(path)?,
        None => NavigationConfig::default(),
    };

    let take_off = Arc::new(Mutex::new(TakeOffLanding::new(config.take_off_landing.clone())?));
    let roll = Arc::new(Mutex::new(InclinationHold::new(
        config.inclination.clone(),
        InclinationAxis::Roll,
    )?));
    let yaw = Arc::new(Mutex::new(YawHold::new(config.obstacle_avoidance.yaw.clone())?));
    let manual = Arc::new(Mutex::new(ManualOverride::new()));

    take_off.lock().set_availability(true);
    roll.lock().set_availability(true);
    {
        let mut yaw = yaw.lock();
        yaw.set_target(0.0);
        yaw.set_availability(true);
    }

    let mut arbiter = ControllerArbiter::new().with_cycle_period(Duration::from_millis(20));
    arbiter.register(
        ControllerRegistration::new(1, take_off.clone(), vec![THROTTLE, ARM]).feedback_source(Arc::new(
            SimulatedAltimeter {
                altitude: Mutex::new(0.0),
            },
        )),
    )?;
    arbiter.register(
        ControllerRegistration::new(2, roll.clone(), vec![ROLL])
            .feedback_source(Arc::new(SimulatedAttitude))
            .feedback_source(Arc::new(Constant(0.0))),
    )?;
    arbiter.register(ControllerRegistration::new(3, yaw.clone(), vec![YAW]).feedback_source(Arc::new(SimulatedAttitude)))?;
    arbiter.register(ControllerRegistration::new(9, manual.clone(), vec![0, 1, 2, 3, 4]))?;

    let mut link = LoggingLink { open: true, sent: 0 };

    info!("autonomous climb");
    arbiter.run(&mut link, Some(5))?;

    info!("remote input received");
    manual.lock().set_input(&[1300.0, 1500.0, 1500.0, 1450.0, 2000.0])?;
    arbiter.run(&mut link, Some(3))?;

    manual.lock().disconnect();
    take_off.lock().set_landing(true);
    info!("landing");
    arbiter.run(&mut link, Some(5))?;

    let (altitude, target) = {
        let take_off = take_off.lock();
        (take_off.altitude(), take_off.target())
    };
    info!(cycles = link.sent, altitude, target, "done");
    Ok(())
}
