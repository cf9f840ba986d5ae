//! Control module
//!
//! PID-based channel controllers and the priority arbiter that merges their
//! outputs into the channel vector sent over the flight link.

pub mod arbitration;
pub mod hold;
pub mod manual_override;
pub mod obstacle_avoidance;
pub mod pid;
pub mod take_off_landing;

pub use arbitration::{
    ControllerArbiter, ControllerHandle, ControllerRegistration, FaultReporter, LockPolicy, LogFaultReporter,
};
pub use hold::{AltitudeHold, InclinationAxis, InclinationHold, YawHold};
pub use manual_override::ManualOverride;
pub use obstacle_avoidance::{ObstacleAvoidance, ObstacleAvoidanceConfig};
pub use pid::{PidConfig, PidController};
pub use take_off_landing::{TakeOffLanding, TakeOffLandingConfig};
