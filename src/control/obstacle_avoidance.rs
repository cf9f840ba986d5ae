//! Obstacle avoidance controller
//!
//! Chains the particle filter and the VFH pipeline behind a yaw hold: every
//! feedback cycle localizes the agent, updates the histogram grid and turns
//! the resulting heading decision into a yaw target and a commanded speed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{
    ChannelController, FeedbackValue, HeadingDecision, NavigationError, NavigationResult, Point2D,
    Pose2D, RangeReading, wrap_degrees,
};
use crate::control::hold::YawHold;
use crate::control::pid::PidConfig;
use crate::localization::particle_filter::{ParticleFilter, ParticleFilterConfig};
use crate::mapping::histogram_grid::{HistogramGrid, HistogramGridConfig};
use crate::path_planning::vfh::{HeadingControl, HeadingControlConfig, PolarHistogram, PolarHistogramConfig};
use crate::utils::grid_map::OccupancyMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleAvoidanceConfig {
    pub particle_filter: ParticleFilterConfig,
    pub histogram_grid: HistogramGridConfig,
    pub polar_histogram: PolarHistogramConfig,
    pub heading_control: HeadingControlConfig,
    pub yaw: PidConfig,
}

impl Default for ObstacleAvoidanceConfig {
    fn default() -> Self {
        Self {
            particle_filter: ParticleFilterConfig::default(),
            histogram_grid: HistogramGridConfig::default(),
            polar_histogram: PolarHistogramConfig::default(),
            heading_control: HeadingControlConfig::default(),
            yaw: PidConfig::yaw(),
        }
    }
}

impl ObstacleAvoidanceConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        self.particle_filter.validate()?;
        self.histogram_grid.validate()?;
        self.polar_histogram.validate()?;
        self.heading_control.validate()?;
        self.yaw.validate()
    }
}

pub struct ObstacleAvoidance {
    particle_filter: ParticleFilter,
    heading_control: HeadingControl,
    yaw: YawHold,
    goal: Point2D,
    position: Pose2D,
    decision: HeadingDecision,
}

impl ObstacleAvoidance {
    /// Both the particle filter and the histogram grid start from `map`;
    /// only the grid's copy is updated afterwards.
    pub fn new(map: OccupancyMap, config: ObstacleAvoidanceConfig) -> NavigationResult<Self> {
        config.validate()?;

        let particle_filter = ParticleFilter::new(&map, config.particle_filter.clone())?;
        let grid = HistogramGrid::new(map, config.histogram_grid.clone())?;
        let polar = PolarHistogram::new(grid, config.polar_histogram.clone())?;
        let heading_control = HeadingControl::new(polar, config.heading_control.clone())?;
        let position = particle_filter.estimate();

        Ok(ObstacleAvoidance {
            particle_filter,
            heading_control,
            yaw: YawHold::new(config.yaw)?,
            goal: Point2D::origin(),
            position,
            decision: HeadingDecision::hold(),
        })
    }

    pub fn set_goal(&mut self, goal: Point2D) {
        self.goal = goal;
    }

    pub fn goal(&self) -> Point2D {
        self.goal
    }

    /// Last localized pose [cells]
    pub fn position(&self) -> Pose2D {
        self.position
    }

    pub fn speed(&self) -> i32 {
        self.decision.speed
    }

    pub fn last_decision(&self) -> HeadingDecision {
        self.decision
    }

    pub fn particle_filter(&self) -> &ParticleFilter {
        &self.particle_filter
    }

    pub fn heading_control(&self) -> &HeadingControl {
        &self.heading_control
    }

    pub fn yaw_hold(&self) -> &YawHold {
        &self.yaw
    }

    /// Propagate the particles with the motion executed since the last cycle
    /// (forward in cells, yaw in radians)
    pub fn apply_odometry(&mut self, forward: f64, yaw: f64) -> NavigationResult<()> {
        self.particle_filter.move_particles(forward, yaw)
    }

    /// One perception cycle: readings in world units, heading in degrees
    pub fn process(&mut self, readings: &[RangeReading], heading: f64) -> NavigationResult<HeadingDecision> {
        self.yaw.set_measurement(heading);

        let cell_size = self.heading_control.polar_histogram().grid().config().cell_size;
        let in_cells: Vec<RangeReading> = readings
            .iter()
            .map(|r| RangeReading::new(r.angle, r.distance / cell_size))
            .collect();
        self.position = self.particle_filter.update(&in_cells)?;

        let location = (self.position.x.floor() as i64, self.position.y.floor() as i64);
        let grid = self.heading_control.polar_histogram_mut().grid_mut();
        grid.set_sensor_measurements(readings.to_vec());
        grid.compute_map(heading, location)?;

        let decision = self
            .heading_control
            .compute_heading(heading, &self.goal, &self.position.position());
        self.yaw.set_target(wrap_degrees(heading + f64::from(decision.heading_delta)));
        self.decision = decision;

        debug!(
            x = self.position.x,
            y = self.position.y,
            heading_delta = decision.heading_delta,
            speed = decision.speed,
            "obstacle avoidance cycle"
        );
        Ok(decision)
    }
}

impl ChannelController for ObstacleAvoidance {
    fn name(&self) -> &str {
        "obstacle-avoidance"
    }

    fn channels(&mut self) -> NavigationResult<Vec<u16>> {
        self.yaw.channels()
    }

    fn is_available(&self) -> bool {
        self.yaw.is_available()
    }

    fn set_availability(&mut self, available: bool) {
        self.yaw.set_availability(available);
    }

    fn set_target(&mut self, target: f64) {
        self.yaw.set_target(target);
    }

    fn set_measurement(&mut self, measurement: f64) {
        self.yaw.set_measurement(measurement);
    }

    /// Expects `[Ranges, Attitude]`
    fn set_feedback(&mut self, feedback: &[FeedbackValue]) -> NavigationResult<()> {
        let readings = feedback
            .first()
            .and_then(FeedbackValue::as_ranges)
            .ok_or_else(|| NavigationError::InvalidInput("obstacle-avoidance expects range readings".to_string()))?;
        let attitude = feedback
            .get(1)
            .and_then(FeedbackValue::as_attitude)
            .ok_or_else(|| NavigationError::InvalidInput("obstacle-avoidance expects an attitude".to_string()))?;

        self.process(readings, attitude.heading).map(|_| ())
    }
}
