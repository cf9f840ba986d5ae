//! Heading control: picks a safe heading and speed from the smoothed polar
//! obstacle density (Vector Field Histogram, stage 3)

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::{HeadingDecision, NavigationError, NavigationResult, Point2D};
use crate::path_planning::vfh::polar_histogram::PolarHistogram;

/// Configuration for the heading selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingControlConfig {
    /// Smoothed density at or below which a sector is traversable
    pub safety_threshold: f64,
    /// Valleys wider than this many sectors are clipped
    pub wide_valley_threshold: usize,
    /// Density at which the speed drops to its floor
    pub hm: f64,
    pub max_speed: f64,
}

impl Default for HeadingControlConfig {
    fn default() -> Self {
        Self {
            safety_threshold: 2.0,
            wide_valley_threshold: 18,
            hm: 8.0,
            max_speed: 8.0,
        }
    }
}

impl HeadingControlConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        if !(self.safety_threshold >= 0.0) {
            return Err(NavigationError::InvalidParameter("safety_threshold must be >= 0".to_string()));
        }
        if !(self.hm > 0.0) {
            return Err(NavigationError::InvalidParameter("hm must be > 0".to_string()));
        }
        if !(self.max_speed >= 1.0) {
            return Err(NavigationError::InvalidParameter("max_speed must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Contiguous run of traversable sectors, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valley {
    pub start: usize,
    pub end: usize,
}

impl Valley {
    pub fn new(start: usize, end: usize) -> Self {
        Valley { start, end }
    }

    pub fn contains(&self, sector: usize) -> bool {
        self.start <= sector && sector <= self.end
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn midpoint(&self) -> usize {
        (self.start + self.end) / 2
    }
}

fn circular_distance(a: usize, b: usize, n: usize) -> usize {
    let d = if a > b { a - b } else { b - a };
    d.min(n - d)
}

pub struct HeadingControl {
    config: HeadingControlConfig,
    polar: PolarHistogram,
    valleys: Vec<Valley>,
}

impl HeadingControl {
    pub fn new(polar: PolarHistogram, config: HeadingControlConfig) -> NavigationResult<Self> {
        config.validate()?;
        Ok(HeadingControl {
            config,
            polar,
            valleys: Vec::new(),
        })
    }

    pub fn config(&self) -> &HeadingControlConfig {
        &self.config
    }

    pub fn polar_histogram(&self) -> &PolarHistogram {
        &self.polar
    }

    pub fn polar_histogram_mut(&mut self) -> &mut PolarHistogram {
        &mut self.polar
    }

    /// Valleys found by the last heading computation
    pub fn valleys(&self) -> &[Valley] {
        &self.valleys
    }

    /// Threshold the smoothed POD and extract runs of safe sectors.
    ///
    /// Edge detection is linear: a valley touching sector 0 and another
    /// touching sector n-1 stay separate.
    pub fn compute_candidate_valleys(&self, smoothed_pod: &DVector<f64>) -> Vec<Valley> {
        let mut padded = Vec::with_capacity(smoothed_pod.len() + 2);
        padded.push(false);
        padded.extend(smoothed_pod.iter().map(|d| *d <= self.config.safety_threshold));
        padded.push(false);

        let mut valleys = Vec::new();
        let mut start = 0;
        for (i, edge) in padded.windows(2).enumerate() {
            match (edge[0], edge[1]) {
                (false, true) => start = i,
                (true, false) => valleys.push(Valley::new(start, i - 1)),
                _ => {}
            }
        }
        valleys
    }

    /// Sector holding the bearing from `location` to `target`
    pub fn target_sector(&self, target: &Point2D, location: &Point2D) -> usize {
        let alpha = self.polar.config().alpha;
        let n = self.polar.sectors();
        let bearing = (target.y - location.y)
            .atan2(target.x - location.x)
            .to_degrees()
            .rem_euclid(360.0);
        ((bearing / alpha + 1e-9).floor() as usize).min(n - 1)
    }

    /// Sector to steer to when the target is not inside a valley
    fn nearest_valley_sector(&self, valleys: &[Valley], target: usize) -> Option<usize> {
        let n = self.polar.sectors();
        let wide = self.config.wide_valley_threshold;

        let (valley, near_start) = valleys
            .iter()
            .flat_map(|v| vec![(v, true), (v, false)])
            .min_by_key(|(v, near_start)| {
                let edge = if *near_start { v.start } else { v.end };
                circular_distance(edge, target, n)
            })?;

        let steer = if valley.width() > wide {
            if near_start {
                Valley::new(valley.start, (valley.start + wide).min(n - 1))
            } else {
                Valley::new(valley.end.saturating_sub(wide), valley.end)
            }
        } else {
            *valley
        };
        Some(steer.midpoint())
    }

    /// Heading decision from a caller supplied smoothed POD.
    ///
    /// `current_heading` is in degrees; `target` and `location` in map cells.
    /// A fully occluded histogram yields `HeadingDecision::hold()`.
    pub fn compute_heading_from_pod(
        &mut self,
        smoothed_pod: &DVector<f64>,
        current_heading: f64,
        target: &Point2D,
        location: &Point2D,
    ) -> HeadingDecision {
        let valleys = self.compute_candidate_valleys(smoothed_pod);
        let target_sector = self.target_sector(target, location);

        let theta = if valleys.iter().any(|v| v.contains(target_sector)) {
            Some(target_sector)
        } else {
            self.nearest_valley_sector(&valleys, target_sector)
        };
        self.valleys = valleys;

        let theta = match theta {
            Some(theta) => theta,
            None => {
                warn!("polar histogram fully occluded, holding position");
                return HeadingDecision::hold();
            }
        };

        let hm = self.config.hm;
        let density = smoothed_pod[theta].min(hm);
        let speed = (self.config.max_speed * (1.0 - density / hm)).max(1.0).round() as i32;

        let mut delta = (theta as f64 * self.polar.config().alpha - current_heading).rem_euclid(360.0);
        if delta > 180.0 {
            delta -= 360.0;
        }

        debug!(target_sector, theta, speed, delta, "heading decision");
        HeadingDecision::new(delta.round() as i32, speed)
    }

    /// Full pipeline on the readings currently held by the histogram grid
    pub fn compute_heading(&mut self, current_heading: f64, target: &Point2D, location: &Point2D) -> HeadingDecision {
        let pod = self.polar.compute_pod(current_heading);
        self.compute_heading_from_pod(&pod, current_heading, target, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RangeReading;
    use crate::mapping::histogram_grid::{HistogramGrid, HistogramGridConfig};
    use crate::path_planning::vfh::polar_histogram::PolarHistogramConfig;
    use crate::utils::grid_map::OccupancyMap;
    use nalgebra::DMatrix;

    fn heading_control() -> HeadingControl {
        let map = OccupancyMap::from_matrix(DMatrix::zeros(50, 50));
        let grid = HistogramGrid::new(map, HistogramGridConfig::default()).unwrap();
        let polar = PolarHistogram::new(grid, PolarHistogramConfig::default()).unwrap();
        HeadingControl::new(polar, HeadingControlConfig::default()).unwrap()
    }

    fn pod_with(blocked: &[usize]) -> DVector<f64> {
        let mut pod = DVector::zeros(72);
        for &s in blocked {
            pod[s] = 10.0;
        }
        pod
    }

    #[test]
    fn test_candidate_valleys() {
        let hc = heading_control();
        let pod = pod_with(&[0, 1, 10, 11, 12, 71]);
        let valleys = hc.compute_candidate_valleys(&pod);
        assert_eq!(valleys, vec![Valley::new(2, 9), Valley::new(13, 70)]);

        assert_eq!(hc.compute_candidate_valleys(&pod_with(&[])), vec![Valley::new(0, 71)]);
    }

    #[test]
    fn test_unobstructed_histogram_steers_at_target() {
        let mut hc = heading_control();
        let pod = DVector::zeros(72);
        let location = Point2D::new(10.0, 10.0);
        let target = Point2D::new(10.0, 20.0);

        let decision = hc.compute_heading_from_pod(&pod, 0.0, &target, &location);
        assert_eq!(hc.target_sector(&target, &location), 18);
        assert_eq!(decision, HeadingDecision::new(90, 8));
    }

    #[test]
    fn test_target_behind_folds_to_180() {
        let mut hc = heading_control();
        let decision = hc.compute_heading(0.0, &Point2D::new(3.0, 2.0), &Point2D::new(4.0, 2.0));
        assert_eq!(decision, HeadingDecision::new(180, 8));
    }

    #[test]
    fn test_delta_is_folded() {
        let mut hc = heading_control();
        let pod = DVector::zeros(72);
        // target at 270 deg, heading 10 deg: turn -100 rather than +260
        let decision = hc.compute_heading_from_pod(&pod, 10.0, &Point2D::new(5.0, 0.0), &Point2D::new(5.0, 5.0));
        assert_eq!(decision.heading_delta, -100);
    }

    #[test]
    fn test_blocked_target_steers_to_clipped_valley() {
        let mut hc = heading_control();
        // Target sector 18 blocked by sectors 10..=30, open 31..=71 and 0..=9
        let blocked: Vec<usize> = (10..=30).collect();
        let pod = pod_with(&blocked);
        let location = Point2D::new(10.0, 10.0);
        let target = Point2D::new(10.0, 20.0);

        let decision = hc.compute_heading_from_pod(&pod, 0.0, &target, &location);
        // Nearest edge is 9 (distance 9) vs 31 (distance 13); valley (0, 9) is narrow
        assert_eq!(decision.heading_delta, 20);
        assert_eq!(hc.valleys().len(), 2);

        // Only the far valley (31, 71) remains: clip to (31, 49) and steer to 40
        let blocked: Vec<usize> = (0..=30).collect();
        let decision = hc.compute_heading_from_pod(&pod_with(&blocked), 0.0, &target, &location);
        assert_eq!(decision.heading_delta, -160);
    }

    #[test]
    fn test_speed_drops_with_density() {
        let mut hc = heading_control();
        let mut pod = DVector::zeros(72);
        pod[18] = 2.0;
        let decision = hc.compute_heading_from_pod(&pod, 0.0, &Point2D::new(10.0, 20.0), &Point2D::new(10.0, 10.0));
        assert_eq!(decision.speed, 6);
    }

    #[test]
    fn test_fully_occluded_histogram_holds() {
        let mut hc = heading_control();
        let pod = DVector::from_element(72, 10.0);
        let decision = hc.compute_heading_from_pod(&pod, 45.0, &Point2D::new(1.0, 1.0), &Point2D::new(0.0, 0.0));
        assert_eq!(decision, HeadingDecision::hold());
        assert!(hc.valleys().is_empty());
    }

    #[test]
    fn test_obstacle_ahead_changes_heading() {
        let mut hc = heading_control();
        let readings = (-2..=2)
            .map(|k| RangeReading::new(k as f64 * 10.0, 40.0))
            .collect::<Vec<_>>();
        hc.polar_histogram_mut().grid_mut().set_sensor_measurements(readings);

        let location = Point2D::new(25.0, 25.0);
        let target = Point2D::new(45.0, 25.0);
        let decision = hc.compute_heading(0.0, &target, &location);

        assert_ne!(decision.heading_delta, 0);
        assert!(decision.speed >= 1);
    }
}
