//! Particle Filter localization on a static occupancy map
//!
//! Every free cell is crossed with a uniform heading discretization to form
//! the initial population. Each control tick runs
//! Predict (`move_particles`) -> Measure (`expected_measurements`) ->
//! Reweight (`compute_probabilities`) -> Resample (`resample`).
//!
//! All distances are in map cell units.

use itertools::iproduct;
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use crate::common::{
    NavigationError, NavigationResult, Point2D, Pose2D, RangeReading, Segment2D, StateEstimator,
};
use crate::utils::geometry;
use crate::utils::grid_map::OccupancyMap;

// Keeps clamped coordinates inside the half-open world interval
const BOUNDARY_MARGIN: f64 = 1e-9;

/// Configuration for the particle filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    /// Standard deviation of the heading noise [rad]
    pub turn_noise: f64,
    /// Standard deviation of the forward displacement noise [cells]
    pub forward_noise: f64,
    /// Standard deviation of the range sensors [cells]
    pub sense_noise: f64,
    /// Number of heading sectors per free cell
    pub heading_coverage: usize,
    /// Default share of the population drawn by `resample`
    pub resample_fraction: f64,
    /// Ray length used by the sensor model; the map diagonal when unset
    pub max_range: Option<f64>,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ParticleFilterConfig {
    fn default() -> Self {
        Self {
            turn_noise: 0.02,
            forward_noise: 0.02,
            sense_noise: 1.0,
            heading_coverage: 12,
            resample_fraction: 0.25,
            max_range: None,
            seed: None,
        }
    }
}

impl ParticleFilterConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        let noises = [
            ("turn_noise", self.turn_noise),
            ("forward_noise", self.forward_noise),
        ];
        for (name, value) in noises.iter() {
            if !value.is_finite() || *value < 0.0 {
                return Err(NavigationError::InvalidParameter(format!("{} must be >= 0", name)));
            }
        }
        if !self.sense_noise.is_finite() || self.sense_noise <= 0.0 {
            return Err(NavigationError::InvalidParameter("sense_noise must be > 0".to_string()));
        }
        if self.heading_coverage == 0 {
            return Err(NavigationError::InvalidParameter("heading_coverage must be >= 1".to_string()));
        }
        if !(self.resample_fraction > 0.0 && self.resample_fraction <= 1.0) {
            return Err(NavigationError::InvalidParameter(
                "resample_fraction must be in (0, 1]".to_string(),
            ));
        }
        if let Some(range) = self.max_range {
            if !(range > 0.0) {
                return Err(NavigationError::InvalidParameter("max_range must be > 0".to_string()));
            }
        }
        Ok(())
    }
}

/// One pose hypothesis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Particle {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Particle { x, y, yaw }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.yaw)
    }
}

/// Odometry input for the prediction step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PFControl {
    /// Forward displacement [cells], must be >= 0
    pub forward: f64,
    /// Heading change [rad]
    pub yaw: f64,
}

impl PFControl {
    pub fn new(forward: f64, yaw: f64) -> Self {
        Self { forward, yaw }
    }
}

/// Monte Carlo localization over a static occupancy map
pub struct ParticleFilter {
    particles: Vec<Particle>,
    weights: Vec<f64>,
    segments: Vec<Segment2D>,
    world_size: (f64, f64),
    free_cells: usize,
    max_range: f64,
    estimate: Option<Pose2D>,
    config: ParticleFilterConfig,
    rng: StdRng,
}

impl ParticleFilter {
    /// Create a filter whose obstacle set is derived from the map
    pub fn new(map: &OccupancyMap, config: ParticleFilterConfig) -> NavigationResult<Self> {
        let segments = map.obstacle_segments();
        Self::with_segments(map, segments, config)
    }

    /// Create a filter with an explicit obstacle segment set
    pub fn with_segments(
        map: &OccupancyMap,
        segments: Vec<Segment2D>,
        config: ParticleFilterConfig,
    ) -> NavigationResult<Self> {
        config.validate()?;

        let particles = Self::generate_particles(map, config.heading_coverage);
        if particles.is_empty() {
            return Err(NavigationError::InvalidInput("map has no free cell".to_string()));
        }

        let (rows, cols) = map.shape();
        let world_size = (rows as f64, cols as f64);
        let max_range = config
            .max_range
            .unwrap_or_else(|| (world_size.0.powi(2) + world_size.1.powi(2)).sqrt());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let n = particles.len();

        Ok(ParticleFilter {
            particles,
            weights: vec![1.0 / n as f64; n],
            segments,
            world_size,
            free_cells: map.free_cell_count(),
            max_range,
            estimate: None,
            config,
            rng,
        })
    }

    /// Uniform heading grid in (-pi, pi]; -pi and pi never both appear
    pub fn heading_grid(heading_coverage: usize) -> Vec<f64> {
        (0..heading_coverage)
            .map(|i| -PI + 2.0 * PI * (i + 1) as f64 / heading_coverage as f64)
            .collect()
    }

    /// Every free cell centre crossed with every heading sector
    pub fn generate_particles(map: &OccupancyMap, heading_coverage: usize) -> Vec<Particle> {
        let headings = Self::heading_grid(heading_coverage);
        iproduct!(map.free_cells(), headings)
            .map(|((r, c), yaw)| Particle::new(r as f64 + 0.5, c as f64 + 0.5, yaw))
            .collect()
    }

    /// (free cells, heading sectors)
    pub fn particle_number(&self) -> (usize, usize) {
        (self.free_cells, self.config.heading_coverage)
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn positions(&self) -> Vec<Point2D> {
        self.particles.iter().map(Particle::position).collect()
    }

    pub fn orientations(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.yaw).collect()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn segments(&self) -> &[Segment2D] {
        &self.segments
    }

    pub fn config(&self) -> &ParticleFilterConfig {
        &self.config
    }

    pub fn world_size(&self) -> (f64, f64) {
        self.world_size
    }

    /// Motion update with per-particle noise.
    ///
    /// Headings advance by `yaw + N(0, turn_noise)`, positions by
    /// `forward + N(0, forward_noise)` along the post-turn heading. Coordinates
    /// leaving the world are snapped to its boundary.
    pub fn move_particles(&mut self, forward: f64, yaw: f64) -> NavigationResult<()> {
        if !(forward >= 0.0) {
            return Err(NavigationError::InvalidInput(format!(
                "forward motion must be >= 0, got {}",
                forward
            )));
        }

        let turn = normal(self.config.turn_noise)?;
        let advance = normal(self.config.forward_noise)?;
        let (width, height) = self.world_size;

        for particle in &mut self.particles {
            particle.yaw += yaw + turn.sample(&mut self.rng);
            let distance = forward + advance.sample(&mut self.rng);
            particle.x = constrain_to_world(particle.x + particle.yaw.cos() * distance, width);
            particle.y = constrain_to_world(particle.y + particle.yaw.sin() * distance, height);
        }

        Ok(())
    }

    /// Distances each particle would measure along the given sensor angles
    /// (degrees, relative to the particle heading).
    ///
    /// Returns a particles x sensors matrix holding the nearest intersection
    /// along each ray. A ray that hits nothing yields the zero vector, whose
    /// distance from the particle is the norm of the particle position.
    pub fn expected_measurements(&self, sensor_angles: &[f64]) -> DMatrix<f64> {
        let mut measurements = DMatrix::zeros(self.particles.len(), sensor_angles.len());

        for (i, particle) in self.particles.iter().enumerate() {
            let origin = [particle.position()];
            let angles = [sensor_angles
                .iter()
                .map(|a| particle.yaw + a.to_radians())
                .collect::<Vec<f64>>()];
            let rays = geometry::get_rays(&origin, &angles, self.max_range);
            let intersections = geometry::seg_intersections(&origin, &rays, &self.segments);

            for (j, hits) in intersections.iter().enumerate() {
                let nearest = hits
                    .iter()
                    .filter(|hit| !hit.is_origin())
                    .map(|hit| OrderedFloat(origin[0].distance(hit)))
                    .min();
                measurements[(i, j)] = match nearest {
                    Some(d) => d.into_inner(),
                    None => origin[0].norm(),
                };
            }
        }

        measurements
    }

    /// Normalized Gaussian density of `x` around `mu`
    pub fn gaussian_likelihood(mu: f64, sigma: f64, x: f64) -> f64 {
        (-(mu - x).powi(2) / (2.0 * sigma.powi(2))).exp() / (sigma * (2.0 * PI).sqrt())
    }

    /// Weight of every particle given the agent's real readings.
    ///
    /// Each particle's weight is the product of its per-sensor likelihoods;
    /// the vector is normalized to sum to 1.
    pub fn compute_probabilities(
        &self,
        particle_measurements: &DMatrix<f64>,
        agent_measurements: &[f64],
    ) -> NavigationResult<DVector<f64>> {
        if particle_measurements.ncols() != agent_measurements.len() {
            return Err(NavigationError::InvalidInput(format!(
                "{} predicted sensors but {} readings",
                particle_measurements.ncols(),
                agent_measurements.len()
            )));
        }

        let sigma = self.config.sense_noise;
        let probabilities = DVector::from_iterator(
            particle_measurements.nrows(),
            particle_measurements.row_iter().map(|row| {
                row.iter()
                    .zip(agent_measurements.iter())
                    .map(|(mu, x)| Self::gaussian_likelihood(*mu, sigma, *x))
                    .product::<f64>()
            }),
        );

        let total = probabilities.sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(NavigationError::InvalidInput(
                "no viable particle: probabilities sum to zero".to_string(),
            ));
        }

        Ok(probabilities / total)
    }

    /// Draw `amount` particle indices with replacement according to
    /// `probabilities`. Defaults to `resample_fraction` of the population.
    pub fn resample(&mut self, probabilities: &[f64], amount: Option<usize>) -> NavigationResult<Vec<usize>> {
        if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(NavigationError::InvalidInput(
                "probabilities must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = probabilities.iter().sum();
        if !(total > 0.0) {
            return Err(NavigationError::InvalidInput("probabilities sum to zero".to_string()));
        }

        let amount = amount
            .unwrap_or_else(|| (probabilities.len() as f64 * self.config.resample_fraction) as usize);
        let distribution = WeightedIndex::new(probabilities)
            .map_err(|e| NavigationError::InvalidInput(e.to_string()))?;

        Ok((0..amount).map(|_| distribution.sample(&mut self.rng)).collect())
    }

    /// Measure, reweight and resample against a set of readings expressed in
    /// map cell units. The population is redrawn at constant size and the
    /// most likely pose before resampling is returned.
    pub fn update(&mut self, readings: &[RangeReading]) -> NavigationResult<Pose2D> {
        if readings.is_empty() {
            return Err(NavigationError::InvalidInput("no range reading supplied".to_string()));
        }

        let angles: Vec<f64> = readings.iter().map(|r| r.angle).collect();
        let distances: Vec<f64> = readings.iter().map(|r| r.distance).collect();

        let predicted = self.expected_measurements(&angles);
        let probabilities = self.compute_probabilities(&predicted, &distances)?;

        let best = probabilities.argmax().0;
        let estimate = self.particles[best].pose();

        let population = self.particles.len();
        let indices = self.resample(probabilities.as_slice(), Some(population))?;
        self.particles = indices.iter().map(|&i| self.particles[i]).collect();
        self.weights = vec![1.0 / population as f64; population];
        self.estimate = Some(estimate);

        debug!(
            x = estimate.x,
            y = estimate.y,
            yaw = estimate.yaw,
            "particle filter estimate"
        );

        Ok(estimate)
    }

    /// Last maximum-a-posteriori pose, or the population centroid before the
    /// first update
    pub fn estimate(&self) -> Pose2D {
        if let Some(estimate) = self.estimate {
            return estimate;
        }

        let n = self.particles.len() as f64;
        let (sx, sy, ss, sc) = self.particles.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, p| {
            (acc.0 + p.x, acc.1 + p.y, acc.2 + p.yaw.sin(), acc.3 + p.yaw.cos())
        });
        Pose2D::new(sx / n, sy / n, ss.atan2(sc))
    }
}

impl StateEstimator for ParticleFilter {
    type State = Pose2D;
    type Measurement = Vec<RangeReading>;
    type Control = PFControl;

    fn predict(&mut self, control: &Self::Control) -> NavigationResult<()> {
        self.move_particles(control.forward, control.yaw)
    }

    fn update(&mut self, measurement: &Self::Measurement) -> NavigationResult<()> {
        ParticleFilter::update(self, measurement).map(|_| ())
    }

    fn get_state(&self) -> Self::State {
        self.estimate()
    }
}

fn normal(std_dev: f64) -> NavigationResult<Normal<f64>> {
    Normal::new(0.0, std_dev).map_err(|e| NavigationError::NumericalError(e.to_string()))
}

/// Snap a coordinate into [0, world_size)
fn constrain_to_world(value: f64, world_size: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else if value >= world_size {
        world_size - BOUNDARY_MARGIN
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn identity_filter() -> ParticleFilter {
        let map = OccupancyMap::from_matrix(DMatrix::identity(10, 10));
        let config = ParticleFilterConfig {
            turn_noise: 0.02,
            forward_noise: 0.02,
            sense_noise: 0.5,
            heading_coverage: 2,
            seed: Some(7),
            ..Default::default()
        };
        ParticleFilter::new(&map, config).unwrap()
    }

    fn room() -> OccupancyMap {
        let mut grid = DMatrix::zeros(12, 12);
        for i in 0..12 {
            grid[(0, i)] = 1.0;
            grid[(11, i)] = 1.0;
            grid[(i, 0)] = 1.0;
            grid[(i, 11)] = 1.0;
        }
        grid[(5, 5)] = 1.0;
        grid[(5, 6)] = 1.0;
        OccupancyMap::from_matrix(grid)
    }

    #[test]
    fn test_particle_number() {
        let pf = identity_filter();
        assert_eq!(pf.particle_number(), (90, 2));
        assert_eq!(pf.particle_count(), 180);
        assert_eq!(pf.weights().len(), 180);
    }

    #[test]
    fn test_generate_particles_cover_free_cells() {
        let map = OccupancyMap::from_matrix(DMatrix::identity(10, 10));
        let particles = ParticleFilter::generate_particles(&map, 2);
        assert_eq!(particles.len(), (100 - 10) * 2);
        assert!(particles
            .iter()
            .all(|p| map.is_free(p.x.floor() as usize, p.y.floor() as usize)));
    }

    #[test]
    fn test_heading_grid_is_uniform() {
        let headings = ParticleFilter::heading_grid(4);
        assert_eq!(headings.len(), 4);
        assert_relative_eq!(headings[0], -PI / 2.0);
        assert_relative_eq!(headings[3], PI);
        for pair in headings.windows(2) {
            assert_relative_eq!(pair[1] - pair[0], PI / 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_move_rejects_negative_forward() {
        let mut pf = identity_filter();
        assert!(matches!(
            pf.move_particles(-1.0, 0.0),
            Err(NavigationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_move_clamps_to_world() {
        let mut pf = identity_filter();
        pf.move_particles(50.0, 0.0).unwrap();
        let (w, h) = pf.world_size();
        for p in pf.particles() {
            assert!(p.x >= 0.0 && p.x < w);
            assert!(p.y >= 0.0 && p.y < h);
        }
    }

    #[test]
    fn test_move_without_noise_is_deterministic() {
        let map = OccupancyMap::from_matrix(DMatrix::zeros(20, 20));
        let config = ParticleFilterConfig {
            turn_noise: 0.0,
            forward_noise: 0.0,
            heading_coverage: 4,
            seed: Some(1),
            ..Default::default()
        };
        let mut pf = ParticleFilter::new(&map, config).unwrap();
        let before = pf.particles()[0];
        pf.move_particles(1.0, 0.0).unwrap();
        let after = pf.particles()[0];

        assert_abs_diff_eq!(after.yaw, before.yaw, epsilon = 1e-12);
        assert_abs_diff_eq!(after.x, (before.x + before.yaw.cos()).max(0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_expected_measurements_in_room() {
        let map = room();
        let config = ParticleFilterConfig {
            heading_coverage: 4,
            seed: Some(3),
            ..Default::default()
        };
        let pf = ParticleFilter::new(&map, config).unwrap();
        let measurements = pf.expected_measurements(&[0.0, 90.0]);

        assert_eq!(measurements.shape(), (pf.particle_count(), 2));

        // Particle at the centre of cell (1, 1) heading +x (yaw = 0 is the 2nd sector of 4)
        let idx = pf
            .particles()
            .iter()
            .position(|p| p.x == 1.5 && p.y == 1.5 && p.yaw.abs() < 1e-12)
            .unwrap();
        // Forward hits the inner wall face at x = 11
        assert_abs_diff_eq!(measurements[(idx, 0)], 9.5, epsilon = 1e-9);
        // Left (+y) hits the wall face at y = 11
        assert_abs_diff_eq!(measurements[(idx, 1)], 9.5, epsilon = 1e-9);
    }

    #[test]
    fn test_compute_probabilities_sum_to_one() {
        let pf = identity_filter();
        let predicted = pf.expected_measurements(&[-90.0, 0.0, 90.0]);
        let probabilities = pf.compute_probabilities(&predicted, &[2.0, 3.0, 2.5]).unwrap();

        assert_eq!(probabilities.len(), pf.particle_count());
        assert_relative_eq!(probabilities.sum(), 1.0, epsilon = 1e-9);
        assert!(probabilities.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn test_compute_probabilities_rejects_degenerate_set() {
        let pf = identity_filter();
        let predicted = DMatrix::from_element(pf.particle_count(), 1, 0.0);
        let result = pf.compute_probabilities(&predicted, &[1.0e6]);
        assert!(matches!(result, Err(NavigationError::InvalidInput(_))));

        let result = pf.compute_probabilities(&predicted, &[1.0, 2.0]);
        assert!(matches!(result, Err(NavigationError::InvalidInput(_))));
    }

    #[test]
    fn test_resample_amount_and_range() {
        let mut pf = identity_filter();
        let weights = vec![0.1, 0.2, 0.3, 0.4];
        let indices = pf.resample(&weights, Some(50)).unwrap();
        assert_eq!(indices.len(), 50);
        assert!(indices.iter().all(|&i| i < weights.len()));

        let uniform = vec![1.0 / 180.0; 180];
        assert_eq!(pf.resample(&uniform, None).unwrap().len(), 45);
    }

    #[test]
    fn test_resample_favours_heavy_particle() {
        let mut pf = identity_filter();
        let indices = pf.resample(&[0.0, 1.0, 0.0], Some(20)).unwrap();
        assert!(indices.iter().all(|&i| i == 1));
    }

    #[test]
    fn test_resample_rejects_zero_weights() {
        let mut pf = identity_filter();
        assert!(matches!(
            pf.resample(&[0.0, 0.0, 0.0], None),
            Err(NavigationError::InvalidInput(_))
        ));
        assert!(pf.resample(&[0.5, f64::NAN], None).is_err());
    }

    #[test]
    fn test_update_keeps_population_and_localizes() {
        let map = room();
        let config = ParticleFilterConfig {
            heading_coverage: 4,
            sense_noise: 0.3,
            seed: Some(11),
            ..Default::default()
        };
        let mut pf = ParticleFilter::new(&map, config).unwrap();
        let population = pf.particle_count();

        // Agent at cell (2, 5) centre heading +x, facing the inner block
        let readings = vec![
            RangeReading::new(0.0, 2.5),
            RangeReading::new(90.0, 5.5),
            RangeReading::new(180.0, 1.5),
            RangeReading::new(-90.0, 4.5),
        ];
        let estimate = pf.update(&readings).unwrap();
        assert_eq!(pf.particle_count(), population);

        // The room has symmetric poses, so check the estimate explains the readings
        let origin = [estimate.position()];
        let angles = [readings
            .iter()
            .map(|r| estimate.yaw + r.angle.to_radians())
            .collect::<Vec<f64>>()];
        let rays = geometry::get_rays(&origin, &angles, 20.0);
        let hits = geometry::seg_intersections(&origin, &rays, pf.segments());
        for (row, reading) in hits.iter().zip(readings.iter()) {
            let nearest = row
                .iter()
                .filter(|p| !p.is_origin())
                .map(|p| origin[0].distance(p))
                .fold(f64::INFINITY, f64::min);
            assert_abs_diff_eq!(nearest, reading.distance, epsilon = 1e-6);
        }
        assert_eq!(pf.get_state(), estimate);
    }
}
