// Histogram Grid
// Local certainty window built from range readings around the agent and
// overlaid on the global occupancy map (Vector Field Histogram, stage 1)

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::common::{NavigationError, NavigationResult, RangeReading, RangeReadings};
use crate::utils::grid_map::OccupancyMap;

// Narrowest distance band that still holds a ring of quantized cells
const MIN_BAND: f64 = 0.5;

/// Configuration for the histogram grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramGridConfig {
    /// Maximum trusted sensor range [world units]
    pub r_max: f64,
    /// Minimum trusted sensor range [world units]
    pub r_min: f64,
    /// Side of the active window [cells], odd
    pub window_size: usize,
    /// Size of one cell [world units]
    pub cell_size: f64,
    /// Sonar deviation around the measured distance [cells]
    pub epsilon: f64,
    /// Beam aperture [deg]
    pub omega: f64,
}

impl Default for HistogramGridConfig {
    fn default() -> Self {
        Self {
            r_max: 375.0,
            r_min: 0.0,
            window_size: 35,
            cell_size: 10.0,
            epsilon: 0.5,
            omega: 30.0,
        }
    }
}

impl HistogramGridConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        if self.window_size < 3 || self.window_size % 2 == 0 {
            return Err(NavigationError::InvalidParameter(format!(
                "window_size must be odd and >= 3, got {}",
                self.window_size
            )));
        }
        if !(self.cell_size > 0.0) {
            return Err(NavigationError::InvalidParameter("cell_size must be > 0".to_string()));
        }
        if !(self.r_min >= 0.0 && self.r_max > self.r_min) {
            return Err(NavigationError::InvalidParameter(
                "sensor range must satisfy 0 <= r_min < r_max".to_string(),
            ));
        }
        if !(self.epsilon >= 0.0) {
            return Err(NavigationError::InvalidParameter("epsilon must be >= 0".to_string()));
        }
        if !(self.omega > 0.0 && self.omega <= 360.0) {
            return Err(NavigationError::InvalidParameter("omega must be in (0, 360]".to_string()));
        }
        Ok(())
    }

    /// Half-width of the distance band around a reading [cells]
    pub fn band(&self) -> f64 {
        self.epsilon.max(MIN_BAND)
    }
}

/// Per-cell distance and bearing from the window centre.
///
/// Computed once per window size; bearings are `atan2(dy, dx)` in (-pi, pi].
#[derive(Debug, Clone)]
struct WindowGeometry {
    distances: DMatrix<f64>,
    angles: DMatrix<f64>,
}

impl WindowGeometry {
    fn precompute(window_size: usize) -> Self {
        let half = (window_size / 2) as f64;
        let distances = DMatrix::from_fn(window_size, window_size, |i, j| {
            let (dx, dy) = (i as f64 - half, j as f64 - half);
            (dx * dx + dy * dy).sqrt()
        });
        let angles = DMatrix::from_fn(window_size, window_size, |i, j| {
            (j as f64 - half).atan2(i as f64 - half)
        });
        WindowGeometry { distances, angles }
    }
}

/// Order independent belief combination: repeated evidence saturates to 1
pub fn saturating_combine(a: f64, b: f64) -> f64 {
    a + b - a * b
}

fn fold_fields(window_size: usize, fields: impl Iterator<Item = DMatrix<f64>>) -> DMatrix<f64> {
    fields.fold(DMatrix::zeros(window_size, window_size), |acc, field| {
        acc.zip_map(&field, saturating_combine)
    })
}

/// Wrap an angle into (-pi, pi]
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Local emptiness/occupancy window plus the signed global map it feeds
pub struct HistogramGrid {
    config: HistogramGridConfig,
    map: OccupancyMap,
    geometry: WindowGeometry,
    emptiness: DMatrix<f64>,
    occupancy: DMatrix<f64>,
    readings: RangeReadings,
}

impl HistogramGrid {
    pub fn new(map: OccupancyMap, config: HistogramGridConfig) -> NavigationResult<Self> {
        config.validate()?;
        let ws = config.window_size;

        Ok(HistogramGrid {
            geometry: WindowGeometry::precompute(ws),
            emptiness: DMatrix::zeros(ws, ws),
            occupancy: DMatrix::zeros(ws, ws),
            readings: Vec::new(),
            map,
            config,
        })
    }

    pub fn config(&self) -> &HistogramGridConfig {
        &self.config
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    /// Distance of every window cell from the centre [cells]
    pub fn distances(&self) -> &DMatrix<f64> {
        &self.geometry.distances
    }

    /// Bearing of every window cell from the centre [rad]
    pub fn angles(&self) -> &DMatrix<f64> {
        &self.geometry.angles
    }

    pub fn emptiness(&self) -> &DMatrix<f64> {
        &self.emptiness
    }

    pub fn occupancy(&self) -> &DMatrix<f64> {
        &self.occupancy
    }

    /// Signed global map: positive likely obstacle, negative likely free
    pub fn map(&self) -> &OccupancyMap {
        &self.map
    }

    pub fn reset_map(&mut self, map: OccupancyMap) {
        self.map = map;
    }

    pub fn set_sensor_measurements(&mut self, readings: RangeReadings) {
        self.readings = readings;
    }

    pub fn sensor_measurements(&self) -> &[RangeReading] {
        &self.readings
    }

    /// Clear both belief fields and return an empty window
    pub fn reset_window(&mut self) -> DMatrix<f64> {
        let ws = self.config.window_size;
        self.emptiness = DMatrix::zeros(ws, ws);
        self.occupancy = DMatrix::zeros(ws, ws);
        DMatrix::zeros(ws, ws)
    }

    /// Change the window size, the only operation that recomputes the window
    /// geometry
    pub fn set_window_size(&mut self, window_size: usize) -> NavigationResult<()> {
        let config = HistogramGridConfig {
            window_size,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        self.geometry = WindowGeometry::precompute(window_size);
        self.reset_window();
        Ok(())
    }

    /// Global cell coordinates covered by the window centred on `location`,
    /// row-major, `window_size^2` entries (may fall outside the map)
    pub fn window(&self, location: (i64, i64)) -> Vec<(i64, i64)> {
        let ws = self.config.window_size as i64;
        let half = ws / 2;
        (0..ws)
            .flat_map(|i| (0..ws).map(move |j| (location.0 - half + i, location.1 - half + j)))
            .collect()
    }

    /// Beam bisector of a reading in the map frame [rad]
    fn beam_direction(heading: f64, reading: &RangeReading) -> f64 {
        (heading + reading.angle).to_radians()
    }

    /// Triangular beam weight of every window cell, one field per reading.
    ///
    /// `heading` is the agent heading in degrees.
    pub fn angular_occupancy(&self, heading: f64) -> Vec<DMatrix<f64>> {
        let half_aperture = self.config.omega.to_radians() / 2.0;
        self.readings
            .iter()
            .map(|reading| {
                let beam = Self::beam_direction(heading, reading);
                self.geometry.angles.map(|angle| {
                    let theta = wrap_to_pi(angle - beam);
                    if theta.abs() < half_aperture {
                        1.0 - (theta / half_aperture).powi(2)
                    } else {
                        0.0
                    }
                })
            })
            .collect()
    }

    /// Readings inside the trusted range, paired with their beam weights
    fn weighted_readings(&self, heading: f64) -> Vec<(RangeReading, DMatrix<f64>)> {
        self.readings
            .iter()
            .cloned()
            .zip(self.angular_occupancy(heading))
            .filter(|(reading, _)| reading.distance >= self.config.r_min)
            .collect()
    }

    /// Parabolic emptiness between `r_min` and each reading minus the band,
    /// folded over all readings with the saturating rule.
    pub fn compute_emptiness(&mut self, heading: f64) -> &DMatrix<f64> {
        let cell = self.config.cell_size;
        let band = self.config.band();
        let r_min = self.config.r_min / cell;
        let r_max = self.config.r_max / cell;
        let distances = &self.geometry.distances;

        let contributions = self
            .weighted_readings(heading)
            .into_iter()
            .filter_map(|(reading, weights)| {
                let upper = (reading.distance / cell).min(r_max) - band;
                if upper <= r_min {
                    return None;
                }
                Some(distances.zip_map(&weights, |d, w| {
                    if d >= r_min && d <= upper {
                        (1.0 - ((d - r_min) / (upper - r_min)).powi(2)) * w
                    } else {
                        0.0
                    }
                }))
            })
            .collect::<Vec<_>>();

        self.emptiness = fold_fields(self.config.window_size, contributions.into_iter());
        &self.emptiness
    }

    /// Occupancy profile of one reading before clamping: a parabola within
    /// the band, scaled so its mass equals the free mass `sum(1 - E)` over
    /// its support. `None` when the beam covers no cell.
    fn reading_occupancy(&self, reading: &RangeReading, weights: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let band = self.config.band();
        let range = reading.distance / self.config.cell_size;
        let profile = self.geometry.distances.zip_map(weights, |d, w| {
            if (d - range).abs() <= band {
                (1.0 - ((d - range) / band).powi(2)) * w
            } else {
                0.0
            }
        });
        let total = profile.sum();
        if !(total > 0.0) {
            return None;
        }
        let free_mass: f64 = profile
            .iter()
            .zip(self.emptiness.iter())
            .filter(|(p, _)| **p > 0.0)
            .map(|(_, e)| 1.0 - e)
            .sum();
        Some(profile.map(|p| p / total * free_mass))
    }

    /// Parabolic occupancy within the band around each reading.
    ///
    /// Each reading's profile carries the free mass found over its support,
    /// is clamped to [0, 1] and folded with the saturating rule. Uses the
    /// current emptiness field.
    pub fn compute_occupancy(&mut self, heading: f64) -> &DMatrix<f64> {
        let contributions = self
            .weighted_readings(heading)
            .into_iter()
            .filter(|(reading, _)| reading.distance <= self.config.r_max)
            .filter_map(|(reading, weights)| self.reading_occupancy(&reading, &weights))
            .map(|field| field.map(|p| p.clamp(0.0, 1.0)))
            .collect::<Vec<_>>();

        self.occupancy = fold_fields(self.config.window_size, contributions.into_iter());
        &self.occupancy
    }

    /// Recompute both fields and overlay the window on the global map centred
    /// at `location` (cell indices), clipped at the map edges.
    pub fn compute_map(&mut self, heading: f64, location: (i64, i64)) -> NavigationResult<()> {
        if self.readings.is_empty() {
            return Err(NavigationError::InvalidInput("no sensor measurement set".to_string()));
        }
        self.compute_emptiness(heading);
        self.compute_occupancy(heading);

        let ws = self.config.window_size;
        for (k, (r, c)) in self.window(location).into_iter().enumerate() {
            if !self.map.in_bounds(r, c) {
                continue;
            }
            let (i, j) = (k / ws, k % ws);
            let occ = self.occupancy[(i, j)];
            let emp = self.emptiness[(i, j)];
            self.map[(r as usize, c as usize)] = if occ >= emp { occ } else { -emp };
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(window_size: usize) -> HistogramGrid {
        let config = HistogramGridConfig {
            window_size,
            ..Default::default()
        };
        HistogramGrid::new(OccupancyMap::from_matrix(DMatrix::zeros(40, 40)), config).unwrap()
    }

    #[test]
    fn test_reset_window_shape() {
        let mut grid = grid(7);
        let window = grid.reset_window();
        assert_eq!(window.shape(), (7, 7));
        assert!(window.iter().all(|v| *v == 0.0));
        assert!(grid.emptiness().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_even_window_rejected() {
        let config = HistogramGridConfig {
            window_size: 8,
            ..Default::default()
        };
        assert!(HistogramGrid::new(OccupancyMap::from_matrix(DMatrix::zeros(4, 4)), config).is_err());
    }

    #[test]
    fn test_window_coordinates() {
        let grid = grid(5);
        let window = grid.window((10, 10));
        assert_eq!(window.len(), 25);
        assert_eq!(window[0], (8, 8));
        assert_eq!(window[12], (10, 10));
        assert_eq!(window[24], (12, 12));
    }

    #[test]
    fn test_window_geometry() {
        let grid = grid(5);
        assert_relative_eq!(grid.distances()[(2, 2)], 0.0);
        assert_relative_eq!(grid.distances()[(4, 2)], 2.0);
        // +x along rows, +y along columns
        assert_relative_eq!(grid.angles()[(4, 2)], 0.0);
        assert_relative_eq!(grid.angles()[(2, 4)], PI / 2.0);
        assert_relative_eq!(grid.angles()[(0, 2)], PI);
    }

    #[test]
    fn test_set_window_size_recomputes_geometry() {
        let mut grid = grid(5);
        grid.set_window_size(9).unwrap();
        assert_eq!(grid.distances().shape(), (9, 9));
        assert_eq!(grid.emptiness().shape(), (9, 9));
        assert!(grid.set_window_size(4).is_err());
        assert_eq!(grid.window_size(), 9);
    }

    #[test]
    fn test_saturating_combine_bounded() {
        let mut belief = 0.0;
        for _ in 0..50 {
            belief = saturating_combine(belief, 0.7);
            assert!(belief <= 1.0);
        }
        assert_relative_eq!(belief, 1.0, epsilon = 1e-12);
        assert_relative_eq!(saturating_combine(0.2, 0.5), saturating_combine(0.5, 0.2));
    }

    #[test]
    fn test_angular_occupancy_peaks_on_bisector() {
        let mut grid = grid(11);
        grid.set_sensor_measurements(vec![RangeReading::new(0.0, 40.0)]);
        let weights = grid.angular_occupancy(0.0);

        assert_eq!(weights.len(), 1);
        // Straight ahead along +x
        assert_relative_eq!(weights[0][(9, 5)], 1.0);
        // Behind the agent
        assert_relative_eq!(weights[0][(1, 5)], 0.0);
        assert!(weights[0].iter().all(|w| *w >= 0.0 && *w <= 1.0));
    }

    #[test]
    fn test_angular_occupancy_off_bisector() {
        let mut grid = grid(15);
        grid.set_sensor_measurements(vec![RangeReading::new(-20.0, 50.0)]);
        // Beam along +x once the 20 degree heading is added back
        let weights = grid.angular_occupancy(20.0);

        // Cell (11, 8) sits atan2(1, 4) off the bisector: 1 - (2 * theta / omega)^2
        let theta = 1.0_f64.atan2(4.0);
        let omega = 30.0_f64.to_radians();
        assert_relative_eq!(weights[0][(11, 8)], 1.0 - (2.0 * theta / omega).powi(2), epsilon = 1e-12);
        assert_relative_eq!(weights[0][(11, 8)], 0.124373, epsilon = 1e-6);
        // atan2(1, 3) is outside the 15 degree half aperture
        assert_relative_eq!(weights[0][(10, 8)], 0.0);
        assert_relative_eq!(weights[0][(10, 7)], 1.0);
    }

    #[test]
    fn test_emptiness_parabola_values() {
        let mut grid = grid(15);
        grid.set_sensor_measurements(vec![RangeReading::new(0.0, 50.0)]);
        let emptiness = grid.compute_emptiness(0.0).clone();

        // Reading at 5 cells, band 0.5: 1 - ((d - r_min) / (5 - 0.5 - r_min))^2
        assert_relative_eq!(emptiness[(10, 7)], 1.0 - (3.0_f64 / 4.5).powi(2), epsilon = 1e-12);
        assert_relative_eq!(emptiness[(10, 7)], 0.555556, epsilon = 1e-6);
        assert_relative_eq!(emptiness[(9, 7)], 1.0 - (2.0_f64 / 4.5).powi(2), epsilon = 1e-12);
        // The centre is fully free, the band edge and beyond carry nothing
        assert_relative_eq!(emptiness[(7, 7)], 1.0);
        assert_relative_eq!(emptiness[(12, 7)], 0.0);

        // Off the bisector the beam weight scales the parabola
        let theta = 1.0_f64.atan2(4.0);
        let weight = 1.0 - (2.0 * theta / 30.0_f64.to_radians()).powi(2);
        let parabola = 1.0 - (17.0_f64.sqrt() / 4.5).powi(2);
        assert_relative_eq!(emptiness[(11, 8)], parabola * weight, epsilon = 1e-12);
    }

    #[test]
    fn test_occupancy_mass_matches_free_mass() {
        let mut grid = grid(15);
        // The far reading empties the support of the near one
        grid.set_sensor_measurements(vec![RangeReading::new(0.0, 50.0), RangeReading::new(0.0, 100.0)]);
        grid.compute_emptiness(0.0);
        let emptiness = grid.emptiness().clone();

        // Only the near reading's band fits inside the window
        let fields: Vec<DMatrix<f64>> = grid
            .weighted_readings(0.0)
            .iter()
            .filter_map(|(reading, weights)| grid.reading_occupancy(reading, weights))
            .collect();
        assert_eq!(fields.len(), 1);

        for field in &fields {
            let free_mass: f64 = field
                .iter()
                .zip(emptiness.iter())
                .filter(|(p, _)| **p > 0.0)
                .map(|(_, e)| 1.0 - e)
                .sum();
            assert!(free_mass > 0.0);
            assert_relative_eq!(field.sum(), free_mass, epsilon = 1e-9);
        }

        // The band peaks 5 cells out on the bisector
        let peak = fields[0].iter().cloned().fold(f64::MIN, f64::max);
        assert_relative_eq!(fields[0][(12, 7)], peak);
    }

    #[test]
    fn test_fields_stay_within_unit_interval() {
        let mut grid = grid(15);
        grid.set_sensor_measurements(vec![
            RangeReading::new(-15.0, 50.0),
            RangeReading::new(0.0, 50.0),
            RangeReading::new(15.0, 50.0),
        ]);
        let emptiness = grid.compute_emptiness(0.0).clone();
        let occupancy = grid.compute_occupancy(0.0).clone();

        assert!(emptiness.iter().all(|v| *v >= 0.0 && *v <= 1.0));
        assert!(occupancy.iter().all(|v| *v >= 0.0 && *v <= 1.0));
        // Free in front of the obstacle, occupied at the reading
        assert!(emptiness[(9, 7)] > 0.0);
        assert!(occupancy[(12, 7)] > 0.0);
        assert_relative_eq!(occupancy[(9, 7)], 0.0);
    }

    #[test]
    fn test_compute_map_writes_signed_beliefs() {
        let mut grid = grid(15);
        grid.set_sensor_measurements(vec![RangeReading::new(0.0, 50.0)]);
        grid.compute_map(0.0, (20, 20)).unwrap();

        // Window (9, 7) -> map (22, 20): free
        assert!(grid.map()[(22, 20)] < 0.0);
        // Window (12, 7) -> map (25, 20): obstacle
        assert!(grid.map()[(25, 20)] > 0.0);

        // Window (10, 7) -> map (23, 20): minus the emptiness
        assert_relative_eq!(grid.map()[(23, 20)], -(1.0 - (3.0_f64 / 4.5).powi(2)), epsilon = 1e-12);
        assert_relative_eq!(grid.map()[(25, 20)], grid.occupancy()[(12, 7)]);

        // Window origin (0, 0) sits at map (13, 13)
        for i in 0..15 {
            for j in 0..15 {
                let occ = grid.occupancy()[(i, j)];
                let emp = grid.emptiness()[(i, j)];
                let expected = if occ >= emp { occ } else { -emp };
                assert_relative_eq!(grid.map()[(13 + i, 13 + j)], expected);
            }
        }
    }

    #[test]
    fn test_compute_map_clips_at_edges() {
        let mut grid = grid(15);
        grid.set_sensor_measurements(vec![RangeReading::new(180.0, 50.0)]);
        assert!(grid.compute_map(0.0, (0, 0)).is_ok());
        assert_eq!(grid.map().shape(), (40, 40));
    }

    #[test]
    fn test_compute_map_needs_readings() {
        let mut grid = grid(5);
        assert!(grid.compute_map(0.0, (2, 2)).is_err());
    }
}
