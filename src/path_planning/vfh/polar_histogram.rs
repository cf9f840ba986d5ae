//! Polar histogram: reduction of the active window to one obstacle density
//! value per angular sector (Vector Field Histogram, stage 2)

use itertools::iproduct;
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::common::{NavigationError, NavigationResult};
use crate::mapping::histogram_grid::{wrap_to_pi, HistogramGrid};

/// Configuration for the polar histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarHistogramConfig {
    /// Angular resolution of one sector [deg], must divide 360
    pub alpha: f64,
    /// Obstacle magnitude constant `a`
    pub magnitude_a: f64,
    /// Length of the Hann smoothing window [sectors]
    pub smoothing_window: usize,
}

impl Default for PolarHistogramConfig {
    fn default() -> Self {
        Self {
            alpha: 5.0,
            magnitude_a: 5.0,
            smoothing_window: 5,
        }
    }
}

impl PolarHistogramConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        if !(self.alpha > 0.0 && self.alpha <= 360.0) {
            return Err(NavigationError::InvalidParameter("alpha must be in (0, 360]".to_string()));
        }
        let sectors = 360.0 / self.alpha;
        if (sectors - sectors.round()).abs() > 1e-9 {
            return Err(NavigationError::InvalidParameter(format!(
                "alpha {} does not divide 360",
                self.alpha
            )));
        }
        if !(self.magnitude_a > 0.0) {
            return Err(NavigationError::InvalidParameter("magnitude_a must be > 0".to_string()));
        }
        if self.smoothing_window == 0 {
            return Err(NavigationError::InvalidParameter("smoothing_window must be >= 1".to_string()));
        }
        Ok(())
    }

    /// Number of sectors `n = 360 / alpha`
    pub fn sectors(&self) -> usize {
        (360.0 / self.alpha).round() as usize
    }
}

/// Normalized Hann window of the given length
pub fn hann_window(length: usize) -> Vec<f64> {
    if length <= 1 {
        return vec![1.0; length];
    }
    let raw: Vec<f64> = (0..length)
        .map(|k| 0.5 * (1.0 - (2.0 * PI * k as f64 / (length - 1) as f64).cos()))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

pub struct PolarHistogram {
    config: PolarHistogramConfig,
    grid: HistogramGrid,
    counts: DMatrix<f64>,
    magnitude: DMatrix<f64>,
    density: DVector<f64>,
}

impl PolarHistogram {
    pub fn new(grid: HistogramGrid, config: PolarHistogramConfig) -> NavigationResult<Self> {
        config.validate()?;
        let ws = grid.window_size();

        Ok(PolarHistogram {
            counts: DMatrix::zeros(ws, ws),
            magnitude: DMatrix::zeros(ws, ws),
            density: DVector::zeros(config.sectors()),
            grid,
            config,
        })
    }

    pub fn config(&self) -> &PolarHistogramConfig {
        &self.config
    }

    pub fn sectors(&self) -> usize {
        self.config.sectors()
    }

    pub fn grid(&self) -> &HistogramGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut HistogramGrid {
        &mut self.grid
    }

    /// Raw polar obstacle density of the last computation
    pub fn density(&self) -> &DVector<f64> {
        &self.density
    }

    /// Discrete hit count: each reading adds 1 to the single cell of its
    /// distance band closest to the beam bisector (then closest in distance).
    pub fn compute_occupancy(&mut self, heading: f64) -> &DMatrix<f64> {
        let grid_config = self.grid.config();
        let band = grid_config.band();
        let cell = grid_config.cell_size;
        let (r_min, r_max) = (grid_config.r_min, grid_config.r_max);
        let ws = self.grid.window_size();
        let distances = self.grid.distances();
        let angles = self.grid.angles();

        let mut counts = DMatrix::zeros(ws, ws);
        let trusted = self
            .grid
            .sensor_measurements()
            .iter()
            .filter(|r| r.distance >= r_min && r.distance <= r_max);

        for reading in trusted {
            let range = reading.distance / cell;
            let beam = (heading + reading.angle).to_radians();
            let nearest = window_cells(ws)
                .filter(|&(i, j)| {
                    let d = distances[(i, j)];
                    d > 0.0 && (d - range).abs() <= band
                })
                .min_by_key(|&(i, j)| {
                    (
                        OrderedFloat(wrap_to_pi(angles[(i, j)] - beam).abs()),
                        OrderedFloat((distances[(i, j)] - range).abs()),
                    )
                });
            if let Some(cell_index) = nearest {
                counts[cell_index] += 1.0;
            }
        }

        self.counts = counts;
        &self.counts
    }

    /// Obstacle magnitude `c^2 (a - b d)` with `b = a / window_size`
    pub fn compute_obstacle_magnitude(&mut self, heading: f64) -> &DMatrix<f64> {
        self.compute_occupancy(heading);
        let a = self.config.magnitude_a;
        let b = a / self.grid.window_size() as f64;

        self.magnitude = self
            .counts
            .zip_map(self.grid.distances(), |c, d| c * c * (a - b * d));
        &self.magnitude
    }

    /// Sector index of a bearing in radians
    fn sector_of(&self, angle: f64) -> usize {
        let n = self.sectors();
        let wrapped = angle.rem_euclid(2.0 * PI);
        // tolerance keeps bearings on a sector boundary in the upper sector
        ((wrapped / self.config.alpha.to_radians() + 1e-9).floor() as usize).min(n - 1)
    }

    /// Raw polar obstacle density: magnitudes summed per sector
    pub fn compute_obstacle_density(&mut self, heading: f64) -> &DVector<f64> {
        self.compute_obstacle_magnitude(heading);

        let mut density = DVector::zeros(self.sectors());
        for (angle, magnitude) in self.grid.angles().iter().zip(self.magnitude.iter()) {
            density[self.sector_of(*angle)] += magnitude;
        }

        self.density = density;
        &self.density
    }

    /// Circular convolution with a normalized Hann window; same-length output
    pub fn pod_smoothing(&self, pod: &DVector<f64>) -> DVector<f64> {
        let window = hann_window(self.config.smoothing_window);
        let n = pod.len() as i64;
        let offset = (window.len() / 2) as i64;

        DVector::from_fn(pod.len(), |i, _| {
            window
                .iter()
                .enumerate()
                .map(|(k, w)| w * pod[(i as i64 + k as i64 - offset).rem_euclid(n) as usize])
                .sum()
        })
    }

    /// Smoothed polar obstacle density of the current readings
    pub fn compute_pod(&mut self, heading: f64) -> DVector<f64> {
        let density = self.compute_obstacle_density(heading).clone();
        self.pod_smoothing(&density)
    }
}

fn window_cells(ws: usize) -> impl Iterator<Item = (usize, usize)> {
    iproduct!(0..ws, 0..ws)
}
