// occupancy grid map definition
// adapted from the planner grid map by Salah Eddine Ghamri (s.ghamri)

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::str::FromStr;

use crate::common::{NavigationError, NavigationResult, Point2D, Segment2D};
extern crate nalgebra as na;

/// Static 2D occupancy grid. A cell is free when its value is 0 and an
/// obstacle otherwise; the histogram grid overlays signed beliefs on it.
///
/// Cell `(r, c)` covers the square `[r, r+1] x [c, c+1]` in map units.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyMap {
    grid: na::DMatrix<f64>,
}

impl OccupancyMap {
    pub fn new(original_matrix: na::DMatrix<f64>, scale: usize) -> NavigationResult<Self> {
        if scale < 1 {
            return Err(NavigationError::InvalidParameter("scale must be >= 1".to_string()));
        }
        let grid = original_matrix.kronecker(&na::DMatrix::<f64>::repeat(scale, scale, 1.0));
        Ok(Self { grid })
    }

    pub fn from_matrix(grid: na::DMatrix<f64>) -> Self {
        Self { grid }
    }

    /// Read a map from a text file (see `FromStr`)
    pub fn load<P: AsRef<Path>>(path: P) -> NavigationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    pub fn in_bounds(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.grid.nrows() && (col as usize) < self.grid.ncols()
    }

    pub fn is_free(&self, row: usize, col: usize) -> bool {
        self.grid[(row, col)] == 0.0
    }

    /// Free cells in row-major order
    pub fn free_cells(&self) -> Vec<(usize, usize)> {
        let (rows, cols) = self.shape();
        let mut cells = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                if self.is_free(r, c) {
                    cells.push((r, c));
                }
            }
        }
        cells
    }

    pub fn free_cell_count(&self) -> usize {
        self.grid.iter().filter(|v| **v == 0.0).count()
    }

    /// Cell containing a point, if inside the map
    pub fn cell_of(&self, point: &Point2D) -> Option<(usize, usize)> {
        let row = point.x.floor() as i64;
        let col = point.y.floor() as i64;
        if self.in_bounds(row, col) {
            Some((row as usize, col as usize))
        } else {
            None
        }
    }

    // Edges facing outside the map are covered by the border segments.
    fn is_boundary(&self, a: (i64, i64), b: (i64, i64)) -> bool {
        self.in_bounds(a.0, a.1)
            && self.in_bounds(b.0, b.1)
            && self.is_free(a.0 as usize, a.1 as usize) != self.is_free(b.0 as usize, b.1 as usize)
    }

    /// Obstacle boundaries as axis-aligned segments.
    ///
    /// Unit edges between an obstacle cell and a free cell are merged along
    /// rows and columns into maximal segments; the map border is always part
    /// of the set.
    pub fn obstacle_segments(&self) -> Vec<Segment2D> {
        let (rows, cols) = self.shape();
        let (rows_f, cols_f) = (rows as f64, cols as f64);
        let mut segments = vec![
            Segment2D::from_coords(0.0, 0.0, rows_f, 0.0),
            Segment2D::from_coords(rows_f, 0.0, rows_f, cols_f),
            Segment2D::from_coords(rows_f, cols_f, 0.0, cols_f),
            Segment2D::from_coords(0.0, cols_f, 0.0, 0.0),
        ];

        // Edges at x = r, between rows r - 1 and r
        for r in 0..=rows as i64 {
            let mut run_start: Option<i64> = None;
            for c in 0..=cols as i64 {
                let is_edge = self.is_boundary((r - 1, c), (r, c));
                match (is_edge, run_start) {
                    (true, None) => run_start = Some(c),
                    (false, Some(start)) => {
                        segments.push(Segment2D::from_coords(r as f64, start as f64, r as f64, c as f64));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }

        // Edges at y = c, between columns c - 1 and c
        for c in 0..=cols as i64 {
            let mut run_start: Option<i64> = None;
            for r in 0..=rows as i64 {
                let is_edge = self.is_boundary((r, c - 1), (r, c));
                match (is_edge, run_start) {
                    (true, None) => run_start = Some(r),
                    (false, Some(start)) => {
                        segments.push(Segment2D::from_coords(start as f64, c as f64, r as f64, c as f64));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }

        segments
    }

    pub fn into_inner(self) -> na::DMatrix<f64> {
        self.grid
    }
}

impl Deref for OccupancyMap {
    type Target = na::DMatrix<f64>;

    fn deref(&self) -> &Self::Target {
        &self.grid
    }
}

impl DerefMut for OccupancyMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.grid
    }
}

/// Whitespace separated numeric rows, one map row per line.
/// Blank lines and lines starting with `#` are skipped.
impl FromStr for OccupancyMap {
    type Err = NavigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (line_no, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|e| {
                        NavigationError::InvalidInput(format!("line {}: '{}' {}", line_no + 1, token, e))
                    })
                })
                .collect::<NavigationResult<Vec<f64>>>()?;
            rows.push(row);
        }

        let ncols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || ncols == 0 {
            return Err(NavigationError::InvalidInput("map is empty".to_string()));
        }
        if rows.iter().any(|row| row.len() != ncols) {
            return Err(NavigationError::InvalidInput("map rows have different lengths".to_string()));
        }

        let nrows = rows.len();
        let data: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Self::from_matrix(na::DMatrix::from_row_slice(nrows, ncols, &data)))
    }
}
