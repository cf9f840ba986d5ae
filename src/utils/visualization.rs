//! Visualization utilities for rust_autonav
//!
//! gnuplot views of the localization and obstacle avoidance state: map
//! obstacles, particles, poses, goal and the polar obstacle density.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use nalgebra::DVector;

use crate::common::{NavigationError, NavigationResult, Point2D, Pose2D, Segment2D};
use crate::localization::particle_filter::Particle;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const GRAY: &str = "#808080";

    pub const OBSTACLE: &str = BLACK;
    pub const PARTICLE: &str = GRAY;
    pub const GOAL: &str = BLUE;
    pub const TRAJECTORY: &str = RED;
    pub const ESTIMATED: &str = "#35C788";
    pub const GROUND_TRUTH: &str = BLUE;
    pub const DENSITY: &str = "#DD3355";
    pub const THRESHOLD: &str = GREEN;
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

/// Main visualizer struct
pub struct Visualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            x_label: "x [cells]".to_string(),
            y_label: "y [cells]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_labels(&mut self, x_label: &str, y_label: &str) -> &mut Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Obstacle edges, one line per segment
    pub fn plot_segments(&mut self, segments: &[Segment2D]) -> &mut Self {
        let axes = self.figure.axes2d();
        for (i, segment) in segments.iter().enumerate() {
            let caption = if i == 0 { "Obstacles" } else { "" };
            axes.lines(
                &[segment.start.x, segment.end.x],
                &[segment.start.y, segment.end.y],
                &[Caption(caption), Color(colors::OBSTACLE), LineWidth(2.0)],
            );
        }
        self
    }

    pub fn plot_points(&mut self, points: &[Point2D], style: &PointStyle) -> &mut Self {
        let x: Vec<f64> = points.iter().map(|p| p.x).collect();
        let y: Vec<f64> = points.iter().map(|p| p.y).collect();

        self.figure.axes2d().points(
            &x,
            &y,
            &[
                Caption(&style.caption),
                Color(&style.color),
                PointSymbol(style.symbol),
                PointSize(style.size),
            ],
        );
        self
    }

    pub fn plot_particles(&mut self, particles: &[Particle]) -> &mut Self {
        let positions: Vec<Point2D> = particles.iter().map(Particle::position).collect();
        self.plot_points(
            &positions,
            &PointStyle::new(colors::PARTICLE, "Particles").with_symbol('.').with_size(0.5),
        )
    }

    /// Pose with a heading tick
    pub fn plot_pose(&mut self, pose: &Pose2D, color: &str, caption: &str) -> &mut Self {
        let end_x = pose.x + pose.yaw.cos();
        let end_y = pose.y + pose.yaw.sin();

        let axes = self.figure.axes2d();
        axes.points(&[pose.x], &[pose.y], &[Caption(caption), Color(color), PointSymbol('O'), PointSize(1.5)]);
        axes.lines(&[pose.x, end_x], &[pose.y, end_y], &[Color(color), LineWidth(2.0)]);
        self
    }

    pub fn plot_goal(&mut self, goal: Point2D) -> &mut Self {
        self.plot_points(&[goal], &PointStyle::new(colors::GOAL, "Goal").with_symbol('x').with_size(2.0))
    }

    pub fn plot_trajectory(&mut self, trajectory: &[Point2D], color: &str, caption: &str) -> &mut Self {
        let x: Vec<f64> = trajectory.iter().map(|p| p.x).collect();
        let y: Vec<f64> = trajectory.iter().map(|p| p.y).collect();
        self.figure
            .axes2d()
            .lines(&x, &y, &[Caption(caption), Color(color), LineWidth(1.5)]);
        self
    }

    /// Polar obstacle density per sector against the safety threshold
    pub fn plot_density(&mut self, pod: &DVector<f64>, alpha: f64, threshold: f64) -> &mut Self {
        let bearings: Vec<f64> = (0..pod.len()).map(|k| k as f64 * alpha).collect();
        let limit = vec![threshold; pod.len()];

        self.aspect_ratio = None;
        let axes = self.figure.axes2d();
        axes.lines(&bearings, pod.iter(), &[Caption("Density"), Color(colors::DENSITY), LineWidth(2.0)]);
        axes.lines(&bearings, &limit, &[Caption("Threshold"), Color(colors::THRESHOLD)]);
        self.set_labels("bearing [deg]", "density")
    }

    pub fn show(&mut self) -> NavigationResult<()> {
        self.apply_settings();
        self.figure.show().map(|_| ()).map_err(plot_error)
    }

    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> NavigationResult<()> {
        self.apply_settings();
        self.figure.save_to_png(path, width, height).map_err(plot_error)
    }

    fn apply_settings(&mut self) {
        let axes = self.figure.axes2d();

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);

        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

fn plot_error<E: std::fmt::Display>(e: E) -> NavigationError {
    NavigationError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visualizer_creation() {
        let vis = Visualizer::new();
        assert!(vis.aspect_ratio.is_some());
        assert_eq!(vis.x_label, "x [cells]");
    }

    #[test]
    fn test_density_plot_switches_axes() {
        let mut vis = Visualizer::new();
        vis.plot_density(&DVector::zeros(72), 5.0, 2.0);
        assert!(vis.aspect_ratio.is_none());
        assert_eq!(vis.x_label, "bearing [deg]");
    }

    #[test]
    fn test_point_style() {
        let style = PointStyle::new(colors::GOAL, "Goal").with_size(2.0).with_symbol('x');
        assert_eq!(style.size, 2.0);
        assert_eq!(style.symbol, 'x');
        assert_eq!(style.color, colors::GOAL);
    }
}
