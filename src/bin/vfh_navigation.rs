// Particle filter localization and VFH obstacle avoidance in a simulated room.
//
// usage: vfh_navigation [config.toml] [--plot]

use nalgebra::DMatrix;
use ordered_float::OrderedFloat;
use tracing::{info, warn};

use rust_autonav::common::{wrap_degrees, Point2D, RangeReading, Segment2D};
use rust_autonav::control::ObstacleAvoidance;
use rust_autonav::utils::geometry;
use rust_autonav::utils::visualization::{colors, Visualizer};
use rust_autonav::utils::OccupancyMap;
use rust_autonav::{NavigationConfig, NavigationResult};

const ROOM_SIZE: usize = 30;
const SENSOR_ANGLES: [f64; 8] = [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0];
const MAX_STEPS: usize = 80;
const GOAL_TOLERANCE: f64 = 1.5;

/// Walled room with a pillar in the middle
fn build_room() -> OccupancyMap {
    let mut grid = DMatrix::zeros(ROOM_SIZE, ROOM_SIZE);
    for i in 0..ROOM_SIZE {
        grid[(0, i)] = 1.0;
        grid[(ROOM_SIZE - 1, i)] = 1.0;
        grid[(i, 0)] = 1.0;
        grid[(i, ROOM_SIZE - 1)] = 1.0;
    }
    for i in 12..18 {
        for j in 12..18 {
            grid[(i, j)] = 1.0;
        }
    }
    OccupancyMap::from_matrix(grid)
}

/// Ground-truth readings of an agent at `position` [cells] facing `heading` [deg]
fn simulate_readings(
    position: Point2D,
    heading: f64,
    segments: &[Segment2D],
    cell_size: f64,
) -> Vec<RangeReading> {
    let origin = [position];
    let angles = [SENSOR_ANGLES
        .iter()
        .map(|a| (heading + a).to_radians())
        .collect::<Vec<f64>>()];
    let max_range = (2.0 * (ROOM_SIZE as f64).powi(2)).sqrt();
    let rays = geometry::get_rays(&origin, &angles, max_range);
    let hits = geometry::seg_intersections(&origin, &rays, segments);

    SENSOR_ANGLES
        .iter()
        .zip(hits.iter())
        .map(|(angle, hits)| {
            let nearest = hits
                .iter()
                .filter(|hit| !hit.is_origin())
                .map(|hit| OrderedFloat(position.distance(hit)))
                .min()
                .map_or(max_range, OrderedFloat::into_inner);
            RangeReading::new(*angle, nearest * cell_size)
        })
        .collect()
}

fn main() -> NavigationResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let plot = args.iter().any(|a| a == "--plot");
    let config = match args.iter().skip(1).find(|a| !a.starts_with("--")) {
        Some(path) => {
            info!(path = %path, "loading configuration");
            NavigationConfig::load(path)?
        }
        None => NavigationConfig::default(),
    };
    let mut avoidance_config = config.obstacle_avoidance;
    avoidance_config.particle_filter.heading_coverage = 8;
    if avoidance_config.particle_filter.seed.is_none() {
        avoidance_config.particle_filter.seed = Some(7);
    }
    let cell_size = avoidance_config.histogram_grid.cell_size;

    let map = build_room();
    let segments = map.obstacle_segments();
    let mut controller = ObstacleAvoidance::new(map, avoidance_config)?;

    let goal = Point2D::new(25.5, 25.5);
    controller.set_goal(goal);

    let mut position = Point2D::new(4.5, 4.5);
    let mut heading = 0.0_f64;
    let mut truth = vec![position];
    let mut estimates = Vec::new();

    for step in 0..MAX_STEPS {
        let readings = simulate_readings(position, heading, &segments, cell_size);
        let decision = controller.process(&readings, heading)?;
        estimates.push(controller.position().position());

        info!(
            step,
            x = position.x,
            y = position.y,
            heading,
            heading_delta = decision.heading_delta,
            speed = decision.speed,
            "navigation step"
        );

        if position.distance(&goal) < GOAL_TOLERANCE {
            info!(step, "goal reached");
            break;
        }
        if decision.is_hold() {
            warn!(step, "no free direction, holding position");
            break;
        }

        // Move one cell per step along the new heading
        let turn = f64::from(decision.heading_delta);
        heading = wrap_degrees(heading + turn);
        let forward = 1.0;
        let next = Point2D::new(
            position.x + forward * heading.to_radians().cos(),
            position.y + forward * heading.to_radians().sin(),
        );
        if segments
            .iter()
            .any(|s| geometry::segments_intersect(s, &Segment2D::new(position, next)))
        {
            warn!(step, "step would cross an obstacle, stopping");
            break;
        }
        position = next;
        truth.push(position);
        controller.apply_odometry(forward, turn.to_radians())?;
    }

    if plot {
        let mut vis = Visualizer::new();
        vis.set_title("VFH navigation")
            .set_x_range(0.0, ROOM_SIZE as f64)
            .set_y_range(0.0, ROOM_SIZE as f64)
            .plot_segments(&segments)
            .plot_particles(controller.particle_filter().particles())
            .plot_trajectory(&truth, colors::GROUND_TRUTH, "Ground truth")
            .plot_trajectory(&estimates, colors::ESTIMATED, "Estimate")
            .plot_pose(&controller.position(), colors::TRAJECTORY, "Last estimate")
            .plot_goal(goal);
        vis.show()?;

        let polar = controller.heading_control().polar_histogram();
        let mut density = Visualizer::new();
        density
            .set_title("Polar obstacle density")
            .plot_density(
                polar.density(),
                polar.config().alpha,
                controller.heading_control().config().safety_threshold,
            );
        density.show()?;
    }

    Ok(())
}
