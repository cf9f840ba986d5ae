//! Ray and segment geometry used by the particle filter sensor model
//!
//! Pure functions over double precision 2D coordinates. A ray that does not
//! touch an obstacle segment is reported as the zero vector, which callers
//! read as "no obstacle in range".

use crate::common::{NavigationError, NavigationResult, Point2D, Segment2D};

/// End points of rays of length `max_range` cast from every origin along each
/// of its associated angles (radians, absolute).
///
/// No bounds checking is done against any map; callers clip.
pub fn get_rays(origins: &[Point2D], angles: &[Vec<f64>], max_range: f64) -> Vec<Vec<Point2D>> {
    origins
        .iter()
        .zip(angles.iter())
        .map(|(origin, origin_angles)| {
            origin_angles
                .iter()
                .map(|angle| {
                    Point2D::new(
                        origin.x + angle.cos() * max_range,
                        origin.y + angle.sin() * max_range,
                    )
                })
                .collect()
        })
        .collect()
}

/// Whether `a`, `b`, `c` are placed counter-clockwise
pub fn on_ccw(a: &Point2D, b: &Point2D, c: &Point2D) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Orientation test: AB and CD intersect iff C,D lie on opposite sides of AB
/// and A,B lie on opposite sides of CD.
pub fn segments_intersect(s1: &Segment2D, s2: &Segment2D) -> bool {
    let (a, b) = (&s1.start, &s1.end);
    let (c, d) = (&s2.start, &s2.end);
    on_ccw(a, c, d) != on_ccw(b, c, d) && on_ccw(a, b, c) != on_ccw(a, b, d)
}

/// Point where the lines supporting `s1` and `s2` meet.
///
/// Parallel (or degenerate) segments make the 2x2 system singular and are
/// rejected as invalid input.
pub fn intersection_point(s1: &Segment2D, s2: &Segment2D) -> NavigationResult<Point2D> {
    let da = s1.end.to_vector() - s1.start.to_vector();
    let db = s2.end.to_vector() - s2.start.to_vector();
    let dp = s1.start.to_vector() - s2.start.to_vector();

    // da rotated by +90 degrees
    let dap = nalgebra::Vector2::new(-da[1], da[0]);
    let denom = dap.dot(&db);
    if denom.abs() < f64::EPSILON {
        return Err(NavigationError::InvalidInput(format!(
            "segments {:?} and {:?} are parallel",
            s1, s2
        )));
    }
    let num = dap.dot(&dp);

    Ok(Point2D::from(db * (num / denom) + s2.start.to_vector()))
}

/// Intersections of every ray with every obstacle segment.
///
/// Returns one row per (origin, ray) pair in origin-major order; each row
/// holds one point per obstacle segment, the zero vector where the ray does
/// not cross that segment (including parallel pairs).
pub fn seg_intersections(
    origins: &[Point2D],
    endpoints: &[Vec<Point2D>],
    obstacles: &[Segment2D],
) -> Vec<Vec<Point2D>> {
    let mut intersections = Vec::with_capacity(endpoints.iter().map(Vec::len).sum());

    for (origin, rays) in origins.iter().zip(endpoints.iter()) {
        for end in rays {
            let ray = Segment2D::new(*origin, *end);
            intersections.push(ray_intersections(&ray, obstacles));
        }
    }

    intersections
}

/// Intersections of a single ray with each obstacle segment
pub fn ray_intersections(ray: &Segment2D, obstacles: &[Segment2D]) -> Vec<Point2D> {
    obstacles
        .iter()
        .map(|obstacle| {
            if segments_intersect(ray, obstacle) {
                intersection_point(ray, obstacle).unwrap_or_else(|_| Point2D::origin())
            } else {
                Point2D::origin()
            }
        })
        .collect()
}
