//! Stroke geometry.
//!
//! Turns the points sampled from a pointer into a closed outline that can be
//! filled in one pass. The outline follows the input through a streamline
//! filter, widens and narrows with pressure (recorded or simulated from
//! speed), and is capped with half circles at both ends.

use kurbo::{BezPath, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// How strongly the stroke width reacts to pressure.
pub const THINNING: f64 = 0.25;
/// How far each sample is pulled back toward the previous one.
pub const STREAMLINE: f64 = 0.5;
/// Minimum spacing of outline vertices, as a fraction of the brush size.
pub const SMOOTHING: f64 = 0.5;

/// Smallest brush size the outline generator accepts.
pub const MIN_BRUSH_SIZE: f64 = 1.0;

/// Pressure assumed for samples without a recorded one.
const DEFAULT_PRESSURE: f64 = 0.5;
/// How quickly simulated pressure follows the stroke speed.
const RATE_OF_PRESSURE_CHANGE: f64 = 0.275;
/// Number of segments in a half circle (caps, hairpin turns).
const CAP_SEGMENTS: usize = 13;
/// Number of initial samples used to seed the pressure estimate.
const PRESSURE_WARMUP: usize = 10;

/// A sampled pointer position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputPoint {
    pub x: f64,
    pub y: f64,
    /// Pen pressure in `[0, 1]`, if the device reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl InputPoint {
    /// A point without pressure information.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, pressure: None }
    }

    /// A point with pressure, clamped into `[0, 1]`.
    pub fn with_pressure(x: f64, y: f64, pressure: f64) -> Self {
        Self {
            x,
            y,
            pressure: Some(pressure.clamp(0.0, 1.0)),
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Point> for InputPoint {
    fn from(point: Point) -> Self {
        Self::new(point.x, point.y)
    }
}

/// Closed outline of a stroke, ready to be filled with the non-zero rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokePath {
    vertices: Vec<Point>,
}

impl StrokePath {
    pub fn from_vertices(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Axis-aligned box around the outline, `None` for an empty path.
    ///
    /// The fill curve passes through vertex midpoints with the vertices as
    /// control points, so it never leaves the vertex hull.
    pub fn bounds(&self) -> Option<Rect> {
        let (first, rest) = self.vertices.split_first()?;
        Some(rest.iter().fold(Rect::from_points(*first, *first), |rect, p| {
            rect.union_pt(*p)
        }))
    }

    /// Build the fill primitive: a closed quadratic curve through the
    /// midpoints of consecutive vertices.
    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let v = &self.vertices;
        let n = v.len();

        match n {
            0 => {}
            1 | 2 => {
                path.move_to(v[0]);
                for point in &v[1..] {
                    path.line_to(*point);
                }
                path.close_path();
            }
            _ => {
                path.move_to(v[n - 1].midpoint(v[0]));
                for i in 0..n {
                    let next = v[(i + 1) % n];
                    path.quad_to(v[i], v[i].midpoint(next));
                }
                path.close_path();
            }
        }

        path
    }
}

/// Bounds of a stroke path.
pub fn bounds_of(path: &StrokePath) -> Option<Rect> {
    path.bounds()
}

/// Convert sampled points into a stroke outline for a brush of `size`.
///
/// A single point (or a run of identical points) yields a round dab.
/// Empty input yields an empty path. Non-finite samples are dropped.
pub fn points_to_path(points: &[InputPoint], size: f64) -> StrokePath {
    let size = if size.is_finite() {
        size.max(MIN_BRUSH_SIZE)
    } else {
        MIN_BRUSH_SIZE
    };
    let points: Vec<InputPoint> = points.iter().copied().filter(InputPoint::is_finite).collect();

    let Some(first) = points.first() else {
        return StrokePath::default();
    };

    let simulate_pressure = points.iter().all(|p| p.pressure.is_none());

    if points.iter().all(|p| p.position() == first.position()) {
        let pressure = first.pressure.unwrap_or(DEFAULT_PRESSURE);
        return StrokePath::from_vertices(dab(first.position(), stroke_radius(size, pressure)));
    }

    let samples = stroke_samples(&points, size);
    StrokePath::from_vertices(outline(&samples, size, simulate_pressure))
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    point: Point,
    pressure: f64,
    /// Unit vector pointing back toward the previous sample.
    vector: Vec2,
    distance: f64,
}

/// Streamline the input and attach direction and length information.
fn stroke_samples(points: &[InputPoint], size: f64) -> Vec<Sample> {
    let t = 0.15 + (1.0 - STREAMLINE) * 0.85;
    let first = points[0];
    let last_index = points.len() - 1;

    let mut samples = vec![Sample {
        point: first.position(),
        pressure: first.pressure.unwrap_or(DEFAULT_PRESSURE),
        vector: Vec2::new(1.0, 1.0),
        distance: 0.0,
    }];
    let mut running_length = 0.0;
    let mut reached_min_length = false;

    for (i, input) in points.iter().enumerate().skip(1) {
        let prev = samples[samples.len() - 1];
        let point = if i == last_index {
            input.position()
        } else {
            prev.point.lerp(input.position(), t)
        };

        let distance = point.distance(prev.point);
        if distance < f64::EPSILON {
            continue;
        }

        // Hold the start in place until the pointer has moved a brush width.
        if i < last_index && !reached_min_length {
            if running_length + distance < size {
                continue;
            }
            reached_min_length = true;
        }
        running_length += distance;

        samples.push(Sample {
            point,
            pressure: input.pressure.unwrap_or(DEFAULT_PRESSURE),
            vector: (prev.point - point) / distance,
            distance,
        });
    }

    samples[0].vector = samples.get(1).map_or(Vec2::ZERO, |s| s.vector);
    samples
}

fn outline(samples: &[Sample], size: f64, simulate_pressure: bool) -> Vec<Point> {
    let first = samples[0];
    let last = samples[samples.len() - 1];

    if samples.len() == 1 {
        return dab(first.point, stroke_radius(size, first.pressure));
    }

    let min_distance = (size * SMOOTHING).powi(2);
    let mut prev_pressure = samples
        .iter()
        .take(PRESSURE_WARMUP)
        .fold(first.pressure, |acc, s| {
            if simulate_pressure {
                simulated_pressure(acc, s.distance, size)
            } else {
                (acc + s.pressure) / 2.0
            }
        });

    let mut left: Vec<Point> = Vec::with_capacity(samples.len());
    let mut right: Vec<Point> = Vec::with_capacity(samples.len());
    let mut prev_vector = first.vector;
    let mut last_left = first.point;
    let mut last_right = first.point;
    let mut prev_was_sharp = false;
    let mut first_radius = None;
    let mut radius = size / 2.0;

    for (i, sample) in samples.iter().enumerate() {
        let pressure = if simulate_pressure {
            simulated_pressure(prev_pressure, sample.distance, size)
        } else {
            sample.pressure
        };
        prev_pressure = pressure;
        radius = stroke_radius(size, pressure);
        first_radius.get_or_insert(radius);

        let next_vector = samples.get(i + 1).map(|s| s.vector);
        let next_dot = next_vector.map_or(1.0, |v| sample.vector.dot(v));
        let prev_dot = sample.vector.dot(prev_vector);

        let is_sharp = prev_dot < 0.0 && !prev_was_sharp;
        let next_is_sharp = next_dot < 0.0;

        if is_sharp || next_is_sharp {
            // Hairpin: wrap the point in a half circle so the outline does not fold over.
            let offset = perp(prev_vector) * radius;
            for step in 0..=CAP_SEGMENTS {
                let angle = PI * step as f64 / CAP_SEGMENTS as f64;
                last_left = rotate_around(sample.point - offset, sample.point, angle);
                last_right = rotate_around(sample.point + offset, sample.point, -angle);
                left.push(last_left);
                right.push(last_right);
            }
            if next_is_sharp {
                prev_was_sharp = true;
            }
            continue;
        }
        prev_was_sharp = false;

        if i == samples.len() - 1 {
            let offset = perp(sample.vector) * radius;
            left.push(sample.point - offset);
            right.push(sample.point + offset);
            continue;
        }

        let blended = next_vector.unwrap_or(sample.vector).lerp(sample.vector, next_dot);
        let offset = perp(blended) * radius;

        let l = sample.point - offset;
        if i <= 1 || last_left.distance_squared(l) > min_distance {
            left.push(l);
            last_left = l;
        }
        let r = sample.point + offset;
        if i <= 1 || last_right.distance_squared(r) > min_distance {
            right.push(r);
            last_right = r;
        }

        prev_vector = sample.vector;
    }

    let start_radius = first_radius.unwrap_or(radius);
    let travel = -last.vector;
    let end_cap = half_circle(last.point, -perp(last.vector), travel, radius);
    let start_cap = half_circle(first.point, perp(first.vector), first.vector, start_radius);

    let mut vertices = left;
    vertices.extend(end_cap);
    vertices.extend(right.into_iter().rev());
    vertices.extend(start_cap);
    vertices
}

fn stroke_radius(size: f64, pressure: f64) -> f64 {
    size * (0.5 - THINNING * (0.5 - pressure))
}

fn simulated_pressure(prev: f64, distance: f64, size: f64) -> f64 {
    let speed = (distance / size).min(1.0);
    let target = (1.0 - speed).min(1.0);
    (prev + (target - prev) * (speed * RATE_OF_PRESSURE_CHANGE)).min(1.0)
}

fn perp(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

fn rotate_around(point: Point, center: Point, angle: f64) -> Point {
    let (sin, cos) = angle.sin_cos();
    let d = point - center;
    Point::new(
        center.x + d.x * cos - d.y * sin,
        center.y + d.x * sin + d.y * cos,
    )
}

/// Interior vertices of a half circle starting on `side`, bulging toward
/// `outward`, and ending on `-side`.
fn half_circle(center: Point, side: Vec2, outward: Vec2, radius: f64) -> Vec<Point> {
    (1..CAP_SEGMENTS)
        .map(|step| {
            let angle = PI * step as f64 / CAP_SEGMENTS as f64;
            center + side * (radius * angle.cos()) + outward * (radius * angle.sin())
        })
        .collect()
}

fn dab(center: Point, radius: f64) -> Vec<Point> {
    let segments = CAP_SEGMENTS * 2;
    (0..segments)
        .map(|step| {
            let angle = 2.0 * PI * step as f64 / segments as f64;
            center + Vec2::new(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(from: Point, to: Point, steps: usize) -> Vec<InputPoint> {
        (0..=steps)
            .map(|i| from.lerp(to, i as f64 / steps as f64).into())
            .collect()
    }

    #[test]
    fn test_empty_input_yields_empty_path() {
        let path = points_to_path(&[], 8.0);
        assert!(path.is_empty());
        assert!(path.bounds().is_none());
        assert!(path.to_bez_path().elements().is_empty());
    }

    #[test]
    fn test_single_point_is_round_dab() {
        let path = points_to_path(&[InputPoint::new(50.0, 50.0)], 10.0);
        assert!(!path.is_empty());

        let center = Point::new(50.0, 50.0);
        for vertex in path.vertices() {
            assert!((vertex.distance(center) - 5.0).abs() < 1e-9);
        }

        let bounds = path.bounds().unwrap();
        assert!((bounds.width() - 10.0).abs() < 0.1);
        assert!((bounds.height() - 10.0).abs() < 0.1);
    }

    #[test]
    fn test_repeated_point_is_dab() {
        let p = InputPoint::new(3.0, 4.0);
        assert_eq!(points_to_path(&[p, p, p], 6.0), points_to_path(&[p], 6.0));
    }

    #[test]
    fn test_deterministic() {
        let points = line(Point::new(0.0, 0.0), Point::new(80.0, 40.0), 20);
        assert_eq!(points_to_path(&points, 8.0), points_to_path(&points, 8.0));
    }

    #[test]
    fn test_duplicate_points_are_skipped() {
        let a = InputPoint::new(0.0, 0.0);
        let b = InputPoint::new(40.0, 0.0);
        let with_duplicates = points_to_path(&[a, a, a, b], 8.0);
        let without = points_to_path(&[a, b], 8.0);
        assert_eq!(with_duplicates, without);
        assert!(with_duplicates.vertices().iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn test_bounds_cover_input() {
        let points = line(Point::new(10.0, 10.0), Point::new(110.0, 60.0), 25);
        let bounds = points_to_path(&points, 12.0).bounds().unwrap();

        assert!(bounds.x0 <= 10.0 && bounds.y0 <= 10.0);
        assert!(bounds.x1 >= 110.0 && bounds.y1 >= 60.0);
        // Never wider than the brush on any side.
        assert!(bounds.x0 >= 10.0 - 12.0 && bounds.x1 <= 110.0 + 12.0);
    }

    #[test]
    fn test_pressure_controls_width() {
        let heavy: Vec<InputPoint> = (0..=20)
            .map(|i| InputPoint::with_pressure(i as f64 * 5.0, 0.0, 1.0))
            .collect();
        let light: Vec<InputPoint> = (0..=20)
            .map(|i| InputPoint::with_pressure(i as f64 * 5.0, 0.0, 0.0))
            .collect();

        let heavy = points_to_path(&heavy, 10.0).bounds().unwrap();
        let light = points_to_path(&light, 10.0).bounds().unwrap();
        assert!(heavy.height() > light.height());
    }

    #[test]
    fn test_hairpin_stays_finite() {
        let mut points = line(Point::new(0.0, 0.0), Point::new(60.0, 0.0), 12);
        points.extend(line(Point::new(60.0, 0.0), Point::new(0.0, 1.0), 12));
        let path = points_to_path(&points, 8.0);
        assert!(path.len() > 4);
        assert!(path.vertices().iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn test_degenerate_size_is_clamped() {
        let points = line(Point::new(0.0, 0.0), Point::new(20.0, 0.0), 5);
        let path = points_to_path(&points, 0.0);
        assert!(!path.is_empty());
        assert!(path.bounds().unwrap().height() > 0.0);
    }

    #[test]
    fn test_non_finite_points_dropped() {
        let points = [
            InputPoint::new(f64::NAN, 0.0),
            InputPoint::new(5.0, 5.0),
        ];
        let path = points_to_path(&points, 4.0);
        assert_eq!(path, points_to_path(&[InputPoint::new(5.0, 5.0)], 4.0));
    }

    #[test]
    fn test_bez_path_is_closed() {
        let points = line(Point::new(0.0, 0.0), Point::new(30.0, 30.0), 10);
        let bez = points_to_path(&points, 6.0).to_bez_path();
        assert!(matches!(bez.elements().last(), Some(kurbo::PathEl::ClosePath)));
    }
}
