use glam::DVec2;
use itertools::Itertools;

use crate::{ EngineError, Result };

/// A straight segment going from `start` to `end`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: DVec2,
    pub end: DVec2,
}

impl Segment {
    pub fn new(start: DVec2, end: DVec2) -> Self {
        Self { start, end }
    }

    pub fn direction(&self) -> DVec2 {
        self.end - self.start
    }

    /// Unit normal on the left of the segment's direction, `None` for a
    /// zero-length segment
    pub fn normal(&self) -> Option<DVec2> {
        self.direction().perp().try_normalize()
    }

    pub fn translated(&self, offset: DVec2) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }

    /// Parameter of the orthogonal projection of `point` on the segment's
    /// line, 0 at `start` and 1 at `end`
    pub fn project(&self, point: DVec2) -> f64 {
        let dir = self.direction();
        let len2 = dir.length_squared();
        if len2 == 0. {
            return 0.;
        }
        (point - self.start).dot(dir) / len2
    }
}

/// Immutable template geometry, expressed in its owner's local frame
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    points: Box<[DVec2]>,
    closed: bool,
}

impl Shape {
    pub fn new(points: impl IntoIterator<Item = DVec2>, closed: bool) -> Result<Self> {
        let points = points.into_iter().collect_vec();

        if points.len() < 2 {
            return Err(EngineError::InvalidShape(format!(
                "a shape needs at least 2 points, got {}", points.len()
            )));
        }
        if closed && points.len() < 3 {
            return Err(EngineError::InvalidShape("a closed shape needs at least 3 points".to_string()));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(EngineError::InvalidShape(format!("non-finite point {bad}")));
        }

        Ok(Self {
            points: points.into_boxed_slice(),
            closed,
        })
    }

    pub fn open(points: impl IntoIterator<Item = DVec2>) -> Result<Self> {
        Self::new(points, false)
    }

    pub fn closed(points: impl IntoIterator<Item = DVec2>) -> Result<Self> {
        Self::new(points, true)
    }

    /// A single point, useful for point-mass objects
    pub fn point() -> Self {
        Self {
            points: Box::new([DVec2::ZERO, DVec2::ZERO]),
            closed: false,
        }
    }

    pub fn points(&self) -> &[DVec2] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn segment_count(&self) -> usize {
        if self.closed { self.points.len() } else { self.points.len() - 1 }
    }

    pub fn segment(&self, idx: usize) -> Segment {
        debug_assert!(idx < self.segment_count());
        let next = (idx + 1) % self.points.len();
        Segment::new(self.points[idx], self.points[next])
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        (0..self.segment_count()).map(|idx| self.segment(idx))
    }

    /// Index of a segment having the given vertex as an endpoint
    pub fn segment_of_vertex(&self, vertex: usize) -> usize {
        debug_assert!(vertex < self.points.len());
        vertex.min(self.segment_count() - 1)
    }

    /// The shape's points once the shape is placed at `position`
    pub fn world_points(&self, position: DVec2) -> impl Iterator<Item = DVec2> + '_ {
        self.points.iter().map(move |&p| p + position)
    }
}

/// Axis-aligned rectangle centered on the local origin
pub fn rect_shape(width: f64, height: f64) -> Result<Shape> {
    let (w2, h2) = (width / 2., height / 2.);
    Shape::closed([
        DVec2::new(-w2, -h2),
        DVec2::new(w2, -h2),
        DVec2::new(w2, h2),
        DVec2::new(-w2, h2),
    ])
}

pub fn circle_polygon(
    center: DVec2,
    radius: f64,
    num_segments: u32,
) -> Vec<DVec2> {
    let mut points = Vec::with_capacity(num_segments as usize);
    let angle_step = 2.0 * std::f64::consts::PI / num_segments as f64;
    for i in 0..num_segments {
        let angle = angle_step * i as f64;
        points.push(DVec2::new(
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
        ));
    }
    points
}
