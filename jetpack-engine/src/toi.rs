//! Exact time of impact between two translating polylines.
//!
//! Objects never rotate, so in the frame of one object every segment of the
//! other keeps its direction and the first contact between the two shapes is
//! always a vertex of one touching a segment of the other. For a vertex `r(t)`
//! and a segment `p -> q` of the other shape, the signed distance of the vertex
//! to the segment's line is
//!
//! ```text
//! s(t) = (q - p) x (r(t) - p) / |q - p|
//! ```
//!
//! and `r(t)` is quadratic in `t`, so each vertex-segment pair boils down to
//! the real roots of a small polynomial, kept only when the vertex lies within
//! the segment's extent at that time.

use glam::DVec2;
use typed_floats::Positive;

use crate::{ MotionState, Polynomial, Segment, Shape };

/// Contact parameter slack allowed past each end of a segment
const SEGMENT_SLACK: f64 = 1e-9;
/// Normal speed under which a root is a grazing touch rather than an impact
const GRAZING_SPEED: f64 = 1e-12;
/// Distance, speed and acceleration under which a vertex is considered to
/// slide along a segment's line
const CONTACT_SLOP: f64 = 1e-9;

/// A shape following a motion
#[derive(Debug, Clone, Copy)]
pub struct Body<'a> {
    pub shape: &'a Shape,
    pub motion: &'a MotionState,
}

impl<'a> Body<'a> {
    pub fn new(shape: &'a Shape, motion: &'a MotionState) -> Self {
        Self { shape, motion }
    }

    pub fn vertex_at(&self, vertex: usize, t: f64) -> DVec2 {
        self.shape.points()[vertex] + self.motion.position_at(t)
    }

    pub fn segment_at(&self, edge: usize, t: f64) -> Segment {
        self.shape.segment(edge).translated(self.motion.position_at(t))
    }
}

/// Which body of the queried pair owns the touching vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// A vertex of one body against a segment of the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactFeature {
    pub vertex_side: Side,
    pub vertex: usize,
    pub edge: usize,
}

impl ContactFeature {
    /// Same feature seen from a pair given in the opposite order
    pub fn swapped(self) -> Self {
        Self {
            vertex_side: self.vertex_side.other(),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Impact {
    pub time: f64,
    pub delta_time: Positive,
    /// World-space contact point
    pub point: DVec2,
    /// Unit contact normal pointing from B toward A
    pub normal: DVec2,
    pub feature: ContactFeature,
    /// Index of the segment of A and of the segment of B involved
    pub segments: (usize, usize),
}

/// Earliest time within `from..=horizon` at which the two bodies touch.
///
/// Returns `None` when they do not touch within the horizon. Roots closer than
/// `epsilon` to the start of the search are considered already resolved, and
/// grazing roots, where the vertex only brushes the segment's line, are not
/// impacts. Candidates with the exact same time are ordered by vertex side (A
/// first), vertex index, then segment index.
pub fn time_of_impact(a: Body, b: Body, from: f64, horizon: f64, epsilon: f64) -> Option<Impact> {
    let start = from.max(a.motion.epoch).max(b.motion.epoch);
    if start + epsilon > horizon {
        return None;
    }
    // Motion of A as seen from B
    let rel = a.motion.relative_to(b.motion, start);
    if rel.velocity == DVec2::ZERO && rel.acceleration == DVec2::ZERO {
        return None;
    }
    let max_dt = horizon - start;

    let mut best: Option<(f64, ContactFeature, DVec2)> = None;
    for (vertex_side, vertex_shape, edge_shape, motion) in [
        (Side::A, a.shape, b.shape, rel),
        (Side::B, b.shape, a.shape, negated(&rel)),
    ] {
        for (vertex, &local) in vertex_shape.points().iter().enumerate() {
            for (edge, segment) in edge_shape.segments().enumerate() {
                let Some((dt, normal)) = vertex_segment_root(local, &motion, segment, epsilon, max_dt)
                else { continue };

                if best.is_none_or(|(best_dt, ..)| dt < best_dt) {
                    let feature = ContactFeature { vertex_side, vertex, edge };
                    // Normal toward the vertex owner, flipped to point toward A
                    let normal = match vertex_side {
                        Side::A => normal,
                        Side::B => -normal,
                    };
                    best = Some((dt, feature, normal));
                }
            }
        }
    }

    let (dt, feature, normal) = best?;
    let time = start + dt;
    let vertex_body = match feature.vertex_side {
        Side::A => a,
        Side::B => b,
    };
    let segments = match feature.vertex_side {
        Side::A => (a.shape.segment_of_vertex(feature.vertex), feature.edge),
        Side::B => (feature.edge, b.shape.segment_of_vertex(feature.vertex)),
    };

    Some(Impact {
        time,
        delta_time: Positive::<f64>::new(dt).ok()?,
        point: vertex_body.vertex_at(feature.vertex, time),
        normal,
        feature,
        segments,
    })
}

fn negated(motion: &MotionState) -> MotionState {
    MotionState {
        epoch: motion.epoch,
        position: -motion.position,
        velocity: -motion.velocity,
        acceleration: -motion.acceleration,
    }
}

/// Vertex trajectory relative to the segment's owner, as a polynomial per axis
fn vertex_trajectory(local: DVec2, motion: &MotionState) -> [DVec2; 3] {
    [local + motion.position, motion.velocity, 0.5 * motion.acceleration]
}

/// First impact of a vertex following `motion` (relative to the segment's
/// owner) with `segment`, as a delay and the unit normal pointing toward the
/// side the vertex comes from
fn vertex_segment_root(
    local: DVec2,
    motion: &MotionState,
    segment: Segment,
    epsilon: f64,
    max_dt: f64,
) -> Option<(f64, DVec2)> {
    let dir = segment.direction();
    let normal = segment.normal()?;
    let [r0, r1, r2] = vertex_trajectory(local, motion);

    // dir x (r(t) - p), expanded per power of t
    let distance = Polynomial::quadratic(
        dir.perp_dot(r0 - segment.start),
        dir.perp_dot(r1),
        dir.perp_dot(r2),
    );
    let len = dir.length();
    if distance.is_identically_zero() || distance.coeffs().iter().all(|c| c.abs() <= CONTACT_SLOP * len) {
        // Sliding along the segment's line, never crossing it
        return None;
    }
    let speed = distance.derivative();

    distance.roots_in(epsilon, max_dt).into_iter()
        .filter(|&dt| {
            let point = r0 + r1 * dt + r2 * dt * dt;
            let param = segment.project(point);
            (-SEGMENT_SLACK..=1. + SEGMENT_SLACK).contains(&param)
        })
        .find_map(|dt| {
            let normal_speed = speed.eval(dt) / len;
            if normal_speed.abs() <= GRAZING_SPEED {
                return None;
            }
            // The vertex comes from the side opposite to where it is heading
            Some((dt, normal * -normal_speed.signum()))
        })
}

/// When a vertex resting on a segment slides past one of its ends.
///
/// `feature` is expressed for the pair `(a, b)`. Returns `None` if the vertex
/// never leaves the segment within the horizon.
pub fn contact_loss_time(a: Body, b: Body, feature: ContactFeature, from: f64, horizon: f64, epsilon: f64) -> Option<f64> {
    let start = from.max(a.motion.epoch).max(b.motion.epoch);
    let (vertex_body, edge_body) = match feature.vertex_side {
        Side::A => (a, b),
        Side::B => (b, a),
    };
    let motion = vertex_body.motion.relative_to(edge_body.motion, start);
    let segment = edge_body.shape.segment(feature.edge);
    let dir = segment.direction();
    let len2 = dir.length_squared();
    if len2 == 0. {
        return None;
    }

    let [r0, r1, r2] = vertex_trajectory(vertex_body.shape.points()[feature.vertex], &motion);
    let c0 = (r0 - segment.start).dot(dir) / len2;
    let c1 = r1.dot(dir) / len2;
    let c2 = r2.dot(dir) / len2;
    let max_dt = horizon - start;

    // Leaving through the start (param decreasing below 0) or through the
    // end (param increasing above 1)
    let through_start = Polynomial::quadratic(c0, c1, c2);
    let through_end = Polynomial::quadratic(c0 - 1., c1, c2);
    let leaving = |poly: Polynomial, outward: f64| {
        let speed = poly.derivative();
        poly.roots_in(epsilon, max_dt).into_iter()
            .find(|&dt| speed.eval(dt) * outward > 0.)
    };

    [leaving(through_start, -1.), leaving(through_end, 1.)]
        .into_iter()
        .flatten()
        .reduce(f64::min)
        .map(|dt| start + dt)
}

/// A vertex lying on a segment of the other body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub feature: ContactFeature,
    /// Unit normal on the left of the touched segment
    pub edge_normal: DVec2,
    /// Where the vertex lies along the segment, 0 at its start and 1 at its end
    pub param: f64,
}

/// Every vertex of one body lying within `tolerance` of a segment of the
/// other at time `at`, in the same order [`time_of_impact`] breaks ties with
pub fn touching_features(a: Body, b: Body, at: f64, tolerance: f64) -> Vec<Touch> {
    let mut touches = Vec::new();
    for (vertex_side, vertex_body, edge_body) in [(Side::A, a, b), (Side::B, b, a)] {
        for vertex in 0..vertex_body.shape.points().len() {
            let point = vertex_body.vertex_at(vertex, at);
            for edge in 0..edge_body.shape.segment_count() {
                let segment = edge_body.segment_at(edge, at);
                let Some(edge_normal) = segment.normal() else { continue };
                let param = segment.project(point);
                let distance = edge_normal.dot(point - segment.start).abs();
                if distance <= tolerance && (-SEGMENT_SLACK..=1. + SEGMENT_SLACK).contains(&param) {
                    touches.push(Touch {
                        feature: ContactFeature { vertex_side, vertex, edge },
                        edge_normal,
                        param,
                    });
                }
            }
        }
    }
    touches
}

/// Whether a touching vertex sits on an end of its segment and is moving past
/// it at time `at`
pub fn is_sliding_off(a: Body, b: Body, touch: &Touch, at: f64) -> bool {
    let (vertex_body, edge_body) = match touch.feature.vertex_side {
        Side::A => (a, b),
        Side::B => (b, a),
    };
    let dir = edge_body.shape.segment(touch.feature.edge).direction();
    let velocity = vertex_body.motion.velocity_at(at) - edge_body.motion.velocity_at(at);
    let acceleration = vertex_body.motion.acceleration - edge_body.motion.acceleration;
    let mut rate = velocity.dot(dir);
    if rate.abs() <= GRAZING_SPEED {
        rate = acceleration.dot(dir);
    }

    (touch.param <= SEGMENT_SLACK && rate < 0.) || (touch.param >= 1. - SEGMENT_SLACK && rate > 0.)
}
