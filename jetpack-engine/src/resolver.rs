use glam::DVec2;
use thiserror::Error;

use crate::Side;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ResolveError {
    #[error("contact normal {0} cannot be normalized")]
    DegenerateContact(DVec2),
}

/// Kinematic state of one side of a contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactBody {
    pub velocity: DVec2,
    pub acceleration: DVec2,
    /// 0 for bodies collisions cannot move
    pub inverse_mass: f64,
}

impl ContactBody {
    pub fn new(velocity: DVec2, acceleration: DVec2, inverse_mass: f64) -> Self {
        Self { velocity, acceleration, inverse_mass }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub velocity_a: DVec2,
    pub velocity_b: DVec2,
    /// Magnitude of the impulse along the normal, 0 when nothing changed
    pub normal_impulse: f64,
}

fn unit_normal(normal: DVec2) -> Result<DVec2, ResolveError> {
    normal.try_normalize().ok_or(ResolveError::DegenerateContact(normal))
}

/// Post-impact velocities of two bodies touching along `normal`, pointing
/// from B toward A.
///
/// The normal impulse is split according to inverse masses and scaled by
/// `1 + bounciness`. `friction` is the fraction of the tangential relative
/// velocity removed by the impact. Bodies already separating are returned
/// unchanged.
pub fn resolve_collision(
    a: ContactBody,
    b: ContactBody,
    normal: DVec2,
    bounciness: f64,
    friction: f64,
) -> Result<Resolution, ResolveError> {
    let normal = unit_normal(normal)?;
    let unchanged = Resolution {
        velocity_a: a.velocity,
        velocity_b: b.velocity,
        normal_impulse: 0.,
    };

    let total_inverse_mass = a.inverse_mass + b.inverse_mass;
    let relative = a.velocity - b.velocity;
    let normal_speed = relative.dot(normal);
    if total_inverse_mass == 0. || normal_speed >= 0. {
        return Ok(unchanged);
    }

    let impulse = -(1. + bounciness) * normal_speed / total_inverse_mass;
    let tangential = relative - normal * normal_speed;
    let friction_impulse = -friction.clamp(0., 1.) * tangential / total_inverse_mass;
    let total = normal * impulse + friction_impulse;

    Ok(Resolution {
        velocity_a: a.velocity + total * a.inverse_mass,
        velocity_b: b.velocity - total * b.inverse_mass,
        normal_impulse: impulse,
    })
}

/// Removes the relative velocity along `normal` whatever its sign, keeping
/// the tangential part
pub fn cancel_normal_velocity(a: ContactBody, b: ContactBody, normal: DVec2) -> Result<Resolution, ResolveError> {
    let normal = unit_normal(normal)?;
    let total_inverse_mass = a.inverse_mass + b.inverse_mass;
    if total_inverse_mass == 0. {
        return Ok(Resolution {
            velocity_a: a.velocity,
            velocity_b: b.velocity,
            normal_impulse: 0.,
        });
    }

    let impulse = -(a.velocity - b.velocity).dot(normal) / total_inverse_mass;
    Ok(Resolution {
        velocity_a: a.velocity + normal * impulse * a.inverse_mass,
        velocity_b: b.velocity - normal * impulse * b.inverse_mass,
        normal_impulse: impulse,
    })
}

/// Acceleration to add to one of the bodies so that they stop accelerating
/// into each other along `normal`, or `None` if they are not.
///
/// The whole correction goes to a single body: the movable one pressing the
/// hardest into the contact, A on ties.
pub fn support_correction(a: ContactBody, b: ContactBody, normal: DVec2) -> Result<Option<(Side, DVec2)>, ResolveError> {
    let normal = unit_normal(normal)?;
    let normal_accel = (a.acceleration - b.acceleration).dot(normal);
    if normal_accel >= 0. {
        return Ok(None);
    }

    let pressing_a = -a.acceleration.dot(normal);
    let pressing_b = b.acceleration.dot(normal);
    let side = match (a.inverse_mass > 0., b.inverse_mass > 0.) {
        (false, false) => return Ok(None),
        (true, false) => Side::A,
        (false, true) => Side::B,
        (true, true) if pressing_b > pressing_a => Side::B,
        (true, true) => Side::A,
    };

    let correction = match side {
        Side::A => -normal * normal_accel,
        Side::B => normal * normal_accel,
    };
    Ok(Some((side, correction)))
}
