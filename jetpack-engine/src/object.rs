use std::fmt::Display;

use bitflags::bitflags;
use glam::DVec2;
use serde::{ Deserialize, Serialize };

use crate::{ Body, EngineError, MotionState, Result, Shape };

/// Identity of an object inside one world, its index in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(usize);

impl ObjectId {
    pub(crate) fn new(idx: usize) -> Self {
        Self(idx)
    }

    pub fn idx(self) -> usize {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bumped on every discontinuity of an object's motion; events remember the
/// generation they were computed from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

bitflags! {
    /// What an object is allowed to do
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// The object follows its motion state, otherwise it never leaves its
        /// initial position
        const CAN_MOVE = 0x01;
        /// Input events may target this object
        const RECEIVES_INPUT = 0x02;
        /// Collisions never change this object's velocity
        const INFINITE_MASS = 0x04;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Coefficient of restitution, 0 is sticky and 1 is elastic
    pub bounciness: f64,
    /// Damping of the tangential relative velocity on impact, 0 is
    /// frictionless and 1 removes it entirely
    pub friction: f64,
}

impl Material {
    pub fn new(bounciness: f64, friction: f64) -> Self {
        Self {
            bounciness,
            friction,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            bounciness: 1.,
            friction: 0.,
        }
    }
}

/// Everything needed to add an object to a world
#[derive(Debug, Clone)]
pub struct ObjectDesc {
    pub shape: Shape,
    pub position: DVec2,
    pub velocity: DVec2,
    pub acceleration: DVec2,
    pub mass: f64,
    pub material: Material,
    pub capabilities: Capabilities,
}

impl ObjectDesc {
    /// A movable object of finite mass
    pub fn dynamic(shape: Shape, mass: f64) -> Self {
        Self {
            shape,
            position: DVec2::ZERO,
            velocity: DVec2::ZERO,
            acceleration: DVec2::ZERO,
            mass,
            material: Material::default(),
            capabilities: Capabilities::CAN_MOVE,
        }
    }

    /// Static geometry with infinite mass
    pub fn terrain(shape: Shape) -> Self {
        Self {
            mass: f64::INFINITY,
            capabilities: Capabilities::INFINITE_MASS,
            ..Self::dynamic(shape, f64::INFINITY)
        }
    }

    pub fn with_position(self, position: DVec2) -> Self {
        Self { position, ..self }
    }

    pub fn with_velocity(self, velocity: DVec2) -> Self {
        Self { velocity, ..self }
    }

    pub fn with_acceleration(self, acceleration: DVec2) -> Self {
        Self { acceleration, ..self }
    }

    pub fn with_material(self, material: Material) -> Self {
        Self { material, ..self }
    }

    pub fn with_capabilities(self, capabilities: Capabilities) -> Self {
        Self { capabilities, ..self }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if !(self.mass > 0.) {
            return invalid(format!("mass must be strictly positive, got {}", self.mass));
        }
        if !(0. ..=1.).contains(&self.material.bounciness) {
            return invalid(format!("bounciness must be within 0..=1, got {}", self.material.bounciness));
        }
        if !(0. ..=1.).contains(&self.material.friction) {
            return invalid(format!("friction must be within 0..=1, got {}", self.material.friction));
        }
        if !(self.position.is_finite() && self.velocity.is_finite() && self.acceleration.is_finite()) {
            return invalid("initial motion must be finite".to_string());
        }
        if !self.capabilities.contains(Capabilities::CAN_MOVE)
            && (self.velocity != DVec2::ZERO || self.acceleration != DVec2::ZERO) {
            return invalid("an object that cannot move must start at rest".to_string());
        }

        Ok(())
    }
}

/// A simulated object, owned by the scheduler
#[derive(Debug, Clone)]
pub struct Object {
    pub(crate) id: ObjectId,
    pub(crate) shape: Shape,
    pub(crate) motion: MotionState,
    /// Acceleration requested from outside (gravity, thrust), before resting
    /// contacts cancel part of it
    pub(crate) base_acceleration: DVec2,
    pub(crate) mass: f64,
    pub(crate) material: Material,
    pub(crate) capabilities: Capabilities,
    pub(crate) generation: Generation,
}

impl Object {
    pub(crate) fn from_desc(id: ObjectId, desc: ObjectDesc, epoch: f64) -> Self {
        Self {
            id,
            motion: MotionState::new(epoch, desc.position, desc.velocity, desc.acceleration),
            base_acceleration: desc.acceleration,
            shape: desc.shape,
            mass: desc.mass,
            material: desc.material,
            capabilities: desc.capabilities,
            generation: Generation::default(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn body(&self) -> Body<'_> {
        Body::new(&self.shape, &self.motion)
    }

    pub fn base_acceleration(&self) -> DVec2 {
        self.base_acceleration
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn material(&self) -> Material {
        self.material
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn can_move(&self) -> bool {
        self.capabilities.contains(Capabilities::CAN_MOVE)
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.capabilities.contains(Capabilities::INFINITE_MASS) || !self.can_move() || self.mass.is_infinite() {
            0.
        } else {
            1. / self.mass
        }
    }

    /// Replaces the motion state and invalidates everything computed from the
    /// previous one
    pub(crate) fn replace_motion(&mut self, motion: MotionState) {
        debug_assert!(motion.epoch >= self.motion.epoch);
        self.motion = motion;
        self.generation = self.generation.next();
    }
}
