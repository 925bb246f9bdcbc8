use glam::DVec2;
use rand::{ Rng, SeedableRng };

use crate::{
    circle_polygon, Capabilities, Controls, InputEvent, InputHandler, KeyId, KeyState, Material,
    ObjectDesc, ObjectId, Result, Shape, WorldState,
};

pub trait Scene {
    fn name(&self) -> &'static str;
    fn create_world_state(&self) -> Result<WorldState>;

    fn default_max_time(&self) -> f64 {
        15.
    }
}

/// The jetpack level: a closed cave of terrain and a player standing near its
/// bottom-left corner
pub struct JetpackLevel;

impl JetpackLevel {
    pub const GRAVITY: DVec2 = DVec2::new(0., -200.);
    pub const PLAYER_START: DVec2 = DVec2::new(10., 20.);
    pub const PLAYER_SIZE: DVec2 = DVec2::new(32., 48.);

    pub fn terrain() -> Result<Shape> {
        Shape::open([
            (0., 0.), (500., 0.), (500., 100.), (1000., 100.), (1350., 0.), (1500., 0.),
            (1500., 500.), (1000., 500.), (150., 650.), (150., 1000.), (500., 1000.),
            (1000., 950.), (1000., 1150.), (0., 1150.), (0., 500.), (1000., 250.),
            (1350., 250.), (0., 250.),
        ].map(|(x, y)| DVec2::new(x, y)))
    }

    /// The player's outline, its position being its bottom-left corner
    pub fn player_shape() -> Result<Shape> {
        let DVec2 { x: w, y: h } = Self::PLAYER_SIZE;
        Shape::closed([DVec2::ZERO, DVec2::new(w, 0.), DVec2::new(w, h), DVec2::new(0., h)])
    }
}

impl Scene for JetpackLevel {
    fn name(&self) -> &'static str {
        "Jetpack level"
    }

    fn create_world_state(&self) -> Result<WorldState> {
        let mut world = WorldState::new();
        world.push_object(ObjectDesc::terrain(Self::terrain()?))?;
        world.push_object(ObjectDesc::dynamic(Self::player_shape()?, 1.)
            .with_position(Self::PLAYER_START)
            .with_acceleration(Self::GRAVITY)
            .with_material(Material::new(0.883, 0.2))
            .with_capabilities(Capabilities::CAN_MOVE | Capabilities::RECEIVES_INPUT)
        )?;
        Ok(world)
    }
}

/// Jetpack thrust bound to action keys: holding a key adds its thrust to the
/// player's acceleration, releasing it removes it
#[derive(Debug, Clone)]
pub struct JetpackThrust {
    pub bindings: Vec<(KeyId, DVec2)>,
    /// Key putting the player back at its starting point
    pub reset: Option<(KeyId, DVec2)>,
}

impl JetpackThrust {
    pub const UP: KeyId = KeyId(0);
    pub const LEFT: KeyId = KeyId(1);
    pub const RIGHT: KeyId = KeyId(2);
    pub const RESET: KeyId = KeyId(3);
}

impl Default for JetpackThrust {
    fn default() -> Self {
        Self {
            bindings: vec![
                (Self::UP, DVec2::new(0., 300.)),
                (Self::LEFT, DVec2::new(-200., 0.)),
                (Self::RIGHT, DVec2::new(200., 0.)),
            ],
            reset: Some((Self::RESET, JetpackLevel::PLAYER_START)),
        }
    }
}

impl InputHandler for JetpackThrust {
    fn on_input(&mut self, event: &InputEvent, controls: &mut Controls<'_>) -> Result<()> {
        if let Some((key, start)) = self.reset {
            if key == event.key {
                if event.state == KeyState::Pressed {
                    controls.reset(event.target, start, DVec2::ZERO)?;
                }
                return Ok(());
            }
        }

        let Some(&(_, thrust)) = self.bindings.iter().find(|(key, _)| *key == event.key) else {
            return Ok(());
        };
        match event.state {
            KeyState::Pressed => controls.add_acceleration(event.target, thrust),
            KeyState::Released => controls.add_acceleration(event.target, -thrust),
        }
    }
}

/// A single ball dropped on flat ground
pub struct BouncingBall {
    pub bounciness: f64,
}

impl BouncingBall {
    pub fn ball(world: &WorldState) -> ObjectId {
        ObjectId::new(world.objects().len() - 1)
    }
}

impl Scene for BouncingBall {
    fn name(&self) -> &'static str {
        "Bouncing ball"
    }

    fn create_world_state(&self) -> Result<WorldState> {
        let mut world = WorldState::new();
        world.push_object(ObjectDesc::terrain(Shape::open([DVec2::new(-50., 0.), DVec2::new(50., 0.)])?))?;
        world.push_object(ObjectDesc::dynamic(Shape::closed(circle_polygon(DVec2::ZERO, 1., 12))?, 1.)
            .with_position(DVec2::new(0., 10.))
            .with_acceleration(DVec2::new(0., -9.81))
            .with_material(Material::new(self.bounciness, 0.))
        )?;
        Ok(world)
    }
}

/// Two equal boxes thrown at each other
pub struct HeadOnCollision;

impl Scene for HeadOnCollision {
    fn name(&self) -> &'static str {
        "Head-on collision"
    }

    fn create_world_state(&self) -> Result<WorldState> {
        let mut world = WorldState::new();
        for (x, vx) in [(-10., 4.), (10., -4.)] {
            world.push_object(ObjectDesc::dynamic(crate::rect_shape(2., 2.)?, 1.)
                .with_position(DVec2::new(x, 0.))
                .with_velocity(DVec2::new(vx, 0.))
            )?;
        }
        Ok(world)
    }

    fn default_max_time(&self) -> f64 {
        5.
    }
}

/// Random polygons bouncing inside a closed box, without gravity
pub struct BouncingBox {
    pub seed: u64,
    pub name: &'static str,
}

impl Scene for BouncingBox {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create_world_state(&self) -> Result<WorldState> {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(self.seed);

        let mut world = WorldState::new();
        world.push_object(ObjectDesc::terrain(Shape::closed([
            DVec2::new(0., 0.), DVec2::new(100., 0.), DVec2::new(100., 100.), DVec2::new(0., 100.),
        ])?))?;
        // One ball per cell so that none start overlapping
        for cell in 0..9 {
            let center = DVec2::new(20. + 30. * (cell % 3) as f64, 20. + 30. * (cell / 3) as f64);
            let vel = DVec2::new(rng.random_range(-1. ..1.), rng.random_range(-1. ..1.))
                .try_normalize().unwrap_or(DVec2::X) * rng.random_range(3. .. 50.);
            let rad = rng.random_range(1. .. 3.);
            let sides = rng.random_range(5..10);

            world.push_object(ObjectDesc::dynamic(Shape::closed(circle_polygon(DVec2::ZERO, rad, sides))?, rad * rad)
                .with_position(center)
                .with_velocity(vel)
            )?;
        }
        Ok(world)
    }
}

pub fn get_all_scenes() -> Vec<Box<dyn Scene>> {
    vec![
        Box::new(JetpackLevel),
        Box::new(BouncingBall { bounciness: 0.5 }),
        Box::new(HeadOnCollision),
        Box::new(BouncingBox {
            seed: 4444,
            name: "Bouncing box 1",
        }),
        Box::new(BouncingBox {
            seed: 4445,
            name: "Bouncing box 2",
        }),
    ]
}
