use std::{ cell::RefCell, rc::Rc };

use approx::assert_relative_eq;
use glam::DVec2;
use jetpack_engine::{
    scenes::{ BouncingBall, BouncingBox, HeadOnCollision, Scene },
    Capabilities, Controls, EngineConfig, InputEvent, KeyId, KeyState, ObjectDesc, ObjectId, Scheduler, Shape, WallTime,
    WorldState,
};

const GRAVITY: DVec2 = DVec2::new(0., -10.);

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn flat_ground() -> ObjectDesc {
    ObjectDesc::terrain(Shape::open([DVec2::new(-100., 0.), DVec2::new(100., 0.)]).unwrap())
}

#[test]
fn falling_point_bounces_with_half_speed() {
    init_logs();
    let mut world = WorldState::new();
    world.push_object(flat_ground()).unwrap();
    let ball = world.push_object(ObjectDesc::dynamic(Shape::point(), 1.)
        .with_position(DVec2::new(0., 5.))
        .with_acceleration(GRAVITY)
    ).unwrap();
    let mut scheduler = world.simulate(EngineConfig { bounciness: 0.5, ..Default::default() }).unwrap();

    // 5 = 10 / 2 * t^2
    assert_relative_eq!(scheduler.next_event_time().unwrap(), 1., epsilon = 1e-12);

    let report = scheduler.advance_to(1.5).unwrap();
    assert_eq!(report.collisions, 1);
    let motion = *scheduler.object(ball).unwrap().motion();
    assert_relative_eq!(motion.velocity.y, 5., epsilon = 1e-9);

    // Apex of the second flight is at 5^2 / (2 * 10) = 1.25, below the start
    assert_relative_eq!(scheduler.position_at(ball, 1.5).unwrap().y, 1.25, epsilon = 1e-9);
    let second = scheduler.next_event_time().unwrap();
    assert_relative_eq!(second, 2., epsilon = 1e-9);

    scheduler.advance_to(2.25).unwrap();
    assert_relative_eq!(scheduler.object(ball).unwrap().motion().velocity.y, 2.5, epsilon = 1e-9);
}

#[test]
fn equal_masses_exchange_velocities() {
    init_logs();
    let world = HeadOnCollision.create_world_state().unwrap();
    let mut scheduler = world.simulate(EngineConfig::default()).unwrap();
    let [left, right] = [0, 1].map(|idx| scheduler.objects()[idx].id());

    // Gap of 18 closed at a relative speed of 8
    assert_relative_eq!(scheduler.next_event_time().unwrap(), 2.25, epsilon = 1e-12);
    let report = scheduler.advance_to(3.).unwrap();
    assert_eq!(report.collisions, 1);

    assert_relative_eq!(scheduler.object(left).unwrap().motion().velocity.x, -4., epsilon = 1e-12);
    assert_relative_eq!(scheduler.object(right).unwrap().motion().velocity.x, 4., epsilon = 1e-12);
    assert_relative_eq!(scheduler.position_at(left, 3.).unwrap().x, -1. - 3., epsilon = 1e-9);
}

fn wall_and_ball() -> (WorldState, ObjectId) {
    let mut world = WorldState::new();
    world.push_object(ObjectDesc::terrain(
        Shape::open([DVec2::new(1., -5.), DVec2::new(1., 5.)]).unwrap()
    )).unwrap();
    let ball = world.push_object(ObjectDesc::dynamic(Shape::point(), 1.)
        .with_velocity(DVec2::new(10., 0.))
        .with_capabilities(Capabilities::CAN_MOVE | Capabilities::RECEIVES_INPUT)
    ).unwrap();
    (world, ball)
}

#[test]
fn input_and_collision_at_the_same_time_apply_input_first() {
    init_logs();
    let (world, ball) = wall_and_ball();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let handler_seen = seen.clone();
    let mut scheduler = world.simulate(EngineConfig::default()).unwrap()
        .with_input_handler(move |event: &InputEvent, controls: &mut Controls<'_>| -> jetpack_engine::Result<()> {
            let obj = controls.object(event.target)?;
            handler_seen.borrow_mut().push((controls.time(), obj.motion().velocity_at(controls.time())));
            Ok(())
        });

    // The collision was predicted before the input was even submitted
    assert_eq!(scheduler.next_event_time(), Some(0.1));
    scheduler.submit_input(InputEvent {
        timestamp: WallTime(100),
        key: KeyId(7),
        state: KeyState::Pressed,
        target: ball,
    });

    let report = scheduler.advance_to(0.2).unwrap();
    assert_eq!(report.inputs, 1);
    assert_eq!(report.collisions, 1);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 0.1);
    // The ball had not bounced yet when the input was handled
    assert_eq!(seen[0].1, DVec2::new(10., 0.));
    assert_relative_eq!(scheduler.object(ball).unwrap().motion().velocity.x, -10.);
}

#[test]
fn input_before_collision_cancels_it() {
    init_logs();
    let (world, ball) = wall_and_ball();
    let mut scheduler = world.simulate(EngineConfig::default()).unwrap()
        .with_input_handler(|event: &InputEvent, controls: &mut Controls<'_>| {
            controls.set_velocity(event.target, DVec2::ZERO)
        });
    scheduler.submit_input(InputEvent {
        timestamp: WallTime(50),
        key: KeyId(0),
        state: KeyState::Pressed,
        target: ball,
    });

    let report = scheduler.advance_to(1.).unwrap();
    assert_eq!(report.inputs, 1);
    assert_eq!(report.collisions, 0);
    assert_relative_eq!(scheduler.position_at(ball, 1.).unwrap().x, 0.5, epsilon = 1e-12);
    assert_eq!(scheduler.pending_collisions(), 0);
}

#[test]
fn speed_multiplier_scales_wall_time() {
    init_logs();
    let (world, ball) = wall_and_ball();
    let mut scheduler = world.simulate(EngineConfig { speed: 0.5, ..Default::default() }).unwrap();

    // 100ms of wall time is 0.05s of simulation
    scheduler.advance_to_wall(WallTime(100)).unwrap();
    assert_relative_eq!(scheduler.now(), 0.05, epsilon = 1e-12);
    assert_relative_eq!(scheduler.position_at(ball, scheduler.now()).unwrap().x, 0.5, epsilon = 1e-12);

    scheduler.set_speed(2., WallTime(100)).unwrap();
    scheduler.advance_to_wall(WallTime(125)).unwrap();
    assert_relative_eq!(scheduler.now(), 0.1, epsilon = 1e-12);
}

#[test]
fn rendering_query_is_idempotent() {
    init_logs();
    let world = BouncingBox { seed: 1, name: "render" }.create_world_state().unwrap();
    let mut scheduler = world.simulate(EngineConfig::default()).unwrap();
    scheduler.advance_to(1.).unwrap();

    let first = scheduler.rendered_positions(1.25);
    let second = scheduler.rendered_positions(1.25);
    assert_eq!(first, second);
    // Querying does not move the world
    assert_eq!(scheduler.now(), 1.);
}

#[test]
fn ball_eventually_rests_on_the_ground() {
    init_logs();
    let scene = BouncingBall { bounciness: 0.5 };
    let world = scene.create_world_state().unwrap();
    let ball = BouncingBall::ball(&world);
    let mut scheduler = world.simulate(EngineConfig::default()).unwrap();

    let report = scheduler.advance_to(scene.default_max_time()).unwrap();
    assert!(report.collisions > 1);
    assert_eq!(report.instabilities, 0);
    assert!(scheduler.is_resting(ball));

    let lowest = scheduler.world_points(ball, scheduler.now()).unwrap().into_iter()
        .map(|p| p.y)
        .fold(f64::INFINITY, f64::min);
    assert_relative_eq!(lowest, 0., epsilon = 1e-6);
}

fn run_box(seed: u64, parallel: bool) -> (Vec<(ObjectId, DVec2)>, Vec<DVec2>) {
    let world = BouncingBox { seed, name: "determinism" }.create_world_state().unwrap();
    let config = EngineConfig { parallel_prediction: parallel, ..Default::default() };
    let mut scheduler = Scheduler::new(world, config).unwrap();
    for step in 1..=30 {
        scheduler.advance_to(step as f64 / 10.).unwrap();
    }
    let velocities = scheduler.objects().iter().map(|obj| obj.motion().velocity).collect();
    (scheduler.rendered_positions(3.), velocities)
}

#[test]
fn replays_are_identical() {
    init_logs();
    assert_eq!(run_box(4444, false), run_box(4444, false));
    assert_eq!(run_box(4444, false), run_box(4444, true));
}

#[test]
fn objects_stay_inside_the_box() {
    init_logs();
    let (positions, _) = run_box(4445, false);
    for (id, pos) in positions.into_iter().skip(1) {
        assert!((0. ..=100.).contains(&pos.x) && (0. ..=100.).contains(&pos.y), "{id} escaped to {pos}");
    }
}
