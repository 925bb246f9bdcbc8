use glam::DVec2;
use proptest::prelude::*;

use jetpack_engine::{
    rect_shape, resolve_collision, scenes::{ BouncingBox, Scene }, time_of_impact, Body, ContactBody, EngineConfig,
    MotionState, Scheduler,
};

const HORIZON: f64 = 10.;

fn vec2(range: f64) -> impl Strategy<Value = DVec2> {
    (-range..range, -range..range).prop_map(|(x, y)| DVec2::new(x, y))
}

/// Two unit squares starting well apart
fn disjoint_pair() -> impl Strategy<Value = (MotionState, MotionState)> {
    (vec2(5.), vec2(2.), 3f64..10., 0f64..std::f64::consts::TAU, vec2(5.), vec2(2.))
        .prop_map(|(va, aa, dist, angle, vb, ab)| {
            let b_start = DVec2::from_angle(angle) * dist;
            (MotionState::new(0., DVec2::ZERO, va, aa), MotionState::new(0., b_start, vb, ab))
        })
}

/// Two axis-aligned unit squares share a point once their centers are at
/// most 1 apart on both axes
fn touching(a: &MotionState, b: &MotionState, t: f64, tolerance: f64) -> bool {
    let offset = (a.position_at(t) - b.position_at(t)).abs();
    offset.max_element() <= 1. + tolerance
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn impact_is_the_first_contact((a, b) in disjoint_pair()) {
        let square = rect_shape(1., 1.).unwrap();
        let impact = time_of_impact(Body::new(&square, &a), Body::new(&square, &b), 0., HORIZON, 1e-9);

        match impact {
            Some(impact) => {
                prop_assert!(impact.time > 0. && impact.time <= HORIZON);
                prop_assert!(touching(&a, &b, impact.time, 1e-6), "not touching at {}", impact.time);
                for k in 0..20 {
                    let t = impact.time * k as f64 / 20.;
                    prop_assert!(!touching(&a, &b, t, 0.), "already touching at {t} before {}", impact.time);
                }
                prop_assert!((impact.normal.length() - 1.).abs() < 1e-9);
            }
            None => {
                for k in 0..=200 {
                    let t = HORIZON * k as f64 / 200.;
                    prop_assert!(!touching(&a, &b, t, 0.), "missed a contact at {t}");
                }
            }
        }
    }

    #[test]
    fn collisions_conserve_momentum(
        va in vec2(10.),
        vb in vec2(10.),
        mass_a in 0.1f64..10.,
        mass_b in 0.1f64..10.,
        angle in 0f64..std::f64::consts::TAU,
        bounciness in 0f64..=1.,
    ) {
        let normal = DVec2::from_angle(angle);
        let a = ContactBody::new(va, DVec2::ZERO, 1. / mass_a);
        let b = ContactBody::new(vb, DVec2::ZERO, 1. / mass_b);
        let res = resolve_collision(a, b, normal, bounciness, 0.).unwrap();

        let before = va * mass_a + vb * mass_b;
        let after = res.velocity_a * mass_a + res.velocity_b * mass_b;
        prop_assert!((before - after).length() < 1e-9 * (1. + before.length()));

        let approach = (va - vb).dot(normal);
        let leave = (res.velocity_a - res.velocity_b).dot(normal);
        if approach < 0. {
            prop_assert!((leave + bounciness * approach).abs() < 1e-9 * (1. + approach.abs()));
        }
        else {
            prop_assert_eq!((res.velocity_a, res.velocity_b), (va, vb));
        }
    }

    #[test]
    fn motion_changes_drop_stale_predictions(
        changes in prop::collection::vec((1usize..10, vec2(40.), 0.01f64..0.5), 1..12),
    ) {
        let world = BouncingBox { seed: 7, name: "invalidation" }.create_world_state().unwrap();
        let mut scheduler = Scheduler::new(world, EngineConfig::default()).unwrap();

        for (idx, velocity, dt) in changes {
            let id = scheduler.objects()[idx].id();
            scheduler.set_velocity(id, velocity).unwrap();

            let generation = scheduler.object(id).unwrap().generation();
            for event in scheduler.events_for(id) {
                let dep = event.pair.iter().find(|dep| dep.object == id).unwrap();
                prop_assert_eq!(dep.generation, generation);
                prop_assert!(event.time >= scheduler.now());
            }

            let target = scheduler.now() + dt;
            scheduler.advance_to(target).unwrap();
        }
    }

    #[test]
    fn replays_do_not_depend_on_threads(seed in 0u64..1000) {
        let run = |parallel| {
            let world = BouncingBox { seed, name: "replay" }.create_world_state().unwrap();
            let config = EngineConfig { parallel_prediction: parallel, ..Default::default() };
            let mut scheduler = Scheduler::new(world, config).unwrap();
            let report = scheduler.advance_to(2.).unwrap();
            (report, scheduler.rendered_positions(2.))
        };
        prop_assert_eq!(run(false), run(true));
    }
}
