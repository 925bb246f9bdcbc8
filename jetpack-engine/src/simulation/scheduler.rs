use std::collections::BTreeSet;

use glam::DVec2;
use itertools::Itertools;
use log::{ debug, error, info, trace, warn };
use ordered_float::OrderedFloat as OF;
use rayon::prelude::*;

use super::resting::{ classify_contact, ContactVerdict, RestingContact };
use crate::{
    default, is_sliding_off, resolve_collision, support_correction, time_of_impact, touching_features,
    cancel_normal_velocity, contact_loss_time, Capabilities, Clock, ContactBody, ContactFeature, Dependency,
    EngineConfig, EngineError, EventQueue, GameEvent, GameEventKind, Generation, Impact, InputEvent, Object,
    ObjectId, ResolveError, Result, Side, WallTime, WorldState,
};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum SchedulerState {
    #[default]
    Idle,
    /// Draining events up to `target`
    Stepping { target: f64 },
}

/// What happened during one call to [`Scheduler::advance_to`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub collisions: usize,
    pub contact_losses: usize,
    pub inputs: usize,
    /// Inputs aimed at objects that do not take any
    pub inputs_ignored: usize,
    /// Events popped after one of their objects changed
    pub stale_discarded: usize,
    pub degenerate_contacts: usize,
    /// Runs of zero-advance events cut short by forcing a resting contact
    pub instabilities: usize,
    pub resting_started: usize,
    pub resting_ended: usize,
    pub predictions: usize,
}

/// Reacts to input events, at the simulation time they map to
pub trait InputHandler {
    fn on_input(&mut self, event: &InputEvent, controls: &mut Controls<'_>) -> Result<()>;
}

impl<F> InputHandler for F
where
    F: FnMut(&InputEvent, &mut Controls<'_>) -> Result<()>,
{
    fn on_input(&mut self, event: &InputEvent, controls: &mut Controls<'_>) -> Result<()> {
        self(event, controls)
    }
}

/// What an [`InputHandler`] may do to the world while an input is processed
pub struct Controls<'a> {
    scheduler: &'a mut Scheduler,
}

impl Controls<'_> {
    /// Simulation time of the input being processed
    pub fn time(&self) -> f64 {
        self.scheduler.now
    }

    pub fn object(&self, id: ObjectId) -> Result<&Object> {
        self.scheduler.object(id)
    }

    pub fn set_velocity(&mut self, id: ObjectId, velocity: DVec2) -> Result<()> {
        self.scheduler.set_velocity(id, velocity)
    }

    pub fn set_position(&mut self, id: ObjectId, position: DVec2) -> Result<()> {
        self.scheduler.set_position(id, position)
    }

    pub fn set_acceleration(&mut self, id: ObjectId, acceleration: DVec2) -> Result<()> {
        self.scheduler.set_acceleration(id, acceleration)
    }

    pub fn add_acceleration(&mut self, id: ObjectId, delta: DVec2) -> Result<()> {
        self.scheduler.add_acceleration(id, delta)
    }

    pub fn reset(&mut self, id: ObjectId, position: DVec2, velocity: DVec2) -> Result<()> {
        self.scheduler.reset(id, position, velocity)
    }
}

/// Consecutive events of one pair that did not move time forward
#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    last: Option<(f64, [ObjectId; 2])>,
    stalled_pops: u32,
}

/// A pair found touching at the current time
#[derive(Debug, Clone, Copy)]
struct SimultaneousContact {
    pair: [ObjectId; 2],
    feature: ContactFeature,
    normal: DVec2,
}

/// Owns every object and drives the world from event to event.
///
/// Predictions live in the game queue, ordered by simulation time; inputs
/// live in the real-time queue, ordered by the wall-clock time they were
/// reported at and mapped to simulation time through the [`Clock`]. At equal
/// times inputs are applied before collisions.
pub struct Scheduler {
    config: EngineConfig,
    state: SchedulerState,
    now: f64,
    clock: Clock,
    objects: Vec<Object>,
    game_queue: EventQueue<GameEvent>,
    input_queue: EventQueue<InputEvent>,
    resting: Vec<RestingContact>,
    input_handler: Option<Box<dyn InputHandler>>,
    progress: Progress,
    report: StepReport,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("now", &self.now)
            .field("objects", &self.objects.len())
            .field("pending_collisions", &self.game_queue.len())
            .field("pending_inputs", &self.input_queue.len())
            .field("resting", &self.resting.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new(world: WorldState, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let start = world.start_time;
        let objects = world.objects.into_iter().enumerate()
            .map(|(idx, desc)| {
                desc.validate()?;
                Ok(Object::from_desc(ObjectId::new(idx), desc, start))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut scheduler = Self {
            clock: Clock::new(WallTime::default(), start, config.speed),
            config,
            state: default(),
            now: start,
            objects,
            game_queue: default(),
            input_queue: default(),
            resting: default(),
            input_handler: None,
            progress: default(),
            report: default(),
        };

        scheduler.settle_initial_contacts()?;
        let all = scheduler.objects.iter().map(|obj| obj.id).collect::<BTreeSet<_>>();
        scheduler.refresh(&all)?;
        scheduler.report = default();
        Ok(scheduler)
    }

    pub fn with_input_handler(mut self, handler: impl InputHandler + 'static) -> Self {
        self.input_handler = Some(Box::new(handler));
        self
    }

    pub fn set_input_handler(&mut self, handler: impl InputHandler + 'static) {
        self.input_handler = Some(Box::new(handler));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Simulation time the world was last advanced to
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Anchors the clock so that `wall` maps to the current simulation time
    pub fn sync_clock(&mut self, wall: WallTime) {
        self.clock = Clock::new(wall, self.now, self.config.speed);
    }

    pub fn set_speed(&mut self, speed: f64, at: WallTime) -> Result<()> {
        if !(speed > 0. && speed.is_finite()) {
            return Err(EngineError::InvalidConfig(format!("speed must be strictly positive, got {speed}")));
        }
        self.clock.set_speed(speed, at);
        self.config.speed = speed;
        Ok(())
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(id.idx()).ok_or_else(|| {
            error!("Reference to unknown object {id} ({} objects)", self.objects.len());
            EngineError::InvalidObjectReference(id)
        })
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        let len = self.objects.len();
        self.objects.get_mut(id.idx()).ok_or_else(|| {
            error!("Reference to unknown object {id} ({len} objects)");
            EngineError::InvalidObjectReference(id)
        })
    }

    pub fn resting_contacts(&self) -> &[RestingContact] {
        &self.resting
    }

    pub fn is_resting(&self, id: ObjectId) -> bool {
        self.resting.iter().any(|contact| contact.involves(id))
    }

    pub fn pending_collisions(&self) -> usize {
        self.game_queue.len()
    }

    pub fn pending_inputs(&self) -> usize {
        self.input_queue.len()
    }

    /// Predicted events depending on `id`
    pub fn events_for(&self, id: ObjectId) -> impl Iterator<Item = &GameEvent> + '_ {
        self.game_queue.events_for(id)
    }

    /// Time of the earliest pending collision or contact loss
    pub fn next_event_time(&mut self) -> Option<f64> {
        self.game_queue.peek_key().map(|OF(t)| t)
    }

    /// Position of `id` at time `t` for display purposes, without changing
    /// anything. Times before the object's current motion started are clamped.
    pub fn position_at(&self, id: ObjectId, t: f64) -> Result<DVec2> {
        let motion = self.object(id)?.motion;
        Ok(motion.position_at(t.max(motion.epoch)))
    }

    pub fn rendered_positions(&self, t: f64) -> Vec<(ObjectId, DVec2)> {
        self.objects.iter()
            .map(|obj| (obj.id, obj.motion.position_at(t.max(obj.motion.epoch))))
            .collect()
    }

    /// World-space outline of `id` at time `t`
    pub fn world_points(&self, id: ObjectId, t: f64) -> Result<Vec<DVec2>> {
        let position = self.position_at(id, t)?;
        Ok(self.object(id)?.shape.world_points(position).collect())
    }

    /// Queues an input to be applied once the simulation reaches the time its
    /// timestamp maps to
    pub fn submit_input(&mut self, event: InputEvent) {
        trace!("Queued input {:?} {:?} for {} at {}", event.key, event.state, event.target, event.timestamp);
        self.input_queue.insert(event);
    }

    pub fn advance_to_wall(&mut self, wall: WallTime) -> Result<StepReport> {
        let target = self.clock.to_sim(wall);
        self.advance_to(target)
    }

    /// Processes every event up to simulation time `target` in time order,
    /// then leaves the world at `target`.
    ///
    /// Only [`EngineError::InvalidObjectReference`] is reported; every other
    /// anomaly is handled and counted in the returned report.
    pub fn advance_to(&mut self, target: f64) -> Result<StepReport> {
        if target < self.now {
            warn!("Ignoring request to go back in time from {}s to {target}s", self.now);
            return Ok(default());
        }

        self.state = SchedulerState::Stepping { target };
        let result = self.drain(target);
        self.state = SchedulerState::Idle;
        let report = std::mem::take(&mut self.report);

        result?;
        self.now = target;
        Ok(report)
    }

    fn drain(&mut self, target: f64) -> Result<()> {
        loop {
            let now = self.now;
            let next_input = self.input_queue.peek_key()
                .map(|wall| self.clock.to_sim(wall).max(now));
            let next_game = self.game_queue.peek_key().map(|OF(t)| t);

            match (next_input, next_game) {
                (Some(input_t), game_t) if input_t <= target && game_t.is_none_or(|game_t| input_t <= game_t) => {
                    let Some(event) = self.input_queue.pop_earliest() else { break };
                    self.now = input_t;
                    self.handle_input(event)?;
                },
                (_, Some(game_t)) if game_t <= target => {
                    let Some(event) = self.game_queue.pop_earliest() else { break };
                    self.handle_game_event(event)?;
                },
                _ => break,
            }
        }
        Ok(())
    }

    fn handle_input(&mut self, event: InputEvent) -> Result<()> {
        if !self.object(event.target)?.capabilities.contains(Capabilities::RECEIVES_INPUT) {
            debug!("{} does not take inputs, dropping {:?} {:?}", event.target, event.key, event.state);
            self.report.inputs_ignored += 1;
            return Ok(());
        }
        self.report.inputs += 1;
        debug!("Input {:?} {:?} on {} at {}s", event.key, event.state, event.target, self.now);

        let Some(mut handler) = self.input_handler.take() else {
            debug!("No input handler, input dropped");
            return Ok(());
        };
        let result = handler.on_input(&event, &mut Controls { scheduler: self });
        self.input_handler = Some(handler);
        result
    }

    fn is_current(&self, dep: &Dependency) -> Result<bool> {
        Ok(self.object(dep.object)?.generation == dep.generation)
    }

    fn handle_game_event(&mut self, event: GameEvent) -> Result<()> {
        let [a, b] = event.pair;
        if !(self.is_current(&a)? && self.is_current(&b)?) {
            debug!("Discarding stale {event}");
            self.report.stale_discarded += 1;
            return Ok(());
        }

        debug!("Processing {event}");
        debug_assert!(event.time >= self.now);
        self.now = event.time;
        let stalled = self.track_progress(event.time, event.ids());

        match event.kind {
            GameEventKind::Collision(impact) => self.on_collision(event.ids(), impact, stalled),
            GameEventKind::ContactLoss(feature) => self.on_contact_loss(event.ids(), feature, stalled),
        }
    }

    /// Counts consecutive events of the same pair that do not move time
    /// forward, returns whether the limit is reached
    fn track_progress(&mut self, time: f64, mut pair: [ObjectId; 2]) -> bool {
        pair.sort();
        let stalled = self.progress.last
            .is_some_and(|(last, last_pair)| last_pair == pair && time - last <= self.config.epsilon);
        self.progress.last = Some((time, pair));
        if !stalled {
            self.progress.stalled_pops = 0;
            return false;
        }

        self.progress.stalled_pops += 1;
        if self.progress.stalled_pops < self.config.stagnation_limit {
            return false;
        }
        warn!(
            "No time progress for {} events between {} and {} at {time}s, forcing resting contact",
            self.progress.stalled_pops, pair[0], pair[1],
        );
        self.progress.stalled_pops = 0;
        self.report.instabilities += 1;
        true
    }

    fn on_collision(&mut self, [a, b]: [ObjectId; 2], impact: Impact, stalled: bool) -> Result<()> {
        self.report.collisions += 1;
        let mut changed = self.movable([a, b]);

        if stalled {
            self.force_rest([a, b], impact.feature, impact.normal)?;
            return self.refresh(&changed);
        }

        match self.bounce([a, b], impact.normal)? {
            Ok(()) => {
                self.settle(&mut changed)?;
                self.try_rest([a, b], impact.feature, impact.normal)?;
                let contact = SimultaneousContact { pair: [a, b], feature: impact.feature, normal: impact.normal };
                self.refresh_with(&changed, vec![contact])
            },
            Err(err) => {
                warn!("Skipping collision between {a} and {b}: {err}");
                self.report.degenerate_contacts += 1;
                self.refresh(&changed)
            },
        }
    }

    fn on_contact_loss(&mut self, [a, b]: [ObjectId; 2], feature: ContactFeature, stalled: bool) -> Result<()> {
        let Some(idx) = self.resting.iter()
            .position(|contact| contact.pair == [a, b] && contact.feature == feature)
        else {
            debug!("Contact between {a} and {b} already released");
            return Ok(());
        };
        let lost = self.resting.remove(idx);
        self.report.contact_losses += 1;
        self.report.resting_ended += 1;
        info!("{} slid off {}", self.vertex_owner(&lost), self.edge_owner(&lost));

        let mut changed = self.movable([a, b]);
        if !stalled {
            self.continue_contact(&lost)?;
        }
        self.settle(&mut changed)?;
        self.refresh(&changed)
    }

    fn vertex_owner(&self, contact: &RestingContact) -> ObjectId {
        match contact.feature.vertex_side {
            Side::A => contact.pair[0],
            Side::B => contact.pair[1],
        }
    }

    fn edge_owner(&self, contact: &RestingContact) -> ObjectId {
        match contact.feature.vertex_side {
            Side::A => contact.pair[1],
            Side::B => contact.pair[0],
        }
    }

    /// After a vertex slid off its segment, looks for another vertex-segment
    /// pair of the same two objects, on the same side, to keep the contact
    /// going (next segment of a slope, other corner of a box)
    fn continue_contact(&mut self, lost: &RestingContact) -> Result<()> {
        let [a, b] = lost.pair;
        let (obj_a, obj_b) = (self.object(a)?, self.object(b)?);
        let lost_edge_normal = match lost.feature.vertex_side {
            Side::A => obj_b.shape.segment(lost.feature.edge),
            Side::B => obj_a.shape.segment(lost.feature.edge),
        }.normal().unwrap_or(lost.toward_vertex());
        let side = lost.toward_vertex().dot(lost_edge_normal).signum();

        let candidates = touching_features(obj_a.body(), obj_b.body(), self.now, self.contact_tolerance())
            .into_iter()
            .filter(|touch| touch.feature.vertex_side == lost.feature.vertex_side && touch.feature != lost.feature)
            .filter(|touch| !is_sliding_off(obj_a.body(), obj_b.body(), touch, self.now))
            .collect_vec();

        for touch in candidates {
            let toward_vertex = touch.edge_normal * side;
            let normal = match touch.feature.vertex_side {
                Side::A => toward_vertex,
                Side::B => -toward_vertex,
            };
            if self.establish([a, b], touch.feature, normal)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// The objects among `ids` whose motion can change
    fn movable(&self, ids: impl IntoIterator<Item = ObjectId>) -> BTreeSet<ObjectId> {
        ids.into_iter()
            .filter(|id| self.objects.get(id.idx()).is_some_and(Object::can_move))
            .collect()
    }

    fn generations(&self, [a, b]: [ObjectId; 2]) -> Result<[Generation; 2]> {
        Ok([self.object(a)?.generation, self.object(b)?.generation])
    }

    fn contact_tolerance(&self) -> f64 {
        self.config.epsilon.max(1e-9)
    }

    fn contact_body(&self, id: ObjectId) -> Result<ContactBody> {
        let obj = self.object(id)?;
        Ok(ContactBody::new(
            obj.motion.velocity_at(self.now),
            self.effective_acceleration(obj),
            obj.inverse_mass(),
        ))
    }

    /// The object's own acceleration plus what its resting contacts add
    fn effective_acceleration(&self, obj: &Object) -> DVec2 {
        if !obj.can_move() {
            return DVec2::ZERO;
        }
        obj.base_acceleration + self.resting.iter()
            .filter(|contact| contact.corrected_object() == obj.id)
            .map(|contact| contact.correction)
            .fold(DVec2::ZERO, |acc, correction| acc + correction)
    }

    /// Restarts the object's motion at the current time with a new velocity
    /// and the current effective acceleration
    fn rebase(&mut self, id: ObjectId, velocity: DVec2) -> Result<()> {
        let now = self.now;
        let acceleration = self.effective_acceleration(self.object(id)?);
        let obj = self.object_mut(id)?;
        if !obj.can_move() {
            return Ok(());
        }
        let motion = obj.motion.extrapolate_to(now)
            .with_velocity(velocity)
            .with_acceleration(acceleration);
        obj.replace_motion(motion);
        Ok(())
    }

    fn pair_material(&self, [a, b]: [ObjectId; 2]) -> Result<(f64, f64)> {
        let (ma, mb) = (self.object(a)?.material, self.object(b)?.material);
        let bounciness = (self.config.bounciness * ma.bounciness * mb.bounciness).clamp(0., 1.);
        let friction = (self.config.friction * (ma.friction * mb.friction).sqrt()).clamp(0., 1.);
        Ok((bounciness, friction))
    }

    /// Applies the collision impulse between the two objects
    fn bounce(&mut self, [a, b]: [ObjectId; 2], normal: DVec2) -> Result<std::result::Result<(), ResolveError>> {
        let (bounciness, friction) = self.pair_material([a, b])?;
        let resolution = match resolve_collision(self.contact_body(a)?, self.contact_body(b)?, normal, bounciness, friction) {
            Ok(resolution) => resolution,
            Err(err) => return Ok(Err(err)),
        };
        trace!(
            "Impulse {} between {a} and {b}, velocities now {} and {}",
            resolution.normal_impulse, resolution.velocity_a, resolution.velocity_b,
        );
        self.rebase(a, resolution.velocity_a)?;
        self.rebase(b, resolution.velocity_b)?;
        Ok(Ok(()))
    }

    /// Starts a resting contact if the pair presses into each other with too
    /// little normal velocity to bounce. Returns whether it did.
    fn try_rest(&mut self, pair: [ObjectId; 2], feature: ContactFeature, normal: DVec2) -> Result<bool> {
        let (a, b) = (self.contact_body(pair[0])?, self.contact_body(pair[1])?);
        match classify_contact(a, b, normal, self.config.resting_threshold, self.config.epsilon) {
            Ok(ContactVerdict::Rest(Some((corrected, correction)))) => {
                self.start_resting(pair, feature, normal, corrected, correction)?;
                Ok(true)
            },
            Ok(_) => Ok(false),
            Err(err) => {
                warn!("Cannot rest {} on {}: {err}", pair[0], pair[1]);
                self.report.degenerate_contacts += 1;
                Ok(false)
            },
        }
    }

    fn start_resting(
        &mut self,
        pair: [ObjectId; 2],
        feature: ContactFeature,
        normal: DVec2,
        corrected: Side,
        correction: DVec2,
    ) -> Result<()> {
        let [a, b] = pair;
        let Ok(cancelled) = cancel_normal_velocity(self.contact_body(a)?, self.contact_body(b)?, normal) else {
            return Ok(());
        };
        let Some(normal) = normal.try_normalize() else { return Ok(()) };

        self.resting.push(RestingContact { pair, feature, normal, corrected, correction });
        self.rebase(a, cancelled.velocity_a)?;
        self.rebase(b, cancelled.velocity_b)?;
        self.report.resting_started += 1;
        info!("{a} now resting against {b} (normal {normal})");
        Ok(())
    }

    /// Resolves a contact found at the current time: bounce if approaching,
    /// then rest if slow enough. Returns whether the objects stay in contact.
    fn establish(&mut self, pair: [ObjectId; 2], feature: ContactFeature, normal: DVec2) -> Result<bool> {
        if self.resting.iter().any(|contact| contact.pair == pair && contact.feature == feature) {
            return Ok(true);
        }
        let (a, b) = (self.contact_body(pair[0])?, self.contact_body(pair[1])?);
        let verdict = match classify_contact(a, b, normal, self.config.resting_threshold, self.config.epsilon) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!("Dropping contact between {} and {}: {err}", pair[0], pair[1]);
                self.report.degenerate_contacts += 1;
                return Ok(false);
            },
        };

        match verdict {
            ContactVerdict::Impact => {
                self.report.collisions += 1;
                if let Err(err) = self.bounce(pair, normal)? {
                    warn!("Skipping collision between {} and {}: {err}", pair[0], pair[1]);
                    self.report.degenerate_contacts += 1;
                    return Ok(false);
                }
                self.try_rest(pair, feature, normal)?;
                Ok(true)
            },
            ContactVerdict::Rest(Some((corrected, correction))) => {
                self.start_resting(pair, feature, normal, corrected, correction)?;
                Ok(true)
            },
            ContactVerdict::Rest(None) | ContactVerdict::Separate => Ok(false),
        }
    }

    /// Stops iterating on a pair that keeps colliding without time moving
    /// forward: zero their normal relative velocity and hold them together
    fn force_rest(&mut self, pair: [ObjectId; 2], feature: ContactFeature, normal: DVec2) -> Result<()> {
        let [a, b] = pair;
        let (body_a, body_b) = (self.contact_body(a)?, self.contact_body(b)?);
        match support_correction(body_a, body_b, normal) {
            Ok(Some((corrected, correction))) => {
                self.start_resting(pair, feature, normal, corrected, correction)?;
            },
            Ok(None) => {
                if let Ok(cancelled) = cancel_normal_velocity(body_a, body_b, normal) {
                    self.rebase(a, cancelled.velocity_a)?;
                    self.rebase(b, cancelled.velocity_b)?;
                }
            },
            Err(err) => {
                warn!("Cannot hold {a} against {b}: {err}");
                self.report.degenerate_contacts += 1;
            },
        }
        Ok(())
    }

    /// Re-evaluates every resting contact involving one of `changed` after
    /// their motion changed. Objects whose motion changes in turn are added
    /// to `changed`.
    fn settle(&mut self, changed: &mut BTreeSet<ObjectId>) -> Result<()> {
        let (affected, kept) = std::mem::take(&mut self.resting).into_iter()
            .partition::<Vec<_>, _>(|contact| changed.iter().any(|&id| contact.involves(id)));
        self.resting = kept;

        for contact in affected {
            changed.extend(self.movable(contact.pair));
            // The contact's own correction is gone, so velocities are rebased
            // with the accelerations the pair has without it
            for id in contact.pair {
                let velocity = self.object(id)?.motion.velocity_at(self.now);
                self.rebase(id, velocity)?;
            }
            if !self.establish(contact.pair, contact.feature, contact.normal)? {
                self.report.resting_ended += 1;
                info!("{} released from {}", contact.pair[0], contact.pair[1]);
            }
            else {
                // Re-established contacts are not new ones
                self.report.resting_started = self.report.resting_started.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Objects created touching each other at rest start in resting contact
    fn settle_initial_contacts(&mut self) -> Result<()> {
        let tolerance = self.contact_tolerance();
        for (a, b) in (0..self.objects.len()).map(ObjectId::new).tuple_combinations() {
            let (obj_a, obj_b) = (self.object(a)?, self.object(b)?);
            if !obj_a.can_move() && !obj_b.can_move() {
                continue;
            }
            let touches = touching_features(obj_a.body(), obj_b.body(), self.now, tolerance);
            let (body_a, body_b) = (self.contact_body(a)?, self.contact_body(b)?);

            for touch in touches {
                // Velocity and acceleration of the vertex relative to the segment
                let (velocity, acceleration) = match touch.feature.vertex_side {
                    Side::A => (body_a.velocity - body_b.velocity, body_a.acceleration - body_b.acceleration),
                    Side::B => (body_b.velocity - body_a.velocity, body_b.acceleration - body_a.acceleration),
                };
                if velocity.dot(touch.edge_normal).abs() > tolerance {
                    continue;
                }
                let pressing = acceleration.dot(touch.edge_normal);
                if pressing == 0. {
                    continue;
                }
                let toward_vertex = -pressing.signum() * touch.edge_normal;
                let normal = match touch.feature.vertex_side {
                    Side::A => toward_vertex,
                    Side::B => -toward_vertex,
                };
                if self.establish([a, b], touch.feature, normal)? {
                    break;
                }
            }
        }
        Ok(())
    }

    fn refresh(&mut self, changed: &BTreeSet<ObjectId>) -> Result<()> {
        self.refresh_with(changed, Vec::new())
    }

    /// Drops the predictions of every movable object in `changed`, resolves
    /// the contacts they predicted for the current time, then rebases their
    /// motion and computes fresh predictions against the rest of the world.
    ///
    /// `contacts` touch at the current time already. A contact is resolved
    /// again whenever one of its objects changes, until none does.
    fn refresh_with(&mut self, changed: &BTreeSet<ObjectId>, mut contacts: Vec<SimultaneousContact>) -> Result<()> {
        let mut changed = self.movable(changed.iter().copied());
        let mut dirty = changed.clone();
        let due = self.now + self.config.epsilon;
        let mut sweeps = 0;

        loop {
            for &id in &dirty {
                let dropped = self.game_queue.invalidate_all_for(id);
                if !dropped.is_empty() {
                    trace!("Invalidated {} events of {id}", dropped.len());
                }
                // Positions are continuous, so a contact predicted for now
                // still holds whatever the new velocities
                contacts.extend(dropped.into_iter().filter_map(|event| match event.kind {
                    GameEventKind::Collision(impact) if event.time <= due => Some(SimultaneousContact {
                        pair: event.ids(),
                        feature: impact.feature,
                        normal: impact.normal,
                    }),
                    _ => None,
                }));
            }

            let active = contacts.iter()
                .filter(|contact| contact.pair.iter().any(|id| dirty.contains(id)))
                .copied()
                .collect_vec();
            dirty.clear();
            if active.is_empty() {
                break;
            }
            if sweeps == self.config.stagnation_limit {
                warn!("{} contacts at {}s still unresolved after {sweeps} passes", active.len(), self.now);
                self.report.instabilities += 1;
                break;
            }
            sweeps += 1;

            for contact in active {
                let before = self.generations(contact.pair)?;
                self.establish(contact.pair, contact.feature, contact.normal)?;
                if self.generations(contact.pair)? == before {
                    continue;
                }
                let mut touched = self.movable(contact.pair);
                self.settle(&mut touched)?;
                changed.extend(&touched);
                dirty.extend(touched);
            }
        }

        for &id in &changed {
            let velocity = self.object(id)?.motion.velocity_at(self.now);
            self.rebase(id, velocity)?;
        }

        let changed_ref = &changed;
        let pairs = changed.iter()
            .flat_map(|&id| {
                (0..self.objects.len()).map(ObjectId::new)
                    .filter(move |&other| other != id)
                    .filter(move |other| !changed_ref.contains(other) || id < *other)
                    .map(move |other| if id < other { (id, other) } else { (other, id) })
            })
            .sorted()
            .dedup()
            .collect_vec();

        let horizon = self.config.horizon_from(self.now);
        let (objects, now, epsilon) = (&self.objects, self.now, self.config.epsilon);
        let predict = |&(a, b): &(ObjectId, ObjectId)| predict_collision(objects, a, b, now, horizon, epsilon);
        let mut events = if self.config.parallel_prediction {
            pairs.par_iter().filter_map(predict).collect::<Vec<_>>()
        } else {
            pairs.iter().filter_map(predict).collect::<Vec<_>>()
        };

        events.extend(self.resting.iter()
            .filter(|contact| contact.pair.iter().any(|id| changed.contains(id)))
            .filter_map(|contact| predict_contact_loss(objects, contact, now, horizon, epsilon)));

        for event in events {
            trace!("Predicted {event}");
            self.report.predictions += 1;
            self.game_queue.insert(event);
        }
        Ok(())
    }

    fn apply_discontinuity(&mut self, id: ObjectId, release: bool, change: impl FnOnce(&mut Object, f64)) -> Result<()> {
        let now = self.now;
        let obj = self.object_mut(id)?;
        if !obj.can_move() {
            warn!("Ignoring motion change of immovable object {id}");
            return Ok(());
        }
        change(obj, now);

        let mut changed = BTreeSet::from([id]);
        if release {
            let before = self.resting.len();
            self.resting.retain(|contact| {
                if contact.involves(id) {
                    changed.extend(contact.pair);
                    false
                } else {
                    true
                }
            });
            self.report.resting_ended += before - self.resting.len();
        }
        let mut changed = self.movable(changed);
        self.settle(&mut changed)?;
        self.refresh(&changed)
    }

    // Discontinuities below apply at the current simulation time

    pub fn set_velocity(&mut self, id: ObjectId, velocity: DVec2) -> Result<()> {
        debug!("Setting velocity of {id} to {velocity} at {}s", self.now);
        self.apply_discontinuity(id, false, |obj, now| {
            obj.replace_motion(obj.motion.extrapolate_to(now).with_velocity(velocity));
        })
    }

    pub fn set_position(&mut self, id: ObjectId, position: DVec2) -> Result<()> {
        debug!("Moving {id} to {position} at {}s", self.now);
        self.apply_discontinuity(id, true, |obj, now| {
            obj.replace_motion(obj.motion.extrapolate_to(now).with_position(position));
        })
    }

    pub fn set_acceleration(&mut self, id: ObjectId, acceleration: DVec2) -> Result<()> {
        debug!("Setting acceleration of {id} to {acceleration} at {}s", self.now);
        self.apply_discontinuity(id, false, |obj, now| {
            obj.base_acceleration = acceleration;
            obj.replace_motion(obj.motion.extrapolate_to(now));
        })
    }

    /// Adds `delta` to the object's own acceleration, like a thrust starting
    /// (or stopping with the opposite delta)
    pub fn add_acceleration(&mut self, id: ObjectId, delta: DVec2) -> Result<()> {
        debug!("Adding acceleration {delta} to {id} at {}s", self.now);
        self.apply_discontinuity(id, false, |obj, now| {
            obj.base_acceleration += delta;
            obj.replace_motion(obj.motion.extrapolate_to(now));
        })
    }

    pub fn reset(&mut self, id: ObjectId, position: DVec2, velocity: DVec2) -> Result<()> {
        debug!("Resetting {id} to {position} at {}s", self.now);
        self.apply_discontinuity(id, true, |obj, now| {
            obj.replace_motion(obj.motion.extrapolate_to(now).with_position(position).with_velocity(velocity));
        })
    }
}

fn dependency(obj: &Object) -> Dependency {
    Dependency {
        object: obj.id,
        generation: obj.generation,
    }
}

fn predict_collision(objects: &[Object], a: ObjectId, b: ObjectId, now: f64, horizon: f64, epsilon: f64) -> Option<GameEvent> {
    let (obj_a, obj_b) = (objects.get(a.idx())?, objects.get(b.idx())?);
    if obj_a.motion.is_static() && obj_b.motion.is_static() {
        return None;
    }

    let impact = time_of_impact(obj_a.body(), obj_b.body(), now, horizon, epsilon)?;
    Some(GameEvent {
        time: impact.time,
        pair: [dependency(obj_a), dependency(obj_b)],
        kind: GameEventKind::Collision(impact),
    })
}

fn predict_contact_loss(objects: &[Object], contact: &RestingContact, now: f64, horizon: f64, epsilon: f64) -> Option<GameEvent> {
    let [a, b] = contact.pair;
    let (obj_a, obj_b) = (objects.get(a.idx())?, objects.get(b.idx())?);
    let time = contact_loss_time(obj_a.body(), obj_b.body(), contact.feature, now, horizon, epsilon)?;
    Some(GameEvent {
        time,
        pair: [dependency(obj_a), dependency(obj_b)],
        kind: GameEventKind::ContactLoss(contact.feature),
    })
}
