//! The simulation context.
//!
//! [`PhysicsWorld`] owns every body, both spatial indices and the command
//! queue. Each frame it drains the queue, then consumes fixed sub-steps:
//! integrate, reposition, broad phase, narrow phase, resolve.

pub mod commands;
pub mod runner;

use std::{collections::HashMap, time::Instant};

use glam::{Quat, Vec3};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    collision::{
        broadphase::{BroadPhase, IndexUpdate},
        narrowphase::NarrowPhase,
        queries::{Ray, Raycast, RaycastHit},
        record::CollisionRecord,
    },
    config::SimulationConfig,
    core::{
        aabb::Aabb,
        body::{Body, BodyDescriptor},
        types::PhysicsType,
    },
    dynamics::{
        contact::ContactGraph,
        forces::{Spring, TimedForce},
        integrator::Integrator,
        resolver::{self, ResolverKind},
    },
    error::{PhysicsError, ResolveError},
    utils::{
        allocator::{Arena, EntityId},
        logging::ScopedTimer,
        profiling::{PhysicsProfiler, StageTimer},
    },
};

use commands::{BodyHandle, BodyProperty, Command, CommandQueue, GlobalSetting};

/// Seed used by [`PhysicsWorld::new`].
pub const DEFAULT_SEED: u64 = 0x6d6f_6d65_6e74_756d;

/// Counters for the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub commands_applied: u32,
    pub commands_rejected: u32,
    pub substeps: u32,
    /// Whole sub-steps of accumulated time thrown away by the per-frame cap.
    pub discarded_substeps: u32,
    pub candidate_pairs: u32,
    pub collisions: u32,
    pub resolutions: u32,
    /// Pairs skipped because a body hit its per-frame resolution cap.
    pub capped_resolutions: u32,
    pub aborted_resolutions: u32,
    pub dropped_bodies: u32,
}

/// Read-only view of one body, published after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub handle: BodyHandle,
    pub physics_type: PhysicsType,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub bounds: Aabb,
    pub resting: bool,
    pub colliding: bool,
    pub paused: bool,
}

impl From<&Body> for BodyState {
    fn from(body: &Body) -> Self {
        Self {
            handle: body.handle,
            physics_type: body.physics_type,
            position: body.transform.position,
            rotation: body.transform.rotation,
            scale: body.transform.scale,
            linear_velocity: body.velocity.linear,
            angular_velocity: body.velocity.angular,
            bounds: body.bounds,
            resting: body.flags.resting,
            colliding: body.flags.colliding,
            paused: body.flags.paused,
        }
    }
}

/// Central simulation container orchestrating all subsystems.
pub struct PhysicsWorld {
    config: SimulationConfig,
    bodies: Arena<Body>,
    handles: HashMap<BodyHandle, EntityId>,
    statics: Vec<EntityId>,
    kinematics: Vec<EntityId>,
    dynamics: Vec<EntityId>,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    springs: Vec<Spring>,
    contacts: ContactGraph,
    rng: StdRng,
    commands: CommandQueue,
    accumulator: f32,
    tick: u64,
    last_collision: Option<CollisionRecord>,
    stats: StepStats,
    profiler: PhysicsProfiler,
    parallel_enabled: bool,
    moving: Vec<EntityId>,
    pairs: Vec<(EntityId, EntityId)>,
}

impl PhysicsWorld {
    pub fn new(config: SimulationConfig) -> Result<Self, PhysicsError> {
        Self::with_seed(config, DEFAULT_SEED)
    }

    /// Builds a world whose random choices are reproducible for `seed`.
    pub fn with_seed(config: SimulationConfig, seed: u64) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            broad_phase: BroadPhase::new(
                config.broad_phase,
                config.world_half_extent,
                config.sweep_bands,
            ),
            config,
            bodies: Arena::new(),
            handles: HashMap::new(),
            statics: Vec::new(),
            kinematics: Vec::new(),
            dynamics: Vec::new(),
            narrow_phase: NarrowPhase::new(),
            springs: Vec::new(),
            contacts: ContactGraph::new(),
            rng: StdRng::seed_from_u64(seed),
            commands: CommandQueue::new(),
            accumulator: 0.0,
            tick: 0,
            last_collision: None,
            stats: StepStats::default(),
            profiler: PhysicsProfiler::default(),
            parallel_enabled: false,
            moving: Vec::new(),
            pairs: Vec::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Producer handle onto this world's command queue.
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled;
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> &StepStats {
        &self.stats
    }

    pub fn profiler(&self) -> &PhysicsProfiler {
        &self.profiler
    }

    pub fn broad_phase(&self) -> &BroadPhase {
        &self.broad_phase
    }

    pub fn contacts(&self) -> &ContactGraph {
        &self.contacts
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    /// Most recent confirmed collision, kept across ticks until replaced.
    pub fn last_collision(&self) -> Option<&CollisionRecord> {
        self.last_collision.as_ref()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.handles.contains_key(&handle)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.handles.get(&handle).and_then(|&id| self.bodies.get(id))
    }

    pub fn body_by_id(&self, id: EntityId) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        self.body(handle).map(BodyState::from)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> + '_ {
        self.bodies.iter()
    }

    /// Bodies of one motion class, in registration order.
    pub fn bodies_of_type(&self, physics_type: PhysicsType) -> &[EntityId] {
        match physics_type {
            PhysicsType::Static => &self.statics,
            PhysicsType::Kinematic => &self.kinematics,
            PhysicsType::Dynamic => &self.dynamics,
        }
    }

    /// Hits along `ray`, nearest first.
    pub fn raycast(&self, ray: &Ray) -> Vec<RaycastHit> {
        Raycast::cast(ray, &self.bodies)
    }

    /// Bodies whose bounds overlap `region`, via the active spatial index.
    pub fn query_region(&self, region: &Aabb) -> Vec<BodyHandle> {
        let mut ids = Vec::new();
        self.broad_phase.query(region, &self.bodies, &mut ids);
        ids.into_iter()
            .filter_map(|id| self.bodies.get(id).map(|body| body.handle))
            .collect()
    }

    /// Registers a body immediately, bypassing the queue.
    pub fn register_body(&mut self, descriptor: BodyDescriptor) -> Result<BodyHandle, PhysicsError> {
        let handle = self.commands.reserve_handle();
        self.insert_body(handle, &descriptor)?;
        Ok(handle)
    }

    pub fn unregister_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let id = self.entity(handle)?;
        self.remove_body(id);
        Ok(())
    }

    /// Applies one command immediately.
    pub fn apply(&mut self, command: Command) -> Result<(), PhysicsError> {
        match command {
            Command::Register { handle, descriptor } => self.insert_body(handle, &descriptor),
            Command::Unregister(handle) => self.unregister_body(handle),
            Command::SetProperty { handles, property } => {
                self.for_each_handle(&handles, |world, id| world.set_property(id, &property))
            }
            Command::ApplyImpulse {
                handles,
                impulse,
                point,
                duration,
            } => {
                if !impulse.is_finite() || !point.is_finite() || !(duration >= 0.0) {
                    return Err(PhysicsError::InvalidSetting {
                        name: "impulse",
                        reason: format!("impulse {impulse}, duration {duration}"),
                    });
                }
                self.for_each_handle(&handles, |world, id| {
                    world.apply_impulse(id, impulse, point, duration);
                    Ok(())
                })
            }
            Command::CreateSpring {
                handles,
                constant,
                rest_length,
            } => self.create_springs(&handles, constant, rest_length),
            Command::SetGlobal(setting) => self.set_global(setting),
        }
    }

    pub fn set_global(&mut self, setting: GlobalSetting) -> Result<(), PhysicsError> {
        let mut next = self.config.clone();
        match setting {
            GlobalSetting::Gravity(gravity) => next.gravity = gravity,
            GlobalSetting::AirDensity(value) => next.air_density = value,
            GlobalSetting::DefaultDensity(value) => next.default_density = value,
            GlobalSetting::LinearDamping(value) => next.linear_damping = value,
            GlobalSetting::AngularDamping(value) => next.angular_damping = value,
            GlobalSetting::Integrator(kind) => next.integrator = kind,
            GlobalSetting::Resolver(kind) => next.resolver = kind,
            GlobalSetting::BroadPhase(kind) => next.broad_phase = kind,
            GlobalSetting::SimulationSpeed(value) => next.simulation_speed = value,
            GlobalSetting::Paused(paused) => next.paused = paused,
            GlobalSetting::MaxResolutionsPerBody(cap) => next.max_resolutions_per_body = cap,
        }
        next.validate()?;

        let switch_broad_phase = next.broad_phase != self.broad_phase.kind();
        let gravity_changed = next.gravity != self.config.gravity;
        self.config = next;
        if gravity_changed {
            self.contacts.clear();
            for body in self.bodies.iter_mut().filter(|body| body.is_resting()) {
                body.wake();
            }
        }
        if switch_broad_phase {
            let rejected = self.broad_phase.switch_to(self.config.broad_phase, &self.bodies);
            for id in rejected {
                self.drop_body(id, "outside the world bound after a broad-phase switch");
            }
        }
        Ok(())
    }

    /// Advances the world by `elapsed` seconds of wall time.
    pub fn step(&mut self, elapsed: f32) -> StepStats {
        let _frame = ScopedTimer::new("physics::frame");
        let frame_start = Instant::now();
        let mut profiler = PhysicsProfiler::default();
        self.stats = StepStats::default();

        {
            let _stage = StageTimer::new(&mut profiler.command_time);
            self.apply_pending_commands();
        }

        if !self.config.paused && elapsed.is_finite() && elapsed > 0.0 {
            for body in self.bodies.iter_mut() {
                body.resolutions_this_frame = 0;
            }
            self.accumulator += elapsed;
            let substep = self.config.substep;
            while self.accumulator >= substep {
                if self.stats.substeps >= self.config.max_substeps_per_frame {
                    let discarded = (self.accumulator / substep).floor();
                    self.stats.discarded_substeps = discarded as u32;
                    self.accumulator = (self.accumulator - discarded * substep).max(0.0);
                    log::debug!(
                        "frame hit the sub-step cap of {}; discarded {discarded} sub-steps",
                        self.config.max_substeps_per_frame
                    );
                    break;
                }
                self.accumulator -= substep;
                self.substep(self.config.scaled_substep(), &mut profiler);
                self.stats.substeps += 1;
            }
        }

        self.tick += 1;
        profiler.total_frame_time = frame_start.elapsed();
        profiler.report();
        self.profiler = profiler;
        self.stats
    }

    fn apply_pending_commands(&mut self) {
        for command in self.commands.drain() {
            match self.apply(command) {
                Ok(()) => self.stats.commands_applied += 1,
                Err(err) => {
                    self.stats.commands_rejected += 1;
                    log::warn!("command rejected: {err}");
                }
            }
        }
    }

    fn substep(&mut self, dt: f32, profiler: &mut PhysicsProfiler) {
        let _timer = ScopedTimer::new("physics::substep");
        for body in self.bodies.iter_mut() {
            body.flags.colliding = false;
        }

        {
            let _stage = StageTimer::new(&mut profiler.integrator_time);
            self.accumulate_springs();
            Integrator::from_config(&self.config).step(&mut self.bodies, dt, self.parallel_enabled);
        }

        self.moving.clear();
        self.moving.extend(self.kinematics.iter().chain(&self.dynamics).copied());

        {
            let _stage = StageTimer::new(&mut profiler.reposition_time);
            self.reposition();
        }

        self.pairs.clear();
        {
            let _stage = StageTimer::new(&mut profiler.broad_phase_time);
            self.broad_phase
                .candidate_pairs(&self.bodies, &self.moving, &mut self.pairs);
        }
        self.stats.candidate_pairs += self.pairs.len() as u32;

        let pairs = std::mem::take(&mut self.pairs);
        for &(id_a, id_b) in &pairs {
            let record = {
                let _stage = StageTimer::new(&mut profiler.narrow_phase_time);
                let (Some(a), Some(b)) = (self.bodies.get(id_a), self.bodies.get(id_b)) else {
                    continue;
                };
                if !needs_test(a, b) || !a.bounds.overlaps(&b.bounds) {
                    continue;
                }
                match self.narrow_phase.collide(a, b, &mut self.rng) {
                    Some(record) => record,
                    None => continue,
                }
            };
            self.stats.collisions += 1;

            let _stage = StageTimer::new(&mut profiler.resolver_time);
            self.resolve_pair(record);
        }
        self.pairs = pairs;
    }

    /// Spring forces for this sub-step, stored on each body.
    fn accumulate_springs(&mut self) {
        for spring in &self.springs {
            let force = match (self.bodies.get(spring.a), self.bodies.get(spring.b)) {
                (Some(a), Some(b)) => spring.force_on_a(a, b),
                _ => continue,
            };
            if let Some(a) = self.bodies.get_mut(spring.a) {
                a.external_force += force;
            }
            if let Some(b) = self.bodies.get_mut(spring.b) {
                b.external_force -= force;
            }
        }
    }

    fn reposition(&mut self) {
        let mut evicted = Vec::new();
        for &id in &self.moving {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            if self.broad_phase.update(body) == IndexUpdate::Evicted {
                evicted.push(id);
            }
        }
        for id in evicted {
            self.drop_body(id, "left the world bound");
        }
    }

    fn resolve_pair(&mut self, mut record: CollisionRecord) {
        let cap = self.config.max_resolutions_per_body;
        let kind: ResolverKind = self.config.resolver;
        let Some((a, b)) = self.bodies.get2_mut(record.body_a, record.body_b) else {
            return;
        };
        a.flags.colliding = true;
        b.flags.colliding = true;

        let over_cap = |body: &Body| {
            cap > 0 && body.responds_to_contacts() && body.resolutions_this_frame >= cap
        };
        if over_cap(a) || over_cap(b) {
            self.stats.capped_resolutions += 1;
            log::debug!(
                "resolution of {:?}/{:?} dropped: per-body cap of {cap} reached",
                a.handle,
                b.handle
            );
            self.last_collision = Some(record);
            return;
        }

        let was_resting = [(a.id, a.is_resting()), (b.id, b.is_resting())];
        match resolver::resolve(kind, a, b, &record) {
            Ok(resolution) => {
                record.resolved = true;
                self.stats.resolutions += 1;
                for body in [&mut *a, &mut *b] {
                    if body.responds_to_contacts() {
                        body.resolutions_this_frame += 1;
                    }
                }
                let woken: Vec<EntityId> = was_resting
                    .iter()
                    .filter(|&&(id, resting)| {
                        let now = if id == a.id { a.is_resting() } else { b.is_resting() };
                        resting && !now
                    })
                    .map(|&(id, _)| id)
                    .collect();
                if let Some((body, support)) = resolution.rested {
                    self.contacts.add(body, support);
                }
                for id in woken {
                    self.wake_cascade(id);
                }
            }
            Err(ResolveError::Immovable) => {
                log::trace!("{:?}/{:?} cannot move; left unresolved", a.handle, b.handle);
            }
            Err(err) => {
                self.stats.aborted_resolutions += 1;
                log::warn!("resolution of {:?}/{:?} aborted: {err}", a.handle, b.handle);
            }
        }
        self.last_collision = Some(record);
    }

    /// Wakes every body that rested, directly or transitively, on `id`.
    fn wake_cascade(&mut self, id: EntityId) {
        for other in self.contacts.disturb(id) {
            if let Some(body) = self.bodies.get_mut(other) {
                body.wake();
            }
        }
    }

    fn entity(&self, handle: BodyHandle) -> Result<EntityId, PhysicsError> {
        self.handles
            .get(&handle)
            .copied()
            .ok_or(PhysicsError::UnknownBody(handle))
    }

    /// Runs `op` for every known handle; unknown handles are reported but do
    /// not stop the others.
    fn for_each_handle(
        &mut self,
        handles: &[BodyHandle],
        mut op: impl FnMut(&mut Self, EntityId) -> Result<(), PhysicsError>,
    ) -> Result<(), PhysicsError> {
        let mut first_error = None;
        for &handle in handles {
            let result = self.entity(handle).and_then(|id| op(self, id));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn insert_body(&mut self, handle: BodyHandle, descriptor: &BodyDescriptor) -> Result<(), PhysicsError> {
        if self.handles.contains_key(&handle) {
            return Err(PhysicsError::AlreadyRegistered(handle));
        }
        descriptor
            .shape
            .validate()
            .map_err(|err| PhysicsError::InvalidGeometry {
                handle,
                reason: err.to_string(),
            })?;
        let scale = descriptor.transform.scale;
        if !scale.is_finite() || scale.abs().min_element() <= f32::EPSILON {
            return Err(PhysicsError::InvalidGeometry {
                handle,
                reason: format!("scale {scale} must be finite and non-zero on every axis"),
            });
        }
        let density = self.config.default_density;
        let id = self
            .bodies
            .insert_with(|id| Body::from_descriptor(id, handle, descriptor, density));
        let inserted = self
            .bodies
            .get(id)
            .is_some_and(|body| self.broad_phase.insert(body));
        if !inserted {
            self.bodies.remove(id);
            return Err(PhysicsError::OutOfBounds(handle));
        }
        self.handles.insert(handle, id);
        self.classify(id, descriptor.physics_type);
        log::trace!("registered {handle:?} as {id:?}");
        Ok(())
    }

    fn classify(&mut self, id: EntityId, physics_type: PhysicsType) {
        for list in [&mut self.statics, &mut self.kinematics, &mut self.dynamics] {
            list.retain(|&other| other != id);
        }
        match physics_type {
            PhysicsType::Static => self.statics.push(id),
            PhysicsType::Kinematic => self.kinematics.push(id),
            PhysicsType::Dynamic => self.dynamics.push(id),
        }
    }

    /// Removes a body from the index first, then from every other structure.
    fn remove_body(&mut self, id: EntityId) {
        self.broad_phase.remove(id);
        self.wake_cascade(id);
        self.springs.retain(|spring| !spring.involves(id));
        for list in [&mut self.statics, &mut self.kinematics, &mut self.dynamics] {
            list.retain(|&other| other != id);
        }
        self.moving.retain(|&other| other != id);
        if let Some(body) = self.bodies.remove(id) {
            self.handles.remove(&body.handle);
            if self
                .last_collision
                .as_ref()
                .is_some_and(|record| record.body_a == id || record.body_b == id)
            {
                self.last_collision = None;
            }
        }
    }

    fn drop_body(&mut self, id: EntityId, reason: &str) {
        let handle = self.bodies.get(id).map(|body| body.handle);
        log::warn!("dropping body {handle:?}: {reason}");
        self.stats.dropped_bodies += 1;
        self.remove_body(id);
    }

    fn set_property(&mut self, id: EntityId, property: &BodyProperty) -> Result<(), PhysicsError> {
        let Some(body) = self.bodies.get_mut(id) else {
            return Ok(());
        };
        let handle = body.handle;
        let was_resting = body.is_resting();
        let invalid = |name: &'static str, value: f32| PhysicsError::InvalidSetting {
            name,
            reason: format!("{value} for body {handle:?}"),
        };
        let mut geometry_changed = false;
        let mut reclassify = None;

        match property {
            BodyProperty::Position(position) if position.is_finite() => {
                body.set_position(*position);
                geometry_changed = true;
            }
            BodyProperty::Velocity(velocity) if velocity.is_finite() => {
                body.set_linear_velocity(*velocity)
            }
            BodyProperty::AngularVelocity(velocity) if velocity.is_finite() => {
                body.set_angular_velocity(*velocity)
            }
            BodyProperty::Scale(scale) if scale.is_finite() && scale.abs().min_element() > 0.0 => {
                body.set_scale(*scale);
                geometry_changed = true;
            }
            BodyProperty::Shape(shape) => {
                shape.validate().map_err(|err| PhysicsError::InvalidGeometry {
                    handle,
                    reason: err.to_string(),
                })?;
                body.set_shape(shape.clone());
                geometry_changed = true;
            }
            BodyProperty::PhysicsType(physics_type) => {
                body.set_physics_type(*physics_type);
                reclassify = Some(*physics_type);
            }
            BodyProperty::Filter(filter) => {
                body.filter = *filter;
                reclassify = Some(body.physics_type);
            }
            BodyProperty::Restitution(value) if value.is_finite() && *value >= 0.0 => {
                body.material.restitution = value.min(1.0)
            }
            BodyProperty::Friction(value) if value.is_finite() && *value >= 0.0 => {
                body.material.friction = *value
            }
            BodyProperty::GravityMultiplier(value) if value.is_finite() => {
                body.gravity_multiplier = *value;
                body.wake();
            }
            BodyProperty::Mass(value) if value.is_finite() && *value > 0.0 => {
                body.set_mass(*value)
            }
            BodyProperty::Paused(paused) => body.flags.paused = *paused,
            BodyProperty::Position(_) | BodyProperty::Velocity(_) | BodyProperty::AngularVelocity(_) => {
                return Err(invalid("vector property", f32::NAN));
            }
            BodyProperty::Scale(scale) => return Err(invalid("scale", scale.min_element())),
            BodyProperty::Restitution(value) => return Err(invalid("restitution", *value)),
            BodyProperty::Friction(value) => return Err(invalid("friction", *value)),
            BodyProperty::GravityMultiplier(value) => {
                return Err(invalid("gravity_multiplier", *value))
            }
            BodyProperty::Mass(value) => return Err(invalid("mass", *value)),
        }
        let now_resting = body.is_resting();

        if let Some(physics_type) = reclassify {
            self.classify(id, physics_type);
            if let Some(body) = self.bodies.get(id) {
                self.broad_phase.refresh_filter(body);
            }
        }
        if geometry_changed {
            let evicted = self
                .bodies
                .get(id)
                .is_some_and(|body| self.broad_phase.update(body) == IndexUpdate::Evicted);
            if evicted {
                self.drop_body(id, "moved outside the world bound");
                return Err(PhysicsError::OutOfBounds(handle));
            }
        }
        // Anything resting on a body that moved, reshaped or changed type has lost its support.
        if geometry_changed || reclassify.is_some() || (was_resting && !now_resting) {
            self.wake_cascade(id);
        }
        Ok(())
    }

    fn apply_impulse(&mut self, id: EntityId, impulse: Vec3, point: Vec3, duration: f32) {
        let Some(body) = self.bodies.get_mut(id) else {
            return;
        };
        let was_resting = body.is_resting();
        if duration > 0.0 {
            let arm = point - body.transform.position;
            body.add_timed_force(TimedForce::from_impulse(impulse, arm, duration));
        } else {
            body.apply_impulse(impulse, point);
        }
        if was_resting && !body.is_resting() {
            self.wake_cascade(id);
        }
    }

    fn create_springs(
        &mut self,
        handles: &[BodyHandle],
        constant: f32,
        rest_length: Option<f32>,
    ) -> Result<(), PhysicsError> {
        if !constant.is_finite() || constant < 0.0 {
            return Err(PhysicsError::InvalidSetting {
                name: "spring_constant",
                reason: format!("expected a finite non-negative value, got {constant}"),
            });
        }
        if let Some(length) = rest_length.filter(|length| !length.is_finite() || *length < 0.0) {
            return Err(PhysicsError::InvalidSetting {
                name: "rest_length",
                reason: format!("expected a finite non-negative value, got {length}"),
            });
        }
        let ids = handles
            .iter()
            .map(|&handle| self.entity(handle))
            .collect::<Result<Vec<_>, _>>()?;
        for pair in ids.windows(2) {
            let (Some(a), Some(b)) = (self.bodies.get(pair[0]), self.bodies.get(pair[1])) else {
                continue;
            };
            let length = rest_length
                .unwrap_or_else(|| a.transform.position.distance(b.transform.position));
            self.springs.push(Spring::new(pair[0], pair[1], constant, length));
            for id in [pair[0], pair[1]] {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.wake();
                }
                self.wake_cascade(id);
            }
        }
        Ok(())
    }
}

/// A pair needs an exact test only when at least one side can be moved by it
/// and is awake, or is kinematic and may push into the other.
fn needs_test(a: &Body, b: &Body) -> bool {
    let active = |body: &Body| body.is_kinematic() || (body.is_dynamic() && !body.is_resting());
    active(a) || active(b)
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.bodies.len())
            .field("broad_phase", &self.broad_phase.kind())
            .field("tick", &self.tick)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::Shape;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(SimulationConfig::default()).expect("valid config")
    }

    #[test]
    fn double_register_is_rejected_and_harmless() {
        let mut world = world();
        let queue = world.commands();
        let handle = queue.register(BodyDescriptor::new(Shape::sphere(1.0)));
        queue.push(Command::Register {
            handle,
            descriptor: BodyDescriptor::new(Shape::sphere(2.0)),
        });
        let stats = world.step(0.0);
        assert_eq!(stats.commands_applied, 1);
        assert_eq!(stats.commands_rejected, 1);
        assert_eq!(world.len(), 1);
        assert_eq!(world.broad_phase().len(), 1);
    }

    #[test]
    fn queued_explicit_handle_does_not_collide_with_register_body() {
        let mut world = world();
        world.commands().push(Command::Register {
            handle: BodyHandle(50),
            descriptor: BodyDescriptor::new(Shape::sphere(1.0)),
        });
        world.step(0.0);
        let next = world
            .register_body(BodyDescriptor::new(Shape::sphere(1.0)).with_position(Vec3::X * 5.0))
            .expect("fresh handle");
        assert!(next.0 > 50);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn invalid_global_setting_is_a_no_op() {
        let mut world = world();
        let before = world.config().gravity;
        assert!(world.set_global(GlobalSetting::Gravity(Vec3::NAN)).is_err());
        assert!(world.set_global(GlobalSetting::SimulationSpeed(0.0)).is_err());
        assert_eq!(world.config().gravity, before);
        assert_eq!(world.config().simulation_speed, 1.0);
    }

    #[test]
    fn substep_cap_discards_backlog() {
        let mut world = world();
        let stats = world.step(1.0);
        assert_eq!(stats.substeps, world.config().max_substeps_per_frame);
        assert!(stats.discarded_substeps > 0);
        assert!(world.accumulator < world.config().substep);
    }

    #[test]
    fn pause_keeps_applying_commands() {
        let mut world = world();
        world.set_global(GlobalSetting::Paused(true)).expect("valid");
        let handle = world.commands().register(BodyDescriptor::new(Shape::sphere(0.5)));
        let stats = world.step(0.1);
        assert_eq!(stats.substeps, 0);
        assert_eq!(world.body_state(handle).map(|state| state.position), Some(Vec3::ZERO));
    }

    #[test]
    fn body_leaving_world_is_dropped() {
        let config = SimulationConfig::default().with_world_half_extent(10.0);
        let mut world = PhysicsWorld::new(config).expect("valid config");
        let handle = world
            .register_body(
                BodyDescriptor::new(Shape::sphere(0.5))
                    .with_position(Vec3::new(9.0, 0.0, 0.0))
                    .with_velocity(Vec3::new(100.0, 0.0, 0.0))
                    .with_gravity_multiplier(0.0),
            )
            .expect("registered");
        let stats = world.step(0.05);
        assert_eq!(stats.dropped_bodies, 1);
        assert!(!world.contains(handle));
        assert!(world.broad_phase().is_empty());
    }
}
