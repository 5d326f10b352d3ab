use std::{f32::consts::PI, fmt, str::FromStr};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    config::{SimulationConfig, DEFAULT_DRAG_COEFFICIENT},
    core::body::Body,
    error::PhysicsError,
    utils::{
        allocator::Arena,
        math::{integrate_rotation, world_tensor},
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegratorKind {
    /// Integrates linear and angular momentum; velocity is derived.
    #[default]
    Momentum,
    /// Integrates velocity directly and adds quadratic air drag.
    Velocity,
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntegratorKind::Momentum => "momentum",
            IntegratorKind::Velocity => "velocity",
        })
    }
}

impl FromStr for IntegratorKind {
    type Err = PhysicsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "momentum" | "rigid" => Ok(IntegratorKind::Momentum),
            "velocity" | "simple" => Ok(IntegratorKind::Velocity),
            _ => Err(PhysicsError::UnknownStrategy {
                kind: "integrator",
                value: value.to_owned(),
            }),
        }
    }
}

/// Integrator responsible for stepping bodies forward by one sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    pub kind: IntegratorKind,
    pub gravity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub air_density: f32,
    pub drag_coefficient: f32,
}

impl Default for Integrator {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

impl Integrator {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            kind: config.integrator,
            gravity: config.gravity,
            linear_damping: config.linear_damping,
            angular_damping: config.angular_damping,
            air_density: config.air_density,
            drag_coefficient: DEFAULT_DRAG_COEFFICIENT,
        }
    }

    /// Advances every non-static, unpaused body by `dt`.
    pub fn step(&self, bodies: &mut Arena<Body>, dt: f32, parallel: bool) {
        #[cfg(feature = "parallel")]
        if parallel {
            bodies.par_for_each_mut(|body| self.integrate(body, dt));
            return;
        }
        #[cfg(not(feature = "parallel"))]
        let _ = parallel;

        for body in bodies.iter_mut() {
            self.integrate(body, dt);
        }
    }

    pub fn integrate(&self, body: &mut Body, dt: f32) {
        if body.is_static() || body.flags.paused || dt <= 0.0 {
            return;
        }
        match self.kind {
            IntegratorKind::Momentum => self.integrate_momentum(body, dt),
            IntegratorKind::Velocity => self.integrate_velocity(body, dt),
        }
        self.integrate_position(body, dt);
        expire_timed_forces(body, dt);
        body.external_force = Vec3::ZERO;
    }

    /// Total force and torque for this sub-step. Kinematic and resting
    /// bodies accumulate nothing.
    fn accumulate(&self, body: &Body, dt: f32) -> (Vec3, Vec3) {
        if !body.is_dynamic() || body.is_resting() {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        let (mut force, mut torque) = body
            .timed_forces
            .iter()
            .map(|timed| timed.sample(dt))
            .fold((Vec3::ZERO, Vec3::ZERO), |(f, t), (df, dtorque)| {
                (f + df, t + dtorque)
            });
        force += body.external_force;
        force += self.gravity * body.mass * body.gravity_multiplier;
        force += body.acceleration * body.mass;
        torque += world_tensor(body.inertia, body.transform.rotation) * body.angular_acceleration;
        (force, torque)
    }

    fn integrate_momentum(&self, body: &mut Body, dt: f32) {
        let (force, torque) = self.accumulate(body, dt);
        body.linear_momentum += force * dt;
        body.angular_momentum += torque * dt;
        if body.is_dynamic() {
            body.linear_momentum *= (-self.linear_damping * dt).exp();
            body.angular_momentum *= (-self.angular_damping * dt).exp();
        }
        body.refresh_velocity();
    }

    fn integrate_velocity(&self, body: &mut Body, dt: f32) {
        let (force, torque) = self.accumulate(body, dt);
        let mut linear = body.velocity.linear + force * body.inverse_mass * dt;
        let mut angular = body.velocity.angular + body.inverse_inertia_world * torque * dt;

        if body.is_dynamic() {
            let speed = linear.length();
            if speed > f32::EPSILON && body.inverse_mass > 0.0 {
                let area = PI * body.bounding_radius * body.bounding_radius;
                let drag = 0.5 * self.air_density * speed * speed * self.drag_coefficient * area;
                // Drag can stop a body but never reverse it.
                let slowed = (speed - drag * body.inverse_mass * dt).max(0.0);
                linear *= slowed / speed;
            }
            linear *= (-self.linear_damping * dt).exp();
            angular *= (-self.angular_damping * dt).exp();
        }

        body.velocity.linear = linear;
        body.velocity.angular = angular;
        body.linear_momentum = linear * body.mass;
        body.angular_momentum = world_tensor(body.inertia, body.transform.rotation) * angular;
    }

    fn integrate_position(&self, body: &mut Body, dt: f32) {
        body.transform.rotation = integrate_rotation(body.transform.rotation, body.velocity.angular, dt);
        body.transform.position += body.velocity.linear * dt;
        body.update_world_inertia();
        body.refresh_velocity();
        body.refresh_geometry();
    }
}

fn expire_timed_forces(body: &mut Body, dt: f32) {
    for timed in &mut body.timed_forces {
        timed.advance(dt);
    }
    body.timed_forces.retain(|timed| !timed.is_expired());
}
