use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    aabb::Aabb,
    shape::Shape,
    types::{CollisionFilter, Material, PhysicsType, Transform, Velocity},
};
use crate::{
    dynamics::forces::TimedForce,
    utils::{allocator::EntityId, math::world_tensor},
    world::commands::BodyHandle,
};

/// Mass used for shapes without volume when no mass is given.
const FALLBACK_MASS: f32 = 1.0;

/// Everything a producer supplies to register a body. Missing mass and
/// material are filled in from the world defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDescriptor {
    pub shape: Shape,
    pub physics_type: PhysicsType,
    pub transform: Transform,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub acceleration: Vec3,
    pub angular_acceleration: Vec3,
    pub mass: Option<f32>,
    pub material: Option<Material>,
    pub gravity_multiplier: Option<f32>,
    pub filter: CollisionFilter,
}

impl BodyDescriptor {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            ..Self::default()
        }
    }

    pub fn fixed(shape: Shape) -> Self {
        Self::new(shape).with_physics_type(PhysicsType::Static)
    }

    pub fn with_physics_type(mut self, physics_type: PhysicsType) -> Self {
        self.physics_type = physics_type;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.transform.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_gravity_multiplier(mut self, multiplier: f32) -> Self {
        self.gravity_multiplier = Some(multiplier);
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyFlags {
    /// Zero velocity, gravity-exempt until perturbed.
    pub resting: bool,
    /// Took part in a confirmed collision during the last sub-step.
    pub colliding: bool,
    /// Skipped by the integrator but still collidable.
    pub paused: bool,
}

/// Simulated rigid body. Momentum is the primary state; velocity is derived
/// after every change.
#[derive(Debug, Clone)]
pub struct Body {
    pub id: EntityId,
    pub handle: BodyHandle,
    pub physics_type: PhysicsType,
    pub shape: Shape,
    pub transform: Transform,
    pub mass: f32,
    pub inverse_mass: f32,
    pub inertia: Mat3,
    pub inverse_inertia_body: Mat3,
    pub inverse_inertia_world: Mat3,
    pub linear_momentum: Vec3,
    pub angular_momentum: Vec3,
    pub velocity: Velocity,
    pub acceleration: Vec3,
    pub angular_acceleration: Vec3,
    pub material: Material,
    pub gravity_multiplier: f32,
    pub filter: CollisionFilter,
    pub flags: BodyFlags,
    pub bounding_radius: f32,
    pub bounds: Aabb,
    pub timed_forces: Vec<TimedForce>,
    /// Spring forces gathered for the current sub-step.
    pub external_force: Vec3,
    pub resolutions_this_frame: u32,
}

impl Body {
    /// Builds a body from `descriptor`, deriving mass from `default_density`
    /// when neither a mass nor a material is given.
    pub fn from_descriptor(
        id: EntityId,
        handle: BodyHandle,
        descriptor: &BodyDescriptor,
        default_density: f32,
    ) -> Self {
        let material = descriptor.material.unwrap_or(Material {
            density: default_density,
            ..Material::default()
        });
        let mut body = Self {
            id,
            handle,
            physics_type: descriptor.physics_type,
            shape: descriptor.shape.clone(),
            transform: descriptor.transform,
            mass: FALLBACK_MASS,
            inverse_mass: 0.0,
            inertia: Mat3::IDENTITY,
            inverse_inertia_body: Mat3::ZERO,
            inverse_inertia_world: Mat3::ZERO,
            linear_momentum: Vec3::ZERO,
            angular_momentum: Vec3::ZERO,
            velocity: Velocity::default(),
            acceleration: descriptor.acceleration,
            angular_acceleration: descriptor.angular_acceleration,
            material,
            gravity_multiplier: descriptor.gravity_multiplier.unwrap_or(1.0),
            filter: descriptor.filter,
            flags: BodyFlags::default(),
            bounding_radius: 0.0,
            bounds: Aabb::empty(),
            timed_forces: Vec::new(),
            external_force: Vec3::ZERO,
            resolutions_this_frame: 0,
        };
        let mass = descriptor.mass.unwrap_or_else(|| body.derived_mass());
        body.set_mass(mass);
        body.refresh_geometry();
        body.set_linear_velocity(descriptor.linear_velocity);
        body.set_angular_velocity(descriptor.angular_velocity);
        body
    }

    pub fn is_static(&self) -> bool {
        self.physics_type == PhysicsType::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.physics_type == PhysicsType::Kinematic
    }

    pub fn is_dynamic(&self) -> bool {
        self.physics_type == PhysicsType::Dynamic
    }

    /// Whether resolution may change this body's momentum or position.
    pub fn responds_to_contacts(&self) -> bool {
        self.is_dynamic()
    }

    pub fn is_resting(&self) -> bool {
        self.flags.resting
    }

    /// Mass implied by the material density and shape volume.
    pub fn derived_mass(&self) -> f32 {
        let scale = self.transform.scale.abs();
        let volume = self.shape.volume() * scale.x * scale.y * scale.z;
        let mass = self.material.density * volume;
        if mass.is_finite() && mass > f32::EPSILON {
            mass
        } else {
            FALLBACK_MASS
        }
    }

    /// Sets mass and inertia from the shape; static bodies keep zero inverses.
    pub fn set_mass(&mut self, mass: f32) {
        let mass = if mass.is_finite() && mass > f32::EPSILON {
            mass
        } else {
            FALLBACK_MASS
        };
        let properties = self.shape.mass_properties(mass, self.transform.scale);
        self.mass = mass;
        self.inertia = properties.inertia;
        if self.is_static() {
            self.inverse_mass = 0.0;
            self.inverse_inertia_body = Mat3::ZERO;
        } else {
            self.inverse_mass = 1.0 / mass;
            self.inverse_inertia_body = if properties.inertia.determinant().abs() > f32::EPSILON {
                properties.inertia.inverse()
            } else {
                Mat3::ZERO
            };
        }
        self.update_world_inertia();
        self.refresh_velocity();
    }

    pub fn set_physics_type(&mut self, physics_type: PhysicsType) {
        self.physics_type = physics_type;
        if self.is_static() {
            self.linear_momentum = Vec3::ZERO;
            self.angular_momentum = Vec3::ZERO;
            self.timed_forces.clear();
        }
        self.set_mass(self.mass);
        self.wake();
    }

    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
        self.set_mass(self.mass);
        self.refresh_geometry();
        self.wake();
    }

    /// Rescales the body, keeping its mass and re-deriving inertia.
    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.set_mass(self.mass);
        self.refresh_geometry();
        self.wake();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.refresh_geometry();
        self.wake();
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        if self.is_static() {
            return;
        }
        self.linear_momentum = velocity * self.mass;
        self.refresh_velocity();
        if velocity != Vec3::ZERO {
            self.wake();
        }
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        if self.is_static() {
            return;
        }
        let world_inertia = world_tensor(self.inertia, self.transform.rotation);
        self.angular_momentum = world_inertia * velocity;
        self.refresh_velocity();
        if velocity != Vec3::ZERO {
            self.wake();
        }
    }

    /// Instantaneous impulse at a world-space point. Only dynamic bodies respond.
    pub fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_momentum += impulse;
        self.angular_momentum += (point - self.transform.position).cross(impulse);
        self.refresh_velocity();
        self.wake();
    }

    pub fn add_timed_force(&mut self, force: TimedForce) {
        if !self.is_dynamic() {
            return;
        }
        self.timed_forces.push(force);
        self.wake();
    }

    /// Re-derives velocity from momentum.
    pub fn refresh_velocity(&mut self) {
        self.velocity.linear = self.linear_momentum * self.inverse_mass;
        self.velocity.angular = self.inverse_inertia_world * self.angular_momentum;
    }

    pub fn update_world_inertia(&mut self) {
        self.inverse_inertia_world = world_tensor(self.inverse_inertia_body, self.transform.rotation);
    }

    /// Recomputes cached bounds and bounding radius from shape and transform.
    pub fn refresh_geometry(&mut self) {
        self.bounds = self.shape.world_aabb(&self.transform);
        self.bounding_radius = self.shape.bounding_radius(self.transform.scale);
    }

    /// Velocity of the material point at `point` (world space).
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.velocity.linear + self.velocity.angular.cross(point - self.transform.position)
    }

    pub fn kinetic_energy(&self) -> f32 {
        0.5 * self.linear_momentum.dot(self.velocity.linear)
            + 0.5 * self.angular_momentum.dot(self.velocity.angular)
    }

    /// Clears the resting flag; the next sub-step integrates the body again.
    pub fn wake(&mut self) {
        self.flags.resting = false;
    }

    /// Zeroes stored motion and marks the body as resting.
    pub fn rest(&mut self) {
        self.linear_momentum = Vec3::ZERO;
        self.angular_momentum = Vec3::ZERO;
        self.refresh_velocity();
        self.flags.resting = true;
    }
}
