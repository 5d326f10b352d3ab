use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, orientation, and non-uniform scale of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    /// Builds a homogeneous matrix representation of the transform.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Maps a body-space point into world space.
    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * (local * self.scale)
    }

    /// Maps a world-space point into body space.
    pub fn inverse_apply(&self, world: Vec3) -> Vec3 {
        let unrotated = self.rotation.conjugate() * (world - self.position);
        unrotated / self.scale
    }

    /// Largest absolute scale component, used to scale radii.
    pub fn max_scale(&self) -> f32 {
        self.scale.abs().max_element()
    }
}

/// Derived linear and angular velocity of a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Mass and body-space inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Mat3::IDENTITY,
        }
    }
}

/// Motion class of a body. Static bodies never move and have zero inverse
/// mass; kinematic bodies follow their set velocity and ignore forces and
/// impulses; dynamic bodies are fully simulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicsType {
    Static,
    Kinematic,
    #[default]
    Dynamic,
}

/// Category/filter bitmasks. Two bodies may collide when each one's filter
/// accepts the other's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub category: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            category: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionFilter {
    pub fn new(category: u32, mask: u32) -> Self {
        Self { category, mask }
    }

    pub fn accepts(&self, other: &CollisionFilter) -> bool {
        (self.mask & other.category) != 0 && (other.mask & self.category) != 0
    }
}

/// Material coefficients that affect interactions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: f32,
    pub restitution: f32,
    pub friction: f32,
    pub restitution_mixing: MixingMode,
    pub friction_mixing: MixingMode,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: crate::config::DEFAULT_DENSITY,
            restitution: 0.3,
            friction: 0.4,
            restitution_mixing: MixingMode::Max,
            friction_mixing: MixingMode::GeometricMean,
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            density: 1.4,
            restitution: 0.8,
            friction: 1.0,
            ..Self::default()
        }
    }

    pub fn steel() -> Self {
        Self {
            density: 7.8,
            restitution: 0.4,
            friction: 0.45,
            ..Self::default()
        }
    }

    pub fn ice() -> Self {
        Self {
            density: 0.9,
            restitution: 0.05,
            friction: 0.03,
            ..Self::default()
        }
    }

    /// Combined coefficients for a contacting pair.
    pub fn combine_pair(a: &Self, b: &Self) -> MaterialPair {
        let restitution_mode = a.restitution_mixing.resolve(b.restitution_mixing);
        let friction_mode = a.friction_mixing.resolve(b.friction_mixing);
        MaterialPair {
            restitution: restitution_mode
                .combine(a.restitution, b.restitution)
                .clamp(0.0, 1.0),
            friction: friction_mode.combine(a.friction, b.friction).max(0.0),
        }
    }
}

/// How two materials mix a coefficient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum MixingMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl MixingMode {
    fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
        }
    }

    fn resolve(self, other: MixingMode) -> MixingMode {
        if matches!(self, MixingMode::Average) {
            other
        } else {
            self
        }
    }
}

/// Coefficients used when resolving one collision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialPair {
    pub restitution: f32,
    pub friction: f32,
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (ly * ly + lz * lz),
            factor * (lx * lx + lz * lz),
            factor * (lx * lx + ly * ly),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        let value = 0.4 * mass * radius * radius;
        Mat3::from_diagonal(Vec3::splat(value))
    }
}
