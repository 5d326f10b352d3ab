//! Global configuration constants and the runtime [`SimulationConfig`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    collision::broadphase::BroadPhaseKind,
    dynamics::{integrator::IntegratorKind, resolver::ResolverKind},
    error::PhysicsError,
};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.8, 0.0];

/// Fixed sub-step length in seconds, before the speed multiplier.
pub const DEFAULT_SUBSTEP: f32 = 0.010;

/// Upper bound on sub-steps consumed by a single frame.
pub const DEFAULT_MAX_SUBSTEPS_PER_FRAME: u32 = 10;

/// Default exponential damping rate applied to linear momentum (1/s).
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.02;

/// Default exponential damping rate applied to angular momentum (1/s).
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.02;

/// Air density used by the velocity integrator's drag term (kg/m³).
pub const DEFAULT_AIR_DENSITY: f32 = 1.2;

/// Density used to derive mass for bodies registered without one.
pub const DEFAULT_DENSITY: f32 = 1.0;

/// Drag coefficient of the velocity integrator (sphere-like bodies).
pub const DEFAULT_DRAG_COEFFICIENT: f32 = 0.47;

/// Half extent of the cubic world bound covered by the spatial indices.
pub const DEFAULT_WORLD_HALF_EXTENT: f32 = 1024.0;

/// Occupants a leaf holds before it subdivides.
pub const OCTREE_MAX_OCCUPANTS: usize = 8;

/// Maximum subdivision depth of the octree.
pub const OCTREE_MAX_DEPTH: u32 = 8;

/// Number of parallel sweep bands.
pub const DEFAULT_SWEEP_BANDS: usize = 4;

/// Faces above which a mesh builds an acceleration octree.
pub const MESH_OCTREE_FACE_THRESHOLD: usize = 32;

/// Resolutions a single body may take part in per frame (0 = unlimited).
pub const DEFAULT_MAX_RESOLUTIONS_PER_BODY: u32 = 4;

/// Relative contact speed above which resolution is treated as a numerical blow-up.
pub const MAX_RELATIVE_SPEED: f32 = 1.0e3;

/// Post-resolution kinetic energy may not exceed this multiple of the pre-resolution energy.
pub const ENERGY_GROWTH_LIMIT: f32 = 1.5;

/// A body may rest when |momentum| is below this multiple of its mass.
pub const REST_MOMENTUM_FACTOR: f32 = 0.25;

/// Minimum |normal.y| for a contact to count as near-vertical.
pub const REST_NORMAL_MIN_Y: f32 = 0.9;

/// Contact points required per side before a body may rest.
pub const REST_MIN_CONTACT_POINTS: usize = 3;

/// Tunable simulation constants owned by [`crate::world::PhysicsWorld`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub gravity: Vec3,
    pub air_density: f32,
    pub default_density: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub substep: f32,
    pub simulation_speed: f32,
    pub max_substeps_per_frame: u32,
    pub max_resolutions_per_body: u32,
    pub paused: bool,
    pub integrator: IntegratorKind,
    pub resolver: ResolverKind,
    pub broad_phase: BroadPhaseKind,
    pub world_half_extent: f32,
    pub sweep_bands: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            air_density: DEFAULT_AIR_DENSITY,
            default_density: DEFAULT_DENSITY,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            substep: DEFAULT_SUBSTEP,
            simulation_speed: 1.0,
            max_substeps_per_frame: DEFAULT_MAX_SUBSTEPS_PER_FRAME,
            max_resolutions_per_body: DEFAULT_MAX_RESOLUTIONS_PER_BODY,
            paused: false,
            integrator: IntegratorKind::default(),
            resolver: ResolverKind::default(),
            broad_phase: BroadPhaseKind::default(),
            world_half_extent: DEFAULT_WORLD_HALF_EXTENT,
            sweep_bands: DEFAULT_SWEEP_BANDS,
        }
    }
}

impl SimulationConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_broad_phase(mut self, kind: BroadPhaseKind) -> Self {
        self.broad_phase = kind;
        self
    }

    pub fn with_integrator(mut self, kind: IntegratorKind) -> Self {
        self.integrator = kind;
        self
    }

    pub fn with_resolver(mut self, kind: ResolverKind) -> Self {
        self.resolver = kind;
        self
    }

    pub fn with_world_half_extent(mut self, half_extent: f32) -> Self {
        self.world_half_extent = half_extent;
        self
    }

    pub fn with_max_resolutions_per_body(mut self, cap: u32) -> Self {
        self.max_resolutions_per_body = cap;
        self
    }

    /// Integration step actually applied per sub-step.
    pub fn scaled_substep(&self) -> f32 {
        self.substep * self.simulation_speed
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !crate::utils::math::is_finite_vec(self.gravity) {
            return Err(PhysicsError::InvalidSetting {
                name: "gravity",
                reason: "must be finite".into(),
            });
        }
        for (name, value) in [
            ("air_density", self.air_density),
            ("default_density", self.default_density),
            ("linear_damping", self.linear_damping),
            ("angular_damping", self.angular_damping),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::InvalidSetting {
                    name,
                    reason: format!("expected a finite non-negative value, got {value}"),
                });
            }
        }
        for (name, value) in [
            ("substep", self.substep),
            ("simulation_speed", self.simulation_speed),
            ("world_half_extent", self.world_half_extent),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PhysicsError::InvalidSetting {
                    name,
                    reason: format!("expected a finite positive value, got {value}"),
                });
            }
        }
        if self.sweep_bands == 0 {
            return Err(PhysicsError::InvalidSetting {
                name: "sweep_bands",
                reason: "at least one band is required".into(),
            });
        }
        Ok(())
    }
}
