//! Momentum – rigid-body physics and collision core.
//!
//! The crate simulates static, kinematic and dynamic bodies in fixed
//! sub-steps: an octree or banded sweep-and-prune broad phase finds candidate
//! pairs, per-shape narrow-phase tests confirm them, and an impulse or
//! push-back resolver responds. Mutations arrive through a cross-thread
//! command queue drained once per frame.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    broadphase::{BroadPhase, BroadPhaseKind, IndexUpdate},
    narrowphase::NarrowPhase,
    queries::{Ray, Raycast, RaycastHit},
    record::{CollisionRecord, Penetration},
};
pub use config::SimulationConfig;
pub use core::{
    aabb::Aabb,
    body::{Body, BodyDescriptor},
    mesh::{Face, Mesh, MeshBuilder},
    shape::{Shape, ShapeKind},
    types::{CollisionFilter, MassProperties, Material, MixingMode, PhysicsType, Transform, Velocity},
};
pub use dynamics::{integrator::IntegratorKind, resolver::ResolverKind};
pub use error::{GeometryError, PhysicsError, ResolveError};
pub use utils::allocator::{Arena, EntityId, GenerationalId};
pub use world::{
    commands::{BodyHandle, BodyProperty, Command, CommandQueue, GlobalSetting},
    runner::{SimulationThread, WorldSnapshot},
    BodyState, PhysicsWorld, StepStats,
};
