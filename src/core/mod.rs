//! Core data: bodies, shapes, meshes and shared value types.

pub mod aabb;
pub mod body;
pub mod mesh;
pub mod shape;
pub mod types;

pub use aabb::Aabb;
pub use body::{Body, BodyDescriptor, BodyFlags};
pub use mesh::{Face, Mesh, MeshBuilder};
pub use shape::{Shape, ShapeKind};
pub use types::{
    CollisionFilter, MassProperties, Material, MaterialPair, MixingMode, PhysicsType, Transform,
    Velocity,
};
