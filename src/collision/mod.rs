//! Collision detection: spatial indices, pair tests and ray queries.

pub mod broadphase;
pub mod narrowphase;
pub mod octree;
pub mod primitives;
pub mod queries;
pub mod record;
pub mod sweep;

pub use broadphase::{BroadPhase, BroadPhaseKind, IndexUpdate};
pub use narrowphase::NarrowPhase;
pub use octree::{NodeId, Octree, OctreeConfig, Reposition, SpatialNode};
pub use queries::{Ray, Raycast, RaycastHit};
pub use record::{CollisionRecord, Penetration};
pub use sweep::{Endpoint, SweepAndPrune, SweepAxis};
