//! Utility helpers: arena allocation, logging, math extensions and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, EntityId, GenerationalId};
pub use math::*;
pub use profiling::PhysicsProfiler;
