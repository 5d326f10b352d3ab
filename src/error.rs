//! Error types surfaced by the physics core.
//!
//! None of these are fatal to a frame: the world logs them and moves on.

use thiserror::Error;

use crate::world::commands::BodyHandle;

/// Configuration and lifecycle errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("unknown {kind} strategy `{value}`")]
    UnknownStrategy { kind: &'static str, value: String },

    #[error("body {0:?} is already registered")]
    AlreadyRegistered(BodyHandle),

    #[error("body {0:?} is not registered")]
    UnknownBody(BodyHandle),

    #[error("body {handle:?} has invalid geometry: {reason}")]
    InvalidGeometry { handle: BodyHandle, reason: String },

    #[error("body {0:?} lies outside the spatial index bounds")]
    OutOfBounds(BodyHandle),
}

/// Reasons a collision was left unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ResolveError {
    #[error("neither body can move")]
    Immovable,

    #[error("collision normal has zero length")]
    ZeroNormal,

    #[error("effective mass denominator is degenerate ({0})")]
    DegenerateMass(f32),

    #[error("relative contact speed {0} exceeds the sanity bound")]
    RunawayVelocity(f32),

    #[error("resolution produced non-finite state")]
    NonFinite,
}

/// Problems found while cooking mesh geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("mesh has no faces")]
    Empty,

    #[error("face {face} references vertex {index}, but the mesh has {count} vertices")]
    IndexOutOfRange { face: usize, index: u32, count: usize },

    #[error("mesh contains a non-finite vertex")]
    NonFinite,

    #[error("degenerate {0}")]
    Degenerate(&'static str),
}
