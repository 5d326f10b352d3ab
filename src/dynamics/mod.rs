//! Simulation dynamics: integration, forces, friction, collision response and
//! resting contacts.

pub mod contact;
pub mod forces;
pub mod friction;
pub mod integrator;
pub mod resolver;

pub use contact::ContactGraph;
pub use forces::{Spring, TimedForce};
pub use integrator::{Integrator, IntegratorKind};
pub use resolver::{resolve, Resolution, ResolverKind};
