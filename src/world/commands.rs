//! Cross-thread command queue.
//!
//! Producers enqueue [`Command`]s from any thread through a cloned
//! [`CommandQueue`]; the simulation drains the whole queue once per frame and
//! applies the copy outside the lock, in enqueue order.

use std::{
    mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use glam::Vec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    collision::broadphase::BroadPhaseKind,
    core::{
        body::BodyDescriptor,
        shape::Shape,
        types::{CollisionFilter, PhysicsType},
    },
    dynamics::{integrator::IntegratorKind, resolver::ResolverKind},
};

/// Stable, caller-facing body identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u64);

/// Per-body property written through [`Command::SetProperty`].
#[derive(Debug, Clone)]
pub enum BodyProperty {
    Position(Vec3),
    Velocity(Vec3),
    AngularVelocity(Vec3),
    Scale(Vec3),
    Shape(Shape),
    PhysicsType(PhysicsType),
    Filter(CollisionFilter),
    Restitution(f32),
    Friction(f32),
    GravityMultiplier(f32),
    Mass(f32),
    Paused(bool),
}

/// World-wide setting written through [`Command::SetGlobal`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalSetting {
    Gravity(Vec3),
    AirDensity(f32),
    DefaultDensity(f32),
    LinearDamping(f32),
    AngularDamping(f32),
    Integrator(IntegratorKind),
    Resolver(ResolverKind),
    BroadPhase(BroadPhaseKind),
    SimulationSpeed(f32),
    Paused(bool),
    MaxResolutionsPerBody(u32),
}

/// Every mutating operation a producer can request.
#[derive(Debug, Clone)]
pub enum Command {
    Register {
        handle: BodyHandle,
        descriptor: BodyDescriptor,
    },
    Unregister(BodyHandle),
    SetProperty {
        handles: Vec<BodyHandle>,
        property: BodyProperty,
    },
    /// `duration == 0` applies the impulse instantly; otherwise it is spread
    /// over `duration` seconds as a timed force.
    ApplyImpulse {
        handles: Vec<BodyHandle>,
        impulse: Vec3,
        point: Vec3,
        duration: f32,
    },
    /// Links consecutive handles with springs. Without a rest length the
    /// current distance is used.
    CreateSpring {
        handles: Vec<BodyHandle>,
        constant: f32,
        rest_length: Option<f32>,
    },
    SetGlobal(GlobalSetting),
}

/// Cloneable producer handle onto the shared queue.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Arc<Mutex<Vec<Command>>>,
    next_handle: Arc<AtomicU64>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `command`. A registration under a caller-chosen handle moves
    /// the reservation counter past it.
    pub fn push(&self, command: Command) {
        if let Command::Register { handle, .. } = &command {
            self.next_handle.fetch_max(handle.0.saturating_add(1), Ordering::Relaxed);
        }
        self.pending.lock().push(command);
    }

    /// Hands out the next unused handle without enqueuing anything.
    pub fn reserve_handle(&self) -> BodyHandle {
        BodyHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserves a handle and enqueues its registration. The body exists once
    /// the next frame has drained the queue.
    pub fn register(&self, descriptor: BodyDescriptor) -> BodyHandle {
        let handle = self.reserve_handle();
        self.push(Command::Register { handle, descriptor });
        handle
    }

    pub fn unregister(&self, handle: BodyHandle) {
        self.push(Command::Unregister(handle));
    }

    pub fn set_property(&self, handles: impl Into<Vec<BodyHandle>>, property: BodyProperty) {
        self.push(Command::SetProperty {
            handles: handles.into(),
            property,
        });
    }

    pub fn apply_impulse(
        &self,
        handles: impl Into<Vec<BodyHandle>>,
        impulse: Vec3,
        point: Vec3,
        duration: f32,
    ) {
        self.push(Command::ApplyImpulse {
            handles: handles.into(),
            impulse,
            point,
            duration,
        });
    }

    pub fn create_spring(
        &self,
        handles: impl Into<Vec<BodyHandle>>,
        constant: f32,
        rest_length: Option<f32>,
    ) {
        self.push(Command::CreateSpring {
            handles: handles.into(),
            constant,
            rest_length,
        });
    }

    pub fn set_global(&self, setting: GlobalSetting) {
        self.push(Command::SetGlobal(setting));
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Takes every pending command, leaving the queue empty.
    pub fn drain(&self) -> Vec<Command> {
        mem::take(&mut *self.pending.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn explicit_register_handles_are_never_reissued() {
        let queue = CommandQueue::new();
        let first = queue.reserve_handle();
        queue.push(Command::Register {
            handle: BodyHandle(50),
            descriptor: BodyDescriptor::default(),
        });
        assert_eq!(queue.reserve_handle(), BodyHandle(51));

        queue.push(Command::Register {
            handle: first,
            descriptor: BodyDescriptor::default(),
        });
        assert_eq!(queue.register(BodyDescriptor::default()), BodyHandle(52));
    }

    #[test]
    fn handles_are_unique_across_producers() {
        let queue = CommandQueue::new();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let producer = queue.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|_| producer.register(BodyDescriptor::default()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut handles: Vec<BodyHandle> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        handles.sort();
        handles.dedup();
        assert_eq!(handles.len(), 100);
        assert_eq!(queue.drain().len(), 100);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_preserves_enqueue_order() {
        let queue = CommandQueue::new();
        let first = queue.register(BodyDescriptor::default());
        queue.set_property([first], BodyProperty::Paused(true));
        queue.unregister(first);
        let drained = queue.drain();
        assert!(matches!(drained[0], Command::Register { handle, .. } if handle == first));
        assert!(matches!(drained[1], Command::SetProperty { .. }));
        assert!(matches!(drained[2], Command::Unregister(handle) if handle == first));
    }
}
