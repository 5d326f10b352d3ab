//! Dedicated simulation thread.
//!
//! The thread is the only writer of the [`PhysicsWorld`]. Producers talk to it
//! through cloned [`CommandQueue`]s and read the [`WorldSnapshot`] published
//! after every tick.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{commands::BodyHandle, commands::CommandQueue, BodyState, PhysicsWorld, StepStats};
use crate::{collision::record::CollisionRecord, utils::logging::warn_if_frame_budget_exceeded};

/// State published after a completed tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub bodies: Vec<BodyState>,
    pub last_collision: Option<CollisionRecord>,
    pub stats: StepStats,
}

impl WorldSnapshot {
    pub fn capture(world: &PhysicsWorld) -> Self {
        Self {
            tick: world.tick(),
            bodies: world.bodies().map(BodyState::from).collect(),
            last_collision: world.last_collision().cloned(),
            stats: *world.stats(),
        }
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&BodyState> {
        self.bodies.iter().find(|state| state.handle == handle)
    }
}

pub struct SimulationThread {
    commands: CommandQueue,
    snapshot: Arc<RwLock<WorldSnapshot>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<PhysicsWorld>>,
}

impl SimulationThread {
    /// Moves `world` onto a new thread that ticks once per `frame_interval`,
    /// passing the measured wall time to [`PhysicsWorld::step`].
    pub fn spawn(world: PhysicsWorld, frame_interval: Duration) -> Self {
        let commands = world.commands();
        let snapshot = Arc::new(RwLock::new(WorldSnapshot::capture(&world)));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let snapshot = Arc::clone(&snapshot);
            let stop = Arc::clone(&stop);
            thread::spawn(move || run(world, frame_interval, &snapshot, &stop))
        };
        log::debug!("simulation thread started ({frame_interval:?} per frame)");

        Self {
            commands,
            snapshot,
            stop,
            handle: Some(handle),
        }
    }

    /// Producer handle onto the world's queue.
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    /// Copy of the latest published state.
    pub fn snapshot(&self) -> WorldSnapshot {
        self.snapshot.read().clone()
    }

    pub fn tick(&self) -> u64 {
        self.snapshot.read().tick
    }

    /// Blocks until at least `tick` has been published or `timeout` elapses.
    pub fn wait_for_tick(&self, tick: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.tick() < tick {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Stops the loop after the current tick and hands the world back.
    pub fn shutdown(mut self) -> thread::Result<PhysicsWorld> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Err(Box::new("simulation thread already joined")),
        }
    }
}

impl Drop for SimulationThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("simulation thread panicked");
            }
        }
    }
}

fn run(
    mut world: PhysicsWorld,
    frame_interval: Duration,
    snapshot: &RwLock<WorldSnapshot>,
    stop: &AtomicBool,
) -> PhysicsWorld {
    let mut last = Instant::now();
    while !stop.load(Ordering::Acquire) {
        let frame_start = Instant::now();
        let elapsed = frame_start.duration_since(last);
        last = frame_start;

        world.step(elapsed.as_secs_f32());
        let published = WorldSnapshot::capture(&world);
        *snapshot.write() = published;

        let frame_time = frame_start.elapsed();
        warn_if_frame_budget_exceeded(frame_time, frame_interval);
        if let Some(remaining) = frame_interval.checked_sub(frame_time) {
            thread::sleep(remaining);
        }
    }
    log::debug!("simulation thread stopped at tick {}", world.tick());
    world
}
