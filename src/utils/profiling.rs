use std::time::{Duration, Instant};

use log::{debug, log_enabled, Level};

/// Per-frame stage timings accumulated across all sub-steps of a frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub command_time: Duration,
    pub integrator_time: Duration,
    pub reposition_time: Duration,
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub resolver_time: Duration,
    pub total_frame_time: Duration,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Emits the frame breakdown at `debug!` level.
    pub fn report(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        let total_us = self.total_frame_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let share = |stage: Duration| (stage.as_micros() as f32 / total_us) * 100.0;
        debug!(
            "physics frame {:.2} ms | commands {:.1}% integrate {:.1}% reposition {:.1}% broad {:.1}% narrow {:.1}% resolve {:.1}%",
            self.total_frame_time.as_secs_f32() * 1000.0,
            share(self.command_time),
            share(self.integrator_time),
            share(self.reposition_time),
            share(self.broad_phase_time),
            share(self.narrow_phase_time),
            share(self.resolver_time),
        );
    }
}

/// Adds the elapsed time of its scope to a profiler slot on drop.
pub struct StageTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> StageTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
