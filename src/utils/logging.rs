use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Scoped timer emitting `trace!` lines around a simulation stage.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Warns when a simulation frame ran longer than its budget.
pub fn warn_if_frame_budget_exceeded(duration: Duration, budget: Duration) -> bool {
    if duration > budget {
        warn!(
            "physics frame exceeded budget: {:.2} ms > {:.2} ms",
            duration.as_secs_f32() * 1000.0,
            budget.as_secs_f32() * 1000.0
        );
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_check_reports_overrun() {
        assert!(warn_if_frame_budget_exceeded(
            Duration::from_millis(20),
            Duration::from_millis(16)
        ));
        assert!(!warn_if_frame_budget_exceeded(
            Duration::from_millis(5),
            Duration::from_millis(16)
        ));
    }
}
