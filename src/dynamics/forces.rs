use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{core::body::Body, utils::allocator::EntityId};

/// Damping ratio applied to every spring, relative to critical damping of a
/// unit mass.
const SPRING_DAMPING_RATIO: f32 = 0.05;

/// Force (and torque about the centre of mass) applied for a limited time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedForce {
    pub force: Vec3,
    pub torque: Vec3,
    pub remaining: f32,
}

impl TimedForce {
    /// Spreads `impulse` applied at `arm` (relative to the centre of mass)
    /// evenly over `duration` seconds.
    pub fn from_impulse(impulse: Vec3, arm: Vec3, duration: f32) -> Self {
        let force = impulse / duration;
        Self {
            force,
            torque: arm.cross(force),
            remaining: duration,
        }
    }

    /// Share of this force for a sub-step of `dt`, scaled down on the final
    /// partial step so the total impulse matches the request.
    pub fn sample(&self, dt: f32) -> (Vec3, Vec3) {
        let fraction = if dt > 0.0 {
            (self.remaining / dt).min(1.0)
        } else {
            0.0
        };
        (self.force * fraction, self.torque * fraction)
    }

    pub fn advance(&mut self, dt: f32) {
        self.remaining -= dt;
    }

    pub fn is_expired(&self) -> bool {
        self.remaining <= 0.0
    }
}

/// Hookean spring between two body centres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub a: EntityId,
    pub b: EntityId,
    pub constant: f32,
    pub rest_length: f32,
    pub damping: f32,
}

impl Spring {
    pub fn new(a: EntityId, b: EntityId, constant: f32, rest_length: f32) -> Self {
        Self {
            a,
            b,
            constant,
            rest_length,
            damping: 2.0 * SPRING_DAMPING_RATIO * constant.max(0.0).sqrt(),
        }
    }

    /// Force acting on `a`; `b` receives the negation.
    pub fn force_on_a(&self, a: &Body, b: &Body) -> Vec3 {
        let offset = a.transform.position - b.transform.position;
        let distance = offset.length();
        if distance < 1e-6 {
            return Vec3::ZERO;
        }
        let direction = offset / distance;
        let extension = distance - self.rest_length;
        let closing_speed = (a.velocity.linear - b.velocity.linear).dot(direction);
        -direction * (self.constant * extension + self.damping * closing_speed)
    }

    pub fn involves(&self, id: EntityId) -> bool {
        self.a == id || self.b == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_force_delivers_requested_impulse() {
        let mut timed = TimedForce::from_impulse(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO, 0.025);
        let dt = 0.01;
        let mut delivered = Vec3::ZERO;
        while !timed.is_expired() {
            delivered += timed.sample(dt).0 * dt;
            timed.advance(dt);
        }
        assert!((delivered.y - 3.0).abs() < 1e-4, "delivered {delivered:?}");
    }

    #[test]
    fn off_centre_force_produces_torque() {
        let timed = TimedForce::from_impulse(Vec3::Y, Vec3::X, 1.0);
        assert!((timed.torque - Vec3::Z).length() < 1e-6);
    }
}
