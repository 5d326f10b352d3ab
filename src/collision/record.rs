use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::utils::allocator::EntityId;

/// Geometric result of a pair test: unit normal from the first shape toward
/// the second, non-negative depth, and world-space contact points.
#[derive(Debug, Clone, PartialEq)]
pub struct Penetration {
    pub normal: Vec3,
    pub depth: f32,
    pub points: Vec<Vec3>,
}

impl Penetration {
    pub fn new(normal: Vec3, depth: f32, point: Vec3) -> Self {
        Self {
            normal,
            depth,
            points: vec![point],
        }
    }

    pub fn with_points(normal: Vec3, depth: f32, points: Vec<Vec3>) -> Self {
        Self {
            normal,
            depth,
            points,
        }
    }

    /// Same contact seen from the other shape.
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        self
    }
}

/// Confirmed collision between two bodies.
///
/// Depth is stored as a non-negative magnitude; the constructor clamps and
/// the field is only reachable through [`CollisionRecord::depth`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionRecord {
    pub body_a: EntityId,
    pub body_b: EntityId,
    normal: Vec3,
    depth: f32,
    pub contact_points: Vec<Vec3>,
    pub resolved: bool,
}

impl CollisionRecord {
    /// A normal that cannot be normalised is stored as zero and rejected by
    /// the resolver.
    pub fn new(body_a: EntityId, body_b: EntityId, penetration: Penetration) -> Self {
        let depth = if penetration.depth.is_finite() {
            penetration.depth.abs()
        } else {
            0.0
        };
        Self {
            body_a,
            body_b,
            normal: penetration.normal.normalize_or_zero(),
            depth,
            contact_points: penetration.points,
            resolved: false,
        }
    }

    /// Unit normal pointing from `body_a` toward `body_b`, or zero when degenerate.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    /// Mean of the contact points.
    pub fn contact_point(&self) -> Vec3 {
        if self.contact_points.is_empty() {
            return Vec3::ZERO;
        }
        self.contact_points.iter().copied().sum::<Vec3>() / self.contact_points.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_depth_is_stored_as_magnitude() {
        let record = CollisionRecord::new(
            EntityId::from_index(0),
            EntityId::from_index(1),
            Penetration::new(Vec3::new(0.0, 2.0, 0.0), -0.25, Vec3::ZERO),
        );
        assert_eq!(record.depth(), 0.25);
        assert_eq!(record.normal(), Vec3::Y);
    }

    #[test]
    fn non_finite_depth_collapses_to_zero() {
        let record = CollisionRecord::new(
            EntityId::from_index(0),
            EntityId::from_index(1),
            Penetration::new(Vec3::X, f32::NAN, Vec3::ZERO),
        );
        assert_eq!(record.depth(), 0.0);
    }
}
