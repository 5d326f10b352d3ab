use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box used by both spatial indices and mesh faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Box covering all of space. Used for infinite planes.
    pub fn unbounded() -> Self {
        Self {
            min: Vec3::splat(f32::NEG_INFINITY),
            max: Vec3::splat(f32::INFINITY),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn radius(&self) -> f32 {
        self.half_extents().length()
    }

    pub fn is_unbounded(&self) -> bool {
        !(self.min.is_finite() && self.max.is_finite())
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// True when `other` lies inside this box (touching faces count).
    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    /// True when `other` lies inside this box without touching any face.
    pub fn strictly_contains(&self, other: &Aabb) -> bool {
        other.min.cmpgt(self.min).all() && other.max.cmplt(self.max).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Overlap test on two axes only; the sweep axis is already known to overlap.
    pub fn overlaps_except_axis(&self, other: &Aabb, axis: usize) -> bool {
        (0..3).filter(|&i| i != axis).all(|i| {
            self.min[i] <= other.max[i] && self.max[i] >= other.min[i]
        })
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Slab test; returns the entry distance along `direction` if the ray hits.
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        self.ray_interval(origin, direction, max_distance)
            .map(|(entry, _)| entry)
    }

    /// Parameter interval `[entry, exit]` over which the ray lies inside the box,
    /// clipped to `[0, max_distance]`.
    pub fn ray_interval(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(f32, f32)> {
        let mut t_min = 0.0_f32;
        let mut t_max = max_distance;
        for i in 0..3 {
            if direction[i].abs() < 1e-8 {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / direction[i];
            let mut t1 = (self.min[i] - origin[i]) * inv;
            let mut t2 = (self.max[i] - origin[i]) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some((t_min, t_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_containment_excludes_touching_faces() {
        let outer = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let touching = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let inside = Aabb::new(Vec3::splat(0.5), Vec3::ONE);
        assert!(outer.contains(&touching));
        assert!(!outer.strictly_contains(&touching));
        assert!(outer.strictly_contains(&inside));
    }

    #[test]
    fn unbounded_box_is_flagged() {
        assert!(Aabb::unbounded().is_unbounded());
        assert!(!Aabb::new(Vec3::ZERO, Vec3::ONE).is_unbounded());
        assert!(Aabb::unbounded().overlaps(&Aabb::new(Vec3::ZERO, Vec3::ONE)));
    }

    #[test]
    fn ray_entry_hits_front_face() {
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = bounds
            .ray_entry(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, 100.0)
            .expect("ray should hit");
        assert!((t - 4.0).abs() < 1e-5);
        assert!(bounds.ray_entry(Vec3::new(-5.0, 3.0, 0.0), Vec3::X, 100.0).is_none());
    }
}
