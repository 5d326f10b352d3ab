use std::{f32::consts::PI, fmt, sync::Arc};

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    aabb::Aabb,
    mesh::Mesh,
    types::{InertiaTensorExt, MassProperties, Transform},
};
use crate::error::GeometryError;

/// Thickness assumed for flat shapes when deriving inertia.
const FLAT_SHAPE_HALF_THICKNESS: f32 = 0.05;

/// Collision geometry in body space.
///
/// `Cube` is an oriented box that follows the body rotation, while `Aabb`
/// stays axis-aligned in world space regardless of rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
    Sphere {
        radius: f32,
    },
    /// Infinite plane through the body origin.
    Plane {
        normal: Vec3,
    },
    Triangle {
        vertices: [Vec3; 3],
    },
    /// Planar convex quad, corners in winding order.
    Quad {
        corners: [Vec3; 4],
    },
    Cube {
        half_extents: Vec3,
    },
    #[serde(skip)]
    Mesh(Arc<Mesh>),
    Aabb {
        half_extents: Vec3,
    },
}

/// Tag of a [`Shape`] without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere,
    Plane,
    Triangle,
    Quad,
    Cube,
    Mesh,
    Aabb,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Sphere { radius: 0.5 }
    }
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere { radius }
    }

    pub fn plane(normal: Vec3) -> Self {
        Shape::Plane {
            normal: normal.normalize_or_zero(),
        }
    }

    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Shape::Triangle { vertices: [a, b, c] }
    }

    pub fn quad(corners: [Vec3; 4]) -> Self {
        Shape::Quad { corners }
    }

    pub fn cube(half_extents: Vec3) -> Self {
        Shape::Cube { half_extents }
    }

    pub fn aabb(half_extents: Vec3) -> Self {
        Shape::Aabb { half_extents }
    }

    pub fn mesh(mesh: Mesh) -> Self {
        Shape::Mesh(Arc::new(mesh))
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Plane { .. } => ShapeKind::Plane,
            Shape::Triangle { .. } => ShapeKind::Triangle,
            Shape::Quad { .. } => ShapeKind::Quad,
            Shape::Cube { .. } => ShapeKind::Cube,
            Shape::Mesh(_) => ShapeKind::Mesh,
            Shape::Aabb { .. } => ShapeKind::Aabb,
        }
    }

    /// Rejects shapes the narrow phase cannot work with.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Shape::Sphere { radius } if !(radius.is_finite() && *radius > 0.0) => {
                Err(GeometryError::Degenerate("sphere radius"))
            }
            Shape::Plane { normal } if normal.length_squared() < 1e-8 || !normal.is_finite() => {
                Err(GeometryError::Degenerate("plane normal"))
            }
            Shape::Triangle { vertices: [a, b, c] } if (*b - *a).cross(*c - *a).length_squared() < 1e-12 => {
                Err(GeometryError::Degenerate("triangle"))
            }
            Shape::Quad { corners } if (corners[1] - corners[0]).cross(corners[3] - corners[0]).length_squared() < 1e-12 => {
                Err(GeometryError::Degenerate("quad"))
            }
            Shape::Cube { half_extents } | Shape::Aabb { half_extents }
                if !(half_extents.is_finite() && half_extents.min_element() > 0.0) =>
            {
                Err(GeometryError::Degenerate("box half extents"))
            }
            Shape::Mesh(mesh) if mesh.face_count() == 0 => Err(GeometryError::Empty),
            _ => Ok(()),
        }
    }

    /// World-space bounds. Planes are unbounded.
    pub fn world_aabb(&self, transform: &Transform) -> Aabb {
        match self {
            Shape::Sphere { radius } => Aabb::from_center_half_extents(
                transform.position,
                Vec3::splat(radius * transform.max_scale()),
            ),
            Shape::Plane { .. } => Aabb::unbounded(),
            Shape::Triangle { vertices } => {
                Aabb::from_points(&vertices.map(|v| transform.apply(v)))
            }
            Shape::Quad { corners } => Aabb::from_points(&corners.map(|v| transform.apply(v))),
            Shape::Cube { half_extents } => {
                let rotation = Mat3::from_quat(transform.rotation).abs();
                let half = rotation * (*half_extents * transform.scale.abs());
                Aabb::from_center_half_extents(transform.position, half)
            }
            Shape::Mesh(mesh) => {
                let local = mesh.bounds();
                let rotation = Mat3::from_quat(transform.rotation).abs();
                let half = rotation * (local.half_extents() * transform.scale.abs());
                Aabb::from_center_half_extents(transform.apply(local.center()), half)
            }
            Shape::Aabb { half_extents } => Aabb::from_center_half_extents(
                transform.position,
                *half_extents * transform.scale.abs(),
            ),
        }
    }

    /// Radius of the bounding sphere about the body origin.
    pub fn bounding_radius(&self, scale: Vec3) -> f32 {
        let s = scale.abs().max_element();
        match self {
            Shape::Sphere { radius } => radius * s,
            Shape::Plane { .. } => f32::INFINITY,
            Shape::Triangle { vertices } => max_length(vertices) * s,
            Shape::Quad { corners } => max_length(corners) * s,
            Shape::Cube { half_extents } | Shape::Aabb { half_extents } => {
                (*half_extents * scale.abs()).length()
            }
            Shape::Mesh(mesh) => mesh.bounding_radius() * s,
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Shape::Plane { .. } | Shape::Triangle { .. } | Shape::Quad { .. } => 0.0,
            Shape::Cube { half_extents } | Shape::Aabb { half_extents } => {
                8.0 * half_extents.x * half_extents.y * half_extents.z
            }
            Shape::Mesh(mesh) => mesh.volume(),
        }
    }

    /// Mass and body-space inertia for `mass` at `scale`. Shapes without a
    /// closed form fall back to a solid box over their scaled bounds.
    pub fn mass_properties(&self, mass: f32, scale: Vec3) -> MassProperties {
        let scale = scale.abs();
        let inertia = match self {
            Shape::Sphere { radius } => Mat3::for_solid_sphere(radius * scale.max_element(), mass),
            Shape::Cube { half_extents } | Shape::Aabb { half_extents } => {
                Mat3::for_solid_box(*half_extents * scale, mass)
            }
            Shape::Mesh(mesh) => return mesh.mass_properties(mass, scale),
            Shape::Plane { .. } => Mat3::for_solid_box(Vec3::splat(1.0), mass),
            Shape::Triangle { .. } | Shape::Quad { .. } => {
                let bounds = self.world_aabb(&Transform {
                    scale,
                    ..Transform::default()
                });
                let half = bounds.half_extents().max(Vec3::splat(FLAT_SHAPE_HALF_THICKNESS));
                Mat3::for_solid_box(half, mass)
            }
        };
        MassProperties { mass, inertia }
    }
}

fn max_length(points: &[Vec3]) -> f32 {
    points.iter().map(|p| p.length()).fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn rotated_cube_bounds_grow() {
        let shape = Shape::cube(Vec3::ONE);
        let transform = Transform::from_position_rotation(
            Vec3::ZERO,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
        );
        let bounds = shape.world_aabb(&transform);
        assert!((bounds.half_extents().x - 2.0_f32.sqrt()).abs() < 1e-4);
        assert!((bounds.half_extents().y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn aabb_shape_ignores_rotation() {
        let shape = Shape::aabb(Vec3::new(1.0, 2.0, 3.0));
        let transform = Transform::from_position_rotation(Vec3::X, Quat::from_rotation_z(1.0));
        let bounds = shape.world_aabb(&transform);
        assert_eq!(bounds.half_extents(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn plane_is_unbounded() {
        let shape = Shape::plane(Vec3::Y);
        assert!(shape.world_aabb(&Transform::default()).is_unbounded());
        assert!(shape.bounding_radius(Vec3::ONE).is_infinite());
    }

    #[test]
    fn degenerate_shapes_fail_validation() {
        assert!(Shape::sphere(0.0).validate().is_err());
        assert!(Shape::plane(Vec3::ZERO).validate().is_err());
        assert!(Shape::triangle(Vec3::ZERO, Vec3::X, Vec3::X * 2.0).validate().is_err());
        assert!(Shape::cube(Vec3::new(1.0, 0.0, 1.0)).validate().is_err());
        assert!(Shape::sphere(1.0).validate().is_ok());
    }

    #[test]
    fn unit_sphere_volume() {
        let volume = Shape::sphere(1.0).volume();
        assert!((volume - 4.0 / 3.0 * PI).abs() < 1e-4);
    }
}
