use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    core::{aabb::Aabb, body::Body, shape::Shape},
    utils::allocator::{Arena, EntityId},
    world::commands::BodyHandle,
};

const PARALLEL_EPSILON: f32 = 1e-8;

/// Ray with a category mask; only bodies whose category intersects `mask` are hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
    pub mask: u32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance: f32::INFINITY,
            mask: u32::MAX,
        }
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaycastHit {
    pub body: EntityId,
    pub handle: BodyHandle,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

pub struct Raycast;

impl Raycast {
    /// All hits along `ray`, nearest first.
    pub fn cast(ray: &Ray, bodies: &Arena<Body>) -> Vec<RaycastHit> {
        if ray.direction == Vec3::ZERO {
            return Vec::new();
        }
        let mut scratch = Vec::new();
        let mut hits: Vec<RaycastHit> = bodies
            .iter()
            .filter(|body| body.filter.category & ray.mask != 0)
            .filter(|body| {
                body.bounds.is_unbounded()
                    || body
                        .bounds
                        .ray_entry(ray.origin, ray.direction, ray.max_distance)
                        .is_some()
            })
            .filter_map(|body| Self::cast_body(ray, body, &mut scratch))
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    pub fn cast_body(ray: &Ray, body: &Body, scratch: &mut Vec<u32>) -> Option<RaycastHit> {
        let transform = &body.transform;
        let (distance, normal) = match &body.shape {
            Shape::Sphere { radius } => {
                ray_sphere(ray, transform.position, radius * transform.max_scale())?
            }
            Shape::Plane { normal } => {
                let normal = (transform.rotation * *normal).try_normalize()?;
                ray_plane(ray, transform.position, normal)?
            }
            Shape::Triangle { vertices } => ray_polygon(ray, &vertices.map(|v| transform.apply(v)))?,
            Shape::Quad { corners } => ray_polygon(ray, &corners.map(|v| transform.apply(v)))?,
            Shape::Cube { half_extents } => ray_box(
                ray,
                transform.position,
                transform.rotation,
                *half_extents * transform.scale.abs(),
            )?,
            Shape::Aabb { .. } => {
                ray_box(ray, body.bounds.center(), Quat::IDENTITY, body.bounds.half_extents())?
            }
            Shape::Mesh(mesh) => {
                // A collapsed axis has no inverse map into mesh space.
                if transform.scale.abs().min_element() <= f32::EPSILON {
                    return None;
                }
                // Parameter t is preserved by the affine map into mesh space.
                let local_origin = transform.inverse_apply(ray.origin);
                let local_direction =
                    (transform.rotation.conjugate() * ray.direction) / transform.scale;
                let (entry, exit) =
                    mesh.bounds()
                        .ray_interval(local_origin, local_direction, ray.max_distance)?;
                let region = Aabb::from_points(&[
                    local_origin + local_direction * entry,
                    local_origin + local_direction * exit,
                ]);
                scratch.clear();
                mesh.faces_near(&region, scratch);
                scratch
                    .iter()
                    .filter_map(|&id| mesh.face(id))
                    .filter_map(|face| {
                        let world: Vec<Vec3> =
                            face.vertices().iter().map(|&v| transform.apply(v)).collect();
                        ray_polygon(ray, &world)
                    })
                    .min_by(|a, b| a.0.total_cmp(&b.0))?
            }
        };
        Some(RaycastHit {
            body: body.id,
            handle: body.handle,
            point: ray.at(distance),
            normal,
            distance,
        })
    }
}

fn in_range(ray: &Ray, t: f32) -> bool {
    t >= 0.0 && t <= ray.max_distance
}

fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    // Origin inside the sphere reports the exit point.
    let t = if -b - root >= 0.0 { -b - root } else { -b + root };
    if !in_range(ray, t) {
        return None;
    }
    Some((t, (ray.at(t) - center).normalize_or_zero()))
}

fn ray_plane(ray: &Ray, point: Vec3, normal: Vec3) -> Option<(f32, Vec3)> {
    let denom = normal.dot(ray.direction);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let t = normal.dot(point - ray.origin) / denom;
    in_range(ray, t).then(|| (t, if denom < 0.0 { normal } else { -normal }))
}

/// Convex planar polygon via plane intersection plus edge tests.
fn ray_polygon(ray: &Ray, vertices: &[Vec3]) -> Option<(f32, Vec3)> {
    let normal = (vertices[1] - vertices[0])
        .cross(vertices[2] - vertices[0])
        .try_normalize()?;
    let (t, facing) = ray_plane(ray, vertices[0], normal)?;
    let point = ray.at(t);
    let inside = (0..vertices.len()).all(|i| {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        (b - a).cross(point - a).dot(normal) >= -1e-6
    });
    inside.then_some((t, facing))
}

fn ray_box(ray: &Ray, center: Vec3, rotation: Quat, half: Vec3) -> Option<(f32, Vec3)> {
    let inverse = rotation.conjugate();
    let origin = inverse * (ray.origin - center);
    let direction = inverse * ray.direction;
    let bounds = Aabb::from_center_half_extents(Vec3::ZERO, half);
    let (t, _) = bounds.ray_interval(origin, direction, ray.max_distance)?;

    let local_point = origin + direction * t;
    let offset = (local_point.abs() - half).to_array();
    let axis = (0..3)
        .max_by(|&a, &b| offset[a].total_cmp(&offset[b]))
        .unwrap_or(0);
    let mut normal = Vec3::ZERO;
    normal[axis] = local_point[axis].signum();
    Some((t, rotation * normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_hit_distance() {
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let (t, normal) = ray_sphere(&ray, Vec3::ZERO, 1.0).expect("hit");
        assert!((t - 4.0).abs() < 1e-5);
        assert!((normal + Vec3::X).length() < 1e-5);
    }

    #[test]
    fn plane_hit_faces_ray() {
        let ray = Ray::new(Vec3::new(0.0, 3.0, 0.0), -Vec3::Y);
        let (t, normal) = ray_plane(&ray, Vec3::ZERO, Vec3::Y).expect("hit");
        assert!((t - 3.0).abs() < 1e-5);
        assert_eq!(normal, Vec3::Y);
        assert!(ray_plane(&ray.with_max_distance(2.0), Vec3::ZERO, Vec3::Y).is_none());
    }

    #[test]
    fn rotated_box_normal_is_world_space() {
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y);
        let rotation = Quat::from_rotation_y(0.5);
        let (t, normal) = ray_box(&ray, Vec3::ZERO, rotation, Vec3::ONE).expect("hit");
        assert!((t - 4.0).abs() < 1e-4);
        assert!((normal - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn triangle_miss_outside_edges() {
        let triangle = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let hit = Ray::new(Vec3::new(0.2, 1.0, 0.2), -Vec3::Y);
        let miss = Ray::new(Vec3::new(0.8, 1.0, 0.8), -Vec3::Y);
        assert!(ray_polygon(&hit, &triangle).is_some());
        assert!(ray_polygon(&miss, &triangle).is_none());
    }
}
