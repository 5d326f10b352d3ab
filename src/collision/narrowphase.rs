use glam::{Quat, Vec3};
use rand::Rng;

use super::{
    primitives,
    record::{CollisionRecord, Penetration},
};
use crate::core::{body::Body, shape::Shape};

/// Selects the pair test from the two shape tags and builds the record.
#[derive(Debug, Default)]
pub struct NarrowPhase {
    face_scratch: Vec<u32>,
}

impl NarrowPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact test for a candidate pair. The record normal points from `a` to `b`.
    pub fn collide<R: Rng + ?Sized>(
        &mut self,
        a: &Body,
        b: &Body,
        rng: &mut R,
    ) -> Option<CollisionRecord> {
        let reach = a.bounding_radius + b.bounding_radius;
        if reach.is_finite()
            && a.transform.position.distance_squared(b.transform.position) > reach * reach
        {
            return None;
        }
        let penetration = self.penetration(a, b, rng)?;
        Some(CollisionRecord::new(a.id, b.id, penetration))
    }

    fn penetration<R: Rng + ?Sized>(
        &mut self,
        a: &Body,
        b: &Body,
        rng: &mut R,
    ) -> Option<Penetration> {
        match (&a.shape, &b.shape) {
            (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => primitives::sphere_sphere(
                a.transform.position,
                ra * a.transform.max_scale(),
                b.transform.position,
                rb * b.transform.max_scale(),
                rng,
            ),
            (_, Shape::Sphere { radius }) => {
                self.against_sphere(a, b.transform.position, radius * b.transform.max_scale(), rng)
            }
            (Shape::Sphere { radius }, _) => self
                .against_sphere(b, a.transform.position, radius * a.transform.max_scale(), rng)
                .map(Penetration::flipped),
            (Shape::Aabb { .. }, Shape::Aabb { .. }) => {
                primitives::aabb_aabb(&world_bounds(a), &world_bounds(b))
            }
            (Shape::Plane { normal }, _) => {
                let (center, rotation, half) = oriented_box(b)?;
                let corners = primitives::box_corners(center, rotation, half);
                primitives::plane_corners(a.transform.position, plane_normal(a, *normal)?, &corners)
            }
            (_, Shape::Plane { normal }) => {
                let (center, rotation, half) = oriented_box(a)?;
                let corners = primitives::box_corners(center, rotation, half);
                primitives::plane_corners(b.transform.position, plane_normal(b, *normal)?, &corners)
                    .map(Penetration::flipped)
            }
            _ => {
                let (ca, ra, ha) = oriented_box(a)?;
                let (cb, rb, hb) = oriented_box(b)?;
                primitives::box_box(ca, ra, ha, cb, rb, hb)
            }
        }
    }

    /// Tests `body` (any non-sphere shape) against a world-space sphere.
    fn against_sphere<R: Rng + ?Sized>(
        &mut self,
        body: &Body,
        center: Vec3,
        radius: f32,
        rng: &mut R,
    ) -> Option<Penetration> {
        let transform = &body.transform;
        match &body.shape {
            Shape::Sphere { radius: own } => primitives::sphere_sphere(
                transform.position,
                own * transform.max_scale(),
                center,
                radius,
                rng,
            ),
            Shape::Plane { normal } => {
                primitives::plane_sphere(transform.position, plane_normal(body, *normal)?, center, radius)
            }
            Shape::Triangle { vertices } => {
                primitives::polygon_sphere(&vertices.map(|v| transform.apply(v)), center, radius, true)
            }
            Shape::Quad { corners } => {
                primitives::polygon_sphere(&corners.map(|v| transform.apply(v)), center, radius, false)
            }
            Shape::Cube { half_extents } => primitives::box_sphere(
                transform.position,
                transform.rotation,
                *half_extents * transform.scale.abs(),
                center,
                radius,
            ),
            Shape::Aabb { .. } => {
                let bounds = world_bounds(body);
                primitives::box_sphere(bounds.center(), Quat::IDENTITY, bounds.half_extents(), center, radius)
            }
            Shape::Mesh(mesh) => {
                primitives::mesh_sphere(mesh, transform, center, radius, &mut self.face_scratch)
            }
        }
    }
}

fn world_bounds(body: &Body) -> crate::core::aabb::Aabb {
    body.shape.world_aabb(&body.transform)
}

fn plane_normal(body: &Body, normal: Vec3) -> Option<Vec3> {
    (body.transform.rotation * normal).try_normalize()
}

/// Box view of cube and AABB shapes; other shapes have no box pair test.
fn oriented_box(body: &Body) -> Option<(Vec3, Quat, Vec3)> {
    match &body.shape {
        Shape::Cube { half_extents } => Some((
            body.transform.position,
            body.transform.rotation,
            *half_extents * body.transform.scale.abs(),
        )),
        Shape::Aabb { .. } => {
            let bounds = world_bounds(body);
            Some((bounds.center(), Quat::IDENTITY, bounds.half_extents()))
        }
        other => {
            log::trace!("no pair test for {} against a box or plane", other.kind());
            None
        }
    }
}
