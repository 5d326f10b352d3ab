//! Pairwise shape tests in world space.
//!
//! Every test returns a [`Penetration`] whose normal points from the first
//! argument toward the second, or `None` when the shapes are apart. Cheap
//! rejections run before any per-face or per-corner loop.

use glam::{Mat3, Quat, Vec3};
use rand::Rng;

use super::record::Penetration;
use crate::{
    core::{
        aabb::Aabb,
        mesh::{Face, Mesh},
        types::Transform,
    },
    utils::math::{closest_point_on_segment, random_unit_vector},
};

const EPSILON: f32 = 1e-6;

pub fn sphere_sphere<R: Rng + ?Sized>(
    center_a: Vec3,
    radius_a: f32,
    center_b: Vec3,
    radius_b: f32,
    rng: &mut R,
) -> Option<Penetration> {
    let offset = center_b - center_a;
    let reach = radius_a + radius_b;
    let distance_sq = offset.length_squared();
    if distance_sq > reach * reach {
        return None;
    }
    let distance = distance_sq.sqrt();
    // Coincident centres have no preferred axis.
    let normal = if distance > EPSILON {
        offset / distance
    } else {
        random_unit_vector(rng)
    };
    let depth = reach - distance;
    Some(Penetration::new(
        normal,
        depth,
        center_a + normal * (radius_a - depth * 0.5),
    ))
}

/// Infinite plane treated as a solid half-space below `normal`.
pub fn plane_sphere(point: Vec3, normal: Vec3, center: Vec3, radius: f32) -> Option<Penetration> {
    let distance = normal.dot(center - point);
    if distance >= radius {
        return None;
    }
    Some(Penetration::new(
        normal,
        radius - distance,
        center - normal * distance,
    ))
}

/// Double-sided polygon against a sphere. Quads must contain the projected
/// centre; triangles also accept edge and corner contacts.
pub fn polygon_sphere(vertices: &[Vec3], center: Vec3, radius: f32, edge_fallback: bool) -> Option<Penetration> {
    if vertices.len() < 3 {
        return None;
    }
    let face_normal = (vertices[1] - vertices[0])
        .cross(vertices[2] - vertices[0])
        .try_normalize()?;
    let distance = face_normal.dot(center - vertices[0]);
    if distance.abs() >= radius {
        return None;
    }

    let projected = center - face_normal * distance;
    if inside_footprint(vertices, face_normal, projected) {
        let side = if distance < 0.0 { -face_normal } else { face_normal };
        return Some(Penetration::new(side, radius - distance.abs(), projected));
    }
    if !edge_fallback {
        return None;
    }

    let closest = (0..vertices.len())
        .map(|i| closest_point_on_segment(center, vertices[i], vertices[(i + 1) % vertices.len()]))
        .min_by(|a, b| a.distance_squared(center).total_cmp(&b.distance_squared(center)))?;
    let offset = center - closest;
    let gap = offset.length();
    if gap >= radius {
        return None;
    }
    let normal = if gap > EPSILON {
        offset / gap
    } else if distance < 0.0 {
        -face_normal
    } else {
        face_normal
    };
    Some(Penetration::new(normal, radius - gap, closest))
}

fn inside_footprint(vertices: &[Vec3], normal: Vec3, point: Vec3) -> bool {
    (0..vertices.len()).all(|i| {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        (b - a).cross(point - a).dot(normal) >= -EPSILON
    })
}

/// Oriented box (`rotation`, world `half_extents`) against a sphere.
pub fn box_sphere(
    center: Vec3,
    rotation: Quat,
    half_extents: Vec3,
    sphere_center: Vec3,
    radius: f32,
) -> Option<Penetration> {
    let local = rotation.conjugate() * (sphere_center - center);

    // Six face planes; any plane farther than the radius separates.
    let mut nearest_face = (f32::NEG_INFINITY, Vec3::ZERO);
    for axis in 0..3 {
        for sign in [1.0_f32, -1.0] {
            let signed = local[axis] * sign - half_extents[axis];
            if signed > radius {
                return None;
            }
            if signed > nearest_face.0 {
                let mut normal = Vec3::ZERO;
                normal[axis] = sign;
                nearest_face = (signed, normal);
            }
        }
    }

    let clamped = local.clamp(-half_extents, half_extents);
    let offset = local - clamped;
    let gap = offset.length();
    let (local_normal, depth, local_contact) = if gap > EPSILON {
        if gap >= radius {
            return None;
        }
        (offset / gap, radius - gap, clamped)
    } else {
        let (signed, normal) = nearest_face;
        (normal, radius - signed, local - normal * signed)
    };
    Some(Penetration::new(
        rotation * local_normal,
        depth,
        center + rotation * local_contact,
    ))
}

/// Separating-axis test between two oriented boxes. Contact points are the
/// corners of each box that lie inside the other, falling back to a single
/// midpoint.
pub fn box_box(
    center_a: Vec3,
    rotation_a: Quat,
    half_a: Vec3,
    center_b: Vec3,
    rotation_b: Quat,
    half_b: Vec3,
) -> Option<Penetration> {
    let axes_a = Mat3::from_quat(rotation_a);
    let axes_b = Mat3::from_quat(rotation_b);
    let offset = center_b - center_a;

    let mut axes: Vec<Vec3> = Vec::with_capacity(15);
    for i in 0..3 {
        axes.push(axes_a.col(i));
        axes.push(axes_b.col(i));
    }
    for i in 0..3 {
        for j in 0..3 {
            if let Some(axis) = axes_a.col(i).cross(axes_b.col(j)).try_normalize() {
                axes.push(axis);
            }
        }
    }

    let extent = |axes: &Mat3, half: Vec3, axis: Vec3| {
        (0..3).map(|i| axes.col(i).dot(axis).abs() * half[i]).sum::<f32>()
    };

    let mut best = (f32::INFINITY, Vec3::ZERO);
    for axis in axes {
        let projection = offset.dot(axis);
        let overlap = extent(&axes_a, half_a, axis) + extent(&axes_b, half_b, axis) - projection.abs();
        if overlap <= 0.0 {
            return None;
        }
        if overlap < best.0 - EPSILON {
            best = (overlap, if projection < 0.0 { -axis } else { axis });
        }
    }

    let mut points: Vec<Vec3> = box_corners(center_b, rotation_b, half_b)
        .into_iter()
        .filter(|&p| inside_box(center_a, rotation_a, half_a, p))
        .collect();
    points.extend(
        box_corners(center_a, rotation_a, half_a)
            .into_iter()
            .filter(|&p| inside_box(center_b, rotation_b, half_b, p)),
    );
    if points.is_empty() {
        points.push((center_a + center_b) * 0.5);
    }
    Some(Penetration::with_points(best.1, best.0, points))
}

/// Plane half-space against a convex point set (box corners). Contact points
/// are the penetrating corners.
pub fn plane_corners(point: Vec3, normal: Vec3, corners: &[Vec3]) -> Option<Penetration> {
    let deepest = corners
        .iter()
        .map(|&c| normal.dot(c - point))
        .fold(f32::INFINITY, f32::min);
    if deepest >= 0.0 {
        return None;
    }
    let points: Vec<Vec3> = corners
        .iter()
        .copied()
        .filter(|&c| normal.dot(c - point) < 0.0)
        .collect();
    Some(Penetration::with_points(normal, -deepest, points))
}

/// Axis-aligned boxes; the normal is the axis of least overlap and contact
/// points are the corners of the overlap region on that axis' mid-plane.
pub fn aabb_aabb(a: &Aabb, b: &Aabb) -> Option<Penetration> {
    let overlap = a.max.min(b.max) - a.min.max(b.min);
    if overlap.min_element() <= 0.0 {
        return None;
    }
    let axis = if overlap.x <= overlap.y && overlap.x <= overlap.z {
        0
    } else if overlap.y <= overlap.z {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = if b.center()[axis] >= a.center()[axis] { 1.0 } else { -1.0 };

    let region = Aabb::new(a.min.max(b.min), a.max.min(b.max));
    let mid = region.center()[axis];
    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
    let points = [(0, 0), (1, 0), (1, 1), (0, 1)]
        .into_iter()
        .map(|(du, dv)| {
            let mut p = Vec3::ZERO;
            p[axis] = mid;
            p[u] = if du == 0 { region.min[u] } else { region.max[u] };
            p[v] = if dv == 0 { region.min[v] } else { region.max[v] };
            p
        })
        .collect();
    Some(Penetration::with_points(normal, overlap[axis], points))
}

/// Mesh against a sphere, keeping the deepest face contact.
pub fn mesh_sphere(
    mesh: &Mesh,
    transform: &Transform,
    center: Vec3,
    radius: f32,
    candidates: &mut Vec<u32>,
) -> Option<Penetration> {
    let reach = mesh.bounding_radius() * transform.max_scale() + radius;
    if center.distance_squared(transform.position) > reach * reach {
        return None;
    }

    let min_scale = transform.scale.abs().min_element().max(EPSILON);
    let local_region = Aabb::from_center_half_extents(
        transform.inverse_apply(center),
        Vec3::splat(radius / min_scale),
    );
    if !mesh.bounds().overlaps(&local_region) {
        return None;
    }

    candidates.clear();
    mesh.faces_near(&local_region, candidates);
    let mut deepest: Option<Penetration> = None;
    for &id in candidates.iter() {
        let Some(face) = mesh.face(id) else {
            continue;
        };
        let hit = match face {
            Face::Triangle(v) => polygon_sphere(&v.map(|p| transform.apply(p)), center, radius, true),
            Face::Quad(v) => polygon_sphere(&v.map(|p| transform.apply(p)), center, radius, false),
        };
        if let Some(hit) = hit {
            if deepest.as_ref().map_or(true, |best| hit.depth > best.depth) {
                deepest = Some(hit);
            }
        }
    }
    deepest
}

pub fn box_corners(center: Vec3, rotation: Quat, half: Vec3) -> [Vec3; 8] {
    let mut corners = [Vec3::ZERO; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let local = Vec3::new(
            if i & 1 != 0 { half.x } else { -half.x },
            if i & 2 != 0 { half.y } else { -half.y },
            if i & 4 != 0 { half.z } else { -half.z },
        );
        *corner = center + rotation * local;
    }
    corners
}

fn inside_box(center: Vec3, rotation: Quat, half: Vec3, point: Vec3) -> bool {
    let local = rotation.conjugate() * (point - center);
    local.abs().cmple(half + Vec3::splat(1e-4)).all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn coincident_spheres_get_unit_normal() {
        let hit = sphere_sphere(Vec3::ZERO, 1.0, Vec3::ZERO, 1.0, &mut rng()).expect("overlap");
        assert!((hit.normal.length() - 1.0).abs() < 1e-5);
        assert!((hit.depth - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sphere_below_plane_is_pushed_up() {
        let hit = plane_sphere(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 0.5, 0.0), 1.0).expect("hit");
        assert_eq!(hit.normal, Vec3::Y);
        assert!((hit.depth - 0.5).abs() < 1e-6);
        assert!(plane_sphere(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 1.5, 0.0), 1.0).is_none());
    }

    #[test]
    fn quad_rejects_outside_footprint_but_triangle_catches_edge() {
        let square = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, -1.0),
        ];
        let beside_edge = Vec3::new(1.2, 0.1, 0.0);
        assert!(polygon_sphere(&square, beside_edge, 0.5, false).is_none());

        let triangle = [square[0], square[1], square[2]];
        let near_corner = Vec3::new(1.2, 0.0, 1.2);
        let hit = polygon_sphere(&triangle, near_corner, 0.5, true).expect("corner contact");
        assert!((hit.points[0] - square[2]).length() < 1e-5);
    }

    #[test]
    fn sphere_on_top_of_quad_gets_upward_normal() {
        let square = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, -1.0),
        ];
        let hit = polygon_sphere(&square, Vec3::new(0.2, 0.4, 0.1), 0.5, false).expect("hit");
        assert!((hit.normal - Vec3::Y).length() < 1e-5);
        assert!((hit.depth - 0.1).abs() < 1e-5);
    }

    #[test]
    fn box_sphere_face_and_inside_cases() {
        let face = box_sphere(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE, Vec3::new(1.5, 0.0, 0.0), 1.0)
            .expect("face contact");
        assert!((face.normal - Vec3::X).length() < 1e-5);
        assert!((face.depth - 0.5).abs() < 1e-5);

        let inside = box_sphere(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE, Vec3::new(0.0, 0.8, 0.0), 0.5)
            .expect("inside");
        assert!((inside.normal - Vec3::Y).length() < 1e-5);
        assert!((inside.depth - 0.7).abs() < 1e-5);

        assert!(box_sphere(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE, Vec3::new(1.8, 1.8, 0.0), 1.0).is_none());
    }

    #[test]
    fn resting_box_on_plane_has_four_contacts() {
        let corners = box_corners(Vec3::new(0.0, 0.45, 0.0), Quat::IDENTITY, Vec3::splat(0.5));
        let hit = plane_corners(Vec3::ZERO, Vec3::Y, &corners).expect("hit");
        assert_eq!(hit.points.len(), 4);
        assert!((hit.depth - 0.05).abs() < 1e-5);
    }

    #[test]
    fn stacked_aabbs_pick_vertical_axis() {
        let floor = Aabb::new(Vec3::new(-5.0, -1.0, -5.0), Vec3::new(5.0, 0.0, 5.0));
        let crate_box = Aabb::new(Vec3::new(-0.5, -0.1, -0.5), Vec3::new(0.5, 0.9, 0.5));
        let hit = aabb_aabb(&floor, &crate_box).expect("hit");
        assert_eq!(hit.normal, Vec3::Y);
        assert!((hit.depth - 0.1).abs() < 1e-5);
        assert_eq!(hit.points.len(), 4);
    }

    #[test]
    fn rotated_boxes_overlap_under_sat() {
        let hit = box_box(
            Vec3::ZERO,
            Quat::from_rotation_z(45.0_f32.to_radians()),
            Vec3::ONE,
            Vec3::new(2.1, 0.0, 0.0),
            Quat::IDENTITY,
            Vec3::ONE,
        )
        .expect("rotated boxes collide");
        assert!(hit.depth > 0.0);
        assert!(hit.normal.x > 0.9);
    }
}
