use glam::Vec3;

use crate::core::body::Body;

/// Inverse mass seen by contact resolution; bodies that do not respond to
/// contacts (static and kinematic) are infinitely heavy.
pub fn contact_inverse_mass(body: &Body) -> f32 {
    if body.responds_to_contacts() {
        body.inverse_mass
    } else {
        0.0
    }
}

/// Inverse effective mass of the pair along `direction` at `point`,
/// including the angular terms of each responding body.
pub fn inverse_effective_mass(a: &Body, b: &Body, point: Vec3, direction: Vec3) -> f32 {
    let angular = |body: &Body| {
        if !body.responds_to_contacts() {
            return 0.0;
        }
        let arm = point - body.transform.position;
        let rotated = arm.cross(direction);
        (body.inverse_inertia_world * rotated).cross(arm).dot(direction)
    };
    contact_inverse_mass(a) + contact_inverse_mass(b) + angular(a) + angular(b)
}

/// Coulomb friction impulse acting on `b` (and negated on `a`) for a contact
/// that received `normal_impulse`. Bounded by `friction * normal_impulse`.
pub fn tangential_impulse(
    a: &Body,
    b: &Body,
    point: Vec3,
    normal: Vec3,
    normal_impulse: f32,
    friction: f32,
) -> Vec3 {
    let limit = friction.max(0.0) * normal_impulse.max(0.0);
    if limit <= f32::EPSILON {
        return Vec3::ZERO;
    }

    let relative = b.velocity_at(point) - a.velocity_at(point);
    let sliding = relative - normal * relative.dot(normal);
    let speed = sliding.length();
    if speed < 1e-6 {
        return Vec3::ZERO;
    }
    let tangent = sliding / speed;

    let denominator = inverse_effective_mass(a, b, point, tangent);
    if denominator <= f32::EPSILON {
        return Vec3::ZERO;
    }
    let magnitude = (speed / denominator).min(limit);
    -tangent * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{body::BodyDescriptor, shape::Shape},
        utils::allocator::EntityId,
        world::commands::BodyHandle,
    };

    fn body(index: u32, descriptor: BodyDescriptor) -> Body {
        Body::from_descriptor(EntityId::from_index(index), BodyHandle(index as u64), &descriptor, 1.0)
    }

    #[test]
    fn sliding_box_is_slowed_but_not_reversed() {
        let floor = body(0, BodyDescriptor::fixed(Shape::plane(glam::Vec3::Y)));
        let slider = body(
            1,
            BodyDescriptor::new(Shape::sphere(0.5))
                .with_mass(1.0)
                .with_position(Vec3::new(0.0, 0.5, 0.0))
                .with_velocity(Vec3::new(0.2, 0.0, 0.0)),
        );
        let impulse = tangential_impulse(&floor, &slider, Vec3::ZERO, Vec3::Y, 10.0, 0.5);
        assert!(impulse.x < 0.0);
        // Never more than what stops the contact point.
        assert!(impulse.length() <= 0.2 + 1e-5);
    }

    #[test]
    fn weak_normal_impulse_caps_friction() {
        let floor = body(0, BodyDescriptor::fixed(Shape::plane(Vec3::Y)));
        let slider = body(
            1,
            BodyDescriptor::new(Shape::cube(Vec3::splat(0.5)))
                .with_mass(1.0)
                .with_velocity(Vec3::new(5.0, 0.0, 0.0)),
        );
        let impulse = tangential_impulse(&floor, &slider, slider.transform.position, Vec3::Y, 1.0, 0.3);
        assert!((impulse.length() - 0.3).abs() < 1e-5);
    }
}
