//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};
use rand::Rng;

/// Advances `rotation` by angular velocity `omega` over `dt` using the
/// quaternion derivative `q' = ½ ω q`, renormalized.
pub fn integrate_rotation(rotation: Quat, omega: Vec3, dt: f32) -> Quat {
    if omega.length_squared() < 1e-12 {
        return rotation;
    }
    let spin = Quat::from_xyzw(omega.x, omega.y, omega.z, 0.0) * rotation;
    let next = Quat::from_xyzw(
        rotation.x + 0.5 * dt * spin.x,
        rotation.y + 0.5 * dt * spin.y,
        rotation.z + 0.5 * dt * spin.z,
        rotation.w + 0.5 * dt * spin.w,
    );
    let len = next.length();
    if len < 1e-6 || !len.is_finite() {
        return rotation;
    }
    next / len
}

/// Rotates a body-space tensor into world space: `R I Rᵀ`.
pub fn world_tensor(body_tensor: Mat3, rotation: Quat) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * body_tensor * r.transpose()
}

/// Closest point to `p` on the segment `[a, b]`.
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Uniformly distributed unit vector.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let candidate = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let len_sq = candidate.length_squared();
        if len_sq > 1e-4 && len_sq <= 1.0 {
            return candidate / len_sq.sqrt();
        }
    }
}

/// True when every component is finite.
pub fn is_finite_vec(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn rotation_about_y_matches_axis_angle() {
        let mut q = Quat::IDENTITY;
        let omega = Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0);
        for _ in 0..1000 {
            q = integrate_rotation(q, omega, 0.001);
        }
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert!(q.dot(expected).abs() > 0.999, "q = {q:?}");
        assert!((q.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn segment_projection_clamps_to_ends() {
        let a = Vec3::ZERO;
        let b = Vec3::X;
        assert_eq!(closest_point_on_segment(Vec3::new(-3.0, 1.0, 0.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec3::new(4.0, 1.0, 0.0), a, b), b);
        let mid = closest_point_on_segment(Vec3::new(0.5, 2.0, 0.0), a, b);
        assert!((mid - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn random_unit_vectors_are_normalized() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let v = random_unit_vector(&mut rng);
            assert!((v.length() - 1.0).abs() < 1e-5);
        }
    }
}
