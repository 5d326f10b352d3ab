//! Collision response.
//!
//! Two strategies share one entry point, [`resolve`]: a rigid-body impulse
//! model working on momenta, and a simplified push-back model working on
//! linear velocity only. Both separate the bodies by the penetration depth
//! and share the degeneracy guards and the resting heuristic.

use std::{fmt, str::FromStr};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::friction::{inverse_effective_mass, tangential_impulse};
use crate::{
    collision::record::CollisionRecord,
    config::{
        ENERGY_GROWTH_LIMIT, MAX_RELATIVE_SPEED, REST_MIN_CONTACT_POINTS, REST_MOMENTUM_FACTOR,
        REST_NORMAL_MIN_Y,
    },
    core::{body::Body, types::Material},
    error::{PhysicsError, ResolveError},
    utils::allocator::EntityId,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolverKind {
    #[default]
    Impulse,
    PushBack,
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolverKind::Impulse => "impulse",
            ResolverKind::PushBack => "push-back",
        })
    }
}

impl FromStr for ResolverKind {
    type Err = PhysicsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "impulse" | "rigid" | "rigid-body" => Ok(ResolverKind::Impulse),
            "push-back" | "pushback" | "simple" => Ok(ResolverKind::PushBack),
            _ => Err(PhysicsError::UnknownStrategy {
                kind: "resolver",
                value: value.to_owned(),
            }),
        }
    }
}

/// What a successful resolution did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Resolution {
    /// Normal impulse magnitude applied along the record normal.
    pub normal_impulse: f32,
    pub friction_impulse: Vec3,
    /// Momentum was scaled back after an energy gain.
    pub energy_rescaled: bool,
    /// Body that entered the resting state, paired with the body it rests on.
    pub rested: Option<(EntityId, EntityId)>,
}

/// Resolves one confirmed collision. `a` and `b` must be the record's bodies
/// in order. On error nothing has been modified.
pub fn resolve(
    kind: ResolverKind,
    a: &mut Body,
    b: &mut Body,
    record: &CollisionRecord,
) -> Result<Resolution, ResolveError> {
    if !a.responds_to_contacts() && !b.responds_to_contacts() {
        return Err(ResolveError::Immovable);
    }
    let normal = record.normal();
    if normal.length_squared() < 0.5 {
        return Err(ResolveError::ZeroNormal);
    }
    let point = record.contact_point();
    let relative = b.velocity_at(point) - a.velocity_at(point);
    let speed = relative.length();
    if !speed.is_finite() || speed > MAX_RELATIVE_SPEED {
        return Err(ResolveError::RunawayVelocity(speed));
    }

    let energy_before = a.kinetic_energy() + b.kinetic_energy();
    let pair = Material::combine_pair(&a.material, &b.material);

    let mut resolution = match kind {
        ResolverKind::Impulse => {
            apply_impulses(a, b, point, normal, relative, pair.restitution, pair.friction)?
        }
        ResolverKind::PushBack => {
            let next_a = push_back(a, normal, -1.0, pair.restitution, pair.friction)?;
            let next_b = push_back(b, normal, 1.0, pair.restitution, pair.friction)?;
            for (body, next) in [(&mut *a, next_a), (&mut *b, next_b)] {
                if let Some(velocity) = next {
                    body.linear_momentum = velocity * body.mass;
                    body.refresh_velocity();
                    body.wake();
                }
            }
            Resolution::default()
        }
    };

    separate(a, b, normal, record.depth());

    // Kinematic partners inject energy; only closed pairs are checked.
    let closed = !a.is_kinematic() && !b.is_kinematic();
    let energy_after = a.kinetic_energy() + b.kinetic_energy();
    if closed && energy_before > 1e-9 && energy_after > ENERGY_GROWTH_LIMIT * energy_before {
        let factor = (energy_before / energy_after).sqrt();
        for body in [&mut *a, &mut *b] {
            if body.responds_to_contacts() {
                body.linear_momentum *= factor;
                body.angular_momentum *= factor;
                body.refresh_velocity();
            }
        }
        log::debug!(
            "rescaled momentum of {:?}/{:?}: energy {energy_before:.4} -> {energy_after:.4}",
            a.id,
            b.id
        );
        resolution.energy_rescaled = true;
    }

    resolution.rested = try_rest(b, a, normal, record.contact_points.len())
        .or_else(|| try_rest(a, b, -normal, record.contact_points.len()));
    Ok(resolution)
}

fn apply_impulses(
    a: &mut Body,
    b: &mut Body,
    point: Vec3,
    normal: Vec3,
    relative: Vec3,
    restitution: f32,
    friction: f32,
) -> Result<Resolution, ResolveError> {
    let closing = relative.dot(normal);
    if closing >= 0.0 {
        // Already separating; only positional correction applies.
        return Ok(Resolution::default());
    }
    let denominator = inverse_effective_mass(a, b, point, normal);
    if !denominator.is_finite() || denominator < 1e-9 {
        return Err(ResolveError::DegenerateMass(denominator));
    }
    let magnitude = -(1.0 + restitution) * closing / denominator;
    let impulse = normal * magnitude;
    if !impulse.is_finite() {
        return Err(ResolveError::NonFinite);
    }
    b.apply_impulse(impulse, point);
    a.apply_impulse(-impulse, point);

    let friction_impulse = tangential_impulse(a, b, point, normal, magnitude, friction);
    if friction_impulse.is_finite() && friction_impulse != Vec3::ZERO {
        b.apply_impulse(friction_impulse, point);
        a.apply_impulse(-friction_impulse, point);
    }

    Ok(Resolution {
        normal_impulse: magnitude,
        friction_impulse,
        ..Resolution::default()
    })
}

/// Reflected linear velocity for one side, or `None` when it is left alone.
/// `side` is +1 for the body the normal points toward, -1 for the other.
fn push_back(
    body: &Body,
    normal: Vec3,
    side: f32,
    restitution: f32,
    friction: f32,
) -> Result<Option<Vec3>, ResolveError> {
    if !body.responds_to_contacts() {
        return Ok(None);
    }
    let outward = normal * side;
    let velocity = body.velocity.linear;
    let into = velocity.dot(outward);
    if into >= 0.0 {
        return Ok(None);
    }
    let tangential = velocity - outward * into;
    let next = tangential * (1.0 - friction).max(0.0) - outward * into * restitution;
    if !next.is_finite() {
        return Err(ResolveError::NonFinite);
    }
    Ok(Some(next))
}

/// Moves responding bodies apart along the normal by `depth`, split evenly
/// when both respond.
fn separate(a: &mut Body, b: &mut Body, normal: Vec3, depth: f32) {
    if depth <= 0.0 {
        return;
    }
    let (share_a, share_b) = match (a.responds_to_contacts(), b.responds_to_contacts()) {
        (true, true) => (0.5, 0.5),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => return,
    };
    a.transform.position -= normal * depth * share_a;
    b.transform.position += normal * depth * share_b;
    a.refresh_geometry();
    b.refresh_geometry();
}

/// Puts `body` to rest on `support` when the contact is flat, well supported
/// and nearly still. `up` points from `support` toward `body`.
fn try_rest(body: &mut Body, support: &Body, up: Vec3, contact_points: usize) -> Option<(EntityId, EntityId)> {
    if !body.responds_to_contacts() || body.is_resting() {
        return None;
    }
    let supported = support.is_static() || support.is_resting();
    let flat = up.y >= REST_NORMAL_MIN_Y;
    let settled = body.linear_momentum.length() < REST_MOMENTUM_FACTOR * body.mass;
    if supported && flat && settled && contact_points >= REST_MIN_CONTACT_POINTS {
        body.rest();
        Some((body.id, support.id))
    } else {
        None
    }
}
