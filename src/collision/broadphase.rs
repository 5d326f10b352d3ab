use std::{collections::HashSet, fmt, str::FromStr};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{
    octree::{Octree, OctreeConfig, Reposition},
    sweep::SweepAndPrune,
};
use crate::{
    core::{aabb::Aabb, body::Body},
    error::PhysicsError,
    utils::allocator::{Arena, EntityId},
};

/// Active broad-phase strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadPhaseKind {
    #[default]
    Octree,
    SweepAndPrune,
}

impl fmt::Display for BroadPhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BroadPhaseKind::Octree => "octree",
            BroadPhaseKind::SweepAndPrune => "sweep-and-prune",
        })
    }
}

impl FromStr for BroadPhaseKind {
    type Err = PhysicsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "octree" => Ok(BroadPhaseKind::Octree),
            "sweep" | "sap" | "sweep-and-prune" | "sweep_and_prune" => {
                Ok(BroadPhaseKind::SweepAndPrune)
            }
            _ => Err(PhysicsError::UnknownStrategy {
                kind: "broad-phase",
                value: value.to_owned(),
            }),
        }
    }
}

/// Outcome of moving a body inside the active index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    Kept,
    /// The body left the world bound and was removed from the index.
    Evicted,
}

/// Owns both spatial indices; only the active one holds bodies.
pub struct BroadPhase {
    kind: BroadPhaseKind,
    world: Aabb,
    octree: Octree<EntityId>,
    sweep: SweepAndPrune,
    scratch: Vec<EntityId>,
    seen: HashSet<(EntityId, EntityId)>,
}

impl BroadPhase {
    pub fn new(kind: BroadPhaseKind, half_extent: f32, sweep_bands: usize) -> Self {
        let world = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(half_extent));
        Self {
            kind,
            world,
            octree: Octree::new(world, OctreeConfig::default()),
            sweep: SweepAndPrune::new(half_extent, sweep_bands),
            scratch: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn kind(&self) -> BroadPhaseKind {
        self.kind
    }

    pub fn octree(&self) -> &Octree<EntityId> {
        &self.octree
    }

    pub fn sweep(&self) -> &SweepAndPrune {
        &self.sweep
    }

    /// Element count of the active index.
    pub fn len(&self) -> usize {
        match self.kind {
            BroadPhaseKind::Octree => self.octree.len(),
            BroadPhaseKind::SweepAndPrune => self.sweep.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EntityId) -> bool {
        match self.kind {
            BroadPhaseKind::Octree => self.octree.contains(id),
            BroadPhaseKind::SweepAndPrune => self.sweep.contains(id),
        }
    }

    fn in_world(&self, bounds: &Aabb) -> bool {
        bounds.is_unbounded() || self.world.contains(bounds)
    }

    /// Adds `body`; returns `false` when it lies outside the world bound.
    pub fn insert(&mut self, body: &Body) -> bool {
        if !self.in_world(&body.bounds) {
            return false;
        }
        match self.kind {
            BroadPhaseKind::Octree => self.octree.insert(body.id, body.bounds),
            BroadPhaseKind::SweepAndPrune => {
                self.sweep
                    .add(body.id, body.bounds, body.filter, body.is_static());
                true
            }
        }
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        match self.kind {
            BroadPhaseKind::Octree => self.octree.remove(id),
            BroadPhaseKind::SweepAndPrune => self.sweep.remove(id),
        }
    }

    pub fn update(&mut self, body: &Body) -> IndexUpdate {
        if !self.in_world(&body.bounds) {
            self.remove(body.id);
            return IndexUpdate::Evicted;
        }
        match self.kind {
            BroadPhaseKind::Octree => match self.octree.reposition(body.id, body.bounds) {
                Reposition::Unchanged | Reposition::Moved => IndexUpdate::Kept,
                Reposition::LeftBounds | Reposition::Missing => IndexUpdate::Evicted,
            },
            BroadPhaseKind::SweepAndPrune => {
                self.sweep.update(body.id, body.bounds);
                IndexUpdate::Kept
            }
        }
    }

    /// Propagates a filter or physics-type change.
    pub fn refresh_filter(&mut self, body: &Body) {
        if self.kind == BroadPhaseKind::SweepAndPrune {
            self.sweep.set_filter(body.id, body.filter, body.is_static());
        }
    }

    /// Raw candidate pairs `(low, high)` for this sub-step. Static/static and
    /// filter-rejected pairs are excluded; AABB overlap is not verified.
    pub fn candidate_pairs(
        &mut self,
        bodies: &Arena<Body>,
        moving: &[EntityId],
        out: &mut Vec<(EntityId, EntityId)>,
    ) {
        match self.kind {
            BroadPhaseKind::SweepAndPrune => self.sweep.find_pairs(out),
            BroadPhaseKind::Octree => {
                self.seen.clear();
                for &id in moving {
                    let Some(body) = bodies.get(id) else {
                        continue;
                    };
                    self.scratch.clear();
                    self.octree.candidates(id, &mut self.scratch);
                    for &other_id in &self.scratch {
                        let Some(other) = bodies.get(other_id) else {
                            continue;
                        };
                        if !body.filter.accepts(&other.filter) {
                            continue;
                        }
                        let pair = if id < other_id {
                            (id, other_id)
                        } else {
                            (other_id, id)
                        };
                        if self.seen.insert(pair) {
                            out.push(pair);
                        }
                    }
                }
            }
        }
    }

    /// Items of the active index whose bounds overlap `region`.
    pub fn query(&self, region: &Aabb, bodies: &Arena<Body>, out: &mut Vec<EntityId>) {
        match self.kind {
            BroadPhaseKind::Octree => self.octree.query(region, out),
            BroadPhaseKind::SweepAndPrune => out.extend(
                bodies
                    .iter()
                    .filter(|body| self.sweep.contains(body.id) && body.bounds.overlaps(region))
                    .map(|body| body.id),
            ),
        }
    }

    /// Switches strategy and rebuilds the newly active index from `bodies`.
    /// Returns bodies that no longer fit the world bound.
    pub fn switch_to(&mut self, kind: BroadPhaseKind, bodies: &Arena<Body>) -> Vec<EntityId> {
        self.octree.clear();
        self.sweep.clear();
        self.kind = kind;
        let mut rejected = Vec::new();
        for body in bodies.iter() {
            if !self.insert(body) {
                rejected.push(body.id);
            }
        }
        log::debug!("broad phase switched to {kind}; {} bodies indexed", self.len());
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_parse() {
        assert_eq!("octree".parse::<BroadPhaseKind>(), Ok(BroadPhaseKind::Octree));
        assert_eq!("SAP".parse::<BroadPhaseKind>(), Ok(BroadPhaseKind::SweepAndPrune));
        assert!(matches!(
            "grid".parse::<BroadPhaseKind>(),
            Err(PhysicsError::UnknownStrategy { .. })
        ));
    }
}
