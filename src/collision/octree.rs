//! Loose-free, arena-backed octree.
//!
//! Items are stored at the deepest node whose bounds strictly contain them;
//! items straddling a split stay at the parent. Nodes live in a flat arena and
//! reference each other through [`NodeId`]s, so pruning never leaves dangling
//! parent or child links. The same structure indexes world bodies
//! (`Octree<EntityId>`) and static mesh faces (`Octree<u32>`).

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use glam::Vec3;

use crate::{
    config::{OCTREE_MAX_DEPTH, OCTREE_MAX_OCCUPANTS},
    core::aabb::Aabb,
};

/// Subdivision policy.
#[derive(Debug, Clone, Copy)]
pub struct OctreeConfig {
    /// Occupants a leaf may hold before it subdivides.
    pub max_occupants: usize,
    pub max_depth: u32,
    /// Leaves whose largest half extent is below this never subdivide.
    pub min_half_extent: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_occupants: OCTREE_MAX_OCCUPANTS,
            max_depth: OCTREE_MAX_DEPTH,
            min_half_extent: 0.25,
        }
    }
}

/// Index of a node inside the octree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    fn slot(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct SpatialNode<T> {
    pub bounds: Aabb,
    pub depth: u32,
    pub parent: Option<NodeId>,
    pub children: Option<[NodeId; 8]>,
    pub occupants: Vec<T>,
}

impl<T> SpatialNode<T> {
    fn new(bounds: Aabb, depth: u32, parent: Option<NodeId>) -> Self {
        Self {
            bounds,
            depth,
            parent,
            children: None,
            occupants: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    node: NodeId,
    bounds: Aabb,
}

/// Result of moving an item to new bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reposition {
    /// Still inside its node.
    Unchanged,
    /// Re-homed under an ancestor.
    Moved,
    /// Left the root bound and was removed.
    LeftBounds,
    /// The item was never inserted.
    Missing,
}

#[derive(Debug, Clone)]
pub struct Octree<T> {
    nodes: Vec<Option<SpatialNode<T>>>,
    free_nodes: Vec<u32>,
    placements: HashMap<T, Placement>,
    config: OctreeConfig,
}

/// Octant of `point` relative to `center`: bit 0 = +x, bit 1 = +y, bit 2 = +z.
fn octant(center: Vec3, point: Vec3) -> usize {
    (point.x >= center.x) as usize
        | ((point.y >= center.y) as usize) << 1
        | ((point.z >= center.z) as usize) << 2
}

fn octant_bounds(parent: &Aabb, index: usize) -> Aabb {
    let center = parent.center();
    let quarter = parent.half_extents() * 0.5;
    let sign = |bit: usize| if index & bit != 0 { 1.0 } else { -1.0 };
    let child_center = center + Vec3::new(quarter.x * sign(1), quarter.y * sign(2), quarter.z * sign(4));
    Aabb::from_center_half_extents(child_center, quarter)
}

impl<T> Octree<T>
where
    T: Copy + Eq + Hash + Debug,
{
    pub fn new(bounds: Aabb, config: OctreeConfig) -> Self {
        Self {
            nodes: vec![Some(SpatialNode::new(bounds, 0, None))],
            free_nodes: Vec::new(),
            placements: HashMap::new(),
            config,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.node_ref(NodeId::ROOT).bounds
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn contains(&self, item: T) -> bool {
        self.placements.contains_key(&item)
    }

    /// Node currently holding `item`.
    pub fn node_of(&self, item: T) -> Option<NodeId> {
        self.placements.get(&item).map(|placement| placement.node)
    }

    pub fn node(&self, id: NodeId) -> Option<&SpatialNode<T>> {
        self.nodes.get(id.slot()).and_then(|slot| slot.as_ref())
    }

    /// Live node count, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Sum of occupants over all nodes; equals [`Octree::len`] when the
    /// one-node-per-item invariant holds.
    pub fn occupancy(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .map(|node| node.occupants.len())
            .sum()
    }

    pub fn clear(&mut self) {
        let bounds = self.bounds();
        self.nodes = vec![Some(SpatialNode::new(bounds, 0, None))];
        self.free_nodes.clear();
        self.placements.clear();
    }

    /// Inserts `item`. Unbounded items (infinite planes) are pinned to the
    /// root. Returns `false` when the bounds leave the root; an item that is
    /// already present is repositioned instead.
    pub fn insert(&mut self, item: T, bounds: Aabb) -> bool {
        if self.placements.contains_key(&item) {
            return !matches!(
                self.reposition(item, bounds),
                Reposition::LeftBounds | Reposition::Missing
            );
        }
        if !bounds.is_unbounded() && !self.bounds().contains(&bounds) {
            return false;
        }
        self.insert_from(NodeId::ROOT, item, bounds);
        true
    }

    pub fn remove(&mut self, item: T) -> bool {
        let Some(placement) = self.placements.remove(&item) else {
            return false;
        };
        let node = self.node_mut(placement.node);
        if let Some(position) = node.occupants.iter().position(|&other| other == item) {
            node.occupants.swap_remove(position);
        }
        self.prune_from(placement.node);
        true
    }

    /// Updates the bounds of `item`, walking up ancestors when it escaped its node.
    pub fn reposition(&mut self, item: T, bounds: Aabb) -> Reposition {
        let Some(placement) = self.placements.get_mut(&item) else {
            return Reposition::Missing;
        };
        placement.bounds = bounds;
        let current = placement.node;

        if bounds.is_unbounded() {
            if current == NodeId::ROOT {
                return Reposition::Unchanged;
            }
            self.detach(item, current);
            self.insert_from(NodeId::ROOT, item, bounds);
            return Reposition::Moved;
        }

        if self.fits(current, &bounds) {
            return Reposition::Unchanged;
        }

        let mut ancestor = self.node_ref(current).parent;
        while let Some(candidate) = ancestor {
            if self.fits(candidate, &bounds) {
                self.detach(item, current);
                self.insert_from(candidate, item, bounds);
                self.prune_from(current);
                return Reposition::Moved;
            }
            ancestor = self.node_ref(candidate).parent;
        }

        self.remove(item);
        Reposition::LeftBounds
    }

    /// Raw candidates for `item`: co-occupants of its node, occupants of
    /// overlapping descendants, and occupants of every ancestor.
    pub fn candidates(&self, item: T, out: &mut Vec<T>) {
        let Some(placement) = self.placements.get(&item) else {
            return;
        };
        let home = self.node_ref(placement.node);
        out.extend(home.occupants.iter().copied().filter(|&other| other != item));

        let mut stack: Vec<NodeId> = Vec::new();
        if let Some(children) = home.children {
            stack.extend(children);
        }
        while let Some(id) = stack.pop() {
            let node = self.node_ref(id);
            if !node.bounds.overlaps(&placement.bounds) {
                continue;
            }
            out.extend(node.occupants.iter().copied());
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }

        let mut ancestor = home.parent;
        while let Some(id) = ancestor {
            let node = self.node_ref(id);
            out.extend(node.occupants.iter().copied());
            ancestor = node.parent;
        }
    }

    /// Items whose stored bounds overlap `region`.
    pub fn query(&self, region: &Aabb, out: &mut Vec<T>) {
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = self.node_ref(id);
            if id != NodeId::ROOT && !node.bounds.overlaps(region) {
                continue;
            }
            for &item in &node.occupants {
                if self
                    .placements
                    .get(&item)
                    .is_some_and(|placement| placement.bounds.overlaps(region))
                {
                    out.push(item);
                }
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    pub fn stored_bounds(&self, item: T) -> Option<Aabb> {
        self.placements.get(&item).map(|placement| placement.bounds)
    }

    fn fits(&self, id: NodeId, bounds: &Aabb) -> bool {
        let node = self.node_ref(id);
        if id == NodeId::ROOT {
            node.bounds.contains(bounds)
        } else {
            node.bounds.strictly_contains(bounds)
        }
    }

    fn insert_from(&mut self, start: NodeId, item: T, bounds: Aabb) {
        let mut current = start;
        loop {
            let node = self.node_ref(current);
            let Some(children) = node.children else {
                break;
            };
            let child = children[octant(node.bounds.center(), bounds.center())];
            if self.node_ref(child).bounds.strictly_contains(&bounds) {
                current = child;
            } else {
                break;
            }
        }

        self.node_mut(current).occupants.push(item);
        self.placements.insert(
            item,
            Placement {
                node: current,
                bounds,
            },
        );

        let node = self.node_ref(current);
        if node.is_leaf()
            && node.occupants.len() > self.config.max_occupants
            && node.depth < self.config.max_depth
            && node.bounds.half_extents().max_element() > self.config.min_half_extent
        {
            self.subdivide(current);
        }
    }

    fn subdivide(&mut self, id: NodeId) {
        let (bounds, depth) = {
            let node = self.node_ref(id);
            (node.bounds, node.depth)
        };
        let mut children = [NodeId::ROOT; 8];
        for (index, slot) in children.iter_mut().enumerate() {
            *slot = self.allocate(SpatialNode::new(octant_bounds(&bounds, index), depth + 1, Some(id)));
        }

        let occupants = {
            let node = self.node_mut(id);
            node.children = Some(children);
            std::mem::take(&mut node.occupants)
        };
        for item in occupants {
            if let Some(placement) = self.placements.get(&item).copied() {
                self.insert_from(id, item, placement.bounds);
            }
        }
    }

    fn detach(&mut self, item: T, id: NodeId) {
        let node = self.node_mut(id);
        if let Some(position) = node.occupants.iter().position(|&other| other == item) {
            node.occupants.swap_remove(position);
        }
    }

    /// Collapses branches whose children are all empty leaves, walking up.
    fn prune_from(&mut self, start: NodeId) {
        let mut current = Some(start);
        while let Some(id) = current {
            let node = self.node_ref(id);
            let parent = node.parent;
            if let Some(children) = node.children {
                let collapsible = children.iter().all(|&child| {
                    let child = self.node_ref(child);
                    child.is_leaf() && child.occupants.is_empty()
                });
                if !collapsible {
                    break;
                }
                for child in children {
                    self.release(child);
                }
                self.node_mut(id).children = None;
            } else if !node.occupants.is_empty() {
                break;
            }
            current = parent;
        }
    }

    fn allocate(&mut self, node: SpatialNode<T>) -> NodeId {
        if let Some(slot) = self.free_nodes.pop() {
            self.nodes[slot as usize] = Some(node);
            NodeId(slot)
        } else {
            self.nodes.push(Some(node));
            NodeId((self.nodes.len() - 1) as u32)
        }
    }

    fn release(&mut self, id: NodeId) {
        if id != NodeId::ROOT && self.nodes[id.slot()].take().is_some() {
            self.free_nodes.push(id.0);
        }
    }

    // Node ids held by the tree always point at live slots.
    fn node_ref(&self, id: NodeId) -> &SpatialNode<T> {
        match self.nodes[id.slot()].as_ref() {
            Some(node) => node,
            None => unreachable!("octree node {id:?} released while still linked"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut SpatialNode<T> {
        match self.nodes[id.slot()].as_mut() {
            Some(node) => node,
            None => unreachable!("octree node {id:?} released while still linked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Octree<u32> {
        Octree::new(
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(64.0)),
            OctreeConfig {
                max_occupants: 2,
                max_depth: 4,
                min_half_extent: 0.5,
            },
        )
    }

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center_half_extents(center, Vec3::splat(half))
    }

    #[test]
    fn overfull_leaf_subdivides_and_pushes_occupants_down() {
        let mut tree = world();
        tree.insert(1, cube(Vec3::splat(10.0), 1.0));
        tree.insert(2, cube(Vec3::splat(-10.0), 1.0));
        assert_eq!(tree.node_count(), 1);
        tree.insert(3, cube(Vec3::new(10.0, -10.0, 10.0), 1.0));

        assert!(tree.node_count() > 1);
        assert_ne!(tree.node_of(1), Some(NodeId::ROOT));
        assert_eq!(tree.occupancy(), tree.len());
    }

    #[test]
    fn straddling_item_stays_at_branch() {
        let mut tree = world();
        for (i, x) in [20.0, -20.0, 30.0].into_iter().enumerate() {
            tree.insert(i as u32, cube(Vec3::new(x, 20.0, 20.0), 1.0));
        }
        tree.insert(99, cube(Vec3::ZERO, 2.0));
        assert_eq!(tree.node_of(99), Some(NodeId::ROOT));
    }

    #[test]
    fn reposition_within_node_is_noop() {
        let mut tree = world();
        tree.insert(7, cube(Vec3::splat(5.0), 1.0));
        assert_eq!(
            tree.reposition(7, cube(Vec3::splat(5.5), 1.0)),
            Reposition::Unchanged
        );
    }

    #[test]
    fn reposition_outside_root_drops_item() {
        let mut tree = world();
        tree.insert(7, cube(Vec3::splat(5.0), 1.0));
        assert_eq!(
            tree.reposition(7, cube(Vec3::splat(500.0), 1.0)),
            Reposition::LeftBounds
        );
        assert!(!tree.contains(7));
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn reposition_walks_up_to_containing_ancestor() {
        let mut tree = world();
        for i in 0..4 {
            tree.insert(i, cube(Vec3::new(40.0 + i as f32, 40.0, 40.0), 0.5));
        }
        let before = tree.node_of(0);
        assert_ne!(before, Some(NodeId::ROOT));
        assert_eq!(
            tree.reposition(0, cube(Vec3::new(-40.0, -40.0, -40.0), 0.5)),
            Reposition::Moved
        );
        assert_ne!(tree.node_of(0), before);
        assert_eq!(tree.occupancy(), tree.len());
    }

    #[test]
    fn removing_everything_collapses_to_root() {
        let mut tree = world();
        for i in 0..16 {
            let angle = i as f32;
            tree.insert(i, cube(Vec3::new(angle.cos() * 30.0, angle.sin() * 30.0, 3.0), 0.5));
        }
        assert!(tree.node_count() > 1);
        for i in 0..16 {
            assert!(tree.remove(i));
        }
        assert_eq!(tree.node_count(), 1);
        assert!(tree.is_empty());
    }

    #[test]
    fn candidates_include_ancestors_and_overlapping_descendants() {
        let mut tree = world();
        for i in 0..6 {
            tree.insert(i, cube(Vec3::new(10.0 + i as f32 * 3.0, 10.0, 10.0), 0.5));
        }
        tree.insert(100, cube(Vec3::ZERO, 4.0));
        let mut found = Vec::new();
        tree.candidates(100, &mut found);
        assert!(!found.contains(&100));

        let mut from_leaf = Vec::new();
        tree.candidates(0, &mut from_leaf);
        assert!(from_leaf.contains(&100), "root occupant must be visible from leaves");
    }

    #[test]
    fn unbounded_items_pin_to_root() {
        let mut tree = world();
        assert!(tree.insert(5, Aabb::unbounded()));
        assert_eq!(tree.node_of(5), Some(NodeId::ROOT));
        assert_eq!(tree.reposition(5, Aabb::unbounded()), Reposition::Unchanged);
        let mut hits = Vec::new();
        tree.query(&cube(Vec3::splat(3.0), 1.0), &mut hits);
        assert_eq!(hits, vec![5]);
    }

    #[test]
    fn insert_outside_root_is_rejected() {
        let mut tree = world();
        assert!(!tree.insert(1, cube(Vec3::splat(100.0), 1.0)));
        assert!(tree.is_empty());
    }
}
