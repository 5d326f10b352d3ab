use std::collections::{HashMap, HashSet, VecDeque};

use crate::utils::allocator::EntityId;

/// Resting contacts between bodies. Disturbing one body invalidates every
/// contact reachable from it, so stacks wake as a unit.
#[derive(Debug, Default)]
pub struct ContactGraph {
    adjacency: HashMap<EntityId, Vec<EntityId>>,
}

impl ContactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn contains(&self, a: EntityId, b: EntityId) -> bool {
        self.adjacency
            .get(&a)
            .is_some_and(|links| links.contains(&b))
    }

    /// Links two bodies; returns false if they were already linked.
    pub fn add(&mut self, a: EntityId, b: EntityId) -> bool {
        if a == b || self.contains(a, b) {
            return false;
        }
        self.adjacency.entry(a).or_default().push(b);
        self.adjacency.entry(b).or_default().push(a);
        true
    }

    /// Removes every contact reachable from `id` and returns the bodies that
    /// lost one, `id` excluded.
    pub fn disturb(&mut self, id: EntityId) -> Vec<EntityId> {
        let mut woken = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(links) = self.adjacency.remove(&current) else {
                continue;
            };
            for other in links {
                if seen.insert(other) {
                    woken.push(other);
                    queue.push_back(other);
                }
            }
        }
        woken
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> EntityId {
        EntityId::from_index(index)
    }

    #[test]
    fn disturbing_the_base_wakes_the_whole_stack() {
        let mut graph = ContactGraph::new();
        assert!(graph.add(id(0), id(1)));
        assert!(graph.add(id(1), id(2)));
        assert!(graph.add(id(2), id(3)));
        assert!(!graph.add(id(1), id(0)));
        assert!(graph.add(id(7), id(8)));
        assert_eq!(graph.len(), 4);

        let mut woken = graph.disturb(id(1));
        woken.sort_by_key(|entity| entity.index());
        assert_eq!(woken, vec![id(0), id(2), id(3)]);
        assert!(!graph.contains(id(2), id(3)));
        assert!(graph.contains(id(7), id(8)));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn clearing_forgets_every_contact() {
        let mut graph = ContactGraph::new();
        graph.add(id(0), id(1));
        graph.add(id(1), id(2));
        graph.clear();
        assert!(graph.is_empty());
        assert!(!graph.contains(id(1), id(2)));
        assert!(graph.disturb(id(1)).is_empty());
    }
}
