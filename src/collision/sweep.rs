//! Banded sweep-and-prune.
//!
//! The world is cut into `K` slabs along the band axis (Z). Each band keeps a
//! sorted list of interval endpoints along the sweep axis (X) for every body
//! whose Z range touches the band, so a body carries exactly two endpoints
//! per participating band. Lists are kept sorted with an incremental
//! insertion sort, which is near-linear for temporally coherent scenes.

use std::{cmp::Ordering, collections::HashMap, ops::RangeInclusive};

use crate::{
    core::{aabb::Aabb, types::CollisionFilter},
    utils::allocator::EntityId,
};

pub const SWEEP_AXIS: usize = 0;
pub const BAND_AXIS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub value: f32,
    pub body: EntityId,
    pub is_start: bool,
}

impl Endpoint {
    /// Value order; on ties starts sort before stops so touching intervals pair.
    fn order(&self, other: &Endpoint) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.is_start.cmp(&self.is_start))
    }
}

/// One band: its slab along the band axis and sorted endpoints.
#[derive(Debug, Clone)]
pub struct SweepAxis {
    pub min: f32,
    pub max: f32,
    pub endpoints: Vec<Endpoint>,
    dirty: bool,
}

impl SweepAxis {
    fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            endpoints: Vec::new(),
            dirty: false,
        }
    }

    fn add(&mut self, body: EntityId, bounds: &Aabb) {
        self.endpoints.push(Endpoint {
            value: bounds.min[SWEEP_AXIS],
            body,
            is_start: true,
        });
        self.endpoints.push(Endpoint {
            value: bounds.max[SWEEP_AXIS],
            body,
            is_start: false,
        });
        self.dirty = true;
    }

    fn remove(&mut self, body: EntityId) {
        self.endpoints.retain(|endpoint| endpoint.body != body);
    }

    /// Pulls current values from `entries` and restores order.
    fn sort(&mut self, entries: &HashMap<EntityId, SweepEntry>) {
        for endpoint in &mut self.endpoints {
            if let Some(entry) = entries.get(&endpoint.body) {
                endpoint.value = if endpoint.is_start {
                    entry.bounds.min[SWEEP_AXIS]
                } else {
                    entry.bounds.max[SWEEP_AXIS]
                };
            }
        }
        for i in 1..self.endpoints.len() {
            let mut j = i;
            while j > 0 && self.endpoints[j - 1].order(&self.endpoints[j]) == Ordering::Greater {
                self.endpoints.swap(j - 1, j);
                j -= 1;
            }
        }
        self.dirty = false;
    }
}

#[derive(Debug, Clone, Copy)]
struct SweepEntry {
    bounds: Aabb,
    filter: CollisionFilter,
    is_static: bool,
    bands: (usize, usize),
}

#[derive(Debug, Clone)]
pub struct SweepAndPrune {
    bands: Vec<SweepAxis>,
    entries: HashMap<EntityId, SweepEntry>,
    world_min: f32,
    band_width: f32,
    active: Vec<EntityId>,
}

impl SweepAndPrune {
    /// `band_count` slabs over `[-half_extent, half_extent]`; the outer two are
    /// open-ended.
    pub fn new(half_extent: f32, band_count: usize) -> Self {
        let band_count = band_count.max(1);
        let band_width = 2.0 * half_extent / band_count as f32;
        let bands = (0..band_count)
            .map(|i| {
                let min = if i == 0 {
                    f32::NEG_INFINITY
                } else {
                    -half_extent + band_width * i as f32
                };
                let max = if i + 1 == band_count {
                    f32::INFINITY
                } else {
                    -half_extent + band_width * (i + 1) as f32
                };
                SweepAxis::new(min, max)
            })
            .collect();
        Self {
            bands,
            entries: HashMap::new(),
            world_min: -half_extent,
            band_width,
            active: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, body: EntityId) -> bool {
        self.entries.contains_key(&body)
    }

    pub fn bands(&self) -> &[SweepAxis] {
        &self.bands
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        for band in &mut self.bands {
            band.endpoints.clear();
            band.dirty = false;
        }
    }

    pub fn add(&mut self, body: EntityId, bounds: Aabb, filter: CollisionFilter, is_static: bool) {
        if self.entries.contains_key(&body) {
            self.update(body, bounds);
            return;
        }
        let bands = self.band_range(&bounds);
        for band in &mut self.bands[bands.0..=bands.1] {
            band.add(body, &bounds);
        }
        self.entries.insert(
            body,
            SweepEntry {
                bounds,
                filter,
                is_static,
                bands,
            },
        );
    }

    pub fn remove(&mut self, body: EntityId) -> bool {
        let Some(entry) = self.entries.remove(&body) else {
            return false;
        };
        for band in &mut self.bands[entry.bands.0..=entry.bands.1] {
            band.remove(body);
        }
        true
    }

    /// Records new bounds; endpoint values are refreshed on the next sweep.
    pub fn update(&mut self, body: EntityId, bounds: Aabb) {
        let new_bands = self.band_range(&bounds);
        let Some(entry) = self.entries.get_mut(&body) else {
            return;
        };
        let old_bands = entry.bands;
        entry.bounds = bounds;
        entry.bands = new_bands;

        if old_bands != new_bands {
            for index in range(old_bands) {
                if !range(new_bands).contains(&index) {
                    self.bands[index].remove(body);
                }
            }
            for index in range(new_bands) {
                if !range(old_bands).contains(&index) {
                    self.bands[index].add(body, &bounds);
                }
            }
        }
        for band in &mut self.bands[new_bands.0..=new_bands.1] {
            band.dirty = true;
        }
    }

    pub fn set_filter(&mut self, body: EntityId, filter: CollisionFilter, is_static: bool) {
        if let Some(entry) = self.entries.get_mut(&body) {
            entry.filter = filter;
            entry.is_static = is_static;
        }
    }

    /// Sorts dirty bands and sweeps all of them. Pairs are `(low, high)` by id
    /// and unique across bands.
    pub fn find_pairs(&mut self, out: &mut Vec<(EntityId, EntityId)>) {
        let start = out.len();
        for index in 0..self.bands.len() {
            if self.bands[index].dirty {
                let entries = &self.entries;
                self.bands[index].sort(entries);
            }
            self.sweep_band(index, out);
        }
        let tail = &mut out[start..];
        tail.sort_unstable();
        let mut unique = start;
        for i in start..out.len() {
            if i == start || out[i] != out[unique - 1] {
                out[unique] = out[i];
                unique += 1;
            }
        }
        out.truncate(unique);
    }

    fn sweep_band(&mut self, index: usize, out: &mut Vec<(EntityId, EntityId)>) {
        self.active.clear();
        let band = &self.bands[index];
        for endpoint in &band.endpoints {
            let Some(entry) = self.entries.get(&endpoint.body) else {
                continue;
            };
            if !endpoint.is_start {
                if let Some(position) = self.active.iter().position(|&id| id == endpoint.body) {
                    self.active.swap_remove(position);
                }
                continue;
            }
            for &other in &self.active {
                let Some(other_entry) = self.entries.get(&other) else {
                    continue;
                };
                if entry.is_static && other_entry.is_static {
                    continue;
                }
                if !entry.filter.accepts(&other_entry.filter) {
                    continue;
                }
                if !entry.bounds.overlaps_except_axis(&other_entry.bounds, SWEEP_AXIS) {
                    continue;
                }
                out.push(ordered(endpoint.body, other));
            }
            self.active.push(endpoint.body);
        }
    }

    fn band_of(&self, value: f32) -> usize {
        let slot = ((value - self.world_min) / self.band_width).floor();
        if slot.is_nan() || slot < 0.0 {
            0
        } else {
            (slot as usize).min(self.bands.len() - 1)
        }
    }

    fn band_range(&self, bounds: &Aabb) -> (usize, usize) {
        (
            self.band_of(bounds.min[BAND_AXIS]),
            self.band_of(bounds.max[BAND_AXIS]),
        )
    }
}

fn range(bands: (usize, usize)) -> RangeInclusive<usize> {
    bands.0..=bands.1
}

fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn cube(center: Vec3) -> Aabb {
        Aabb::from_center_half_extents(center, Vec3::splat(0.5))
    }

    fn id(index: u32) -> EntityId {
        EntityId::from_index(index)
    }

    #[test]
    fn body_spanning_bands_gets_endpoints_in_each() {
        let mut sweep = SweepAndPrune::new(100.0, 4);
        sweep.add(
            id(0),
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(1.0, 1.0, 60.0)),
            CollisionFilter::default(),
            false,
        );
        let participating: Vec<usize> = sweep
            .bands()
            .iter()
            .map(|band| band.endpoints.len())
            .collect();
        assert_eq!(participating, vec![2, 2, 2, 2]);
    }

    #[test]
    fn overlapping_pair_reported_once_across_bands() {
        let mut sweep = SweepAndPrune::new(100.0, 4);
        let tall = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(1.0, 1.0, 60.0));
        sweep.add(id(0), tall, CollisionFilter::default(), false);
        sweep.add(id(1), tall, CollisionFilter::default(), false);
        let mut pairs = Vec::new();
        sweep.find_pairs(&mut pairs);
        assert_eq!(pairs, vec![(id(0), id(1))]);
    }

    #[test]
    fn static_pairs_and_filtered_pairs_are_skipped() {
        let mut sweep = SweepAndPrune::new(100.0, 2);
        sweep.add(id(0), cube(Vec3::ZERO), CollisionFilter::default(), true);
        sweep.add(id(1), cube(Vec3::X * 0.5), CollisionFilter::default(), true);
        sweep.add(id(2), cube(Vec3::Y * 0.5), CollisionFilter::new(2, 2), false);
        let mut pairs = Vec::new();
        sweep.find_pairs(&mut pairs);
        assert!(pairs.is_empty(), "{pairs:?}");
    }

    #[test]
    fn moved_body_is_resorted() {
        let mut sweep = SweepAndPrune::new(100.0, 1);
        sweep.add(id(0), cube(Vec3::ZERO), CollisionFilter::default(), false);
        sweep.add(id(1), cube(Vec3::X * 10.0), CollisionFilter::default(), false);
        let mut pairs = Vec::new();
        sweep.find_pairs(&mut pairs);
        assert!(pairs.is_empty());

        sweep.update(id(1), cube(Vec3::X * 0.5));
        sweep.find_pairs(&mut pairs);
        assert_eq!(pairs, vec![(id(0), id(1))]);
        let values: Vec<f32> = sweep.bands()[0].endpoints.iter().map(|e| e.value).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn moving_between_bands_keeps_two_endpoints_per_band() {
        let mut sweep = SweepAndPrune::new(100.0, 4);
        sweep.add(id(0), cube(Vec3::new(0.0, 0.0, -80.0)), CollisionFilter::default(), false);
        sweep.update(id(0), cube(Vec3::new(0.0, 0.0, 80.0)));
        let counts: Vec<usize> = sweep.bands().iter().map(|b| b.endpoints.len()).collect();
        assert_eq!(counts, vec![0, 0, 0, 2]);
        assert!(sweep.remove(id(0)));
        assert!(sweep.bands().iter().all(|b| b.endpoints.is_empty()));
    }
}
