// Chunk-bucketed spatial index over construction sites.
//
// Maps each chunk key to the set of site ids whose bounding box overlaps
// that chunk's columns. Maintained incrementally: `insert` adds a site to
// every bucket its bounds touch, `remove` purges it from all of them and
// drops empty buckets. Lookups gather the union of the relevant buckets; the
// caller still runs an exact AABB test on the candidates.
//
// See also: `construction.rs`, the only owner of a `SpatialIndex`.
//
// **Critical constraint: determinism.** Buckets use `FxHashMap` (fixed
// hasher, no per-process seed) and candidate sets are `BTreeSet`s, so lookup
// results come back in id order.

use crate::types::{Bounds, ChunkKey, SiteId, WorldPos};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

#[derive(Clone, Debug)]
pub struct SpatialIndex {
    chunk_size: i32,
    buckets: FxHashMap<ChunkKey, BTreeSet<SiteId>>,
}

impl SpatialIndex {
    pub fn new(chunk_size: i32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            buckets: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, id: SiteId, bounds: &Bounds) {
        for key in bounds.chunk_keys(self.chunk_size) {
            self.buckets.entry(key).or_default().insert(id);
        }
    }

    /// Purge a site from every bucket its bounds overlap.
    pub fn remove(&mut self, id: SiteId, bounds: &Bounds) {
        for key in bounds.chunk_keys(self.chunk_size) {
            if let Some(set) = self.buckets.get_mut(&key) {
                set.remove(&id);
                if set.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
    }

    /// Sites registered in any chunk the bounds touch.
    pub fn candidates(&self, bounds: &Bounds) -> BTreeSet<SiteId> {
        bounds
            .chunk_keys(self.chunk_size)
            .iter()
            .filter_map(|key| self.buckets.get(key))
            .flatten()
            .copied()
            .collect()
    }

    /// Sites registered in chunks within `radius` blocks of `center`,
    /// horizontally.
    pub fn candidates_near(&self, center: WorldPos, radius: i32) -> BTreeSet<SiteId> {
        let r = radius.max(0);
        self.candidates(&Bounds::from_corners(
            center.offset(-r, -r, 0),
            center.offset(r, r, 0),
        ))
    }

    pub fn sites_in_chunk(&self, key: ChunkKey) -> impl Iterator<Item = SiteId> + '_ {
        self.buckets.get(&key).into_iter().flatten().copied()
    }

    pub fn contains(&self, id: SiteId) -> bool {
        self.buckets.values().any(|set| set.contains(&id))
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(x0: i32, y0: i32, x1: i32, y1: i32) -> Bounds {
        Bounds::from_corners(WorldPos::new(x0, y0, 0), WorldPos::new(x1, y1, 3))
    }

    #[test]
    fn site_spanning_chunks_lands_in_each_bucket() {
        let mut index = SpatialIndex::new(16);
        index.insert(SiteId(1), &bounds(14, 14, 18, 18));
        assert_eq!(index.bucket_count(), 4);
        for key in [
            ChunkKey::new(0, 0),
            ChunkKey::new(1, 0),
            ChunkKey::new(0, 1),
            ChunkKey::new(1, 1),
        ] {
            assert_eq!(index.sites_in_chunk(key).collect::<Vec<_>>(), vec![SiteId(1)]);
        }
    }

    #[test]
    fn remove_purges_every_bucket() {
        let mut index = SpatialIndex::new(16);
        let b = bounds(-20, -3, 40, 2);
        index.insert(SiteId(9), &b);
        assert!(index.contains(SiteId(9)));
        index.remove(SiteId(9), &b);
        assert!(!index.contains(SiteId(9)));
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn candidates_union_in_id_order() {
        let mut index = SpatialIndex::new(8);
        index.insert(SiteId(5), &bounds(0, 0, 3, 3));
        index.insert(SiteId(2), &bounds(9, 0, 12, 3));
        index.insert(SiteId(7), &bounds(40, 40, 41, 41));
        let found: Vec<SiteId> = index.candidates(&bounds(2, 0, 10, 1)).into_iter().collect();
        assert_eq!(found, vec![SiteId(2), SiteId(5)]);
        assert!(index.candidates_near(WorldPos::new(40, 40, 0), 1).contains(&SiteId(7)));
    }
}
