//! Row lanes and per-entity write locks.
//!
//! Rows that could touch the same canonical entity share a lane. Lanes run in
//! parallel; rows inside a lane run in source order.

use std::collections::HashMap;

use accord_core::{EntityId, EntityType};
use parking_lot::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum LaneKey {
    Code(EntityType, String),
    Name(EntityType, String),
    Entity(EntityId),
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Keep the lower index as root so lanes order by first row
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Group item positions that share any key. Each lane is ascending; lanes
/// are ordered by their first position.
pub(crate) fn partition(keys: &[Vec<LaneKey>]) -> Vec<Vec<usize>> {
    let mut set = DisjointSet::new(keys.len());
    let mut first_seen: HashMap<&LaneKey, usize> = HashMap::new();

    for (pos, item_keys) in keys.iter().enumerate() {
        for key in item_keys {
            match first_seen.get(key) {
                Some(&other) => set.union(pos, other),
                None => {
                    first_seen.insert(key, pos);
                }
            }
        }
    }

    let mut lanes: Vec<Vec<usize>> = Vec::new();
    let mut lane_of_root: HashMap<usize, usize> = HashMap::new();
    for pos in 0..keys.len() {
        let root = set.find(pos);
        let lane = *lane_of_root.entry(root).or_insert_with(|| {
            lanes.push(Vec::new());
            lanes.len() - 1
        });
        lanes[lane].push(pos);
    }
    lanes
}

/// Sharded mutexes keyed by entity id.
pub(crate) struct EntityLocks {
    shards: Vec<Mutex<()>>,
}

impl EntityLocks {
    pub(crate) fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) fn lock(&self, id: EntityId) -> MutexGuard<'_, ()> {
        let shard = (id.0.as_u128() % self.shards.len() as u128) as usize;
        self.shards[shard].lock()
    }
}
