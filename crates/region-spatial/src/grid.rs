//! Uniform column grid for candidate lookup.
//!
//! The world is cut into square cells of `cell_size` blocks on the x/z plane.
//! Each key is registered in every cell its bounding box touches, so a point
//! query only has to look at a single bucket. Keys whose boxes would span
//! more than `max_cells` cells go into a separate oversized set that every
//! query returns; huge regions are rare and would otherwise flood the map.
//!
//! The grid never answers "does this key contain the point". It only narrows
//! the candidate set, and callers run the exact shape test afterwards.

use std::hash::Hash;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::ColumnPos;

/// Coordinates of a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub x: i32,
    pub z: i32,
}

#[derive(Clone, Copy, Debug)]
enum Placement {
    Cells { min: CellKey, max: CellKey },
    Oversized,
}

/// A sparse uniform grid mapping cells to the keys that overlap them.
pub struct SpatialGrid<K> {
    cell_size: i32,
    max_cells: u64,
    cells: HashMap<CellKey, SmallVec<[K; 4]>>,
    placements: HashMap<K, Placement>,
    oversized: HashSet<K>,
}

impl<K: Eq + Hash + Clone> SpatialGrid<K> {
    /// Create a grid with square cells of `cell_size` blocks.
    ///
    /// Keys spanning more than `max_cells` cells are tracked as oversized.
    #[must_use]
    pub fn new(cell_size: i32, max_cells: u64) -> Self {
        Self {
            cell_size: cell_size.max(1),
            max_cells: max_cells.max(1),
            cells: HashMap::new(),
            placements: HashMap::new(),
            oversized: HashSet::new(),
        }
    }

    /// Cell edge length in blocks.
    #[must_use]
    pub const fn cell_size(&self) -> i32 {
        self.cell_size
    }

    /// Cell containing a column. Negative coordinates floor toward -inf.
    #[must_use]
    pub const fn cell_at(&self, column: ColumnPos) -> CellKey {
        CellKey {
            x: column.x.div_euclid(self.cell_size),
            z: column.z.div_euclid(self.cell_size),
        }
    }

    fn span(min: CellKey, max: CellKey) -> u64 {
        let dx = (i64::from(max.x) - i64::from(min.x) + 1) as u64;
        let dz = (i64::from(max.z) - i64::from(min.z) + 1) as u64;
        dx.saturating_mul(dz)
    }

    /// Register `key` over the box `min..=max`, replacing any prior placement.
    pub fn insert(&mut self, key: K, min: ColumnPos, max: ColumnPos) {
        self.remove(&key);

        let lo = self.cell_at(ColumnPos::new(min.x.min(max.x), min.z.min(max.z)));
        let hi = self.cell_at(ColumnPos::new(min.x.max(max.x), min.z.max(max.z)));

        if Self::span(lo, hi) > self.max_cells {
            self.oversized.insert(key.clone());
            self.placements.insert(key, Placement::Oversized);
            return;
        }

        for x in lo.x..=hi.x {
            for z in lo.z..=hi.z {
                self.cells.entry(CellKey { x, z }).or_default().push(key.clone());
            }
        }
        self.placements
            .insert(key, Placement::Cells { min: lo, max: hi });
    }

    /// Drop `key` from the grid. Returns `false` if it was not present.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(placement) = self.placements.remove(key) else {
            return false;
        };

        match placement {
            Placement::Oversized => {
                self.oversized.remove(key);
            }
            Placement::Cells { min, max } => {
                for x in min.x..=max.x {
                    for z in min.z..=max.z {
                        let cell = CellKey { x, z };
                        if let Some(bucket) = self.cells.get_mut(&cell) {
                            bucket.retain(|k| k != key);
                            if bucket.is_empty() {
                                self.cells.remove(&cell);
                            }
                        }
                    }
                }
            }
        }

        true
    }

    /// Keys that may contain `column`.
    pub fn candidates_at(&self, column: ColumnPos) -> impl Iterator<Item = &K> {
        self.cells
            .get(&self.cell_at(column))
            .into_iter()
            .flatten()
            .chain(self.oversized.iter())
    }

    /// Keys whose boxes may overlap `min..=max`, without duplicates.
    #[must_use]
    pub fn candidates_in(&self, min: ColumnPos, max: ColumnPos) -> HashSet<&K> {
        let lo = self.cell_at(ColumnPos::new(min.x.min(max.x), min.z.min(max.z)));
        let hi = self.cell_at(ColumnPos::new(min.x.max(max.x), min.z.max(max.z)));

        // Walking a huge query box cell by cell costs more than a full scan.
        if Self::span(lo, hi) > self.cells.len() as u64 {
            return self.placements.keys().collect();
        }

        let mut out: HashSet<&K> = self.oversized.iter().collect();
        for x in lo.x..=hi.x {
            for z in lo.z..=hi.z {
                if let Some(bucket) = self.cells.get(&CellKey { x, z }) {
                    out.extend(bucket.iter());
                }
            }
        }
        out
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.placements.contains_key(key)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Check if the grid holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Remove every key.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.placements.clear();
        self.oversized.clear();
    }
}
