//! Concurrent region index.
//!
//! # Architecture
//!
//! ```text
//! RegionIndex
//! ├── regions: DashMap<id, Arc<Region>>      lock-free single-key reads
//! ├── bookkeeping: Mutex<removed regions>    compound operations only
//! └── grid: Option<RwLock<SpatialGrid>>      candidate narrowing
//! ```
//!
//! Single-key lookups go straight to the map. Adds, removals and dirty
//! snapshots take the bookkeeping mutex so they observe one consistent view.
//! Visitors always run over a snapshot, never while a map shard or the
//! mutex is held, so a visitor may call back into the index.
//!
//! With [`IndexKind::Flat`] every query scans all regions. With
//! [`IndexKind::Grid`] a column grid narrows the scan to nearby regions;
//! both report identical results.

use std::sync::Arc;

use dashmap::DashMap;
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use region_spatial::{BlockPos, SpatialGrid};
use tracing::{debug, warn};

use crate::{Region, region::normalize_id};

/// Regions spanning more grid cells than this are kept out of the cells.
const MAX_CELLS_PER_REGION: u64 = 1024;

/// How containment and intersection queries find candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    /// Scan every region.
    Flat,
    /// Narrow through a column grid with cells of `cell_size` blocks.
    Grid { cell_size: i32 },
}

impl Default for IndexKind {
    fn default() -> Self {
        Self::Grid { cell_size: 128 }
    }
}

/// What happens to the children of a removed region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalStrategy {
    /// Remove the children too, and their children in turn.
    RemoveChildren,
    /// Keep the children and clear their parent link.
    UnsetParentInChildren,
}

/// Regions changed and removed since the difference was last cleared.
#[derive(Clone, Debug, Default)]
pub struct RegionDifference {
    changed: Vec<Arc<Region>>,
    removed: Vec<Arc<Region>>,
}

impl RegionDifference {
    #[must_use]
    pub const fn new(changed: Vec<Arc<Region>>, removed: Vec<Arc<Region>>) -> Self {
        Self { changed, removed }
    }

    #[must_use]
    pub fn changed(&self) -> &[Arc<Region>] {
        &self.changed
    }

    #[must_use]
    pub fn removed(&self) -> &[Arc<Region>] {
        &self.removed
    }

    #[must_use]
    pub fn contains_changes(&self) -> bool {
        !self.changed.is_empty() || !self.removed.is_empty()
    }
}

#[derive(Default)]
struct Bookkeeping {
    removed: HashMap<String, Arc<Region>>,
}

/// Concurrent store of regions keyed by lowercase ID.
pub struct RegionIndex {
    regions: DashMap<String, Arc<Region>>,
    bookkeeping: Mutex<Bookkeeping>,
    grid: Option<RwLock<SpatialGrid<String>>>,
    kind: IndexKind,
}

impl RegionIndex {
    /// Create a new empty index.
    #[must_use]
    pub fn new(kind: IndexKind) -> Self {
        let grid = match kind {
            IndexKind::Flat => None,
            IndexKind::Grid { cell_size } => Some(RwLock::new(SpatialGrid::new(
                cell_size,
                MAX_CELLS_PER_REGION,
            ))),
        };

        Self {
            regions: DashMap::new(),
            bookkeeping: Mutex::new(Bookkeeping::default()),
            grid,
            kind,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        self.kind
    }

    // ==================== Mutation ====================

    /// Insert or replace a region, along with its ancestors.
    pub fn add(&self, region: Arc<Region>) {
        let mut bookkeeping = self.bookkeeping.lock();
        let mut touched = Vec::new();
        self.add_locked(&mut bookkeeping, region, &mut touched);
        self.sync_grid(&touched);
    }

    /// Insert many regions, updating the grid once at the end.
    pub fn add_all(&self, regions: impl IntoIterator<Item = Arc<Region>>) {
        let mut bookkeeping = self.bookkeeping.lock();
        let mut touched = Vec::new();
        for region in regions {
            self.add_locked(&mut bookkeeping, region, &mut touched);
        }
        self.rebuild_grid();
    }

    fn add_locked(&self, bookkeeping: &mut Bookkeeping, region: Arc<Region>, touched: &mut Vec<String>) {
        region.set_dirty(true);
        let id = region.id().to_owned();

        let existing = self.regions.get(&id).map(|entry| Arc::clone(entry.value()));
        if let Some(existing) = existing {
            if !Arc::ptr_eq(&existing, &region) {
                // Children of the old instance now hang off the new one.
                self.remove_locked(
                    bookkeeping,
                    &id,
                    RemovalStrategy::UnsetParentInChildren,
                    Some(&region),
                    touched,
                );
            }
        }

        self.regions.insert(id.clone(), Arc::clone(&region));
        bookkeeping.removed.remove(&id);
        touched.push(id);

        if let Some(parent) = region.parent() {
            let indexed = self
                .regions
                .get(parent.id())
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &parent));
            if !indexed {
                self.add_locked(bookkeeping, parent, touched);
            }
        }
    }

    /// Remove a region by ID.
    ///
    /// Returns every region actually removed, target first. An unknown ID
    /// removes nothing.
    pub fn remove(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<Region>> {
        let mut bookkeeping = self.bookkeeping.lock();
        let mut touched = Vec::new();
        let removed = self.remove_locked(&mut bookkeeping, &normalize_id(id), strategy, None, &mut touched);
        self.sync_grid(&touched);
        removed
    }

    fn remove_locked(
        &self,
        bookkeeping: &mut Bookkeeping,
        id: &str,
        strategy: RemovalStrategy,
        replacement: Option<&Arc<Region>>,
        touched: &mut Vec<String>,
    ) -> Vec<Arc<Region>> {
        let Some((_, target)) = self.regions.remove(id) else {
            return Vec::new();
        };

        let mut removed_ids: HashSet<String> = HashSet::new();
        removed_ids.insert(target.id().to_owned());
        let mut removed = vec![target];

        loop {
            let children: Vec<Arc<Region>> = self
                .regions
                .iter()
                .filter(|entry| {
                    entry
                        .value()
                        .parent()
                        .is_some_and(|parent| removed_ids.contains(parent.id()))
                })
                .map(|entry| Arc::clone(entry.value()))
                .collect();

            if children.is_empty() {
                break;
            }

            match strategy {
                RemovalStrategy::RemoveChildren => {
                    for child in children {
                        if self.regions.remove(child.id()).is_some() {
                            removed_ids.insert(child.id().to_owned());
                            removed.push(child);
                        }
                    }
                }
                RemovalStrategy::UnsetParentInChildren => {
                    for child in children {
                        Self::replace_parent(&child, replacement);
                    }
                    break;
                }
            }
        }

        for region in &removed {
            touched.push(region.id().to_owned());
            bookkeeping
                .removed
                .insert(region.id().to_owned(), Arc::clone(region));
        }
        debug!(region = id, removed = removed.len(), ?strategy, "removed region");
        removed
    }

    fn replace_parent(child: &Arc<Region>, replacement: Option<&Arc<Region>>) {
        let Err(e) = child.set_parent(replacement.cloned()) else {
            return;
        };
        warn!(
            child = child.id(),
            error = %e,
            "failed to relink child to its replacement parent; clearing parent"
        );
        child.clear_parent();
    }

    // ==================== Grid upkeep ====================

    fn sync_grid(&self, ids: &[String]) {
        let Some(grid) = &self.grid else {
            return;
        };
        let mut grid = grid.write();
        for id in ids {
            let bounds = self.get(id).and_then(|region| region.shape().bounds());
            if let Some((min, max)) = bounds {
                grid.insert(id.clone(), min.column(), max.column());
            } else {
                grid.remove(id);
            }
        }
    }

    fn rebuild_grid(&self) {
        let Some(grid) = &self.grid else {
            return;
        };
        let mut grid = grid.write();
        grid.clear();
        for entry in &self.regions {
            if let Some((min, max)) = entry.value().shape().bounds() {
                grid.insert(entry.key().clone(), min.column(), max.column());
            }
        }
    }

    // ==================== Lookup ====================

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.regions.contains_key(&normalize_id(id))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Region>> {
        self.regions
            .get(&normalize_id(id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Get the number of indexed regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Snapshot of every indexed region.
    #[must_use]
    pub fn values(&self) -> Vec<Arc<Region>> {
        self.regions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    // ==================== Queries ====================

    /// Visit every region until the visitor returns `false`.
    pub fn apply(&self, mut visitor: impl FnMut(&Arc<Region>) -> bool) {
        for region in self.values() {
            if !visitor(&region) {
                break;
            }
        }
    }

    /// Regions whose shape contains `pos`.
    #[must_use]
    pub fn containing(&self, pos: BlockPos) -> Vec<Arc<Region>> {
        let candidates = match &self.grid {
            None => self.values(),
            Some(grid) => {
                let ids: Vec<String> = grid.read().candidates_at(pos.column()).cloned().collect();
                ids.iter().filter_map(|id| self.get(id)).collect()
            }
        };

        candidates
            .into_iter()
            .filter(|region| region.contains(pos))
            .collect()
    }

    /// Visit every region containing `pos` until the visitor returns `false`.
    pub fn apply_containing(&self, pos: BlockPos, mut visitor: impl FnMut(&Arc<Region>) -> bool) {
        for region in self.containing(pos) {
            if !visitor(&region) {
                break;
            }
        }
    }

    /// Indexed regions whose body overlaps `region`.
    #[must_use]
    pub fn intersecting(&self, region: &Region) -> Vec<Arc<Region>> {
        let Some((min, max)) = region.shape().bounds() else {
            return Vec::new();
        };

        let candidates = match &self.grid {
            None => self.values(),
            Some(grid) => {
                let ids: Vec<String> = grid
                    .read()
                    .candidates_in(min.column(), max.column())
                    .into_iter()
                    .cloned()
                    .collect();
                ids.iter().filter_map(|id| self.get(id)).collect()
            }
        };

        candidates
            .into_iter()
            .filter(|candidate| candidate.shape().intersects_mbr(region.shape()))
            .filter(|candidate| candidate.intersects(region))
            .collect()
    }

    /// Visit every region overlapping `region` until the visitor returns `false`.
    pub fn apply_intersecting(&self, region: &Region, mut visitor: impl FnMut(&Arc<Region>) -> bool) {
        for found in self.intersecting(region) {
            if !visitor(&found) {
                break;
            }
        }
    }

    // ==================== Dirty bookkeeping ====================

    /// Take the changed and removed regions and reset the bookkeeping.
    pub fn get_and_clear_difference(&self) -> RegionDifference {
        let mut bookkeeping = self.bookkeeping.lock();
        let mut changed = Vec::new();
        for region in self.values() {
            if region.is_dirty() {
                region.set_dirty(false);
                changed.push(region);
            }
        }
        let removed = std::mem::take(&mut bookkeeping.removed).into_values().collect();
        RegionDifference::new(changed, removed)
    }

    /// Put a previously taken difference back.
    pub fn set_dirty(&self, difference: &RegionDifference) {
        let mut bookkeeping = self.bookkeeping.lock();
        for region in difference.changed() {
            region.set_dirty(true);
        }
        for region in difference.removed() {
            bookkeeping
                .removed
                .insert(region.id().to_owned(), Arc::clone(region));
        }
    }

    /// Whether anything changed or was removed since the last clear.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let bookkeeping = self.bookkeeping.lock();
        !bookkeeping.removed.is_empty() || self.regions.iter().any(|entry| entry.value().is_dirty())
    }

    /// Mark every region dirty, or clear every region and the removed set.
    pub fn set_all_dirty(&self, dirty: bool) {
        let mut bookkeeping = self.bookkeeping.lock();
        if !dirty {
            bookkeeping.removed.clear();
        }
        for region in self.values() {
            region.set_dirty(dirty);
        }
    }
}

impl std::fmt::Debug for RegionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionIndex")
            .field("regions", &self.regions.len())
            .field("grid", &self.grid.is_some())
            .finish_non_exhaustive()
    }
}
