//! Per-world region manager.
//!
//! The manager owns the live [`RegionIndex`] behind an [`ArcSwap`]. Loading
//! builds a complete new index off to the side and swaps it in, so a query
//! running during a load sees either the old regions or the new ones, never
//! a mix. Saves snapshot the index first and talk to the store afterwards;
//! no index lock is held across store IO.

use std::sync::Arc;

use arc_swap::ArcSwap;
use hashbrown::HashMap;
use region_flags::FlagRegistry;
use region_spatial::BlockPos;
use tracing::{debug, info, warn};

use crate::{
    Actor, ApplicableRegionSet, GLOBAL_REGION, IndexKind, Region, RegionDifference, RegionError,
    RegionIndex, RegionStore, RemovalStrategy, StorageError, StorageResult, region::normalize_id,
};

/// The authoritative region handle for one world.
pub struct RegionManager {
    name: String,
    store: Arc<dyn RegionStore>,
    registry: Arc<FlagRegistry>,
    kind: IndexKind,
    index: ArcSwap<RegionIndex>,
}

impl RegionManager {
    /// Create a manager with an empty index. Call [`Self::load`] to fill it.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn RegionStore>,
        registry: Arc<FlagRegistry>,
        kind: IndexKind,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            registry,
            kind,
            index: ArcSwap::from_pointee(RegionIndex::new(kind)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    /// The current index. Holding it keeps that generation alive across a
    /// concurrent load.
    #[must_use]
    pub fn index(&self) -> Arc<RegionIndex> {
        self.index.load_full()
    }

    // ==================== Persistence ====================

    /// Replace the index with the store's contents.
    ///
    /// On failure the previous index stays installed.
    pub fn load(&self) -> StorageResult<()> {
        let regions = self.store.load_all(&self.registry)?;
        let count = regions.len();

        let index = RegionIndex::new(self.kind);
        index.add_all(regions);
        index.set_all_dirty(false);
        self.index.store(Arc::new(index));

        info!(world = %self.name, store = self.store.name(), regions = count, "loaded regions");
        Ok(())
    }

    /// Write every non-transient region, overwriting the store.
    pub fn save(&self) -> StorageResult<()> {
        let index = self.index.load_full();
        let difference = index.get_and_clear_difference();
        let regions = Self::snapshot(&index);

        if let Err(e) = self.store.save_all(&regions) {
            index.set_dirty(&difference);
            return Err(e);
        }

        debug!(world = %self.name, regions = regions.len(), "saved all regions");
        Ok(())
    }

    /// Write only what changed since the last save.
    ///
    /// Falls back to a full save when the store has no incremental path.
    /// Returns `false` when there was nothing to write. Pending changes are
    /// restored if the write fails.
    pub fn save_changes(&self) -> StorageResult<bool> {
        let index = self.index.load_full();
        let difference = index.get_and_clear_difference();
        if !difference.contains_changes() {
            return Ok(false);
        }

        let result = match self.store.save_changes(&difference) {
            Err(StorageError::PartialSaveUnsupported) => {
                debug!(
                    world = %self.name,
                    store = self.store.name(),
                    "partial save unsupported; saving everything"
                );
                self.store.save_all(&Self::snapshot(&index))
            }
            other => other,
        };

        if let Err(e) = result {
            warn!(world = %self.name, error = %e, "save failed; keeping changes pending");
            index.set_dirty(&difference);
            return Err(e);
        }

        debug!(
            world = %self.name,
            changed = difference.changed().len(),
            removed = difference.removed().len(),
            "saved region changes"
        );
        Ok(true)
    }

    fn snapshot(index: &RegionIndex) -> Vec<Arc<Region>> {
        index
            .values()
            .into_iter()
            .filter(|region| !region.is_transient())
            .collect()
    }

    // ==================== Regions ====================

    /// Snapshot of every region keyed by ID.
    #[must_use]
    pub fn get_regions(&self) -> HashMap<String, Arc<Region>> {
        self.index
            .load()
            .values()
            .into_iter()
            .map(|region| (region.id().to_owned(), region))
            .collect()
    }

    /// Replace all regions at once.
    ///
    /// Regions that disappear are recorded as removed so the next
    /// incremental save deletes them.
    pub fn set_regions(&self, regions: impl IntoIterator<Item = Arc<Region>>) {
        let index = RegionIndex::new(self.kind);
        index.add_all(regions);

        let previous = self.index.load_full();
        let gone: Vec<Arc<Region>> = previous
            .values()
            .into_iter()
            .filter(|region| !index.contains(region.id()))
            .collect();
        index.set_dirty(&RegionDifference::new(Vec::new(), gone));

        self.index.store(Arc::new(index));
    }

    /// Add or replace a region.
    pub fn add_region(&self, region: Arc<Region>) {
        self.index.load().add(region);
    }

    #[must_use]
    pub fn has_region(&self, id: &str) -> bool {
        self.index.load().contains(id)
    }

    #[must_use]
    pub fn get_region(&self, id: &str) -> Option<Arc<Region>> {
        self.index.load().get(id)
    }

    /// Remove a region and, transitively, its children.
    pub fn remove_region(&self, id: &str) -> Vec<Arc<Region>> {
        self.remove_region_with(id, RemovalStrategy::RemoveChildren)
    }

    pub fn remove_region_with(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<Region>> {
        self.index.load().remove(id, strategy)
    }

    /// Remove a region only if no other region names it as parent.
    ///
    /// Callers that want the children gone or detached must pick a
    /// [`RemovalStrategy`] and use [`Self::remove_region_with`].
    pub fn remove_region_checked(&self, id: &str) -> Result<Vec<Arc<Region>>, RegionError> {
        let id = normalize_id(id);
        let index = self.index.load();

        let mut children: Vec<String> = index
            .values()
            .into_iter()
            .filter(|region| region.parent().is_some_and(|parent| parent.id() == id))
            .map(|region| region.id().to_owned())
            .collect();

        if !children.is_empty() {
            children.sort();
            return Err(RegionError::HasChildren {
                region: id,
                children,
            });
        }

        Ok(index.remove(&id, RemovalStrategy::UnsetParentInChildren))
    }

    /// Get the number of regions, including the global one.
    #[must_use]
    pub fn size(&self) -> usize {
        self.index.load().len()
    }

    // ==================== Queries ====================

    /// Regions that apply at `pos`.
    #[must_use]
    pub fn applicable_regions(&self, pos: BlockPos) -> ApplicableRegionSet {
        let index = self.index.load();
        ApplicableRegionSet::new(index.containing(pos), index.get(GLOBAL_REGION))
    }

    /// Regions that apply anywhere inside `region`.
    #[must_use]
    pub fn applicable_regions_for(&self, region: &Region) -> ApplicableRegionSet {
        let index = self.index.load();
        ApplicableRegionSet::new(index.intersecting(region), index.get(GLOBAL_REGION))
    }

    /// IDs of the regions whose shape contains `pos`.
    #[must_use]
    pub fn applicable_region_ids(&self, pos: BlockPos) -> Vec<String> {
        let mut ids: Vec<String> = self
            .index
            .load()
            .containing(pos)
            .iter()
            .map(|region| region.id().to_owned())
            .collect();
        ids.sort();
        ids
    }

    /// Whether `region` overlaps any region that `actor` does not own.
    #[must_use]
    pub fn overlaps_unowned_region(&self, region: &Region, actor: &dyn Actor) -> bool {
        self.index
            .load()
            .intersecting(region)
            .iter()
            .any(|other| other.id() != region.id() && !other.owners().contains(actor))
    }

    /// Number of regions listing `actor` directly as an owner.
    #[must_use]
    pub fn region_count_of_player(&self, actor: &dyn Actor) -> usize {
        self.index
            .load()
            .values()
            .iter()
            .filter(|region| region.owners().contains(actor))
            .count()
    }
}

impl std::fmt::Debug for RegionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionManager")
            .field("name", &self.name)
            .field("store", &self.store.name())
            .field("kind", &self.kind)
            .field("regions", &self.size())
            .finish_non_exhaustive()
    }
}
