//! Region store that keeps records in process memory.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use region_core::{Region, RegionDifference, RegionStore, StorageError, StorageResult};
use region_flags::FlagRegistry;
use tracing::trace;

use crate::record::{RegionRecord, link_records, records_of};

/// In-memory store.
///
/// Regions are kept as records, so every load hands out fresh instances
/// exactly like a disk-backed store would.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, RegionRecord>>,
    reject_partial: bool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses incremental saves, forcing callers onto the
    /// full-save path.
    #[must_use]
    pub fn without_partial_saves() -> Self {
        Self {
            reject_partial: true,
            ..Self::default()
        }
    }

    /// Get the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// The stored record for `id`, if any.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<RegionRecord> {
        self.records.lock().get(&id.to_lowercase()).cloned()
    }

    /// Insert a raw record, bypassing region validation.
    pub fn insert_record(&self, record: RegionRecord) {
        self.records.lock().insert(record.id.to_lowercase(), record);
    }
}

impl RegionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_all(&self, registry: &FlagRegistry) -> StorageResult<Vec<Arc<Region>>> {
        let mut records: Vec<RegionRecord> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(link_records(&records, registry))
    }

    fn save_all(&self, regions: &[Arc<Region>]) -> StorageResult<()> {
        let records = records_of(regions)?;
        let mut stored = self.records.lock();
        stored.clear();
        stored.extend(records.into_iter().map(|record| (record.id.clone(), record)));
        trace!(regions = stored.len(), "replaced in-memory regions");
        Ok(())
    }

    fn save_changes(&self, difference: &RegionDifference) -> StorageResult<()> {
        if self.reject_partial {
            return Err(StorageError::PartialSaveUnsupported);
        }

        let changed = records_of(difference.changed())?;
        let mut stored = self.records.lock();
        for region in difference.removed() {
            stored.remove(region.id());
        }
        for record in changed {
            stored.insert(record.id.clone(), record);
        }
        trace!(
            changed = difference.changed().len(),
            removed = difference.removed().len(),
            "applied in-memory region changes"
        );
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.len())
            .field("reject_partial", &self.reject_partial)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuboid(id: &str) -> Arc<Region> {
        Arc::new(Region::cuboid(id, (0, 0, 0).into(), (1, 1, 1).into()).unwrap())
    }

    #[test]
    fn test_save_all_replaces() {
        let store = MemoryStore::new();
        store.save_all(&[cuboid("a"), cuboid("b")]).unwrap();
        store.save_all(&[cuboid("c")]).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.record("C").is_some());
    }

    #[test]
    fn test_save_changes() {
        let store = MemoryStore::new();
        store.save_all(&[cuboid("a"), cuboid("b")]).unwrap();

        let difference = RegionDifference::new(vec![cuboid("c")], vec![cuboid("a")]);
        store.save_changes(&difference).unwrap();

        let ids: Vec<String> = store
            .load_all(&FlagRegistry::new())
            .unwrap()
            .iter()
            .map(|r| r.id().to_owned())
            .collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn test_rejects_partial() {
        let store = MemoryStore::without_partial_saves();
        let result = store.save_changes(&RegionDifference::default());
        assert!(matches!(result, Err(StorageError::PartialSaveUnsupported)));
    }

    #[test]
    fn test_loads_fresh_instances() {
        let store = MemoryStore::new();
        let region = cuboid("a");
        store.save_all(&[Arc::clone(&region)]).unwrap();

        let loaded = store.load_all(&FlagRegistry::new()).unwrap();
        assert!(!Arc::ptr_eq(&loaded[0], &region));
        assert!(loaded[0].same_definition(&region));
    }
}
