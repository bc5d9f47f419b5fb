use std::sync::Arc;

use region_flags::FlagRegistry;

use crate::{Region, RegionDifference, StorageError, StorageResult};

/// Per-world persistence backend.
///
/// Implementations do blocking IO and are called by [`crate::RegionManager`]
/// outside of any index lock.
pub trait RegionStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Load every stored region with parents already linked.
    ///
    /// Must not return a partial result on failure.
    fn load_all(&self, registry: &FlagRegistry) -> StorageResult<Vec<Arc<Region>>>;

    /// Overwrite the store with exactly `regions`.
    fn save_all(&self, regions: &[Arc<Region>]) -> StorageResult<()>;

    /// Write only what changed.
    ///
    /// Backends without incremental writes keep the default, which asks the
    /// caller to fall back to [`RegionStore::save_all`].
    fn save_changes(&self, _difference: &RegionDifference) -> StorageResult<()> {
        Err(StorageError::PartialSaveUnsupported)
    }
}
