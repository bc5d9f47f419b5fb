//! LMDB-backed region store.

use std::{path::Path, sync::Arc};

use heed::{Database, Env, EnvOpenOptions, types::Bytes};
use region_core::{Region, RegionDifference, RegionStore, StorageError, StorageResult};
use region_flags::FlagRegistry;
use tracing::{debug, trace};

use crate::record::{RegionRecord, link_records, records_of};

fn backend(e: heed::Error) -> StorageError {
    StorageError::Backend(Box::new(e))
}

fn encode(record: &RegionRecord) -> StorageResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| StorageError::Encoding(format!("region {}: {e}", record.id)))
}

/// One LMDB environment per world, one bincode record per region keyed by ID.
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create the store in directory `path`.
    ///
    /// # Safety
    /// Uses unsafe to call heed's open method which requires that the
    /// environment is not opened twice in one process with different
    /// options. Callers keep one store per world directory.
    #[allow(unsafe_code)]
    pub fn open(path: impl AsRef<Path>, map_size: usize) -> StorageResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        // SAFETY: one store per directory, see above
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)
                .map_err(backend)?
        };

        let mut wtxn = env.write_txn().map_err(backend)?;
        let db = env
            .create_database(&mut wtxn, Some("regions"))
            .map_err(backend)?;
        wtxn.commit().map_err(backend)?;

        debug!(path = %path.display(), "opened region database");
        Ok(Self { env, db })
    }

    /// Get the number of stored records.
    pub fn record_count(&self) -> StorageResult<u64> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        self.db.len(&rtxn).map_err(backend)
    }

    fn read_records(&self) -> StorageResult<Vec<RegionRecord>> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        let mut records = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(backend)? {
            let (key, bytes) = entry.map_err(backend)?;
            let record: RegionRecord = bincode::deserialize(bytes).map_err(|e| {
                StorageError::Encoding(format!("region {}: {e}", String::from_utf8_lossy(key)))
            })?;
            if record.id.as_bytes() != key {
                return Err(StorageError::Malformed(format!(
                    "record {} stored under key {}",
                    record.id,
                    String::from_utf8_lossy(key)
                )));
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl RegionStore for LmdbStore {
    fn name(&self) -> &str {
        "lmdb"
    }

    fn load_all(&self, registry: &FlagRegistry) -> StorageResult<Vec<Arc<Region>>> {
        let records = self.read_records()?;
        Ok(link_records(&records, registry))
    }

    fn save_all(&self, regions: &[Arc<Region>]) -> StorageResult<()> {
        let encoded = records_of(regions)?
            .iter()
            .map(|record| encode(record).map(|bytes| (record.id.clone(), bytes)))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut wtxn = self.env.write_txn().map_err(backend)?;
        self.db.clear(&mut wtxn).map_err(backend)?;
        for (id, bytes) in &encoded {
            self.db.put(&mut wtxn, id.as_bytes(), bytes).map_err(backend)?;
        }
        wtxn.commit().map_err(backend)?;

        trace!(regions = encoded.len(), "wrote all regions");
        Ok(())
    }

    fn save_changes(&self, difference: &RegionDifference) -> StorageResult<()> {
        let encoded = records_of(difference.changed())?
            .iter()
            .map(|record| encode(record).map(|bytes| (record.id.clone(), bytes)))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut wtxn = self.env.write_txn().map_err(backend)?;
        for region in difference.removed() {
            self.db
                .delete(&mut wtxn, region.id().as_bytes())
                .map_err(backend)?;
        }
        for (id, bytes) in &encoded {
            self.db.put(&mut wtxn, id.as_bytes(), bytes).map_err(backend)?;
        }
        wtxn.commit().map_err(backend)?;

        trace!(
            changed = encoded.len(),
            removed = difference.removed().len(),
            "wrote region changes"
        );
        Ok(())
    }
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .finish_non_exhaustive()
    }
}
