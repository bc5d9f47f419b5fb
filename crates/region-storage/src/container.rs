//! Per-world region managers with background autosave.
//!
//! # Architecture
//!
//! ```text
//! RegionContainer
//! ├── managers: world -> Arc<RegionManager>   created and loaded on first use
//! ├── stores:   world -> Arc<dyn RegionStore> kept across unload/reload
//! └── autosave thread                          save_changes() every interval
//!      └── stopped through a shutdown channel and joined on drop
//! ```

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use region_core::{RegionManager, RegionStore, StorageResult};
use region_flags::FlagRegistry;
use tracing::{debug, error, info};

use crate::{Backend, LmdbStore, MemoryStore, StorageConfig};

type Managers = Arc<RwLock<HashMap<String, Arc<RegionManager>>>>;

struct Autosave {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the region managers of every loaded world.
pub struct RegionContainer {
    config: StorageConfig,
    registry: Arc<FlagRegistry>,
    managers: Managers,
    stores: Mutex<HashMap<String, Arc<dyn RegionStore>>>,
    /// Serializes loads and unloads. Readers of `managers` never take it.
    lifecycle: Mutex<()>,
    autosave: Option<Autosave>,
}

impl RegionContainer {
    /// Create a container and start autosave if the config asks for it.
    pub fn new(config: StorageConfig, registry: Arc<FlagRegistry>) -> StorageResult<Self> {
        let managers: Managers = Arc::default();

        let autosave = match config.autosave {
            Some(interval) => Some(Self::spawn_autosave(Arc::clone(&managers), interval)?),
            None => None,
        };

        info!(
            backend = ?config.backend,
            index = ?config.index,
            autosave = ?config.autosave,
            "region container ready"
        );

        Ok(Self {
            config,
            registry,
            managers,
            stores: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(()),
            autosave,
        })
    }

    fn spawn_autosave(managers: Managers, interval: Duration) -> StorageResult<Autosave> {
        let (shutdown, signal) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("region-autosave".into())
            .spawn(move || {
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let snapshot: Vec<Arc<RegionManager>> =
                                managers.read().values().cloned().collect();
                            save_changes_of(&snapshot);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("region autosave stopped");
            })?;

        Ok(Autosave { shutdown, handle })
    }

    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    fn store_for(&self, world: &str) -> StorageResult<Arc<dyn RegionStore>> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(world) {
            return Ok(Arc::clone(store));
        }

        let store: Arc<dyn RegionStore> = match self.config.backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::Lmdb => Arc::new(LmdbStore::open(
                self.config.data_dir.join(world),
                self.config.map_size,
            )?),
        };
        stores.insert(world.to_owned(), Arc::clone(&store));
        Ok(store)
    }

    /// The manager for `world`, loading it on first use.
    ///
    /// The flag registry is frozen before the first load. Store I/O runs
    /// outside the manager map lock, so other worlds stay readable while a
    /// slow store loads.
    pub fn get(&self, world: &str) -> StorageResult<Arc<RegionManager>> {
        if let Some(manager) = self.loaded(world) {
            return Ok(manager);
        }

        let _lifecycle = self.lifecycle.lock();
        if let Some(manager) = self.loaded(world) {
            return Ok(manager);
        }

        self.registry.freeze();
        let manager = Arc::new(RegionManager::new(
            world,
            self.store_for(world)?,
            Arc::clone(&self.registry),
            self.config.index,
        ));
        manager.load()?;

        let mut managers = self.managers.write();
        Ok(Arc::clone(
            managers.entry(world.to_owned()).or_insert(manager),
        ))
    }

    /// The manager for `world` if it is loaded.
    #[must_use]
    pub fn loaded(&self, world: &str) -> Option<Arc<RegionManager>> {
        self.managers.read().get(world).cloned()
    }

    /// Names of the loaded worlds, sorted.
    #[must_use]
    pub fn worlds(&self) -> Vec<String> {
        let mut worlds: Vec<String> = self.managers.read().keys().cloned().collect();
        worlds.sort();
        worlds
    }

    /// Save and drop the manager for `world`.
    ///
    /// Returns `false` if the world was not loaded. If the save fails the
    /// manager is put back.
    pub fn unload(&self, world: &str) -> StorageResult<bool> {
        let _lifecycle = self.lifecycle.lock();

        let removed = self.managers.write().remove(world);
        let Some(manager) = removed else {
            return Ok(false);
        };

        if let Err(e) = manager.save_changes() {
            self.managers.write().insert(world.to_owned(), manager);
            return Err(e);
        }

        info!(world, "unloaded regions");
        Ok(true)
    }

    /// Save pending changes of every loaded world.
    ///
    /// Every world is attempted; the first failure is returned.
    pub fn save_all_changes(&self) -> StorageResult<()> {
        let snapshot: Vec<Arc<RegionManager>> = self.managers.read().values().cloned().collect();
        save_changes_of(&snapshot).map_or(Ok(()), Err)
    }
}

/// Save every manager, logging failures. Returns the first failure.
fn save_changes_of(managers: &[Arc<RegionManager>]) -> Option<region_core::StorageError> {
    let mut first = None;
    for manager in managers {
        match manager.save_changes() {
            Ok(true) => debug!(world = manager.name(), "saved region changes"),
            Ok(false) => {}
            Err(e) => {
                error!(world = manager.name(), error = %e, "failed to save regions");
                first.get_or_insert(e);
            }
        }
    }
    first
}

impl Drop for RegionContainer {
    fn drop(&mut self) {
        if let Some(autosave) = self.autosave.take() {
            autosave.shutdown.send(()).ok();
            if autosave.handle.join().is_err() {
                error!("region autosave thread panicked");
            }
        }
        if let Err(e) = self.save_all_changes() {
            error!(error = %e, "failed to save regions on shutdown");
        }
    }
}

impl std::fmt::Debug for RegionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionContainer")
            .field("config", &self.config)
            .field("worlds", &self.worlds())
            .field("autosave", &self.autosave.is_some())
            .finish_non_exhaustive()
    }
}
