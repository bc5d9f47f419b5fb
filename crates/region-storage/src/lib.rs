//! Region persistence.
//!
//! Stores implement [`region_core::RegionStore`] on top of [`RegionRecord`]s:
//!
//! - [`MemoryStore`] keeps records in memory, optionally without
//!   incremental saves
//! - [`LmdbStore`] keeps one bincode record per region in an LMDB
//!   environment and writes differences in a single transaction
//!
//! [`RegionContainer`] ties a store to a [`region_core::RegionManager`] per
//! world, configured through [`StorageConfig`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use region_core::{Region, RegionManager, RegionStore};
//! use region_flags::FlagRegistry;
//! use region_storage::MemoryStore;
//!
//! let store: Arc<dyn RegionStore> = Arc::new(MemoryStore::new());
//! let registry = Arc::new(FlagRegistry::with_defaults());
//! let manager = RegionManager::new("world", Arc::clone(&store), registry, Default::default());
//!
//! manager.add_region(Arc::new(Region::cuboid("spawn", (0, 0, 0).into(), (9, 9, 9).into()).unwrap()));
//! manager.save().unwrap();
//! manager.load().unwrap();
//! assert!(manager.has_region("spawn"));
//! ```

mod config;
mod container;
mod lmdb;
mod memory;
pub mod record;

pub use config::{Backend, StorageConfig};
pub use container::RegionContainer;
pub use lmdb::LmdbStore;
pub use memory::MemoryStore;
pub use record::{DomainRecord, RegionRecord};
