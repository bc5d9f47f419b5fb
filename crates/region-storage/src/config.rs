//! Storage configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `REGION_DATA_DIR` | `data/regions` |
//! | `REGION_BACKEND` | `lmdb` (`lmdb` or `memory`) |
//! | `REGION_INDEX` | `grid` (`grid` or `flat`) |
//! | `REGION_GRID_CELL` | `128` |
//! | `REGION_AUTOSAVE_SECS` | `30`, `0` disables autosave |
//! | `REGION_MAP_SIZE_MB` | `256` |
//!
//! Values that fail to parse fall back to the default with a warning.

use std::{path::PathBuf, str::FromStr, time::Duration};

use region_core::IndexKind;
use tracing::warn;

const DEFAULT_GRID_CELL: i32 = 128;
const DEFAULT_AUTOSAVE_SECS: u64 = 30;
const DEFAULT_MAP_SIZE_MB: usize = 256;

/// Where region data lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Lmdb,
    Memory,
}

/// Settings for [`crate::RegionContainer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root directory; each world gets a subdirectory.
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub index: IndexKind,
    /// `None` disables the autosave thread.
    pub autosave: Option<Duration>,
    /// LMDB map size in bytes.
    pub map_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/regions"),
            backend: Backend::Lmdb,
            index: IndexKind::Grid {
                cell_size: DEFAULT_GRID_CELL,
            },
            autosave: Some(Duration::from_secs(DEFAULT_AUTOSAVE_SECS)),
            map_size: DEFAULT_MAP_SIZE_MB * 1024 * 1024,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(key, value = %raw, "ignoring malformed setting");
        default
    })
}

impl StorageConfig {
    /// Read the settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup`, which returns the raw value of a
    /// variable if it is set.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let data_dir = lookup("REGION_DATA_DIR").map_or(defaults.data_dir, PathBuf::from);

        let backend = match lookup("REGION_BACKEND").map(|v| v.trim().to_lowercase()) {
            None => defaults.backend,
            Some(v) if v == "lmdb" => Backend::Lmdb,
            Some(v) if v == "memory" => Backend::Memory,
            Some(v) => {
                warn!(key = "REGION_BACKEND", value = %v, "unknown backend; using lmdb");
                defaults.backend
            }
        };

        let cell_size = match parse_or("REGION_GRID_CELL", lookup("REGION_GRID_CELL"), DEFAULT_GRID_CELL) {
            size if size > 0 => size,
            size => {
                warn!(key = "REGION_GRID_CELL", value = size, "grid cell must be positive");
                DEFAULT_GRID_CELL
            }
        };

        let index = match lookup("REGION_INDEX").map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "flat" => IndexKind::Flat,
            Some(v) if v != "grid" => {
                warn!(key = "REGION_INDEX", value = %v, "unknown index; using grid");
                IndexKind::Grid { cell_size }
            }
            _ => IndexKind::Grid { cell_size },
        };

        let autosave = match parse_or(
            "REGION_AUTOSAVE_SECS",
            lookup("REGION_AUTOSAVE_SECS"),
            DEFAULT_AUTOSAVE_SECS,
        ) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let map_size_mb = parse_or("REGION_MAP_SIZE_MB", lookup("REGION_MAP_SIZE_MB"), DEFAULT_MAP_SIZE_MB);

        Self {
            data_dir,
            backend,
            index,
            autosave,
            map_size: map_size_mb.saturating_mul(1024 * 1024),
        }
    }
}
