//! Typed region flags.
//!
//! Flags are the named settings regions carry: `build`, `pvp`, `entry`,
//! `greeting`, and whatever else a host registers. This crate defines them:
//!
//! - **Values**: [`FlagValue`] plus the [`State`] (allow/deny) and
//!   [`RegionGroup`] enums
//! - **Definitions**: [`Flag`], a shared handle carrying a [`FlagKind`], an
//!   optional default, and a paired `<name>-group` flag
//! - **Registry**: [`FlagRegistry`], open for registration during startup and
//!   frozen afterwards
//! - **Built-ins**: the [`builtin`] catalogue
//!
//! # Example
//!
//! ```
//! use region_flags::{Flag, FlagRegistry, FlagValue, State};
//!
//! let registry = FlagRegistry::with_defaults();
//! registry.register(Flag::state("my-plugin:fly", false).unwrap()).unwrap();
//! registry.freeze();
//!
//! let fly = registry.get("my-plugin:fly").unwrap();
//! assert_eq!(fly.parse_input("deny").unwrap(), FlagValue::State(State::Deny));
//! ```

pub mod builtin;
mod error;
pub mod flag;
mod registry;
mod value;

pub use error::{FlagError, FlagResult};
pub use flag::{Flag, FlagBuilder, FlagKind};
pub use registry::FlagRegistry;
pub use value::{Association, FlagValue, RegionGroup, State};
