//! Protected regions and the rules that decide what happens inside them.
//!
//! # Architecture
//!
//! ```text
//! RegionManager (one per world)
//! ├── ArcSwap<RegionIndex>       swapped whole on load
//! │   └── Arc<Region> ...        shared, edited in place
//! └── Arc<dyn RegionStore>       blocking persistence backend
//!
//! query(pos) -> ApplicableRegionSet -> flag values / build permission
//! ```
//!
//! Regions carry a shape, a priority, flag values, owner and member
//! [`Domain`]s, and at most one parent. The [`RegionIndex`] answers
//! containment and intersection queries; [`ApplicableRegionSet`] turns the
//! hits into decisions.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use region_core::{ApplicableRegionSet, Player, Region};
//! use region_flags::{FlagValue, State, builtin};
//! use uuid::Uuid;
//!
//! let spawn = Arc::new(Region::cuboid("spawn", (0, 0, 0).into(), (10, 10, 10).into()).unwrap());
//! spawn.set_flag(&builtin::PVP, Some(FlagValue::State(State::Deny)));
//!
//! let set = ApplicableRegionSet::new(vec![spawn], None);
//! let player = Player::new(Uuid::new_v4(), "steve");
//!
//! assert_eq!(set.query_value(&builtin::PVP, Some(&player)), Some(FlagValue::State(State::Deny)));
//! assert!(!set.can_build(&player));
//! ```

mod actor;
mod applicable;
mod domain;
mod error;
mod index;
mod manager;
pub mod migration;
pub mod region;
pub mod resolver;
mod store;

pub use actor::{Actor, Player};
pub use applicable::ApplicableRegionSet;
pub use domain::{Domain, GroupDomain, PlayerDomain};
pub use error::{RegionError, ResolveError, StorageError, StorageResult};
pub use index::{IndexKind, RegionDifference, RegionIndex, RemovalStrategy};
pub use manager::RegionManager;
pub use region::{GLOBAL_REGION, Region};
pub use resolver::{DomainInputResolver, Profile, ProfileService, UserLocatorPolicy};
pub use store::RegionStore;
