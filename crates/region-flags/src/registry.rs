//! The flag registry.
//!
//! # Lifecycle
//!
//! A registry starts open. Plugins and host code call [`FlagRegistry::register`]
//! during startup, then the host calls [`FlagRegistry::freeze`]. After that,
//! registering is an error, while lookups and [`FlagRegistry::unmarshal`] keep
//! working. Unknown names met while loading stored data may still be added as
//! pass-through placeholders so that a load/save cycle keeps them.

use std::{
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Flag, FlagError, FlagResult, FlagValue, builtin, flag::GROUP_SUFFIX};

/// Catalogue mapping lowercase flag names to definitions.
#[derive(Default)]
pub struct FlagRegistry {
    flags: RwLock<HashMap<String, Flag>>,
    frozen: AtomicBool,
}

impl FlagRegistry {
    /// Create a new empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an open registry holding the built-in flags.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        {
            let mut flags = registry.flags.write();
            for flag in builtin::all() {
                flags.insert(flag.key().to_owned(), flag);
            }
        }
        registry
    }

    /// Process-wide registry, built with the defaults on first use.
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<Arc<FlagRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::with_defaults()))
    }

    /// Register a flag.
    ///
    /// Fails once the registry is frozen or if the name is taken.
    pub fn register(&self, flag: Flag) -> FlagResult<()> {
        let mut flags = self.flags.write();
        if self.is_frozen() {
            return Err(FlagError::RegistryFrozen(flag.name().to_owned()));
        }
        if flags.contains_key(flag.key()) {
            return Err(FlagError::Conflict(flag.key().to_owned()));
        }
        debug!(flag = flag.name(), "registered flag");
        flags.insert(flag.key().to_owned(), flag);
        Ok(())
    }

    /// Register several flags. Name conflicts are logged and skipped; a
    /// frozen registry is an error.
    pub fn register_all(&self, flags: impl IntoIterator<Item = Flag>) -> FlagResult<()> {
        for flag in flags {
            match self.register(flag) {
                Ok(()) => {}
                Err(FlagError::Conflict(name)) => {
                    warn!(flag = %name, "a flag already exists by this name");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Close the registration phase.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Look up a flag by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Flag> {
        self.flags.read().get(&name.to_lowercase()).cloned()
    }

    /// Every registered flag, in no particular order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Flag> {
        self.flags.read().values().cloned().collect()
    }

    /// Get the number of registered flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.read().len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.read().is_empty()
    }

    /// Fetch `name`, adding an unknown placeholder if nothing is registered.
    fn get_or_create_unknown(&self, name: &str) -> Option<Flag> {
        let mut flags = self.flags.write();
        if let Some(flag) = flags.get(&name.to_lowercase()) {
            return Some(flag.clone());
        }

        match Flag::unknown(name) {
            Ok(flag) => {
                debug!(flag = name, "preserving unknown flag");
                flags.insert(flag.key().to_owned(), flag.clone());
                Some(flag)
            }
            Err(e) => {
                warn!(flag = name, error = %e, "cannot preserve unknown flag");
                None
            }
        }
    }

    /// Convert raw persisted flag values into typed values.
    ///
    /// `<name>-group` entries are attached to the region-group flag of
    /// `<name>`. Unknown names become placeholders when `create_unknown` is
    /// set and are dropped with a warning otherwise. Values that fail to
    /// parse are dropped with a warning.
    pub fn unmarshal<'a>(
        &self,
        raw: impl IntoIterator<Item = (&'a str, &'a Value)>,
        create_unknown: bool,
    ) -> HashMap<Flag, FlagValue> {
        let mut values = HashMap::new();
        let mut group_entries = Vec::new();

        for (name, raw_value) in raw {
            if name.ends_with(GROUP_SUFFIX) {
                group_entries.push((name, raw_value));
                continue;
            }

            let flag = if create_unknown {
                self.get_or_create_unknown(name)
            } else {
                self.get(name)
            };
            let Some(flag) = flag else {
                warn!(flag = name, "dropping value of unregistered flag");
                continue;
            };

            match flag.unmarshal(raw_value) {
                Some(value) => {
                    values.insert(flag, value);
                }
                None => warn!(flag = flag.name(), value = %raw_value, "failed to parse flag value"),
            }
        }

        for (name, raw_value) in group_entries {
            self.unmarshal_group_entry(name, raw_value, create_unknown, &mut values);
        }

        values
    }

    fn unmarshal_group_entry(
        &self,
        name: &str,
        raw_value: &Value,
        create_unknown: bool,
        values: &mut HashMap<Flag, FlagValue>,
    ) {
        let parent_name = name.strip_suffix(GROUP_SUFFIX).unwrap_or(name);
        let group_flag = self
            .get(parent_name)
            .filter(|parent| !parent.is_unknown())
            .and_then(|parent| parent.region_group_flag().cloned());

        if let Some(group_flag) = group_flag {
            match group_flag.unmarshal(raw_value) {
                Some(value) => {
                    values.insert(group_flag, value);
                }
                None => warn!(flag = name, value = %raw_value, "failed to parse region group"),
            }
            return;
        }

        if !create_unknown {
            warn!(flag = name, "dropping group of unregistered flag");
            return;
        }
        if let Some(flag) = self.get_or_create_unknown(name) {
            values.insert(flag, FlagValue::Raw(raw_value.clone()));
        }
    }
}

impl fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagRegistry")
            .field("count", &self.len())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{FlagKind, RegionGroup, State};

    fn raw(pairs: &[(&'static str, Value)]) -> Vec<(&'static str, Value)> {
        pairs.to_vec()
    }

    #[test]
    fn test_registration() {
        let registry = FlagRegistry::new();
        registry.register(Flag::state("pvp", false).unwrap()).unwrap();

        assert!(registry.get("PVP").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflict() {
        let registry = FlagRegistry::new();
        registry.register(Flag::state("pvp", false).unwrap()).unwrap();

        let err = registry.register(Flag::state("PvP", true).unwrap()).unwrap_err();
        assert_eq!(err, FlagError::Conflict("pvp".into()));
    }

    #[test]
    fn test_register_after_freeze_rejected() {
        let registry = FlagRegistry::with_defaults();
        let before = registry.len();
        registry.freeze();

        let err = registry.register(Flag::state("late", false).unwrap()).unwrap_err();
        assert_eq!(err, FlagError::RegistryFrozen("late".into()));
        assert_eq!(registry.len(), before);
        assert!(registry.get("build").is_some());
    }

    #[test]
    fn test_register_all_skips_conflicts() {
        let registry = FlagRegistry::new();
        registry
            .register_all([
                Flag::state("a", false).unwrap(),
                Flag::state("A", false).unwrap(),
                Flag::state("b", false).unwrap(),
            ])
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unmarshal_known_and_group() {
        let registry = FlagRegistry::with_defaults();
        let entries = raw(&[("pvp", json!("deny")), ("pvp-group", json!("nonmembers"))]);

        let values = registry.unmarshal(entries.iter().map(|(k, v)| (*k, v)), false);
        let pvp = registry.get("pvp").unwrap();

        assert_eq!(values.get(&pvp), Some(&FlagValue::State(State::Deny)));
        assert_eq!(
            values.get(pvp.region_group_flag().unwrap()),
            Some(&FlagValue::RegionGroup(RegionGroup::NonMembers))
        );
    }

    #[test]
    fn test_unmarshal_unknown_dropped_without_create() {
        let registry = FlagRegistry::with_defaults();
        let entries = raw(&[("custom-thing", json!(3)), ("custom-thing-group", json!("owners"))]);

        let values = registry.unmarshal(entries.iter().map(|(k, v)| (*k, v)), false);
        assert!(values.is_empty());
        assert!(registry.get("custom-thing").is_none());
    }

    #[test]
    fn test_unmarshal_unknown_preserved_with_create() {
        let registry = FlagRegistry::with_defaults();
        registry.freeze();
        let entries = raw(&[("custom-thing", json!(3)), ("custom-thing-group", json!("owners"))]);

        let values = registry.unmarshal(entries.iter().map(|(k, v)| (*k, v)), true);
        let custom = registry.get("custom-thing").unwrap();
        let custom_group = registry.get("custom-thing-group").unwrap();

        assert_eq!(custom.kind(), &FlagKind::Unknown);
        assert_eq!(values.get(&custom), Some(&FlagValue::Raw(json!(3))));
        assert_eq!(values.get(&custom_group), Some(&FlagValue::Raw(json!("owners"))));
    }

    #[test]
    fn test_unmarshal_malformed_value_skipped() {
        let registry = FlagRegistry::with_defaults();
        let entries = raw(&[("pvp", json!(12)), ("build", json!("allow"))]);

        let values = registry.unmarshal(entries.iter().map(|(k, v)| (*k, v)), true);
        assert_eq!(values.len(), 1);
        assert!(values.contains_key(&registry.get("build").unwrap()));
    }

    #[test]
    fn test_global_registry_has_defaults() {
        let registry = FlagRegistry::global();
        assert!(registry.get("passthrough").is_some());
        assert!(registry.get("build").unwrap().uses_membership_as_default());
    }
}
