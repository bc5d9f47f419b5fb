//! Resolution of flags and permissions over the regions at a point.
//!
//! An [`ApplicableRegionSet`] holds the regions found by a containment or
//! intersection query, every ancestor of those regions, and the world's
//! global region if it has one. Candidates are grouped into tiers of equal
//! priority, highest first.
//!
//! # Flag values
//!
//! Only values set directly on a candidate count; a region without a value
//! is transparent for that flag. A value is also ignored when the flag's
//! `-group` setting on that region excludes the actor. The highest tier
//! holding any value decides:
//!
//! - state flags combine deny-wins, so one `deny` beats any number of `allow`
//! - other flags drop values from ancestors of another valued region in the
//!   tier (the child is more specific) and take the first remaining by ID
//!
//! With no tier holding a value, flags that use membership as their default
//! (`build`) answer `allow` only for members of the top non-passthrough tier.
//! Otherwise the global region's value is used, then the flag's default.
//!
//! # Permissions
//!
//! [`ApplicableRegionSet::is_permitted`] skips passthrough regions and looks
//! only at the top tier. An explicit `deny` there refuses; an explicit
//! `allow` grants; otherwise the actor must be an owner or member of at
//! least one region in the tier. Lower tiers are never consulted.

use std::sync::Arc;

use hashbrown::HashSet;
use region_flags::{Flag, FlagKind, FlagValue, RegionGroup, State, builtin};
use smallvec::SmallVec;

use crate::{Actor, Region};

/// The regions that apply at a point or over a volume.
#[derive(Clone, Debug, Default)]
pub struct ApplicableRegionSet {
    matched: Vec<Arc<Region>>,
    candidates: Vec<Arc<Region>>,
    global: Option<Arc<Region>>,
}

fn by_priority(a: &Arc<Region>, b: &Arc<Region>) -> std::cmp::Ordering {
    b.priority()
        .cmp(&a.priority())
        .then_with(|| a.id().cmp(b.id()))
}

impl ApplicableRegionSet {
    /// Build a set from directly matched regions and the global region.
    ///
    /// Ancestors of the matched regions are added as candidates.
    #[must_use]
    pub fn new(matched: Vec<Arc<Region>>, global: Option<Arc<Region>>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        let global_id = global.as_ref().map(|g| g.id().to_owned());

        let mut matched: Vec<Arc<Region>> = matched
            .into_iter()
            .filter(|region| Some(region.id()) != global_id.as_deref())
            .collect();
        matched.sort_by(by_priority);
        matched.dedup_by(|a, b| a.id() == b.id());

        for region in &matched {
            for candidate in std::iter::once(Arc::clone(region)).chain(region.ancestors()) {
                if Some(candidate.id()) == global_id.as_deref() {
                    continue;
                }
                if seen.insert(candidate.id().to_owned()) {
                    candidates.push(candidate);
                }
            }
        }
        candidates.sort_by(by_priority);

        Self {
            matched,
            candidates,
            global,
        }
    }

    /// A set with no regions at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Regions found by the query, highest priority first.
    #[must_use]
    pub fn matched(&self) -> &[Arc<Region>] {
        &self.matched
    }

    /// Matched regions and all their ancestors, highest priority first.
    #[must_use]
    pub fn regions(&self) -> &[Arc<Region>] {
        &self.candidates
    }

    #[must_use]
    pub fn global(&self) -> Option<&Arc<Region>> {
        self.global.as_ref()
    }

    /// Get the number of candidate regions, excluding the global region.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check if no region other than the global one applies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn tiers<'a>(regions: impl IntoIterator<Item = &'a Arc<Region>>) -> Vec<Vec<&'a Arc<Region>>> {
        let mut tiers: Vec<Vec<&Arc<Region>>> = Vec::new();
        let mut current_priority = None;
        for region in regions {
            let priority = region.priority();
            if current_priority != Some(priority) {
                tiers.push(Vec::new());
                current_priority = Some(priority);
            }
            if let Some(tier) = tiers.last_mut() {
                tier.push(region);
            }
        }
        tiers
    }

    // ==================== Flag values ====================

    /// The region's own value for `flag`, if its `-group` setting admits the actor.
    fn gated_value(region: &Region, flag: &Flag, actor: Option<&dyn Actor>) -> Option<FlagValue> {
        let value = region.flag(flag)?;

        if let Some(group_flag) = flag.region_group_flag() {
            let group = region
                .flag(group_flag)
                .and_then(|v| v.as_region_group())
                .or_else(|| flag.default_group())
                .unwrap_or(RegionGroup::All);
            if group != RegionGroup::All && !group.contains(region.association(actor)) {
                return None;
            }
        }

        Some(value)
    }

    /// Values from the highest tier that has any. For non-state flags,
    /// ancestors are shadowed by their valued descendants.
    fn winning_tier(&self, flag: &Flag, actor: Option<&dyn Actor>) -> Vec<(Arc<Region>, FlagValue)> {
        for tier in Self::tiers(&self.candidates) {
            let valued: Vec<(Arc<Region>, FlagValue)> = tier
                .into_iter()
                .filter_map(|region| {
                    Self::gated_value(region, flag, actor).map(|value| (Arc::clone(region), value))
                })
                .collect();

            if valued.is_empty() {
                continue;
            }
            if flag.kind() == &FlagKind::State {
                return valued;
            }

            let shadowed: HashSet<String> = valued
                .iter()
                .flat_map(|(region, _)| region.ancestors())
                .map(|ancestor| ancestor.id().to_owned())
                .collect();

            return valued
                .into_iter()
                .filter(|(region, _)| !shadowed.contains(region.id()))
                .collect();
        }

        Vec::new()
    }

    /// Effective value of `flag` for `actor`.
    ///
    /// Never fails; falls back to the global region and then to the
    /// flag's default.
    #[must_use]
    pub fn query_value(&self, flag: &Flag, actor: Option<&dyn Actor>) -> Option<FlagValue> {
        let tier = self.winning_tier(flag, actor);

        if !tier.is_empty() {
            if flag.kind() == &FlagKind::State {
                let states = tier.iter().map(|(_, value)| value.as_state());
                return State::combine(states).map(FlagValue::State);
            }
            return tier.into_iter().next().map(|(_, value)| value);
        }

        self.fallback_value(flag, actor)
    }

    /// Value used when no tier holds one.
    ///
    /// Flags that use membership as their default answer `allow` for
    /// members and nothing for everyone else, the same way
    /// [`Self::is_permitted`] decides.
    fn fallback_value(&self, flag: &Flag, actor: Option<&dyn Actor>) -> Option<FlagValue> {
        let by_membership = actor.filter(|_| flag.uses_membership_as_default());

        if let Some(actor) = by_membership {
            if let Some(top) = self.top_tier() {
                let member = top.iter().any(|region| region.is_member(actor));
                return member.then_some(FlagValue::State(State::Allow));
            }
        }

        let global = self.global.as_deref();
        if let Some(value) = global.and_then(|global| Self::gated_value(global, flag, actor)) {
            return Some(value);
        }

        if let (Some(actor), Some(global)) = (by_membership, global) {
            if global.has_members_or_owners() {
                return global.is_member(actor).then_some(FlagValue::State(State::Allow));
            }
        }

        flag.default_value().cloned()
    }

    /// Every value of the deciding tier, or the single fallback value.
    #[must_use]
    pub fn query_all_values(&self, flag: &Flag, actor: Option<&dyn Actor>) -> Vec<FlagValue> {
        let tier = self.winning_tier(flag, actor);
        if !tier.is_empty() {
            return tier.into_iter().map(|(_, value)| value).collect();
        }

        self.fallback_value(flag, actor).into_iter().collect()
    }

    /// Deny-wins combination of several state flags.
    #[must_use]
    pub fn query_state(&self, actor: Option<&dyn Actor>, flags: &[&Flag]) -> Option<State> {
        State::combine(
            flags
                .iter()
                .map(|flag| self.query_value(flag, actor).and_then(|v| v.as_state())),
        )
    }

    /// Whether the combined state of `flags` is `allow`.
    #[must_use]
    pub fn test_state(&self, actor: Option<&dyn Actor>, flags: &[&Flag]) -> bool {
        self.query_state(actor, flags) == Some(State::Allow)
    }

    // ==================== Permissions ====================

    fn is_passthrough(region: &Region) -> bool {
        region.flag(&builtin::PASSTHROUGH).and_then(|v| v.as_state()) == Some(State::Allow)
    }

    /// Highest tier of regions that are not passthrough.
    fn top_tier(&self) -> Option<Vec<&Arc<Region>>> {
        let active = self.candidates.iter().filter(|region| !Self::is_passthrough(region));
        Self::tiers(active).into_iter().next()
    }

    /// Whether `actor` may perform the action guarded by `flag`.
    #[must_use]
    pub fn is_permitted(&self, flag: &Flag, actor: &dyn Actor) -> bool {
        if let Some(top) = self.top_tier() {
            let explicit: SmallVec<[Option<State>; 4]> = top
                .iter()
                .map(|region| Self::gated_value(region, flag, Some(actor)).and_then(|v| v.as_state()))
                .collect();

            return match State::combine(explicit) {
                Some(State::Deny) => false,
                Some(State::Allow) => true,
                None => top.iter().any(|region| region.is_member(actor)),
            };
        }

        let Some(global) = self.global.as_deref() else {
            return true;
        };

        match Self::gated_value(global, flag, Some(actor)).and_then(|v| v.as_state()) {
            Some(state) => state == State::Allow,
            None if global.has_members_or_owners() => global.is_member(actor),
            None => true,
        }
    }

    /// Whether `actor` may build here.
    #[must_use]
    pub fn can_build(&self, actor: &dyn Actor) -> bool {
        self.is_permitted(&builtin::BUILD, actor)
    }

    /// Owner of every matched region.
    #[must_use]
    pub fn is_owner_of_all(&self, actor: &dyn Actor) -> bool {
        self.matched.iter().all(|region| region.is_owner(actor))
    }

    /// Owner or member of every matched region.
    #[must_use]
    pub fn is_member_of_all(&self, actor: &dyn Actor) -> bool {
        self.matched.iter().all(|region| region.is_member(actor))
    }
}

impl<'a> IntoIterator for &'a ApplicableRegionSet {
    type Item = &'a Arc<Region>;
    type IntoIter = std::slice::Iter<'a, Arc<Region>>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

#[cfg(test)]
mod tests {
    use region_spatial::BlockPos;
    use uuid::Uuid;

    use super::*;
    use crate::Player;

    fn region(id: &str, min: (i32, i32, i32), max: (i32, i32, i32), priority: i32) -> Arc<Region> {
        let region = Region::cuboid(id, min.into(), max.into()).unwrap();
        region.set_priority(priority);
        Arc::new(region)
    }

    fn deny() -> Option<FlagValue> {
        Some(FlagValue::State(State::Deny))
    }

    fn allow() -> Option<FlagValue> {
        Some(FlagValue::State(State::Allow))
    }

    fn member() -> Player {
        Player::new(Uuid::from_u128(1), "alice").with_groups(["member"])
    }

    fn stranger() -> Player {
        Player::new(Uuid::from_u128(2), "mallory")
    }

    fn at(set_regions: &[&Arc<Region>], pos: BlockPos) -> ApplicableRegionSet {
        let found = set_regions
            .iter()
            .filter(|r| r.contains(pos))
            .map(|r| Arc::clone(r))
            .collect();
        ApplicableRegionSet::new(found, None)
    }

    fn courtyard_and_fountain() -> (Arc<Region>, Arc<Region>) {
        let courtyard = region("courtyard", (0, 0, 0), (10, 10, 10), 0);
        courtyard.with_members_mut(|m| m.add_group("member"));

        let fountain = region("fountain", (0, 0, 0), (5, 5, 5), 0);
        fountain.set_parent(Some(Arc::clone(&courtyard))).unwrap();
        fountain.set_flag(&builtin::PVP, deny());

        (courtyard, fountain)
    }

    #[test]
    fn test_ancestors_are_candidates() {
        let outer = region("outer", (100, 0, 100), (200, 10, 200), 0);
        let inner = region("inner", (0, 0, 0), (5, 5, 5), 0);
        inner.set_parent(Some(Arc::clone(&outer))).unwrap();

        let set = ApplicableRegionSet::new(vec![Arc::clone(&inner)], None);
        let ids: Vec<_> = set.regions().iter().map(|r| r.id()).collect();

        assert!(ids.contains(&"outer"));
        assert_eq!(set.matched().len(), 1);
    }

    #[test]
    fn test_child_value_with_transparent_parent() {
        let (courtyard, fountain) = courtyard_and_fountain();
        let regions = [&courtyard, &fountain];

        let inside_both = at(&regions, BlockPos::new(2, 2, 2));
        assert_eq!(inside_both.query_value(&builtin::PVP, None), deny());

        let courtyard_only = at(&regions, BlockPos::new(7, 7, 7));
        assert_eq!(courtyard_only.query_value(&builtin::PVP, None), None);
        assert_eq!(courtyard_only.query_value(&builtin::MOB_SPAWNING, None), allow());
    }

    #[test]
    fn test_member_can_build_in_courtyard() {
        let (courtyard, fountain) = courtyard_and_fountain();
        let regions = [&courtyard, &fountain];

        let set = at(&regions, BlockPos::new(7, 7, 7));
        assert!(set.can_build(&member()));
        assert!(!set.can_build(&stranger()));

        // The fountain inherits courtyard members.
        let set = at(&regions, BlockPos::new(2, 2, 2));
        assert!(set.can_build(&member()));
    }

    #[test]
    fn test_higher_priority_dominates() {
        let low = region("low", (0, 0, 0), (10, 10, 10), 0);
        let high = region("high", (0, 0, 0), (10, 10, 10), 10);
        low.set_flag(&builtin::PVP, deny());
        high.set_flag(&builtin::PVP, allow());

        let set = ApplicableRegionSet::new(vec![low, high], None);
        assert_eq!(set.query_value(&builtin::PVP, None), allow());
    }

    #[test]
    fn test_equal_priority_deny_wins() {
        let a = region("a", (0, 0, 0), (10, 10, 10), 5);
        let b = region("b", (0, 0, 0), (10, 10, 10), 5);
        a.set_flag(&builtin::PVP, allow());
        b.set_flag(&builtin::PVP, deny());

        let forward = ApplicableRegionSet::new(vec![Arc::clone(&a), Arc::clone(&b)], None);
        let backward = ApplicableRegionSet::new(vec![b, a], None);

        assert_eq!(forward.query_value(&builtin::PVP, None), deny());
        assert_eq!(backward.query_value(&builtin::PVP, None), deny());
    }

    #[test]
    fn test_unset_high_priority_is_transparent() {
        let low = region("low", (0, 0, 0), (10, 10, 10), 0);
        let high = region("high", (0, 0, 0), (10, 10, 10), 10);
        low.set_flag(&builtin::PVP, deny());

        let set = ApplicableRegionSet::new(vec![low, high], None);
        assert_eq!(set.query_value(&builtin::PVP, None), deny());
    }

    #[test]
    fn test_global_then_default_fallback() {
        let global = Arc::new(Region::global());
        global.set_flag(&builtin::PVP, deny());

        let set = ApplicableRegionSet::new(Vec::new(), Some(Arc::clone(&global)));
        assert_eq!(set.query_value(&builtin::PVP, None), deny());
        assert_eq!(set.query_value(&builtin::MOB_DAMAGE, None), allow());
        assert_eq!(set.query_value(&builtin::GREETING, None), None);
    }

    #[test]
    fn test_region_group_gating() {
        let region = region("shop", (0, 0, 0), (10, 10, 10), 0);
        region.with_members_mut(|m| m.add_group("member"));
        region.set_flag(&builtin::PVP, deny());
        region.set_flag(
            builtin::PVP.region_group_flag().unwrap(),
            Some(FlagValue::RegionGroup(RegionGroup::NonMembers)),
        );

        let set = ApplicableRegionSet::new(vec![region], None);
        let member = member();
        let stranger = stranger();

        assert_eq!(set.query_value(&builtin::PVP, Some(&stranger)), deny());
        assert_eq!(set.query_value(&builtin::PVP, Some(&member)), None);
        assert_eq!(set.query_value(&builtin::PVP, None), deny());
    }

    #[test]
    fn test_default_group_of_flag_applies() {
        // `entry` defaults to non-members only.
        let region = region("vault", (0, 0, 0), (10, 10, 10), 0);
        region.with_members_mut(|m| m.add_group("member"));
        region.set_flag(&builtin::ENTRY, deny());

        let set = ApplicableRegionSet::new(vec![region], None);
        let member = member();
        let stranger = stranger();

        assert_eq!(set.query_value(&builtin::ENTRY, Some(&stranger)), deny());
        assert_eq!(set.query_value(&builtin::ENTRY, Some(&member)), allow());
    }

    #[test]
    fn test_non_state_child_shadows_parent() {
        let parent = region("parent", (0, 0, 0), (10, 10, 10), 0);
        let child = region("child", (0, 0, 0), (5, 5, 5), 0);
        child.set_parent(Some(Arc::clone(&parent))).unwrap();
        parent.set_flag(&builtin::GREETING, Some(FlagValue::String("parent".into())));
        child.set_flag(&builtin::GREETING, Some(FlagValue::String("child".into())));

        let set = ApplicableRegionSet::new(vec![child, parent], None);
        assert_eq!(
            set.query_value(&builtin::GREETING, None),
            Some(FlagValue::String("child".into()))
        );
        assert_eq!(set.query_all_values(&builtin::GREETING, None).len(), 1);
    }

    #[test]
    fn test_parent_deny_beats_child_allow_at_same_priority() {
        let parent = region("parent", (0, 0, 0), (10, 10, 10), 0);
        let child = region("child", (0, 0, 0), (5, 5, 5), 0);
        child.set_parent(Some(Arc::clone(&parent))).unwrap();
        parent.set_flag(&builtin::PVP, deny());
        child.set_flag(&builtin::PVP, allow());

        let set = ApplicableRegionSet::new(vec![child], None);
        assert_eq!(set.query_value(&builtin::PVP, None), deny());
        assert_eq!(set.query_all_values(&builtin::PVP, None).len(), 2);
    }

    #[test]
    fn test_build_state_follows_membership() {
        let region = region("members_only", (0, 0, 0), (10, 10, 10), 0);
        region.with_members_mut(|m| m.add_group("member"));
        let set = ApplicableRegionSet::new(vec![region], None);

        let stranger = stranger();
        let member = member();

        assert_eq!(set.query_value(&builtin::BUILD, Some(&stranger)), None);
        assert_eq!(set.test_state(Some(&stranger), &[&builtin::BUILD]), set.can_build(&stranger));
        assert!(!set.test_state(Some(&stranger), &[&builtin::BUILD]));

        assert_eq!(set.query_value(&builtin::BUILD, Some(&member)), allow());
        assert_eq!(set.test_state(Some(&member), &[&builtin::BUILD]), set.can_build(&member));
    }

    #[test]
    fn test_build_state_with_owned_global() {
        let global = Arc::new(Region::global());
        global.with_owners_mut(|o| o.add_group("member"));
        let set = ApplicableRegionSet::new(Vec::new(), Some(global));

        assert!(!set.test_state(Some(&stranger()), &[&builtin::BUILD]));
        assert!(set.test_state(Some(&member()), &[&builtin::BUILD]));
        assert!(ApplicableRegionSet::empty().test_state(Some(&stranger()), &[&builtin::BUILD]));
    }

    #[test]
    fn test_top_tier_shadows_membership() {
        let low = region("low", (0, 0, 0), (10, 10, 10), 0);
        low.with_members_mut(|m| m.add_group("member"));
        let high = region("high", (0, 0, 0), (10, 10, 10), 5);

        let set = ApplicableRegionSet::new(vec![low, high], None);
        assert!(!set.can_build(&member()));
    }

    #[test]
    fn test_passthrough_region_ignored() {
        let low = region("low", (0, 0, 0), (10, 10, 10), 0);
        low.with_members_mut(|m| m.add_group("member"));
        let high = region("high", (0, 0, 0), (10, 10, 10), 5);
        high.set_flag(&builtin::PASSTHROUGH, allow());

        let set = ApplicableRegionSet::new(vec![low, high], None);
        assert!(set.can_build(&member()));
        assert!(!set.can_build(&stranger()));
    }

    #[test]
    fn test_explicit_build_flag() {
        let open = region("open", (0, 0, 0), (10, 10, 10), 0);
        open.set_flag(&builtin::BUILD, allow());
        let set = ApplicableRegionSet::new(vec![open], None);
        assert!(set.can_build(&stranger()));

        let locked = region("locked", (0, 0, 0), (10, 10, 10), 0);
        locked.with_members_mut(|m| m.add_group("member"));
        locked.set_flag(&builtin::BUILD, deny());
        let set = ApplicableRegionSet::new(vec![locked], None);
        assert!(!set.can_build(&member()));
    }

    #[test]
    fn test_empty_set_uses_global() {
        assert!(ApplicableRegionSet::empty().can_build(&stranger()));

        let global = Arc::new(Region::global());
        let set = ApplicableRegionSet::new(Vec::new(), Some(Arc::clone(&global)));
        assert!(set.can_build(&stranger()));

        global.with_owners_mut(|o| o.add_group("member"));
        assert!(set.can_build(&member()));
        assert!(!set.can_build(&stranger()));

        global.set_flag(&builtin::BUILD, allow());
        assert!(set.can_build(&stranger()));
    }

    #[test]
    fn test_query_state_combines() {
        let region = region("r", (0, 0, 0), (1, 1, 1), 0);
        region.set_flag(&builtin::PVP, deny());
        let set = ApplicableRegionSet::new(vec![region], None);

        assert_eq!(
            set.query_state(None, &[&builtin::MOB_DAMAGE, &builtin::PVP]),
            Some(State::Deny)
        );
        assert!(set.test_state(None, &[&builtin::MOB_DAMAGE]));
        assert!(!set.test_state(None, &[&builtin::TNT]));
    }

    #[test]
    fn test_owner_and_member_of_all() {
        let alice = member();
        let a = region("a", (0, 0, 0), (1, 1, 1), 0);
        let b = region("b", (0, 0, 0), (1, 1, 1), 0);
        a.with_owners_mut(|o| o.add_actor(&alice));
        b.with_members_mut(|m| m.add_actor(&alice));

        let set = ApplicableRegionSet::new(vec![a, b], None);
        assert!(set.is_member_of_all(&alice));
        assert!(!set.is_owner_of_all(&alice));
    }

    #[test]
    fn test_unknown_kind_flag_value() {
        let flag = Flag::builder("custom", FlagKind::Integer).build().unwrap();
        let a = region("a", (0, 0, 0), (1, 1, 1), 0);
        let b = region("b", (0, 0, 0), (1, 1, 1), 0);
        a.set_flag(&flag, Some(FlagValue::Integer(1)));
        b.set_flag(&flag, Some(FlagValue::Integer(2)));

        let set = ApplicableRegionSet::new(vec![b, a], None);
        assert_eq!(set.query_value(&flag, None), Some(FlagValue::Integer(1)));
        assert_eq!(set.query_all_values(&flag, None).len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn test_priority_dominance_holds(
            high_priority in 1i32..100,
            gap in 1i32..100,
            high_denies: bool,
            low_denies: bool,
            reversed: bool,
        ) {
            let high = region("high", (0, 0, 0), (4, 4, 4), high_priority);
            let low = region("low", (0, 0, 0), (4, 4, 4), high_priority - gap);
            high.set_flag(&builtin::PVP, if high_denies { deny() } else { allow() });
            low.set_flag(&builtin::PVP, if low_denies { deny() } else { allow() });

            let found = if reversed { vec![low, Arc::clone(&high)] } else { vec![Arc::clone(&high), low] };
            let set = ApplicableRegionSet::new(found, None);

            proptest::prop_assert_eq!(set.query_value(&builtin::PVP, None), high.flag(&builtin::PVP));
        }
    }
}
