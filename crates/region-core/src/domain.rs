//! Owner and member domains.
//!
//! A [`Domain`] answers "does this actor belong here" from three lists:
//! unique IDs, legacy player names, and group names. Names and groups are
//! stored trimmed and lowercase. A name entry only ever matches an actor's
//! name and a group entry only ever matches a held group; a bare name never
//! satisfies a group entry.
//!
//! Every edit sets a dirty bit that the owning region reports through
//! [`crate::Region::is_dirty`].

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::Actor;

fn normalize(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

/// Players by unique ID and by legacy name.
#[derive(Clone, Debug, Default)]
pub struct PlayerDomain {
    unique_ids: BTreeSet<Uuid>,
    names: BTreeSet<String>,
    dirty: bool,
}

impl PlayerDomain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a legacy name. Blank names are ignored.
    pub fn add_name(&mut self, name: &str) {
        if let Some(name) = normalize(name) {
            self.names.insert(name);
            self.dirty = true;
        }
    }

    pub fn add_unique_id(&mut self, unique_id: Uuid) {
        self.unique_ids.insert(unique_id);
        self.dirty = true;
    }

    /// Add an actor by unique ID.
    pub fn add_actor(&mut self, actor: &dyn Actor) {
        self.add_unique_id(actor.unique_id());
    }

    pub fn remove_name(&mut self, name: &str) {
        if let Some(name) = normalize(name) {
            self.names.remove(&name);
            self.dirty = true;
        }
    }

    pub fn remove_unique_id(&mut self, unique_id: &Uuid) {
        self.unique_ids.remove(unique_id);
        self.dirty = true;
    }

    /// Remove an actor's name and unique ID.
    pub fn remove_actor(&mut self, actor: &dyn Actor) {
        self.remove_name(actor.name());
        self.remove_unique_id(&actor.unique_id());
    }

    #[must_use]
    pub fn contains_actor(&self, actor: &dyn Actor) -> bool {
        self.contains_unique_id(&actor.unique_id()) || self.contains_name(actor.name())
    }

    #[must_use]
    pub fn contains_unique_id(&self, unique_id: &Uuid) -> bool {
        self.unique_ids.contains(unique_id)
    }

    /// Case-insensitive name check.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        normalize(name).is_some_and(|name| self.names.contains(&name))
    }

    #[must_use]
    pub const fn unique_ids(&self) -> &BTreeSet<Uuid> {
        &self.unique_ids
    }

    #[must_use]
    pub const fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.unique_ids.len() + self.names.len()
    }

    pub fn clear(&mut self) {
        self.unique_ids.clear();
        self.names.clear();
        self.dirty = true;
    }
}

impl PartialEq for PlayerDomain {
    fn eq(&self, other: &Self) -> bool {
        self.unique_ids == other.unique_ids && self.names == other.names
    }
}

impl Eq for PlayerDomain {}

/// Group names, checked against the actor's held groups.
#[derive(Clone, Debug, Default)]
pub struct GroupDomain {
    groups: BTreeSet<String>,
    dirty: bool,
}

impl GroupDomain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: &str) {
        if let Some(group) = normalize(group) {
            self.groups.insert(group);
            self.dirty = true;
        }
    }

    pub fn remove_group(&mut self, group: &str) {
        if let Some(group) = normalize(group) {
            self.groups.remove(&group);
            self.dirty = true;
        }
    }

    #[must_use]
    pub fn contains_group(&self, group: &str) -> bool {
        normalize(group).is_some_and(|group| self.groups.contains(&group))
    }

    #[must_use]
    pub fn contains_actor(&self, actor: &dyn Actor) -> bool {
        self.groups.iter().any(|group| actor.has_group(group))
    }

    #[must_use]
    pub const fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.groups.len()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.dirty = true;
    }
}

impl PartialEq for GroupDomain {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
    }
}

impl Eq for GroupDomain {}

/// Owners or members of a region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Domain {
    players: PlayerDomain,
    groups: GroupDomain,
}

impl Domain {
    /// Create a new empty domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn players(&self) -> &PlayerDomain {
        &self.players
    }

    /// Replace the player half. Marks the domain dirty.
    pub fn set_players(&mut self, players: PlayerDomain) {
        self.players = players;
        self.players.dirty = true;
    }

    #[must_use]
    pub const fn groups(&self) -> &GroupDomain {
        &self.groups
    }

    /// Replace the group half. Marks the domain dirty.
    pub fn set_groups(&mut self, groups: GroupDomain) {
        self.groups = groups;
        self.groups.dirty = true;
    }

    pub fn add_name(&mut self, name: &str) {
        self.players.add_name(name);
    }

    pub fn remove_name(&mut self, name: &str) {
        self.players.remove_name(name);
    }

    pub fn add_unique_id(&mut self, unique_id: Uuid) {
        self.players.add_unique_id(unique_id);
    }

    pub fn remove_unique_id(&mut self, unique_id: &Uuid) {
        self.players.remove_unique_id(unique_id);
    }

    pub fn add_actor(&mut self, actor: &dyn Actor) {
        self.players.add_actor(actor);
    }

    pub fn remove_actor(&mut self, actor: &dyn Actor) {
        self.players.remove_actor(actor);
    }

    pub fn add_group(&mut self, group: &str) {
        self.groups.add_group(group);
    }

    pub fn remove_group(&mut self, group: &str) {
        self.groups.remove_group(group);
    }

    /// Add every entry of `other`.
    pub fn add_all(&mut self, other: &Self) {
        for name in other.players.names() {
            self.players.add_name(name);
        }
        for unique_id in other.players.unique_ids() {
            self.players.add_unique_id(*unique_id);
        }
        for group in other.groups.groups() {
            self.groups.add_group(group);
        }
    }

    /// Remove every entry of `other`.
    pub fn remove_all(&mut self, other: &Self) {
        for name in other.players.names() {
            self.players.remove_name(name);
        }
        for unique_id in other.players.unique_ids() {
            self.players.remove_unique_id(unique_id);
        }
        for group in other.groups.groups() {
            self.groups.remove_group(group);
        }
    }

    /// Whether the actor matches by ID, by name, or by a held group.
    #[must_use]
    pub fn contains(&self, actor: &dyn Actor) -> bool {
        self.players.contains_actor(actor) || self.groups.contains_actor(actor)
    }

    #[must_use]
    pub fn contains_unique_id(&self, unique_id: &Uuid) -> bool {
        self.players.contains_unique_id(unique_id)
    }

    /// Name-only check. Groups are never consulted.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.players.contains_name(name)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.players.size() + self.groups.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.groups.clear();
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.players.dirty || self.groups.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.players.dirty = dirty;
        self.groups.dirty = dirty;
    }

    /// Player entries rendered as `name:<name>` and `uuid:<uuid>`, sorted
    /// case-insensitively.
    #[must_use]
    pub fn to_players_string(&self) -> String {
        let mut out: Vec<String> = self
            .players
            .names()
            .iter()
            .map(|name| format!("name:{name}"))
            .chain(
                self.players
                    .unique_ids()
                    .iter()
                    .map(|id| format!("uuid:{id}")),
            )
            .collect();
        out.sort_by_key(|s| s.to_lowercase());
        out.join(", ")
    }

    /// Group entries rendered as `g:<group>`.
    #[must_use]
    pub fn to_groups_string(&self) -> String {
        self.groups
            .groups()
            .iter()
            .map(|group| format!("g:{group}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Players then groups, separated by `; `.
    #[must_use]
    pub fn to_user_friendly_string(&self) -> String {
        let mut out = String::new();
        if self.players.size() > 0 {
            out.push_str(&self.to_players_string());
        }
        if self.groups.size() > 0 {
            if !out.is_empty() {
                out.push_str("; ");
            }
            out.push_str(&self.to_groups_string());
        }
        out
    }
}
