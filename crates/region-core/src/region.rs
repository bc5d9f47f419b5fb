//! The protected region entity.
//!
//! # Sharing
//!
//! Regions are handed around as `Arc<Region>`. The ID, namespace, shape and
//! transient marker are fixed at construction; priority, flags, owners,
//! members and the parent link sit behind a lock and are edited in place.
//! Whoever holds an `Arc` sees those edits live, including the index that
//! the region was inserted into. Clone the definition with
//! [`Region::copy_from`] for snapshot semantics.
//!
//! # Dirty tracking
//!
//! Setters mark the region dirty, and so do edits to its owner or member
//! domains. The index collects dirty regions when computing a save
//! difference. Transient regions never report dirty.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use region_flags::{Association, Flag, FlagValue};
use region_spatial::{BlockPos, ColumnPos, Shape, ShapeKind};

use crate::{Actor, Domain, RegionError};

/// ID of the world-default region.
pub const GLOBAL_REGION: &str = "__global__";

/// Held across the cycle check and the write of every parent assignment.
static PARENT_LINKS: Mutex<()> = Mutex::new(());

/// Check a region ID against `[A-Za-z0-9_,'\-+/]+`.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ',' | '\'' | '-' | '+' | '/'))
}

/// Lowercase form used as the index key.
#[must_use]
pub fn normalize_id(id: &str) -> String {
    id.to_lowercase()
}

#[derive(Clone, Default)]
struct RegionState {
    priority: i32,
    flags: HashMap<Flag, FlagValue>,
    owners: Domain,
    members: Domain,
    parent: Option<Arc<Region>>,
}

/// A named, shaped, prioritized unit of space.
pub struct Region {
    id: String,
    namespace: Option<String>,
    shape: Shape,
    transient: bool,
    state: RwLock<RegionState>,
    dirty: AtomicBool,
}

impl Region {
    /// Create a region. The ID is validated and lowercased.
    pub fn new(id: &str, shape: Shape) -> Result<Self, RegionError> {
        if !is_valid_id(id) {
            return Err(RegionError::InvalidId(id.to_owned()));
        }

        Ok(Self {
            id: normalize_id(id),
            namespace: None,
            shape,
            transient: false,
            state: RwLock::new(RegionState::default()),
            dirty: AtomicBool::new(true),
        })
    }

    /// Cuboid region between two corners.
    pub fn cuboid(id: &str, a: BlockPos, b: BlockPos) -> Result<Self, RegionError> {
        Self::new(id, Shape::cuboid(a, b))
    }

    /// Polygonal region.
    pub fn polygon(
        id: &str,
        points: Vec<ColumnPos>,
        min_y: i32,
        max_y: i32,
    ) -> Result<Self, RegionError> {
        Self::new(id, Shape::polygon(points, min_y, max_y)?)
    }

    /// The world-default region.
    #[must_use]
    pub fn global() -> Self {
        Self {
            id: GLOBAL_REGION.to_owned(),
            namespace: None,
            shape: Shape::Global,
            transient: false,
            state: RwLock::new(RegionState::default()),
            dirty: AtomicBool::new(true),
        }
    }

    /// Attach a namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Mark the region as transient: never dirty and never saved.
    #[must_use]
    pub fn into_transient(mut self) -> Self {
        self.transient = true;
        self
    }

    // ==================== Immutable attributes ====================

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub const fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.transient
    }

    #[must_use]
    pub const fn is_physical(&self) -> bool {
        self.shape.is_physical()
    }

    /// Whether this is the world-default region.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.id == GLOBAL_REGION
    }

    #[must_use]
    pub fn contains(&self, pos: BlockPos) -> bool {
        self.shape.contains(pos)
    }

    /// Whether the bodies of the two regions overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.shape.intersects(&other.shape)
    }

    #[must_use]
    pub fn volume(&self) -> u64 {
        self.shape.volume()
    }

    // ==================== Dirty tracking ====================

    /// Whether the region changed since the bit was last cleared.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        if self.transient {
            return false;
        }
        if self.dirty.load(Ordering::Acquire) {
            return true;
        }
        let state = self.state.read();
        state.owners.is_dirty() || state.members.is_dirty()
    }

    /// Set or clear the dirty bit of the region and both domains.
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
        let mut state = self.state.write();
        state.owners.set_dirty(dirty);
        state.members.set_dirty(dirty);
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    // ==================== Priority ====================

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.state.read().priority
    }

    pub fn set_priority(&self, priority: i32) {
        self.state.write().priority = priority;
        self.mark_dirty();
    }

    // ==================== Parent ====================

    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.state.read().parent.clone()
    }

    /// Set or clear the parent.
    ///
    /// Rejected without any change if the candidate is this region or has
    /// this region somewhere in its own parent chain.
    pub fn set_parent(&self, parent: Option<Arc<Self>>) -> Result<(), RegionError> {
        let _links = PARENT_LINKS.lock();

        if let Some(candidate) = &parent {
            let mut current = Some(Arc::clone(candidate));
            while let Some(node) = current {
                if node.id == self.id {
                    return Err(RegionError::CircularInheritance {
                        region: self.id.clone(),
                        parent: candidate.id.clone(),
                    });
                }
                current = node.parent();
            }
        }

        self.state.write().parent = parent;
        self.mark_dirty();
        Ok(())
    }

    /// Drop the parent link.
    pub fn clear_parent(&self) {
        self.state.write().parent = None;
        self.mark_dirty();
    }

    /// This region's parent, grandparent, and so on.
    ///
    /// Stops at the first region already visited.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Arc<Self>> {
        let mut out: Vec<Arc<Self>> = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            if out.iter().any(|ancestor| ancestor.id == node.id) || node.id == self.id {
                break;
            }
            current = node.parent();
            out.push(node);
        }
        out
    }

    // ==================== Flags ====================

    /// Explicit value set on this region. Parents are not consulted.
    #[must_use]
    pub fn flag(&self, flag: &Flag) -> Option<FlagValue> {
        self.state.read().flags.get(flag).cloned()
    }

    /// Set a flag, or remove it with `None`.
    pub fn set_flag(&self, flag: &Flag, value: Option<FlagValue>) {
        {
            let mut state = self.state.write();
            match value {
                Some(value) => {
                    state.flags.insert(flag.clone(), value);
                }
                None => {
                    state.flags.remove(flag);
                }
            }
        }
        self.mark_dirty();
    }

    /// Copy of every explicit flag value.
    #[must_use]
    pub fn flags(&self) -> HashMap<Flag, FlagValue> {
        self.state.read().flags.clone()
    }

    /// Replace all flag values.
    pub fn set_flags(&self, flags: HashMap<Flag, FlagValue>) {
        self.state.write().flags = flags;
        self.mark_dirty();
    }

    // ==================== Owners and members ====================

    /// Copy of the owner domain.
    #[must_use]
    pub fn owners(&self) -> Domain {
        self.state.read().owners.clone()
    }

    pub fn set_owners(&self, owners: Domain) {
        self.state.write().owners = owners;
        self.mark_dirty();
    }

    /// Edit the owner domain in place.
    pub fn with_owners_mut<R>(&self, f: impl FnOnce(&mut Domain) -> R) -> R {
        f(&mut self.state.write().owners)
    }

    /// Copy of the member domain.
    #[must_use]
    pub fn members(&self) -> Domain {
        self.state.read().members.clone()
    }

    pub fn set_members(&self, members: Domain) {
        self.state.write().members = members;
        self.mark_dirty();
    }

    /// Edit the member domain in place.
    pub fn with_members_mut<R>(&self, f: impl FnOnce(&mut Domain) -> R) -> R {
        f(&mut self.state.write().members)
    }

    #[must_use]
    pub fn has_members_or_owners(&self) -> bool {
        let state = self.state.read();
        !state.owners.is_empty() || !state.members.is_empty()
    }

    /// Owner of this region or of any ancestor.
    #[must_use]
    pub fn is_owner(&self, actor: &dyn Actor) -> bool {
        if self.state.read().owners.contains(actor) {
            return true;
        }
        self.ancestors()
            .iter()
            .any(|ancestor| ancestor.state.read().owners.contains(actor))
    }

    /// Owner or member of this region or of any ancestor.
    #[must_use]
    pub fn is_member(&self, actor: &dyn Actor) -> bool {
        self.is_owner(actor) || self.is_member_only(actor)
    }

    /// Member of this region or of any ancestor, ignoring ownership.
    #[must_use]
    pub fn is_member_only(&self, actor: &dyn Actor) -> bool {
        if self.state.read().members.contains(actor) {
            return true;
        }
        self.ancestors()
            .iter()
            .any(|ancestor| ancestor.state.read().members.contains(actor))
    }

    /// How `actor` relates to this region. `None` counts as a non-member.
    #[must_use]
    pub fn association(&self, actor: Option<&dyn Actor>) -> Association {
        match actor {
            Some(actor) if self.is_owner(actor) => Association::Owner,
            Some(actor) if self.is_member_only(actor) => Association::Member,
            _ => Association::NonMember,
        }
    }

    // ==================== Copying ====================

    /// Copy priority, flags, owners, members, and parent from `other`.
    pub fn copy_from(&self, other: &Self) -> Result<(), RegionError> {
        let snapshot = other.state.read().clone();
        self.set_parent(snapshot.parent)?;

        let mut state = self.state.write();
        state.priority = snapshot.priority;
        state.flags = snapshot.flags;
        state.owners = snapshot.owners;
        state.members = snapshot.members;
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    /// Compare everything a store persists: ID, namespace, shape, priority,
    /// flags, owners, members, and the parent's ID.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        if self.id != other.id || self.namespace != other.namespace || self.shape != other.shape {
            return false;
        }
        let ours = self.state.read().clone();
        let theirs = other.state.read().clone();

        ours.priority == theirs.priority
            && ours.flags == theirs.flags
            && ours.owners == theirs.owners
            && ours.members == theirs.members
            && ours.parent.as_ref().map(|p| p.id.as_str())
                == theirs.parent.as_ref().map(|p| p.id.as_str())
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("kind", &self.shape.kind())
            .field("priority", &state.priority)
            .field("parent", &state.parent.as_ref().map(|p| p.id.clone()))
            .field("flags", &state.flags.len())
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
