//! Identities that regions are checked against.

use std::fmt;

use uuid::Uuid;

/// Something that can own, join, or act inside a region.
///
/// Group membership is answered by the host's permission system; this crate
/// only asks.
pub trait Actor {
    /// Stable unique ID.
    fn unique_id(&self) -> Uuid;

    /// Current display name.
    fn name(&self) -> &str;

    /// Whether the actor currently holds `group`.
    fn has_group(&self, group: &str) -> bool;
}

/// A plain actor with a fixed group list.
#[derive(Clone, PartialEq, Eq)]
pub struct Player {
    unique_id: Uuid,
    name: String,
    groups: Vec<String>,
}

impl Player {
    /// Create a player without groups.
    #[must_use]
    pub fn new(unique_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            unique_id,
            name: name.into(),
            groups: Vec::new(),
        }
    }

    /// Give the player a set of groups. Group names compare case-insensitively.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups
            .into_iter()
            .map(|g| g.into().to_lowercase())
            .collect();
        self
    }
}

impl Actor for Player {
    fn unique_id(&self) -> Uuid {
        self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("name", &self.name)
            .field("unique_id", &self.unique_id)
            .field("groups", &self.groups)
            .finish()
    }
}
