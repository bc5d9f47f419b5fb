//! Flag values and the small enums they are built from.

use std::fmt;

use serde_json::Value;

/// Allow/deny value of a state flag. An unset flag is `None` at the call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Allow,
    Deny,
}

impl State {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    /// Parse a state name, case-insensitively.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("allow") {
            Some(Self::Allow)
        } else if input.eq_ignore_ascii_case("deny") {
            Some(Self::Deny)
        } else {
            None
        }
    }

    /// Combine two optional states. `Deny` beats `Allow`, which beats unset.
    #[must_use]
    pub const fn deny_wins(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(Self::Deny), _) | (_, Some(Self::Deny)) => Some(Self::Deny),
            (Some(Self::Allow), _) | (_, Some(Self::Allow)) => Some(Self::Allow),
            (None, None) => None,
        }
    }

    /// Fold any number of optional states with [`State::deny_wins`].
    pub fn combine(states: impl IntoIterator<Item = Option<Self>>) -> Option<Self> {
        let mut out = None;
        for state in states {
            out = Self::deny_wins(out, state);
            if out == Some(Self::Deny) {
                break;
            }
        }
        out
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an actor relates to a particular region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Association {
    Owner,
    Member,
    NonMember,
}

/// The membership tier a flag value applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionGroup {
    All,
    Members,
    Owners,
    NonMembers,
    NonOwners,
    None,
}

impl RegionGroup {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Members => "members",
            Self::Owners => "owners",
            Self::NonMembers => "nonmembers",
            Self::NonOwners => "nonowners",
            Self::None => "none",
        }
    }

    /// Parse a group name and its accepted aliases.
    ///
    /// Underscores are ignored, so `NON_MEMBERS` reads the same as `nonmembers`.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "members" | "member" => Some(Self::Members),
            "owners" | "owner" => Some(Self::Owners),
            "nonowners" | "nonowner" => Some(Self::NonOwners),
            "nonmembers" | "nonmember" => Some(Self::NonMembers),
            "everyone" | "anyone" | "all" => Some(Self::All),
            "none" | "noone" | "deny" => Some(Self::None),
            _ => None,
        }
    }

    /// Whether an actor with the given association falls into this group.
    #[must_use]
    pub const fn contains(self, association: Association) -> bool {
        match self {
            Self::All => true,
            Self::Members => matches!(association, Association::Owner | Association::Member),
            Self::Owners => matches!(association, Association::Owner),
            Self::NonMembers => matches!(association, Association::NonMember),
            Self::NonOwners => !matches!(association, Association::Owner),
            Self::None => false,
        }
    }
}

impl fmt::Display for RegionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed flag value.
#[derive(Clone, Debug, PartialEq)]
pub enum FlagValue {
    State(State),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    RegionGroup(RegionGroup),
    Set(Vec<FlagValue>),
    /// Opaque value of a flag this process does not know about.
    Raw(Value),
}

impl FlagValue {
    /// Serialize to the raw persisted form.
    #[must_use]
    pub fn marshal(&self) -> Value {
        match self {
            Self::State(state) => Value::String(state.as_str().to_owned()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Double(d) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::RegionGroup(group) => Value::String(group.as_str().to_owned()),
            Self::Set(values) => Value::Array(values.iter().map(Self::marshal).collect()),
            Self::Raw(raw) => raw.clone(),
        }
    }

    #[must_use]
    pub const fn as_state(&self) -> Option<State> {
        match self {
            Self::State(state) => Some(*state),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_region_group(&self) -> Option<RegionGroup> {
        match self {
            Self::RegionGroup(group) => Some(*group),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(state) => write!(f, "{state}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::RegionGroup(group) => write!(f, "{group}"),
            Self::Set(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Self::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_wins() {
        assert_eq!(State::deny_wins(Some(State::Allow), Some(State::Deny)), Some(State::Deny));
        assert_eq!(State::deny_wins(None, Some(State::Allow)), Some(State::Allow));
        assert_eq!(State::deny_wins(None, None), None);

        let combined = State::combine([None, Some(State::Allow), Some(State::Deny), Some(State::Allow)]);
        assert_eq!(combined, Some(State::Deny));
    }

    #[test]
    fn test_region_group_aliases() {
        assert_eq!(RegionGroup::parse("Member"), Some(RegionGroup::Members));
        assert_eq!(RegionGroup::parse("NON_MEMBERS"), Some(RegionGroup::NonMembers));
        assert_eq!(RegionGroup::parse(" anyone "), Some(RegionGroup::All));
        assert_eq!(RegionGroup::parse("noone"), Some(RegionGroup::None));
        assert_eq!(RegionGroup::parse("guests"), None);
    }

    #[test]
    fn test_region_group_membership() {
        use Association::{Member, NonMember, Owner};

        assert!(RegionGroup::Members.contains(Owner));
        assert!(RegionGroup::Members.contains(Member));
        assert!(!RegionGroup::Members.contains(NonMember));

        assert!(RegionGroup::NonOwners.contains(Member));
        assert!(!RegionGroup::NonOwners.contains(Owner));

        assert!(RegionGroup::NonMembers.contains(NonMember));
        assert!(!RegionGroup::NonMembers.contains(Member));

        assert!(!RegionGroup::None.contains(Owner));
        assert!(RegionGroup::All.contains(NonMember));
    }

    #[test]
    fn test_marshal_shapes() {
        assert_eq!(FlagValue::State(State::Deny).marshal(), Value::from("deny"));
        assert_eq!(FlagValue::Integer(5).marshal(), Value::from(5));
        assert_eq!(FlagValue::Double(f64::NAN).marshal(), Value::Null);
        assert_eq!(
            FlagValue::Set(vec![FlagValue::String("a".into()), FlagValue::String("b".into())]).marshal(),
            serde_json::json!(["a", "b"])
        );
    }
}
