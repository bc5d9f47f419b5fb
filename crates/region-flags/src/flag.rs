//! Flag definitions.
//!
//! A [`Flag`] is a cheap, cloneable handle to an immutable definition: its
//! name, its [`FlagKind`], an optional default value, and (for every flag
//! that is not itself a group flag) a paired `<name>-group` flag restricting
//! which membership tier the value applies to.
//!
//! Flags compare and hash by lowercase name, so two handles created from
//! the same definition, or a handle fetched back from the registry, are
//! interchangeable as map keys.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use serde_json::Value;

use crate::{FlagError, FlagResult, FlagValue, RegionGroup, State};

/// Suffix of the paired region-group flag name.
pub const GROUP_SUFFIX: &str = "-group";

/// Longest accepted flag name.
pub const MAX_NAME_LEN: usize = 40;

/// Check a flag name against `[:A-Za-z0-9-]{1,40}`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '-')
}

/// The value type a flag carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagKind {
    State,
    Boolean,
    Integer,
    Double,
    String,
    RegionGroup,
    Set(Box<FlagKind>),
    /// Placeholder for flags found in stored data but never registered.
    Unknown,
}

impl FlagKind {
    /// Convert a persisted raw value into a typed value.
    ///
    /// Returns `None` when the raw value does not fit this kind.
    #[must_use]
    pub fn unmarshal(&self, raw: &Value) -> Option<FlagValue> {
        match self {
            Self::State => raw.as_str().and_then(State::parse).map(FlagValue::State),
            Self::Boolean => match raw {
                Value::Bool(b) => Some(FlagValue::Boolean(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(FlagValue::Boolean(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(FlagValue::Boolean(false)),
                _ => None,
            },
            Self::Integer => raw
                .as_i64()
                .or_else(|| raw.as_f64().map(|f| f as i64))
                .map(FlagValue::Integer),
            Self::Double => raw.as_f64().map(FlagValue::Double),
            Self::String => raw.as_str().map(|s| FlagValue::String(s.to_owned())),
            Self::RegionGroup => raw
                .as_str()
                .and_then(RegionGroup::parse)
                .map(FlagValue::RegionGroup),
            Self::Set(element) => {
                let items = raw.as_array()?;
                let mut out: Vec<FlagValue> = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = element.unmarshal(item) {
                        if !out.contains(&value) {
                            out.push(value);
                        }
                    }
                }
                Some(FlagValue::Set(out))
            }
            Self::Unknown => Some(FlagValue::Raw(raw.clone())),
        }
    }

    /// Parse user input. `flag` is only used in error messages.
    pub fn parse_input(&self, flag: &str, input: &str) -> FlagResult<FlagValue> {
        let input = input.trim();
        let invalid = |reason: &str| FlagError::InvalidFormat {
            flag: flag.to_owned(),
            reason: reason.to_owned(),
        };

        match self {
            Self::State => State::parse(input)
                .map(FlagValue::State)
                .ok_or_else(|| invalid("expected allow or deny")),
            Self::Boolean => match input.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "allow" => Ok(FlagValue::Boolean(true)),
                "false" | "no" | "off" | "deny" => Ok(FlagValue::Boolean(false)),
                _ => Err(invalid("expected true or false")),
            },
            Self::Integer => input
                .parse::<i64>()
                .map(FlagValue::Integer)
                .map_err(|_| invalid("not a whole number")),
            Self::Double => match input.parse::<f64>() {
                Ok(d) if d.is_finite() => Ok(FlagValue::Double(d)),
                _ => Err(invalid("not a number")),
            },
            Self::String => Ok(FlagValue::String(input.replace("\\n", "\n"))),
            Self::RegionGroup => RegionGroup::parse(input)
                .map(FlagValue::RegionGroup)
                .ok_or_else(|| invalid("unknown group")),
            Self::Set(element) => {
                let mut out: Vec<FlagValue> = Vec::new();
                for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let value = element.parse_input(flag, part)?;
                    if !out.contains(&value) {
                        out.push(value);
                    }
                }
                Ok(FlagValue::Set(out))
            }
            Self::Unknown => Err(invalid("flag is not registered")),
        }
    }
}

struct FlagInner {
    name: String,
    key: String,
    kind: FlagKind,
    default: Option<FlagValue>,
    group: Option<Flag>,
    membership_default: bool,
}

/// Shared handle to a flag definition.
#[derive(Clone)]
pub struct Flag(Arc<FlagInner>);

impl Flag {
    /// Start building a flag definition.
    #[must_use]
    pub fn builder(name: impl Into<String>, kind: FlagKind) -> FlagBuilder {
        FlagBuilder {
            name: name.into(),
            kind,
            default: None,
            group: Some(RegionGroup::All),
            membership_default: false,
        }
    }

    /// A state flag whose default is `allow` when `default_allow` is set and
    /// unset otherwise.
    pub fn state(name: impl Into<String>, default_allow: bool) -> FlagResult<Self> {
        let builder = Self::builder(name, FlagKind::State);
        if default_allow {
            builder.default(FlagValue::State(State::Allow)).build()
        } else {
            builder.build()
        }
    }

    /// Placeholder for an unregistered name found in stored data.
    ///
    /// Unknown flags carry no group flag.
    pub fn unknown(name: impl Into<String>) -> FlagResult<Self> {
        Self::builder(name, FlagKind::Unknown).without_group().build()
    }

    /// Name as declared.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Lowercase registry key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.0.key
    }

    #[must_use]
    pub fn kind(&self) -> &FlagKind {
        &self.0.kind
    }

    /// Value used when no region supplies one.
    #[must_use]
    pub fn default_value(&self) -> Option<&FlagValue> {
        self.0.default.as_ref()
    }

    /// The paired `<name>-group` flag, if this flag has one.
    #[must_use]
    pub fn region_group_flag(&self) -> Option<&Self> {
        self.0.group.as_ref()
    }

    /// Default group of the paired group flag.
    #[must_use]
    pub fn default_group(&self) -> Option<RegionGroup> {
        self.region_group_flag()
            .and_then(Self::default_value)
            .and_then(FlagValue::as_region_group)
    }

    /// Whether owner/member status satisfies this flag when no region
    /// sets it explicitly. Only `build` behaves this way.
    #[must_use]
    pub fn uses_membership_as_default(&self) -> bool {
        self.0.membership_default
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0.kind == FlagKind::Unknown
    }

    /// Convert a persisted raw value for this flag.
    #[must_use]
    pub fn unmarshal(&self, raw: &Value) -> Option<FlagValue> {
        self.0.kind.unmarshal(raw)
    }

    /// Parse user input for this flag.
    pub fn parse_input(&self, input: &str) -> FlagResult<FlagValue> {
        self.0.kind.parse_input(&self.0.name, input)
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.key == other.0.key
    }
}

impl Eq for Flag {}

impl Hash for Flag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flag")
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .field("default", &self.0.default)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Builder returned by [`Flag::builder`].
#[derive(Debug)]
pub struct FlagBuilder {
    name: String,
    kind: FlagKind,
    default: Option<FlagValue>,
    group: Option<RegionGroup>,
    membership_default: bool,
}

impl FlagBuilder {
    /// Value used when no region sets the flag.
    #[must_use]
    pub fn default(mut self, value: FlagValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Default membership tier of the paired group flag.
    #[must_use]
    pub fn default_group(mut self, group: RegionGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Do not create a paired group flag.
    #[must_use]
    pub fn without_group(mut self) -> Self {
        self.group = None;
        self
    }

    /// Let owner/member status stand in for an unset value.
    #[must_use]
    pub fn membership_default(mut self) -> Self {
        self.membership_default = true;
        self
    }

    /// Validate the name and build the flag.
    pub fn build(self) -> FlagResult<Flag> {
        // Unknown flags keep whatever name was stored.
        if self.kind != FlagKind::Unknown && !is_valid_name(&self.name) {
            return Err(FlagError::InvalidName(self.name));
        }
        if self.name.trim().is_empty() {
            return Err(FlagError::InvalidName(self.name));
        }
        Ok(self.finish())
    }

    /// Build without validating the name.
    pub(crate) fn finish(self) -> Flag {
        let group = self.group.map(|group| {
            let name = format!("{}{GROUP_SUFFIX}", self.name);
            Flag(Arc::new(FlagInner {
                key: name.to_lowercase(),
                name,
                kind: FlagKind::RegionGroup,
                default: Some(FlagValue::RegionGroup(group)),
                group: None,
                membership_default: false,
            }))
        });

        Flag(Arc::new(FlagInner {
            key: self.name.to_lowercase(),
            name: self.name,
            kind: self.kind,
            default: self.default,
            group,
            membership_default: self.membership_default,
        }))
    }
}
