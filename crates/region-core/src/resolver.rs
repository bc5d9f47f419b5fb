//! Turning owner/member input into domain entries.
//!
//! Input tokens take one of these forms:
//!
//! | Token | Result |
//! |-------|--------|
//! | `g:<group>` | group entry |
//! | `name:<name>` | legacy name entry, never looked up |
//! | `<uuid>` or `uuid:<uuid>`, dashed or not | unique ID entry |
//! | plain name | per [`UserLocatorPolicy`] |
//!
//! Any other `<prefix>:` token is rejected.

use hashbrown::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::{Domain, ResolveError};

/// A known player identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub unique_id: Uuid,
    pub name: String,
}

impl Profile {
    #[must_use]
    pub fn new(unique_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            unique_id,
            name: name.into(),
        }
    }
}

/// Name to unique ID lookup, usually backed by a remote account service.
pub trait ProfileService: Send + Sync {
    /// Look up every name it can. Names without a profile are simply absent
    /// from the result; only a failing service is an error.
    fn find_all_by_name(&self, names: &[String]) -> Result<Vec<Profile>, ResolveError>;
}

/// A fixed in-memory profile table.
#[derive(Clone, Debug, Default)]
pub struct StaticProfileService {
    profiles: HashMap<String, Profile>,
}

impl StaticProfileService {
    #[must_use]
    pub fn new(profiles: impl IntoIterator<Item = Profile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.name.to_lowercase(), profile))
                .collect(),
        }
    }
}

impl ProfileService for StaticProfileService {
    fn find_all_by_name(&self, names: &[String]) -> Result<Vec<Profile>, ResolveError> {
        Ok(names
            .iter()
            .filter_map(|name| self.profiles.get(&name.to_lowercase()).cloned())
            .collect())
    }
}

/// How plain names in input are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserLocatorPolicy {
    /// Look the name up and store only the unique ID.
    #[default]
    UuidOnly,
    /// Store the name as given.
    NameOnly,
    /// Store the name and also its looked-up unique ID.
    UuidAndName,
}

/// Parse a UUID with or without dashes, optionally prefixed with `uuid:`.
#[must_use]
pub fn parse_unique_id(input: &str) -> Option<Uuid> {
    let input = input.strip_prefix("uuid:").unwrap_or(input);
    // `Uuid::parse_str` also takes braced and urn forms; only plain hex is accepted here.
    let hex_digits = input.chars().filter(char::is_ascii_hexdigit).count();
    let dashes = input.chars().filter(|c| *c == '-').count();
    if hex_digits != 32 || hex_digits + dashes != input.len() {
        return None;
    }
    Uuid::parse_str(input).ok()
}

/// Resolves owner/member input into a [`Domain`].
pub struct DomainInputResolver<'a> {
    service: &'a dyn ProfileService,
    policy: UserLocatorPolicy,
    discard_unresolved: bool,
}

impl<'a> DomainInputResolver<'a> {
    #[must_use]
    pub fn new(service: &'a dyn ProfileService) -> Self {
        Self {
            service,
            policy: UserLocatorPolicy::default(),
            discard_unresolved: false,
        }
    }

    #[must_use]
    pub const fn policy(mut self, policy: UserLocatorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drop names with no profile instead of failing.
    #[must_use]
    pub const fn discard_unresolved(mut self, discard: bool) -> Self {
        self.discard_unresolved = discard;
        self
    }

    /// Resolve every token into one domain.
    pub fn resolve<S: AsRef<str>>(&self, input: &[S]) -> Result<Domain, ResolveError> {
        let mut domain = Domain::new();
        let mut lookup: Vec<String> = Vec::new();

        for token in input {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            if let Some(group) = token.strip_prefix("g:") {
                domain.add_group(group);
            } else if let Some(name) = token.strip_prefix("name:") {
                domain.add_name(name);
            } else if let Some(unique_id) = parse_unique_id(token) {
                domain.add_unique_id(unique_id);
            } else if token.contains(':') {
                return Err(ResolveError::InvalidDomainFormat(token.to_owned()));
            } else {
                match self.policy {
                    UserLocatorPolicy::NameOnly => domain.add_name(token),
                    UserLocatorPolicy::UuidOnly => lookup.push(token.to_lowercase()),
                    UserLocatorPolicy::UuidAndName => {
                        domain.add_name(token);
                        lookup.push(token.to_lowercase());
                    }
                }
            }
        }

        if lookup.is_empty() {
            return Ok(domain);
        }

        for profile in self.service.find_all_by_name(&lookup)? {
            let name = profile.name.to_lowercase();
            lookup.retain(|n| *n != name);
            domain.add_unique_id(profile.unique_id);
        }

        if !lookup.is_empty() {
            lookup.sort();
            lookup.dedup();
            if !self.discard_unresolved {
                return Err(ResolveError::UnresolvedNames(lookup));
            }
            warn!(names = ?lookup, "discarding names with no known profile");
        }

        Ok(domain)
    }
}

impl std::fmt::Debug for DomainInputResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainInputResolver")
            .field("policy", &self.policy)
            .field("discard_unresolved", &self.discard_unresolved)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Uuid = Uuid::from_u128(0xa11ce);

    fn service() -> StaticProfileService {
        StaticProfileService::new([Profile::new(ALICE, "Alice")])
    }

    struct DownService;

    impl ProfileService for DownService {
        fn find_all_by_name(&self, _names: &[String]) -> Result<Vec<Profile>, ResolveError> {
            Err(ResolveError::LookupFailed("timed out".into()))
        }
    }

    #[test]
    fn test_parse_unique_id_forms() {
        let dashed = ALICE.hyphenated().to_string();
        let simple = ALICE.simple().to_string();
        let short: String = simple.chars().skip(1).collect();

        assert_eq!(parse_unique_id(&dashed), Some(ALICE));
        assert_eq!(parse_unique_id(&simple), Some(ALICE));
        assert_eq!(parse_unique_id(&format!("uuid:{simple}")), Some(ALICE));
        assert_eq!(parse_unique_id(&short), None);
        assert_eq!(parse_unique_id("alice"), None);
        assert_eq!(parse_unique_id(&format!("{{{dashed}}}")), None);
    }

    #[test]
    fn test_groups_names_and_ids() {
        let service = service();
        let domain = DomainInputResolver::new(&service)
            .resolve(&["g:Admins", "name:Bob", ALICE.to_string().as_str()])
            .unwrap();

        assert!(domain.groups().contains_group("admins"));
        assert!(domain.contains_name("bob"));
        assert!(domain.contains_unique_id(&ALICE));
    }

    #[test]
    fn test_uuid_only_looks_up_names() {
        let service = service();
        let domain = DomainInputResolver::new(&service).resolve(&["ALICE"]).unwrap();

        assert!(domain.contains_unique_id(&ALICE));
        assert!(!domain.contains_name("alice"));
    }

    #[test]
    fn test_uuid_and_name_stores_both() {
        let service = service();
        let domain = DomainInputResolver::new(&service)
            .policy(UserLocatorPolicy::UuidAndName)
            .resolve(&["alice"])
            .unwrap();

        assert!(domain.contains_unique_id(&ALICE));
        assert!(domain.contains_name("alice"));
    }

    #[test]
    fn test_name_only_skips_lookup() {
        let domain = DomainInputResolver::new(&DownService)
            .policy(UserLocatorPolicy::NameOnly)
            .resolve(&["carol"])
            .unwrap();

        assert!(domain.contains_name("carol"));
    }

    #[test]
    fn test_unresolved_names() {
        let service = service();
        let resolver = DomainInputResolver::new(&service);

        assert_eq!(
            resolver.resolve(&["zed", "alice", "Zed"]),
            Err(ResolveError::UnresolvedNames(vec!["zed".into()]))
        );

        let domain = resolver.discard_unresolved(true).resolve(&["zed", "alice"]).unwrap();
        assert_eq!(domain.size(), 1);
    }

    #[test]
    fn test_rejects_unknown_prefix() {
        let service = service();
        assert_eq!(
            DomainInputResolver::new(&service).resolve(&["team:red"]),
            Err(ResolveError::InvalidDomainFormat("team:red".into()))
        );
    }

    #[test]
    fn test_service_failure_propagates() {
        assert!(matches!(
            DomainInputResolver::new(&DownService).resolve(&["alice"]),
            Err(ResolveError::LookupFailed(_))
        ));
    }
}
