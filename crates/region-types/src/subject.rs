//! Owners, members and the subjects checked against them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// One entry of a membership list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Principal {
    /// A player identified by UUID
    Player(Uuid),
    /// A player identified by name (lowercase)
    Name(String),
    /// A permission group (lowercase)
    Group(String),
}

impl Principal {
    pub fn name(name: impl AsRef<str>) -> Self {
        Principal::Name(name.as_ref().to_lowercase())
    }

    pub fn group(group: impl AsRef<str>) -> Self {
        Principal::Group(group.as_ref().to_lowercase())
    }

    /// The same principal with its name or group lowercased.
    pub fn canonical(self) -> Self {
        match self {
            Principal::Player(uuid) => Principal::Player(uuid),
            Principal::Name(name) => Principal::name(name),
            Principal::Group(group) => Principal::group(group),
        }
    }

    /// Parses operator input: `g:<group>` for groups, a UUID, or a player name.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if let Some(group) = input.strip_prefix("g:") {
            return (!group.is_empty()).then(|| Principal::group(group));
        }
        match Uuid::parse_str(input) {
            Ok(uuid) => Some(Principal::Player(uuid)),
            Err(_) => Some(Principal::name(input)),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Player(uuid) => write!(f, "{}", uuid),
            Principal::Name(name) => write!(f, "{}", name),
            Principal::Group(group) => write!(f, "g:{}", group),
        }
    }
}

/// A set of players and groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSet {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    principals: BTreeSet<Principal>,
}

impl DomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, principal: Principal) -> bool {
        self.principals.insert(principal)
    }

    pub fn remove(&mut self, principal: &Principal) -> bool {
        self.principals.remove(principal)
    }

    pub fn has(&self, principal: &Principal) -> bool {
        self.principals.contains(principal)
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    /// Lowercases every name and group entry, merging entries that collide.
    pub fn canonicalize(&mut self) {
        let principals = std::mem::take(&mut self.principals);
        self.principals = principals.into_iter().map(Principal::canonical).collect();
    }

    pub fn clear(&mut self) {
        self.principals.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Principal> {
        self.principals.iter()
    }

    /// Returns true if the subject is listed by UUID, by name, or through
    /// one of its groups.
    pub fn contains(&self, subject: &Subject) -> bool {
        if self.principals.contains(&Principal::Player(subject.id)) {
            return true;
        }
        if let Some(name) = &subject.name {
            if self.principals.contains(&Principal::name(name)) {
                return true;
            }
        }
        subject
            .groups
            .iter()
            .any(|g| self.principals.contains(&Principal::group(g)))
    }
}

impl FromIterator<Principal> for DomainSet {
    fn from_iter<I: IntoIterator<Item = Principal>>(iter: I) -> Self {
        Self {
            principals: iter.into_iter().collect(),
        }
    }
}

/// The actor whose rights are being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub name: Option<String>,
    pub groups: Vec<String>,
}

impl Subject {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            groups: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_parse() {
        assert_eq!(Principal::parse("g:Builders"), Some(Principal::Group("builders".into())));
        assert_eq!(Principal::parse("  Steve "), Some(Principal::Name("steve".into())));
        assert_eq!(Principal::parse(""), None);
        assert_eq!(Principal::parse("g:"), None);

        let uuid = Uuid::new_v4();
        assert_eq!(Principal::parse(&uuid.to_string()), Some(Principal::Player(uuid)));
    }

    #[test]
    fn test_domain_contains_by_uuid_name_and_group() {
        let alice = Uuid::new_v4();
        let mut set = DomainSet::new();
        set.add(Principal::Player(alice));
        set.add(Principal::name("Bob"));
        set.add(Principal::group("Mods"));

        assert!(set.contains(&Subject::new(alice)));
        assert!(set.contains(&Subject::new(Uuid::new_v4()).with_name("BOB")));
        assert!(set.contains(&Subject::new(Uuid::new_v4()).with_group("mods")));
        assert!(!set.contains(&Subject::new(Uuid::new_v4()).with_name("carol")));
    }

    #[test]
    fn test_domain_add_remove() {
        let mut set = DomainSet::new();
        assert!(set.add(Principal::name("steve")));
        assert!(!set.add(Principal::name("Steve")));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&Principal::name("steve")));
        assert!(set.is_empty());
    }

    #[test]
    fn test_domain_canonicalize_merges_casing() {
        let mut domain: DomainSet = [
            Principal::Name("Mayor".into()),
            Principal::Name("mayor".into()),
            Principal::Group("Builders".into()),
        ]
        .into_iter()
        .collect();

        domain.canonicalize();

        assert_eq!(domain.len(), 2);
        assert!(domain.has(&Principal::name("mayor")));
        assert!(domain.has(&Principal::group("builders")));
        assert!(domain.contains(&Subject::new(Uuid::nil()).with_name("MAYOR")));
    }
}
