//! The protected region entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::flag::{Association, FlagValue, RegionGroup};
use crate::geometry::{BlockPos, Geometry};
use crate::subject::{DomainSet, Principal, Subject};

/// Reserved id of the world-wide region.
pub const GLOBAL_REGION_ID: &str = "__global__";

/// Returns true if the id only uses characters allowed in region ids.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ',' | '\'' | '-' | '+' | '/'))
}

/// Case-folded id used as the lookup key.
pub fn normalize_id(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// A named protected area with priority, flags and membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, FlagValue>,
    /// Per-flag group overrides; flags not listed use their definition's default group
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flag_groups: BTreeMap<String, RegionGroup>,
    #[serde(default)]
    pub owners: DomainSet,
    #[serde(default)]
    pub members: DomainSet,
    /// Id of the region this one inherits flags and membership from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Region {
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            priority: 0,
            flags: BTreeMap::new(),
            flag_groups: BTreeMap::new(),
            owners: DomainSet::new(),
            members: DomainSet::new(),
            parent: None,
        }
    }

    /// The world-wide region, at the lowest priority.
    pub fn global() -> Self {
        Self::new(GLOBAL_REGION_ID, Geometry::Global).with_priority(i32::MIN)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_flag(mut self, name: impl AsRef<str>, value: FlagValue) -> Self {
        self.set_flag(name, Some(value));
        self
    }

    pub fn with_owner(mut self, principal: Principal) -> Self {
        self.owners.add(principal);
        self
    }

    pub fn with_member(mut self, principal: Principal) -> Self {
        self.members.add(principal);
        self
    }

    /// Lookup key of this region.
    pub fn key(&self) -> String {
        normalize_id(&self.id)
    }

    pub fn is_global(&self) -> bool {
        self.id.eq_ignore_ascii_case(GLOBAL_REGION_ID)
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.geometry.contains(pos)
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(&name.to_ascii_lowercase())
    }

    /// Sets or clears a flag value. Clearing also drops the flag's group.
    pub fn set_flag(&mut self, name: impl AsRef<str>, value: Option<FlagValue>) {
        let name = name.as_ref().to_ascii_lowercase();
        match value {
            Some(value) => {
                self.flags.insert(name, value);
            }
            None => {
                self.flags.remove(&name);
                self.flag_groups.remove(&name);
            }
        }
    }

    pub fn flag_group(&self, name: &str) -> Option<RegionGroup> {
        self.flag_groups.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn set_flag_group(&mut self, name: impl AsRef<str>, group: Option<RegionGroup>) {
        let name = name.as_ref().to_ascii_lowercase();
        match group {
            Some(group) => {
                self.flag_groups.insert(name, group);
            }
            None => {
                self.flag_groups.remove(&name);
            }
        }
    }

    /// Lowercases flag names and membership names so data written by hand
    /// matches the lookups.
    pub fn canonicalize(&mut self) {
        self.flags = std::mem::take(&mut self.flags)
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        self.flag_groups = std::mem::take(&mut self.flag_groups)
            .into_iter()
            .map(|(name, group)| (name.to_ascii_lowercase(), group))
            .collect();
        self.owners.canonicalize();
        self.members.canonicalize();
    }

    /// How the subject relates to this region alone, ignoring parents.
    pub fn association(&self, subject: &Subject) -> Association {
        if self.owners.contains(subject) {
            Association::Owner
        } else if self.members.contains(subject) {
            Association::Member
        } else {
            Association::NonMember
        }
    }
}
