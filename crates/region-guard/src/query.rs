//! Query results and flag resolution.
//!
//! An [`ApplicableRegionSet`] is an immutable snapshot of the regions
//! covering one point plus their ancestor chains. Everything here runs
//! without touching the index lock.

use std::collections::HashMap;
use std::sync::Arc;

use region_types::{
    normalize_id, Association, Combine, FlagDef, FlagValue, Region, State, Subject,
};

use crate::error::RegionError;

/// Order of the regions returned by [`ApplicableRegionSet::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Insertion order
    Unsorted,
    /// Descending priority, ties in insertion order
    #[default]
    Sorted,
}

/// Outcome of resolving a flag, with the regions that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDecision {
    /// Effective value, or the flag default
    pub value: Option<FlagValue>,
    /// Covering region that decided; `None` when the default was used
    pub region: Option<String>,
    /// Ancestor that supplied the value when it was inherited
    pub inherited_from: Option<String>,
}

impl FlagDecision {
    fn fallback(flag: &FlagDef) -> Self {
        Self {
            value: flag.default.clone(),
            region: None,
            inherited_from: None,
        }
    }
}

/// A value found for one covering region, possibly through a parent.
struct Effective<'a> {
    value: &'a FlagValue,
    region: &'a Region,
    source: &'a Region,
}

impl Effective<'_> {
    fn decision(&self) -> FlagDecision {
        FlagDecision {
            value: Some(self.value.clone()),
            region: Some(self.region.id.clone()),
            inherited_from: (!std::ptr::eq(self.region, self.source))
                .then(|| self.source.id.clone()),
        }
    }
}

/// Regions covering one point.
#[derive(Debug, Clone)]
pub struct ApplicableRegionSet {
    regions: Vec<Arc<Region>>,
    ancestors: HashMap<String, Arc<Region>>,
    mode: QueryMode,
}

impl ApplicableRegionSet {
    /// Builds a set from regions in insertion order.
    pub(crate) fn new(
        mut regions: Vec<Arc<Region>>,
        ancestors: HashMap<String, Arc<Region>>,
        mode: QueryMode,
    ) -> Self {
        if mode == QueryMode::Sorted {
            regions.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        Self {
            regions,
            ancestors,
            mode,
        }
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True only if nothing covers the point, not even the global region.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Region>> {
        self.regions.iter()
    }

    /// Ids in iteration order.
    pub fn ids(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.id.as_str()).collect()
    }

    /// The same set without the global region.
    pub fn without_global(&self) -> Self {
        Self {
            regions: self
                .regions
                .iter()
                .filter(|r| !r.is_global())
                .cloned()
                .collect(),
            ancestors: self.ancestors.clone(),
            mode: self.mode,
        }
    }

    /// Regions by descending priority, stable over insertion order.
    fn prioritized(&self) -> Vec<&Region> {
        let mut sorted: Vec<&Region> = self.regions.iter().map(Arc::as_ref).collect();
        if self.mode == QueryMode::Unsorted {
            sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        sorted
    }

    /// Splits the prioritized regions into equal-priority tiers.
    fn tiers(&self) -> Vec<Vec<&Region>> {
        let mut tiers: Vec<Vec<&Region>> = Vec::new();
        for region in self.prioritized() {
            match tiers.last_mut() {
                Some(tier) if tier[0].priority == region.priority => tier.push(region),
                _ => tiers.push(vec![region]),
            }
        }
        tiers
    }

    /// The single region with the highest priority.
    pub fn single(&self) -> Result<Arc<Region>, RegionError> {
        let tiers = self.tiers();
        let top = tiers.first().ok_or(RegionError::NoApplicableRegion)?;
        if top.len() > 1 {
            return Err(RegionError::AmbiguousQuery {
                ids: top.iter().map(|r| r.id.clone()).collect(),
            });
        }
        let id = &top[0].id;
        self.regions
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .ok_or(RegionError::NoApplicableRegion)
    }

    fn parent_of(&self, region: &Region) -> Option<&Region> {
        region
            .parent
            .as_deref()
            .and_then(|p| self.ancestors.get(&normalize_id(p)))
            .map(Arc::as_ref)
    }

    /// The region followed by its ancestors, nearest first.
    fn lineage<'a>(&'a self, region: &'a Region) -> impl Iterator<Item = &'a Region> + 'a {
        // The snapshot is acyclic; the bound guards against stale data
        std::iter::successors(Some(region), move |r| self.parent_of(r))
            .take(self.ancestors.len() + 1)
    }

    /// How the subject relates to a covering region, counting its parents.
    fn association(&self, region: &Region, subject: Option<&Subject>) -> Association {
        let Some(subject) = subject else {
            return Association::NonMember;
        };
        let mut association = Association::NonMember;
        for r in self.lineage(region) {
            if r.owners.contains(subject) {
                return Association::Owner;
            }
            if r.members.contains(subject) {
                association = Association::Member;
            }
        }
        association
    }

    /// The value a covering region contributes: its own if set and the
    /// flag's group applies to the subject, else the nearest ancestor's.
    fn effective<'a>(
        &'a self,
        region: &'a Region,
        flag: &FlagDef,
        subject: Option<&Subject>,
    ) -> Option<Effective<'a>> {
        let association = self.association(region, subject);
        self.lineage(region).find_map(|source| {
            let value = source.flag(&flag.name)?;
            let group = source.flag_group(&flag.name).unwrap_or(flag.default_group);
            group.contains(association).then_some(Effective {
                value,
                region,
                source,
            })
        })
    }

    /// Resolves a flag and reports where the value came from.
    pub fn explain(&self, flag: &FlagDef, subject: Option<&Subject>) -> FlagDecision {
        match flag.combine {
            Combine::HighestWins => {
                for tier in self.tiers() {
                    if let Some(found) = tier
                        .into_iter()
                        .find_map(|r| self.effective(r, flag, subject))
                    {
                        return found.decision();
                    }
                }
                FlagDecision::fallback(flag)
            }
            Combine::DenyOverrides => {
                let mut first = None;
                for region in self.prioritized() {
                    let Some(found) = self.effective(region, flag, subject) else {
                        continue;
                    };
                    if found.value.as_state() == Some(State::Deny) {
                        return found.decision();
                    }
                    first.get_or_insert(found);
                }
                first
                    .map(|found| found.decision())
                    .unwrap_or_else(|| FlagDecision::fallback(flag))
            }
        }
    }

    /// Effective value of a flag for the subject, or its default.
    pub fn resolve(&self, flag: &FlagDef, subject: Option<&Subject>) -> Option<FlagValue> {
        self.explain(flag, subject).value
    }

    /// Combined state of several state flags. Any deny wins.
    pub fn query_state(&self, flags: &[&FlagDef], subject: Option<&Subject>) -> Option<State> {
        let mut result = None;
        for flag in flags {
            match self.resolve(flag, subject).and_then(|v| v.as_state()) {
                Some(State::Deny) => return Some(State::Deny),
                Some(State::Allow) => result = Some(State::Allow),
                None => {}
            }
        }
        result
    }

    /// True when the combined state is an explicit allow.
    pub fn test_state(&self, flags: &[&FlagDef], subject: Option<&Subject>) -> bool {
        self.query_state(flags, subject) == Some(State::Allow)
    }

    /// True if the subject owns any covering region or one of its ancestors.
    pub fn is_owner(&self, subject: &Subject) -> bool {
        self.regions
            .iter()
            .any(|r| self.association(r, Some(subject)) == Association::Owner)
    }

    /// True if the subject is a member (or owner) of any covering region or
    /// one of its ancestors.
    pub fn is_member(&self, subject: &Subject) -> bool {
        self.regions
            .iter()
            .any(|r| self.association(r, Some(subject)) != Association::NonMember)
    }

    pub fn is_owner_or_member(&self, subject: &Subject) -> bool {
        self.is_owner(subject) || self.is_member(subject)
    }
}

impl<'a> IntoIterator for &'a ApplicableRegionSet {
    type Item = &'a Arc<Region>;
    type IntoIter = std::slice::Iter<'a, Arc<Region>>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::RegionIndex;
    use region_types::fixtures::{
        cuboid_region, sample_regions, ARENA_POINT, SHOP_POINT, WILDERNESS_POINT,
    };
    use region_types::{BlockPos, FlagKind, FlagRegistry, Principal, RegionGroup};
    use uuid::Uuid;

    fn sample_index() -> RegionIndex {
        RegionIndex::from_regions("world", &IndexConfig::default(), sample_regions())
    }

    fn deny() -> FlagValue {
        FlagValue::State(State::Deny)
    }

    fn allow() -> FlagValue {
        FlagValue::State(State::Allow)
    }

    #[test]
    fn test_sorted_and_unsorted_order() {
        let idx = sample_index();

        let sorted = idx.query(SHOP_POINT, QueryMode::Sorted);
        assert_eq!(sorted.ids(), vec!["shop", "Town", "__global__"]);

        let unsorted = idx.query(SHOP_POINT, QueryMode::Unsorted);
        assert_eq!(unsorted.ids(), vec!["__global__", "Town", "shop"]);
        assert_eq!(unsorted.mode(), QueryMode::Unsorted);
    }

    #[test]
    fn test_empty_set_uses_default() {
        let idx = RegionIndex::new("world", &IndexConfig::default());
        let set = idx.query(BlockPos::new(0, 0, 0), QueryMode::Sorted);
        let notify = FlagRegistry::with_builtins().get("notify-enter").cloned().unwrap();

        assert!(set.is_empty());
        assert_eq!(set.resolve(&notify, None), Some(FlagValue::Boolean(false)));
        assert_eq!(set.single().unwrap_err(), RegionError::NoApplicableRegion);
    }

    #[test]
    fn test_only_global_applies() {
        let idx = sample_index();
        let set = idx.query(WILDERNESS_POINT, QueryMode::Sorted);
        let tnt = FlagRegistry::with_builtins().get("tnt").cloned().unwrap();

        assert_eq!(set.ids(), vec!["__global__"]);
        assert!(set.single().unwrap().is_global());
        assert_eq!(set.resolve(&tnt, None), Some(deny()));
    }

    #[test]
    fn test_higher_priority_wins() {
        let idx = sample_index();
        let greeting = FlagRegistry::with_builtins().get("greeting").cloned().unwrap();

        let decision = idx.query(SHOP_POINT, QueryMode::Sorted).explain(&greeting, None);
        assert_eq!(decision.value, Some(FlagValue::Text("Open for business".into())));
        assert_eq!(decision.region.as_deref(), Some("shop"));
        assert!(decision.inherited_from.is_none());
    }

    #[test]
    fn test_inherited_value_is_explained() {
        let idx = sample_index();
        let build = FlagRegistry::with_builtins().get("build").cloned().unwrap();

        let decision = idx.query(SHOP_POINT, QueryMode::Unsorted).explain(&build, None);
        assert_eq!(decision.value, Some(deny()));
        assert_eq!(decision.region.as_deref(), Some("shop"));
        assert_eq!(decision.inherited_from.as_deref(), Some("Town"));
    }

    #[test]
    fn test_inherited_deny_beats_lower_allow() {
        let idx = RegionIndex::new("world", &IndexConfig::default());
        let flag = FlagDef::state("build");
        idx.add(cuboid_region("p", (500, 0, 500), (510, 10, 510)).with_flag("build", deny()))
            .unwrap();
        idx.add(cuboid_region("a", (0, 0, 0), (20, 20, 20)).with_priority(5).with_parent("p"))
            .unwrap();
        idx.add(cuboid_region("b", (0, 0, 0), (20, 20, 20)).with_priority(1).with_flag("build", allow()))
            .unwrap();

        let set = idx.query(BlockPos::new(10, 10, 10), QueryMode::Sorted);
        assert_eq!(set.resolve(&flag, None), Some(deny()));
    }

    #[test]
    fn test_deny_overrides_consults_every_region() {
        let idx = sample_index();
        let pvp = FlagRegistry::with_builtins().get("pvp").cloned().unwrap();
        assert_eq!(pvp.combine, Combine::DenyOverrides);

        // Arena (priority 5) allows, Town (priority 1) denies
        let decision = idx.query(ARENA_POINT, QueryMode::Sorted).explain(&pvp, None);
        assert_eq!(decision.value, Some(deny()));
        assert_eq!(decision.region.as_deref(), Some("Town"));

        // The same layout under highest-wins lets the arena decide
        let plain = FlagDef::state("pvp");
        let set = idx.query(ARENA_POINT, QueryMode::Sorted);
        assert_eq!(set.resolve(&plain, None), Some(allow()));
    }

    #[test]
    fn test_same_tier_earliest_inserted_wins() {
        let idx = RegionIndex::new("world", &IndexConfig::default());
        let flag = FlagDef::new("greeting", FlagKind::Text);
        idx.add(cuboid_region("first", (0, 0, 0), (9, 9, 9)).with_flag("greeting", FlagValue::Text("one".into())))
            .unwrap();
        idx.add(cuboid_region("second", (0, 0, 0), (9, 9, 9)).with_flag("greeting", FlagValue::Text("two".into())))
            .unwrap();

        let decision = idx.query(BlockPos::new(1, 1, 1), QueryMode::Unsorted).explain(&flag, None);
        assert_eq!(decision.region.as_deref(), Some("first"));
    }

    #[test]
    fn test_flag_group_restricts_subjects() {
        let idx = RegionIndex::new("world", &IndexConfig::default());
        let entry = FlagRegistry::with_builtins().get("entry").cloned().unwrap();
        let owner = Uuid::new_v4();
        idx.add(
            cuboid_region("vault", (0, 0, 0), (9, 9, 9))
                .with_flag("entry", deny())
                .with_owner(Principal::Player(owner)),
        )
        .unwrap();

        let set = idx.query(BlockPos::new(1, 1, 1), QueryMode::Sorted);
        // Entry defaults to the non-members group
        assert_eq!(set.resolve(&entry, Some(&Subject::new(Uuid::new_v4()))), Some(deny()));
        assert_eq!(set.resolve(&entry, None), Some(deny()));
        assert_eq!(set.resolve(&entry, Some(&Subject::new(owner))), None);

        idx.set_flag_group("vault", &entry, Some(RegionGroup::All)).unwrap();
        let set = idx.query(BlockPos::new(1, 1, 1), QueryMode::Sorted);
        assert_eq!(set.resolve(&entry, Some(&Subject::new(owner))), Some(deny()));
    }

    #[test]
    fn test_membership_includes_parents() {
        let idx = sample_index();
        let set = idx.query(SHOP_POINT, QueryMode::Sorted);

        let mayor = Subject::new(Uuid::new_v4()).with_name("Mayor");
        let keeper = Subject::new(Uuid::new_v4()).with_name("shopkeeper");
        let citizen = Subject::new(Uuid::new_v4()).with_group("citizens");
        let stranger = Subject::new(Uuid::new_v4());

        assert!(set.is_owner(&mayor));
        assert!(set.is_owner(&keeper));
        assert!(!set.is_owner(&citizen));
        assert!(set.is_member(&citizen));
        assert!(set.is_member(&mayor));
        assert!(!set.is_owner_or_member(&stranger));
    }

    #[test]
    fn test_query_and_test_state() {
        let idx = sample_index();
        let flags = FlagRegistry::with_builtins();
        let build = flags.get("build").unwrap();
        let pvp = flags.get("pvp").unwrap();
        let chest = flags.get("chest-access").unwrap();

        let arena = idx.query(ARENA_POINT, QueryMode::Sorted);
        assert_eq!(arena.query_state(&[build, pvp], None), Some(State::Deny));
        assert_eq!(arena.query_state(&[chest], None), None);
        assert!(!arena.test_state(&[chest], None));

        idx.set_flag_value("arena", chest, Some(allow())).unwrap();
        let arena = idx.query(ARENA_POINT, QueryMode::Sorted);
        assert!(arena.test_state(&[chest], None));
    }

    #[test]
    fn test_single_reports_all_tied_ids() {
        let idx = RegionIndex::new("world", &IndexConfig::default());
        idx.add(cuboid_region("a", (0, 0, 0), (9, 9, 9)).with_priority(2)).unwrap();
        idx.add(cuboid_region("b", (0, 0, 0), (9, 9, 9)).with_priority(2)).unwrap();
        idx.add(cuboid_region("c", (0, 0, 0), (9, 9, 9)).with_priority(2)).unwrap();

        let err = idx.query(BlockPos::new(0, 0, 0), QueryMode::Unsorted).single().unwrap_err();
        assert_eq!(
            err,
            RegionError::AmbiguousQuery {
                ids: vec!["a".into(), "b".into(), "c".into()]
            }
        );
    }

    #[test]
    fn test_snapshot_is_stable_after_mutation() {
        let idx = sample_index();
        let build = FlagRegistry::with_builtins().get("build").cloned().unwrap();
        let set = idx.query(SHOP_POINT, QueryMode::Sorted);

        idx.remove("Town").unwrap();

        assert_eq!(set.resolve(&build, None), Some(deny()));
        let fresh = idx.query(SHOP_POINT, QueryMode::Sorted);
        assert_eq!(fresh.resolve(&build, None), None);
    }
}
