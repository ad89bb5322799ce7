//! Per-world region index.
//!
//! Holds every region of one world behind a reader-writer lock together
//! with the spatial grid used to find covering regions. Regions are stored
//! as `Arc<Region>` and never mutated in place: every change clones the
//! region, edits the copy and swaps the handle under the write lock, so a
//! query snapshot always sees a region either entirely before or entirely
//! after a change.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use region_types::{
    is_valid_id, normalize_id, BlockPos, FlagContext, FlagDef, FlagValue, Geometry, Principal,
    Region, RegionGroup, GLOBAL_REGION_ID,
};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::RegionError;
use crate::query::{ApplicableRegionSet, QueryMode};
use crate::spatial::SpatialGrid;

/// What happens to the children of a removed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalStrategy {
    /// Children stay and lose their parent
    #[default]
    UnsetParentInChildren,
    /// Children (and their children) are removed too
    RemoveChildren,
}

#[derive(Debug, Clone)]
struct Entry {
    /// Insertion order, used to keep ties stable
    seq: u64,
    region: Arc<Region>,
}

#[derive(Debug)]
struct IndexState {
    entries: HashMap<String, Entry>,
    grid: SpatialGrid,
    next_seq: u64,
}

impl IndexState {
    fn insert(&mut self, key: String, region: Arc<Region>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.insert_at(key, region, seq);
    }

    fn insert_at(&mut self, key: String, region: Arc<Region>, seq: u64) {
        self.grid.insert(&key, &region.geometry);
        self.entries.insert(key, Entry { seq, region });
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.grid.remove(key);
        Some(entry)
    }

    fn ensure_global(&mut self) -> Arc<Region> {
        if let Some(entry) = self.entries.get(GLOBAL_REGION_ID) {
            return entry.region.clone();
        }
        let global = Arc::new(Region::global());
        self.insert(GLOBAL_REGION_ID.to_string(), global.clone());
        debug!("Materialized the global region");
        global
    }

    /// Keys of regions whose parent is `key`, in insertion order.
    fn children_of(&self, key: &str) -> Vec<String> {
        let mut children: Vec<(&String, &Entry)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.region.parent.as_deref().map(normalize_id).as_deref() == Some(key))
            .collect();
        children.sort_by_key(|(_, e)| e.seq);
        children.into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// Rewrites the parent field of every child of `key`.
    fn reparent_children(&mut self, key: &str, parent: Option<&str>) -> usize {
        let children = self.children_of(key);
        for child in &children {
            if let Some(entry) = self.entries.get_mut(child) {
                let mut region = (*entry.region).clone();
                region.parent = parent.map(str::to_string);
                entry.region = Arc::new(region);
            }
        }
        children.len()
    }

    /// Fails if making `parent_key` the parent of `key` would close a cycle.
    fn check_ancestry(&self, key: &str, parent_key: &str) -> Result<(), RegionError> {
        let mut current = Some(parent_key.to_string());
        let mut steps = 0;
        while let Some(k) = current {
            if k == key {
                return Err(RegionError::CircularInheritance {
                    id: self.display_id(key),
                    parent: self.display_id(parent_key),
                });
            }
            steps += 1;
            if steps > self.entries.len() {
                break;
            }
            current = self
                .entries
                .get(&k)
                .and_then(|e| e.region.parent.as_deref().map(normalize_id));
        }
        Ok(())
    }

    fn display_id(&self, key: &str) -> String {
        self.entries
            .get(key)
            .map(|e| e.region.id.clone())
            .unwrap_or_else(|| key.to_string())
    }

    fn sorted(&self) -> Vec<Arc<Region>> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.region.clone()).collect()
    }
}

fn check_id(id: &str) -> Result<(), RegionError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(RegionError::InvalidId { id: id.to_string() })
    }
}

/// Enforces the single world-wide region rule for an id/geometry pair.
fn check_reserved(id: &str, geometry: &Geometry) -> Result<(), RegionError> {
    let is_global_id = id.eq_ignore_ascii_case(GLOBAL_REGION_ID);
    match (is_global_id, geometry.is_global()) {
        (true, false) => Err(RegionError::ReservedIdViolation {
            id: id.to_string(),
            reason: "the global region cannot have bounds",
        }),
        (false, true) => Err(RegionError::ReservedIdViolation {
            id: id.to_string(),
            reason: "only the global region may cover the whole world",
        }),
        _ => Ok(()),
    }
}

fn check_geometry(id: &str, geometry: &Geometry) -> Result<(), RegionError> {
    geometry
        .validate()
        .map_err(|source| RegionError::InvalidGeometry {
            id: id.to_string(),
            source,
        })?;
    check_reserved(id, geometry)
}

/// All regions of one world.
#[derive(Debug)]
pub struct RegionIndex {
    world: String,
    state: RwLock<IndexState>,
    dirty: AtomicBool,
}

impl RegionIndex {
    /// Creates an empty index for `world`.
    pub fn new(world: impl Into<String>, config: &IndexConfig) -> Self {
        Self {
            world: world.into(),
            state: RwLock::new(IndexState {
                entries: HashMap::new(),
                grid: SpatialGrid::new(config.cell_shift, config.max_cells_per_region),
                next_seq: 0,
            }),
            dirty: AtomicBool::new(false),
        }
    }

    /// Builds an index from stored regions.
    ///
    /// Loading is lenient: invalid or duplicate regions are skipped and
    /// dangling or circular parents are cleared, each with a warning. The
    /// resulting index starts clean.
    pub fn from_regions(
        world: impl Into<String>,
        config: &IndexConfig,
        regions: impl IntoIterator<Item = Region>,
    ) -> Self {
        let index = Self::new(world, config);
        {
            let mut state = index.state.write();

            for mut region in regions {
                region.canonicalize();
                let key = region.key();
                let checked = check_id(&region.id)
                    .and_then(|_| check_geometry(&region.id, &region.geometry));
                if let Err(e) = checked {
                    warn!("Skipping region in world '{}': {}", index.world, e);
                    continue;
                }
                if state.entries.contains_key(&key) {
                    warn!(
                        "Skipping duplicate region '{}' in world '{}'",
                        region.id, index.world
                    );
                    continue;
                }
                state.insert(key, Arc::new(region));
            }

            let keys: Vec<String> = state
                .sorted()
                .iter()
                .map(|r| r.key())
                .collect();
            for key in keys {
                index.repair_parent(&mut state, &key);
            }
        }
        index
    }

    /// Clears a loaded region's parent if it is missing or closes a cycle,
    /// and canonicalizes the stored parent id otherwise.
    fn repair_parent(&self, state: &mut IndexState, key: &str) {
        let Some(entry) = state.entries.get(key) else {
            return;
        };
        let Some(parent) = entry.region.parent.clone() else {
            return;
        };
        let parent_key = normalize_id(&parent);

        let repaired = match state.entries.get(&parent_key) {
            None => {
                warn!(
                    "Region '{}' in world '{}' names missing parent '{}'; clearing it",
                    entry.region.id, self.world, parent
                );
                None
            }
            Some(_) if parent_key == key || state.check_ancestry(key, &parent_key).is_err() => {
                warn!(
                    "Region '{}' in world '{}' has circular parent '{}'; clearing it",
                    entry.region.id, self.world, parent
                );
                None
            }
            Some(parent_entry) => Some(parent_entry.region.id.clone()),
        };

        if repaired.as_deref() != Some(parent.as_str()) {
            if let Some(entry) = state.entries.get_mut(key) {
                let mut region = (*entry.region).clone();
                region.parent = repaired;
                entry.region = Arc::new(region);
            }
        }
    }

    /// Name of the world this index belongs to.
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Adds a new region.
    pub fn add(&self, region: Region) -> Result<Arc<Region>, RegionError> {
        check_id(&region.id)?;
        check_geometry(&region.id, &region.geometry)?;

        let key = region.key();
        let mut state = self.state.write();

        if let Some(existing) = state.entries.get(&key) {
            return Err(RegionError::DuplicateId {
                id: existing.region.id.clone(),
            });
        }

        let mut region = region;
        region.canonicalize();
        if let Some(parent) = region.parent.clone() {
            let parent_key = normalize_id(&parent);
            if parent_key == key {
                return Err(RegionError::CircularInheritance {
                    id: region.id.clone(),
                    parent,
                });
            }
            let parent_entry = state
                .entries
                .get(&parent_key)
                .ok_or_else(|| RegionError::not_found(&parent))?;
            region.parent = Some(parent_entry.region.id.clone());
        }

        let region = Arc::new(region);
        state.insert(key, region.clone());
        self.mark_dirty();
        debug!("Added region '{}' to world '{}'", region.id, self.world);
        Ok(region)
    }

    /// Removes a region; its children lose their parent.
    pub fn remove(&self, id: &str) -> Result<Arc<Region>, RegionError> {
        let mut removed = self.remove_with(id, RemovalStrategy::UnsetParentInChildren)?;
        // The named region is always first
        Ok(removed.swap_remove(0))
    }

    /// Removes a region using the given strategy for its children.
    ///
    /// Returns every removed region, the named one first.
    pub fn remove_with(
        &self,
        id: &str,
        strategy: RemovalStrategy,
    ) -> Result<Vec<Arc<Region>>, RegionError> {
        let key = normalize_id(id);
        let mut state = self.state.write();

        if !state.entries.contains_key(&key) {
            return Err(RegionError::not_found(id));
        }

        let mut removed = Vec::new();
        match strategy {
            RemovalStrategy::UnsetParentInChildren => {
                let detached = state.reparent_children(&key, None);
                if detached > 0 {
                    info!(
                        "Detached {} child region(s) of '{}' in world '{}'",
                        detached, id, self.world
                    );
                }
                if let Some(entry) = state.remove(&key) {
                    removed.push(entry.region);
                }
            }
            RemovalStrategy::RemoveChildren => {
                let mut queue = VecDeque::from([key]);
                let mut seen = HashSet::new();
                while let Some(k) = queue.pop_front() {
                    if !seen.insert(k.clone()) {
                        continue;
                    }
                    queue.extend(state.children_of(&k));
                    if let Some(entry) = state.remove(&k) {
                        removed.push(entry.region);
                    }
                }
                info!(
                    "Removed '{}' and {} descendant(s) from world '{}'",
                    id,
                    removed.len().saturating_sub(1),
                    self.world
                );
            }
        }

        self.mark_dirty();
        Ok(removed)
    }

    /// Renames a region, keeping its place in insertion order and
    /// rewriting the parent reference of its children.
    pub fn rename(&self, id: &str, new_id: &str) -> Result<Arc<Region>, RegionError> {
        check_id(new_id)?;
        if id.eq_ignore_ascii_case(GLOBAL_REGION_ID) || new_id.eq_ignore_ascii_case(GLOBAL_REGION_ID)
        {
            return Err(RegionError::ReservedIdViolation {
                id: id.to_string(),
                reason: "the global region cannot be renamed",
            });
        }

        let key = normalize_id(id);
        let new_key = normalize_id(new_id);
        let mut state = self.state.write();

        if !state.entries.contains_key(&key) {
            return Err(RegionError::not_found(id));
        }
        if new_key != key {
            if let Some(existing) = state.entries.get(&new_key) {
                return Err(RegionError::DuplicateId {
                    id: existing.region.id.clone(),
                });
            }
        }

        let entry = state.remove(&key).ok_or_else(|| RegionError::not_found(id))?;
        let mut region = (*entry.region).clone();
        region.id = new_id.to_string();
        let region = Arc::new(region);
        state.insert_at(new_key, region.clone(), entry.seq);
        state.reparent_children(&key, Some(new_id));

        self.mark_dirty();
        info!("Renamed region '{}' to '{}' in world '{}'", id, new_id, self.world);
        Ok(region)
    }

    /// Replaces a region's geometry and re-indexes it.
    pub fn redefine(&self, id: &str, geometry: Geometry) -> Result<Arc<Region>, RegionError> {
        check_geometry(id, &geometry)?;

        let key = normalize_id(id);
        let mut state = self.state.write();
        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| RegionError::not_found(id))?;

        let mut region = (*entry.region).clone();
        region.geometry = geometry;
        let region = Arc::new(region);
        entry.region = region.clone();
        state.grid.insert(&key, &region.geometry);

        self.mark_dirty();
        debug!("Redefined region '{}' in world '{}'", id, self.world);
        Ok(region)
    }

    /// Sets or clears a region's parent.
    pub fn set_parent(&self, id: &str, parent: Option<&str>) -> Result<(), RegionError> {
        let key = normalize_id(id);
        let mut state = self.state.write();
        if id.eq_ignore_ascii_case(GLOBAL_REGION_ID) {
            state.ensure_global();
        }

        let parent_id = match parent {
            Some(parent) => {
                let parent_key = normalize_id(parent);
                let parent_entry = state
                    .entries
                    .get(&parent_key)
                    .ok_or_else(|| RegionError::not_found(parent))?;
                let parent_id = parent_entry.region.id.clone();
                if !state.entries.contains_key(&key) {
                    return Err(RegionError::not_found(id));
                }
                state.check_ancestry(&key, &parent_key)?;
                Some(parent_id)
            }
            None => None,
        };

        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| RegionError::not_found(id))?;
        let mut region = (*entry.region).clone();
        region.parent = parent_id;
        entry.region = Arc::new(region);

        self.mark_dirty();
        Ok(())
    }

    /// Applies `f` to a copy of the region and swaps it in on success.
    ///
    /// References to the global region materialize it first.
    fn update<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Region) -> Result<T, RegionError>,
    ) -> Result<T, RegionError> {
        let key = normalize_id(id);
        let mut state = self.state.write();
        if key == GLOBAL_REGION_ID {
            state.ensure_global();
        }

        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| RegionError::not_found(id))?;
        let mut region = (*entry.region).clone();
        let out = f(&mut region)?;
        entry.region = Arc::new(region);

        self.mark_dirty();
        Ok(out)
    }

    pub fn set_priority(&self, id: &str, priority: i32) -> Result<(), RegionError> {
        self.update(id, |region| {
            region.priority = priority;
            Ok(())
        })
    }

    /// Parses `raw` with the flag's parser and stores the typed value.
    pub fn set_flag(
        &self,
        id: &str,
        flag: &FlagDef,
        raw: &str,
        ctx: &FlagContext,
    ) -> Result<FlagValue, RegionError> {
        let value = flag
            .parse_input(raw, ctx)
            .map_err(|source| RegionError::InvalidFlagFormat {
                flag: flag.name.clone(),
                source,
            })?;
        self.set_flag_value(id, flag, Some(value.clone()))?;
        Ok(value)
    }

    /// Stores an already typed value, or clears the flag with `None`.
    pub fn set_flag_value(
        &self,
        id: &str,
        flag: &FlagDef,
        value: Option<FlagValue>,
    ) -> Result<(), RegionError> {
        self.update(id, |region| {
            region.set_flag(&flag.name, value);
            Ok(())
        })
    }

    pub fn clear_flag(&self, id: &str, flag: &FlagDef) -> Result<(), RegionError> {
        self.set_flag_value(id, flag, None)
    }

    /// Restricts to whom the flag's value applies in this region.
    pub fn set_flag_group(
        &self,
        id: &str,
        flag: &FlagDef,
        group: Option<RegionGroup>,
    ) -> Result<(), RegionError> {
        self.update(id, |region| {
            region.set_flag_group(&flag.name, group);
            Ok(())
        })
    }

    pub fn add_owner(&self, id: &str, principal: Principal) -> Result<bool, RegionError> {
        self.update(id, |region| Ok(region.owners.add(principal)))
    }

    pub fn remove_owner(&self, id: &str, principal: &Principal) -> Result<bool, RegionError> {
        self.update(id, |region| Ok(region.owners.remove(principal)))
    }

    pub fn add_member(&self, id: &str, principal: Principal) -> Result<bool, RegionError> {
        self.update(id, |region| Ok(region.members.add(principal)))
    }

    pub fn remove_member(&self, id: &str, principal: &Principal) -> Result<bool, RegionError> {
        self.update(id, |region| Ok(region.members.remove(principal)))
    }

    /// Looks up a region by id, ignoring case.
    pub fn get(&self, id: &str) -> Option<Arc<Region>> {
        self.state
            .read()
            .entries
            .get(&normalize_id(id))
            .map(|e| e.region.clone())
    }

    pub fn has(&self, id: &str) -> bool {
        self.state.read().entries.contains_key(&normalize_id(id))
    }

    /// Looks up a region that must exist. The global region is created on
    /// first reference instead of failing.
    pub fn existing(&self, id: &str) -> Result<Arc<Region>, RegionError> {
        if let Some(region) = self.get(id) {
            return Ok(region);
        }
        if id.eq_ignore_ascii_case(GLOBAL_REGION_ID) {
            let global = self.state.write().ensure_global();
            self.mark_dirty();
            return Ok(global);
        }
        Err(RegionError::not_found(id))
    }

    /// Number of regions, including the global region once it exists.
    pub fn size(&self) -> usize {
        self.state.read().entries.len()
    }

    /// All regions in insertion order.
    pub fn regions(&self) -> Vec<Arc<Region>> {
        self.state.read().sorted()
    }

    /// Regions whose geometry shares at least one block with `geometry`,
    /// in insertion order.
    pub fn intersecting(&self, geometry: &Geometry) -> Vec<Arc<Region>> {
        let bounds = geometry.bounding_box();
        let state = self.state.read();
        let mut hits: Vec<&Entry> = state
            .grid
            .candidates_in(bounds.as_ref())
            .into_iter()
            .filter_map(|k| state.entries.get(k))
            .filter(|e| e.region.geometry.overlaps(geometry))
            .collect();
        hits.sort_by_key(|e| e.seq);
        hits.into_iter().map(|e| e.region.clone()).collect()
    }

    /// Snapshot of the regions covering `pos`.
    ///
    /// The read lock is held only while handles are copied out; ordering
    /// and any later flag resolution run on the snapshot.
    pub fn query(&self, pos: BlockPos, mode: QueryMode) -> ApplicableRegionSet {
        let (mut hits, ancestors) = {
            let state = self.state.read();

            let hits: Vec<(u64, Arc<Region>)> = state
                .grid
                .candidates_at(pos)
                .filter_map(|k| state.entries.get(k))
                .filter(|e| e.region.contains(pos))
                .map(|e| (e.seq, e.region.clone()))
                .collect();

            let mut ancestors: HashMap<String, Arc<Region>> = HashMap::new();
            for (_, region) in &hits {
                let mut parent = region.parent.as_deref().map(normalize_id);
                while let Some(key) = parent {
                    if ancestors.contains_key(&key) {
                        break;
                    }
                    let Some(entry) = state.entries.get(&key) else {
                        break;
                    };
                    parent = entry.region.parent.as_deref().map(normalize_id);
                    ancestors.insert(key, entry.region.clone());
                }
            }

            (hits, ancestors)
        };

        hits.sort_by_key(|(seq, _)| *seq);
        hits.dedup_by_key(|(seq, _)| *seq);
        ApplicableRegionSet::new(hits.into_iter().map(|(_, r)| r).collect(), ancestors, mode)
    }

    /// The single region a caller is standing in.
    ///
    /// The global region is ignored when choosing; if nothing else covers
    /// the point it is returned (created if needed) when `allow_global` is
    /// set. Regions tied at the top priority are reported, not tie-broken.
    pub fn region_at(&self, pos: BlockPos, allow_global: bool) -> Result<Arc<Region>, RegionError> {
        let set = self.query(pos, QueryMode::Sorted).without_global();
        match set.single() {
            Err(RegionError::NoApplicableRegion) if allow_global => {
                debug!("No region at {}, using the global region", pos);
                self.existing(GLOBAL_REGION_ID)
            }
            other => other,
        }
    }

    /// Copies of every region, in insertion order, for the store.
    pub fn snapshot(&self) -> Vec<Region> {
        self.regions().iter().map(|r| (**r).clone()).collect()
    }

    /// True if the index changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    fn mark_dirty(&self) {
        self.set_dirty(true);
    }
}
