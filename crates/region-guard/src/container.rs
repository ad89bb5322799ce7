//! Per-world ownership of region indexes.
//!
//! The container maps world names to `Arc<RegionIndex>` through an
//! [`ArcSwap`], so lookups never block and a reload replaces each world's
//! index in one atomic swap. Queries that already hold the old index finish
//! against it.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use region_types::BlockPos;
use tracing::{debug, info, warn};

use crate::config::GuardConfig;
use crate::error::RegionError;
use crate::index::RegionIndex;
use crate::query::{ApplicableRegionSet, QueryMode};
use crate::store::{RegionStore, StoreError};

type WorldMap = HashMap<String, Arc<RegionIndex>>;

/// Outcome of a reload pass.
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Worlds whose index was replaced
    pub reloaded: Vec<String>,
    /// Worlds that kept their previous index, with the reason
    pub failed: Vec<(String, RegionError)>,
    /// Worlds not reached before cancellation
    pub skipped: Vec<String>,
}

impl ReloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Outcome of a save pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Worlds written to the store
    pub saved: Vec<String>,
    /// Worlds whose save failed
    pub failed: Vec<String>,
}

/// Owns the region index of every loaded world.
pub struct RegionContainer {
    store: Arc<dyn RegionStore>,
    config: GuardConfig,
    worlds: ArcSwap<WorldMap>,
    save_failures: Mutex<BTreeSet<String>>,
}

impl RegionContainer {
    pub fn new(store: Arc<dyn RegionStore>, config: GuardConfig) -> Self {
        Self {
            store,
            config,
            worlds: ArcSwap::from_pointee(HashMap::new()),
            save_failures: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    fn persistence_error(world: &str, err: StoreError) -> RegionError {
        RegionError::PersistenceFailure {
            world: world.to_string(),
            message: err.to_string(),
        }
    }

    fn read_world(&self, world: &str) -> Result<RegionIndex, RegionError> {
        let regions = self
            .store
            .load_all(world)
            .map_err(|e| Self::persistence_error(world, e))?;
        Ok(RegionIndex::from_regions(world, &self.config.index, regions))
    }

    /// Loads a world from the store.
    ///
    /// A world that is already loaded keeps its index, unsaved changes
    /// included. Use [`reload`](Self::reload) to re-read it.
    pub fn load_world(&self, world: &str) -> Result<Arc<RegionIndex>, RegionError> {
        if let Some(index) = self.get(world) {
            debug!("World '{}' is already loaded", world);
            return Ok(index);
        }

        let fresh = Arc::new(self.read_world(world)?);
        // Another caller may have loaded the world while this one was reading
        let previous = self.worlds.rcu(|current| {
            let mut next = WorldMap::clone(current);
            next.entry(world.to_string()).or_insert_with(|| fresh.clone());
            next
        });
        if let Some(index) = previous.get(world) {
            return Ok(index.clone());
        }
        info!("Loaded {} region(s) for world '{}'", fresh.size(), world);
        Ok(fresh)
    }

    /// Saves a world if needed and drops its index.
    ///
    /// A failed save keeps the world loaded so no changes are lost.
    pub fn unload_world(&self, world: &str) -> Result<(), RegionError> {
        self.save_world(world)?;
        self.worlds.rcu(|current| {
            let mut next = WorldMap::clone(current);
            next.remove(world);
            next
        });
        self.save_failures.lock().remove(world);
        info!("Unloaded world '{}'", world);
        Ok(())
    }

    /// The index of a loaded world.
    pub fn index(&self, world: &str) -> Result<Arc<RegionIndex>, RegionError> {
        self.get(world).ok_or_else(|| RegionError::WorldNotLoaded {
            world: world.to_string(),
        })
    }

    pub fn get(&self, world: &str) -> Option<Arc<RegionIndex>> {
        self.worlds.load().get(world).cloned()
    }

    /// Names of loaded worlds, sorted.
    pub fn loaded_worlds(&self) -> Vec<String> {
        let mut worlds: Vec<String> = self.worlds.load().keys().cloned().collect();
        worlds.sort();
        worlds
    }

    /// Regions covering a point of a loaded world.
    pub fn query_at(
        &self,
        world: &str,
        pos: BlockPos,
        mode: QueryMode,
    ) -> Result<ApplicableRegionSet, RegionError> {
        Ok(self.index(world)?.query(pos, mode))
    }

    /// Re-reads every loaded world from the store.
    pub fn reload(&self) -> ReloadReport {
        self.reload_until(&AtomicBool::new(false))
    }

    /// Re-reads loaded worlds one at a time until `cancel` is set.
    ///
    /// Unsaved changes are written before a world is re-read; a world whose
    /// save or load fails keeps its current index.
    pub fn reload_until(&self, cancel: &AtomicBool) -> ReloadReport {
        let mut report = ReloadReport::default();
        let worlds = self.loaded_worlds();
        info!("Reloading {} world(s)", worlds.len());

        for (i, world) in worlds.iter().enumerate() {
            if cancel.load(Ordering::Acquire) {
                report.skipped.extend(worlds[i..].iter().cloned());
                warn!("Reload cancelled, {} world(s) skipped", report.skipped.len());
                break;
            }

            if let Err(e) = self.save_world(world) {
                warn!("Not reloading world '{}': {}", world, e);
                report.failed.push((world.clone(), e));
                continue;
            }

            match self.read_world(world) {
                Ok(index) => {
                    let index = Arc::new(index);
                    self.worlds.rcu(|current| {
                        let mut next = WorldMap::clone(current);
                        // Unloaded while we were reading
                        if next.contains_key(world.as_str()) {
                            next.insert(world.clone(), index.clone());
                        }
                        next
                    });
                    debug!("Reloaded world '{}' with {} region(s)", world, index.size());
                    report.reloaded.push(world.clone());
                }
                Err(e) => {
                    warn!("Keeping previous regions for world '{}': {}", world, e);
                    report.failed.push((world.clone(), e));
                }
            }
        }

        report
    }

    /// Saves one world if it has unsaved changes.
    ///
    /// Returns whether anything was written. A failure is recorded in
    /// [`save_failures`](Self::save_failures) until a later save succeeds.
    pub fn save_world(&self, world: &str) -> Result<bool, RegionError> {
        let index = self.index(world)?;
        if !index.is_dirty() {
            return Ok(false);
        }

        // Cleared first so changes racing with the write stay dirty
        index.set_dirty(false);
        match self.store.save_all(world, &index.snapshot()) {
            Ok(()) => {
                self.save_failures.lock().remove(world);
                debug!("Saved world '{}'", world);
                Ok(true)
            }
            Err(e) => {
                index.set_dirty(true);
                self.save_failures.lock().insert(world.to_string());
                warn!("Failed to save regions for world '{}': {}", world, e);
                Err(Self::persistence_error(world, e))
            }
        }
    }

    /// Saves every loaded world with unsaved changes.
    pub fn save_all(&self) -> SaveReport {
        let mut report = SaveReport::default();
        for world in self.loaded_worlds() {
            match self.save_world(&world) {
                Ok(true) => report.saved.push(world),
                Ok(false) => {}
                Err(_) => report.failed.push(world),
            }
        }
        report
    }

    /// Worlds whose most recent save failed, sorted.
    pub fn save_failures(&self) -> Vec<String> {
        self.save_failures.lock().iter().cloned().collect()
    }
}
