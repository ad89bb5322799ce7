//! Region persistence.
//!
//! The container only talks to a [`RegionStore`]; the JSON store is the
//! reference implementation and [`MemoryStore`] backs tests.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;
use region_types::Region;
use thiserror::Error;
use tracing::debug;

use crate::config::StorageConfig;

/// File holding one world's regions inside its directory.
pub const REGIONS_FILE: &str = "regions.json";

/// Errors from a region store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// World name that cannot be used as a single directory name
    #[error("invalid world name '{0}'")]
    InvalidWorld(String),
    /// Failure injected or reported by a non-file backend
    #[error("{0}")]
    Backend(String),
}

/// Loads and saves every region of a world at once.
pub trait RegionStore: Send + Sync {
    /// Loads a world's regions. A world that was never saved has none.
    fn load_all(&self, world: &str) -> Result<Vec<Region>, StoreError>;

    /// Replaces the stored regions of a world.
    fn save_all(&self, world: &str, regions: &[Region]) -> Result<(), StoreError>;
}

/// Stores each world as `<directory>/<world>/regions.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    directory: PathBuf,
    pretty: bool,
}

impl JsonStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            pretty: true,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            pretty: config.pretty,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the regions file for a world.
    pub fn world_file(&self, world: &str) -> PathBuf {
        self.directory.join(world).join(REGIONS_FILE)
    }
}

/// A world maps to one directory under the store root and nothing else.
fn check_world_name(world: &str) -> Result<(), StoreError> {
    let mut components = Path::new(world).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || world.contains(['/', '\\', ':', '\0']) {
        return Err(StoreError::InvalidWorld(world.to_string()));
    }
    Ok(())
}

impl RegionStore for JsonStore {
    fn load_all(&self, world: &str) -> Result<Vec<Region>, StoreError> {
        check_world_name(world)?;
        let path = self.world_file(world);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No region file at {}, starting empty", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Writes to a temporary file next to the target and renames it over
    /// the old file, so readers never see a half-written world.
    fn save_all(&self, world: &str, regions: &[Region]) -> Result<(), StoreError> {
        check_world_name(world)?;
        let path = self.world_file(world);
        let dir = self.directory.join(world);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!("{}.tmp", REGIONS_FILE));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            if self.pretty {
                serde_json::to_writer_pretty(&mut writer, regions)?;
            } else {
                serde_json::to_writer(&mut writer, regions)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        debug!("Wrote {} region(s) to {}", regions.len(), path.display());
        Ok(())
    }
}

/// In-memory store with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    worlds: Mutex<HashMap<String, Vec<Region>>>,
    failing_loads: Mutex<HashSet<String>>,
    failing_saves: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored regions of a world without going through a save.
    pub fn put(&self, world: &str, regions: Vec<Region>) {
        self.worlds.lock().insert(world.to_string(), regions);
    }

    /// Stored regions of a world, if it was ever saved or put.
    pub fn stored(&self, world: &str) -> Option<Vec<Region>> {
        self.worlds.lock().get(world).cloned()
    }

    pub fn fail_loads(&self, world: &str, fail: bool) {
        toggle(&self.failing_loads, world, fail);
    }

    pub fn fail_saves(&self, world: &str, fail: bool) {
        toggle(&self.failing_saves, world, fail);
    }
}

fn toggle(set: &Mutex<HashSet<String>>, world: &str, on: bool) {
    let mut set = set.lock();
    if on {
        set.insert(world.to_string());
    } else {
        set.remove(world);
    }
}

impl RegionStore for MemoryStore {
    fn load_all(&self, world: &str) -> Result<Vec<Region>, StoreError> {
        if self.failing_loads.lock().contains(world) {
            return Err(StoreError::Backend(format!("load of '{}' refused", world)));
        }
        Ok(self.stored(world).unwrap_or_default())
    }

    fn save_all(&self, world: &str, regions: &[Region]) -> Result<(), StoreError> {
        if self.failing_saves.lock().contains(world) {
            return Err(StoreError::Backend(format!("save of '{}' refused", world)));
        }
        self.put(world, regions.to_vec());
        Ok(())
    }
}
