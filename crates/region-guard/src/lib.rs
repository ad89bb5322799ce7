//! Region protection engine.
//!
//! Holds the protected regions of each world, finds the regions covering a
//! point and resolves a flag to one effective value when several regions
//! overlap or inherit from each other.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  index(world)  ┌─────────────┐  query(pos)  ┌──────────────────────┐
//! │ RegionContainer│ ─────────────▶ │ RegionIndex │ ───────────▶ │ ApplicableRegionSet  │
//! └────────────────┘                └─────────────┘              └──────────────────────┘
//!         │ load/save                                               resolve / is_member
//!         ▼
//!   dyn RegionStore
//! ```
//!
//! # Modules
//!
//! - [`index`]: Per-world region set with CRUD and point lookup
//! - [`query`]: Query snapshots and flag resolution
//! - [`container`]: Loaded worlds, reload and save tracking
//! - [`store`]: Persistence trait with JSON and in-memory stores
//! - [`selection`]: Operator selections to region geometry
//! - [`advisory`]: Non-fatal warnings for new regions
//! - [`config`]: TOML configuration

pub mod advisory;
pub mod config;
pub mod container;
pub mod error;
pub mod index;
pub mod query;
pub mod selection;
pub mod store;

mod spatial;

// Re-export engine types
pub use container::{RegionContainer, ReloadReport, SaveReport};
pub use error::RegionError;
pub use index::{RegionIndex, RemovalStrategy};
pub use query::{ApplicableRegionSet, FlagDecision, QueryMode};

// Re-export persistence types
pub use store::{JsonStore, MemoryStore, RegionStore, StoreError, REGIONS_FILE};

// Re-export selection and advisory types
pub use advisory::{review_new_region, Advisory};
pub use selection::{region_from_selection, Selection, SelectionStore};

// Re-export config types
pub use config::{
    default_config_toml, AdvisoryConfig, ConfigError, GuardConfig, IndexConfig, StorageConfig,
};

/// Looks up a flag definition, failing with [`RegionError::UnknownFlag`].
pub fn lookup_flag<'a>(
    registry: &'a region_types::FlagRegistry,
    name: &str,
) -> Result<&'a region_types::FlagDef, RegionError> {
    registry.get(name).ok_or_else(|| RegionError::UnknownFlag {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use region_types::FlagRegistry;

    #[test]
    fn test_lookup_flag() {
        let registry = FlagRegistry::with_builtins();

        assert_eq!(lookup_flag(&registry, "PvP").unwrap().name, "pvp");
        assert_eq!(
            lookup_flag(&registry, "fly").unwrap_err(),
            RegionError::UnknownFlag { name: "fly".into() }
        );
    }
}
