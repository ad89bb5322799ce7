//! Shared region types for the protection engine.
//!
//! This crate contains pure data structures: geometry, flags, membership
//! and the region entity itself. It has no indexing or locking logic and
//! is a dependency of the engine crate.

pub mod flag;
pub mod geometry;
pub mod region;
pub mod subject;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-export geometry types
pub use geometry::{BlockPos, BlockPos2D, BoundingBox, Cuboid, Geometry, GeometryError, Polygon};

// Re-export flag types
pub use flag::{
    builtin_flags, Association, Combine, FlagContext, FlagDef, FlagKind, FlagParseError,
    FlagRegistry, FlagValue, RegionGroup, State,
};

// Re-export region types
pub use region::{is_valid_id, normalize_id, Region, GLOBAL_REGION_ID};

// Re-export subject types
pub use subject::{DomainSet, Principal, Subject};
