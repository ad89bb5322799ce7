//! Errors returned by the region engine.

use region_types::{FlagParseError, GeometryError};
use thiserror::Error;

/// Errors that can occur in index, query and container operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegionError {
    /// Id contains characters outside the allowed set
    #[error("invalid region id '{id}': use letters, digits and _ , ' - + /")]
    InvalidId { id: String },

    /// Id collides, ignoring case, with an existing region
    #[error("a region named '{id}' already exists")]
    DuplicateId { id: String },

    /// No region with this id
    #[error("no region named '{id}'")]
    NotFound { id: String },

    /// Operation would break the single world-wide region
    #[error("'{id}': {reason}")]
    ReservedIdViolation { id: String, reason: &'static str },

    /// Several regions tie at the top priority where one was expected
    #[error("several regions apply here, pick one of: {}", .ids.join(", "))]
    AmbiguousQuery { ids: Vec<String> },

    /// No region covers the queried point
    #[error("no region applies at this location")]
    NoApplicableRegion,

    /// Raw input could not be parsed into the flag's value type
    #[error("invalid value for flag '{flag}': {source}")]
    InvalidFlagFormat {
        flag: String,
        #[source]
        source: FlagParseError,
    },

    /// Flag name is not registered
    #[error("unknown flag '{name}'")]
    UnknownFlag { name: String },

    /// A selection shape has no region geometry counterpart
    #[error("only cuboids and polygons can be protected, got '{kind}'")]
    GeometryUnsupported { kind: String },

    /// Geometry violates a shape invariant
    #[error("invalid geometry for '{id}': {source}")]
    InvalidGeometry {
        id: String,
        #[source]
        source: GeometryError,
    },

    /// Parent assignment would make a region its own ancestor
    #[error("setting '{parent}' as parent of '{id}' would create a cycle")]
    CircularInheritance { id: String, parent: String },

    /// World has no loaded index
    #[error("regions are not loaded for world '{world}'")]
    WorldNotLoaded { world: String },

    /// Loading or saving through the store failed
    #[error("failed to persist regions for world '{world}': {message}")]
    PersistenceFailure { world: String, message: String },
}

impl RegionError {
    pub(crate) fn not_found(id: &str) -> Self {
        RegionError::NotFound { id: id.to_string() }
    }
}
