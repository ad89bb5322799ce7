//! Sample data fixtures for testing.
//!
//! This module provides ready-made regions for other crates to use.
//! Enable the `test-fixtures` feature to access these helpers.
//!
//! # Example
//!
//! ```ignore
//! // In your Cargo.toml:
//! // [dev-dependencies]
//! // region-types = { path = "../region-types", features = ["test-fixtures"] }
//!
//! use region_types::fixtures;
//!
//! let regions = fixtures::sample_regions();
//! ```

use crate::geometry::{BlockPos, Geometry};
use crate::region::Region;

/// Returns the sample world from the fixtures file.
///
/// Contains 5 regions:
/// - `__global__` denying tnt
/// - `spawn` (cuboid, priority 10) denying build
/// - `Town` (polygon, priority 1) denying build and pvp
/// - `shop` (cuboid, priority 5) inside the town, child of `Town`
/// - `arena` (cuboid, priority 5) inside the town, allowing pvp
pub fn sample_regions() -> Vec<Region> {
    let json = include_str!("../tests/fixtures/sample_regions.json");
    serde_json::from_str(json).expect("Failed to parse sample_regions.json")
}

/// A point inside both `Town` and `shop`.
pub const SHOP_POINT: BlockPos = BlockPos::new(155, 64, 155);

/// A point inside both `Town` and `arena`.
pub const ARENA_POINT: BlockPos = BlockPos::new(260, 70, 260);

/// A point only the global region covers.
pub const WILDERNESS_POINT: BlockPos = BlockPos::new(5000, 64, -5000);

/// Creates a cuboid region from two corners.
pub fn cuboid_region(id: &str, min: (i32, i32, i32), max: (i32, i32, i32)) -> Region {
    Region::new(
        id,
        Geometry::cuboid(
            BlockPos::new(min.0, min.1, min.2),
            BlockPos::new(max.0, max.1, max.2),
        ),
    )
}
