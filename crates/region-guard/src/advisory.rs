//! Non-fatal warnings about a region an operator just created or changed.
//!
//! None of these block the operation; callers decide how to show them.

use std::fmt;

use region_types::{Geometry, Region};

use crate::config::AdvisoryConfig;
use crate::container::RegionContainer;
use crate::index::RegionIndex;

/// A caller-visible warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The region is only this many blocks tall
    ShortHeight { blocks: i64 },
    /// The polygon outline encloses no area
    FlatFootprint,
    /// One of the first regions in the world; explain that it now protects
    NewUserHint { id: String },
    /// The region overlaps spawn protection the engine cannot override
    OverlapsSpawn,
    /// The region overlaps these existing regions
    OverlapsRegions { ids: Vec<String> },
    /// Saving has been failing for these worlds
    SaveFailures { worlds: Vec<String> },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ShortHeight { blocks } => {
                write!(f, "the region is only {} block(s) tall", blocks)
            }
            Advisory::FlatFootprint => write!(f, "the region outline has no area"),
            Advisory::NewUserHint { id } => write!(
                f,
                "this region is now protected from other players; to undo that, set 'passthrough' to allow on '{}'",
                id
            ),
            Advisory::OverlapsSpawn => write!(
                f,
                "the region overlaps spawn protection; only operators can build there"
            ),
            Advisory::OverlapsRegions { ids } => {
                write!(f, "the region overlaps: {}", ids.join(", "))
            }
            Advisory::SaveFailures { worlds } => {
                let quoted: Vec<String> = worlds.iter().map(|w| format!("'{}'", w)).collect();
                write!(f, "regions cannot be saved in: {}", quoted.join(", "))
            }
        }
    }
}

/// Warns about regions that are very short or have a flat outline.
pub fn check_dimensions(region: &Region, config: &AdvisoryConfig) -> Vec<Advisory> {
    let mut advisories = Vec::new();
    if let Some(bounds) = region.geometry.bounding_box() {
        let blocks = bounds.height();
        if blocks <= config.short_height_blocks {
            advisories.push(Advisory::ShortHeight { blocks });
        }
    }
    if region.geometry.has_flat_footprint() {
        advisories.push(Advisory::FlatFootprint);
    }
    advisories
}

/// Hint shown while the world holds only a few regions.
pub fn new_user_hint(index: &RegionIndex, region: &Region, config: &AdvisoryConfig) -> Option<Advisory> {
    (index.size() <= config.new_user_hint_max_regions).then(|| Advisory::NewUserHint {
        id: region.id.clone(),
    })
}

/// Warns if the region overlaps the given spawn protection area.
pub fn check_spawn_overlap(spawn: Option<&Geometry>, region: &Region) -> Option<Advisory> {
    spawn
        .filter(|spawn| spawn.overlaps(&region.geometry))
        .map(|_| Advisory::OverlapsSpawn)
}

/// Lists other bounded regions of the index the region overlaps.
pub fn check_overlaps(index: &RegionIndex, region: &Region) -> Option<Advisory> {
    let key = region.key();
    let ids: Vec<String> = index
        .intersecting(&region.geometry)
        .iter()
        .filter(|r| !r.is_global() && r.key() != key)
        .map(|r| r.id.clone())
        .collect();
    (!ids.is_empty()).then_some(Advisory::OverlapsRegions { ids })
}

/// Reports worlds whose last save failed.
pub fn save_failures(container: &RegionContainer) -> Option<Advisory> {
    let worlds = container.save_failures();
    (!worlds.is_empty()).then_some(Advisory::SaveFailures { worlds })
}

/// Every advisory for a region that was just added to `index`.
pub fn review_new_region(
    index: &RegionIndex,
    region: &Region,
    spawn: Option<&Geometry>,
    config: &AdvisoryConfig,
) -> Vec<Advisory> {
    let mut advisories = check_dimensions(region, config);
    advisories.extend(check_spawn_overlap(spawn, region));
    advisories.extend(check_overlaps(index, region));
    advisories.extend(new_user_hint(index, region, config));
    advisories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GuardConfig, IndexConfig};
    use crate::store::MemoryStore;
    use region_types::fixtures::cuboid_region;
    use region_types::{BlockPos, BlockPos2D};
    use std::sync::Arc;

    #[test]
    fn test_short_region() {
        let config = AdvisoryConfig::default();

        let slab = cuboid_region("slab", (0, 64, 0), (9, 66, 9));
        assert_eq!(
            check_dimensions(&slab, &config),
            vec![Advisory::ShortHeight { blocks: 3 }]
        );

        let room = cuboid_region("room", (0, 64, 0), (9, 67, 9));
        assert!(check_dimensions(&room, &config).is_empty());

        assert!(check_dimensions(&Region::global(), &config).is_empty());
    }

    #[test]
    fn test_flat_polygon() {
        let line = Region::new(
            "line",
            Geometry::polygon(
                vec![
                    BlockPos2D::new(0, 0),
                    BlockPos2D::new(5, 5),
                    BlockPos2D::new(10, 10),
                ],
                0,
                100,
            )
            .unwrap(),
        );
        assert_eq!(
            check_dimensions(&line, &AdvisoryConfig::default()),
            vec![Advisory::FlatFootprint]
        );
    }

    #[test]
    fn test_new_user_hint_only_for_first_regions() {
        let index = RegionIndex::new("world", &IndexConfig::default());
        let config = AdvisoryConfig::default();
        let first = index.add(cuboid_region("first", (0, 0, 0), (9, 9, 9))).unwrap();

        assert!(new_user_hint(&index, &first, &config).is_some());

        index.add(cuboid_region("second", (20, 0, 20), (29, 9, 29))).unwrap();
        let third = index.add(cuboid_region("third", (40, 0, 40), (49, 9, 49))).unwrap();
        assert!(new_user_hint(&index, &third, &config).is_none());
    }

    #[test]
    fn test_overlap_checks() {
        let index = RegionIndex::new("world", &IndexConfig::default());
        index.existing(region_types::GLOBAL_REGION_ID).unwrap();
        index.add(cuboid_region("market", (0, 0, 0), (20, 20, 20))).unwrap();
        let stall = index.add(cuboid_region("stall", (5, 0, 5), (8, 5, 8))).unwrap();

        assert_eq!(
            check_overlaps(&index, &stall),
            Some(Advisory::OverlapsRegions {
                ids: vec!["market".into()]
            })
        );

        let spawn = Geometry::cuboid(BlockPos::new(-16, 0, -16), BlockPos::new(6, 255, 6));
        assert_eq!(check_spawn_overlap(Some(&spawn), &stall), Some(Advisory::OverlapsSpawn));
        assert_eq!(check_spawn_overlap(None, &stall), None);

        let advisories = review_new_region(&index, &stall, Some(&spawn), &AdvisoryConfig::default());
        assert!(advisories.contains(&Advisory::OverlapsSpawn));
        assert!(!advisories.iter().any(|a| matches!(a, Advisory::NewUserHint { .. })));
    }

    #[test]
    fn test_save_failure_advisory() {
        let store = Arc::new(MemoryStore::new());
        let container = RegionContainer::new(store.clone(), GuardConfig::default());
        let index = container.load_world("overworld").unwrap();
        assert!(save_failures(&container).is_none());

        index.add(cuboid_region("a", (0, 0, 0), (1, 1, 1))).unwrap();
        store.fail_saves("overworld", true);
        container.save_all();

        let advisory = save_failures(&container).unwrap();
        assert_eq!(advisory.to_string(), "regions cannot be saved in: 'overworld'");
    }
}
