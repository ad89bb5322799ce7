//! Turning an operator's selection into region geometry.

use std::collections::HashMap;

use region_types::{BlockPos, BlockPos2D, Geometry, Region};
use uuid::Uuid;

use crate::error::RegionError;

/// A shape picked by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Two opposite corners
    Cuboid { pos1: BlockPos, pos2: BlockPos },
    /// Outline plus a vertical band
    Polygon2D {
        points: Vec<BlockPos2D>,
        min_y: i32,
        max_y: i32,
    },
    /// Any other selection shape (sphere, cylinder, ...)
    Other(String),
}

impl Selection {
    /// Converts the selection to geometry for the region `id`.
    pub fn to_geometry(&self, id: &str) -> Result<Geometry, RegionError> {
        match self {
            Selection::Cuboid { pos1, pos2 } => Ok(Geometry::cuboid(*pos1, *pos2)),
            Selection::Polygon2D {
                points,
                min_y,
                max_y,
            } => Geometry::polygon(points.clone(), *min_y, *max_y).map_err(|source| {
                RegionError::InvalidGeometry {
                    id: id.to_string(),
                    source,
                }
            }),
            Selection::Other(kind) => Err(RegionError::GeometryUnsupported { kind: kind.clone() }),
        }
    }
}

/// Builds a new, flagless region from a selection.
pub fn region_from_selection(id: &str, selection: &Selection) -> Result<Region, RegionError> {
    Ok(Region::new(id, selection.to_geometry(id)?))
}

/// Per-player cuboid corners, reset when the player changes world.
#[derive(Debug, Default)]
pub struct SelectionStore {
    selections: HashMap<Uuid, (String, Option<BlockPos>, Option<BlockPos>)>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first or second corner.
    pub fn set_pos(&mut self, player: Uuid, world: &str, pos: BlockPos, is_first: bool) {
        let entry = self
            .selections
            .entry(player)
            .or_insert_with(|| (world.to_string(), None, None));
        if entry.0 != world {
            *entry = (world.to_string(), None, None);
        }
        if is_first {
            entry.1 = Some(pos);
        } else {
            entry.2 = Some(pos);
        }
    }

    /// The player's cuboid selection in `world`, once both corners are set.
    pub fn get(&self, player: &Uuid, world: &str) -> Option<Selection> {
        let (selected_world, pos1, pos2) = self.selections.get(player)?;
        if selected_world != world {
            return None;
        }
        Some(Selection::Cuboid {
            pos1: (*pos1)?,
            pos2: (*pos2)?,
        })
    }

    pub fn clear(&mut self, player: &Uuid) {
        self.selections.remove(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use region_types::GeometryError;

    #[test]
    fn test_cuboid_selection() {
        let selection = Selection::Cuboid {
            pos1: BlockPos::new(9, 9, 9),
            pos2: BlockPos::new(0, 0, 0),
        };
        let region = region_from_selection("shop", &selection).unwrap();

        assert_eq!(region.id, "shop");
        assert!(region.contains(BlockPos::new(5, 5, 5)));
        assert!(!region.contains(BlockPos::new(10, 0, 0)));
        assert!(region.flags.is_empty());
    }

    #[test]
    fn test_polygon_selection() {
        let selection = Selection::Polygon2D {
            points: vec![
                BlockPos2D::new(0, 0),
                BlockPos2D::new(10, 0),
                BlockPos2D::new(5, 10),
            ],
            min_y: 0,
            max_y: 20,
        };
        let region = region_from_selection("tri", &selection).unwrap();
        assert_eq!(region.geometry.kind(), "polygon");
        assert!(region.contains(BlockPos::new(5, 3, 5)));
    }

    #[test]
    fn test_polygon_needs_three_points() {
        let selection = Selection::Polygon2D {
            points: vec![BlockPos2D::new(0, 0), BlockPos2D::new(1, 1)],
            min_y: 0,
            max_y: 1,
        };
        assert_eq!(
            region_from_selection("line", &selection).unwrap_err(),
            RegionError::InvalidGeometry {
                id: "line".into(),
                source: GeometryError::TooFewPoints(2),
            }
        );
    }

    #[test]
    fn test_unsupported_selection() {
        let err = region_from_selection("ball", &Selection::Other("sphere".into())).unwrap_err();
        assert_eq!(err, RegionError::GeometryUnsupported { kind: "sphere".into() });
    }

    #[test]
    fn test_selection_store() {
        let mut store = SelectionStore::new();
        let player = Uuid::new_v4();

        store.set_pos(player, "overworld", BlockPos::new(0, 0, 0), true);
        assert!(store.get(&player, "overworld").is_none());

        store.set_pos(player, "overworld", BlockPos::new(5, 5, 5), false);
        assert!(store.get(&player, "overworld").is_some());
        assert!(store.get(&player, "nether").is_none());

        // Switching world starts over
        store.set_pos(player, "nether", BlockPos::new(1, 1, 1), true);
        assert!(store.get(&player, "nether").is_none());

        store.clear(&player);
        assert!(store.get(&player, "overworld").is_none());
    }
}
