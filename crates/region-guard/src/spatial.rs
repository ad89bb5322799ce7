//! Column grid used to prune point and overlap lookups.
//!
//! The horizontal plane is cut into square cells `2^shift` blocks wide.
//! Each bounded region is registered in every cell its bounding box touches;
//! a point lookup hashes to one cell and only tests the keys listed there.
//! Regions too large to register cell by cell (and the global region) are
//! kept in a separate list that every lookup scans.

use std::collections::{HashMap, HashSet};

use region_types::{BlockPos, BoundingBox, Geometry};

type Cell = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Cells { min: Cell, max: Cell },
    Wide,
}

#[derive(Debug, Clone)]
pub(crate) struct SpatialGrid {
    shift: u8,
    max_cells: u64,
    cells: HashMap<Cell, Vec<String>>,
    wide: Vec<String>,
    placement: HashMap<String, Placement>,
}

impl SpatialGrid {
    pub(crate) fn new(shift: u8, max_cells: usize) -> Self {
        Self {
            shift: shift.min(30),
            max_cells: max_cells.max(1) as u64,
            cells: HashMap::new(),
            wide: Vec::new(),
            placement: HashMap::new(),
        }
    }

    fn cell_of(&self, x: i32, z: i32) -> Cell {
        (x >> self.shift, z >> self.shift)
    }

    fn cell_span(&self, bounds: &BoundingBox) -> (Cell, Cell) {
        (
            self.cell_of(bounds.min.x, bounds.min.z),
            self.cell_of(bounds.max.x, bounds.max.z),
        )
    }

    fn cell_count(min: Cell, max: Cell) -> u64 {
        let w = (i64::from(max.0) - i64::from(min.0) + 1) as u64;
        let h = (i64::from(max.1) - i64::from(min.1) + 1) as u64;
        w.saturating_mul(h)
    }

    /// Registers a region under `key`, replacing any previous placement.
    pub(crate) fn insert(&mut self, key: &str, geometry: &Geometry) {
        self.remove(key);

        let placement = match geometry.bounding_box() {
            Some(bounds) => {
                let (min, max) = self.cell_span(&bounds);
                if Self::cell_count(min, max) > self.max_cells {
                    Placement::Wide
                } else {
                    Placement::Cells { min, max }
                }
            }
            None => Placement::Wide,
        };

        match placement {
            Placement::Cells { min, max } => {
                for cx in min.0..=max.0 {
                    for cz in min.1..=max.1 {
                        self.cells.entry((cx, cz)).or_default().push(key.to_string());
                    }
                }
            }
            Placement::Wide => self.wide.push(key.to_string()),
        }
        self.placement.insert(key.to_string(), placement);
    }

    /// Unregisters `key`. Unknown keys are ignored.
    pub(crate) fn remove(&mut self, key: &str) {
        let Some(placement) = self.placement.remove(key) else {
            return;
        };
        match placement {
            Placement::Cells { min, max } => {
                for cx in min.0..=max.0 {
                    for cz in min.1..=max.1 {
                        if let Some(keys) = self.cells.get_mut(&(cx, cz)) {
                            keys.retain(|k| k != key);
                            if keys.is_empty() {
                                self.cells.remove(&(cx, cz));
                            }
                        }
                    }
                }
            }
            Placement::Wide => self.wide.retain(|k| k != key),
        }
    }

    /// Keys whose bounding box may contain `pos`. Each key appears once.
    pub(crate) fn candidates_at(&self, pos: BlockPos) -> impl Iterator<Item = &str> {
        let cell = self.cell_of(pos.x, pos.z);
        self.cells
            .get(&cell)
            .into_iter()
            .flatten()
            .chain(self.wide.iter())
            .map(String::as_str)
    }

    /// Keys whose bounding box may intersect `bounds`; `None` means unbounded.
    pub(crate) fn candidates_in(&self, bounds: Option<&BoundingBox>) -> HashSet<&str> {
        let span = bounds
            .map(|b| self.cell_span(b))
            .filter(|(min, max)| Self::cell_count(*min, *max) <= self.max_cells);

        let Some((min, max)) = span else {
            return self.placement.keys().map(String::as_str).collect();
        };

        let mut found: HashSet<&str> = self.wide.iter().map(String::as_str).collect();
        for cx in min.0..=max.0 {
            for cz in min.1..=max.1 {
                if let Some(keys) = self.cells.get(&(cx, cz)) {
                    found.extend(keys.iter().map(String::as_str));
                }
            }
        }
        found
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.placement.len()
    }

    #[cfg(test)]
    fn wide_len(&self) -> usize {
        self.wide.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuboid(min: (i32, i32, i32), max: (i32, i32, i32)) -> Geometry {
        Geometry::cuboid(
            BlockPos::new(min.0, min.1, min.2),
            BlockPos::new(max.0, max.1, max.2),
        )
    }

    #[test]
    fn test_point_candidates_are_local() {
        let mut grid = SpatialGrid::new(4, 4096);
        grid.insert("a", &cuboid((0, 0, 0), (15, 10, 15)));
        grid.insert("b", &cuboid((100, 0, 100), (120, 10, 120)));

        let near_a: Vec<&str> = grid.candidates_at(BlockPos::new(3, 5, 3)).collect();
        assert_eq!(near_a, vec!["a"]);

        let near_b: Vec<&str> = grid.candidates_at(BlockPos::new(110, 5, 110)).collect();
        assert_eq!(near_b, vec!["b"]);
    }

    #[test]
    fn test_negative_coordinates_use_floor_cells() {
        let mut grid = SpatialGrid::new(4, 4096);
        grid.insert("neg", &cuboid((-16, 0, -16), (-1, 0, -1)));

        assert_eq!(grid.candidates_at(BlockPos::new(-1, 0, -1)).count(), 1);
        assert_eq!(grid.candidates_at(BlockPos::new(0, 0, 0)).count(), 0);
    }

    #[test]
    fn test_global_and_huge_regions_are_wide() {
        let mut grid = SpatialGrid::new(4, 16);
        grid.insert("__global__", &Geometry::Global);
        grid.insert("huge", &cuboid((-10_000, 0, -10_000), (10_000, 255, 10_000)));
        grid.insert("small", &cuboid((0, 0, 0), (5, 5, 5)));

        assert_eq!(grid.wide_len(), 2);
        let at_origin: HashSet<&str> = grid.candidates_at(BlockPos::new(1, 1, 1)).collect();
        assert_eq!(at_origin.len(), 3);
    }

    #[test]
    fn test_remove_and_reinsert() {
        let mut grid = SpatialGrid::new(4, 4096);
        grid.insert("a", &cuboid((0, 0, 0), (40, 10, 40)));
        grid.remove("a");
        assert_eq!(grid.len(), 0);
        assert_eq!(grid.candidates_at(BlockPos::new(20, 0, 20)).count(), 0);

        grid.insert("a", &cuboid((0, 0, 0), (5, 5, 5)));
        grid.insert("a", &cuboid((200, 0, 200), (205, 5, 205)));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.candidates_at(BlockPos::new(1, 0, 1)).count(), 0);
        assert_eq!(grid.candidates_at(BlockPos::new(201, 0, 201)).count(), 1);
    }

    #[test]
    fn test_candidates_in_bounds() {
        let mut grid = SpatialGrid::new(4, 4096);
        grid.insert("a", &cuboid((0, 0, 0), (10, 10, 10)));
        grid.insert("b", &cuboid((500, 0, 500), (510, 10, 510)));
        grid.insert("g", &Geometry::Global);

        let bounds = BoundingBox::from_corners(BlockPos::new(5, 0, 5), BlockPos::new(20, 0, 20));
        let found = grid.candidates_in(Some(&bounds));
        assert!(found.contains("a"));
        assert!(found.contains("g"));
        assert!(!found.contains("b"));

        assert_eq!(grid.candidates_in(None).len(), 3);
    }
}
