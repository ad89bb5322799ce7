//! Region geometry.
//!
//! Block-granular shapes a region can occupy: an axis-aligned cuboid, a
//! polygon extruded vertically between two heights, or the whole world.
//! All bounds are inclusive on both ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A block position in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Drops the vertical axis.
    pub const fn to_2d(self) -> BlockPos2D {
        BlockPos2D::new(self.x, self.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A column position (x, z) used for polygon outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos2D {
    pub x: i32,
    pub z: i32,
}

impl BlockPos2D {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Inclusive axis-aligned bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl BoundingBox {
    /// Builds bounds from two arbitrary corners.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Height in blocks (a single layer is 1).
    pub fn height(&self) -> i64 {
        i64::from(self.max.y) - i64::from(self.min.y) + 1
    }
}

/// Errors for malformed shapes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// Polygons need at least three outline points
    #[error("polygon needs at least 3 points, got {0}")]
    TooFewPoints(usize),

    /// Minimum corner lies above the maximum corner on some axis
    #[error("minimum corner {min} exceeds maximum corner {max}")]
    InvertedBounds { min: BlockPos, max: BlockPos },

    /// Polygon vertical band is inverted
    #[error("polygon band is inverted: min_y {min_y} > max_y {max_y}")]
    InvertedBand { min_y: i32, max_y: i32 },
}

/// Axis-aligned box between two inclusive corners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cuboid {
    pub min: BlockPos,
    pub max: BlockPos,
}

/// Polygon outline on the horizontal plane, extruded from `min_y` to `max_y`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<BlockPos2D>,
    pub min_y: i32,
    pub max_y: i32,
}

/// The space a region occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Geometry {
    Cuboid(Cuboid),
    Polygon(Polygon),
    /// Covers every point of the world
    Global,
}

impl Geometry {
    /// Creates a cuboid from two arbitrary corners.
    pub fn cuboid(a: BlockPos, b: BlockPos) -> Self {
        let bounds = BoundingBox::from_corners(a, b);
        Geometry::Cuboid(Cuboid {
            min: bounds.min,
            max: bounds.max,
        })
    }

    /// Creates a vertically extruded polygon. The band is normalized so the
    /// two heights may be given in any order.
    pub fn polygon(points: Vec<BlockPos2D>, y1: i32, y2: i32) -> Result<Self, GeometryError> {
        if points.len() < 3 {
            return Err(GeometryError::TooFewPoints(points.len()));
        }
        Ok(Geometry::Polygon(Polygon {
            points,
            min_y: y1.min(y2),
            max_y: y1.max(y2),
        }))
    }

    /// Checks shape invariants. Used on data that did not go through the
    /// normalizing constructors (deserialized input).
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Cuboid(c) => {
                if c.min.x > c.max.x || c.min.y > c.max.y || c.min.z > c.max.z {
                    return Err(GeometryError::InvertedBounds {
                        min: c.min,
                        max: c.max,
                    });
                }
                Ok(())
            }
            Geometry::Polygon(p) => {
                if p.points.len() < 3 {
                    return Err(GeometryError::TooFewPoints(p.points.len()));
                }
                if p.min_y > p.max_y {
                    return Err(GeometryError::InvertedBand {
                        min_y: p.min_y,
                        max_y: p.max_y,
                    });
                }
                Ok(())
            }
            Geometry::Global => Ok(()),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Geometry::Global)
    }

    /// Short type name, as shown to operators.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Cuboid(_) => "cuboid",
            Geometry::Polygon(_) => "polygon",
            Geometry::Global => "global",
        }
    }

    /// Bounding box of the shape; `None` for the unbounded global shape.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Cuboid(c) => Some(BoundingBox {
                min: c.min,
                max: c.max,
            }),
            Geometry::Polygon(p) => {
                let first = p.points.first()?;
                let (mut min_x, mut max_x, mut min_z, mut max_z) =
                    (first.x, first.x, first.z, first.z);
                for pt in &p.points[1..] {
                    min_x = min_x.min(pt.x);
                    max_x = max_x.max(pt.x);
                    min_z = min_z.min(pt.z);
                    max_z = max_z.max(pt.z);
                }
                Some(BoundingBox {
                    min: BlockPos::new(min_x, p.min_y, min_z),
                    max: BlockPos::new(max_x, p.max_y, max_z),
                })
            }
            Geometry::Global => None,
        }
    }

    /// Horizontal outline of a bounded shape.
    pub fn outline(&self) -> Vec<BlockPos2D> {
        match self {
            Geometry::Cuboid(c) => vec![
                BlockPos2D::new(c.min.x, c.min.z),
                BlockPos2D::new(c.max.x, c.min.z),
                BlockPos2D::new(c.max.x, c.max.z),
                BlockPos2D::new(c.min.x, c.max.z),
            ],
            Geometry::Polygon(p) => p.points.clone(),
            Geometry::Global => Vec::new(),
        }
    }

    /// Returns true if the block position lies inside the shape.
    pub fn contains(&self, pos: BlockPos) -> bool {
        match self {
            Geometry::Cuboid(c) => BoundingBox {
                min: c.min,
                max: c.max,
            }
            .contains(pos),
            Geometry::Polygon(p) => {
                pos.y >= p.min_y && pos.y <= p.max_y && polygon_contains(&p.points, pos.to_2d())
            }
            Geometry::Global => true,
        }
    }

    /// Returns true if the two shapes share at least one block.
    pub fn overlaps(&self, other: &Geometry) -> bool {
        let (Some(a), Some(b)) = (self.bounding_box(), other.bounding_box()) else {
            return true;
        };
        if !a.intersects(&b) {
            return false;
        }

        let outline_a = self.outline();
        let outline_b = other.outline();

        if outline_a.iter().any(|&pt| polygon_contains(&outline_b, pt))
            || outline_b.iter().any(|&pt| polygon_contains(&outline_a, pt))
        {
            return true;
        }

        // Bound to a local so the iterator is dropped before the outlines
        let crossing = edges(&outline_a).any(|(a1, a2)| {
            edges(&outline_b).any(|(b1, b2)| segments_intersect(a1, a2, b1, b2))
        });
        crossing
    }

    /// True when the horizontal footprint has no area (collinear outline).
    pub fn has_flat_footprint(&self) -> bool {
        match self {
            Geometry::Polygon(p) => twice_area(&p.points) == 0,
            Geometry::Cuboid(_) | Geometry::Global => false,
        }
    }
}

fn edges(points: &[BlockPos2D]) -> impl Iterator<Item = (BlockPos2D, BlockPos2D)> + '_ {
    let n = points.len();
    (0..n).map(move |i| (points[i], points[(i + 1) % n]))
}

// Products of coordinate differences need more than 64 bits near the i32 limits
fn cross(o: BlockPos2D, a: BlockPos2D, b: BlockPos2D) -> i128 {
    let (ox, oz) = (i128::from(o.x), i128::from(o.z));
    (i128::from(a.x) - ox) * (i128::from(b.z) - oz) - (i128::from(a.z) - oz) * (i128::from(b.x) - ox)
}

fn on_segment(a: BlockPos2D, b: BlockPos2D, p: BlockPos2D) -> bool {
    cross(a, b, p) == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.z >= a.z.min(b.z)
        && p.z <= a.z.max(b.z)
}

fn segments_intersect(a1: BlockPos2D, a2: BlockPos2D, b1: BlockPos2D, b2: BlockPos2D) -> bool {
    let d1 = cross(b1, b2, a1).signum();
    let d2 = cross(b1, b2, a2).signum();
    let d3 = cross(a1, a2, b1).signum();
    let d4 = cross(a1, a2, b2).signum();

    if d1 != d2 && d3 != d4 && d1 != 0 && d2 != 0 && d3 != 0 && d4 != 0 {
        return true;
    }

    on_segment(b1, b2, a1) || on_segment(b1, b2, a2) || on_segment(a1, a2, b1) || on_segment(a1, a2, b2)
}

fn twice_area(points: &[BlockPos2D]) -> i128 {
    edges(points)
        .map(|(a, b)| i128::from(a.x) * i128::from(b.z) - i128::from(b.x) * i128::from(a.z))
        .sum::<i128>()
        .abs()
}

/// Even-odd point-in-polygon test. Points on an edge or vertex are inside.
fn polygon_contains(points: &[BlockPos2D], pt: BlockPos2D) -> bool {
    if points.len() < 3 {
        return false;
    }

    let (x, z) = (i128::from(pt.x), i128::from(pt.z));
    let mut inside = false;

    for (a, b) in edges(points) {
        if on_segment(a, b, pt) {
            return true;
        }

        let (ax, az) = (i128::from(a.x), i128::from(a.z));
        let (bx, bz) = (i128::from(b.x), i128::from(b.z));

        if (az > z) != (bz > z) {
            // Crossing test against the edge's x at height z, kept in integers
            let dz = bz - az;
            let lhs = (x - ax) * dz;
            let rhs = (z - az) * (bx - ax);
            let crosses = if dz > 0 { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: i32, z0: i32, x1: i32, z1: i32) -> Vec<BlockPos2D> {
        vec![
            BlockPos2D::new(x0, z0),
            BlockPos2D::new(x1, z0),
            BlockPos2D::new(x1, z1),
            BlockPos2D::new(x0, z1),
        ]
    }

    #[test]
    fn test_cuboid_contains_inclusive() {
        let shop = Geometry::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));

        assert!(shop.contains(BlockPos::new(5, 5, 5)));
        assert!(shop.contains(BlockPos::new(0, 0, 0)));
        assert!(shop.contains(BlockPos::new(9, 9, 9)));
        assert!(!shop.contains(BlockPos::new(10, 0, 0)));
        assert!(!shop.contains(BlockPos::new(0, -1, 0)));
    }

    #[test]
    fn test_cuboid_normalizes_corners() {
        let geo = Geometry::cuboid(BlockPos::new(9, 0, 9), BlockPos::new(0, 9, 0));
        let bounds = geo.bounding_box().unwrap();

        assert_eq!(bounds.min, BlockPos::new(0, 0, 0));
        assert_eq!(bounds.max, BlockPos::new(9, 9, 9));
        assert!(geo.validate().is_ok());
    }

    #[test]
    fn test_polygon_requires_three_points() {
        let err = Geometry::polygon(vec![BlockPos2D::new(0, 0), BlockPos2D::new(1, 1)], 0, 10)
            .unwrap_err();
        assert_eq!(err, GeometryError::TooFewPoints(2));
    }

    #[test]
    fn test_polygon_contains_triangle() {
        let tri = Geometry::polygon(
            vec![BlockPos2D::new(0, 0), BlockPos2D::new(10, 0), BlockPos2D::new(0, 10)],
            64,
            70,
        )
        .unwrap();

        assert!(tri.contains(BlockPos::new(2, 65, 2)));
        // On the hypotenuse
        assert!(tri.contains(BlockPos::new(5, 65, 5)));
        // Vertex
        assert!(tri.contains(BlockPos::new(10, 64, 0)));
        assert!(!tri.contains(BlockPos::new(6, 65, 6)));
        // Outside the vertical band
        assert!(!tri.contains(BlockPos::new(2, 71, 2)));
        assert!(!tri.contains(BlockPos::new(2, 63, 2)));
    }

    #[test]
    fn test_polygon_concave() {
        // U shape opening towards +z
        let u = Geometry::polygon(
            vec![
                BlockPos2D::new(0, 0),
                BlockPos2D::new(9, 0),
                BlockPos2D::new(9, 9),
                BlockPos2D::new(6, 9),
                BlockPos2D::new(6, 3),
                BlockPos2D::new(3, 3),
                BlockPos2D::new(3, 9),
                BlockPos2D::new(0, 9),
            ],
            0,
            0,
        )
        .unwrap();

        assert!(u.contains(BlockPos::new(1, 0, 8)));
        assert!(u.contains(BlockPos::new(8, 0, 8)));
        assert!(u.contains(BlockPos::new(4, 0, 1)));
        assert!(!u.contains(BlockPos::new(4, 0, 6)));
    }

    #[test]
    fn test_global_contains_everything() {
        let global = Geometry::Global;
        assert!(global.contains(BlockPos::new(i32::MAX, i32::MIN, 0)));
        assert!(global.bounding_box().is_none());
        assert!(global.overlaps(&Geometry::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1))));
    }

    #[test]
    fn test_cuboid_overlap_touching_edges() {
        let a = Geometry::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));
        let b = Geometry::cuboid(BlockPos::new(9, 0, 9), BlockPos::new(20, 9, 20));
        let c = Geometry::cuboid(BlockPos::new(10, 0, 0), BlockPos::new(20, 9, 9));

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_overlap_respects_vertical_band() {
        let low = Geometry::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));
        let high = Geometry::polygon(square(0, 0, 9, 9), 10, 20).unwrap();
        assert!(!low.overlaps(&high));
    }

    #[test]
    fn test_crossing_shapes_overlap_without_contained_vertices() {
        // A plus sign: neither shape has a vertex inside the other
        let wide = Geometry::cuboid(BlockPos::new(0, 0, 4), BlockPos::new(12, 5, 6));
        let tall = Geometry::polygon(square(5, 0, 7, 12), 0, 5).unwrap();

        assert!(wide.overlaps(&tall));
        assert!(tall.overlaps(&wide));
    }

    #[test]
    fn test_flat_footprint() {
        let line = Geometry::polygon(
            vec![BlockPos2D::new(0, 0), BlockPos2D::new(5, 5), BlockPos2D::new(10, 10)],
            0,
            5,
        )
        .unwrap();
        assert!(line.has_flat_footprint());
        assert!(!Geometry::polygon(square(0, 0, 3, 3), 0, 5).unwrap().has_flat_footprint());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let geo = Geometry::Cuboid(Cuboid {
            min: BlockPos::new(5, 0, 0),
            max: BlockPos::new(0, 0, 0),
        });
        assert!(matches!(geo.validate(), Err(GeometryError::InvertedBounds { .. })));
    }

    #[test]
    fn test_geometry_serialization_tag() {
        let json = serde_json::to_string(&Geometry::Global).unwrap();
        assert_eq!(json, r#"{"type":"global"}"#);

        let geo = Geometry::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(1, 2, 3));
        let back: Geometry = serde_json::from_str(&serde_json::to_string(&geo).unwrap()).unwrap();
        assert_eq!(back, geo);
    }
    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        // Covers the half-plane x >= z
        let huge = Geometry::polygon(
            vec![
                BlockPos2D::new(i32::MIN, i32::MIN),
                BlockPos2D::new(i32::MAX, i32::MIN),
                BlockPos2D::new(i32::MAX, i32::MAX),
            ],
            0,
            10,
        )
        .unwrap();

        assert!(!huge.contains(BlockPos::new(0, 5, i32::MAX)));
        assert!(!huge.contains(BlockPos::new(-1000, 5, 1000)));
        assert!(huge.contains(BlockPos::new(1000, 5, -1000)));
        assert!(huge.contains(BlockPos::new(0, 5, 0)));
        assert!(huge.contains(BlockPos::new(i32::MAX, 5, i32::MIN)));
        assert!(!huge.has_flat_footprint());

        let inside = Geometry::cuboid(BlockPos::new(10, 0, -20), BlockPos::new(20, 5, -10));
        let outside = Geometry::cuboid(BlockPos::new(-20, 0, 10), BlockPos::new(-10, 5, 20));
        assert!(huge.overlaps(&inside));
        assert!(!huge.overlaps(&outside));
    }
}
