//! Region shapes.
//!
//! The variant set is closed: cuboids, extruded 2D polygons, and the
//! unbounded global shape. Persistence and resolution code match on
//! [`Shape`] exhaustively, so adding a variant is a deliberate act.
//!
//! All shapes use block semantics: a cuboid from `(0, 0, 0)` to `(10, 10, 10)`
//! covers 11 blocks per axis, and a polygon covers every column on or inside
//! its outline.

use std::fmt;

use hashbrown::HashSet;

use crate::{BlockPos, ColumnPos, ShapeError};

/// Discriminant of a [`Shape`], used as the persisted type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Cuboid,
    Polygon,
    Global,
}

impl ShapeKind {
    /// Stable name used in stored records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cuboid => "cuboid",
            Self::Polygon => "poly2d",
            Self::Global => "global",
        }
    }

    /// Parse a stored type tag. Unknown tags yield `None`.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "cuboid" => Some(Self::Cuboid),
            "poly2d" | "polygon" => Some(Self::Polygon),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An axis-aligned box of blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cuboid {
    min: BlockPos,
    max: BlockPos,
}

/// A 2D outline extruded between two heights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polygon {
    points: Vec<ColumnPos>,
    min: BlockPos,
    max: BlockPos,
}

/// The geometry of a region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    Cuboid(Cuboid),
    Polygon(Polygon),
    /// Unbounded world-default shape. Contains no point and intersects nothing;
    /// the global region is consulted by identity, never by geometry.
    Global,
}

impl Shape {
    /// Build a cuboid from two opposite corners in any order.
    #[must_use]
    pub fn cuboid(a: BlockPos, b: BlockPos) -> Self {
        Self::Cuboid(Cuboid {
            min: a.min(b),
            max: a.max(b),
        })
    }

    /// Build an extruded polygon.
    ///
    /// The heights may be given in either order.
    pub fn polygon(points: Vec<ColumnPos>, min_y: i32, max_y: i32) -> Result<Self, ShapeError> {
        let Some(first) = points.first() else {
            return Err(ShapeError::EmptyPolygon);
        };

        let (mut min_x, mut max_x, mut min_z, mut max_z) = (first.x, first.x, first.z, first.z);
        for p in &points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_z = min_z.min(p.z);
            max_z = max_z.max(p.z);
        }

        Ok(Self::Polygon(Polygon {
            points,
            min: BlockPos::new(min_x, min_y.min(max_y), min_z),
            max: BlockPos::new(max_x, min_y.max(max_y), max_z),
        }))
    }

    /// The variant tag.
    #[must_use]
    pub const fn kind(&self) -> ShapeKind {
        match self {
            Self::Cuboid(_) => ShapeKind::Cuboid,
            Self::Polygon(_) => ShapeKind::Polygon,
            Self::Global => ShapeKind::Global,
        }
    }

    /// Whether this shape occupies actual space.
    #[must_use]
    pub const fn is_physical(&self) -> bool {
        !matches!(self, Self::Global)
    }

    /// Minimum and maximum corners of the bounding box, if bounded.
    #[must_use]
    pub const fn bounds(&self) -> Option<(BlockPos, BlockPos)> {
        match self {
            Self::Cuboid(c) => Some((c.min, c.max)),
            Self::Polygon(p) => Some((p.min, p.max)),
            Self::Global => None,
        }
    }

    /// Minimum corner of the bounding box.
    #[must_use]
    pub fn min_point(&self) -> Option<BlockPos> {
        self.bounds().map(|(min, _)| min)
    }

    /// Maximum corner of the bounding box.
    #[must_use]
    pub fn max_point(&self) -> Option<BlockPos> {
        self.bounds().map(|(_, max)| max)
    }

    /// Polygon height range, for polygons only.
    #[must_use]
    pub const fn height_range(&self) -> Option<(i32, i32)> {
        match self {
            Self::Polygon(p) => Some((p.min.y, p.max.y)),
            _ => None,
        }
    }

    /// The 2D outline used for edge tests.
    ///
    /// Cuboids report their four corners in winding order.
    #[must_use]
    pub fn points(&self) -> Vec<ColumnPos> {
        match self {
            Self::Cuboid(c) => vec![
                ColumnPos::new(c.min.x, c.min.z),
                ColumnPos::new(c.max.x, c.min.z),
                ColumnPos::new(c.max.x, c.max.z),
                ColumnPos::new(c.min.x, c.max.z),
            ],
            Self::Polygon(p) => p.points.clone(),
            Self::Global => Vec::new(),
        }
    }

    /// Whether the block at `pos` lies inside this shape.
    #[must_use]
    pub fn contains(&self, pos: BlockPos) -> bool {
        match self {
            Self::Cuboid(c) => {
                pos.x >= c.min.x
                    && pos.x <= c.max.x
                    && pos.y >= c.min.y
                    && pos.y <= c.max.y
                    && pos.z >= c.min.z
                    && pos.z <= c.max.z
            }
            Self::Polygon(p) => p.contains(pos),
            Self::Global => false,
        }
    }

    /// Column test at this shape's lowest level.
    fn contains_column(&self, column: ColumnPos) -> bool {
        match self.min_point() {
            Some(min) => self.contains(column.at_y(min.y)),
            None => false,
        }
    }

    /// Number of blocks inside the shape, saturating at `u64::MAX`.
    ///
    /// Polygon volume is exact for simple (non self-intersecting) outlines.
    #[must_use]
    pub fn volume(&self) -> u64 {
        match self {
            Self::Cuboid(c) => {
                let dx = i64::from(c.max.x) - i64::from(c.min.x) + 1;
                let dy = i64::from(c.max.y) - i64::from(c.min.y) + 1;
                let dz = i64::from(c.max.z) - i64::from(c.min.z) + 1;
                (dx as u64).saturating_mul(dy as u64).saturating_mul(dz as u64)
            }
            Self::Polygon(p) => {
                let height = (i64::from(p.max.y) - i64::from(p.min.y) + 1) as u64;
                p.column_count().saturating_mul(height)
            }
            Self::Global => 0,
        }
    }

    /// Cheap bounding-box overlap test.
    ///
    /// May report `true` for shapes whose bodies do not actually touch.
    #[must_use]
    pub fn intersects_mbr(&self, other: &Self) -> bool {
        let (Some((min, max)), Some((other_min, other_max))) = (self.bounds(), other.bounds())
        else {
            return false;
        };

        !(other_max.x < min.x
            || other_max.y < min.y
            || other_max.z < min.z
            || other_min.x > max.x
            || other_min.y > max.y
            || other_min.z > max.z)
    }

    /// Exact test for whether any outline edge of `self` crosses or touches
    /// an outline edge of `other`.
    #[must_use]
    pub fn intersects_edges(&self, other: &Self) -> bool {
        let ours = self.points();
        let theirs = other.points();
        let (Some(&last_ours), Some(&last_theirs)) = (ours.last(), theirs.last()) else {
            return false;
        };

        let mut a1 = last_ours;
        for &a2 in &ours {
            let mut b1 = last_theirs;
            for &b2 in &theirs {
                if segments_intersect(a1, a2, b1, b2) {
                    return true;
                }
                b1 = b2;
            }
            a1 = a2;
        }

        false
    }

    /// Whether the bodies of the two shapes share at least one block.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        if !self.intersects_mbr(other) {
            return false;
        }

        if let (Self::Cuboid(_), Self::Cuboid(_)) = (self, other) {
            return true;
        }

        // With the y ranges overlapping, two prisms overlap iff their
        // outlines cross or one outline has a vertex inside the other.
        self.intersects_edges(other)
            || other.points().into_iter().any(|p| self.contains_column(p))
            || self.points().into_iter().any(|p| other.contains_column(p))
    }
}

impl Polygon {
    /// Crossing-number test with explicit handling of vertices and edges.
    fn contains(&self, pos: BlockPos) -> bool {
        if pos.y < self.min.y || pos.y > self.max.y {
            return false;
        }
        if pos.x < self.min.x || pos.x > self.max.x || pos.z < self.min.z || pos.z > self.max.z {
            return false;
        }

        let target_x = i64::from(pos.x);
        let target_z = i64::from(pos.z);
        let mut inside = false;

        let Some(last) = self.points.last() else {
            return false;
        };
        let (mut x_old, mut z_old) = (i64::from(last.x), i64::from(last.z));

        for p in &self.points {
            let (x_new, z_new) = (i64::from(p.x), i64::from(p.z));
            if x_new == target_x && z_new == target_z {
                return true;
            }

            let (x1, z1, x2, z2) = if x_new > x_old {
                (x_old, z_old, x_new, z_new)
            } else {
                (x_new, z_new, x_old, z_old)
            };

            if x1 <= target_x && target_x <= x2 {
                let cross = (target_z - z1) * (x2 - x1) - (z2 - z1) * (target_x - x1);
                if cross == 0 {
                    if (z1 <= target_z) == (target_z <= z2) {
                        return true;
                    }
                } else if cross < 0 && x1 != target_x {
                    inside = !inside;
                }
            }

            x_old = x_new;
            z_old = z_new;
        }

        inside
    }

    /// Number of columns on or inside the outline (Pick's theorem).
    fn column_count(&self) -> u64 {
        let n = self.points.len();
        let mut twice_area: i64 = 0;
        let mut boundary: i64 = 0;

        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            twice_area += i64::from(a.x) * i64::from(b.z) - i64::from(b.x) * i64::from(a.z);
            boundary += gcd(
                (i64::from(b.x) - i64::from(a.x)).abs(),
                (i64::from(b.z) - i64::from(a.z)).abs(),
            );
        }

        let twice_area = twice_area.abs();
        if twice_area == 0 {
            return self.degenerate_column_count();
        }

        let interior = (twice_area - boundary + 2) / 2;
        (interior + boundary) as u64
    }

    /// Zero-area outlines cover exactly the lattice points on their edges.
    fn degenerate_column_count(&self) -> u64 {
        let mut seen: HashSet<ColumnPos> = HashSet::new();
        let n = self.points.len();

        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let dx = i64::from(b.x) - i64::from(a.x);
            let dz = i64::from(b.z) - i64::from(a.z);
            let steps = gcd(dx.abs(), dz.abs());
            if steps == 0 {
                seen.insert(a);
                continue;
            }
            let (sx, sz) = (dx / steps, dz / steps);
            for k in 0..=steps {
                seen.insert(ColumnPos::new(
                    (i64::from(a.x) + sx * k) as i32,
                    (i64::from(a.z) + sz * k) as i32,
                ));
            }
        }

        seen.len() as u64
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn orientation(a: ColumnPos, b: ColumnPos, c: ColumnPos) -> i64 {
    let cross = (i64::from(b.x) - i64::from(a.x)) * (i64::from(c.z) - i64::from(a.z))
        - (i64::from(b.z) - i64::from(a.z)) * (i64::from(c.x) - i64::from(a.x));
    cross.signum()
}

/// `p` is known to be collinear with `a..b`.
fn within_segment(a: ColumnPos, b: ColumnPos, p: ColumnPos) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.z >= a.z.min(b.z) && p.z <= a.z.max(b.z)
}

/// Closed segment intersection, touching endpoints included.
fn segments_intersect(p1: ColumnPos, p2: ColumnPos, q1: ColumnPos, q2: ColumnPos) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }

    (d1 == 0 && within_segment(q1, q2, p1))
        || (d2 == 0 && within_segment(q1, q2, p2))
        || (d3 == 0 && within_segment(p1, p2, q1))
        || (d4 == 0 && within_segment(p1, p2, q2))
}
