// Core types shared across the simulation.
//
// Defines world coordinates (`WorldPos`), chunk keys, axis-aligned bounds,
// compact entity identifiers, `Priority`, and the cardinal `Rotation` used by
// blueprint placement. All types derive `Serialize`/`Deserialize` so they can
// appear in snapshots.
//
// **Coordinate convention.** Z is vertical. X and Y span the horizontal
// plane, and chunks are columns keyed by `(cx, cy)` that cover the full
// vertical range. `z == 0` is the world floor.
//
// **Critical constraint: determinism.** IDs are allocated from counters owned
// by the sim, never from OS entropy, so two runs with the same commands
// produce the same IDs.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Simulation time, in ticks.
pub type Tick = u64;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// An integer block position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub const fn below(self) -> Self {
        self.offset(0, 0, -1)
    }

    pub const fn above(self) -> Self {
        self.offset(0, 0, 1)
    }

    /// Straight-line distance in 3D.
    pub fn distance(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance in the horizontal plane, ignoring Z. Work discovery ranks
    /// candidates by this.
    pub fn distance_2d(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// The four horizontal neighbours (±x, ±y).
    pub fn horizontal_neighbors(self) -> [Self; 4] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
        ]
    }

    /// The six face-adjacent neighbours.
    pub fn face_neighbors(self) -> [Self; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }
}

impl fmt::Display for WorldPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Integer chunk coordinates. A chunk covers `chunk_size x chunk_size`
/// columns and the whole vertical range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub cx: i32,
    pub cy: i32,
}

impl ChunkKey {
    pub const fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk[{}, {}]", self.cx, self.cy)
    }
}

/// Inclusive axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: WorldPos,
    pub max: WorldPos,
}

impl Bounds {
    /// Build bounds from two arbitrary corners.
    pub fn from_corners(a: WorldPos, b: WorldPos) -> Self {
        Self {
            min: WorldPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: WorldPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Smallest bounds containing every position. `None` for an empty input.
    pub fn enclosing(positions: impl IntoIterator<Item = WorldPos>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self { min: first, max: first }, |acc, p| {
            Self::from_corners(
                WorldPos::new(acc.min.x.min(p.x), acc.min.y.min(p.y), acc.min.z.min(p.z)),
                WorldPos::new(acc.max.x.max(p.x), acc.max.y.max(p.y), acc.max.z.max(p.z)),
            )
        }))
    }

    /// Standard three-axis interval intersection.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    pub fn contains(&self, pos: WorldPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// Every chunk whose columns overlap the horizontal extent of these
    /// bounds. Most sites fit in four chunks or fewer.
    pub fn chunk_keys(&self, chunk_size: i32) -> SmallVec<[ChunkKey; 4]> {
        let cx0 = self.min.x.div_euclid(chunk_size);
        let cx1 = self.max.x.div_euclid(chunk_size);
        let cy0 = self.min.y.div_euclid(chunk_size);
        let cy1 = self.max.y.div_euclid(chunk_size);
        let mut keys = SmallVec::new();
        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                keys.push(ChunkKey::new(cx, cy));
            }
        }
        keys
    }
}

// ---------------------------------------------------------------------------
// Compact IDs
// ---------------------------------------------------------------------------

macro_rules! compact_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

compact_id!(/// A placed construction site. Allocated sequentially by the manager.
SiteId(u64));
compact_id!(/// A worker agent. Supplied by whoever registers the agent.
AgentId(u32));
compact_id!(/// A mining designation owned by the mining collaborator.
MiningTaskId(u64));
compact_id!(/// A generic haul request owned by the stockpile collaborator.
HaulTaskId(u64));

/// Name-keyed blueprint identifier, e.g. `"wooden_house"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlueprintId(pub String);

impl BlueprintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlueprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlueprintId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// Priority level for construction sites and tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Ordinal rank, `Low == 0`. Scoring multiplies this by a config weight.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

/// Cardinal rotation about the vertical axis, clockwise seen from above.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub fn quarter_turns(self) -> u8 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 1,
            Rotation::R180 => 2,
            Rotation::R270 => 3,
        }
    }

    pub fn from_quarter_turns(turns: u8) -> Self {
        match turns % 4 {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        }
    }

    /// Compose two rotations.
    pub fn then(self, other: Rotation) -> Self {
        Self::from_quarter_turns(self.quarter_turns() + other.quarter_turns())
    }

    pub fn degrees(self) -> u16 {
        u16::from(self.quarter_turns()) * 90
    }

    /// Parse a rotation expressed in degrees. Only the four cardinal
    /// values are accepted.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    /// Remap a footprint offset inside a `width x depth` rectangle.
    ///
    /// R90 sends `(x, y)` to `(y, width - 1 - x)`; the result lies inside a
    /// `depth x width` rectangle. R180 and R270 follow the same pattern.
    pub fn apply(self, x: i32, y: i32, width: i32, depth: i32) -> (i32, i32) {
        match self {
            Rotation::R0 => (x, y),
            Rotation::R90 => (y, width - 1 - x),
            Rotation::R180 => (width - 1 - x, depth - 1 - y),
            Rotation::R270 => (depth - 1 - y, x),
        }
    }

    /// Footprint dimensions after rotating a `width x depth` rectangle.
    pub fn rotated_dims(self, width: i32, depth: i32) -> (i32, i32) {
        match self {
            Rotation::R0 | Rotation::R180 => (width, depth),
            Rotation::R90 | Rotation::R270 => (depth, width),
        }
    }
}
