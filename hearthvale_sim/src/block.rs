// Block-type catalog and building materials.
//
// `BlockType` is the closed set of things a voxel can hold. Each type has
// fixed physical properties (solid, walkable, mineable, hardness) and a
// construction `Material` that a hauler must deliver before the block can be
// built. Chunks store blocks as `u8` codes (`BlockType::code`) to keep the
// per-chunk arrays compact; `from_code` is the inverse and rejects unknown
// codes.
//
// See also: `world.rs` for chunk storage, `blueprint.rs` which derives
// material requirements from these types, `structural.rs` which reads
// `is_solid` for support checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The material a hauler delivers to a construction block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Material {
    Wood,
    Stone,
    Clay,
    Sand,
    Thatch,
}

impl Material {
    pub const ALL: [Material; 5] = [
        Material::Wood,
        Material::Stone,
        Material::Clay,
        Material::Sand,
        Material::Thatch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Material::Wood => "wood",
            Material::Stone => "stone",
            Material::Clay => "clay",
            Material::Sand => "sand",
            Material::Thatch => "thatch",
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every block a voxel can contain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockType {
    #[default]
    Air,
    Stone,
    Dirt,
    Grass,
    Sand,
    Gravel,
    Bedrock,
    Wood,
    Plank,
    Brick,
    Cobblestone,
    Glass,
    Thatch,
    Door,
    Ladder,
}

impl BlockType {
    pub const ALL: [BlockType; 15] = [
        BlockType::Air,
        BlockType::Stone,
        BlockType::Dirt,
        BlockType::Grass,
        BlockType::Sand,
        BlockType::Gravel,
        BlockType::Bedrock,
        BlockType::Wood,
        BlockType::Plank,
        BlockType::Brick,
        BlockType::Cobblestone,
        BlockType::Glass,
        BlockType::Thatch,
        BlockType::Door,
        BlockType::Ladder,
    ];

    /// Storage code. Stable across versions: snapshots store these bytes.
    pub fn code(self) -> u8 {
        match self {
            BlockType::Air => 0,
            BlockType::Stone => 1,
            BlockType::Dirt => 2,
            BlockType::Grass => 3,
            BlockType::Sand => 4,
            BlockType::Gravel => 5,
            BlockType::Bedrock => 6,
            BlockType::Wood => 7,
            BlockType::Plank => 8,
            BlockType::Brick => 9,
            BlockType::Cobblestone => 10,
            BlockType::Glass => 11,
            BlockType::Thatch => 12,
            BlockType::Door => 13,
            BlockType::Ladder => 14,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Occupies its cell. Air, doors and ladders can be walked through.
    pub fn is_solid(self) -> bool {
        !matches!(self, BlockType::Air | BlockType::Door | BlockType::Ladder)
    }

    /// Can be stood on. Glass is solid but too slick to count as footing
    /// for pathing purposes; everything else solid is walkable.
    pub fn is_walkable(self) -> bool {
        self.is_solid() && self != BlockType::Glass
    }

    pub fn is_mineable(self) -> bool {
        !matches!(self, BlockType::Air | BlockType::Bedrock)
    }

    /// Mining work units needed to remove one block. Zero for unmineable
    /// types.
    pub fn hardness(self) -> f32 {
        match self {
            BlockType::Air | BlockType::Bedrock => 0.0,
            BlockType::Sand | BlockType::Gravel | BlockType::Thatch => 20.0,
            BlockType::Dirt | BlockType::Grass => 25.0,
            BlockType::Glass | BlockType::Door | BlockType::Ladder => 30.0,
            BlockType::Wood | BlockType::Plank => 40.0,
            BlockType::Brick | BlockType::Cobblestone => 70.0,
            BlockType::Stone => 80.0,
        }
    }

    /// Material a hauler must deliver before this block can be built.
    /// `None` for terrain-only types that no blueprint should contain.
    pub fn material(self) -> Option<Material> {
        match self {
            BlockType::Wood | BlockType::Plank | BlockType::Door | BlockType::Ladder => {
                Some(Material::Wood)
            }
            BlockType::Stone | BlockType::Cobblestone => Some(Material::Stone),
            BlockType::Brick => Some(Material::Clay),
            BlockType::Glass | BlockType::Sand => Some(Material::Sand),
            BlockType::Thatch => Some(Material::Thatch),
            BlockType::Air
            | BlockType::Dirt
            | BlockType::Grass
            | BlockType::Gravel
            | BlockType::Bedrock => None,
        }
    }

    /// Material dropped when this block is mined out.
    pub fn mined_yield(self) -> Option<Material> {
        match self {
            BlockType::Stone | BlockType::Cobblestone | BlockType::Gravel => Some(Material::Stone),
            BlockType::Wood | BlockType::Plank | BlockType::Door | BlockType::Ladder => {
                Some(Material::Wood)
            }
            BlockType::Sand | BlockType::Glass => Some(Material::Sand),
            BlockType::Brick => Some(Material::Clay),
            BlockType::Thatch => Some(Material::Thatch),
            BlockType::Air | BlockType::Dirt | BlockType::Grass | BlockType::Bedrock => None,
        }
    }

    /// Lower-case name used in blueprint JSON legends.
    pub fn name(self) -> &'static str {
        match self {
            BlockType::Air => "air",
            BlockType::Stone => "stone",
            BlockType::Dirt => "dirt",
            BlockType::Grass => "grass",
            BlockType::Sand => "sand",
            BlockType::Gravel => "gravel",
            BlockType::Bedrock => "bedrock",
            BlockType::Wood => "wood",
            BlockType::Plank => "plank",
            BlockType::Brick => "brick",
            BlockType::Cobblestone => "cobblestone",
            BlockType::Glass => "glass",
            BlockType::Thatch => "thatch",
            BlockType::Door => "door",
            BlockType::Ladder => "ladder",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
