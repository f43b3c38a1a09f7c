// Structural checks: foundations, grounding, and cave-ins.
//
// `StructuralValidator` answers placement questions for the construction
// manager:
// - `check_vertical_bounds()`: the whole structure fits in `0..world_height`.
// - `check_foundation()`: every footprint column has solid ground directly
//   beneath the placement level. Ground below the world floor (z = -1) counts
//   as solid.
// - `is_grounded()`: bounded BFS through face-adjacent solid blocks looking
//   for the floor (z = 0) or bedrock.
//
// `CaveInManager` runs after a block is mined. It walks up the column above
// the hole; each block with nothing solid beneath and too few solid lateral
// neighbours may collapse. Grounded blocks collapse with probability
// `base_chance + per_span_chance * span` (span = unsupported column height,
// clamped to `max_chance`); ungrounded blocks always fall. A collapsed block
// is removed and a Gravel block lands on the first supported cell below it.
// This is a probabilistic approximation, not a physics simulation: nothing
// moves sideways and nothing falls more than once per mining event.
//
// See also: `construction.rs` which calls the validator during placement,
// `sim.rs` which calls `CaveInManager::after_mining` for every mined block,
// `config.rs` for `CaveInConfig`.
//
// **Critical constraint: determinism.** BFS visits neighbours in a fixed
// order, visited sets are `BTreeSet`s, and every random roll comes from the
// sim's `GameRng` in column order.

use crate::block::BlockType;
use crate::blueprint::Blueprint;
use crate::config::CaveInConfig;
use crate::error::PlacementError;
use crate::prng::GameRng;
use crate::types::WorldPos;
use crate::world::VoxelWorld;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Stateless placement and support checks.
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn check_vertical_bounds(
        world: &VoxelWorld,
        bp: &Blueprint,
        origin: WorldPos,
    ) -> Result<(), PlacementError> {
        if origin.z < 0 {
            return Err(PlacementError::OutOfBounds { at: origin });
        }
        let top = origin.offset(0, 0, bp.height() - 1);
        if !world.in_vertical_range(top.z) {
            return Err(PlacementError::OutOfBounds { at: top });
        }
        Ok(())
    }

    /// Every cell of the footprint rectangle must have solid ground at
    /// `origin.z - 1`.
    pub fn check_foundation(
        world: &VoxelWorld,
        bp: &Blueprint,
        origin: WorldPos,
    ) -> Result<(), PlacementError> {
        for dy in 0..bp.depth() {
            for dx in 0..bp.width() {
                let ground = origin.offset(dx, dy, -1);
                if !Self::is_ground(world, ground) {
                    return Err(PlacementError::UnevenTerrain { at: ground });
                }
            }
        }
        Ok(())
    }

    /// Solid, or below the world floor.
    pub fn is_ground(world: &VoxelWorld, pos: WorldPos) -> bool {
        pos.z < 0 || world.peek_block(pos).is_solid()
    }

    /// BFS through solid blocks from `start` looking for the floor or
    /// bedrock. Gives up (`false`) after `limit` blocks. Downward neighbours
    /// are tried first.
    pub fn is_grounded(world: &VoxelWorld, start: WorldPos, limit: usize) -> bool {
        if !world.peek_block(start).is_solid() {
            return false;
        }
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(pos) = queue.pop_front() {
            if pos.z == 0 || world.peek_block(pos) == BlockType::Bedrock {
                return true;
            }
            if visited.len() >= limit {
                return false;
            }
            let [east, west, north, south, up, down] = pos.face_neighbors();
            for next in [down, east, west, north, south, up] {
                if world.peek_block(next).is_solid() && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    pub fn lateral_support(world: &VoxelWorld, pos: WorldPos) -> usize {
        pos.horizontal_neighbors()
            .into_iter()
            .filter(|&n| world.peek_block(n).is_solid())
            .count()
    }
}

/// What a mining event knocked loose.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaveInReport {
    pub mined: WorldPos,
    /// Blocks removed, bottom-up, with what they were.
    pub collapsed: Vec<(WorldPos, BlockType)>,
    /// Where gravel landed, one per collapsed block.
    pub deposits: Vec<WorldPos>,
}

impl CaveInReport {
    pub fn is_empty(&self) -> bool {
        self.collapsed.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct CaveInManager {
    config: CaveInConfig,
}

impl CaveInManager {
    pub fn new(config: CaveInConfig) -> Self {
        Self { config }
    }

    /// Probability that an unsupported block with the given span collapses.
    pub fn collapse_chance(&self, span: i32, grounded: bool) -> f64 {
        if !grounded {
            return 1.0;
        }
        let raw = self.config.base_chance + self.config.per_span_chance * f64::from(span.max(0));
        raw.clamp(0.0, self.config.max_chance)
    }

    /// Resolve cave-ins above a freshly mined cell.
    pub fn after_mining(
        &self,
        world: &mut VoxelWorld,
        mined: WorldPos,
        rng: &mut GameRng,
    ) -> CaveInReport {
        let mut report = CaveInReport {
            mined,
            ..CaveInReport::default()
        };
        if !self.config.enabled {
            return report;
        }

        let top = mined.z + self.config.max_column_scan;
        let mut pos = mined.above();
        while pos.z <= top {
            let block = world.get_block(pos);
            if !block.is_solid() || !block.is_mineable() {
                break;
            }
            if world.get_block(pos.below()).is_solid() {
                break;
            }
            if StructuralValidator::lateral_support(world, pos) >= self.config.min_lateral_support {
                break;
            }
            let span = self.column_span(world, pos, top);
            let grounded =
                StructuralValidator::is_grounded(world, pos, self.config.grounding_search_limit);
            if !rng.random_bool(self.collapse_chance(span, grounded)) {
                break;
            }

            world.set_block(pos, BlockType::Air);
            let landing = Self::landing_cell(world, pos);
            world.set_block(landing, BlockType::Gravel);
            report.collapsed.push((pos, block));
            report.deposits.push(landing);
            pos = pos.above();
        }

        if !report.is_empty() {
            log::debug!(
                "cave-in above {mined}: {} blocks collapsed",
                report.collapsed.len()
            );
        }
        report
    }

    /// Height of the contiguous solid column starting at `pos`.
    fn column_span(&self, world: &VoxelWorld, pos: WorldPos, top: i32) -> i32 {
        (pos.z..=top)
            .take_while(|&z| world.peek_block(WorldPos::new(pos.x, pos.y, z)).is_solid())
            .count() as i32
    }

    /// Lowest open cell reachable by falling straight down from just below
    /// `from`.
    fn landing_cell(world: &VoxelWorld, from: WorldPos) -> WorldPos {
        let mut cell = from;
        while cell.z > 0 && !world.peek_block(cell.below()).is_solid() {
            cell = cell.below();
        }
        cell
    }
}
