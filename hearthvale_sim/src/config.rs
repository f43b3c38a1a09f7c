// Data-driven game configuration.
//
// Every tunable number the simulation reads lives in `GameConfig`, loaded
// from JSON (`GameConfig::from_json`) or built from `Default`. Sim logic
// never hard-codes rates, ranges, or thresholds. Parameters are grouped by
// subsystem:
// - `WorldConfig`: chunk dimensions, vertical range, loaded-chunk cap, and
//   the terrain height source.
// - `ConstructionConfig`: reservation timeout, spatial index bucket size,
//   whether foundations are enforced.
// - `WorkerConfig`: scoring weights, arrival ranges, work rates, need
//   thresholds, and personality trait factors.
// - `CaveInConfig`: collapse probabilities and support thresholds.
//
// All structs use `#[serde(default)]`, so a JSON file only has to name the
// fields it overrides.
//
// See also: `sim.rs` which owns the `GameConfig`, `world.rs` which builds its
// terrain generator from `TerrainConfig`.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Two sims with identical configs and commands produce
// identical results.

use crate::error::SimError;
use crate::types::WorldPos;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How column heights are produced for fresh chunks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TerrainConfig {
    /// Every column has the same surface height.
    Flat { height: i32 },
    /// Rolling 2D Perlin terrain: `base + amplitude * noise(x * freq, y * freq)`.
    Perlin {
        seed: u32,
        base_height: i32,
        amplitude: f64,
        frequency: f64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Horizontal edge length of a chunk, in blocks.
    pub chunk_size: i32,
    /// Number of Z levels. Valid Z is `0..world_height`.
    pub world_height: i32,
    /// Loaded chunks beyond this count are evicted least-recently-used first.
    pub max_loaded_chunks: usize,
    /// Layers of dirt between the stone and the grass surface.
    pub dirt_depth: i32,
    pub terrain: TerrainConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            world_height: 64,
            max_loaded_chunks: 256,
            dirt_depth: 3,
            terrain: TerrainConfig::Perlin {
                seed: 0,
                base_height: 24,
                amplitude: 6.0,
                frequency: 0.02,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionConfig {
    /// Ticks without a refresh after which a reservation is stale and
    /// released.
    pub reservation_timeout_ticks: u64,
    /// Bucket edge length for the site spatial index.
    pub index_chunk_size: i32,
    /// Global switch for foundation checks. Blueprints opt in individually
    /// through `requires_foundation`; this can turn the check off entirely.
    pub enforce_foundations: bool,
    /// Build progress added per work tick before skill modifiers.
    pub work_tick_rate: f32,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            reservation_timeout_ticks: 600,
            index_chunk_size: 16,
            enforce_foundations: true,
            work_tick_rate: 1.0,
        }
    }
}

/// Personality traits that scale how fast an agent works.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trait {
    Diligent,
    Lazy,
    Strong,
    Clumsy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Distance term of the task score: `max(0, distance_base - distance)`.
    pub distance_base: f32,
    /// Score added per priority rank (Low = 0 ... Urgent = 3).
    pub priority_weight: f32,
    /// Score added per point of the relevant skill (0..=100).
    pub skill_weight: f32,
    pub mining_arrival_range: f32,
    pub hauling_arrival_range: f32,
    pub building_arrival_range: f32,
    /// Mining work units per tick before skill modifiers.
    pub mining_rate: f32,
    /// Path steps an agent advances per tick.
    pub steps_per_tick: usize,
    /// Consecutive pathfinding failures before a task is abandoned.
    pub max_path_failures: u32,
    /// Hunger at or above this is critical.
    pub critical_hunger: f32,
    /// Fatigue at or above this is critical.
    pub critical_fatigue: f32,
    /// Skill assumed for agents registered without explicit skills.
    pub default_skill: f32,
    pub min_work_multiplier: f32,
    pub max_work_multiplier: f32,
    /// Multiplier each trait applies to work rate. Missing traits are 1.0.
    pub trait_factors: BTreeMap<Trait, f32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let mut trait_factors = BTreeMap::new();
        trait_factors.insert(Trait::Diligent, 1.2);
        trait_factors.insert(Trait::Lazy, 0.8);
        trait_factors.insert(Trait::Strong, 1.15);
        trait_factors.insert(Trait::Clumsy, 0.85);
        Self {
            distance_base: 100.0,
            priority_weight: 10.0,
            skill_weight: 0.2,
            mining_arrival_range: 1.5,
            hauling_arrival_range: 1.5,
            building_arrival_range: 2.0,
            mining_rate: 1.0,
            steps_per_tick: 1,
            max_path_failures: 3,
            critical_hunger: 90.0,
            critical_fatigue: 90.0,
            default_skill: 50.0,
            min_work_multiplier: 0.5,
            max_work_multiplier: 2.0,
            trait_factors,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaveInConfig {
    pub enabled: bool,
    /// Collapse chance for an unsupported block with a span of zero.
    pub base_chance: f64,
    /// Added chance per block of unsupported span.
    pub per_span_chance: f64,
    pub max_chance: f64,
    /// Solid horizontal neighbours needed for a block to hold itself up.
    pub min_lateral_support: usize,
    /// Node budget for the grounding BFS.
    pub grounding_search_limit: usize,
    /// How far up the column above a mined cell to look.
    pub max_column_scan: i32,
}

impl Default for CaveInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_chance: 0.05,
            per_span_chance: 0.1,
            max_chance: 0.9,
            min_lateral_support: 2,
            grounding_search_limit: 512,
            max_column_scan: 16,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub world: WorldConfig,
    pub construction: ConstructionConfig,
    pub worker: WorkerConfig,
    pub cave_in: CaveInConfig,
    /// Where the shared stockpile sits.
    pub stockpile_position: WorldPos,
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let config: GameConfig =
            serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Config(e.to_string()))
    }

    /// Reject values the sim cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.world.chunk_size <= 0 {
            return Err(SimError::Config("world.chunk_size must be positive".into()));
        }
        if self.world.world_height <= 0 {
            return Err(SimError::Config("world.world_height must be positive".into()));
        }
        if self.world.max_loaded_chunks == 0 {
            return Err(SimError::Config("world.max_loaded_chunks must be at least 1".into()));
        }
        if self.construction.index_chunk_size <= 0 {
            return Err(SimError::Config(
                "construction.index_chunk_size must be positive".into(),
            ));
        }
        if self.worker.min_work_multiplier > self.worker.max_work_multiplier {
            return Err(SimError::Config(
                "worker.min_work_multiplier exceeds max_work_multiplier".into(),
            ));
        }
        Ok(())
    }
}
