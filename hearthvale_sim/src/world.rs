// Chunked 3D voxel world.
//
// The world is an unbounded horizontal plane of chunk columns. Each `Chunk`
// covers `chunk_size x chunk_size` columns and the full vertical range
// `0..world_height`, stored as flat `u8` block codes plus a parallel metadata
// byte array, indexed by `lx + ly * size + z * size * size`.
//
// Chunks are generated on first access from a `TerrainGenerator` and kept in
// an LRU cache (`lru::LruCache`). When the cache is full the
// least-recently-touched chunk is evicted. Two key sets sit beside the cache
// and eviction never touches either: `diverged` holds every chunk that no
// longer matches the terrain function, `modified` holds the chunks written
// since the last `take_modified`. An evicted diverged chunk is parked so its
// edits survive; anything else is dropped because regenerating it is
// idempotent.
//
// Reads come in two flavours: `get_block` loads and touches the chunk,
// `peek_block` takes `&self` and never changes cache state (it falls back to
// the pure terrain function for chunks that are not resident). Validators
// that only need a read-only view use `peek_block`.
//
// Out-of-range Z is air on read and a rejected write (`false`), never an
// error.
//
// See also: `config.rs` for `WorldConfig`/`TerrainConfig`, `block.rs` for
// the block catalog, `construction.rs` whose `complete_block` is the only
// construction path that writes here.
//
// **Critical constraint: determinism.** Terrain is a pure function of
// `(x, y)` and the height source. Chunk eviction order depends only on the
// order of accesses, which is itself deterministic.

use crate::block::BlockType;
use crate::config::{TerrainConfig, WorldConfig};
use crate::error::SimError;
use crate::types::{Bounds, ChunkKey, WorldPos};
use lru::LruCache;
use noise::{NoiseFn, Perlin};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Height sources and terrain generation
// ---------------------------------------------------------------------------

/// Supplies the surface height of a column.
pub trait HeightSource: Send + Sync {
    fn height_at(&self, x: i32, y: i32) -> i32;
}

/// Every column has the same height.
#[derive(Clone, Copy, Debug)]
pub struct FlatHeight(pub i32);

impl HeightSource for FlatHeight {
    fn height_at(&self, _x: i32, _y: i32) -> i32 {
        self.0
    }
}

/// Rolling hills from 2D Perlin noise.
#[derive(Clone)]
pub struct PerlinHeight {
    perlin: Perlin,
    base_height: i32,
    amplitude: f64,
    frequency: f64,
}

impl PerlinHeight {
    pub fn new(seed: u32, base_height: i32, amplitude: f64, frequency: f64) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_height,
            amplitude,
            frequency,
        }
    }
}

impl HeightSource for PerlinHeight {
    fn height_at(&self, x: i32, y: i32) -> i32 {
        let n = self
            .perlin
            .get([x as f64 * self.frequency, y as f64 * self.frequency]);
        self.base_height + (n * self.amplitude).round() as i32
    }
}

/// Produces chunk contents from a height source.
pub struct TerrainGenerator {
    source: Box<dyn HeightSource>,
    chunk_size: i32,
    world_height: i32,
    dirt_depth: i32,
}

impl fmt::Debug for TerrainGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainGenerator")
            .field("chunk_size", &self.chunk_size)
            .field("world_height", &self.world_height)
            .field("dirt_depth", &self.dirt_depth)
            .finish_non_exhaustive()
    }
}

impl TerrainGenerator {
    pub fn from_config(config: &WorldConfig) -> Self {
        let source: Box<dyn HeightSource> = match config.terrain {
            TerrainConfig::Flat { height } => Box::new(FlatHeight(height)),
            TerrainConfig::Perlin {
                seed,
                base_height,
                amplitude,
                frequency,
            } => Box::new(PerlinHeight::new(seed, base_height, amplitude, frequency)),
        };
        Self::with_source(config, source)
    }

    pub fn with_source(config: &WorldConfig, source: Box<dyn HeightSource>) -> Self {
        Self {
            source,
            chunk_size: config.chunk_size,
            world_height: config.world_height,
            dirt_depth: config.dirt_depth,
        }
    }

    /// Column height clamped to the vertical range. Every `z` below this is
    /// solid ground in a fresh chunk.
    pub fn column_height(&self, x: i32, y: i32) -> i32 {
        self.source.height_at(x, y).clamp(0, self.world_height)
    }

    /// The block fresh terrain holds at `pos`. Bedrock at the floor, stone,
    /// a band of dirt, grass on top, air above.
    pub fn block_at(&self, pos: WorldPos) -> BlockType {
        if pos.z < 0 || pos.z >= self.world_height {
            return BlockType::Air;
        }
        let h = self.column_height(pos.x, pos.y);
        stack_block(pos.z, h, self.dirt_depth)
    }

    pub fn generate(&self, key: ChunkKey) -> Chunk {
        let mut chunk = Chunk::empty(key, self.chunk_size, self.world_height);
        for ly in 0..self.chunk_size {
            for lx in 0..self.chunk_size {
                let x = key.cx * self.chunk_size + lx;
                let y = key.cy * self.chunk_size + ly;
                let h = self.column_height(x, y);
                for z in 0..h {
                    chunk.set(lx, ly, z, stack_block(z, h, self.dirt_depth), 0);
                }
            }
        }
        chunk
    }
}

fn stack_block(z: i32, height: i32, dirt_depth: i32) -> BlockType {
    if z >= height {
        BlockType::Air
    } else if z == 0 {
        BlockType::Bedrock
    } else if z == height - 1 {
        BlockType::Grass
    } else if z >= height - 1 - dirt_depth {
        BlockType::Dirt
    } else {
        BlockType::Stone
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One column of blocks. Owned exclusively by `VoxelWorld`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub key: ChunkKey,
    size: i32,
    height: i32,
    blocks: Vec<u8>,
    metadata: Vec<u8>,
}

impl Chunk {
    fn empty(key: ChunkKey, size: i32, height: i32) -> Self {
        let len = (size * size * height) as usize;
        Self {
            key,
            size,
            height,
            blocks: vec![BlockType::Air.code(); len],
            metadata: vec![0; len],
        }
    }

    fn index(&self, lx: i32, ly: i32, z: i32) -> Option<usize> {
        let in_range = (0..self.size).contains(&lx)
            && (0..self.size).contains(&ly)
            && (0..self.height).contains(&z);
        in_range.then(|| (lx + ly * self.size + z * self.size * self.size) as usize)
    }

    pub fn get(&self, lx: i32, ly: i32, z: i32) -> BlockType {
        self.index(lx, ly, z)
            .and_then(|i| BlockType::from_code(self.blocks[i]))
            .unwrap_or(BlockType::Air)
    }

    pub fn metadata(&self, lx: i32, ly: i32, z: i32) -> u8 {
        self.index(lx, ly, z).map_or(0, |i| self.metadata[i])
    }

    fn set(&mut self, lx: i32, ly: i32, z: i32, block: BlockType, meta: u8) -> bool {
        match self.index(lx, ly, z) {
            Some(i) => {
                self.blocks[i] = block.code();
                self.metadata[i] = meta;
                true
            }
            None => false,
        }
    }

    /// Number of non-air blocks.
    pub fn solid_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|&&c| c != BlockType::Air.code())
            .count()
    }

    fn has_dimensions(&self, size: i32, height: i32) -> bool {
        let len = (size * size * height) as usize;
        self.size == size
            && self.height == height
            && self.blocks.len() == len
            && self.metadata.len() == len
    }
}

// ---------------------------------------------------------------------------
// VoxelWorld
// ---------------------------------------------------------------------------

/// Persistent form of a world: config plus every chunk that differs from
/// generated terrain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub config: WorldConfig,
    pub change_counter: u64,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug)]
pub struct VoxelWorld {
    config: WorldConfig,
    terrain: TerrainGenerator,
    loaded: LruCache<ChunkKey, Chunk>,
    /// Chunks written since the last `take_modified`.
    modified: BTreeSet<ChunkKey>,
    /// Chunks that differ from generated terrain. Never cleared.
    diverged: BTreeSet<ChunkKey>,
    /// Diverged chunks evicted from `loaded`.
    parked: FxHashMap<ChunkKey, Chunk>,
    change_counter: u64,
}

impl VoxelWorld {
    pub fn new(config: WorldConfig) -> Self {
        let terrain = TerrainGenerator::from_config(&config);
        Self::with_terrain(config, terrain)
    }

    /// World whose columns come from a caller-supplied height source
    /// instead of `config.terrain`.
    pub fn with_height_source(config: WorldConfig, source: Box<dyn HeightSource>) -> Self {
        let terrain = TerrainGenerator::with_source(&config, source);
        Self::with_terrain(config, terrain)
    }

    fn with_terrain(config: WorldConfig, terrain: TerrainGenerator) -> Self {
        Self {
            terrain,
            loaded: LruCache::unbounded(),
            modified: BTreeSet::new(),
            diverged: BTreeSet::new(),
            parked: FxHashMap::default(),
            change_counter: 0,
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn chunk_size(&self) -> i32 {
        self.config.chunk_size
    }

    pub fn world_height(&self) -> i32 {
        self.config.world_height
    }

    pub fn change_counter(&self) -> u64 {
        self.change_counter
    }

    pub fn in_vertical_range(&self, z: i32) -> bool {
        (0..self.config.world_height).contains(&z)
    }

    // -- coordinate transforms --

    /// Chunk key and local column offset for a world column. Floor division,
    /// so `x = -1` lands in chunk `-1` at local offset `size - 1`.
    pub fn world_to_chunk(&self, x: i32, y: i32) -> (ChunkKey, i32, i32) {
        let s = self.config.chunk_size;
        (
            ChunkKey::new(x.div_euclid(s), y.div_euclid(s)),
            x.rem_euclid(s),
            y.rem_euclid(s),
        )
    }

    pub fn chunk_to_world(&self, key: ChunkKey, lx: i32, ly: i32) -> (i32, i32) {
        let s = self.config.chunk_size;
        (key.cx * s + lx, key.cy * s + ly)
    }

    // -- chunk cache --

    pub fn is_loaded(&self, key: ChunkKey) -> bool {
        self.loaded.contains(&key)
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.loaded.len()
    }

    /// Load (generating if needed) and touch a chunk.
    pub fn get_chunk(&mut self, cx: i32, cy: i32) -> &Chunk {
        self.chunk_mut(ChunkKey::new(cx, cy))
    }

    fn chunk_mut(&mut self, key: ChunkKey) -> &mut Chunk {
        if !self.loaded.contains(&key) {
            self.make_room();
        }
        let parked = &mut self.parked;
        let terrain = &self.terrain;
        self.loaded.get_or_insert_mut(key, || {
            parked.remove(&key).unwrap_or_else(|| {
                log::trace!("generating {key}");
                terrain.generate(key)
            })
        })
    }

    /// Evict least-recently-touched chunks until one more fits.
    fn make_room(&mut self) {
        while self.loaded.len() >= self.config.max_loaded_chunks {
            let Some((key, chunk)) = self.loaded.pop_lru() else {
                break;
            };
            if self.diverged.contains(&key) {
                log::debug!("evicting diverged {key}; parked");
                self.parked.insert(key, chunk);
            } else {
                log::trace!("evicting {key}");
            }
        }
    }

    /// Generate many chunks at once, in parallel. Chunks that are already
    /// resident or parked are skipped.
    pub fn preload_chunks(&mut self, keys: &[ChunkKey]) {
        let wanted: Vec<ChunkKey> = keys
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|k| !self.loaded.contains(k) && !self.parked.contains_key(k))
            .collect();
        let terrain = &self.terrain;
        let generated: Vec<Chunk> = wanted.par_iter().map(|&k| terrain.generate(k)).collect();
        log::debug!("preloaded {} chunks", generated.len());
        for chunk in generated {
            self.make_room();
            self.loaded.put(chunk.key, chunk);
        }
    }

    // -- block access --

    /// Read a block, loading and touching its chunk. Out-of-range Z is air.
    pub fn get_block(&mut self, pos: WorldPos) -> BlockType {
        if !self.in_vertical_range(pos.z) {
            return BlockType::Air;
        }
        let (key, lx, ly) = self.world_to_chunk(pos.x, pos.y);
        self.chunk_mut(key).get(lx, ly, pos.z)
    }

    pub fn get_metadata(&mut self, pos: WorldPos) -> u8 {
        if !self.in_vertical_range(pos.z) {
            return 0;
        }
        let (key, lx, ly) = self.world_to_chunk(pos.x, pos.y);
        self.chunk_mut(key).metadata(lx, ly, pos.z)
    }

    /// Read a block without loading or touching anything. Non-resident
    /// chunks answer from parked edits or the terrain function.
    pub fn peek_block(&self, pos: WorldPos) -> BlockType {
        if !self.in_vertical_range(pos.z) {
            return BlockType::Air;
        }
        let (key, lx, ly) = self.world_to_chunk(pos.x, pos.y);
        match self.loaded.peek(&key).or_else(|| self.parked.get(&key)) {
            Some(chunk) => chunk.get(lx, ly, pos.z),
            None => self.terrain.block_at(pos),
        }
    }

    pub fn peek_metadata(&self, pos: WorldPos) -> u8 {
        if !self.in_vertical_range(pos.z) {
            return 0;
        }
        let (key, lx, ly) = self.world_to_chunk(pos.x, pos.y);
        self.loaded
            .peek(&key)
            .or_else(|| self.parked.get(&key))
            .map_or(0, |chunk| chunk.metadata(lx, ly, pos.z))
    }

    /// Write a block and clear its metadata. `false` if Z is out of range.
    pub fn set_block(&mut self, pos: WorldPos, block: BlockType) -> bool {
        self.set_block_with_meta(pos, block, 0)
    }

    pub fn set_block_with_meta(&mut self, pos: WorldPos, block: BlockType, meta: u8) -> bool {
        if !self.in_vertical_range(pos.z) {
            return false;
        }
        let (key, lx, ly) = self.world_to_chunk(pos.x, pos.y);
        if !self.chunk_mut(key).set(lx, ly, pos.z, block, meta) {
            return false;
        }
        self.modified.insert(key);
        self.diverged.insert(key);
        self.change_counter += 1;
        true
    }

    // -- queries --

    /// Ground at `z - 1` is walkable (or `z` is the floor) and the `height`
    /// cells from `z` up are not solid.
    pub fn can_stand_at(&self, pos: WorldPos, height: i32) -> bool {
        if !self.in_vertical_range(pos.z) {
            return false;
        }
        let footing = pos.z == 0 || self.peek_block(pos.below()).is_walkable();
        footing && (0..height).all(|dz| !self.peek_block(pos.offset(0, 0, dz)).is_solid())
    }

    /// Topmost solid block in a column, if any.
    pub fn surface_height(&self, x: i32, y: i32) -> Option<i32> {
        (0..self.config.world_height)
            .rev()
            .find(|&z| self.peek_block(WorldPos::new(x, y, z)).is_solid())
    }

    /// Normalized bounds with Z clamped to the vertical range. `None` when
    /// the clamped range is empty.
    fn clamp_region(&self, a: WorldPos, b: WorldPos) -> Option<Bounds> {
        let mut bounds = Bounds::from_corners(a, b);
        bounds.min.z = bounds.min.z.max(0);
        bounds.max.z = bounds.max.z.min(self.config.world_height - 1);
        (bounds.min.z <= bounds.max.z).then_some(bounds)
    }

    fn region_positions(bounds: Bounds) -> impl Iterator<Item = WorldPos> {
        (bounds.min.z..=bounds.max.z).flat_map(move |z| {
            (bounds.min.y..=bounds.max.y).flat_map(move |y| {
                (bounds.min.x..=bounds.max.x).map(move |x| WorldPos::new(x, y, z))
            })
        })
    }

    /// Set every block in the box. Returns the number of blocks written.
    pub fn fill_region(&mut self, a: WorldPos, b: WorldPos, block: BlockType) -> usize {
        let Some(bounds) = self.clamp_region(a, b) else {
            return 0;
        };
        Self::region_positions(bounds)
            .filter(|&p| self.set_block(p, block))
            .count()
    }

    /// Replace every `from` block in the box with `to`. Returns the number
    /// replaced.
    pub fn replace_blocks(
        &mut self,
        a: WorldPos,
        b: WorldPos,
        from: BlockType,
        to: BlockType,
    ) -> usize {
        let Some(bounds) = self.clamp_region(a, b) else {
            return 0;
        };
        let mut replaced = 0;
        for p in Self::region_positions(bounds) {
            if self.get_block(p) == from && self.set_block(p, to) {
                replaced += 1;
            }
        }
        replaced
    }

    /// Every position and block in the box, Z-major.
    pub fn region_blocks(&mut self, a: WorldPos, b: WorldPos) -> Vec<(WorldPos, BlockType)> {
        let Some(bounds) = self.clamp_region(a, b) else {
            return Vec::new();
        };
        Self::region_positions(bounds)
            .map(|p| (p, self.get_block(p)))
            .collect()
    }

    pub fn count_blocks(&mut self, a: WorldPos, b: WorldPos, block: BlockType) -> usize {
        let Some(bounds) = self.clamp_region(a, b) else {
            return 0;
        };
        Self::region_positions(bounds)
            .filter(|&p| self.get_block(p) == block)
            .count()
    }

    // -- persistence --

    pub fn modified_chunks(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.modified.iter().copied()
    }

    /// Copies of every chunk written since the last call, clearing the
    /// dirty set. The world keeps its edits: the chunks stay diverged and
    /// are still parked on eviction.
    pub fn take_modified(&mut self) -> Vec<Chunk> {
        let keys = std::mem::take(&mut self.modified);
        keys.iter()
            .filter_map(|key| self.loaded.peek(key).or_else(|| self.parked.get(key)))
            .cloned()
            .collect()
    }

    /// Every chunk that differs from generated terrain.
    pub fn diverged_chunks(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.diverged.iter().copied()
    }

    /// Re-install a previously persisted chunk, replacing whatever is
    /// resident for that key. The chunk counts as modified and diverged.
    pub fn restore_chunk(&mut self, chunk: Chunk) -> Result<(), SimError> {
        if !chunk.has_dimensions(self.config.chunk_size, self.config.world_height) {
            return Err(SimError::Snapshot(format!(
                "{} has dimensions that do not match this world",
                chunk.key
            )));
        }
        let key = chunk.key;
        self.loaded.pop(&key);
        self.parked.insert(key, chunk);
        self.modified.insert(key);
        self.diverged.insert(key);
        Ok(())
    }

    pub fn export(&self) -> WorldSnapshot {
        let chunks = self
            .diverged
            .iter()
            .filter_map(|key| self.loaded.peek(key).or_else(|| self.parked.get(key)))
            .cloned()
            .collect();
        WorldSnapshot {
            config: self.config.clone(),
            change_counter: self.change_counter,
            chunks,
        }
    }

    /// Rebuild a world from a snapshot. Terrain is regenerated from
    /// `snapshot.config`, so a world built with a custom height source
    /// must be re-created with `with_height_source` and fed chunks through
    /// `restore_chunk`.
    pub fn import(snapshot: WorldSnapshot) -> Result<Self, SimError> {
        let mut world = Self::new(snapshot.config);
        for chunk in snapshot.chunks {
            world.restore_chunk(chunk)?;
        }
        world.change_counter = snapshot.change_counter;
        Ok(world)
    }
}
