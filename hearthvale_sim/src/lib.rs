// hearthvale_sim — voxel world and construction simulation library.
//
// This crate contains the simulation core for Hearthvale: a chunked voxel
// world with procedural terrain, blueprint-driven construction sites,
// reservation-based work assignment for worker agents, mining with cave-ins,
// and a stockpile that feeds construction hauling. It has no rendering or
// engine dependencies and can be tested, benchmarked, and run headless.
//
// Module overview:
// - `sim.rs`:           Top-level Sim, fixed-tick loop, command/event processing.
// - `world.rs`:         Chunked voxel world with LRU-cached chunks and Perlin terrain.
// - `block.rs`:         BlockType / Material and their properties.
// - `blueprint.rs`:     Blueprint definitions, compilation, rotation, built-in library.
// - `site.rs`:          ConstructionSite and the per-block state machine.
// - `construction.rs`:  ConstructionManager — placement, reservation ledger, work discovery.
// - `spatial.rs`:       Chunk-bucketed spatial index over site bounds.
// - `structural.rs`:    Placement validation (foundations, bounds) and cave-ins.
// - `worker.rs`:        WorkerBehavior — agent state machine and task scoring.
// - `collaborators.rs`: Pathfinder / MiningProvider / HaulingProvider contracts.
// - `mining.rs`:        MiningQueue — dig designations.
// - `stockpile.rs`:     Stockpile — material inventory and haul requests.
// - `command.rs`:       SimCommand / SimAction — all sim mutations.
// - `event.rs`:         Narrative SimEvents.
// - `config.rs`:        GameConfig — all tunable parameters.
// - `error.rs`:         SimError and friends.
// - `prng`:             Re-exported from `hearthvale_prng` — xoshiro256++ PRNG.
// - `types.rs`:         WorldPos, ChunkKey, Bounds, ids, Priority, Rotation.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, commands) -> (new_state, events)`. All randomness comes from the
// seeded PRNG. No system time, no OS entropy. Ordered collections (`BTreeMap`,
// `BTreeSet`) wherever iteration order can reach sim state; hash maps only
// for lookups.

pub mod block;
pub mod blueprint;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod construction;
pub mod error;
pub mod event;
pub mod mining;
pub use hearthvale_prng as prng;
pub mod sim;
pub mod site;
pub mod spatial;
pub mod stockpile;
pub mod structural;
pub mod types;
pub mod worker;
pub mod world;
