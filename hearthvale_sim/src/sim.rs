// Simulation state and fixed-tick loop.
//
// `Sim` owns every subsystem: the voxel world, the construction manager, the
// mining queue, the stockpile, the worker roster, the cave-in resolver, and
// the PRNG. It is the single entry point for driving a game:
// `step(commands, target_tick)` advances one tick at a time until
// `target_tick`, and each tick runs:
//
//   1. Commands whose tick has come, in slice order.
//   2. Stale construction reservations are released.
//   3. Workers update in registration order (`worker.rs`).
//   4. Worker events are resolved: mined blocks trigger cave-in checks and
//      file a haul request bringing their yield to the stockpile; built
//      blocks are checked for site completion.
//
// Snapshots (`to_json` / `from_json`) carry every subsystem's persistent
// form. Derived structures (spatial index, reservation ledger, chunk cache)
// are rebuilt on load.
//
// See also: `command.rs` for inputs, `event.rs` for outputs, `config.rs` for
// `GameConfig`.
//
// **Critical constraint: determinism.** The only randomness is the sim's
// `GameRng`, consumed only by cave-in rolls. All iteration is over ordered
// collections, so a seed plus a command list replays exactly.

use crate::collaborators::DirectPathfinder;
use crate::command::{SimAction, SimCommand};
use crate::config::GameConfig;
use crate::construction::{ConstructionManager, ConstructionSnapshot};
use crate::error::SimError;
use crate::event::{SimEvent, SimEventKind};
use crate::mining::{MiningQueue, MiningSnapshot};
use crate::prng::GameRng;
use crate::site::SiteStatus;
use crate::stockpile::{Stockpile, StockpileSnapshot};
use crate::structural::CaveInManager;
use crate::types::{Priority, Tick};
use crate::worker::{WorkContext, WorkerBehavior, WorkerEvent, WorkerSnapshot};
use crate::world::{VoxelWorld, WorldSnapshot};
use serde::{Deserialize, Serialize};

/// Result of a `step()` call.
#[derive(Clone, Debug, Default)]
pub struct StepResult {
    pub events: Vec<SimEvent>,
}

/// Everything needed to restore a `Sim`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub config: GameConfig,
    pub tick: Tick,
    pub rng: GameRng,
    pub world: WorldSnapshot,
    pub construction: ConstructionSnapshot,
    pub mining: MiningSnapshot,
    pub stockpile: StockpileSnapshot,
    pub workers: WorkerSnapshot,
}

#[derive(Debug)]
pub struct Sim {
    config: GameConfig,
    tick: Tick,
    rng: GameRng,
    world: VoxelWorld,
    construction: ConstructionManager,
    mining: MiningQueue,
    stockpile: Stockpile,
    workers: WorkerBehavior,
    cave_in: CaveInManager,
    pathfinder: DirectPathfinder,
}

impl Sim {
    /// Create a new simulation with the given seed and config. Built-in
    /// blueprints are preloaded. The config is validated first.
    pub fn new(seed: u64, config: GameConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            tick: 0,
            rng: GameRng::new(seed),
            world: VoxelWorld::new(config.world.clone()),
            construction: ConstructionManager::with_builtins(config.construction.clone()),
            mining: MiningQueue::new(),
            stockpile: Stockpile::new(config.stockpile_position),
            workers: WorkerBehavior::new(config.worker.clone(), config.construction.work_tick_rate),
            cave_in: CaveInManager::new(config.cave_in.clone()),
            pathfinder: DirectPathfinder::default(),
            config,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn world(&self) -> &VoxelWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut VoxelWorld {
        &mut self.world
    }

    pub fn construction(&self) -> &ConstructionManager {
        &self.construction
    }

    pub fn mining(&self) -> &MiningQueue {
        &self.mining
    }

    pub fn stockpile(&self) -> &Stockpile {
        &self.stockpile
    }

    pub fn workers(&self) -> &WorkerBehavior {
        &self.workers
    }

    /// Advance to `target_tick`, applying `commands` (sorted by tick) as
    /// their ticks come up. Commands past `target_tick` are ignored.
    pub fn step(&mut self, commands: &[SimCommand], target_tick: Tick) -> StepResult {
        let mut events = Vec::new();
        let mut cmd_idx = 0;

        while self.tick < target_tick {
            self.tick += 1;
            while cmd_idx < commands.len() && commands[cmd_idx].tick <= self.tick {
                let cmd = &commands[cmd_idx];
                cmd_idx += 1;
                self.apply_command(cmd, &mut events);
            }
            self.run_tick(&mut events);
        }

        StepResult { events }
    }

    fn emit(&self, events: &mut Vec<SimEvent>, kind: SimEventKind) {
        events.push(SimEvent { tick: self.tick, kind });
    }

    fn apply_command(&mut self, cmd: &SimCommand, events: &mut Vec<SimEvent>) {
        let now = self.tick;
        match &cmd.action {
            SimAction::PlaceBlueprint {
                blueprint,
                position,
                rotation,
                priority,
            } => {
                match self
                    .construction
                    .place_blueprint(&self.world, blueprint, *position, *rotation, now)
                {
                    Ok(site) => {
                        if let Some(p) = priority {
                            if let Err(e) = self.construction.set_site_priority(site, *p) {
                                log::warn!("could not set priority on {site}: {e}");
                            }
                        }
                        self.emit(
                            events,
                            SimEventKind::SitePlaced {
                                site,
                                blueprint: blueprint.clone(),
                            },
                        );
                    }
                    Err(e) => {
                        log::debug!("rejected placement of '{blueprint}' at {position}: {e}");
                        self.emit(
                            events,
                            SimEventKind::PlacementRejected {
                                blueprint: blueprint.clone(),
                                position: *position,
                                reason: e.to_string(),
                            },
                        );
                    }
                }
            }
            SimAction::CancelSite { site } => match self.construction.cancel_site(*site) {
                Ok(_) => self.emit(events, SimEventKind::SiteCancelled { site: *site }),
                Err(e) => log::warn!("cancel failed: {e}"),
            },
            SimAction::SetSitePriority { site, priority } => {
                if let Err(e) = self.construction.set_site_priority(*site, *priority) {
                    log::warn!("priority change failed: {e}");
                }
            }
            SimAction::PauseSite { site } => {
                if let Err(e) = self.construction.pause_site(*site) {
                    log::warn!("pause failed: {e}");
                }
            }
            SimAction::ResumeSite { site } => {
                if let Err(e) = self.construction.resume_site(*site) {
                    log::warn!("resume failed: {e}");
                }
            }
            SimAction::LoadBlueprints { json } => {
                match self.construction.library_mut().load_json(json) {
                    Ok(ids) => log::debug!("loaded {} blueprints", ids.len()),
                    Err(e) => log::warn!("blueprint load failed: {e}"),
                }
            }
            SimAction::DesignateMining { position, priority } => {
                let block = self.world.get_block(*position);
                if self.mining.designate(*position, block, *priority, now).is_none() {
                    log::debug!("cannot designate {block} at {position} for mining");
                }
            }
            SimAction::CancelMining { position } => {
                self.mining.cancel(*position);
            }
            SimAction::RegisterWorker {
                agent,
                position,
                profile,
            } => {
                if !self.workers.register(*agent, *position, profile.clone()) {
                    log::warn!("worker {agent} already registered");
                }
            }
            SimAction::UnregisterWorker { agent } => {
                let mut ctx = WorkContext {
                    tick: now,
                    world: &mut self.world,
                    construction: &mut self.construction,
                    mining: &mut self.mining,
                    hauling: &mut self.stockpile,
                    pathfinder: &self.pathfinder,
                };
                self.workers.unregister(*agent, &mut ctx);
            }
            SimAction::SetWorkerNeeds {
                agent,
                hunger,
                fatigue,
            } => {
                self.workers.set_needs(*agent, *hunger, *fatigue);
            }
            SimAction::SetBlock { position, block } => {
                if !self.world.set_block(*position, *block) {
                    log::warn!("set_block outside the world at {position}");
                }
            }
            SimAction::StockMaterial { material, amount } => {
                self.stockpile.add(*material, *amount);
            }
        }
    }

    fn run_tick(&mut self, events: &mut Vec<SimEvent>) {
        let now = self.tick;
        for r in self.construction.expire_stale_reservations(now) {
            self.emit(
                events,
                SimEventKind::ReservationExpired {
                    agent: r.agent,
                    site: r.site,
                    pos: r.pos,
                },
            );
        }

        let worker_events = {
            let mut ctx = WorkContext {
                tick: now,
                world: &mut self.world,
                construction: &mut self.construction,
                mining: &mut self.mining,
                hauling: &mut self.stockpile,
                pathfinder: &self.pathfinder,
            };
            self.workers.update(&mut ctx)
        };

        for event in worker_events {
            self.resolve_worker_event(event, events);
        }
    }

    fn resolve_worker_event(&mut self, event: WorkerEvent, events: &mut Vec<SimEvent>) {
        match event {
            WorkerEvent::Mined { agent, pos, block } => {
                self.emit(events, SimEventKind::BlockMined { pos, block, agent });
                let report = self.cave_in.after_mining(&mut self.world, pos, &mut self.rng);
                if !report.is_empty() {
                    log::debug!("cave-in above {pos}: {} blocks fell", report.collapsed.len());
                    self.emit(
                        events,
                        SimEventKind::CaveIn {
                            origin: pos,
                            collapsed: report.collapsed.iter().map(|(p, _)| *p).collect(),
                            deposits: report.deposits.clone(),
                        },
                    );
                }
                if let Some(material) = block.mined_yield() {
                    let home = self.stockpile.position();
                    self.stockpile
                        .request_haul(pos, home, material, 1, Priority::Low, self.tick);
                }
            }
            WorkerEvent::Delivered {
                site,
                pos,
                material,
                ..
            } => self.emit(events, SimEventKind::MaterialDelivered { site, pos, material }),
            WorkerEvent::HaulCompleted { .. } => {}
            WorkerEvent::BlockBuilt { agent, site, pos } => {
                self.emit(events, SimEventKind::BlockCompleted { site, pos, agent });
                if self
                    .construction
                    .site(site)
                    .is_some_and(|s| s.status() == SiteStatus::Completed)
                {
                    log::debug!("{site} completed at tick {}", self.tick);
                    self.emit(events, SimEventKind::SiteCompleted { site });
                }
            }
            WorkerEvent::Abandoned { agent, task, reason } => {
                self.emit(events, SimEventKind::WorkerAbandonedTask { agent, task, reason })
            }
        }
    }

    // -- persistence --

    pub fn export(&self) -> SimSnapshot {
        SimSnapshot {
            config: self.config.clone(),
            tick: self.tick,
            rng: self.rng.clone(),
            world: self.world.export(),
            construction: self.construction.export(),
            mining: self.mining.export(),
            stockpile: self.stockpile.export(),
            workers: self.workers.export(),
        }
    }

    pub fn import(snapshot: SimSnapshot) -> Result<Self, SimError> {
        let config = snapshot.config;
        config.validate()?;
        Ok(Self {
            tick: snapshot.tick,
            rng: snapshot.rng,
            world: VoxelWorld::import(snapshot.world)?,
            construction: ConstructionManager::import(
                snapshot.construction,
                config.construction.clone(),
            ),
            mining: MiningQueue::import(snapshot.mining),
            stockpile: Stockpile::import(snapshot.stockpile),
            workers: WorkerBehavior::import(
                snapshot.workers,
                config.worker.clone(),
                config.construction.work_tick_rate,
            ),
            cave_in: CaveInManager::new(config.cave_in.clone()),
            pathfinder: DirectPathfinder::default(),
            config,
        })
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string(&self.export()).map_err(|e| SimError::Snapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let snapshot: SimSnapshot =
            serde_json::from_str(json).map_err(|e| SimError::Snapshot(e.to_string()))?;
        Self::import(snapshot)
    }
}
