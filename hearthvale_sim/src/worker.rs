// Worker behavior: per-agent task selection and the work state machine.
//
// Every tick each registered agent advances one step through:
//
//   Idle -> SeekingTask -> TravelingToTask -> { Mining
//                                             | HaulingPickup -> HaulingDelivery
//                                             | Building } -> Returning -> Idle
//
// `SeekingTask` gathers one candidate from each source (construction
// building, construction hauling, mining, generic hauling), scores them, and
// reserves only the winner. Scoring:
//
//   max(0, distance_base - distance) + priority_weight * rank + skill * skill_weight
//
// Ties keep the earlier source in that order. Per-tick work is the base rate
// times a multiplier of `(0.5 + skill / 100)` scaled by the agent's trait
// factors and clamped to the configured range.
//
// Construction hauling is two legs: travel to the material source and take
// one unit (`HaulingPickup`), then carry it to the site's drop-off and
// confirm delivery (`HaulingDelivery`). Generic haul requests follow the same
// legs between their own endpoints.
//
// Abandonment releases every reservation type the agent might hold
// (construction ledger, mining assignment, haul assignment) and puts back
// carried material. It fires on critical needs, repeated path failures, lost
// tasks, and unregistration. An agent with critical needs stays idle until
// they drop.
//
// See also: `construction.rs` for the reservation ledger, `collaborators.rs`
// for the injected mining / hauling / pathfinding contracts, `sim.rs` which
// builds a `WorkContext` each tick and turns `WorkerEvent`s into `SimEvent`s.
//
// **Critical constraint: determinism.** Agents update in registration order
// and every collaborator scan is deterministic, so identical inputs give
// identical assignments.

use crate::block::{BlockType, Material};
use crate::collaborators::{
    HaulOffer, HaulingProvider, MiningOffer, MiningProgress, MiningProvider, Pathfinder,
};
use crate::config::{Trait, WorkerConfig};
use crate::construction::{ConstructionManager, WorkCandidate};
use crate::site::ProgressOutcome;
use crate::types::{AgentId, HaulTaskId, MiningTaskId, Priority, SiteId, Tick, WorldPos};
use crate::world::VoxelWorld;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, VecDeque};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    #[default]
    Idle,
    SeekingTask,
    TravelingToTask,
    Mining,
    HaulingPickup,
    HaulingDelivery,
    Building,
    Returning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    Mining,
    Hauling,
    Building,
}

/// The task an agent currently holds, with the reservation it came from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActiveTask {
    Mine {
        task: MiningTaskId,
        pos: WorldPos,
        /// The block that was designated. A different block at `pos` ends
        /// the dig.
        block: BlockType,
    },
    /// Bring one unit of material to a construction block.
    SupplySite {
        site: SiteId,
        block: WorldPos,
        material: Material,
        pickup: WorldPos,
        drop_off: WorldPos,
        carrying: bool,
    },
    /// A generic haul request.
    Haul {
        task: HaulTaskId,
        from: WorldPos,
        to: WorldPos,
        material: Material,
        amount: u32,
        carrying: bool,
    },
    Build {
        site: SiteId,
        block: WorldPos,
    },
}

impl ActiveTask {
    pub fn task_type(&self) -> TaskType {
        match self {
            ActiveTask::Mine { .. } => TaskType::Mining,
            ActiveTask::SupplySite { .. } | ActiveTask::Haul { .. } => TaskType::Hauling,
            ActiveTask::Build { .. } => TaskType::Building,
        }
    }

    /// Where the current leg ends.
    pub fn destination(&self) -> WorldPos {
        match *self {
            ActiveTask::Mine { pos, .. } => pos,
            ActiveTask::SupplySite {
                pickup,
                drop_off,
                carrying,
                ..
            } => {
                if carrying {
                    drop_off
                } else {
                    pickup
                }
            }
            ActiveTask::Haul { from, to, carrying, .. } => {
                if carrying {
                    to
                } else {
                    from
                }
            }
            ActiveTask::Build { block, .. } => block,
        }
    }

    fn holds_construction_reservation(&self) -> bool {
        matches!(self, ActiveTask::SupplySite { .. } | ActiveTask::Build { .. })
    }
}

/// Skills (0..100 per task type, missing means the configured default) and
/// personality traits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub skills: BTreeMap<TaskType, f32>,
    pub traits: SmallVec<[Trait; 2]>,
}

impl AgentProfile {
    pub fn with_skill(mut self, task: TaskType, skill: f32) -> Self {
        self.skills.insert(task, skill.clamp(0.0, 100.0));
        self
    }

    pub fn with_trait(mut self, t: Trait) -> Self {
        if !self.traits.contains(&t) {
            self.traits.push(t);
        }
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: f32,
    pub fatigue: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub blocks_mined: u32,
    pub blocks_built: u32,
    pub deliveries: u32,
    pub hauls_completed: u32,
    pub tasks_abandoned: u32,
    pub work_ticks: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbandonReason {
    Needs,
    PathFailed,
    /// The reservation vanished (site cancelled, reservation expired, task
    /// removed).
    TaskLost,
    MaterialUnavailable,
    Unregistered,
    Requested,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: WorldPos,
    pub profile: AgentProfile,
    state: WorkerState,
    task: Option<ActiveTask>,
    path: VecDeque<WorldPos>,
    path_failures: u32,
    needs: Needs,
    stats: WorkerStats,
}

impl Agent {
    fn new(id: AgentId, position: WorldPos, profile: AgentProfile) -> Self {
        Self {
            id,
            position,
            profile,
            state: WorkerState::Idle,
            task: None,
            path: VecDeque::new(),
            path_failures: 0,
            needs: Needs::default(),
            stats: WorkerStats::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn task(&self) -> Option<&ActiveTask> {
        self.task.as_ref()
    }

    pub fn needs(&self) -> Needs {
        self.needs
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerEvent {
    Mined {
        agent: AgentId,
        pos: WorldPos,
        block: BlockType,
    },
    Delivered {
        agent: AgentId,
        site: SiteId,
        pos: WorldPos,
        material: Material,
    },
    HaulCompleted {
        agent: AgentId,
        task: HaulTaskId,
        material: Material,
        amount: u32,
    },
    BlockBuilt {
        agent: AgentId,
        site: SiteId,
        pos: WorldPos,
    },
    Abandoned {
        agent: AgentId,
        task: TaskType,
        reason: AbandonReason,
    },
}

/// Everything an agent touches during one update.
pub struct WorkContext<'a> {
    pub tick: Tick,
    pub world: &'a mut VoxelWorld,
    pub construction: &'a mut ConstructionManager,
    pub mining: &'a mut dyn MiningProvider,
    pub hauling: &'a mut dyn HaulingProvider,
    pub pathfinder: &'a dyn Pathfinder,
}

/// Persistent form: agents in registration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub agents: Vec<Agent>,
}

#[derive(Clone, Debug)]
pub struct WorkerBehavior {
    config: WorkerConfig,
    /// Construction progress per tick at multiplier 1.0.
    build_rate: f32,
    agents: Vec<Agent>,
}

enum Choice {
    Build(WorkCandidate),
    Supply(WorkCandidate, Material, WorldPos),
    Mine(MiningOffer),
    Haul(HaulOffer),
}

enum Movement {
    Arrived,
    Moving,
    Failed,
}

impl WorkerBehavior {
    pub fn new(config: WorkerConfig, build_rate: f32) -> Self {
        Self {
            config,
            build_rate,
            agents: Vec::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Add an agent. Returns false if the id is already registered.
    pub fn register(&mut self, id: AgentId, position: WorldPos, profile: AgentProfile) -> bool {
        if self.agents.iter().any(|a| a.id == id) {
            return false;
        }
        self.agents.push(Agent::new(id, position, profile));
        log::debug!("registered worker {id} at {position}");
        true
    }

    /// Remove an agent, releasing everything it holds. Unknown ids are a
    /// no-op.
    pub fn unregister(&mut self, id: AgentId, ctx: &mut WorkContext<'_>) -> Option<Agent> {
        let idx = self.agents.iter().position(|a| a.id == id)?;
        let mut agent = self.agents.remove(idx);
        let mut events = Vec::new();
        abandon(&mut agent, ctx, AbandonReason::Unregistered, &mut events);
        log::debug!("unregistered worker {id}");
        Some(agent)
    }

    /// Drop the agent's current task. Returns the abandonment event, or
    /// `None` for an unknown or taskless agent.
    pub fn abandon_task(&mut self, id: AgentId, ctx: &mut WorkContext<'_>) -> Option<WorkerEvent> {
        let agent = self.agents.iter_mut().find(|a| a.id == id)?;
        let mut events = Vec::new();
        abandon(agent, ctx, AbandonReason::Requested, &mut events);
        events.pop()
    }

    pub fn set_needs(&mut self, id: AgentId, hunger: f32, fatigue: f32) -> bool {
        match self.agents.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                a.needs = Needs { hunger, fatigue };
                true
            }
            None => false,
        }
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Candidate score for a task at `distance` with the given priority,
    /// done by an agent with `skill`.
    pub fn score(&self, distance: f32, priority: Priority, skill: f32) -> f32 {
        score(&self.config, distance, priority, skill)
    }

    /// Work-rate multiplier for `profile` doing `task`.
    pub fn work_multiplier(&self, profile: &AgentProfile, task: TaskType) -> f32 {
        work_multiplier(&self.config, profile, task)
    }

    /// Advance every agent one tick, in registration order.
    pub fn update(&mut self, ctx: &mut WorkContext<'_>) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        let Self {
            config,
            build_rate,
            agents,
        } = self;
        for agent in agents.iter_mut() {
            step_agent(config, *build_rate, agent, ctx, &mut events);
        }
        events
    }

    pub fn export(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            agents: self.agents.clone(),
        }
    }

    pub fn import(snapshot: WorkerSnapshot, config: WorkerConfig, build_rate: f32) -> Self {
        Self {
            config,
            build_rate,
            agents: snapshot.agents,
        }
    }
}

fn skill(config: &WorkerConfig, profile: &AgentProfile, task: TaskType) -> f32 {
    profile.skills.get(&task).copied().unwrap_or(config.default_skill)
}

fn score(config: &WorkerConfig, distance: f32, priority: Priority, skill: f32) -> f32 {
    (config.distance_base - distance).max(0.0)
        + config.priority_weight * f32::from(priority.rank())
        + skill * config.skill_weight
}

fn work_multiplier(config: &WorkerConfig, profile: &AgentProfile, task: TaskType) -> f32 {
    let base = 0.5 + skill(config, profile, task) / 100.0;
    let traits: f32 = profile
        .traits
        .iter()
        .map(|t| config.trait_factors.get(t).copied().unwrap_or(1.0))
        .product();
    (base * traits).clamp(config.min_work_multiplier, config.max_work_multiplier)
}

fn arrival_range(config: &WorkerConfig, task: TaskType) -> f32 {
    match task {
        TaskType::Mining => config.mining_arrival_range,
        TaskType::Hauling => config.hauling_arrival_range,
        TaskType::Building => config.building_arrival_range,
    }
}

fn needs_critical(config: &WorkerConfig, needs: Needs) -> bool {
    needs.hunger >= config.critical_hunger || needs.fatigue >= config.critical_fatigue
}

fn step_agent(
    config: &WorkerConfig,
    build_rate: f32,
    agent: &mut Agent,
    ctx: &mut WorkContext<'_>,
    events: &mut Vec<WorkerEvent>,
) {
    if needs_critical(config, agent.needs) {
        if agent.task.is_some() {
            abandon(agent, ctx, AbandonReason::Needs, events);
        }
        agent.state = WorkerState::Idle;
        return;
    }

    if agent
        .task
        .is_some_and(|t| t.holds_construction_reservation())
        && !ctx.construction.touch_reservation(agent.id, ctx.tick)
    {
        abandon(agent, ctx, AbandonReason::TaskLost, events);
        return;
    }

    match agent.state {
        WorkerState::Idle => agent.state = WorkerState::SeekingTask,
        WorkerState::SeekingTask => seek_task(config, agent, ctx),
        WorkerState::TravelingToTask => match advance(config, agent, ctx) {
            Movement::Arrived => {
                agent.state = match agent.task {
                    Some(ActiveTask::Mine { .. }) => WorkerState::Mining,
                    Some(ActiveTask::Build { .. }) => WorkerState::Building,
                    Some(_) => WorkerState::HaulingPickup,
                    None => WorkerState::Idle,
                };
            }
            Movement::Moving => {}
            Movement::Failed => abandon(agent, ctx, AbandonReason::PathFailed, events),
        },
        WorkerState::Mining => mine(config, agent, ctx, events),
        WorkerState::HaulingPickup => pick_up(agent, ctx, events),
        WorkerState::HaulingDelivery => match advance(config, agent, ctx) {
            Movement::Arrived => deliver(agent, ctx, events),
            Movement::Moving => {}
            Movement::Failed => abandon(agent, ctx, AbandonReason::PathFailed, events),
        },
        WorkerState::Building => build(config, build_rate, agent, ctx, events),
        WorkerState::Returning => agent.state = WorkerState::Idle,
    }
}

fn seek_task(config: &WorkerConfig, agent: &mut Agent, ctx: &mut WorkContext<'_>) {
    let pos = agent.position;
    let mut best: Option<(f32, Choice)> = None;
    let mut consider = |s: f32, choice: Choice| {
        if best.as_ref().is_none_or(|(b, _)| s > *b) {
            best = Some((s, choice));
        }
    };

    {
        let construction: &ConstructionManager = &*ctx.construction;
        let hauling: &dyn HaulingProvider = &*ctx.hauling;
        let mining: &dyn MiningProvider = &*ctx.mining;

        if let Some(c) = construction.peek_building_work(pos) {
            let sk = skill(config, &agent.profile, TaskType::Building);
            consider(score(config, c.distance, c.priority, sk), Choice::Build(c));
        }
        let supply = construction
            .peek_hauling_work(pos, |m| hauling.has_material(m))
            .and_then(|c| {
                let material = c.material?;
                let source = hauling.material_source(material, pos)?;
                Some((c, material, source))
            });
        if let Some((c, material, source)) = supply {
            let sk = skill(config, &agent.profile, TaskType::Hauling);
            consider(
                score(config, c.distance, c.priority, sk),
                Choice::Supply(c, material, source),
            );
        }
        if let Some(o) = mining.available_task(agent.id, pos) {
            let sk = skill(config, &agent.profile, TaskType::Mining);
            consider(score(config, o.distance, o.priority, sk), Choice::Mine(o));
        }
        if let Some(o) = hauling.available_task(agent.id, pos) {
            let sk = skill(config, &agent.profile, TaskType::Hauling);
            consider(score(config, o.distance, o.priority, sk), Choice::Haul(o));
        }
    }

    let Some((_, choice)) = best else {
        agent.state = WorkerState::Idle;
        return;
    };

    let (id, tick) = (agent.id, ctx.tick);
    let task = match choice {
        Choice::Build(c) => ctx
            .construction
            .reserve_building(c.site, c.pos, id, tick)
            .then_some(ActiveTask::Build {
                site: c.site,
                block: c.pos,
            }),
        Choice::Supply(c, material, pickup) => ctx
            .construction
            .reserve_hauling(c.site, c.pos, id, tick)
            .then_some(ActiveTask::SupplySite {
                site: c.site,
                block: c.pos,
                material,
                pickup,
                drop_off: c.target,
                carrying: false,
            }),
        Choice::Mine(o) => ctx.mining.assign_task(o.task, id).then_some(ActiveTask::Mine {
            task: o.task,
            pos: o.pos,
            block: o.block,
        }),
        Choice::Haul(o) => ctx.hauling.assign_task(o.task, id).then_some(ActiveTask::Haul {
            task: o.task,
            from: o.from,
            to: o.to,
            material: o.material,
            amount: o.amount,
            carrying: false,
        }),
    };

    match task {
        Some(t) => {
            log::trace!("{id} took {:?} task at tick {tick}", t.task_type());
            agent.task = Some(t);
            agent.path.clear();
            agent.path_failures = 0;
            agent.state = WorkerState::TravelingToTask;
        }
        None => agent.state = WorkerState::Idle,
    }
}

/// Move along the path toward the current leg's destination.
fn advance(config: &WorkerConfig, agent: &mut Agent, ctx: &mut WorkContext<'_>) -> Movement {
    let Some(task) = agent.task else {
        return Movement::Failed;
    };
    let goal = task.destination();
    let range = arrival_range(config, task.task_type());
    if agent.position.distance(goal) <= range {
        agent.path.clear();
        return Movement::Arrived;
    }

    if agent.path.back() != Some(&goal) {
        match ctx.pathfinder.find_path(agent.position, goal) {
            Some(path) if !path.is_empty() => agent.path = path.into(),
            _ => {
                agent.path.clear();
                agent.path_failures += 1;
                log::trace!(
                    "{} failed to path to {goal} ({} times)",
                    agent.id,
                    agent.path_failures
                );
                return if agent.path_failures >= config.max_path_failures {
                    Movement::Failed
                } else {
                    Movement::Moving
                };
            }
        }
    }

    for _ in 0..config.steps_per_tick.max(1) {
        let Some(next) = agent.path.pop_front() else {
            break;
        };
        agent.position = next;
        if agent.position.distance(goal) <= range {
            agent.path.clear();
            return Movement::Arrived;
        }
    }
    Movement::Moving
}

fn mine(
    config: &WorkerConfig,
    agent: &mut Agent,
    ctx: &mut WorkContext<'_>,
    events: &mut Vec<WorkerEvent>,
) {
    let Some(ActiveTask::Mine { task, pos, block }) = agent.task else {
        abandon(agent, ctx, AbandonReason::TaskLost, events);
        return;
    };
    // Something else (a cave-in, a finished build) replaced the block.
    let found = ctx.world.get_block(pos);
    if found != block {
        log::debug!("{} stops digging {pos}: expected {block}, found {found}", agent.id);
        ctx.mining.cancel_task(task);
        abandon(agent, ctx, AbandonReason::TaskLost, events);
        return;
    }
    let amount = config.mining_rate * work_multiplier(config, &agent.profile, TaskType::Mining);
    match ctx.mining.update_progress(task, agent.id, amount) {
        MiningProgress::Working(_) => agent.stats.work_ticks += 1,
        MiningProgress::Finished { pos, block } => {
            if !ctx.world.set_block(pos, BlockType::Air) {
                abandon(agent, ctx, AbandonReason::TaskLost, events);
                return;
            }
            agent.stats.work_ticks += 1;
            agent.stats.blocks_mined += 1;
            events.push(WorkerEvent::Mined {
                agent: agent.id,
                pos,
                block,
            });
            finish(agent);
        }
        MiningProgress::Rejected => abandon(agent, ctx, AbandonReason::TaskLost, events),
    }
}

fn pick_up(agent: &mut Agent, ctx: &mut WorkContext<'_>, events: &mut Vec<WorkerEvent>) {
    let picked = match agent.task {
        Some(ActiveTask::SupplySite { material, .. }) => {
            if !ctx.hauling.take_material(material, 1) {
                abandon(agent, ctx, AbandonReason::MaterialUnavailable, events);
                return;
            }
            true
        }
        // Generic haul loads lie at the pickup point.
        Some(ActiveTask::Haul { .. }) => true,
        _ => false,
    };
    if !picked {
        abandon(agent, ctx, AbandonReason::TaskLost, events);
        return;
    }
    if let Some(ActiveTask::SupplySite { carrying, .. } | ActiveTask::Haul { carrying, .. }) =
        &mut agent.task
    {
        *carrying = true;
    }
    agent.path.clear();
    agent.state = WorkerState::HaulingDelivery;
}

fn deliver(agent: &mut Agent, ctx: &mut WorkContext<'_>, events: &mut Vec<WorkerEvent>) {
    let delivered = match agent.task {
        Some(ActiveTask::SupplySite {
            site,
            block,
            material,
            ..
        }) => {
            let ok = ctx
                .construction
                .confirm_delivery(site, block, agent.id, ctx.tick)
                .unwrap_or(false);
            if ok {
                agent.stats.deliveries += 1;
                events.push(WorkerEvent::Delivered {
                    agent: agent.id,
                    site,
                    pos: block,
                    material,
                });
            }
            ok
        }
        Some(ActiveTask::Haul {
            task,
            material,
            amount,
            ..
        }) => {
            let ok = ctx.hauling.complete_task(task, agent.id);
            if ok {
                agent.stats.hauls_completed += 1;
                events.push(WorkerEvent::HaulCompleted {
                    agent: agent.id,
                    task,
                    material,
                    amount,
                });
            }
            ok
        }
        _ => false,
    };
    if delivered {
        finish(agent);
    } else {
        abandon(agent, ctx, AbandonReason::TaskLost, events);
    }
}

fn build(
    config: &WorkerConfig,
    build_rate: f32,
    agent: &mut Agent,
    ctx: &mut WorkContext<'_>,
    events: &mut Vec<WorkerEvent>,
) {
    let Some(ActiveTask::Build { site, block }) = agent.task else {
        abandon(agent, ctx, AbandonReason::TaskLost, events);
        return;
    };
    let amount = build_rate * work_multiplier(config, &agent.profile, TaskType::Building);
    let outcome = ctx
        .construction
        .add_build_progress(ctx.world, site, block, agent.id, amount, ctx.tick);
    match outcome {
        Ok(ProgressOutcome::Progressed(_)) => agent.stats.work_ticks += 1,
        Ok(ProgressOutcome::Completed) => {
            agent.stats.work_ticks += 1;
            agent.stats.blocks_built += 1;
            events.push(WorkerEvent::BlockBuilt {
                agent: agent.id,
                site,
                pos: block,
            });
            finish(agent);
        }
        Ok(ProgressOutcome::Rejected) | Err(_) => {
            abandon(agent, ctx, AbandonReason::TaskLost, events)
        }
    }
}

fn finish(agent: &mut Agent) {
    agent.task = None;
    agent.path.clear();
    agent.path_failures = 0;
    agent.state = WorkerState::Returning;
}

/// Release every reservation type `agent` could hold and return carried
/// material. Safe to call with no task.
fn abandon(
    agent: &mut Agent,
    ctx: &mut WorkContext<'_>,
    reason: AbandonReason,
    events: &mut Vec<WorkerEvent>,
) {
    let task = agent.task.take();
    ctx.construction.release_agent(agent.id);
    ctx.mining.unassign_agent(agent.id);
    ctx.hauling.unassign_task(agent.id);
    if let Some(ActiveTask::SupplySite {
        material,
        carrying: true,
        ..
    }) = task
    {
        ctx.hauling.store_material(material, 1);
    }
    if let Some(t) = task {
        agent.stats.tasks_abandoned += 1;
        log::debug!("{} abandoned {:?} task: {reason:?}", agent.id, t.task_type());
        events.push(WorkerEvent::Abandoned {
            agent: agent.id,
            task: t.task_type(),
            reason,
        });
    }
    agent.path.clear();
    agent.path_failures = 0;
    agent.state = WorkerState::Idle;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockType;
    use crate::collaborators::{DirectPathfinder, NoHauling, NoMining};
    use crate::config::{ConstructionConfig, TerrainConfig, WorldConfig};
    use crate::mining::MiningQueue;
    use crate::site::SiteStatus;
    use crate::stockpile::Stockpile;
    use crate::types::{BlueprintId, Rotation};

    struct Harness {
        world: VoxelWorld,
        construction: ConstructionManager,
        mining: MiningQueue,
        stockpile: Stockpile,
        workers: WorkerBehavior,
        tick: Tick,
    }

    struct NoPath;

    impl Pathfinder for NoPath {
        fn find_path(&self, _start: WorldPos, _goal: WorldPos) -> Option<Vec<WorldPos>> {
            None
        }
    }

    impl Harness {
        fn new(height: i32) -> Self {
            let world = VoxelWorld::new(WorldConfig {
                terrain: TerrainConfig::Flat { height },
                ..WorldConfig::default()
            });
            Self {
                world,
                construction: ConstructionManager::with_builtins(ConstructionConfig::default()),
                mining: MiningQueue::new(),
                stockpile: Stockpile::new(WorldPos::new(0, -4, height)),
                workers: WorkerBehavior::new(WorkerConfig::default(), 1.0),
                tick: 0,
            }
        }

        fn step_with(&mut self, pathfinder: &dyn Pathfinder) -> Vec<WorkerEvent> {
            self.tick += 1;
            let mut ctx = WorkContext {
                tick: self.tick,
                world: &mut self.world,
                construction: &mut self.construction,
                mining: &mut self.mining,
                hauling: &mut self.stockpile,
                pathfinder,
            };
            self.workers.update(&mut ctx)
        }

        fn step(&mut self) -> Vec<WorkerEvent> {
            self.step_with(&DirectPathfinder::default())
        }

        fn place_wall(&mut self) -> SiteId {
            self.construction
                .place_blueprint(
                    &self.world,
                    &BlueprintId::from("stone_wall"),
                    WorldPos::new(0, 0, 0),
                    Rotation::R0,
                    0,
                )
                .unwrap()
        }
    }

    const A: AgentId = AgentId(1);
    const B: AgentId = AgentId(2);

    #[test]
    fn score_combines_distance_priority_and_skill() {
        let w = WorkerBehavior::new(WorkerConfig::default(), 1.0);
        assert_eq!(w.score(0.0, Priority::Normal, 50.0), 100.0 + 10.0 + 10.0);
        assert_eq!(w.score(150.0, Priority::Low, 0.0), 0.0);
        assert!(w.score(10.0, Priority::Urgent, 50.0) > w.score(10.0, Priority::High, 50.0));
    }

    #[test]
    fn multiplier_scales_with_skill_and_traits() {
        let w = WorkerBehavior::new(WorkerConfig::default(), 1.0);
        let plain = AgentProfile::default();
        assert!((w.work_multiplier(&plain, TaskType::Building) - 1.0).abs() < 1e-6);

        let expert = AgentProfile::default()
            .with_skill(TaskType::Building, 100.0)
            .with_trait(Trait::Diligent);
        assert!((w.work_multiplier(&expert, TaskType::Building) - 1.8).abs() < 1e-5);

        let capped = expert.clone().with_trait(Trait::Strong);
        assert_eq!(w.work_multiplier(&capped, TaskType::Building), 2.0);

        let slacker = AgentProfile::default()
            .with_skill(TaskType::Mining, 0.0)
            .with_trait(Trait::Lazy);
        assert_eq!(w.work_multiplier(&slacker, TaskType::Mining), 0.5);
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut w = WorkerBehavior::new(WorkerConfig::default(), 1.0);
        assert!(w.register(A, WorldPos::default(), AgentProfile::default()));
        assert!(!w.register(A, WorldPos::default(), AgentProfile::default()));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn single_worker_builds_wall_from_stockpile() {
        let mut h = Harness::new(0);
        let site = h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 10);
        h.workers.register(A, WorldPos::new(0, -4, 0), AgentProfile::default());

        for _ in 0..5000 {
            h.step();
            if h.construction.site(site).unwrap().status() == SiteStatus::Completed {
                break;
            }
        }
        assert_eq!(h.construction.site(site).unwrap().status(), SiteStatus::Completed);
        for x in 0..5 {
            assert_eq!(h.world.peek_block(WorldPos::new(x, 0, 0)), BlockType::Cobblestone);
            assert_eq!(h.world.peek_block(WorldPos::new(x, 0, 1)), BlockType::Cobblestone);
        }
        let stats = h.workers.agent(A).unwrap().stats();
        assert_eq!(stats.deliveries, 10);
        assert_eq!(stats.blocks_built, 10);
        assert_eq!(h.stockpile.count(crate::block::Material::Stone), 0);
        assert_eq!(h.construction.reservation_count(), 0);
    }

    #[test]
    fn no_material_means_no_construction_hauling() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.workers.register(A, WorldPos::new(0, -4, 0), AgentProfile::default());
        for _ in 0..20 {
            h.step();
        }
        assert_eq!(h.construction.reservation_count(), 0);
        assert!(h.workers.agent(A).unwrap().task().is_none());
    }

    #[test]
    fn critical_needs_release_reservation_and_stay_idle() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 10);
        h.workers.register(A, WorldPos::new(0, -4, 0), AgentProfile::default());
        h.step();
        h.step();
        assert!(h.construction.reservation(A).is_some());

        h.workers.set_needs(A, 95.0, 0.0);
        let events = h.step();
        assert!(events.contains(&WorkerEvent::Abandoned {
            agent: A,
            task: TaskType::Hauling,
            reason: AbandonReason::Needs,
        }));
        assert_eq!(h.construction.reservation_count(), 0);
        for _ in 0..10 {
            h.step();
            assert_eq!(h.workers.agent(A).unwrap().state(), WorkerState::Idle);
        }

        h.workers.set_needs(A, 0.0, 0.0);
        h.step();
        h.step();
        assert!(h.construction.reservation(A).is_some());
    }

    #[test]
    fn carried_material_goes_back_on_abandon() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 1);
        // Standing on the stockpile so pickup happens right away.
        h.workers.register(A, h.stockpile.position(), AgentProfile::default());
        for _ in 0..4 {
            h.step();
        }
        assert_eq!(h.workers.agent(A).unwrap().state(), WorkerState::HaulingDelivery);
        assert_eq!(h.stockpile.count(crate::block::Material::Stone), 0);

        let mut ctx = WorkContext {
            tick: h.tick,
            world: &mut h.world,
            construction: &mut h.construction,
            mining: &mut h.mining,
            hauling: &mut h.stockpile,
            pathfinder: &DirectPathfinder::default(),
        };
        let event = h.workers.abandon_task(A, &mut ctx);
        assert!(matches!(
            event,
            Some(WorkerEvent::Abandoned {
                reason: AbandonReason::Requested,
                ..
            })
        ));
        assert_eq!(h.stockpile.count(crate::block::Material::Stone), 1);
        assert_eq!(h.construction.reservation_count(), 0);
    }

    #[test]
    fn repeated_path_failures_abandon() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 10);
        h.workers.register(A, WorldPos::new(0, -40, 0), AgentProfile::default());
        let mut abandoned = false;
        for _ in 0..10 {
            let events = h.step_with(&NoPath);
            abandoned |= events.iter().any(|e| {
                matches!(
                    e,
                    WorkerEvent::Abandoned {
                        reason: AbandonReason::PathFailed,
                        ..
                    }
                )
            });
        }
        assert!(abandoned);
        assert!(h.workers.agent(A).unwrap().stats().tasks_abandoned >= 1);
    }

    #[test]
    fn unregister_is_idempotent_and_releases() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 10);
        h.workers.register(A, WorldPos::new(0, -4, 0), AgentProfile::default());
        h.step();
        h.step();
        assert_eq!(h.construction.reservation_count(), 1);

        let pathfinder = DirectPathfinder::default();
        let mut ctx = WorkContext {
            tick: h.tick,
            world: &mut h.world,
            construction: &mut h.construction,
            mining: &mut h.mining,
            hauling: &mut h.stockpile,
            pathfinder: &pathfinder,
        };
        assert!(h.workers.unregister(A, &mut ctx).is_some());
        assert!(h.workers.unregister(A, &mut ctx).is_none());
        assert!(h.workers.unregister(B, &mut ctx).is_none());
        assert_eq!(h.construction.reservation_count(), 0);
        assert!(h.workers.is_empty());
    }

    #[test]
    fn miner_clears_designated_block() {
        let mut h = Harness::new(4);
        let pos = WorldPos::new(2, 0, 3);
        let block = h.world.peek_block(pos);
        assert_eq!(block, BlockType::Grass);
        h.mining.designate(pos, block, Priority::Normal, 0);
        h.workers.register(A, WorldPos::new(0, 0, 4), AgentProfile::default());

        let mut mined = None;
        for _ in 0..500 {
            for e in h.step() {
                if let WorkerEvent::Mined { pos, .. } = e {
                    mined = Some(pos);
                }
            }
            if mined.is_some() {
                break;
            }
        }
        assert_eq!(mined, Some(pos));
        assert_eq!(h.world.peek_block(pos), BlockType::Air);
        assert!(h.mining.is_empty());
        assert_eq!(h.workers.agent(A).unwrap().stats().blocks_mined, 1);
    }

    #[test]
    fn dig_stops_when_the_block_changes_underneath() {
        let mut h = Harness::new(4);
        let pos = WorldPos::new(2, 0, 3);
        h.mining.designate(pos, BlockType::Grass, Priority::Normal, 0);
        h.workers.register(A, WorldPos::new(0, 0, 4), AgentProfile::default());
        for _ in 0..10 {
            h.step();
            if h.workers.agent(A).unwrap().state() == WorkerState::Mining {
                break;
            }
        }
        assert_eq!(h.workers.agent(A).unwrap().state(), WorkerState::Mining);

        // Rubble lands on the designated cell mid-dig.
        h.world.set_block(pos, BlockType::Gravel);
        let events = h.step();
        assert!(events.iter().any(|e| matches!(
            e,
            WorkerEvent::Abandoned {
                task: TaskType::Mining,
                reason: AbandonReason::TaskLost,
                ..
            }
        )));
        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::Mined { .. })));
        assert_eq!(h.world.peek_block(pos), BlockType::Gravel);
        assert!(h.mining.is_empty());
        assert_eq!(h.workers.agent(A).unwrap().stats().blocks_mined, 0);
    }

    #[test]
    fn two_workers_never_share_a_block() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 10);
        h.workers.register(A, WorldPos::new(0, -4, 0), AgentProfile::default());
        h.workers.register(B, WorldPos::new(0, -4, 0), AgentProfile::default());
        for _ in 0..200 {
            h.step();
            let held: Vec<_> = h.construction.reservations().map(|r| (r.site, r.pos)).collect();
            let mut dedup = held.clone();
            dedup.sort();
            dedup.dedup();
            assert_eq!(held.len(), dedup.len());
        }
    }

    #[test]
    fn null_collaborators_leave_workers_idle() {
        let mut world = VoxelWorld::new(WorldConfig {
            terrain: TerrainConfig::Flat { height: 0 },
            ..WorldConfig::default()
        });
        let mut construction = ConstructionManager::with_builtins(ConstructionConfig::default());
        let mut workers = WorkerBehavior::new(WorkerConfig::default(), 1.0);
        workers.register(A, WorldPos::default(), AgentProfile::default());
        let mut mining = NoMining;
        let mut hauling = NoHauling;
        for tick in 1..=5 {
            let mut ctx = WorkContext {
                tick,
                world: &mut world,
                construction: &mut construction,
                mining: &mut mining,
                hauling: &mut hauling,
                pathfinder: &DirectPathfinder::default(),
            };
            assert!(workers.update(&mut ctx).is_empty());
        }
        assert!(workers.agent(A).unwrap().task().is_none());
    }

    #[test]
    fn snapshot_preserves_agents() {
        let mut h = Harness::new(0);
        h.place_wall();
        h.stockpile.add(crate::block::Material::Stone, 10);
        h.workers.register(
            A,
            WorldPos::new(0, -4, 0),
            AgentProfile::default().with_trait(Trait::Clumsy),
        );
        for _ in 0..3 {
            h.step();
        }
        let json = serde_json::to_string(&h.workers.export()).unwrap();
        let restored = WorkerBehavior::import(
            serde_json::from_str(&json).unwrap(),
            WorkerConfig::default(),
            1.0,
        );
        assert_eq!(restored.agents(), h.workers.agents());
    }
}
