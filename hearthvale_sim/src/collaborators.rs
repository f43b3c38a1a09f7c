// Contracts for the systems workers depend on but this crate does not own.
//
// Workers need three collaborators besides the construction manager:
// - `Pathfinder`: `find_path(start, goal)` returning waypoints or `None`.
// - `MiningProvider`: offers, assigns, and tracks progress on dig tasks.
// - `HaulingProvider`: offers generic haul requests and fronts the material
//   store that construction hauling draws from.
//
// Each is injected into `WorkContext` as a trait object. A game without
// mining or stockpiles passes `NoMining` / `NoHauling`, which offer nothing
// and accept nothing, so the worker code never branches on "is this
// configured". `DirectPathfinder` is the simplest real pathfinder: a
// straight stepped line that ignores terrain.
//
// See also: `mining.rs` (`MiningQueue`) and `stockpile.rs` (`Stockpile`) for
// the in-crate implementations, `worker.rs` for the consumer.

use crate::block::{BlockType, Material};
use crate::types::{AgentId, HaulTaskId, MiningTaskId, Priority, WorldPos};

// ---------------------------------------------------------------------------
// Pathfinding
// ---------------------------------------------------------------------------

pub trait Pathfinder {
    /// Waypoints from just after `start` up to and including `goal`, or
    /// `None` if the goal is unreachable. An empty path means the agent is
    /// already there.
    fn find_path(&self, start: WorldPos, goal: WorldPos) -> Option<Vec<WorldPos>>;
}

/// Walks a straight diagonal line, one block per axis per step. Refuses
/// goals farther than `max_steps` away.
#[derive(Clone, Copy, Debug)]
pub struct DirectPathfinder {
    pub max_steps: usize,
}

impl Default for DirectPathfinder {
    fn default() -> Self {
        Self { max_steps: 4096 }
    }
}

impl Pathfinder for DirectPathfinder {
    fn find_path(&self, start: WorldPos, goal: WorldPos) -> Option<Vec<WorldPos>> {
        let steps = (goal.x - start.x)
            .abs()
            .max((goal.y - start.y).abs())
            .max((goal.z - start.z).abs()) as usize;
        if steps > self.max_steps {
            return None;
        }
        let mut path = Vec::with_capacity(steps);
        let mut cur = start;
        while cur != goal {
            cur = cur.offset(
                (goal.x - cur.x).signum(),
                (goal.y - cur.y).signum(),
                (goal.z - cur.z).signum(),
            );
            path.push(cur);
        }
        Some(path)
    }
}

// ---------------------------------------------------------------------------
// Mining
// ---------------------------------------------------------------------------

/// A dig task on offer to one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MiningOffer {
    pub task: MiningTaskId,
    pub pos: WorldPos,
    pub block: BlockType,
    pub priority: Priority,
    /// Horizontal distance from the asking agent.
    pub distance: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MiningProgress {
    /// Unknown task or not assigned to this agent.
    Rejected,
    /// Fraction of the work done, `0.0..1.0`.
    Working(f32),
    /// Work finished; the task is gone. The caller removes the block.
    Finished { pos: WorldPos, block: BlockType },
}

pub trait MiningProvider {
    fn available_task(&self, agent: AgentId, from: WorldPos) -> Option<MiningOffer>;
    fn assign_task(&mut self, task: MiningTaskId, agent: AgentId) -> bool;
    fn update_progress(
        &mut self,
        task: MiningTaskId,
        agent: AgentId,
        amount: f32,
    ) -> MiningProgress;
    /// Drop any task assigned to `agent`, keeping its progress. Idempotent.
    fn unassign_agent(&mut self, agent: AgentId) -> bool;
    /// Withdraw a designation whose target no longer exists.
    fn cancel_task(&mut self, task: MiningTaskId) -> bool;
}

/// No mining in this game.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMining;

impl MiningProvider for NoMining {
    fn available_task(&self, _agent: AgentId, _from: WorldPos) -> Option<MiningOffer> {
        None
    }

    fn assign_task(&mut self, _task: MiningTaskId, _agent: AgentId) -> bool {
        false
    }

    fn update_progress(
        &mut self,
        _task: MiningTaskId,
        _agent: AgentId,
        _amount: f32,
    ) -> MiningProgress {
        MiningProgress::Rejected
    }

    fn unassign_agent(&mut self, _agent: AgentId) -> bool {
        false
    }

    fn cancel_task(&mut self, _task: MiningTaskId) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Hauling / stockpile
// ---------------------------------------------------------------------------

/// A generic haul request on offer to one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HaulOffer {
    pub task: HaulTaskId,
    pub from: WorldPos,
    pub to: WorldPos,
    pub material: Material,
    pub amount: u32,
    pub priority: Priority,
    /// Horizontal distance from the asking agent to the pickup.
    pub distance: f32,
}

pub trait HaulingProvider {
    fn available_task(&self, agent: AgentId, from: WorldPos) -> Option<HaulOffer>;
    fn assign_task(&mut self, task: HaulTaskId, agent: AgentId) -> bool;
    fn complete_task(&mut self, task: HaulTaskId, agent: AgentId) -> bool;
    /// Drop any request assigned to `agent`. Idempotent.
    fn unassign_task(&mut self, agent: AgentId) -> bool;

    /// Whether at least one unit of `material` can be picked up.
    fn has_material(&self, material: Material) -> bool;
    /// Where to collect `material`, preferring sources near `near`.
    fn material_source(&self, material: Material, near: WorldPos) -> Option<WorldPos>;
    fn take_material(&mut self, material: Material, amount: u32) -> bool;
    /// Put back material a hauler was carrying when it gave up.
    fn store_material(&mut self, material: Material, amount: u32);
}

/// No stockpile in this game. Construction hauling never finds material.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHauling;

impl HaulingProvider for NoHauling {
    fn available_task(&self, _agent: AgentId, _from: WorldPos) -> Option<HaulOffer> {
        None
    }

    fn assign_task(&mut self, _task: HaulTaskId, _agent: AgentId) -> bool {
        false
    }

    fn complete_task(&mut self, _task: HaulTaskId, _agent: AgentId) -> bool {
        false
    }

    fn unassign_task(&mut self, _agent: AgentId) -> bool {
        false
    }

    fn has_material(&self, _material: Material) -> bool {
        false
    }

    fn material_source(&self, _material: Material, _near: WorldPos) -> Option<WorldPos> {
        None
    }

    fn take_material(&mut self, _material: Material, _amount: u32) -> bool {
        false
    }

    fn store_material(&mut self, _material: Material, _amount: u32) {}
}
