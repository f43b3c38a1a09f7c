// Mining designations.
//
// `MiningQueue` holds the blocks the player has marked for digging. Each
// designation becomes a `MiningTask` with at most one assignee and a progress
// counter measured against the block's hardness. Finishing a task removes it
// and reports the position; the worker clears the block from the world and
// the sim resolves cave-ins.
//
// Offers go to the closest unassigned task, scanning highest priority first
// (ties on distance go to the earlier-scanned task). Unassigning keeps
// progress so the next miner picks up where the last one stopped.
//
// See also: `collaborators.rs` for the `MiningProvider` contract,
// `structural.rs` for cave-ins, `sim.rs` which designates tasks from
// `SimAction::DesignateMining`.
//
// **Critical constraint: determinism.** Tasks live in `BTreeMap`s keyed by
// sequential ids.

use crate::block::BlockType;
use crate::collaborators::{MiningOffer, MiningProgress, MiningProvider};
use crate::types::{AgentId, MiningTaskId, Priority, Tick, WorldPos};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiningTask {
    pub id: MiningTaskId,
    pub pos: WorldPos,
    pub block: BlockType,
    pub priority: Priority,
    pub assignee: Option<AgentId>,
    pub progress: f32,
    /// Work units to finish; the block's hardness.
    pub required: f32,
    pub designated_at: Tick,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MiningSnapshot {
    pub tasks: Vec<MiningTask>,
    pub next_id: u64,
}

#[derive(Clone, Debug, Default)]
pub struct MiningQueue {
    tasks: BTreeMap<MiningTaskId, MiningTask>,
    by_pos: BTreeMap<WorldPos, MiningTaskId>,
    next_id: u64,
}

impl MiningQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a block for digging. `None` if it cannot be mined or is already
    /// designated.
    pub fn designate(
        &mut self,
        pos: WorldPos,
        block: BlockType,
        priority: Priority,
        now: Tick,
    ) -> Option<MiningTaskId> {
        if !block.is_mineable() || self.by_pos.contains_key(&pos) {
            return None;
        }
        self.next_id += 1;
        let id = MiningTaskId(self.next_id);
        self.tasks.insert(
            id,
            MiningTask {
                id,
                pos,
                block,
                priority,
                assignee: None,
                progress: 0.0,
                required: block.hardness(),
                designated_at: now,
            },
        );
        self.by_pos.insert(pos, id);
        log::trace!("designated {id} at {pos} ({block})");
        Some(id)
    }

    /// Remove a designation. Any assignee simply finds its task gone.
    pub fn cancel(&mut self, pos: WorldPos) -> Option<MiningTask> {
        let id = self.by_pos.remove(&pos)?;
        self.tasks.remove(&id)
    }

    pub fn task(&self, id: MiningTaskId) -> Option<&MiningTask> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &MiningTask> {
        self.tasks.values()
    }

    pub fn is_designated(&self, pos: WorldPos) -> bool {
        self.by_pos.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn export(&self) -> MiningSnapshot {
        MiningSnapshot {
            tasks: self.tasks.values().cloned().collect(),
            next_id: self.next_id,
        }
    }

    pub fn import(snapshot: MiningSnapshot) -> Self {
        let mut queue = Self {
            next_id: snapshot.next_id,
            ..Self::default()
        };
        for task in snapshot.tasks {
            queue.next_id = queue.next_id.max(task.id.0);
            queue.by_pos.insert(task.pos, task.id);
            queue.tasks.insert(task.id, task);
        }
        queue
    }
}

impl MiningProvider for MiningQueue {
    fn available_task(&self, _agent: AgentId, from: WorldPos) -> Option<MiningOffer> {
        let mut open: Vec<&MiningTask> =
            self.tasks.values().filter(|t| t.assignee.is_none()).collect();
        open.sort_by_key(|t| (Reverse(t.priority), t.id));
        let mut best: Option<MiningOffer> = None;
        for t in open {
            let distance = from.distance_2d(t.pos);
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(MiningOffer {
                    task: t.id,
                    pos: t.pos,
                    block: t.block,
                    priority: t.priority,
                    distance,
                });
            }
        }
        best
    }

    fn assign_task(&mut self, task: MiningTaskId, agent: AgentId) -> bool {
        match self.tasks.get_mut(&task) {
            Some(t) if t.assignee.is_none() => {
                t.assignee = Some(agent);
                true
            }
            _ => false,
        }
    }

    fn update_progress(
        &mut self,
        task: MiningTaskId,
        agent: AgentId,
        amount: f32,
    ) -> MiningProgress {
        let Some(t) = self.tasks.get_mut(&task) else {
            return MiningProgress::Rejected;
        };
        if t.assignee != Some(agent) {
            return MiningProgress::Rejected;
        }
        t.progress = (t.progress + amount.max(0.0)).min(t.required);
        if t.progress < t.required {
            return MiningProgress::Working(t.progress / t.required);
        }
        let (pos, block) = (t.pos, t.block);
        self.tasks.remove(&task);
        self.by_pos.remove(&pos);
        MiningProgress::Finished { pos, block }
    }

    fn unassign_agent(&mut self, agent: AgentId) -> bool {
        let mut any = false;
        for t in self.tasks.values_mut().filter(|t| t.assignee == Some(agent)) {
            t.assignee = None;
            any = true;
        }
        any
    }
    fn cancel_task(&mut self, task: MiningTaskId) -> bool {
        match self.tasks.remove(&task) {
            Some(t) => {
                self.by_pos.remove(&t.pos);
                true
            }
            None => false,
        }
    }
}
