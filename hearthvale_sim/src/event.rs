// Player-visible narrative events emitted by `Sim::step()`.
//
// Each `SimEvent` is stamped with the tick it happened on. The sim collects
// them in processing order: commands first, then reservation expiry, then
// worker updates in registration order.
//
// See also: `sim.rs` which emits these, `worker.rs` for the lower-level
// `WorkerEvent`s that most of them are derived from.

use crate::block::{BlockType, Material};
use crate::types::{AgentId, BlueprintId, SiteId, Tick, WorldPos};
use crate::worker::{AbandonReason, TaskType};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: Tick,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    SitePlaced {
        site: SiteId,
        blueprint: BlueprintId,
    },
    /// A placement command failed validation. `reason` is the rendered
    /// error.
    PlacementRejected {
        blueprint: BlueprintId,
        position: WorldPos,
        reason: String,
    },
    SiteCancelled {
        site: SiteId,
    },
    MaterialDelivered {
        site: SiteId,
        pos: WorldPos,
        material: Material,
    },
    BlockCompleted {
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
    },
    SiteCompleted {
        site: SiteId,
    },
    BlockMined {
        pos: WorldPos,
        block: BlockType,
        agent: AgentId,
    },
    /// Unsupported blocks above a mined cell fell. `deposits` are the cells
    /// that received gravel.
    CaveIn {
        origin: WorldPos,
        collapsed: Vec<WorldPos>,
        deposits: Vec<WorldPos>,
    },
    ReservationExpired {
        agent: AgentId,
        site: SiteId,
        pos: WorldPos,
    },
    WorkerAbandonedTask {
        agent: AgentId,
        task: TaskType,
        reason: AbandonReason,
    },
}
