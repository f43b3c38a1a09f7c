// Commands that mutate simulation state.
//
// All external mutations go through `SimCommand`. The sim is a pure function
// `(state, commands) -> (new_state, events)`, and commands are the input.
//
// A `SimCommand` carries a `tick` (when to apply) and a `SimAction`:
// - `PlaceBlueprint` / `CancelSite` / `SetSitePriority` / `PauseSite` /
//   `ResumeSite`: construction site control (see `construction.rs`).
// - `LoadBlueprints`: add blueprint definitions from JSON.
// - `DesignateMining` / `CancelMining`: dig designations (see `mining.rs`).
// - `RegisterWorker` / `UnregisterWorker` / `SetWorkerNeeds`: the worker
//   roster (see `worker.rs`).
// - `SetBlock`: direct world edit, for scenario setup and editors.
// - `StockMaterial`: add material to the stockpile.
//
// See also: `sim.rs` for `apply_command()` which dispatches these.
//
// **Critical constraint: determinism.** Commands are the sole external input
// to the sim. `step()` expects them sorted by tick; ties apply in slice order.

use crate::block::{BlockType, Material};
use crate::types::{AgentId, BlueprintId, Priority, Rotation, SiteId, Tick, WorldPos};
use crate::worker::AgentProfile;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimCommand {
    pub tick: Tick,
    pub action: SimAction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SimAction {
    /// Place a blueprint with its origin at `position`. `priority` overrides
    /// the blueprint's default.
    PlaceBlueprint {
        blueprint: BlueprintId,
        position: WorldPos,
        rotation: Rotation,
        priority: Option<Priority>,
    },
    CancelSite {
        site: SiteId,
    },
    SetSitePriority {
        site: SiteId,
        priority: Priority,
    },
    PauseSite {
        site: SiteId,
    },
    ResumeSite {
        site: SiteId,
    },
    /// A JSON array of blueprint definitions.
    LoadBlueprints {
        json: String,
    },
    DesignateMining {
        position: WorldPos,
        priority: Priority,
    },
    CancelMining {
        position: WorldPos,
    },
    RegisterWorker {
        agent: AgentId,
        position: WorldPos,
        profile: AgentProfile,
    },
    UnregisterWorker {
        agent: AgentId,
    },
    SetWorkerNeeds {
        agent: AgentId,
        hunger: f32,
        fatigue: f32,
    },
    SetBlock {
        position: WorldPos,
        block: BlockType,
    },
    StockMaterial {
        material: Material,
        amount: u32,
    },
}

impl SimCommand {
    pub fn new(tick: Tick, action: SimAction) -> Self {
        Self { tick, action }
    }
}
