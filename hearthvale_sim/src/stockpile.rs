// Shared material store and generic haul requests.
//
// `Stockpile` is a single inventory at a fixed position. Construction haulers
// collect material here (`material_source` / `take_material`) before carrying
// it to a site's drop-off. Independently, the stockpile tracks generic haul
// requests ("carry N units of X from A to B"), each with at most one assignee.
// A request whose destination is the stockpile adds its load to the
// inventory on completion; that is how mined material comes back into use.
//
// See also: `collaborators.rs` for the `HaulingProvider` contract,
// `sim.rs` which files a request for every mined block's yield.
//
// **Critical constraint: determinism.** Inventory and requests are
// `BTreeMap`s.

use crate::block::Material;
use crate::collaborators::{HaulOffer, HaulingProvider};
use crate::types::{AgentId, HaulTaskId, Priority, Tick, WorldPos};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HaulRequest {
    pub id: HaulTaskId,
    pub from: WorldPos,
    pub to: WorldPos,
    pub material: Material,
    pub amount: u32,
    pub priority: Priority,
    pub assignee: Option<AgentId>,
    pub created_at: Tick,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StockpileSnapshot {
    pub position: WorldPos,
    pub inventory: BTreeMap<Material, u32>,
    pub requests: Vec<HaulRequest>,
    pub next_id: u64,
}

#[derive(Clone, Debug)]
pub struct Stockpile {
    position: WorldPos,
    inventory: BTreeMap<Material, u32>,
    requests: BTreeMap<HaulTaskId, HaulRequest>,
    next_id: u64,
}

impl Stockpile {
    pub fn new(position: WorldPos) -> Self {
        Self {
            position,
            inventory: BTreeMap::new(),
            requests: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn position(&self) -> WorldPos {
        self.position
    }

    pub fn add(&mut self, material: Material, amount: u32) {
        if amount > 0 {
            *self.inventory.entry(material).or_insert(0) += amount;
        }
    }

    pub fn count(&self, material: Material) -> u32 {
        self.inventory.get(&material).copied().unwrap_or(0)
    }

    /// Remove `amount` units. All or nothing.
    pub fn take(&mut self, material: Material, amount: u32) -> bool {
        match self.inventory.get_mut(&material) {
            Some(n) if *n >= amount => {
                *n -= amount;
                if *n == 0 {
                    self.inventory.remove(&material);
                }
                true
            }
            _ => false,
        }
    }

    pub fn inventory(&self) -> &BTreeMap<Material, u32> {
        &self.inventory
    }

    pub fn request_haul(
        &mut self,
        from: WorldPos,
        to: WorldPos,
        material: Material,
        amount: u32,
        priority: Priority,
        now: Tick,
    ) -> HaulTaskId {
        self.next_id += 1;
        let id = HaulTaskId(self.next_id);
        self.requests.insert(
            id,
            HaulRequest {
                id,
                from,
                to,
                material,
                amount,
                priority,
                assignee: None,
                created_at: now,
            },
        );
        log::trace!("haul request {id}: {amount} {material} {from} -> {to}");
        id
    }

    pub fn request(&self, id: HaulTaskId) -> Option<&HaulRequest> {
        self.requests.get(&id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &HaulRequest> {
        self.requests.values()
    }

    pub fn cancel_request(&mut self, id: HaulTaskId) -> Option<HaulRequest> {
        self.requests.remove(&id)
    }

    pub fn export(&self) -> StockpileSnapshot {
        StockpileSnapshot {
            position: self.position,
            inventory: self.inventory.clone(),
            requests: self.requests.values().cloned().collect(),
            next_id: self.next_id,
        }
    }

    pub fn import(snapshot: StockpileSnapshot) -> Self {
        let mut stockpile = Self::new(snapshot.position);
        stockpile.inventory = snapshot.inventory;
        stockpile.next_id = snapshot.next_id;
        for r in snapshot.requests {
            stockpile.next_id = stockpile.next_id.max(r.id.0);
            stockpile.requests.insert(r.id, r);
        }
        stockpile
    }
}

impl HaulingProvider for Stockpile {
    fn available_task(&self, _agent: AgentId, from: WorldPos) -> Option<HaulOffer> {
        let mut open: Vec<&HaulRequest> =
            self.requests.values().filter(|r| r.assignee.is_none()).collect();
        open.sort_by_key(|r| (Reverse(r.priority), r.id));
        let mut best: Option<HaulOffer> = None;
        for r in open {
            let distance = from.distance_2d(r.from);
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(HaulOffer {
                    task: r.id,
                    from: r.from,
                    to: r.to,
                    material: r.material,
                    amount: r.amount,
                    priority: r.priority,
                    distance,
                });
            }
        }
        best
    }

    fn assign_task(&mut self, task: HaulTaskId, agent: AgentId) -> bool {
        match self.requests.get_mut(&task) {
            Some(r) if r.assignee.is_none() => {
                r.assignee = Some(agent);
                true
            }
            _ => false,
        }
    }

    fn complete_task(&mut self, task: HaulTaskId, agent: AgentId) -> bool {
        match self.requests.get(&task) {
            Some(r) if r.assignee == Some(agent) => {}
            _ => return false,
        }
        let Some(r) = self.requests.remove(&task) else {
            return false;
        };
        if r.to == self.position {
            self.add(r.material, r.amount);
        }
        true
    }

    fn unassign_task(&mut self, agent: AgentId) -> bool {
        let mut any = false;
        for r in self.requests.values_mut().filter(|r| r.assignee == Some(agent)) {
            r.assignee = None;
            any = true;
        }
        any
    }

    fn has_material(&self, material: Material) -> bool {
        self.count(material) > 0
    }

    fn material_source(&self, material: Material, _near: WorldPos) -> Option<WorldPos> {
        self.has_material(material).then_some(self.position)
    }

    fn take_material(&mut self, material: Material, amount: u32) -> bool {
        self.take(material, amount)
    }

    fn store_material(&mut self, material: Material, amount: u32) {
        self.add(material, amount);
    }
}
