// Construction sites: one placed blueprint and the build state of each block.
//
// A `ConstructionSite` maps world positions to `ConstructionBlock`s. Each
// block walks a one-way state machine:
//
//   Pending -> MaterialsReserved -> MaterialsDelivered -> InProgress -> Completed
//
// with exactly two sanctioned regressions: a hauler may drop its reservation
// (MaterialsReserved -> Pending) and a builder may be released early
// (InProgress -> MaterialsDelivered, progress kept). `Completed` absorbs
// every further transition. All transitions are guarded methods on the site
// that return `false` when the guard fails; callers treat that as ordinary
// contention, not an error.
//
// A block is *buildable* when its materials are delivered and it is either
// on the site's base level or the cell beneath it is completed or not part of
// the blueprint. Among buildable blocks, lower build-order keys go first.
//
// The site's own status is derived from its blocks plus two stored flags
// (paused, cancelled). Cancelling releases every reservation and discards
// unfinished blocks; blocks already written to the world stay there.
//
// See also: `blueprint.rs` for the template a site is stamped from,
// `construction.rs` which owns all sites and writes completed blocks into the
// world.
//
// **Critical constraint: determinism.** Blocks live in a `BTreeMap` and the
// build sequence is a sorted `Vec`, so every scan visits blocks in the same
// order.

use crate::block::{BlockType, Material};
use crate::blueprint::Blueprint;
use crate::types::{AgentId, BlueprintId, Bounds, Priority, Rotation, SiteId, Tick, WorldPos};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress value at which a block is finished.
pub const FULL_PROGRESS: f32 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockStatus {
    Pending,
    MaterialsReserved,
    MaterialsDelivered,
    InProgress,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteStatus {
    Planned,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

/// When each transition last happened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTimestamps {
    pub reserved_at: Option<Tick>,
    pub delivered_at: Option<Tick>,
    pub started_at: Option<Tick>,
    pub completed_at: Option<Tick>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructionBlock {
    pub pos: WorldPos,
    pub block: BlockType,
    pub rotation: Rotation,
    pub order: u32,
    status: BlockStatus,
    reserved_by: Option<AgentId>,
    builder: Option<AgentId>,
    progress: f32,
    pub timestamps: BlockTimestamps,
    /// Last tick the current reservation holder showed signs of life.
    last_touched: Tick,
}

impl ConstructionBlock {
    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn material(&self) -> Option<Material> {
        self.block.material()
    }

    pub fn reserved_by(&self) -> Option<AgentId> {
        self.reserved_by
    }

    pub fn builder(&self) -> Option<AgentId> {
        self.builder
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_completed(&self) -> bool {
        self.status == BlockStatus::Completed
    }

    /// The agent currently holding this block, hauler or builder.
    pub fn holder(&self) -> Option<AgentId> {
        self.reserved_by.or(self.builder)
    }
}

/// Result of adding build progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressOutcome {
    /// Wrong agent, wrong state, or unknown block.
    Rejected,
    /// Work recorded; block still in progress.
    Progressed(f32),
    /// Progress reached 100 and the block is now completed.
    Completed,
}

/// Per-status block counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    pub total: usize,
    pub pending: usize,
    pub reserved: usize,
    pub delivered: usize,
    pub in_progress: usize,
    pub completed: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstructionSite {
    pub id: SiteId,
    pub blueprint: BlueprintId,
    pub origin: WorldPos,
    pub rotation: Rotation,
    pub priority: Priority,
    #[serde(with = "blocks_as_list")]
    blocks: BTreeMap<WorldPos, ConstructionBlock>,
    /// Every block position sorted by `(order, pos)`.
    sequence: Vec<WorldPos>,
    bounds: Bounds,
    drop_off: WorldPos,
    total_blocks: usize,
    completed_blocks: usize,
    materials: BTreeMap<Material, u32>,
    delivered: BTreeMap<Material, u32>,
    paused: bool,
    cancelled: bool,
    pub created_at: Tick,
    completed_at: Option<Tick>,
}

impl ConstructionSite {
    /// Stamp an (already rotated) blueprint at `origin`.
    pub fn new(
        id: SiteId,
        blueprint: &Blueprint,
        origin: WorldPos,
        rotation: Rotation,
        priority: Priority,
        now: Tick,
    ) -> Self {
        let mut blocks = BTreeMap::new();
        let mut sequence = Vec::with_capacity(blueprint.block_count());
        for b in blueprint.blocks() {
            let pos = origin.offset(b.offset.x, b.offset.y, b.offset.z);
            blocks.insert(
                pos,
                ConstructionBlock {
                    pos,
                    block: b.block,
                    rotation: b.rotation,
                    order: b.order,
                    status: BlockStatus::Pending,
                    reserved_by: None,
                    builder: None,
                    progress: 0.0,
                    timestamps: BlockTimestamps::default(),
                    last_touched: now,
                },
            );
            sequence.push(pos);
        }
        sequence.sort_by_key(|p| (blocks[p].order, *p));

        let bounds = site_bounds(blueprint, origin);
        let drop_off = match blueprint.entry_points().first() {
            Some(e) => origin.offset(e.x, e.y, e.z),
            None => origin.offset(blueprint.width() / 2, -1, 0),
        };

        Self {
            id,
            blueprint: blueprint.id.clone(),
            origin,
            rotation,
            priority,
            total_blocks: blocks.len(),
            completed_blocks: 0,
            blocks,
            sequence,
            bounds,
            drop_off,
            materials: blueprint.materials().clone(),
            delivered: BTreeMap::new(),
            paused: false,
            cancelled: false,
            created_at: now,
            completed_at: None,
        }
    }

    // -- queries --

    pub fn status(&self) -> SiteStatus {
        if self.cancelled {
            SiteStatus::Cancelled
        } else if self.total_blocks > 0 && self.completed_blocks == self.total_blocks {
            SiteStatus::Completed
        } else if self.paused {
            SiteStatus::Paused
        } else if self
            .blocks
            .values()
            .any(|b| b.status >= BlockStatus::MaterialsDelivered)
        {
            SiteStatus::InProgress
        } else {
            SiteStatus::Planned
        }
    }

    /// Sites that still want haulers and builders.
    pub fn is_workable(&self) -> bool {
        matches!(self.status(), SiteStatus::Planned | SiteStatus::InProgress)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status(), SiteStatus::Completed | SiteStatus::Cancelled)
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn drop_off(&self) -> WorldPos {
        self.drop_off
    }

    pub fn base_z(&self) -> i32 {
        self.bounds.min.z
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn completed_blocks(&self) -> usize {
        self.completed_blocks
    }

    pub fn completed_at(&self) -> Option<Tick> {
        self.completed_at
    }

    pub fn materials(&self) -> &BTreeMap<Material, u32> {
        &self.materials
    }

    pub fn delivered(&self) -> &BTreeMap<Material, u32> {
        &self.delivered
    }

    pub fn block(&self, pos: WorldPos) -> Option<&ConstructionBlock> {
        self.blocks.get(&pos)
    }

    /// Blocks in build order.
    pub fn blocks_in_order(&self) -> impl Iterator<Item = &ConstructionBlock> {
        self.sequence.iter().filter_map(|p| self.blocks.get(p))
    }

    pub fn stats(&self) -> SiteStats {
        let mut stats = SiteStats {
            total: self.total_blocks,
            ..SiteStats::default()
        };
        for b in self.blocks.values() {
            match b.status {
                BlockStatus::Pending => stats.pending += 1,
                BlockStatus::MaterialsReserved => stats.reserved += 1,
                BlockStatus::MaterialsDelivered => stats.delivered += 1,
                BlockStatus::InProgress => stats.in_progress += 1,
                BlockStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }

    /// Hauler reservations plus builder assignments currently held.
    pub fn reservation_count(&self) -> usize {
        self.blocks
            .values()
            .filter(|b| b.reserved_by.is_some() || b.builder.is_some())
            .count()
    }

    pub fn is_buildable(&self, pos: WorldPos) -> bool {
        let Some(block) = self.blocks.get(&pos) else {
            return false;
        };
        if block.status != BlockStatus::MaterialsDelivered || block.builder.is_some() {
            return false;
        }
        pos.z == self.base_z()
            || self
                .blocks
                .get(&pos.below())
                .is_none_or(ConstructionBlock::is_completed)
    }

    /// First block in build order still waiting for a hauler whose material
    /// passes `available`.
    pub fn next_block_needing_materials(
        &self,
        available: impl Fn(Material) -> bool,
    ) -> Option<&ConstructionBlock> {
        self.blocks_in_order().find(|b| {
            b.status == BlockStatus::Pending
                && b.reserved_by.is_none()
                && b.material().is_some_and(&available)
        })
    }

    /// First buildable block in build order.
    pub fn next_buildable_block(&self) -> Option<&ConstructionBlock> {
        self.sequence
            .iter()
            .find(|&&p| self.is_buildable(p))
            .and_then(|p| self.blocks.get(p))
    }

    // -- guarded transitions --

    /// Pending -> MaterialsReserved.
    pub fn reserve_for_hauling(&mut self, pos: WorldPos, agent: AgentId, now: Tick) -> bool {
        if !self.is_workable() {
            return false;
        }
        let Some(b) = self.blocks.get_mut(&pos) else {
            return false;
        };
        if b.status != BlockStatus::Pending || b.reserved_by.is_some() {
            return false;
        }
        b.status = BlockStatus::MaterialsReserved;
        b.reserved_by = Some(agent);
        b.timestamps.reserved_at = Some(now);
        b.last_touched = now;
        log::trace!("{} block {pos} reserved by {agent}", self.id);
        true
    }

    /// MaterialsReserved -> Pending, only by the reserving hauler.
    pub fn cancel_hauling_reservation(&mut self, pos: WorldPos, agent: AgentId) -> bool {
        let Some(b) = self.blocks.get_mut(&pos) else {
            return false;
        };
        if b.status != BlockStatus::MaterialsReserved || b.reserved_by != Some(agent) {
            return false;
        }
        b.status = BlockStatus::Pending;
        b.reserved_by = None;
        true
    }

    /// MaterialsReserved -> MaterialsDelivered, only by the reserving hauler.
    pub fn confirm_delivery(&mut self, pos: WorldPos, agent: AgentId, now: Tick) -> bool {
        let Some(b) = self.blocks.get_mut(&pos) else {
            return false;
        };
        if b.status != BlockStatus::MaterialsReserved || b.reserved_by != Some(agent) {
            return false;
        }
        b.status = BlockStatus::MaterialsDelivered;
        b.reserved_by = None;
        b.timestamps.delivered_at = Some(now);
        b.last_touched = now;
        if let Some(m) = b.block.material() {
            *self.delivered.entry(m).or_insert(0) += 1;
        }
        log::trace!("{} block {pos} delivered by {agent}", self.id);
        true
    }

    /// MaterialsDelivered -> InProgress. The block must be buildable.
    pub fn assign_builder(&mut self, pos: WorldPos, agent: AgentId, now: Tick) -> bool {
        if !self.is_workable() || !self.is_buildable(pos) {
            return false;
        }
        let Some(b) = self.blocks.get_mut(&pos) else {
            return false;
        };
        b.status = BlockStatus::InProgress;
        b.builder = Some(agent);
        b.timestamps.started_at.get_or_insert(now);
        b.last_touched = now;
        true
    }

    /// Accumulate build progress. Reaching 100 completes the block.
    pub fn add_progress(
        &mut self,
        pos: WorldPos,
        agent: AgentId,
        amount: f32,
        now: Tick,
    ) -> ProgressOutcome {
        let Some(b) = self.blocks.get_mut(&pos) else {
            return ProgressOutcome::Rejected;
        };
        if b.status != BlockStatus::InProgress || b.builder != Some(agent) {
            return ProgressOutcome::Rejected;
        }
        b.progress = (b.progress + amount.max(0.0)).min(FULL_PROGRESS);
        b.last_touched = now;
        if b.progress >= FULL_PROGRESS {
            self.finish_block(pos, now);
            ProgressOutcome::Completed
        } else {
            ProgressOutcome::Progressed(b.progress)
        }
    }

    /// InProgress -> Completed immediately, by the assigned builder.
    pub fn complete_block(&mut self, pos: WorldPos, agent: AgentId, now: Tick) -> bool {
        match self.blocks.get(&pos) {
            Some(b) if b.status == BlockStatus::InProgress && b.builder == Some(agent) => {
                self.finish_block(pos, now);
                true
            }
            _ => false,
        }
    }

    fn finish_block(&mut self, pos: WorldPos, now: Tick) {
        let Some(b) = self.blocks.get_mut(&pos) else {
            return;
        };
        debug_assert_eq!(b.status, BlockStatus::InProgress);
        b.status = BlockStatus::Completed;
        b.progress = FULL_PROGRESS;
        b.builder = None;
        b.reserved_by = None;
        b.timestamps.completed_at = Some(now);
        self.completed_blocks += 1;
        debug_assert!(self.completed_blocks <= self.total_blocks);
        if self.completed_blocks == self.total_blocks && self.completed_at.is_none() {
            self.completed_at = Some(now);
            log::debug!("{} completed at tick {now}", self.id);
        }
    }

    /// InProgress -> MaterialsDelivered, keeping partial progress.
    pub fn release_builder(&mut self, pos: WorldPos, agent: AgentId) -> bool {
        let Some(b) = self.blocks.get_mut(&pos) else {
            return false;
        };
        if b.status != BlockStatus::InProgress || b.builder != Some(agent) {
            return false;
        }
        b.status = BlockStatus::MaterialsDelivered;
        b.builder = None;
        true
    }

    /// Refresh the liveness stamp of a reservation the agent holds.
    pub fn touch(&mut self, pos: WorldPos, agent: AgentId, now: Tick) -> bool {
        match self.blocks.get_mut(&pos) {
            Some(b) if b.holder() == Some(agent) => {
                b.last_touched = now;
                true
            }
            _ => false,
        }
    }

    /// Drop every hauling reservation and builder assignment held by `agent`.
    /// Returns how many were released.
    pub fn release_agent(&mut self, agent: AgentId) -> usize {
        let held: Vec<WorldPos> = self
            .blocks
            .values()
            .filter(|b| b.holder() == Some(agent))
            .map(|b| b.pos)
            .collect();
        held.into_iter()
            .filter(|&pos| {
                self.cancel_hauling_reservation(pos, agent) || self.release_builder(pos, agent)
            })
            .count()
    }

    /// Release reservations whose holder has not touched them for
    /// `timeout` ticks. Returns `(pos, agent)` for each release.
    pub fn release_stale(&mut self, now: Tick, timeout: Tick) -> Vec<(WorldPos, AgentId)> {
        let stale: Vec<(WorldPos, AgentId)> = self
            .blocks
            .values()
            .filter(|b| now.saturating_sub(b.last_touched) >= timeout)
            .filter_map(|b| b.holder().map(|a| (b.pos, a)))
            .collect();
        for &(pos, agent) in &stale {
            let released =
                self.cancel_hauling_reservation(pos, agent) || self.release_builder(pos, agent);
            debug_assert!(released);
        }
        stale
    }

    pub fn pause(&mut self) -> bool {
        if self.is_finished() || self.paused {
            return false;
        }
        self.paused = true;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.is_finished() || !self.paused {
            return false;
        }
        self.paused = false;
        true
    }

    /// Release everything and discard unfinished blocks. Returns the agents
    /// whose reservations were dropped, in position order, deduplicated.
    pub fn cancel(&mut self) -> Vec<AgentId> {
        let mut released: Vec<AgentId> = self.blocks.values().filter_map(|b| b.holder()).collect();
        released.sort();
        released.dedup();
        self.blocks.retain(|_, b| b.is_completed());
        self.sequence.retain(|p| self.blocks.contains_key(p));
        self.cancelled = true;
        released
    }
}

fn site_bounds(blueprint: &Blueprint, origin: WorldPos) -> Bounds {
    Bounds::from_corners(
        origin,
        origin.offset(
            blueprint.width() - 1,
            blueprint.depth() - 1,
            blueprint.height() - 1,
        ),
    )
}

/// Serializes the block map as a list: JSON object keys must be strings and
/// each block already carries its position.
mod blocks_as_list {
    use super::ConstructionBlock;
    use crate::types::WorldPos;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        blocks: &BTreeMap<WorldPos, ConstructionBlock>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(blocks.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<WorldPos, ConstructionBlock>, D::Error> {
        let list = Vec::<ConstructionBlock>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|b| (b.pos, b)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{BlueprintDef, BlueprintLibrary, Category};

    const A: AgentId = AgentId(1);
    const B: AgentId = AgentId(2);

    /// Two stacked stone blocks at (0, 0, 0) and (0, 0, 1).
    fn column_site() -> ConstructionSite {
        let def = BlueprintDef {
            id: "column".into(),
            name: "Column".into(),
            category: Category::Infrastructure,
            tier: 0,
            priority: Priority::Normal,
            requires_foundation: false,
            layers: vec![vec!["S".into()], vec!["S".into()]],
            legend: [("S".to_string(), "stone".to_string())].into_iter().collect(),
            work_slots: Vec::new(),
            entry_points: Vec::new(),
            build_order: Vec::new(),
        };
        let bp = Blueprint::from_def(&def).unwrap();
        ConstructionSite::new(
            SiteId(1),
            &bp,
            WorldPos::new(0, 0, 0),
            Rotation::R0,
            Priority::Normal,
            0,
        )
    }

    fn deliver(site: &mut ConstructionSite, pos: WorldPos, agent: AgentId) {
        assert!(site.reserve_for_hauling(pos, agent, 1));
        assert!(site.confirm_delivery(pos, agent, 2));
    }

    const BOTTOM: WorldPos = WorldPos::new(0, 0, 0);
    const TOP: WorldPos = WorldPos::new(0, 0, 1);

    #[test]
    fn second_hauler_cannot_reserve() {
        let mut site = column_site();
        assert!(site.reserve_for_hauling(BOTTOM, A, 0));
        assert!(!site.reserve_for_hauling(BOTTOM, B, 0));
        assert_eq!(site.block(BOTTOM).unwrap().reserved_by(), Some(A));
    }

    #[test]
    fn only_reserving_hauler_can_cancel_or_deliver() {
        let mut site = column_site();
        site.reserve_for_hauling(BOTTOM, A, 0);
        assert!(!site.cancel_hauling_reservation(BOTTOM, B));
        assert!(!site.confirm_delivery(BOTTOM, B, 1));
        assert!(site.confirm_delivery(BOTTOM, A, 1));
        let b = site.block(BOTTOM).unwrap();
        assert_eq!(b.status(), BlockStatus::MaterialsDelivered);
        assert_eq!(b.reserved_by(), None);
        assert_eq!(site.delivered().get(&Material::Stone), Some(&1));
    }

    #[test]
    fn upper_block_waits_for_the_one_below() {
        let mut site = column_site();
        deliver(&mut site, BOTTOM, A);
        deliver(&mut site, TOP, A);
        assert!(!site.is_buildable(TOP));
        assert_eq!(site.next_buildable_block().map(|b| b.pos), Some(BOTTOM));
        assert!(!site.assign_builder(TOP, B, 3));

        assert!(site.assign_builder(BOTTOM, B, 3));
        assert_eq!(site.add_progress(BOTTOM, B, 100.0, 4), ProgressOutcome::Completed);
        assert!(site.is_buildable(TOP));
    }

    #[test]
    fn progress_is_clamped_and_completion_clears_builder() {
        let mut site = column_site();
        deliver(&mut site, BOTTOM, A);
        site.assign_builder(BOTTOM, A, 3);
        assert_eq!(site.add_progress(BOTTOM, A, 40.0, 4), ProgressOutcome::Progressed(40.0));
        assert_eq!(site.add_progress(BOTTOM, B, 40.0, 4), ProgressOutcome::Rejected);
        assert_eq!(site.add_progress(BOTTOM, A, 500.0, 5), ProgressOutcome::Completed);
        let b = site.block(BOTTOM).unwrap();
        assert_eq!(b.progress(), FULL_PROGRESS);
        assert_eq!(b.builder(), None);
        assert_eq!(b.timestamps.completed_at, Some(5));
    }

    #[test]
    fn early_release_keeps_progress() {
        let mut site = column_site();
        deliver(&mut site, BOTTOM, A);
        site.assign_builder(BOTTOM, A, 3);
        site.add_progress(BOTTOM, A, 30.0, 4);
        assert!(site.release_builder(BOTTOM, A));
        let b = site.block(BOTTOM).unwrap();
        assert_eq!(b.status(), BlockStatus::MaterialsDelivered);
        assert_eq!(b.progress(), 30.0);
        assert!(site.assign_builder(BOTTOM, B, 5));
        assert_eq!(site.add_progress(BOTTOM, B, 70.0, 6), ProgressOutcome::Completed);
    }

    #[test]
    fn completed_block_rejects_everything() {
        let mut site = column_site();
        deliver(&mut site, BOTTOM, A);
        site.assign_builder(BOTTOM, A, 3);
        assert!(site.complete_block(BOTTOM, A, 4));
        assert!(!site.reserve_for_hauling(BOTTOM, A, 5));
        assert!(!site.cancel_hauling_reservation(BOTTOM, A));
        assert!(!site.confirm_delivery(BOTTOM, A, 5));
        assert!(!site.assign_builder(BOTTOM, A, 5));
        assert!(!site.release_builder(BOTTOM, A));
        assert!(!site.complete_block(BOTTOM, A, 5));
        assert_eq!(site.add_progress(BOTTOM, A, 10.0, 5), ProgressOutcome::Rejected);
        assert_eq!(site.block(BOTTOM).unwrap().status(), BlockStatus::Completed);
    }

    #[test]
    fn derived_status_and_completion_time() {
        let mut site = column_site();
        assert_eq!(site.status(), SiteStatus::Planned);
        site.reserve_for_hauling(BOTTOM, A, 1);
        assert_eq!(site.status(), SiteStatus::Planned);
        site.confirm_delivery(BOTTOM, A, 2);
        assert_eq!(site.status(), SiteStatus::InProgress);

        deliver(&mut site, TOP, A);
        for (pos, t) in [(BOTTOM, 10), (TOP, 20)] {
            site.assign_builder(pos, B, t);
            site.complete_block(pos, B, t);
        }
        assert_eq!(site.status(), SiteStatus::Completed);
        assert_eq!(site.completed_at(), Some(20));
        assert_eq!(site.completed_blocks(), site.total_blocks());
    }

    #[test]
    fn paused_site_refuses_new_work() {
        let mut site = column_site();
        assert!(site.pause());
        assert_eq!(site.status(), SiteStatus::Paused);
        assert!(!site.reserve_for_hauling(BOTTOM, A, 0));
        assert!(site.resume());
        assert!(site.reserve_for_hauling(BOTTOM, A, 0));
    }

    #[test]
    fn cancel_releases_all_and_keeps_completed() {
        let mut site = column_site();
        deliver(&mut site, BOTTOM, A);
        site.assign_builder(BOTTOM, A, 3);
        site.complete_block(BOTTOM, A, 3);
        site.reserve_for_hauling(TOP, B, 4);

        let released = site.cancel();
        assert_eq!(released, vec![B]);
        assert_eq!(site.status(), SiteStatus::Cancelled);
        assert_eq!(site.reservation_count(), 0);
        assert!(site.block(TOP).is_none());
        assert!(site.block(BOTTOM).unwrap().is_completed());
    }

    #[test]
    fn stale_reservations_release_after_timeout() {
        let mut site = column_site();
        site.reserve_for_hauling(BOTTOM, A, 10);
        assert!(site.release_stale(50, 100).is_empty());
        assert!(site.touch(BOTTOM, A, 90));
        assert!(site.release_stale(150, 100).is_empty());
        assert_eq!(site.release_stale(190, 100), vec![(BOTTOM, A)]);
        assert_eq!(site.block(BOTTOM).unwrap().status(), BlockStatus::Pending);
    }

    #[test]
    fn release_agent_covers_both_roles() {
        let mut site = column_site();
        deliver(&mut site, BOTTOM, B);
        site.assign_builder(BOTTOM, A, 3);
        site.reserve_for_hauling(TOP, A, 3);
        assert_eq!(site.release_agent(A), 2);
        assert_eq!(site.reservation_count(), 0);
        assert_eq!(site.release_agent(A), 0);
    }

    #[test]
    fn drop_off_uses_entry_point() {
        let bp = BlueprintLibrary::with_builtins()
            .get(&BlueprintId::new("wooden_house"))
            .cloned()
            .unwrap();
        let site = ConstructionSite::new(
            SiteId(7),
            &bp,
            WorldPos::new(10, 10, 4),
            Rotation::R0,
            Priority::High,
            0,
        );
        assert_eq!(site.drop_off(), WorldPos::new(12, 9, 4));
        assert_eq!(site.bounds().max, WorldPos::new(14, 14, 6));
        assert_eq!(site.total_blocks(), 40);
    }

    #[test]
    fn site_serializes_blocks_as_list() {
        let mut site = column_site();
        site.reserve_for_hauling(BOTTOM, A, 3);
        let json = serde_json::to_string(&site).unwrap();
        let restored: ConstructionSite = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.block(BOTTOM), site.block(BOTTOM));
        assert_eq!(restored.stats(), site.stats());
    }
}
