// Construction manager: blueprint library, active sites, placement, and
// work discovery.
//
// `ConstructionManager` owns every `ConstructionSite`, a chunk-bucketed
// `SpatialIndex` over the active ones, and a reservation ledger keyed by
// agent. The ledger enforces the system-wide rule that an agent holds at
// most one construction reservation (a hauling slot or a building slot) at a
// time; every reserve path checks it first.
//
// ## Placement
//
// `place_blueprint` looks up the blueprint, rotates it, validates the
// placement (overlap against active sites through the index plus an exact
// AABB test, then foundation and height checks from `structural.rs`), and
// only then allocates an id and registers the site. A rejected placement
// leaves nothing behind.
//
// ## Work discovery
//
// `peek_hauling_work` / `peek_building_work` scan workable sites by
// descending priority, then ascending id, and return the single closest
// candidate (2D distance to the drop-off for hauling, to the block for
// building). Peeking has no side effects. `find_*` peeks and then reserves
// only the winner, so no transient reservation is ever observable.
//
// ## Completion
//
// `add_build_progress` and `complete_block` are the only construction paths
// that write terrain: the finished block type goes into the world with its
// rotation stored as metadata. A site that completes is purged from the
// spatial index but kept in `sites` for inspection until `remove_site`.
//
// See also: `site.rs` for the per-block state machine, `spatial.rs` for the
// index, `structural.rs` for foundation checks, `worker.rs` for the agents
// that call into this manager.
//
// **Critical constraint: determinism.** Sites and the ledger are `BTreeMap`s;
// discovery order is a total order on `(priority, id)`; ties on distance go
// to the earlier-scanned site.

use crate::block::Material;
use crate::blueprint::{Blueprint, BlueprintLibrary};
use crate::config::ConstructionConfig;
use crate::error::{NotFound, PlacementError, SimError};
use crate::site::{BlockStatus, ConstructionSite, ProgressOutcome, SiteStatus};
use crate::spatial::SpatialIndex;
use crate::structural::StructuralValidator;
use crate::types::{AgentId, BlueprintId, Bounds, Priority, Rotation, SiteId, Tick, WorldPos};
use crate::world::VoxelWorld;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationKind {
    Hauling,
    Building,
}

/// One ledger entry: what an agent currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub agent: AgentId,
    pub site: SiteId,
    pub pos: WorldPos,
    pub kind: ReservationKind,
    pub since: Tick,
}

/// A block that work discovery found for an agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorkCandidate {
    pub site: SiteId,
    /// The construction block.
    pub pos: WorldPos,
    /// Where the agent has to go: the drop-off for hauling, the block for
    /// building.
    pub target: WorldPos,
    pub material: Option<Material>,
    pub priority: Priority,
    pub distance: f32,
}

/// Persistent form of the manager. The spatial index and the reservation
/// ledger are derived and rebuilt on import.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstructionSnapshot {
    pub library: BlueprintLibrary,
    pub sites: Vec<ConstructionSite>,
    pub next_site_id: u64,
}

#[derive(Clone, Debug)]
pub struct ConstructionManager {
    config: ConstructionConfig,
    library: BlueprintLibrary,
    sites: BTreeMap<SiteId, ConstructionSite>,
    index: SpatialIndex,
    reservations: BTreeMap<AgentId, Reservation>,
    next_site_id: u64,
}

impl ConstructionManager {
    pub fn new(config: ConstructionConfig, library: BlueprintLibrary) -> Self {
        Self {
            index: SpatialIndex::new(config.index_chunk_size),
            config,
            library,
            sites: BTreeMap::new(),
            reservations: BTreeMap::new(),
            next_site_id: 1,
        }
    }

    pub fn with_builtins(config: ConstructionConfig) -> Self {
        Self::new(config, BlueprintLibrary::with_builtins())
    }

    pub fn config(&self) -> &ConstructionConfig {
        &self.config
    }

    pub fn library(&self) -> &BlueprintLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut BlueprintLibrary {
        &mut self.library
    }

    // -- site queries --

    pub fn site(&self, id: SiteId) -> Option<&ConstructionSite> {
        self.sites.get(&id)
    }

    pub fn sites(&self) -> impl Iterator<Item = &ConstructionSite> {
        self.sites.values()
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Sites not yet completed (cancelled sites are removed outright).
    pub fn active_site_count(&self) -> usize {
        self.sites.values().filter(|s| !s.is_finished()).count()
    }

    pub fn is_indexed(&self, id: SiteId) -> bool {
        self.index.contains(id)
    }

    /// Active sites whose footprint comes within `radius` of `pos`
    /// horizontally, in id order.
    pub fn sites_near(&self, pos: WorldPos, radius: f32) -> Vec<SiteId> {
        let reach = radius.max(0.0).ceil() as i32;
        self.index
            .candidates_near(pos, reach)
            .into_iter()
            .filter(|id| {
                self.sites
                    .get(id)
                    .is_some_and(|s| distance_2d_to_bounds(pos, &s.bounds()) <= radius)
            })
            .collect()
    }

    fn site_mut(&mut self, id: SiteId) -> Result<&mut ConstructionSite, SimError> {
        self.sites
            .get_mut(&id)
            .ok_or(SimError::NotFound(NotFound::Site(id)))
    }

    // -- placement --

    fn rotated_blueprint(
        &self,
        id: &BlueprintId,
        rotation: Rotation,
    ) -> Result<Blueprint, SimError> {
        self.library
            .get(id)
            .map(|bp| bp.rotated(rotation))
            .ok_or_else(|| SimError::NotFound(NotFound::Blueprint(id.clone())))
    }

    /// Validate a placement without registering anything.
    pub fn can_place_at(
        &self,
        world: &VoxelWorld,
        id: &BlueprintId,
        position: WorldPos,
        rotation: Rotation,
    ) -> Result<(), SimError> {
        let bp = self.rotated_blueprint(id, rotation)?;
        self.check_placement(world, &bp, position)?;
        Ok(())
    }

    fn check_placement(
        &self,
        world: &VoxelWorld,
        bp: &Blueprint,
        position: WorldPos,
    ) -> Result<(), PlacementError> {
        let bounds = footprint_bounds(bp, position);
        if let Some(existing) = self.index.candidates(&bounds).into_iter().find(|id| {
            self.sites
                .get(id)
                .is_some_and(|s| !s.is_finished() && s.bounds().intersects(&bounds))
        }) {
            return Err(PlacementError::Overlap { existing });
        }
        StructuralValidator::check_vertical_bounds(world, bp, position)?;
        if self.config.enforce_foundations && bp.requires_foundation {
            StructuralValidator::check_foundation(world, bp, position)?;
        }
        Ok(())
    }

    /// Validate and register a new site. Nothing is registered on failure.
    pub fn place_blueprint(
        &mut self,
        world: &VoxelWorld,
        id: &BlueprintId,
        position: WorldPos,
        rotation: Rotation,
        now: Tick,
    ) -> Result<SiteId, SimError> {
        let bp = self.rotated_blueprint(id, rotation)?;
        self.check_placement(world, &bp, position)?;

        let site_id = SiteId(self.next_site_id);
        self.next_site_id += 1;
        let site = ConstructionSite::new(site_id, &bp, position, rotation, bp.priority, now);
        self.index.insert(site_id, &site.bounds());
        log::debug!(
            "placed {site_id} '{id}' at {position} rotated {}deg ({} blocks)",
            rotation.degrees(),
            site.total_blocks()
        );
        self.sites.insert(site_id, site);
        Ok(site_id)
    }

    /// Cancel a site: release every reservation on it, discard unfinished
    /// blocks, purge it from the index, and hand it back. World blocks
    /// already built are left in place. Completed sites cannot be cancelled;
    /// use `remove_site` to drop them.
    pub fn cancel_site(&mut self, id: SiteId) -> Result<ConstructionSite, SimError> {
        match self.sites.get(&id) {
            Some(s) if s.is_finished() => return Err(SimError::SiteFinished(id)),
            Some(_) => {}
            None => return Err(SimError::NotFound(NotFound::Site(id))),
        }
        let mut site = self
            .sites
            .remove(&id)
            .ok_or(SimError::NotFound(NotFound::Site(id)))?;
        let released = site.cancel();
        self.reservations.retain(|_, r| r.site != id);
        self.index.remove(id, &site.bounds());
        log::debug!("cancelled {id}; released {} agents", released.len());
        Ok(site)
    }

    /// Drop a finished site from the manager.
    pub fn remove_site(&mut self, id: SiteId) -> Result<ConstructionSite, SimError> {
        match self.sites.get(&id) {
            Some(s) if s.is_finished() => {}
            Some(_) => return self.cancel_site(id),
            None => return Err(SimError::NotFound(NotFound::Site(id))),
        }
        let site = self
            .sites
            .remove(&id)
            .ok_or(SimError::NotFound(NotFound::Site(id)))?;
        self.index.remove(id, &site.bounds());
        Ok(site)
    }

    pub fn set_site_priority(&mut self, id: SiteId, priority: Priority) -> Result<(), SimError> {
        self.site_mut(id)?.priority = priority;
        Ok(())
    }

    /// Pause a site. Paused sites are skipped by work discovery; existing
    /// reservations stay until released or stale.
    pub fn pause_site(&mut self, id: SiteId) -> Result<bool, SimError> {
        Ok(self.site_mut(id)?.pause())
    }

    pub fn resume_site(&mut self, id: SiteId) -> Result<bool, SimError> {
        Ok(self.site_mut(id)?.resume())
    }

    // -- reservation ledger --

    pub fn reservation(&self, agent: AgentId) -> Option<&Reservation> {
        self.reservations.get(&agent)
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Refresh the holder's reservation so it does not go stale.
    pub fn touch_reservation(&mut self, agent: AgentId, now: Tick) -> bool {
        let Some(r) = self.reservations.get(&agent).copied() else {
            return false;
        };
        self.sites
            .get_mut(&r.site)
            .is_some_and(|s| s.touch(r.pos, agent, now))
    }

    /// Release whatever `agent` holds. Idempotent. Returns the number of
    /// block slots released.
    pub fn release_agent(&mut self, agent: AgentId) -> usize {
        let Some(r) = self.reservations.remove(&agent) else {
            return 0;
        };
        let released = self
            .sites
            .get_mut(&r.site)
            .map_or(0, |s| s.release_agent(agent));
        log::trace!("released {agent} from {} ({released} slots)", r.site);
        released
    }

    /// Release every reservation not touched for the configured timeout.
    pub fn expire_stale_reservations(&mut self, now: Tick) -> Vec<Reservation> {
        let timeout = self.config.reservation_timeout_ticks;
        let mut expired = Vec::new();
        for site in self.sites.values_mut() {
            for (pos, agent) in site.release_stale(now, timeout) {
                if let Some(r) = self.reservations.remove(&agent) {
                    debug_assert_eq!((r.site, r.pos), (site.id, pos));
                    expired.push(r);
                }
            }
        }
        if !expired.is_empty() {
            log::debug!("expired {} stale reservations at tick {now}", expired.len());
        }
        expired
    }

    // -- work discovery --

    /// Workable sites, highest priority first, then lowest id.
    fn scan_order(&self) -> Vec<&ConstructionSite> {
        let mut order: Vec<&ConstructionSite> =
            self.sites.values().filter(|s| s.is_workable()).collect();
        order.sort_by_key(|s| (Reverse(s.priority), s.id));
        order
    }

    /// Closest block needing materials, without reserving it. `available`
    /// filters out materials the hauler could not pick up anyway.
    pub fn peek_hauling_work(
        &self,
        from: WorldPos,
        available: impl Fn(Material) -> bool,
    ) -> Option<WorkCandidate> {
        let mut best: Option<WorkCandidate> = None;
        for site in self.scan_order() {
            let Some(block) = site.next_block_needing_materials(&available) else {
                continue;
            };
            let distance = from.distance_2d(site.drop_off());
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(WorkCandidate {
                    site: site.id,
                    pos: block.pos,
                    target: site.drop_off(),
                    material: block.material(),
                    priority: site.priority,
                    distance,
                });
            }
        }
        best
    }

    /// Closest buildable block, without assigning it.
    pub fn peek_building_work(&self, from: WorldPos) -> Option<WorkCandidate> {
        let mut best: Option<WorkCandidate> = None;
        for site in self.scan_order() {
            let Some(block) = site.next_buildable_block() else {
                continue;
            };
            let distance = from.distance_2d(block.pos);
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(WorkCandidate {
                    site: site.id,
                    pos: block.pos,
                    target: block.pos,
                    material: block.material(),
                    priority: site.priority,
                    distance,
                });
            }
        }
        best
    }

    /// Peek, then reserve the winner for hauling. `None` if the agent
    /// already holds a reservation or nothing qualifies.
    pub fn find_hauling_work(
        &mut self,
        from: WorldPos,
        agent: AgentId,
        available: impl Fn(Material) -> bool,
        now: Tick,
    ) -> Option<WorkCandidate> {
        if self.reservations.contains_key(&agent) {
            return None;
        }
        let candidate = self.peek_hauling_work(from, available)?;
        self.reserve_hauling(candidate.site, candidate.pos, agent, now)
            .then_some(candidate)
    }

    /// Peek, then assign the winner to the agent as builder.
    pub fn find_building_work(
        &mut self,
        from: WorldPos,
        agent: AgentId,
        now: Tick,
    ) -> Option<WorkCandidate> {
        if self.reservations.contains_key(&agent) {
            return None;
        }
        let candidate = self.peek_building_work(from)?;
        self.reserve_building(candidate.site, candidate.pos, agent, now)
            .then_some(candidate)
    }

    /// Pending -> MaterialsReserved for a specific block.
    pub fn reserve_hauling(
        &mut self,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
        now: Tick,
    ) -> bool {
        self.reserve(site, pos, agent, ReservationKind::Hauling, now)
    }

    /// MaterialsDelivered -> InProgress for a specific block.
    pub fn reserve_building(
        &mut self,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
        now: Tick,
    ) -> bool {
        self.reserve(site, pos, agent, ReservationKind::Building, now)
    }

    fn reserve(
        &mut self,
        site_id: SiteId,
        pos: WorldPos,
        agent: AgentId,
        kind: ReservationKind,
        now: Tick,
    ) -> bool {
        if self.reservations.contains_key(&agent) {
            return false;
        }
        let Some(site) = self.sites.get_mut(&site_id) else {
            return false;
        };
        let ok = match kind {
            ReservationKind::Hauling => site.reserve_for_hauling(pos, agent, now),
            ReservationKind::Building => site.assign_builder(pos, agent, now),
        };
        if ok {
            self.reservations.insert(
                agent,
                Reservation {
                    agent,
                    site: site_id,
                    pos,
                    kind,
                    since: now,
                },
            );
        }
        ok
    }

    // -- transitions that go through the ledger --

    pub fn cancel_hauling(
        &mut self,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
    ) -> Result<bool, SimError> {
        let ok = self.site_mut(site)?.cancel_hauling_reservation(pos, agent);
        if ok {
            self.reservations.remove(&agent);
        }
        Ok(ok)
    }

    pub fn confirm_delivery(
        &mut self,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
        now: Tick,
    ) -> Result<bool, SimError> {
        let ok = self.site_mut(site)?.confirm_delivery(pos, agent, now);
        if ok {
            self.reservations.remove(&agent);
        }
        Ok(ok)
    }

    pub fn release_builder(
        &mut self,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
    ) -> Result<bool, SimError> {
        let ok = self.site_mut(site)?.release_builder(pos, agent);
        if ok {
            self.reservations.remove(&agent);
        }
        Ok(ok)
    }

    /// Add build progress. On reaching 100 the block is completed and
    /// written into the world.
    pub fn add_build_progress(
        &mut self,
        world: &mut VoxelWorld,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
        amount: f32,
        now: Tick,
    ) -> Result<ProgressOutcome, SimError> {
        let outcome = self.site_mut(site)?.add_progress(pos, agent, amount, now);
        if outcome == ProgressOutcome::Completed {
            self.after_block_completed(world, site, pos, agent);
        }
        Ok(outcome)
    }

    /// Finish a block outright for its assigned builder and write it into
    /// the world.
    pub fn complete_block(
        &mut self,
        world: &mut VoxelWorld,
        site: SiteId,
        pos: WorldPos,
        agent: AgentId,
        now: Tick,
    ) -> Result<bool, SimError> {
        let s = self.site_mut(site)?;
        if s.block(pos).is_none() {
            return Err(SimError::NotFound(NotFound::Block { site, pos }));
        }
        let ok = s.complete_block(pos, agent, now);
        if ok {
            self.after_block_completed(world, site, pos, agent);
        }
        Ok(ok)
    }

    fn after_block_completed(
        &mut self,
        world: &mut VoxelWorld,
        site_id: SiteId,
        pos: WorldPos,
        agent: AgentId,
    ) {
        self.reservations.remove(&agent);
        let Some(site) = self.sites.get(&site_id) else {
            return;
        };
        if let Some(b) = site.block(pos) {
            let written = world.set_block_with_meta(pos, b.block, b.rotation.quarter_turns());
            debug_assert!(written, "site block {pos} outside the world");
            log::trace!("{site_id} built {} at {pos}", b.block);
        }
        if site.status() == SiteStatus::Completed {
            self.index.remove(site_id, &site.bounds());
        }
    }

    // -- persistence --

    pub fn export(&self) -> ConstructionSnapshot {
        ConstructionSnapshot {
            library: self.library.clone(),
            sites: self.sites.values().cloned().collect(),
            next_site_id: self.next_site_id,
        }
    }

    /// Rebuild a manager from a snapshot. The spatial index is rebuilt from
    /// active site bounds and the ledger from the holders recorded on each
    /// block.
    pub fn import(snapshot: ConstructionSnapshot, config: ConstructionConfig) -> Self {
        let mut manager = Self::new(config, snapshot.library);
        manager.next_site_id = snapshot.next_site_id;
        for site in snapshot.sites {
            manager.next_site_id = manager.next_site_id.max(site.id.0 + 1);
            if !site.is_finished() {
                manager.index.insert(site.id, &site.bounds());
            }
            for b in site.blocks_in_order() {
                let (agent, kind, since) = match (b.status(), b.holder()) {
                    (BlockStatus::MaterialsReserved, Some(a)) => {
                        (a, ReservationKind::Hauling, b.timestamps.reserved_at)
                    }
                    (BlockStatus::InProgress, Some(a)) => {
                        (a, ReservationKind::Building, b.timestamps.started_at)
                    }
                    _ => continue,
                };
                manager.reservations.insert(
                    agent,
                    Reservation {
                        agent,
                        site: site.id,
                        pos: b.pos,
                        kind,
                        since: since.unwrap_or(site.created_at),
                    },
                );
            }
            manager.sites.insert(site.id, site);
        }
        manager
    }
}

fn footprint_bounds(bp: &Blueprint, origin: WorldPos) -> Bounds {
    Bounds::from_corners(
        origin,
        origin.offset(bp.width() - 1, bp.depth() - 1, bp.height() - 1),
    )
}

fn distance_2d_to_bounds(pos: WorldPos, bounds: &Bounds) -> f32 {
    let nearest = WorldPos::new(
        pos.x.clamp(bounds.min.x, bounds.max.x),
        pos.y.clamp(bounds.min.y, bounds.max.y),
        pos.z,
    );
    pos.distance_2d(nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockType;
    use crate::config::{TerrainConfig, WorldConfig};

    fn flat_world(height: i32) -> VoxelWorld {
        VoxelWorld::new(WorldConfig {
            terrain: TerrainConfig::Flat { height },
            ..WorldConfig::default()
        })
    }

    fn manager() -> ConstructionManager {
        ConstructionManager::with_builtins(ConstructionConfig::default())
    }

    fn wall() -> BlueprintId {
        BlueprintId::new("stone_wall")
    }

    fn house() -> BlueprintId {
        BlueprintId::new("wooden_house")
    }

    const A: AgentId = AgentId(1);
    const B: AgentId = AgentId(2);

    fn any(_: Material) -> bool {
        true
    }

    #[test]
    fn unknown_blueprint_is_not_found() {
        let world = flat_world(4);
        let mut mgr = manager();
        let err = mgr
            .place_blueprint(
                &world,
                &BlueprintId::new("castle"),
                WorldPos::new(0, 0, 4),
                Rotation::R0,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, SimError::NotFound(NotFound::Blueprint(_))));
        assert_eq!(mgr.site_count(), 0);
    }

    #[test]
    fn overlapping_placement_is_rejected() {
        let world = flat_world(4);
        let mut mgr = manager();
        mgr.place_blueprint(&world, &house(), WorldPos::new(0, 0, 4), Rotation::R0, 0)
            .unwrap();
        let err = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(4, 2, 4), Rotation::R0, 0)
            .unwrap_err();
        match err {
            SimError::InvalidPlacement(pe) => assert_eq!(pe.reason(), "blocks would collide"),
            other => panic!("expected overlap, got {other}"),
        }
        assert_eq!(mgr.site_count(), 1);

        // Just past the house footprint is fine.
        mgr.place_blueprint(&world, &wall(), WorldPos::new(5, 2, 4), Rotation::R0, 0)
            .unwrap();
    }

    #[test]
    fn rotation_changes_the_footprint_checked() {
        let world = flat_world(4);
        let mut mgr = manager();
        mgr.place_blueprint(&world, &wall(), WorldPos::new(0, 0, 4), Rotation::R0, 0)
            .unwrap();
        // Rotated 90 degrees the wall runs along Y and clears the first one.
        assert!(mgr
            .can_place_at(&world, &wall(), WorldPos::new(0, 1, 4), Rotation::R90)
            .is_ok());
        assert!(mgr
            .can_place_at(&world, &wall(), WorldPos::new(0, 0, 4), Rotation::R90)
            .is_err());
    }

    #[test]
    fn floating_placement_fails_foundation() {
        let world = flat_world(4);
        let mgr = manager();
        let err = mgr
            .can_place_at(&world, &house(), WorldPos::new(0, 0, 6), Rotation::R0)
            .unwrap_err();
        assert!(err.to_string().contains("terrain too uneven"));
    }

    #[test]
    fn foundation_check_can_be_disabled() {
        let world = flat_world(4);
        let config = ConstructionConfig {
            enforce_foundations: false,
            ..ConstructionConfig::default()
        };
        let mgr = ConstructionManager::with_builtins(config);
        assert!(mgr
            .can_place_at(&world, &house(), WorldPos::new(0, 0, 6), Rotation::R0)
            .is_ok());
    }

    #[test]
    fn hauling_discovery_picks_closest_drop_off() {
        let world = flat_world(0);
        let mut mgr = manager();
        let near = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        mgr.place_blueprint(&world, &wall(), WorldPos::new(40, 0, 0), Rotation::R0, 0)
            .unwrap();
        let found = mgr.peek_hauling_work(WorldPos::new(1, -3, 0), any).unwrap();
        assert_eq!(found.site, near);
        assert_eq!(found.material, Some(Material::Stone));
        // Peeking reserves nothing.
        assert_eq!(mgr.reservation_count(), 0);
        assert_eq!(mgr.site(near).unwrap().reservation_count(), 0);
    }

    #[test]
    fn equal_distance_goes_to_higher_priority() {
        let world = flat_world(0);
        let mut mgr = manager();
        let left = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(-10, 0, 0), Rotation::R0, 0)
            .unwrap();
        let right = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(10, 0, 0), Rotation::R0, 0)
            .unwrap();
        // Drop-offs at (-8, -1) and (12, -1); stand midway.
        let from = WorldPos::new(2, -1, 0);
        assert_eq!(mgr.peek_hauling_work(from, any).unwrap().site, left);
        mgr.set_site_priority(right, Priority::Urgent).unwrap();
        assert_eq!(mgr.peek_hauling_work(from, any).unwrap().site, right);
    }

    #[test]
    fn material_filter_skips_unavailable() {
        let world = flat_world(0);
        let mut mgr = manager();
        mgr.place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        assert!(mgr
            .peek_hauling_work(WorldPos::new(0, 0, 0), |m| m == Material::Wood)
            .is_none());
    }

    #[test]
    fn one_reservation_per_agent() {
        let world = flat_world(0);
        let mut mgr = manager();
        mgr.place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        assert!(mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 1).is_some());
        assert!(mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 1).is_none());
        assert!(mgr.find_building_work(WorldPos::new(0, 0, 0), A, 1).is_none());
        assert_eq!(mgr.reservation_count(), 1);
    }

    #[test]
    fn full_block_cycle_writes_world() {
        let mut world = flat_world(0);
        let mut mgr = manager();
        let id = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        let haul = mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 1).unwrap();
        assert_eq!(haul.pos, WorldPos::new(0, 0, 0));
        assert!(mgr.confirm_delivery(id, haul.pos, A, 2).unwrap());
        assert!(mgr.reservation(A).is_none());

        let build = mgr.find_building_work(WorldPos::new(0, 0, 0), B, 3).unwrap();
        assert_eq!(build.pos, haul.pos);
        let outcome = mgr
            .add_build_progress(&mut world, id, build.pos, B, 100.0, 4)
            .unwrap();
        assert_eq!(outcome, ProgressOutcome::Completed);
        assert_eq!(world.get_block(build.pos), BlockType::Cobblestone);
        assert!(mgr.reservation(B).is_none());
    }

    #[test]
    fn completed_site_leaves_the_index() {
        let mut world = flat_world(0);
        let mut mgr = manager();
        let id = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        let mut tick = 1;
        while mgr.site(id).unwrap().status() != SiteStatus::Completed {
            let haul = mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, tick);
            if let Some(h) = haul {
                mgr.confirm_delivery(id, h.pos, A, tick).unwrap();
            }
            if let Some(b) = mgr.find_building_work(WorldPos::new(0, 0, 0), B, tick) {
                mgr.complete_block(&mut world, id, b.pos, B, tick).unwrap();
            }
            tick += 1;
            assert!(tick < 100, "wall never finished");
        }
        assert!(!mgr.is_indexed(id));
        assert_eq!(mgr.active_site_count(), 0);
        assert_eq!(
            world.count_blocks(
                WorldPos::new(0, 0, 0),
                WorldPos::new(4, 0, 1),
                BlockType::Cobblestone,
            ),
            10
        );
        // Finished sites no longer block placement.
        assert!(mgr.can_place_at(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0).is_ok());

        // A finished site stays finished: cancel refuses, remove drops it.
        assert!(matches!(mgr.cancel_site(id), Err(SimError::SiteFinished(s)) if s == id));
        assert_eq!(mgr.site(id).unwrap().status(), SiteStatus::Completed);
        assert_eq!(mgr.remove_site(id).unwrap().status(), SiteStatus::Completed);
        assert!(mgr.site(id).is_none());
    }

    #[test]
    fn cancel_site_clears_everything() {
        let world = flat_world(0);
        let mut mgr = manager();
        let id = mgr
            .place_blueprint(&world, &house(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 1).unwrap();
        mgr.find_hauling_work(WorldPos::new(0, 0, 0), B, any, 1).unwrap();
        let site = mgr.cancel_site(id).unwrap();
        assert_eq!(site.reservation_count(), 0);
        assert_eq!(mgr.reservation_count(), 0);
        assert!(!mgr.is_indexed(id));
        assert!(mgr.site(id).is_none());
        assert!(matches!(mgr.cancel_site(id), Err(SimError::NotFound(_))));
    }

    #[test]
    fn paused_site_is_skipped() {
        let world = flat_world(0);
        let mut mgr = manager();
        let id = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        assert!(mgr.pause_site(id).unwrap());
        assert!(mgr.peek_hauling_work(WorldPos::new(0, 0, 0), any).is_none());
        assert!(mgr.resume_site(id).unwrap());
        assert!(mgr.peek_hauling_work(WorldPos::new(0, 0, 0), any).is_some());
    }

    #[test]
    fn stale_reservation_expires_unless_touched() {
        let world = flat_world(0);
        let config = ConstructionConfig {
            reservation_timeout_ticks: 10,
            ..ConstructionConfig::default()
        };
        let mut mgr = ConstructionManager::with_builtins(config);
        let id = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        let a = mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 0).unwrap();
        mgr.find_hauling_work(WorldPos::new(0, 0, 0), B, any, 0).unwrap();
        assert!(mgr.touch_reservation(B, 8));

        let expired = mgr.expire_stale_reservations(12);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].agent, A);
        assert!(mgr.reservation(A).is_none());
        assert!(mgr.reservation(B).is_some());
        assert_eq!(
            mgr.site(id).unwrap().block(a.pos).unwrap().status(),
            BlockStatus::Pending
        );
    }

    #[test]
    fn release_agent_is_idempotent() {
        let world = flat_world(0);
        let mut mgr = manager();
        mgr.place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 0).unwrap();
        assert_eq!(mgr.release_agent(A), 1);
        assert_eq!(mgr.release_agent(A), 0);
        assert_eq!(mgr.reservation_count(), 0);
    }

    #[test]
    fn sites_near_uses_footprint_distance() {
        let world = flat_world(0);
        let mut mgr = manager();
        let a = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(0, 0, 0), Rotation::R0, 0)
            .unwrap();
        let b = mgr
            .place_blueprint(&world, &wall(), WorldPos::new(100, 0, 0), Rotation::R0, 0)
            .unwrap();
        assert_eq!(mgr.sites_near(WorldPos::new(7, 0, 0), 3.0), vec![a]);
        assert_eq!(mgr.sites_near(WorldPos::new(50, 0, 0), 60.0), vec![a, b]);
        assert!(mgr.sites_near(WorldPos::new(50, 0, 0), 5.0).is_empty());
    }

    #[test]
    fn unknown_site_is_not_found() {
        let mut world = flat_world(0);
        let mut mgr = manager();
        assert!(mgr.confirm_delivery(SiteId(99), WorldPos::new(0, 0, 0), A, 0).is_err());
        assert!(mgr.set_site_priority(SiteId(99), Priority::High).is_err());
        assert!(mgr
            .add_build_progress(&mut world, SiteId(99), WorldPos::new(0, 0, 0), A, 1.0, 0)
            .is_err());
    }

    #[test]
    fn import_rebuilds_index_and_ledger() {
        let world = flat_world(0);
        let mut mgr = manager();
        let id = mgr
            .place_blueprint(&world, &house(), WorldPos::new(3, 3, 0), Rotation::R90, 0)
            .unwrap();
        mgr.find_hauling_work(WorldPos::new(0, 0, 0), A, any, 5).unwrap();

        let json = serde_json::to_string(&mgr.export()).unwrap();
        let snapshot: ConstructionSnapshot = serde_json::from_str(&json).unwrap();
        let restored = ConstructionManager::import(snapshot, ConstructionConfig::default());

        assert!(restored.is_indexed(id));
        let r = restored.reservation(A).unwrap();
        assert_eq!((r.site, r.kind, r.since), (id, ReservationKind::Hauling, 5));
        assert_eq!(restored.site(id).unwrap().rotation, Rotation::R90);
        // Ids keep counting from where they left off.
        let mut restored = restored;
        let next = restored
            .place_blueprint(&world, &wall(), WorldPos::new(30, 30, 0), Rotation::R0, 6)
            .unwrap();
        assert_eq!(next, SiteId(id.0 + 1));
    }
}
