// End-to-end construction scenarios driven through the public API.

use hearthvale_sim::block::{BlockType, Material};
use hearthvale_sim::command::{SimAction, SimCommand};
use hearthvale_sim::config::{ConstructionConfig, GameConfig, TerrainConfig, WorldConfig};
use hearthvale_sim::construction::ConstructionManager;
use hearthvale_sim::error::{PlacementError, SimError};
use hearthvale_sim::event::SimEventKind;
use hearthvale_sim::site::{BlockStatus, SiteStatus};
use hearthvale_sim::sim::Sim;
use hearthvale_sim::types::{AgentId, BlueprintId, ChunkKey, Rotation, SiteId, WorldPos};
use hearthvale_sim::worker::AgentProfile;
use hearthvale_sim::world::{TerrainGenerator, VoxelWorld};
use std::collections::{BTreeMap, BTreeSet};

const A: AgentId = AgentId(1);
const B: AgentId = AgentId(2);

fn flat_world_config() -> WorldConfig {
    WorldConfig {
        terrain: TerrainConfig::Flat { height: 0 },
        ..WorldConfig::default()
    }
}

fn flat_game() -> GameConfig {
    GameConfig {
        world: flat_world_config(),
        stockpile_position: WorldPos::new(2, -6, 0),
        ..GameConfig::default()
    }
}

fn house_setup(workers: u32) -> Vec<SimCommand> {
    let mut commands = vec![
        SimCommand::new(
            1,
            SimAction::PlaceBlueprint {
                blueprint: BlueprintId::from("wooden_house"),
                position: WorldPos::new(0, 0, 0),
                rotation: Rotation::R0,
                priority: None,
            },
        ),
        SimCommand::new(
            1,
            SimAction::StockMaterial {
                material: Material::Wood,
                amount: 40,
            },
        ),
    ];
    for i in 0..workers {
        commands.push(SimCommand::new(
            1,
            SimAction::RegisterWorker {
                agent: AgentId(i + 1),
                position: WorldPos::new(i as i32, -6, 0),
                profile: AgentProfile::default(),
            },
        ));
    }
    commands
}

const POST_JSON: &str =
    r#"[{"id": "post", "name": "Post", "layers": [["S"]], "legend": {"S": "cobblestone"}}]"#;

fn post_manager() -> ConstructionManager {
    let mut manager = ConstructionManager::with_builtins(ConstructionConfig::default());
    manager.library_mut().load_json(POST_JSON).unwrap();
    manager
}

#[test]
fn house_build_completes_and_matches_blueprint() {
    let mut sim = Sim::new(42, flat_game()).unwrap();
    let house = BlueprintId::from("wooden_house");
    let bp = sim.construction().library().get(&house).unwrap().clone();
    assert_eq!(bp.material_requirement(Material::Wood), 40);
    assert_eq!(bp.material_requirement(Material::Stone), 0);

    let site = SiteId(1);
    let sites: BTreeSet<WorldPos> = bp.blocks().iter().map(|b| b.offset).collect();
    let mut built: BTreeSet<WorldPos> = BTreeSet::new();
    let mut done = false;
    let mut commands = house_setup(3);

    while !done && sim.tick() < 20_000 {
        let target = sim.tick() + 100;
        for event in sim.step(&commands, target).events {
            match event.kind {
                SimEventKind::BlockCompleted { pos, .. } => {
                    // Nothing floats: the block below is done first.
                    if pos.z > 0 && sites.contains(&pos.below()) {
                        assert!(built.contains(&pos.below()), "{pos} built before its support");
                    }
                    built.insert(pos);
                }
                SimEventKind::SiteCompleted { site: s } if s == site => done = true,
                _ => {}
            }
        }
        commands.clear();
    }

    assert!(done, "house not finished by tick {}", sim.tick());
    let s = sim.construction().site(site).unwrap();
    assert_eq!(s.status(), SiteStatus::Completed);
    assert_eq!(s.completed_blocks(), s.total_blocks());
    assert_eq!(s.total_blocks(), 40);
    for b in bp.blocks() {
        assert_eq!(sim.world().peek_block(b.offset), b.block, "mismatch at {}", b.offset);
    }
    assert_eq!(sim.stockpile().count(Material::Wood), 0);
    assert_eq!(sim.construction().reservation_count(), 0);
}

#[test]
fn contention_gives_the_block_to_one_agent() {
    let world = VoxelWorld::new(flat_world_config());
    let mut manager = post_manager();
    let site = manager
        .place_blueprint(
            &world,
            &BlueprintId::from("post"),
            WorldPos::new(0, 0, 0),
            Rotation::R0,
            0,
        )
        .unwrap();
    let from = WorldPos::new(0, -3, 0);
    let first = manager.find_hauling_work(from, A, |_| true, 1);
    let second = manager.find_hauling_work(from, B, |_| true, 1);
    assert_eq!(first.map(|c| c.site), Some(site));
    assert!(second.is_none());
    assert_eq!(manager.reservation_count(), 1);
}

#[test]
fn unregistering_a_hauler_returns_block_to_pending() {
    let mut sim = Sim::new(5, flat_game()).unwrap();
    let commands = vec![
        SimCommand::new(
            1,
            SimAction::PlaceBlueprint {
                blueprint: BlueprintId::from("stone_wall"),
                position: WorldPos::new(0, 0, 0),
                rotation: Rotation::R0,
                priority: None,
            },
        ),
        SimCommand::new(
            1,
            SimAction::StockMaterial {
                material: Material::Stone,
                amount: 10,
            },
        ),
        SimCommand::new(
            1,
            SimAction::RegisterWorker {
                agent: A,
                position: WorldPos::new(0, -10, 0),
                profile: AgentProfile::default(),
            },
        ),
    ];
    sim.step(&commands, 2);
    assert_eq!(sim.construction().reservation_count(), 1);
    let held = sim.construction().reservation(A).copied().unwrap();

    sim.step(&[SimCommand::new(3, SimAction::UnregisterWorker { agent: A })], 3);
    assert_eq!(sim.construction().reservation_count(), 0);
    let block = sim.construction().site(held.site).unwrap().block(held.pos).unwrap();
    assert_eq!(block.status(), BlockStatus::Pending);
    assert_eq!(block.reserved_by(), None);

    // Unregistering again is harmless.
    sim.step(&[SimCommand::new(4, SimAction::UnregisterWorker { agent: A })], 4);
    assert!(sim.workers().is_empty());
}

#[test]
fn overlapping_placement_is_rejected() {
    let world = VoxelWorld::new(flat_world_config());
    let mut manager = ConstructionManager::with_builtins(ConstructionConfig::default());
    let house = BlueprintId::from("wooden_house");
    let first = manager
        .place_blueprint(&world, &house, WorldPos::new(0, 0, 0), Rotation::R0, 0)
        .unwrap();
    let err = manager
        .place_blueprint(&world, &house, WorldPos::new(3, 3, 0), Rotation::R90, 0)
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::InvalidPlacement(PlacementError::Overlap { existing }) if existing == first
    ));
    assert!(err.to_string().contains("blocks would collide"));
    assert_eq!(manager.site_count(), 1);

    // Clear of the first house is fine.
    assert!(manager
        .place_blueprint(&world, &house, WorldPos::new(5, 0, 0), Rotation::R0, 0)
        .is_ok());
}

#[test]
fn floating_placement_is_rejected() {
    let world = VoxelWorld::new(flat_world_config());
    let mut manager = ConstructionManager::with_builtins(ConstructionConfig::default());
    let err = manager
        .place_blueprint(
            &world,
            &BlueprintId::from("wooden_house"),
            WorldPos::new(0, 0, 4),
            Rotation::R0,
            0,
        )
        .unwrap_err();
    assert!(err.to_string().contains("terrain too uneven"));
    assert_eq!(manager.site_count(), 0);
}

#[test]
fn cancelling_a_busy_site_clears_every_reservation() {
    let world = VoxelWorld::new(flat_world_config());
    let mut manager = ConstructionManager::with_builtins(ConstructionConfig::default());
    let site = manager
        .place_blueprint(
            &world,
            &BlueprintId::from("wooden_house"),
            WorldPos::new(0, 0, 0),
            Rotation::R0,
            0,
        )
        .unwrap();
    for agent in 1..=5 {
        assert!(manager
            .find_hauling_work(WorldPos::new(0, -2, 0), AgentId(agent), |_| true, 1)
            .is_some());
    }
    assert_eq!(manager.reservation_count(), 5);

    let cancelled = manager.cancel_site(site).unwrap();
    assert_eq!(cancelled.reservation_count(), 0);
    assert_eq!(manager.reservation_count(), 0);
    assert_eq!(manager.site_count(), 0);
    assert!(manager.find_hauling_work(WorldPos::new(0, -2, 0), A, |_| true, 2).is_none());
}

#[test]
fn block_state_only_moves_forward_or_through_releases() {
    let mut sim = Sim::new(9, flat_game()).unwrap();
    let mut last: BTreeMap<WorldPos, BlockStatus> = BTreeMap::new();
    let setup = house_setup(3);

    for tick in 1..=2500u64 {
        let mut commands: Vec<SimCommand> = if tick == 1 { setup.clone() } else { Vec::new() };
        // Force some abandonments mid-build.
        if tick % 400 == 0 {
            commands.push(SimCommand::new(
                tick,
                SimAction::SetWorkerNeeds {
                    agent: A,
                    hunger: 100.0,
                    fatigue: 0.0,
                },
            ));
        }
        if tick % 400 == 10 {
            commands.push(SimCommand::new(
                tick,
                SimAction::SetWorkerNeeds {
                    agent: A,
                    hunger: 0.0,
                    fatigue: 0.0,
                },
            ));
        }
        sim.step(&commands, tick);

        let Some(site) = sim.construction().site(SiteId(1)) else {
            continue;
        };
        for b in site.blocks_in_order() {
            let now = b.status();
            if let Some(&before) = last.get(&b.pos) {
                let allowed = now >= before
                    || (before == BlockStatus::MaterialsReserved && now == BlockStatus::Pending)
                    || (before == BlockStatus::InProgress
                        && now == BlockStatus::MaterialsDelivered);
                assert!(allowed, "{} went {before:?} -> {now:?} at tick {tick}", b.pos);
                if before == BlockStatus::Completed {
                    assert_eq!(now, BlockStatus::Completed);
                }
            }
            last.insert(b.pos, now);
        }
    }
}

#[test]
fn terrain_generation_is_idempotent() {
    let config = WorldConfig::default();
    let generator = TerrainGenerator::from_config(&config);
    for key in [ChunkKey::new(0, 0), ChunkKey::new(-3, 7), ChunkKey::new(12, -1)] {
        assert_eq!(generator.generate(key), generator.generate(key));
        assert_eq!(TerrainGenerator::from_config(&config).generate(key), generator.generate(key));
    }

    let mut world = VoxelWorld::new(config);
    let fresh = world.get_chunk(-3, 7).clone();
    assert_eq!(fresh, generator.generate(ChunkKey::new(-3, 7)));
}

#[test]
fn bincode_snapshot_resumes_identically() {
    let mut original = Sim::new(21, flat_game()).unwrap();
    original.step(&house_setup(2), 300);

    let bytes = bincode::serialize(&original.export()).unwrap();
    let mut restored = Sim::import(bincode::deserialize(&bytes).unwrap()).unwrap();
    assert_eq!(restored.tick(), 300);
    assert_eq!(
        restored.construction().reservation_count(),
        original.construction().reservation_count()
    );

    let a = original.step(&[], 1500).events;
    let b = restored.step(&[], 1500).events;
    assert_eq!(a, b);
    assert_eq!(
        original.world().peek_block(WorldPos::new(0, 0, 0)),
        restored.world().peek_block(WorldPos::new(0, 0, 0))
    );
}

#[test]
fn mining_under_an_overhang_can_cave_in() {
    let mut config = flat_game();
    config.world.terrain = TerrainConfig::Flat { height: 3 };
    config.stockpile_position = WorldPos::new(0, -6, 3);
    let mut sim = Sim::new(1, config).unwrap();

    // A lone stone column with a dirt base: mining the base leaves it
    // floating.
    let base = WorldPos::new(5, 5, 3);
    sim.world_mut().set_block(base, BlockType::Dirt);
    for z in 4..7 {
        sim.world_mut().set_block(WorldPos::new(5, 5, z), BlockType::Stone);
    }
    let commands = vec![
        SimCommand::new(
            1,
            SimAction::DesignateMining {
                position: base,
                priority: hearthvale_sim::types::Priority::High,
            },
        ),
        SimCommand::new(
            1,
            SimAction::RegisterWorker {
                agent: A,
                position: WorldPos::new(3, 5, 3),
                profile: AgentProfile::default(),
            },
        ),
    ];
    let events = sim.step(&commands, 500).events;
    let cave_in = events.iter().find_map(|e| match &e.kind {
        SimEventKind::CaveIn { origin, collapsed, .. } => Some((*origin, collapsed.clone())),
        _ => None,
    });
    let (origin, collapsed) = cave_in.expect("no cave-in");
    assert_eq!(origin, base);
    assert_eq!(collapsed.len(), 3);
    assert_eq!(sim.world().peek_block(WorldPos::new(5, 5, 6)), BlockType::Air);
    assert_eq!(sim.world().peek_block(base), BlockType::Gravel);
}
