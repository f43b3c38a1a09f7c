// Headless scenario runner.
//
// Builds a small settlement on flat ground (a wooden house and a stone wall,
// a stocked stockpile, and a handful of workers), runs the sim until both
// sites finish or the tick limit is hit, and logs a summary.
//
// Usage: `headless [seed] [max_ticks]`. Set `RUST_LOG=debug` for the full
// narrative.

use hearthvale_sim::block::Material;
use hearthvale_sim::command::{SimAction, SimCommand};
use hearthvale_sim::config::{GameConfig, TerrainConfig, WorldConfig};
use hearthvale_sim::event::SimEventKind;
use hearthvale_sim::sim::Sim;
use hearthvale_sim::types::{AgentId, BlueprintId, Rotation, WorldPos};
use hearthvale_sim::worker::AgentProfile;

const CHUNK: u64 = 100;

fn main() {
    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let mut args = std::env::args().skip(1);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(42);
    let max_ticks: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(20_000);

    let config = GameConfig {
        world: WorldConfig {
            terrain: TerrainConfig::Flat { height: 0 },
            ..WorldConfig::default()
        },
        stockpile_position: WorldPos::new(8, -4, 0),
        ..GameConfig::default()
    };
    let mut sim = match Sim::new(seed, config) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("cannot start: {e}");
            std::process::exit(1);
        }
    };

    let mut setup = vec![
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
            SimAction::PlaceBlueprint {
                blueprint: BlueprintId::from("stone_wall"),
                position: WorldPos::new(10, 0, 0),
                rotation: Rotation::R90,
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
        SimCommand::new(
            1,
            SimAction::StockMaterial {
                material: Material::Stone,
                amount: 10,
            },
        ),
    ];
    for i in 0..4 {
        setup.push(SimCommand::new(
            1,
            SimAction::RegisterWorker {
                agent: AgentId(i + 1),
                position: WorldPos::new(8 + i as i32, -6, 0),
                profile: AgentProfile::default(),
            },
        ));
    }

    let mut sites = 0;
    let mut completed = 0;
    let mut commands: &[SimCommand] = &setup;
    while sim.tick() < max_ticks {
        let target = (sim.tick() + CHUNK).min(max_ticks);
        let result = sim.step(commands, target);
        commands = &[];
        for event in &result.events {
            match &event.kind {
                SimEventKind::SitePlaced { site, blueprint } => {
                    sites += 1;
                    log::info!("tick {}: placed {site} ({blueprint})", event.tick);
                }
                SimEventKind::PlacementRejected { blueprint, reason, .. } => {
                    log::warn!("tick {}: {blueprint} rejected: {reason}", event.tick);
                }
                SimEventKind::SiteCompleted { site } => {
                    completed += 1;
                    log::info!("tick {}: {site} completed", event.tick);
                }
                _ => log::debug!("tick {}: {:?}", event.tick, event.kind),
            }
        }
        if sites > 0 && completed == sites {
            break;
        }
    }

    log::info!("stopped at tick {} with {completed}/{sites} sites complete", sim.tick());
    for agent in sim.workers().agents() {
        let s = agent.stats();
        log::info!(
            "{}: built {}, delivered {}, abandoned {}, worked {} ticks",
            agent.id,
            s.blocks_built,
            s.deliveries,
            s.tasks_abandoned,
            s.work_ticks
        );
    }
}
