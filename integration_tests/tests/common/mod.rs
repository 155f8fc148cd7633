#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use bevy::prelude::*;
use preset_schema::{GenerationParameters, MarkerLayer};

use world_core::components::{Faction, MapMarker, Settlement};
use world_core::resources::WorldGrid;
use world_core::{load_preset_config_from_env, PresetConfig, WorldGenerator};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_preset_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test preset config at {}",
            config_path.display()
        );

        std::env::set_var("WORLD_PRESET_CONFIG_PATH", &config_path);
    });
}

pub fn config() -> Arc<PresetConfig> {
    ensure_test_config();
    load_preset_config_from_env().0
}

pub fn generator() -> WorldGenerator {
    WorldGenerator::new(config())
}

pub fn params(seed: &str) -> GenerationParameters {
    let mut params = config().default_generation().clone();
    params.seed = seed.to_string();
    params
}

pub fn generate(seed: &str) -> World {
    generator()
        .generate_plain(params(seed))
        .expect("world generates")
}

pub fn faction_by_def(world: &mut World, def_name: &str) -> Entity {
    world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .find(|(_, faction)| faction.def_name == def_name)
        .map(|(entity, _)| entity)
        .unwrap_or_else(|| panic!("faction {def_name} exists"))
}

pub fn player_factions(world: &mut World) -> HashSet<Entity> {
    world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .filter(|(_, faction)| faction.is_player)
        .map(|(entity, _)| entity)
        .collect()
}

/// `(tile, name, faction def)` for every non-player settlement, sorted.
pub fn settlement_sites(world: &mut World) -> Vec<(u32, String, String)> {
    let defs: Vec<(Entity, String, bool)> = world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .map(|(entity, faction)| (entity, faction.def_name.clone(), faction.is_player))
        .collect();
    let mut sites: Vec<(u32, String, String)> = world
        .query::<&Settlement>()
        .iter(world)
        .filter_map(|settlement| {
            let (_, def_name, is_player) =
                defs.iter().find(|(entity, _, _)| *entity == settlement.faction)?;
            (!is_player).then(|| (settlement.tile, settlement.name.clone(), def_name.clone()))
        })
        .collect();
    sites.sort();
    sites
}

pub fn npc_settlements(world: &mut World) -> Vec<Entity> {
    let players = player_factions(world);
    world
        .query::<(Entity, &Settlement)>()
        .iter(world)
        .filter(|(_, settlement)| !players.contains(&settlement.faction))
        .map(|(entity, _)| entity)
        .collect()
}

pub fn primary_marker_tiles(world: &mut World) -> Vec<u32> {
    let mut tiles: Vec<u32> = world
        .query::<&MapMarker>()
        .iter(world)
        .filter(|marker| marker.layer == MarkerLayer::Primary)
        .map(|marker| marker.tile)
        .collect();
    tiles.sort_unstable();
    tiles
}

/// Land tiles with no settlement on them.
pub fn free_land_tiles(world: &mut World, count: usize) -> Vec<u32> {
    let occupied: HashSet<u32> = world
        .query::<&Settlement>()
        .iter(world)
        .map(|settlement| settlement.tile)
        .collect();
    let grid = world.resource::<WorldGrid>();
    let tiles: Vec<u32> = (0..grid.tile_count() as u32)
        .filter(|tile| grid.is_land(*tile) && !occupied.contains(tile))
        .take(count)
        .collect();
    assert_eq!(tiles.len(), count, "not enough free land");
    tiles
}
