use std::collections::{BTreeMap, HashSet, VecDeque};

use bevy::prelude::*;
use preset_schema::{GridDimensions, Hilliness, IdeologyFile, RoadKind, TileArrays, TileLink, TileMutators};
use rand::{seq::SliceRandom, Rng};
use rand_chacha::ChaCha8Rng;

use crate::{
    components::{FeatureKind, Faction, Settlement, WorldFeature},
    generation::{grid_mut, tuning, GenerationError},
    placement::spawn_settlement,
    resources::{FactionDefs, FeatureIdAllocator, IdeologyRegistry, WorldGrid},
};

const SITE_RATIO: f32 = 0.01;
const ANCIENT_ROAD_CHANCE: f32 = 0.6;
const FACTION_ROAD_CHANCE: f32 = 0.5;
const HIGHWAY_MIN_LENGTH: usize = 12;
const MIN_REGION_TILES: usize = 4;

const SITE_KINDS: [&str; 8] = [
    "Vault", "Spire", "Bunker", "Archive", "Relay", "Silo", "Obelisk", "Dome",
];
const SYLLABLES: [&str; 16] = [
    "ar", "bel", "cor", "dun", "el", "fal", "gar", "hal", "is", "kor", "lun", "mar", "nor",
    "os", "ven", "wyn",
];
const IDEOLOGY_ADJECTIVES: [&str; 6] = ["Sunward", "Iron", "Quiet", "Verdant", "Ashen", "Tidal"];
const IDEOLOGY_NOUNS: [&str; 6] = ["Path", "Creed", "Covenant", "Way", "Accord", "Chorus"];
const CULTURES: [&str; 4] = ["Rustican", "Corunan", "Astropolitan", "Kriminul"];
const MEMES: [&str; 8] = [
    "Collectivist",
    "Individualist",
    "Transhumanist",
    "NaturePrimacy",
    "Loyalist",
    "Raider",
    "Rancher",
    "HumanPrimacy",
];

fn pick<'a>(rng: &mut ChaCha8Rng, options: &[&'a str]) -> &'a str {
    options[rng.gen_range(0..options.len())]
}

fn proper_name(rng: &mut ChaCha8Rng) -> String {
    let count = rng.gen_range(2..=3);
    let mut name = String::new();
    for _ in 0..count {
        name.push_str(pick(rng, &SYLLABLES));
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

fn land_tiles(tiles: &TileArrays) -> Vec<u32> {
    (0..tiles.tile_count() as u32)
        .filter(|&tile| !tiles.biome[tile as usize].is_water())
        .collect()
}

pub(crate) fn place_ancient_sites(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let params = tuning(world);
    let mut grid = grid_mut(world, "ancient_sites")?;
    let tiles = grid.tiles_mut();
    let mut land = land_tiles(tiles);
    let target = (land.len() as f32 * SITE_RATIO * params.ancient_site_density).round() as usize;
    land.shuffle(rng);
    for tile in land.into_iter().take(target) {
        let kind = pick(rng, &SITE_KINDS);
        tiles.landmarks[tile as usize] = Some(format!("Ancient {kind}"));
        tiles.mutators[tile as usize] |= TileMutators::ANCIENT_RUINS;
    }
    Ok(())
}

pub(crate) fn lay_ancient_roads(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let params = tuning(world);
    let mut grid = grid_mut(world, "ancient_roads")?;
    let tiles = grid.tiles_mut();
    let sites: Vec<u32> = tiles
        .landmarks
        .iter()
        .enumerate()
        .filter(|(_, landmark)| landmark.is_some())
        .map(|(tile, _)| tile as u32)
        .collect();
    let chance = (ANCIENT_ROAD_CHANCE * params.ancient_road_density).clamp(0.0, 1.0) as f64;
    for pair in sites.windows(2) {
        if !rng.gen_bool(chance) {
            continue;
        }
        if let Some(path) = trace_road(tiles, pair[0], pair[1]) {
            let kind = if path.len() >= HIGHWAY_MIN_LENGTH {
                RoadKind::AncientAsphaltHighway
            } else {
                RoadKind::AncientAsphaltRoad
            };
            lay_road(tiles, &path, kind);
        }
    }
    Ok(())
}

pub(crate) fn spawn_factions(world: &mut World) {
    let defs = world
        .get_resource::<FactionDefs>()
        .map(|defs| defs.0.clone())
        .unwrap_or_default();
    for def in defs {
        world.spawn(Faction {
            def_name: def.def_name,
            name: def.label,
            description: def.description,
            icon: def.icon,
            is_player: def.player,
            primary_ideology: None,
        });
    }
}

fn factions_by_def(world: &mut World) -> Vec<(Entity, String, bool)> {
    let mut factions: Vec<(Entity, String, bool)> = world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .map(|(entity, faction)| (entity, faction.def_name.clone(), faction.is_player))
        .collect();
    factions.sort_by(|a, b| a.1.cmp(&b.1));
    factions
}

/// One generated ideology per non-player faction.
pub(crate) fn generate_ideologies(world: &mut World, rng: &mut ChaCha8Rng) {
    world.init_resource::<IdeologyRegistry>();
    for (entity, _, is_player) in factions_by_def(world) {
        if is_player {
            continue;
        }
        let memes: Vec<String> = MEMES
            .choose_multiple(rng, 2)
            .map(|meme| meme.to_string())
            .collect();
        let ideology = IdeologyFile {
            name: format!(
                "{} {}",
                pick(rng, &IDEOLOGY_ADJECTIVES),
                pick(rng, &IDEOLOGY_NOUNS)
            ),
            culture: pick(rng, &CULTURES).to_string(),
            memes,
            description: None,
            precepts: Vec::new(),
        };
        let (id, _) = world.resource_mut::<IdeologyRegistry>().register(ideology);
        if let Some(mut faction) = world.get_mut::<Faction>(entity) {
            faction.primary_ideology = Some(id);
        }
    }
}

pub(crate) fn place_settlements(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let defs = world
        .get_resource::<FactionDefs>()
        .cloned()
        .unwrap_or_default();
    let factions = factions_by_def(world);
    let mut occupied: HashSet<u32> = world
        .query::<&Settlement>()
        .iter(world)
        .map(|settlement| settlement.tile)
        .collect();

    let mut candidates = {
        let grid = world
            .get_resource::<WorldGrid>()
            .ok_or(GenerationError::MissingResource {
                step: "settlements",
                resource: "WorldGrid",
            })?;
        let tiles = grid.tiles();
        land_tiles(tiles)
            .into_iter()
            .filter(|&tile| tiles.hilliness[tile as usize] != Hilliness::Impassable)
            .collect::<Vec<_>>()
    };
    candidates.shuffle(rng);
    let mut candidates = candidates.into_iter();

    let mut placements = Vec::new();
    for (faction, def_name, is_player) in factions {
        let count = if is_player {
            1
        } else {
            defs.get(&def_name).map_or(0, |def| def.settlements)
        };
        for _ in 0..count {
            let Some(tile) = candidates.find(|tile| !occupied.contains(tile)) else {
                tracing::warn!(
                    target: "world_presets::mapgen",
                    faction = %def_name,
                    "mapgen.settlements=out_of_land"
                );
                break;
            };
            occupied.insert(tile);
            placements.push((faction, tile, proper_name(rng)));
        }
    }

    for (faction, tile, name) in placements {
        if let Err(err) = spawn_settlement(world, faction, tile, name) {
            tracing::warn!(
                target: "world_presets::mapgen",
                tile,
                error = %err,
                "mapgen.settlement_skipped"
            );
        }
    }
    Ok(())
}

/// Dirt roads between neighbouring settlements of the same faction.
pub(crate) fn lay_faction_roads(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let params = tuning(world);
    let mut by_faction: BTreeMap<Entity, Vec<u32>> = BTreeMap::new();
    for settlement in world.query::<&Settlement>().iter(world) {
        by_faction
            .entry(settlement.faction)
            .or_default()
            .push(settlement.tile);
    }
    let chance = (FACTION_ROAD_CHANCE * params.faction_road_density).clamp(0.0, 1.0) as f64;
    let mut grid = grid_mut(world, "faction_roads")?;
    let tiles = grid.tiles_mut();
    for settlements in by_faction.values_mut() {
        settlements.sort_unstable();
        for pair in settlements.windows(2) {
            if !rng.gen_bool(chance) {
                continue;
            }
            if let Some(path) = trace_road(tiles, pair[0], pair[1]) {
                lay_road(tiles, &path, RoadKind::DirtRoad);
            }
        }
    }
    Ok(())
}

/// Names every sizeable landmass and points its tiles back at the region.
pub(crate) fn label_regions(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let regions = {
        let grid = world
            .get_resource::<WorldGrid>()
            .ok_or(GenerationError::MissingResource {
                step: "features",
                resource: "WorldGrid",
            })?;
        landmasses(grid.tiles())
    };
    world.init_resource::<FeatureIdAllocator>();

    let mut bindings = Vec::with_capacity(regions.len());
    for region in regions {
        let id = world.resource_mut::<FeatureIdAllocator>().allocate();
        world.spawn(WorldFeature {
            id,
            label: proper_name(rng),
            kind: FeatureKind::Region,
            tile: region[region.len() / 2],
            max_draw_size: (region.len() as f32).sqrt() * 2.0,
            rotation: 0.0,
        });
        bindings.push((id, region));
    }

    let mut grid = grid_mut(world, "features")?;
    let slots = &mut grid.tiles_mut().feature_ids;
    for (id, region) in bindings {
        for tile in region {
            slots[tile as usize] = Some(id);
        }
    }
    Ok(())
}

fn landmasses(tiles: &TileArrays) -> Vec<Vec<u32>> {
    let dims = tiles.dimensions;
    let mut visited = vec![false; tiles.tile_count()];
    let mut regions = Vec::new();
    for start in 0..tiles.tile_count() as u32 {
        if visited[start as usize] || tiles.biome[start as usize].is_water() {
            continue;
        }
        let mut region = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start as usize] = true;
        while let Some(tile) = queue.pop_front() {
            region.push(tile);
            for neighbor in dims.neighbors(tile) {
                let index = neighbor as usize;
                if !visited[index] && !tiles.biome[index].is_water() {
                    visited[index] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        if region.len() >= MIN_REGION_TILES {
            region.sort_unstable();
            regions.push(region);
        }
    }
    regions
}

fn wrapped_distance(dims: GridDimensions, a: u32, b: u32) -> u32 {
    let (ax, ay) = dims.coords(a);
    let (bx, by) = dims.coords(b);
    let dx = ax.abs_diff(bx);
    dx.min(dims.width - dx) + ay.abs_diff(by)
}

/// Greedy overland walk from `from` to `to`; gives up when blocked by water.
fn trace_road(tiles: &TileArrays, from: u32, to: u32) -> Option<Vec<u32>> {
    let dims = tiles.dimensions;
    let mut path = vec![from];
    let mut current = from;
    while current != to {
        let here = wrapped_distance(dims, current, to);
        let next = dims
            .neighbors(current)
            .filter(|&n| !tiles.biome[n as usize].is_water())
            .min_by_key(|&n| wrapped_distance(dims, n, to))?;
        if wrapped_distance(dims, next, to) >= here {
            return None;
        }
        path.push(next);
        current = next;
    }
    Some(path)
}

fn lay_road(tiles: &mut TileArrays, path: &[u32], kind: RoadKind) {
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let exists = tiles
            .roads
            .iter()
            .any(|link| (link.origin == a && link.neighbor == b) || (link.origin == b && link.neighbor == a));
        if !exists {
            tiles.roads.push(TileLink {
                origin: a,
                neighbor: b,
                kind,
            });
        }
    }
}
