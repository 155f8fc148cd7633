use std::collections::{HashSet, VecDeque};

use bevy::prelude::*;
use preset_schema::{Biome, RiverKind, TileArrays, TileLink, TileMutators};
use rand::{seq::SliceRandom, Rng};
use rand_chacha::ChaCha8Rng;

use crate::generation::{grid_mut, tuning, GenerationError};

/// River sources per land tile at density 1.0.
const RIVER_SOURCE_RATIO: f32 = 0.02;
const RIVER_MIN_RAINFALL: f32 = 400.0;
const RIVER_MIN_ELEVATION_M: f32 = 250.0;
const LAKE_CHANCE: f32 = 0.35;

/// Floods inland basins: land tiles lower than every neighbour and not
/// touching the sea.
pub(crate) fn generate_lakes(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let params = tuning(world);
    let mut grid = grid_mut(world, "lakes")?;
    let tiles = grid.tiles_mut();
    let dims = tiles.dimensions;
    let chance = (LAKE_CHANCE * params.lake_density).clamp(0.0, 1.0) as f64;

    let basins: Vec<u32> = (0..tiles.tile_count() as u32)
        .filter(|&tile| is_basin(tiles, tile))
        .collect();
    let mut flooded = 0usize;
    for tile in basins {
        if !rng.gen_bool(chance) {
            continue;
        }
        tiles.biome[tile as usize] = Biome::Lake;
        tiles.swampiness[tile as usize] = 0.0;
        for neighbor in dims.neighbors(tile) {
            if !tiles.biome[neighbor as usize].is_water() {
                tiles.mutators[neighbor as usize] |= TileMutators::LAKESHORE;
            }
        }
        flooded += 1;
    }
    tracing::debug!(target: "world_presets::mapgen", flooded, "mapgen.lakes=flooded");
    Ok(())
}

fn is_basin(tiles: &TileArrays, tile: u32) -> bool {
    let index = tile as usize;
    if tiles.biome[index].is_water() {
        return false;
    }
    let elevation = tiles.elevation[index];
    tiles.dimensions.neighbors(tile).all(|neighbor| {
        let other = neighbor as usize;
        !tiles.biome[other].is_water() && tiles.elevation[other] > elevation
    })
}

/// Traces rivers downhill from wet highland sources and records the distance
/// from every tile to the nearest river.
pub(crate) fn generate_rivers(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let params = tuning(world);
    let mut grid = grid_mut(world, "rivers")?;
    let tiles = grid.tiles_mut();
    tiles.rivers.clear();

    let land_count = tiles.biome.iter().filter(|biome| !biome.is_water()).count();
    let target = (land_count as f32 * RIVER_SOURCE_RATIO * params.river_density).round() as usize;
    let mut sources: Vec<u32> = (0..tiles.tile_count() as u32)
        .filter(|&tile| {
            let index = tile as usize;
            !tiles.biome[index].is_water()
                && tiles.rainfall[index] >= RIVER_MIN_RAINFALL
                && tiles.elevation[index] >= RIVER_MIN_ELEVATION_M
        })
        .collect();
    sources.shuffle(rng);

    let mut seen = HashSet::new();
    let mut traced = 0usize;
    for source in sources.into_iter().take(target) {
        if trace_river(tiles, source, &mut seen) {
            traced += 1;
        }
    }

    for link in tiles.rivers.clone() {
        for tile in [link.origin, link.neighbor] {
            if !tiles.biome[tile as usize].is_water() {
                tiles.mutators[tile as usize] |= TileMutators::RIVER;
            }
        }
    }
    tiles.river_distance = river_distance(tiles);
    tracing::debug!(
        target: "world_presets::mapgen",
        requested = target,
        traced,
        links = tiles.rivers.len(),
        "mapgen.rivers=traced"
    );
    Ok(())
}

/// Steepest descent from `source` until water, a sink, or an existing river.
fn trace_river(tiles: &mut TileArrays, source: u32, seen: &mut HashSet<(u32, u32)>) -> bool {
    let dims = tiles.dimensions;
    let max_length = dims.width as usize + dims.height as usize;
    let mut path = vec![source];
    let mut current = source;
    while path.len() <= max_length {
        let lowest = dims
            .neighbors(current)
            .min_by(|a, b| tiles.elevation[*a as usize].total_cmp(&tiles.elevation[*b as usize]));
        let Some(next) = lowest else {
            break;
        };
        if tiles.elevation[next as usize] >= tiles.elevation[current as usize] {
            break;
        }
        path.push(next);
        let joins_river = seen.iter().any(|(origin, _)| *origin == next);
        if tiles.biome[next as usize].is_water() || joins_river {
            break;
        }
        current = next;
    }
    if path.len() < 2 {
        return false;
    }
    for (step, pair) in path.windows(2).enumerate() {
        if seen.insert((pair[0], pair[1])) {
            tiles.rivers.push(TileLink {
                origin: pair[0],
                neighbor: pair[1],
                kind: river_kind(step),
            });
        }
    }
    true
}

fn river_kind(step: usize) -> RiverKind {
    match step {
        0..=3 => RiverKind::Creek,
        4..=7 => RiverKind::River,
        8..=13 => RiverKind::LargeRiver,
        _ => RiverKind::HugeRiver,
    }
}

/// Multi-source BFS from every river tile.
pub(crate) fn river_distance(tiles: &TileArrays) -> Vec<u32> {
    let dims = tiles.dimensions;
    let mut distance = vec![u32::MAX; tiles.tile_count()];
    let mut queue = VecDeque::new();
    for link in &tiles.rivers {
        for tile in [link.origin, link.neighbor] {
            if distance[tile as usize] != 0 {
                distance[tile as usize] = 0;
                queue.push_back(tile);
            }
        }
    }
    while let Some(tile) = queue.pop_front() {
        let next = distance[tile as usize] + 1;
        for neighbor in dims.neighbors(tile) {
            if distance[neighbor as usize] > next {
                distance[neighbor as usize] = next;
                queue.push_back(neighbor);
            }
        }
    }
    distance
}

#[cfg(test)]
mod tests {
    use preset_schema::GridDimensions;

    use super::*;

    #[test]
    fn distance_counts_steps_from_river() {
        let mut tiles = TileArrays::new(GridDimensions::from_subdivisions(1));
        tiles.rivers.push(TileLink {
            origin: 0,
            neighbor: 1,
            kind: RiverKind::Creek,
        });
        let distance = river_distance(&tiles);
        assert_eq!(distance[0], 0);
        assert_eq!(distance[1], 0);
        assert_eq!(distance[2], 1);
        assert_eq!(distance[tiles.dimensions.width as usize - 1], 1);
        assert!(distance.iter().all(|d| *d != u32::MAX));
    }

    #[test]
    fn river_follows_descent_into_water() {
        let dims = GridDimensions::from_subdivisions(1);
        let mut tiles = TileArrays::new(dims);
        for tile in 0..tiles.tile_count() {
            tiles.biome[tile] = Biome::TemperateForest;
            tiles.elevation[tile] = 1000.0;
        }
        let row = dims.index(0, 3);
        for x in 0..4 {
            tiles.elevation[(row + x) as usize] = 800.0 - x as f32 * 200.0;
        }
        tiles.biome[(row + 4) as usize] = Biome::Ocean;
        tiles.elevation[(row + 4) as usize] = -100.0;

        let mut seen = HashSet::new();
        assert!(trace_river(&mut tiles, row, &mut seen));
        let last = tiles.rivers.last().expect("river links");
        assert_eq!(last.neighbor, row + 4);
        assert_eq!(tiles.rivers.len(), 4);
    }
}
