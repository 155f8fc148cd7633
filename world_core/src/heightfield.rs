use bevy::prelude::*;
use preset_schema::{Biome, GridDimensions, Hilliness, TileArrays, TileMutators};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::generation::{grid_mut, tuning, GenerationError};

/// Noise cells across the planet's width at the lowest octave.
const CONTINENT_CELLS: i32 = 4;
const RIDGE_CELLS: i32 = 12;
const RAIN_CELLS: i32 = 6;
const LAND_RELIEF_M: f32 = 2500.0;
const OCEAN_DEPTH_M: f32 = 4000.0;
const LAPSE_RATE_C_PER_M: f32 = 0.0065;

/// Elevation, climate, hilliness, biomes and base pollution.
pub(crate) fn generate_terrain(
    world: &mut World,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    let params = tuning(world);
    let mut grid = grid_mut(world, "terrain")?;
    let tiles = grid.tiles_mut();
    let dims = tiles.dimensions;
    let count = tiles.tile_count();

    let continent_seed: u32 = rng.gen();
    let ridge_seed: u32 = rng.gen();
    let rain_seed: u32 = rng.gen();
    let smog_seed: u32 = rng.gen();

    let raw: Vec<f32> = (0..count as u32)
        .map(|tile| {
            let continent = sample(dims, tile, CONTINENT_CELLS, 4, continent_seed);
            let lat = dims.latitude(tile).abs();
            (continent - lat.powi(4) * 0.15).clamp(0.0, 1.0)
        })
        .collect();
    let sea_level = sea_level(&raw, params.ocean_fraction);
    let mountain_scale = params.mountain_density.min(3.0);

    for index in 0..count {
        let tile = index as u32;
        let value = raw[index];
        let lat = dims.latitude(tile).abs();
        let is_water = value < sea_level;

        let (elevation, relief) = if is_water {
            let depth = (sea_level - value) / sea_level.max(f32::EPSILON);
            (-depth * OCEAN_DEPTH_M, 0.0)
        } else {
            let relief = (value - sea_level) / (1.0 - sea_level).max(f32::EPSILON);
            (relief * LAND_RELIEF_M, relief)
        };
        tiles.elevation[index] = elevation;

        let temperature = 28.0 - 55.0 * lat.powf(1.3) - elevation.max(0.0) * LAPSE_RATE_C_PER_M
            + params.temperature_offset;
        tiles.temperature[index] = temperature;

        let rain = sample(dims, tile, RAIN_CELLS, 3, rain_seed);
        let rainfall = rain * 2200.0 * params.rainfall_modifier * (1.0 - 0.5 * lat);
        tiles.rainfall[index] = rainfall;

        if is_water {
            tiles.biome[index] = if temperature < -10.0 {
                Biome::SeaIce
            } else {
                Biome::Ocean
            };
            continue;
        }

        let ridge = ridged(sample(dims, tile, RIDGE_CELLS, 3, ridge_seed));
        tiles.hilliness[index] = classify_hilliness((relief * 0.6 + ridge * 0.4) * mountain_scale);

        let swampiness = if relief < 0.2 {
            ((rainfall - 1000.0) / 1200.0).clamp(0.0, 1.0) * (1.0 - relief * 5.0)
        } else {
            0.0
        };
        tiles.swampiness[index] = swampiness;
        tiles.biome[index] = classify_biome(temperature, rainfall, swampiness);

        let smog = sample(dims, tile, RAIN_CELLS, 2, smog_seed);
        tiles.pollution[index] = (params.pollution * smog).clamp(0.0, 1.0);
    }

    stamp_mutators(tiles, rng);
    Ok(())
}

fn stamp_mutators(tiles: &mut TileArrays, rng: &mut ChaCha8Rng) {
    let dims = tiles.dimensions;
    for index in 0..tiles.tile_count() {
        let biome = tiles.biome[index];
        if biome.is_water() {
            continue;
        }
        let tile = index as u32;
        let mut mutators = TileMutators::empty();
        for neighbor in dims.neighbors(tile) {
            let other = tiles.biome[neighbor as usize];
            if other == Biome::Ocean || other == Biome::SeaIce {
                mutators |= TileMutators::COAST;
            } else if !other.is_water() && other != biome {
                mutators |= TileMutators::MIXED_BIOME;
            }
        }
        let hilly = matches!(
            tiles.hilliness[index],
            Hilliness::LargeHills | Hilliness::Mountainous
        );
        if hilly && rng.gen_bool(0.15) {
            mutators |= TileMutators::CAVES;
        }
        if rng.gen_bool(0.01) {
            mutators |= TileMutators::HOT_SPRINGS;
        }
        tiles.mutators[index] = mutators;
    }
}

/// Raw value below which `ocean_fraction` of the tiles fall.
fn sea_level(raw: &[f32], ocean_fraction: f32) -> f32 {
    if raw.is_empty() {
        return 0.0;
    }
    let mut sorted = raw.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let position = (sorted.len() as f32 * ocean_fraction.clamp(0.0, 1.0)).floor() as usize;
    match sorted.get(position) {
        Some(value) => *value,
        None => f32::MAX,
    }
}

pub(crate) fn classify_hilliness(score: f32) -> Hilliness {
    if score < 0.15 {
        Hilliness::Flat
    } else if score < 0.35 {
        Hilliness::SmallHills
    } else if score < 0.6 {
        Hilliness::LargeHills
    } else if score < 0.85 {
        Hilliness::Mountainous
    } else {
        Hilliness::Impassable
    }
}

pub(crate) fn classify_biome(temperature: f32, rainfall: f32, swampiness: f32) -> Biome {
    if temperature < -15.0 {
        Biome::IceSheet
    } else if temperature < -5.0 {
        Biome::Tundra
    } else if temperature < 5.0 {
        Biome::BorealForest
    } else if temperature < 20.0 {
        if rainfall < 300.0 {
            Biome::AridShrubland
        } else if swampiness > 0.5 {
            Biome::TemperateSwamp
        } else {
            Biome::TemperateForest
        }
    } else if rainfall < 150.0 {
        Biome::ExtremeDesert
    } else if rainfall < 400.0 {
        Biome::Desert
    } else if rainfall < 900.0 {
        Biome::AridShrubland
    } else if swampiness > 0.5 {
        Biome::TropicalSwamp
    } else {
        Biome::TropicalRainforest
    }
}

fn ridged(value: f32) -> f32 {
    (1.0 - (value - 0.5).abs() * 2.0).clamp(0.0, 1.0).powf(1.6)
}

/// fBm sample for a tile, seamless across the x wrap.
fn sample(dims: GridDimensions, tile: u32, cells: i32, octaves: u32, seed: u32) -> f32 {
    let (x, y) = dims.coords(tile);
    let nx = (x as f32 + 0.5) / dims.width as f32 * cells as f32;
    let ny = (y as f32 + 0.5) / dims.height as f32 * (cells as f32 * 0.5);
    fbm_noise(nx, ny, octaves, cells, seed)
}

fn fbm_noise(x: f32, y: f32, octaves: u32, period: i32, seed: u32) -> f32 {
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    let mut sum = 0.0;
    let mut normaliser = 0.0;
    let mut octave_period = period;
    for octave in 0..octaves {
        let octave_seed = seed.wrapping_add(octave.wrapping_mul(0x9E37_79B9));
        sum += value_noise(x * frequency, y * frequency, octave_period, octave_seed) * amplitude;
        normaliser += amplitude;
        frequency *= 2.0;
        amplitude *= 0.5;
        octave_period *= 2;
    }
    (sum / normaliser).clamp(0.0, 1.0)
}

fn value_noise(x: f32, y: f32, period: i32, seed: u32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let xf = smooth_step(x - x0 as f32);
    let yf = smooth_step(y - y0 as f32);
    let wrap = |value: i32| value.rem_euclid(period.max(1));

    let v00 = lattice(wrap(x0), y0, seed);
    let v10 = lattice(wrap(x0 + 1), y0, seed);
    let v01 = lattice(wrap(x0), y0 + 1, seed);
    let v11 = lattice(wrap(x0 + 1), y0 + 1, seed);

    let top = v00 + (v10 - v00) * xf;
    let bottom = v01 + (v11 - v01) * xf;
    top + (bottom - top) * yf
}

fn smooth_step(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lattice(x: i32, y: i32, seed: u32) -> f32 {
    let mut n = (x as u32).wrapping_mul(0x6C8E_9CF5) ^ (y as u32).wrapping_mul(0xB529_7A4D) ^ seed;
    n ^= n >> 13;
    n = n.wrapping_mul(0x1B56_C4E9);
    n ^= n >> 11;
    ((n >> 8) & 0xFFFF) as f32 / 65535.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sea_level_splits_by_fraction() {
        let raw: Vec<f32> = (0..10).map(|v| v as f32 / 10.0).collect();
        let level = sea_level(&raw, 0.6);
        assert_eq!(raw.iter().filter(|v| **v < level).count(), 6);
        assert_eq!(raw.iter().filter(|v| **v < sea_level(&raw, 0.0)).count(), 0);
    }

    #[test]
    fn noise_wraps_horizontally() {
        let period = 4;
        let left = value_noise(0.25, 1.5, period, 7);
        let right = value_noise(4.25, 1.5, period, 7);
        assert!((left - right).abs() < f32::EPSILON);
    }

    #[test]
    fn cold_land_is_ice() {
        assert_eq!(classify_biome(-30.0, 500.0, 0.0), Biome::IceSheet);
        assert_eq!(classify_biome(25.0, 100.0, 0.0), Biome::ExtremeDesert);
        assert_eq!(classify_biome(12.0, 1200.0, 0.8), Biome::TemperateSwamp);
    }
}
