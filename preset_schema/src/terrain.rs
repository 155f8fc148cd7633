use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{params::GridDimensions, SchemaError};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Biome {
    #[default]
    Ocean,
    Lake,
    SeaIce,
    IceSheet,
    Tundra,
    BorealForest,
    TemperateForest,
    TemperateSwamp,
    TropicalRainforest,
    TropicalSwamp,
    AridShrubland,
    Desert,
    ExtremeDesert,
}

impl Biome {
    pub fn is_water(self) -> bool {
        matches!(self, Biome::Ocean | Biome::Lake | Biome::SeaIce)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Hilliness {
    #[default]
    Flat,
    SmallHills,
    LargeHills,
    Mountainous,
    Impassable,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoadKind {
    DirtPath,
    DirtRoad,
    StoneRoad,
    AncientAsphaltRoad,
    AncientAsphaltHighway,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiverKind {
    Creek,
    River,
    LargeRiver,
    HugeRiver,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TileMutators: u16 {
        const COAST = 1 << 0;
        const LAKESHORE = 1 << 1;
        const RIVER = 1 << 2;
        const CAVES = 1 << 3;
        const HOT_SPRINGS = 1 << 4;
        const MIXED_BIOME = 1 << 5;
        const ANCIENT_RUINS = 1 << 6;
    }
}

/// Directed edge between two adjacent tiles. `origin` is the tile that owns
/// the link, `neighbor` the adjacent tile it connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileLink<K> {
    pub origin: u32,
    pub neighbor: u32,
    pub kind: K,
}

/// Raw per-tile arrays of a world grid. The live grid holds exactly this
/// type, so substituting a captured copy is lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileArrays {
    pub dimensions: GridDimensions,
    pub biome: Vec<Biome>,
    pub elevation: Vec<f32>,
    pub hilliness: Vec<Hilliness>,
    pub temperature: Vec<f32>,
    pub rainfall: Vec<f32>,
    pub swampiness: Vec<f32>,
    pub pollution: Vec<f32>,
    pub roads: Vec<TileLink<RoadKind>>,
    pub rivers: Vec<TileLink<RiverKind>>,
    /// Steps to the nearest river tile, `u32::MAX` when unreachable.
    pub river_distance: Vec<u32>,
    pub mutators: Vec<TileMutators>,
    pub landmarks: Vec<Option<String>>,
    /// Back-reference from each tile to the feature drawn over it.
    pub feature_ids: Vec<Option<u32>>,
}

impl TileArrays {
    pub fn new(dimensions: GridDimensions) -> Self {
        let count = dimensions.tile_count();
        Self {
            dimensions,
            biome: vec![Biome::Ocean; count],
            elevation: vec![0.0; count],
            hilliness: vec![Hilliness::Flat; count],
            temperature: vec![0.0; count],
            rainfall: vec![0.0; count],
            swampiness: vec![0.0; count],
            pollution: vec![0.0; count],
            roads: Vec::new(),
            rivers: Vec::new(),
            river_distance: vec![u32::MAX; count],
            mutators: vec![TileMutators::empty(); count],
            landmarks: vec![None; count],
            feature_ids: vec![None; count],
        }
    }

    pub fn tile_count(&self) -> usize {
        self.dimensions.tile_count()
    }

    #[inline]
    pub fn contains(&self, tile: u32) -> bool {
        (tile as usize) < self.tile_count()
    }

    pub fn has_road(&self, tile: u32) -> bool {
        self.roads
            .iter()
            .any(|link| link.origin == tile || link.neighbor == tile)
    }

    pub fn has_river(&self, tile: u32) -> bool {
        self.rivers
            .iter()
            .any(|link| link.origin == tile || link.neighbor == tile)
    }

    /// Checks that the dimensions are a generated grid size, that every
    /// per-tile array matches them and that every link endpoint is a valid
    /// tile.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.dimensions.subdivisions().is_none() {
            return Err(SchemaError::invalid(
                "dimensions",
                format!(
                    "{}x{} is not a generated grid size",
                    self.dimensions.width, self.dimensions.height
                ),
            ));
        }
        let expected = self.tile_count();
        let lengths = [
            ("biome", self.biome.len()),
            ("elevation", self.elevation.len()),
            ("hilliness", self.hilliness.len()),
            ("temperature", self.temperature.len()),
            ("rainfall", self.rainfall.len()),
            ("swampiness", self.swampiness.len()),
            ("pollution", self.pollution.len()),
            ("river_distance", self.river_distance.len()),
            ("mutators", self.mutators.len()),
            ("landmarks", self.landmarks.len()),
            ("feature_ids", self.feature_ids.len()),
        ];
        for (field, found) in lengths {
            if found != expected {
                return Err(SchemaError::invalid(
                    field,
                    format!("holds {found} entries for {expected} tiles"),
                ));
            }
        }
        let out_of_range =
            |origin: u32, neighbor: u32| !self.contains(origin) || !self.contains(neighbor);
        if let Some(link) = self
            .roads
            .iter()
            .find(|link| out_of_range(link.origin, link.neighbor))
        {
            return Err(SchemaError::invalid(
                "roads",
                format!("link {}->{} leaves the grid", link.origin, link.neighbor),
            ));
        }
        if let Some(link) = self
            .rivers
            .iter()
            .find(|link| out_of_range(link.origin, link.neighbor))
        {
            return Err(SchemaError::invalid(
                "rivers",
                format!("link {}->{} leaves the grid", link.origin, link.neighbor),
            ));
        }
        Ok(())
    }
}

/// Named region feature (continent, ocean) referenced by
/// [`TileArrays::feature_ids`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFeature {
    pub id: u32,
    pub label: String,
}

/// Complete alternate grid plus the region features its back-references name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainData {
    pub tiles: TileArrays,
    #[serde(default)]
    pub features: Vec<RegionFeature>,
}

impl TerrainData {
    pub fn tile_count(&self) -> usize {
        self.tiles.tile_count()
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        self.tiles.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutionOverride {
    pub tile: u32,
    pub pollution: f32,
}

/// Terrain payload: either a full replacement grid or narrower overrides
/// applied onto the freshly generated grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TerrainSection {
    #[serde(default)]
    pub grid: Option<TerrainData>,
    #[serde(default)]
    pub pollution_overrides: Vec<PollutionOverride>,
}

impl TerrainSection {
    pub fn full(data: TerrainData) -> Self {
        Self {
            grid: Some(data),
            pollution_overrides: Vec::new(),
        }
    }

    pub fn overrides(pollution_overrides: Vec<PollutionOverride>) -> Self {
        Self {
            grid: None,
            pollution_overrides,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_none() && self.pollution_overrides.is_empty()
    }
}
