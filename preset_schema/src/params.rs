use serde::{Deserialize, Serialize};

use crate::SchemaError;

pub const MIN_SUBDIVISIONS: u8 = 1;
pub const MAX_SUBDIVISIONS: u8 = 6;

/// Width/height of the equirectangular tile grid for a subdivision count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDimensions {
    pub width: u32,
    pub height: u32,
}

impl GridDimensions {
    pub fn from_subdivisions(subdivisions: u8) -> Self {
        let clamped = subdivisions.clamp(MIN_SUBDIVISIONS, MAX_SUBDIVISIONS);
        let height = 4u32 << clamped;
        Self {
            width: height * 2,
            height,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Subdivision count these dimensions come from; `None` for any size
    /// generation never produces.
    pub fn subdivisions(&self) -> Option<u8> {
        (MIN_SUBDIVISIONS..=MAX_SUBDIVISIONS).find(|n| Self::from_subdivisions(*n) == *self)
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> u32 {
        y * self.width + x
    }

    #[inline]
    pub fn coords(&self, tile: u32) -> (u32, u32) {
        (tile % self.width, tile / self.width)
    }

    /// 4-neighbourhood with wrap-around on the x axis.
    pub fn neighbors(&self, tile: u32) -> impl Iterator<Item = u32> {
        let (x, y) = self.coords(tile);
        let w = self.width;
        let mut out = Vec::with_capacity(4);
        out.push(self.index((x + 1) % w, y));
        out.push(self.index((x + w - 1) % w, y));
        if y > 0 {
            out.push(self.index(x, y - 1));
        }
        if y + 1 < self.height {
            out.push(self.index(x, y + 1));
        }
        out.into_iter()
    }

    /// Latitude in `[-1, 1]`, poles at the extremes.
    pub fn latitude(&self, tile: u32) -> f32 {
        let (_, y) = self.coords(tile);
        ((y as f32 + 0.5) / self.height as f32) * 2.0 - 1.0
    }
}

/// Tunable knobs read by the generation steps. Compared field by field to
/// decide whether a preview is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParameters {
    pub seed: String,
    pub subdivisions: u8,
    pub ocean_fraction: f32,
    pub river_density: f32,
    pub mountain_density: f32,
    pub lake_density: f32,
    pub ancient_site_density: f32,
    pub ancient_road_density: f32,
    pub faction_road_density: f32,
    pub rainfall_modifier: f32,
    pub temperature_offset: f32,
    pub pollution: f32,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            seed: "verdant".to_string(),
            subdivisions: 3,
            ocean_fraction: 0.6,
            river_density: 1.0,
            mountain_density: 1.0,
            lake_density: 1.0,
            ancient_site_density: 1.0,
            ancient_road_density: 1.0,
            faction_road_density: 1.0,
            rainfall_modifier: 1.0,
            temperature_offset: 0.0,
            pollution: 0.0,
        }
    }
}

impl GenerationParameters {
    pub fn dimensions(&self) -> GridDimensions {
        GridDimensions::from_subdivisions(self.subdivisions)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.seed.trim().is_empty() {
            return Err(SchemaError::invalid("seed", "must not be empty"));
        }
        if !(MIN_SUBDIVISIONS..=MAX_SUBDIVISIONS).contains(&self.subdivisions) {
            return Err(SchemaError::invalid(
                "subdivisions",
                format!(
                    "{} outside {}..={}",
                    self.subdivisions, MIN_SUBDIVISIONS, MAX_SUBDIVISIONS
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.ocean_fraction) {
            return Err(SchemaError::invalid(
                "ocean_fraction",
                format!("{} outside 0..=1", self.ocean_fraction),
            ));
        }
        let densities = [
            ("river_density", self.river_density),
            ("mountain_density", self.mountain_density),
            ("lake_density", self.lake_density),
            ("ancient_site_density", self.ancient_site_density),
            ("ancient_road_density", self.ancient_road_density),
            ("faction_road_density", self.faction_road_density),
            ("rainfall_modifier", self.rainfall_modifier),
            ("pollution", self.pollution),
        ];
        for (field, value) in densities {
            if !value.is_finite() || value < 0.0 {
                return Err(SchemaError::invalid(
                    field,
                    format!("{value} is not a finite non-negative number"),
                ));
            }
        }
        if !self.temperature_offset.is_finite() {
            return Err(SchemaError::invalid("temperature_offset", "must be finite"));
        }
        Ok(())
    }
}
