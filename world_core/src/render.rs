//! Flat map rendering for previews and preset thumbnails.

use std::io::Cursor;

use bevy::prelude::*;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use preset_schema::{Biome, RiverKind, RoadKind, TileArrays};
use thiserror::Error;

use crate::{components::Settlement, resources::WorldGrid};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("bitmap is {width}x{height} but holds {len} bytes")]
    BadBuffer { width: u32, height: u32, len: usize },
    #[error("failed to encode preview image")]
    Encode(#[from] image::ImageError),
}

/// RGBA8 pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PreviewBitmap {
    pub fn blank(width: u32, height: u32) -> Self {
        let mut pixels = vec![0; width as usize * height as usize * 4];
        for alpha in pixels.iter_mut().skip(3).step_by(4) {
            *alpha = 255;
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    fn put(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if x < self.width && y < self.height {
            let offset = (y as usize * self.width as usize + x as usize) * 4;
            self.pixels[offset..offset + 4].copy_from_slice(&color);
        }
    }

    /// A black centre means the renderer produced nothing usable. Empty
    /// bitmaps count as black.
    pub fn center_is_black(&self) -> bool {
        match self.pixel(self.width / 2, self.height / 2) {
            Some([r, g, b, _]) => r == 0 && g == 0 && b == 0,
            None => true,
        }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, PreviewError> {
        let bad_buffer = || PreviewError::BadBuffer {
            width: self.width,
            height: self.height,
            len: self.pixels.len(),
        };
        let image =
            RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(bad_buffer)?;
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image).write_to(&mut out, ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }
}

pub trait PreviewRenderer: Send {
    fn render(&mut self, world: &World) -> PreviewBitmap;
}

/// Paints each tile as a `scale`×`scale` block coloured by biome, then
/// overlays rivers, roads and settlements.
#[derive(Debug, Clone, Copy)]
pub struct BiomeRenderer {
    pub scale: u32,
}

impl Default for BiomeRenderer {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

const RIVER_COLOR: [u8; 4] = [64, 128, 224, 255];
const ROAD_COLOR: [u8; 4] = [120, 110, 96, 255];
const HIGHWAY_COLOR: [u8; 4] = [60, 60, 64, 255];
const SETTLEMENT_COLOR: [u8; 4] = [220, 40, 40, 255];

fn biome_color(biome: Biome) -> [u8; 3] {
    match biome {
        Biome::Ocean => [24, 52, 110],
        Biome::Lake => [48, 96, 160],
        Biome::SeaIce => [200, 220, 235],
        Biome::IceSheet => [235, 240, 245],
        Biome::Tundra => [150, 160, 140],
        Biome::BorealForest => [50, 100, 70],
        Biome::TemperateForest => [60, 130, 60],
        Biome::TemperateSwamp => [80, 110, 70],
        Biome::TropicalRainforest => [30, 120, 40],
        Biome::TropicalSwamp => [60, 100, 50],
        Biome::AridShrubland => [170, 160, 100],
        Biome::Desert => [210, 190, 130],
        Biome::ExtremeDesert => [230, 210, 160],
    }
}

fn tile_color(tiles: &TileArrays, tile: usize) -> [u8; 4] {
    let biome = tiles.biome[tile];
    let [r, g, b] = biome_color(biome);
    if biome.is_water() {
        return [r, g, b, 255];
    }
    // Higher land reads lighter.
    let lift = (tiles.elevation[tile] / 3000.0).clamp(0.0, 1.0) * 0.35;
    let shade = |c: u8| (c as f32 + (255.0 - c as f32) * lift) as u8;
    [shade(r), shade(g), shade(b), 255]
}

impl BiomeRenderer {
    fn fill_tile(&self, bitmap: &mut PreviewBitmap, x: u32, y: u32, color: [u8; 4]) {
        for dy in 0..self.scale {
            for dx in 0..self.scale {
                bitmap.put(x * self.scale + dx, y * self.scale + dy, color);
            }
        }
    }

    fn mark_tile(&self, bitmap: &mut PreviewBitmap, x: u32, y: u32, color: [u8; 4]) {
        let half = self.scale / 2;
        bitmap.put(x * self.scale + half, y * self.scale + half, color);
    }
}

impl PreviewRenderer for BiomeRenderer {
    fn render(&mut self, world: &World) -> PreviewBitmap {
        let scale = self.scale.max(1);
        self.scale = scale;
        let Some(grid) = world.get_resource::<WorldGrid>() else {
            return PreviewBitmap::blank(0, 0);
        };
        let dims = grid.dimensions();
        let tiles = grid.tiles();
        let mut bitmap = PreviewBitmap::blank(dims.width * scale, dims.height * scale);

        for tile in 0..tiles.tile_count() {
            let (x, y) = dims.coords(tile as u32);
            self.fill_tile(&mut bitmap, x, y, tile_color(tiles, tile));
        }
        for link in &tiles.rivers {
            for end in [link.origin, link.neighbor] {
                let (x, y) = dims.coords(end);
                if link.kind >= RiverKind::River || scale == 1 {
                    self.fill_tile(&mut bitmap, x, y, RIVER_COLOR);
                } else {
                    self.mark_tile(&mut bitmap, x, y, RIVER_COLOR);
                }
            }
        }
        for link in &tiles.roads {
            let color = match link.kind {
                RoadKind::AncientAsphaltHighway | RoadKind::AncientAsphaltRoad => HIGHWAY_COLOR,
                _ => ROAD_COLOR,
            };
            for end in [link.origin, link.neighbor] {
                let (x, y) = dims.coords(end);
                self.mark_tile(&mut bitmap, x, y, color);
            }
        }
        for settlement in world
            .iter_entities()
            .filter_map(|entity| entity.get::<Settlement>())
        {
            if tiles.contains(settlement.tile) {
                let (x, y) = dims.coords(settlement.tile);
                self.fill_tile(&mut bitmap, x, y, SETTLEMENT_COLOR);
            }
        }
        bitmap
    }
}
