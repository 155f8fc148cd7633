//! Spawning and removing the entity kinds presets know about. Generation,
//! restore and interactive edits all go through here so grid back-references
//! stay consistent.

use bevy::prelude::*;
use preset_schema::MarkerLayer;
use thiserror::Error;

use crate::{
    components::{FeatureKind, Faction, MapMarker, Settlement, WorldFeature},
    resources::{FeatureIdAllocator, WorldGrid},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("world has no tile grid")]
    NoGrid,
    #[error("tile {tile} is outside the {tile_count}-tile grid")]
    TileOutOfRange { tile: u32, tile_count: usize },
    #[error("entity {0:?} is not a faction")]
    NotAFaction(Entity),
}

fn check_tile(world: &World, tile: u32) -> Result<(), PlacementError> {
    let grid = world
        .get_resource::<WorldGrid>()
        .ok_or(PlacementError::NoGrid)?;
    if grid.tiles().contains(tile) {
        Ok(())
    } else {
        Err(PlacementError::TileOutOfRange {
            tile,
            tile_count: grid.tile_count(),
        })
    }
}

pub fn spawn_settlement(
    world: &mut World,
    faction: Entity,
    tile: u32,
    name: impl Into<String>,
) -> Result<Entity, PlacementError> {
    check_tile(world, tile)?;
    if world.get::<Faction>(faction).is_none() {
        return Err(PlacementError::NotAFaction(faction));
    }
    Ok(world
        .spawn(Settlement {
            faction,
            tile,
            name: name.into(),
        })
        .id())
}

pub fn spawn_map_marker(
    world: &mut World,
    tile: u32,
    layer: MarkerLayer,
) -> Result<Entity, PlacementError> {
    check_tile(world, tile)?;
    Ok(world.spawn(MapMarker { tile, layer }).id())
}

/// Spawns a text feature with a fresh id and binds it into the tile's
/// feature slot.
pub fn spawn_label_feature(
    world: &mut World,
    tile: u32,
    label: impl Into<String>,
    max_draw_size: f32,
    rotation: f32,
) -> Result<Entity, PlacementError> {
    check_tile(world, tile)?;
    let id = world
        .get_resource_or_insert_with(FeatureIdAllocator::default)
        .allocate();
    let entity = world
        .spawn(WorldFeature {
            id,
            label: label.into(),
            kind: FeatureKind::Label,
            tile,
            max_draw_size,
            rotation,
        })
        .id();
    if let Some(mut grid) = world.get_resource_mut::<WorldGrid>() {
        grid.tiles_mut().feature_ids[tile as usize] = Some(id);
    }
    Ok(entity)
}

/// Despawns a world feature and clears any tile slot still pointing at it.
pub fn despawn_feature(world: &mut World, entity: Entity) -> bool {
    let Some(feature) = world.get::<WorldFeature>(entity).cloned() else {
        return false;
    };
    if let Some(mut grid) = world.get_resource_mut::<WorldGrid>() {
        let slots = &mut grid.tiles_mut().feature_ids;
        match feature.kind {
            FeatureKind::Label => {
                if let Some(slot) = slots.get_mut(feature.tile as usize) {
                    if *slot == Some(feature.id) {
                        *slot = None;
                    }
                }
            }
            FeatureKind::Region => {
                for slot in slots.iter_mut().filter(|slot| **slot == Some(feature.id)) {
                    *slot = None;
                }
            }
        }
    }
    world.despawn(entity)
}

/// Entities carrying component `T` that pass `keep`, in spawn order.
pub fn entities_with<T: Component>(world: &World, keep: impl Fn(&T) -> bool) -> Vec<Entity> {
    world
        .iter_entities()
        .filter(|entity| entity.get::<T>().is_some_and(&keep))
        .map(|entity| entity.id())
        .collect()
}

#[cfg(test)]
mod tests {
    use preset_schema::GridDimensions;

    use super::*;

    fn world_with_grid() -> World {
        let mut world = World::new();
        world.insert_resource(WorldGrid::new(GridDimensions::from_subdivisions(1)));
        world
    }

    #[test]
    fn label_binds_and_clears_its_slot() {
        let mut world = world_with_grid();
        let entity = spawn_label_feature(&mut world, 5, "Here be dragons", 10.0, 0.0)
            .expect("tile in range");
        let id = world.get::<WorldFeature>(entity).map(|f| f.id);
        assert_eq!(world.resource::<WorldGrid>().tiles().feature_ids[5], id);

        assert!(despawn_feature(&mut world, entity));
        assert_eq!(world.resource::<WorldGrid>().tiles().feature_ids[5], None);
    }

    #[test]
    fn out_of_range_tiles_are_rejected() {
        let mut world = world_with_grid();
        let count = world.resource::<WorldGrid>().tile_count();
        let err = spawn_map_marker(&mut world, count as u32, MarkerLayer::Primary)
            .expect_err("tile past the end");
        assert_eq!(
            err,
            PlacementError::TileOutOfRange {
                tile: count as u32,
                tile_count: count
            }
        );
    }

    #[test]
    fn settlements_need_a_faction() {
        let mut world = world_with_grid();
        let stray = world.spawn_empty().id();
        assert_eq!(
            spawn_settlement(&mut world, stray, 3, "Nowhere"),
            Err(PlacementError::NotAFaction(stray))
        );
    }
}
