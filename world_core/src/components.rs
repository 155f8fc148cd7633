use bevy::prelude::*;
use preset_schema::MarkerLayer;

use crate::resources::IdeologyId;

/// A faction spawned from a configured definition.
#[derive(Component, Debug, Clone)]
pub struct Faction {
    pub def_name: String,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub is_player: bool,
    pub primary_ideology: Option<IdeologyId>,
}

/// A settlement on the world map, owned by a faction entity.
#[derive(Component, Debug, Clone)]
pub struct Settlement {
    pub faction: Entity,
    pub tile: u32,
    pub name: String,
}

/// Point marker placed on a tile.
#[derive(Component, Debug, Clone)]
pub struct MapMarker {
    pub tile: u32,
    pub layer: MarkerLayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Named area produced by generation (continent, ocean). Tiles point back
    /// at it through the grid's feature slots.
    Region,
    /// Free-standing text drawn over a single tile.
    Label,
}

#[derive(Component, Debug, Clone)]
pub struct WorldFeature {
    pub id: u32,
    pub label: String,
    pub kind: FeatureKind,
    pub tile: u32,
    pub max_draw_size: f32,
    pub rotation: f32,
}

impl WorldFeature {
    pub fn is_label(&self) -> bool {
        self.kind == FeatureKind::Label
    }
}
