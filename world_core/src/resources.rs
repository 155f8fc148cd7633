use std::collections::HashMap;

use bevy::prelude::*;
use preset_schema::{
    GenerationParameters, GridDimensions, IdeologyFile, IdeologyFingerprint, StorykeeperEntry,
    TechLevel, TileArrays,
};

use crate::config::FactionDef;

/// Live tile grid. Holds the same arrays a captured terrain section carries.
#[derive(Resource, Debug, Clone)]
pub struct WorldGrid(pub TileArrays);

impl WorldGrid {
    pub fn new(dimensions: GridDimensions) -> Self {
        Self(TileArrays::new(dimensions))
    }

    pub fn tiles(&self) -> &TileArrays {
        &self.0
    }

    pub fn tiles_mut(&mut self) -> &mut TileArrays {
        &mut self.0
    }

    pub fn tile_count(&self) -> usize {
        self.0.tile_count()
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.0.dimensions
    }

    pub fn is_land(&self, tile: u32) -> bool {
        self.0.contains(tile) && !self.0.biome[tile as usize].is_water()
    }
}

/// Parameters every generation step reads.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct GenerationTuning(pub GenerationParameters);

/// Faction definitions available to generation and restore.
#[derive(Resource, Debug, Clone, Default)]
pub struct FactionDefs(pub Vec<FactionDef>);

impl FactionDefs {
    pub fn get(&self, def_name: &str) -> Option<&FactionDef> {
        self.0.iter().find(|def| def.def_name == def_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdeologyId(pub u32);

/// Loaded ideologies, deduplicated by content fingerprint.
#[derive(Resource, Debug, Default)]
pub struct IdeologyRegistry {
    entries: Vec<IdeologyFile>,
    by_fingerprint: HashMap<IdeologyFingerprint, IdeologyId>,
}

impl IdeologyRegistry {
    /// Registers `ideology` unless an equivalent one is already loaded.
    /// Returns the id and whether an existing entry was reused.
    pub fn register(&mut self, ideology: IdeologyFile) -> (IdeologyId, bool) {
        let fingerprint = ideology.fingerprint();
        if let Some(&id) = self.by_fingerprint.get(&fingerprint) {
            return (id, true);
        }
        let id = IdeologyId(self.entries.len() as u32);
        self.entries.push(ideology);
        self.by_fingerprint.insert(fingerprint, id);
        (id, false)
    }

    pub fn get(&self, id: IdeologyId) -> Option<&IdeologyFile> {
        self.entries.get(id.0 as usize)
    }

    pub fn find(&self, fingerprint: IdeologyFingerprint) -> Option<IdeologyId> {
        self.by_fingerprint.get(&fingerprint).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct StorykeeperRoster(pub Vec<StorykeeperEntry>);

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldTechLevel(pub TechLevel);

/// Hands out unique world feature ids.
#[derive(Resource, Debug, Clone, Default)]
pub struct FeatureIdAllocator {
    next: u32,
}

impl FeatureIdAllocator {
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Guarantees future ids never collide with `id`.
    pub fn advance_past(&mut self, id: u32) {
        self.next = self.next.max(id.saturating_add(1));
    }

    pub fn peek(&self) -> u32 {
        self.next
    }
}
