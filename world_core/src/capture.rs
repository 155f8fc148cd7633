use std::collections::{BTreeMap, HashMap, HashSet};

use bevy::prelude::*;
use preset_schema::{
    FactionOverride, IdeologyFileNames, IdeologyFileRef, InclusionFlags, MapMarkerRecord,
    MarkerLayer, NamedIdeology, PollutionOverride, PresetSnapshot, RegionFeature, SessionPayload, SettlementRecord,
    TerrainData, TerrainSection, WorldFeatureRecord, WorldSections,
};

use crate::{
    components::{FeatureKind, Faction, MapMarker, Settlement, WorldFeature},
    resources::{GenerationTuning, IdeologyRegistry, StorykeeperRoster, WorldGrid, WorldTechLevel},
    session::PresetSession,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerrainCaptureMode {
    /// Every per-tile array plus the region features they reference.
    #[default]
    FullGrid,
    /// Only tiles whose pollution is above zero.
    OverridesOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub flags: InclusionFlags,
    pub terrain_mode: TerrainCaptureMode,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::new(InclusionFlags::all())
    }
}

impl CaptureOptions {
    pub fn new(flags: InclusionFlags) -> Self {
        Self {
            flags,
            terrain_mode: TerrainCaptureMode::FullGrid,
        }
    }

    pub fn with_terrain_mode(mut self, mode: TerrainCaptureMode) -> Self {
        self.terrain_mode = mode;
        self
    }
}

/// Reads the flagged parts of the live world into portable sections.
pub fn capture_sections(
    world: &World,
    session: &PresetSession,
    options: &CaptureOptions,
) -> WorldSections {
    let flags = options.flags;
    let mut sections = WorldSections::empty(flags);

    if flags.contains(InclusionFlags::TERRAIN) {
        sections.terrain = capture_terrain(world, options.terrain_mode);
    }
    if flags.contains(InclusionFlags::BASES) {
        sections.settlements = capture_settlements(world, session);
    }
    if flags.contains(InclusionFlags::MAP_MARKERS) {
        sections.map_markers = capture_markers(world, session);
    }
    if flags.contains(InclusionFlags::WORLD_FEATURES) {
        sections.world_features = capture_labels(world);
    }
    if flags.intersects(InclusionFlags::FACTIONS | InclusionFlags::IDEOLOGIES) {
        let (overrides, ideology_files) = capture_factions(world, session, flags);
        sections.faction_overrides = overrides;
        sections.ideology_files = ideology_files;
    }
    if flags.contains(InclusionFlags::STORYKEEPER_ENTRIES) {
        sections.storykeeper = world
            .get_resource::<StorykeeperRoster>()
            .map(|roster| roster.0.clone())
            .unwrap_or_default();
    }
    if flags.contains(InclusionFlags::TECH_LEVEL) {
        sections.tech_level = Some(
            world
                .get_resource::<WorldTechLevel>()
                .map(|tech| tech.0)
                .unwrap_or_default(),
        );
    }
    if flags.contains(InclusionFlags::GENERATION_PARAMETERS) {
        sections.generation_parameters = Some(
            world
                .get_resource::<GenerationTuning>()
                .map(|tuning| tuning.0.clone())
                .unwrap_or_default(),
        );
    }

    tracing::debug!(
        target: "world_presets::capture",
        flags = ?flags,
        settlements = sections.settlements.len(),
        markers = sections.map_markers.len(),
        features = sections.world_features.len(),
        factions = sections.faction_overrides.len(),
        "capture.sections_built"
    );
    sections
}

pub fn capture_preset(
    world: &World,
    session: &PresetSession,
    name: impl Into<String>,
    description: impl Into<String>,
    options: &CaptureOptions,
) -> PresetSnapshot {
    let snapshot = PresetSnapshot::new(name, description, capture_sections(world, session, options));
    tracing::info!(
        target: "world_presets::capture",
        preset = %snapshot.name,
        flags = ?snapshot.flags(),
        "capture.preset_built"
    );
    snapshot
}

/// Payload for an ordinary save: every section except ideologies, with the
/// full grid.
pub fn capture_session_payload(world: &World, session: &PresetSession) -> SessionPayload {
    let options = CaptureOptions::new(InclusionFlags::session_default());
    SessionPayload::new(
        capture_sections(world, session, &options),
        session.applied_preset().map(str::to_string),
    )
}

/// Ideology files referenced by `sections`, under the file names capture
/// assigned them, ready to be written next to a preset.
pub fn referenced_ideologies(world: &World, sections: &WorldSections) -> Vec<NamedIdeology> {
    let Some(registry) = world.get_resource::<IdeologyRegistry>() else {
        return Vec::new();
    };
    let by_def: HashMap<&str, &Faction> = world
        .iter_entities()
        .filter_map(|entity| entity.get::<Faction>())
        .map(|faction| (faction.def_name.as_str(), faction))
        .collect();
    let mut files: BTreeMap<&str, NamedIdeology> = BTreeMap::new();
    for reference in &sections.ideology_files {
        if files.contains_key(reference.file_name.as_str()) {
            continue;
        }
        let ideology = by_def
            .get(reference.faction_def.as_str())
            .and_then(|faction| faction.primary_ideology)
            .and_then(|id| registry.get(id));
        let Some(ideology) = ideology else {
            tracing::warn!(
                target: "world_presets::capture",
                faction = %reference.faction_def,
                file = %reference.file_name,
                "capture.ideology_missing"
            );
            continue;
        };
        files.insert(
            reference.file_name.as_str(),
            NamedIdeology {
                file_name: reference.file_name.clone(),
                ideology: ideology.clone(),
            },
        );
    }
    files.into_values().collect()
}

fn capture_terrain(world: &World, mode: TerrainCaptureMode) -> Option<TerrainSection> {
    let Some(grid) = world.get_resource::<WorldGrid>() else {
        tracing::warn!(target: "world_presets::capture", "capture.terrain_skipped=no_grid");
        return None;
    };
    let tiles = grid.tiles();
    match mode {
        TerrainCaptureMode::OverridesOnly => {
            let overrides = tiles
                .pollution
                .iter()
                .enumerate()
                .filter(|(_, pollution)| **pollution > 0.0)
                .map(|(tile, pollution)| PollutionOverride {
                    tile: tile as u32,
                    pollution: *pollution,
                })
                .collect();
            Some(TerrainSection::overrides(overrides))
        }
        TerrainCaptureMode::FullGrid => {
            let mut regions = Vec::new();
            let mut label_ids = HashSet::new();
            for feature in world.iter_entities().filter_map(|e| e.get::<WorldFeature>()) {
                match feature.kind {
                    FeatureKind::Region => regions.push(RegionFeature {
                        id: feature.id,
                        label: feature.label.clone(),
                    }),
                    FeatureKind::Label => {
                        label_ids.insert(feature.id);
                    }
                }
            }
            regions.sort_by_key(|region| region.id);

            // Label slots are rebuilt from the features section.
            let mut copy = tiles.clone();
            for slot in copy.feature_ids.iter_mut() {
                if slot.is_some_and(|id| label_ids.contains(&id)) {
                    *slot = None;
                }
            }
            Some(TerrainSection::full(TerrainData {
                tiles: copy,
                features: regions,
            }))
        }
    }
}

fn faction_index(world: &World) -> HashMap<Entity, &Faction> {
    world
        .iter_entities()
        .filter_map(|entity| entity.get::<Faction>().map(|faction| (entity.id(), faction)))
        .collect()
}

fn capture_settlements(world: &World, session: &PresetSession) -> Vec<SettlementRecord> {
    let factions = faction_index(world);
    let mut records: Vec<SettlementRecord> = world
        .iter_entities()
        .filter_map(|entity| {
            let settlement = entity.get::<Settlement>()?;
            let Some(faction) = factions.get(&settlement.faction) else {
                tracing::warn!(
                    target: "world_presets::capture",
                    tile = settlement.tile,
                    "capture.settlement_skipped=no_faction"
                );
                return None;
            };
            if faction.is_player {
                return None;
            }
            Some(SettlementRecord {
                tile: settlement.tile,
                name: Some(settlement.name.clone()),
                faction_def: faction.def_name.clone(),
                custom: session.settlement_custom(entity.id()).cloned(),
            })
        })
        .collect();
    records.sort_by(|a, b| a.tile.cmp(&b.tile).then_with(|| a.name.cmp(&b.name)));
    records
}

fn capture_markers(world: &World, session: &PresetSession) -> Vec<MapMarkerRecord> {
    let mut records: Vec<MapMarkerRecord> = world
        .iter_entities()
        .filter_map(|entity| {
            let marker = entity.get::<MapMarker>()?;
            (marker.layer == MarkerLayer::Primary).then(|| MapMarkerRecord {
                tile: marker.tile,
                custom: session.entity_custom(entity.id()).cloned(),
            })
        })
        .collect();
    records.sort_by(|a, b| {
        a.tile.cmp(&b.tile).then_with(|| {
            let label = |r: &MapMarkerRecord| r.custom.as_ref().and_then(|c| c.label.clone());
            label(a).cmp(&label(b))
        })
    });
    records
}

fn capture_labels(world: &World) -> Vec<WorldFeatureRecord> {
    let mut records: Vec<WorldFeatureRecord> = world
        .iter_entities()
        .filter_map(|entity| entity.get::<WorldFeature>())
        .filter(|feature| feature.is_label())
        .map(|feature| WorldFeatureRecord {
            tile: feature.tile,
            label: feature.label.clone(),
            max_draw_size: feature.max_draw_size,
            rotation: feature.rotation,
        })
        .collect();
    records.sort_by(|a, b| a.tile.cmp(&b.tile).then_with(|| a.label.cmp(&b.label)));
    records
}

fn capture_factions(
    world: &World,
    session: &PresetSession,
    flags: InclusionFlags,
) -> (BTreeMap<String, FactionOverride>, Vec<IdeologyFileRef>) {
    let registry = world.get_resource::<IdeologyRegistry>();
    let mut overrides = BTreeMap::new();
    let mut ideology_files = Vec::new();
    let mut file_names = IdeologyFileNames::new();

    // Sorted so file name suffixes do not depend on spawn order.
    let mut factions: Vec<(Entity, &Faction)> = world
        .iter_entities()
        .filter_map(|entity| entity.get::<Faction>().map(|faction| (entity.id(), faction)))
        .collect();
    factions.sort_by(|a, b| a.1.def_name.cmp(&b.1.def_name));

    for (entity, faction) in factions {
        let mut entry = FactionOverride::default();
        if flags.contains(InclusionFlags::FACTIONS) {
            entry.name = Some(faction.name.clone());
            entry.description = Some(faction.description.clone());
            entry.icon = faction.icon.clone();
            entry.population = session.faction_population(entity).cloned();
        }
        if flags.contains(InclusionFlags::IDEOLOGIES) {
            let ideology = faction
                .primary_ideology
                .and_then(|id| registry.and_then(|registry| registry.get(id)));
            if let Some(ideology) = ideology {
                let file_name = file_names.assign(ideology);
                entry.ideology_file = Some(file_name.clone());
                ideology_files.push(IdeologyFileRef {
                    faction_def: faction.def_name.clone(),
                    file_name,
                });
            }
        }
        if !entry.is_empty() {
            overrides.insert(faction.def_name.clone(), entry);
        }
    }
    (overrides, ideology_files)
}
