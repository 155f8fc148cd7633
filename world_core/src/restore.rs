//! Applies a preset's sections onto a freshly generated world.
//!
//! Every flagged section replaces what generation produced. Records that
//! cannot be applied are skipped and reported; restore itself never fails.

use std::collections::{BTreeMap, HashMap, HashSet};

use bevy::prelude::*;
use preset_schema::{
    IdeologyFile, InclusionFlags, MapMarkerRecord, MarkerLayer, NamedIdeology, PresetSnapshot,
    SchemaError, SettlementRecord, TerrainData, TerrainSection, WorldFeatureRecord, WorldSections,
};
use thiserror::Error;

use crate::{
    components::{FeatureKind, Faction, MapMarker, Settlement, WorldFeature},
    placement::{
        despawn_feature, entities_with, spawn_label_feature, spawn_map_marker, spawn_settlement,
        PlacementError,
    },
    resources::{
        FeatureIdAllocator, GenerationTuning, IdeologyRegistry, StorykeeperRoster, WorldGrid,
        WorldTechLevel,
    },
    session::PresetSession,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

impl RestoreError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        RestoreError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        RestoreError::Invalid {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<PlacementError> for RestoreError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::NotAFaction(_) => RestoreError::invalid("faction", err.to_string()),
            PlacementError::NoGrid | PlacementError::TileOutOfRange { .. } => {
                RestoreError::invalid("tile", err.to_string())
            }
        }
    }
}

/// Where restore loads the ideology files a preset refers to.
pub trait IdeologySource {
    fn load_ideology(&self, preset: &str, file_name: &str) -> Result<IdeologyFile, RestoreError>;
}

/// Source for callers with no ideology files at hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIdeologies;

impl IdeologySource for NoIdeologies {
    fn load_ideology(&self, _preset: &str, file_name: &str) -> Result<IdeologyFile, RestoreError> {
        Err(RestoreError::not_found("ideology file", file_name))
    }
}

/// Ideologies held in memory, keyed by file name.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdeologies(HashMap<String, IdeologyFile>);

impl InMemoryIdeologies {
    pub fn insert(&mut self, named: NamedIdeology) {
        self.0.insert(named.file_name, named.ideology);
    }
}

impl FromIterator<NamedIdeology> for InMemoryIdeologies {
    fn from_iter<I: IntoIterator<Item = NamedIdeology>>(iter: I) -> Self {
        let mut source = Self::default();
        for named in iter {
            source.insert(named);
        }
        source
    }
}

impl IdeologySource for InMemoryIdeologies {
    fn load_ideology(&self, _preset: &str, file_name: &str) -> Result<IdeologyFile, RestoreError> {
        self.0
            .get(file_name)
            .cloned()
            .ok_or_else(|| RestoreError::not_found("ideology file", file_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreDiagnostic {
    pub section: InclusionFlags,
    pub error: RestoreError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Sections that were applied, fully or with skipped records.
    pub applied: InclusionFlags,
    pub diagnostics: Vec<RestoreDiagnostic>,
    pub settlements_spawned: usize,
    pub markers_spawned: usize,
    pub features_spawned: usize,
    pub ideologies_registered: usize,
    pub ideologies_reused: usize,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics_for(&self, section: InclusionFlags) -> impl Iterator<Item = &RestoreDiagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diagnostic| diagnostic.section == section)
    }

    fn skip(&mut self, section: InclusionFlags, error: RestoreError) {
        tracing::warn!(
            target: "world_presets::restore",
            section = ?section,
            error = %error,
            "restore.record_skipped"
        );
        self.diagnostics.push(RestoreDiagnostic { section, error });
    }
}

/// Writes the preset's generation parameters into the world's tuning. Must
/// run before the generation pipeline.
pub fn apply_generation_parameters(world: &mut World, sections: &WorldSections) -> bool {
    if !sections.includes(InclusionFlags::GENERATION_PARAMETERS) {
        return false;
    }
    let Some(params) = &sections.generation_parameters else {
        return false;
    };
    if let Err(err) = params.validate() {
        tracing::warn!(
            target: "world_presets::restore",
            error = %err,
            "restore.generation_parameters=rejected"
        );
        return false;
    }
    world.insert_resource(GenerationTuning(params.clone()));
    tracing::debug!(
        target: "world_presets::restore",
        seed = %params.seed,
        subdivisions = params.subdivisions,
        "restore.generation_parameters=applied"
    );
    true
}

/// Applies `snapshot` once; `None` is a no-op.
pub fn restore_snapshot(
    world: &mut World,
    session: &mut PresetSession,
    snapshot: Option<&PresetSnapshot>,
    ideologies: &dyn IdeologySource,
) -> RestoreReport {
    let Some(snapshot) = snapshot else {
        tracing::debug!(target: "world_presets::restore", "restore.skipped=no_preset");
        return RestoreReport::default();
    };
    let report = restore_sections(world, session, &snapshot.sections, &snapshot.name, ideologies);
    session.mark_applied(&snapshot.name);
    report
}

pub fn restore_sections(
    world: &mut World,
    session: &mut PresetSession,
    sections: &WorldSections,
    preset: &str,
    ideologies: &dyn IdeologySource,
) -> RestoreReport {
    let flags = sections.flags;
    let mut report = RestoreReport::default();

    if flags.contains(InclusionFlags::TERRAIN)
        && restore_terrain(world, sections.terrain.as_ref(), &mut report)
    {
        report.applied |= InclusionFlags::TERRAIN;
    }
    if flags.contains(InclusionFlags::BASES) {
        restore_settlements(world, session, &sections.settlements, &mut report);
        report.applied |= InclusionFlags::BASES;
    }
    if flags.contains(InclusionFlags::MAP_MARKERS) {
        restore_markers(world, session, &sections.map_markers, &mut report);
        report.applied |= InclusionFlags::MAP_MARKERS;
    }
    if flags.contains(InclusionFlags::WORLD_FEATURES) {
        restore_labels(world, &sections.world_features, &mut report);
        report.applied |= InclusionFlags::WORLD_FEATURES;
    }
    if flags.intersects(InclusionFlags::FACTIONS | InclusionFlags::IDEOLOGIES) {
        restore_factions(world, session, sections, preset, ideologies, &mut report);
        report.applied |= flags & (InclusionFlags::FACTIONS | InclusionFlags::IDEOLOGIES);
    }
    if flags.contains(InclusionFlags::STORYKEEPER_ENTRIES) {
        world.insert_resource(StorykeeperRoster(sections.storykeeper.clone()));
        report.applied |= InclusionFlags::STORYKEEPER_ENTRIES;
    }
    if flags.contains(InclusionFlags::TECH_LEVEL) {
        if let Some(tech_level) = sections.tech_level {
            world.insert_resource(WorldTechLevel(tech_level));
            report.applied |= InclusionFlags::TECH_LEVEL;
        }
    }
    if flags.contains(InclusionFlags::GENERATION_PARAMETERS) {
        // Applied ahead of generation; only confirm it took.
        let live = world.get_resource::<GenerationTuning>().map(|tuning| &tuning.0);
        if live.is_some() && live == sections.generation_parameters.as_ref() {
            report.applied |= InclusionFlags::GENERATION_PARAMETERS;
        } else {
            tracing::debug!(
                target: "world_presets::restore",
                "restore.generation_parameters=not_pre_applied"
            );
        }
    }

    tracing::info!(
        target: "world_presets::restore",
        preset,
        applied = ?report.applied,
        settlements = report.settlements_spawned,
        markers = report.markers_spawned,
        features = report.features_spawned,
        diagnostics = report.diagnostics.len(),
        "restore.completed"
    );
    report
}

fn restore_terrain(
    world: &mut World,
    section: Option<&TerrainSection>,
    report: &mut RestoreReport,
) -> bool {
    let Some(section) = section else {
        return true;
    };
    let Some(live_count) = world.get_resource::<WorldGrid>().map(WorldGrid::tile_count) else {
        report.skip(
            InclusionFlags::TERRAIN,
            RestoreError::invalid("terrain", "world has no tile grid"),
        );
        return false;
    };

    if let Some(data) = &section.grid {
        if let Err(err) = data.validate() {
            report.skip(
                InclusionFlags::TERRAIN,
                RestoreError::invalid("terrain", err.to_string()),
            );
            return false;
        }
        if data.tile_count() != live_count {
            let mismatch = SchemaError::TileCountMismatch {
                expected: live_count,
                found: data.tile_count(),
            };
            report.skip(
                InclusionFlags::TERRAIN,
                RestoreError::invalid("terrain", mismatch.to_string()),
            );
            return false;
        }
        replace_grid(world, data);
    }

    if !section.pollution_overrides.is_empty() {
        let Some(mut grid) = world.get_resource_mut::<WorldGrid>() else {
            return false;
        };
        let mut skipped = Vec::new();
        for entry in &section.pollution_overrides {
            match grid.tiles_mut().pollution.get_mut(entry.tile as usize) {
                Some(pollution) => *pollution = entry.pollution,
                None => skipped.push(entry.tile),
            }
        }
        for tile in skipped {
            report.skip(
                InclusionFlags::TERRAIN,
                RestoreError::from(PlacementError::TileOutOfRange {
                    tile,
                    tile_count: live_count,
                }),
            );
        }
    }
    true
}

/// Swaps in the captured grid and rebuilds region features and the tile
/// back-references to them.
fn replace_grid(world: &mut World, data: &TerrainData) {
    for entity in entities_with::<WorldFeature>(world, |f| f.kind == FeatureKind::Region) {
        world.despawn(entity);
    }
    let labels: Vec<(u32, u32)> = world
        .iter_entities()
        .filter_map(|entity| entity.get::<WorldFeature>())
        .filter(|feature| feature.is_label())
        .map(|feature| (feature.id, feature.tile))
        .collect();

    let mut tiles = data.tiles.clone();
    let region_ids: HashSet<u32> = data.features.iter().map(|region| region.id).collect();
    let mut dangling = 0usize;
    let mut extent: HashMap<u32, (u32, usize)> = HashMap::new();
    for (tile, slot) in tiles.feature_ids.iter_mut().enumerate() {
        let Some(id) = *slot else {
            continue;
        };
        if region_ids.contains(&id) {
            extent.entry(id).or_insert((tile as u32, 0)).1 += 1;
        } else {
            *slot = None;
            dangling += 1;
        }
    }
    for (id, tile) in &labels {
        if let Some(slot) = tiles.feature_ids.get_mut(*tile as usize) {
            *slot = Some(*id);
        }
    }
    world.insert_resource(WorldGrid(tiles));

    let mut allocator = world
        .remove_resource::<FeatureIdAllocator>()
        .unwrap_or_default();
    for region in &data.features {
        let (tile, size) = extent.get(&region.id).copied().unwrap_or((0, 0));
        world.spawn(WorldFeature {
            id: region.id,
            label: region.label.clone(),
            kind: FeatureKind::Region,
            tile,
            max_draw_size: (size as f32).sqrt() * 2.0,
            rotation: 0.0,
        });
        allocator.advance_past(region.id);
    }
    for (id, _) in &labels {
        allocator.advance_past(*id);
    }
    world.insert_resource(allocator);

    tracing::debug!(
        target: "world_presets::restore",
        regions = data.features.len(),
        dangling,
        "restore.terrain=replaced"
    );
}

fn restore_settlements(
    world: &mut World,
    session: &mut PresetSession,
    records: &[SettlementRecord],
    report: &mut RestoreReport,
) {
    let factions: HashMap<String, (Entity, bool)> = world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .map(|(entity, faction)| (faction.def_name.clone(), (entity, faction.is_player)))
        .collect();
    let players: HashSet<Entity> = factions
        .values()
        .filter(|(_, is_player)| *is_player)
        .map(|(entity, _)| *entity)
        .collect();

    for entity in entities_with::<Settlement>(world, |s| !players.contains(&s.faction)) {
        world.despawn(entity);
    }

    let tile_count = world
        .get_resource::<WorldGrid>()
        .map_or(0, WorldGrid::tile_count);
    for record in records {
        if record.tile as usize >= tile_count {
            report.skip(
                InclusionFlags::BASES,
                PlacementError::TileOutOfRange {
                    tile: record.tile,
                    tile_count,
                }
                .into(),
            );
            continue;
        }
        let Some(&(faction, is_player)) = factions.get(&record.faction_def) else {
            report.skip(
                InclusionFlags::BASES,
                RestoreError::not_found("faction def", record.faction_def.clone()),
            );
            continue;
        };
        if is_player {
            report.skip(
                InclusionFlags::BASES,
                RestoreError::invalid(
                    "settlement",
                    format!(
                        "record at tile {} belongs to the player faction {}",
                        record.tile, record.faction_def
                    ),
                ),
            );
            continue;
        }
        let name = record
            .name
            .clone()
            .unwrap_or_else(|| format!("Settlement {}", record.tile));
        match spawn_settlement(world, faction, record.tile, name) {
            Ok(entity) => {
                if let Some(custom) = &record.custom {
                    session.set_settlement_custom(entity, custom.clone());
                }
                report.settlements_spawned += 1;
            }
            Err(err) => report.skip(InclusionFlags::BASES, err.into()),
        }
    }
}

fn restore_markers(
    world: &mut World,
    session: &mut PresetSession,
    records: &[MapMarkerRecord],
    report: &mut RestoreReport,
) {
    for entity in entities_with::<MapMarker>(world, |m| m.layer == MarkerLayer::Primary) {
        world.despawn(entity);
    }
    for record in records {
        match spawn_map_marker(world, record.tile, MarkerLayer::Primary) {
            Ok(entity) => {
                if let Some(custom) = &record.custom {
                    session.set_entity_custom(entity, custom.clone());
                }
                report.markers_spawned += 1;
            }
            Err(err) => report.skip(InclusionFlags::MAP_MARKERS, err.into()),
        }
    }
}

fn restore_labels(world: &mut World, records: &[WorldFeatureRecord], report: &mut RestoreReport) {
    for entity in entities_with::<WorldFeature>(world, WorldFeature::is_label) {
        despawn_feature(world, entity);
    }
    for record in records {
        if record.label.trim().is_empty() {
            report.skip(
                InclusionFlags::WORLD_FEATURES,
                RestoreError::invalid("feature", format!("empty label at tile {}", record.tile)),
            );
            continue;
        }
        match spawn_label_feature(
            world,
            record.tile,
            record.label.clone(),
            record.max_draw_size,
            record.rotation,
        ) {
            Ok(_) => report.features_spawned += 1,
            Err(err) => report.skip(InclusionFlags::WORLD_FEATURES, err.into()),
        }
    }
}

fn restore_factions(
    world: &mut World,
    session: &mut PresetSession,
    sections: &WorldSections,
    preset: &str,
    source: &dyn IdeologySource,
    report: &mut RestoreReport,
) {
    let flags = sections.flags;
    let factions: HashMap<String, Entity> = world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .map(|(entity, faction)| (faction.def_name.clone(), entity))
        .collect();

    if flags.contains(InclusionFlags::FACTIONS) {
        session.clear_faction_population();
        for (def_name, entry) in &sections.faction_overrides {
            let Some(&entity) = factions.get(def_name) else {
                report.skip(
                    InclusionFlags::FACTIONS,
                    RestoreError::not_found("faction def", def_name.clone()),
                );
                continue;
            };
            if let Some(mut faction) = world.get_mut::<Faction>(entity) {
                if let Some(name) = &entry.name {
                    faction.name = name.clone();
                }
                if let Some(description) = &entry.description {
                    faction.description = description.clone();
                }
                faction.icon = entry.icon.clone();
            }
            if let Some(population) = &entry.population {
                session.set_faction_population(entity, population.clone());
            }
        }
    }

    if !flags.contains(InclusionFlags::IDEOLOGIES) {
        return;
    }
    let mut wanted: BTreeMap<&str, &str> = sections
        .ideology_files
        .iter()
        .map(|reference| (reference.faction_def.as_str(), reference.file_name.as_str()))
        .collect();
    for (def_name, entry) in &sections.faction_overrides {
        if let Some(file_name) = &entry.ideology_file {
            wanted.insert(def_name.as_str(), file_name.as_str());
        }
    }

    // The section replaces the registry outright: only player ideologies and
    // the ones named here survive, so ids never depend on the base world.
    let previous = world
        .remove_resource::<IdeologyRegistry>()
        .unwrap_or_default();
    let mut registry = IdeologyRegistry::default();
    let mut ordered: Vec<(&String, Entity)> = factions
        .iter()
        .map(|(def_name, entity)| (def_name, *entity))
        .collect();
    ordered.sort();
    for (_, entity) in ordered {
        let Some(mut faction) = world.get_mut::<Faction>(entity) else {
            continue;
        };
        faction.primary_ideology = if faction.is_player {
            faction
                .primary_ideology
                .and_then(|id| previous.get(id))
                .map(|ideology| registry.register(ideology.clone()).0)
        } else {
            None
        };
    }

    for (def_name, file_name) in wanted {
        let Some(&entity) = factions.get(def_name) else {
            report.skip(
                InclusionFlags::IDEOLOGIES,
                RestoreError::not_found("faction def", def_name),
            );
            continue;
        };
        let ideology = match source.load_ideology(preset, file_name) {
            Ok(ideology) => ideology,
            Err(err) => {
                report.skip(InclusionFlags::IDEOLOGIES, err);
                continue;
            }
        };
        let (id, reused) = registry.register(ideology);
        if reused {
            report.ideologies_reused += 1;
        } else {
            report.ideologies_registered += 1;
        }
        if let Some(mut faction) = world.get_mut::<Faction>(entity) {
            faction.primary_ideology = Some(id);
        }
    }
    tracing::debug!(
        target: "world_presets::restore",
        dropped = previous.len().saturating_sub(registry.len()),
        kept = registry.len(),
        "restore.ideology_registry_rebuilt"
    );
    world.insert_resource(registry);
}
