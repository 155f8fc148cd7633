use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    flags::InclusionFlags,
    params::GenerationParameters,
    records::{
        FactionOverride, IdeologyFileRef, MapMarkerRecord, SettlementRecord, StorykeeperEntry,
        TechLevel, WorldFeatureRecord,
    },
    terrain::TerrainSection,
    SchemaError,
};

/// Flag-gated world sections shared by presets and ordinary save payloads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSections {
    pub flags: InclusionFlags,
    #[serde(default)]
    pub terrain: Option<TerrainSection>,
    #[serde(default)]
    pub settlements: Vec<SettlementRecord>,
    #[serde(default)]
    pub map_markers: Vec<MapMarkerRecord>,
    #[serde(default)]
    pub world_features: Vec<WorldFeatureRecord>,
    #[serde(default)]
    pub faction_overrides: BTreeMap<String, FactionOverride>,
    #[serde(default)]
    pub ideology_files: Vec<IdeologyFileRef>,
    #[serde(default)]
    pub storykeeper: Vec<StorykeeperEntry>,
    #[serde(default)]
    pub tech_level: Option<TechLevel>,
    #[serde(default)]
    pub generation_parameters: Option<GenerationParameters>,
}

impl WorldSections {
    pub fn empty(flags: InclusionFlags) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    #[inline]
    pub fn includes(&self, flag: InclusionFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Sections holding data while their flag is cleared.
    pub fn stale_sections(&self) -> InclusionFlags {
        let mut stale = InclusionFlags::empty();
        let flags = self.flags;
        if !flags.contains(InclusionFlags::TERRAIN)
            && self.terrain.as_ref().is_some_and(|t| !t.is_empty())
        {
            stale |= InclusionFlags::TERRAIN;
        }
        if !flags.contains(InclusionFlags::BASES) && !self.settlements.is_empty() {
            stale |= InclusionFlags::BASES;
        }
        if !flags.contains(InclusionFlags::MAP_MARKERS) && !self.map_markers.is_empty() {
            stale |= InclusionFlags::MAP_MARKERS;
        }
        if !flags.contains(InclusionFlags::WORLD_FEATURES) && !self.world_features.is_empty() {
            stale |= InclusionFlags::WORLD_FEATURES;
        }
        if !flags.contains(InclusionFlags::FACTIONS)
            && self.faction_overrides.values().any(|o| {
                o.name.is_some() || o.description.is_some() || o.icon.is_some() || o.population.is_some()
            })
        {
            stale |= InclusionFlags::FACTIONS;
        }
        if !flags.contains(InclusionFlags::IDEOLOGIES)
            && (!self.ideology_files.is_empty()
                || self
                    .faction_overrides
                    .values()
                    .any(|o| o.ideology_file.is_some()))
        {
            stale |= InclusionFlags::IDEOLOGIES;
        }
        if !flags.contains(InclusionFlags::STORYKEEPER_ENTRIES) && !self.storykeeper.is_empty() {
            stale |= InclusionFlags::STORYKEEPER_ENTRIES;
        }
        if !flags.contains(InclusionFlags::TECH_LEVEL) && self.tech_level.is_some() {
            stale |= InclusionFlags::TECH_LEVEL;
        }
        if !flags.contains(InclusionFlags::GENERATION_PARAMETERS)
            && self.generation_parameters.is_some()
        {
            stale |= InclusionFlags::GENERATION_PARAMETERS;
        }
        stale
    }

    /// Drops data belonging to cleared flags. Returns the sections that were
    /// stale.
    pub fn prune(&mut self) -> InclusionFlags {
        let stale = self.stale_sections();
        if stale.contains(InclusionFlags::TERRAIN) {
            self.terrain = None;
        }
        if stale.contains(InclusionFlags::BASES) {
            self.settlements.clear();
        }
        if stale.contains(InclusionFlags::MAP_MARKERS) {
            self.map_markers.clear();
        }
        if stale.contains(InclusionFlags::WORLD_FEATURES) {
            self.world_features.clear();
        }
        if stale.contains(InclusionFlags::FACTIONS) {
            for entry in self.faction_overrides.values_mut() {
                entry.name = None;
                entry.description = None;
                entry.icon = None;
                entry.population = None;
            }
        }
        if stale.contains(InclusionFlags::IDEOLOGIES) {
            self.ideology_files.clear();
            for entry in self.faction_overrides.values_mut() {
                entry.ideology_file = None;
            }
        }
        self.faction_overrides.retain(|_, entry| !entry.is_empty());
        if stale.contains(InclusionFlags::STORYKEEPER_ENTRIES) {
            self.storykeeper.clear();
        }
        if stale.contains(InclusionFlags::TECH_LEVEL) {
            self.tech_level = None;
        }
        if stale.contains(InclusionFlags::GENERATION_PARAMETERS) {
            self.generation_parameters = None;
        }
        stale
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let stale = self.stale_sections();
        if !stale.is_empty() {
            return Err(SchemaError::invalid(
                "flags",
                format!("sections {stale:?} carry data while their flags are cleared"),
            ));
        }
        if let Some(record) = self
            .settlements
            .iter()
            .find(|r| r.faction_def.trim().is_empty())
        {
            return Err(SchemaError::invalid(
                "settlements.faction_def",
                format!("settlement at tile {} names no faction", record.tile),
            ));
        }
        if let Some(record) = self
            .world_features
            .iter()
            .find(|r| r.label.trim().is_empty())
        {
            return Err(SchemaError::invalid(
                "world_features.label",
                format!("feature at tile {} has an empty label", record.tile),
            ));
        }
        if let Some(grid) = self.terrain.as_ref().and_then(|t| t.grid.as_ref()) {
            grid.validate()?;
        }
        if let Some(params) = &self.generation_parameters {
            params.validate()?;
        }
        Ok(())
    }
}

/// Named, reusable template persisted by the preset store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetSnapshot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sections: WorldSections,
}

impl PresetSnapshot {
    pub fn new(name: impl Into<String>, description: impl Into<String>, sections: WorldSections) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sections,
        }
    }

    pub fn flags(&self) -> InclusionFlags {
        self.sections.flags
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::invalid("name", "must not be empty"));
        }
        self.sections.validate()
    }
}

/// Per-save payload. Shares [`WorldSections`] with presets but never carries
/// preset-only data: no name, no description, no ideology files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionPayload {
    sections: WorldSections,
    #[serde(default)]
    source_preset: Option<String>,
}

impl SessionPayload {
    pub fn new(mut sections: WorldSections, source_preset: Option<String>) -> Self {
        sections.flags.remove(InclusionFlags::IDEOLOGIES);
        sections.prune();
        Self {
            sections,
            source_preset,
        }
    }

    pub fn sections(&self) -> &WorldSections {
        &self.sections
    }

    /// Preset the session was created from, if any. Informational only.
    pub fn source_preset(&self) -> Option<&str> {
        self.source_preset.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FactionOverride, SettlementRecord, TechLevel};

    fn settlement(tile: u32) -> SettlementRecord {
        SettlementRecord {
            tile,
            name: Some("Oakhaven".to_string()),
            faction_def: "OutlanderCivil".to_string(),
            custom: None,
        }
    }

    #[test]
    fn cleared_flag_with_data_is_stale() {
        let mut sections = WorldSections::empty(InclusionFlags::TECH_LEVEL);
        sections.settlements.push(settlement(4));
        sections.tech_level = Some(TechLevel::Medieval);
        assert_eq!(sections.stale_sections(), InclusionFlags::BASES);
        assert!(sections.validate().is_err());

        let pruned = sections.prune();
        assert_eq!(pruned, InclusionFlags::BASES);
        assert!(sections.settlements.is_empty());
        assert_eq!(sections.tech_level, Some(TechLevel::Medieval));
        assert!(sections.validate().is_ok());
    }

    #[test]
    fn ideology_refs_are_gated_separately_from_faction_overrides() {
        let mut sections = WorldSections::empty(InclusionFlags::FACTIONS);
        sections.faction_overrides.insert(
            "OutlanderCivil".to_string(),
            FactionOverride {
                name: Some("Free Reach".to_string()),
                ideology_file: Some("sunward.json".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(sections.stale_sections(), InclusionFlags::IDEOLOGIES);
        sections.prune();
        let entry = &sections.faction_overrides["OutlanderCivil"];
        assert_eq!(entry.name.as_deref(), Some("Free Reach"));
        assert!(entry.ideology_file.is_none());
    }

    #[test]
    fn session_payload_drops_ideologies() {
        let mut sections = WorldSections::empty(InclusionFlags::all());
        sections.ideology_files.push(crate::IdeologyFileRef {
            faction_def: "OutlanderCivil".to_string(),
            file_name: "sunward.json".to_string(),
        });
        let payload = SessionPayload::new(sections, Some("Archipelago".to_string()));
        assert!(!payload.sections().includes(InclusionFlags::IDEOLOGIES));
        assert!(payload.sections().ideology_files.is_empty());
        assert_eq!(payload.source_preset(), Some("Archipelago"));
    }

    #[test]
    fn terrain_grid_is_validated_with_the_sections() {
        let mut tiles = crate::TileArrays::new(crate::GridDimensions::from_subdivisions(1));
        tiles.dimensions = crate::GridDimensions {
            width: 65536,
            height: 65536,
        };
        let mut sections = WorldSections::empty(InclusionFlags::TERRAIN);
        sections.terrain = Some(crate::TerrainSection::full(crate::TerrainData {
            tiles,
            features: Vec::new(),
        }));
        let err = sections.validate().expect_err("impossible grid size");
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn preset_requires_name() {
        let snapshot = PresetSnapshot::new("  ", "", WorldSections::default());
        assert!(snapshot.validate().is_err());
    }
}
