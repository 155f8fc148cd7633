use serde::{Deserialize, Serialize};

/// Player-facing customisation attached to a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettlementCustomData {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<[u8; 3]>,
}

/// Customisation attached to any other world object (markers).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkerCustomData {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactionPopulationData {
    pub population: u32,
    #[serde(default)]
    pub leader_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub tile: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub faction_def: String,
    #[serde(default)]
    pub custom: Option<SettlementCustomData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MarkerLayer {
    #[default]
    Primary,
    Orbit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMarkerRecord {
    pub tile: u32,
    #[serde(default)]
    pub custom: Option<MarkerCustomData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldFeatureRecord {
    pub tile: u32,
    pub label: String,
    #[serde(default = "default_draw_size")]
    pub max_draw_size: f32,
    #[serde(default)]
    pub rotation: f32,
}

fn default_draw_size() -> f32 {
    12.0
}

/// Overrides applied to a faction, keyed by faction definition name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactionOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub population: Option<FactionPopulationData>,
    /// File under the preset's `ideologies/` folder carrying this faction's
    /// primary ideology.
    #[serde(default)]
    pub ideology_file: Option<String>,
}

impl FactionOverride {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.icon.is_none()
            && self.population.is_none()
            && self.ideology_file.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeologyFileRef {
    pub faction_def: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorykeeperEntry {
    pub def_name: String,
    pub difficulty: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum TechLevel {
    Animal,
    Neolithic,
    Medieval,
    #[default]
    Industrial,
    Spacer,
    Ultra,
    Archotech,
}
