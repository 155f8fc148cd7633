//! Portable preset format shared by the capture, restore and store layers.
//!
//! Nothing in this crate refers to runtime objects: tiles are indices, factions
//! are definition names, and every section can be serialised on its own.

mod flags;
mod ideology;
mod params;
mod records;
mod sections;
mod terrain;

use thiserror::Error;

pub use flags::InclusionFlags;
pub use ideology::{
    ideology_file_name, validate_ideology_file_name, IdeologyFile, IdeologyFileNames,
    IdeologyFingerprint, NamedIdeology,
};
pub use params::{GridDimensions, GenerationParameters, MAX_SUBDIVISIONS, MIN_SUBDIVISIONS};
pub use records::{
    FactionOverride, FactionPopulationData, IdeologyFileRef, MapMarkerRecord, MarkerCustomData,
    MarkerLayer, SettlementCustomData, SettlementRecord, StorykeeperEntry, TechLevel,
    WorldFeatureRecord,
};
pub use sections::{PresetSnapshot, SessionPayload, WorldSections};
pub use terrain::{
    Biome, Hilliness, PollutionOverride, RegionFeature, RiverKind, RoadKind, TerrainData,
    TerrainSection, TileArrays, TileLink, TileMutators,
};

/// Errors raised while validating or decoding preset payloads.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("tile count mismatch: expected {expected}, found {found}")]
    TileCountMismatch { expected: usize, found: usize },
    #[error("failed to decode preset payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SchemaError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

pub fn encode_preset_json(snapshot: &PresetSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

pub fn decode_preset_json(data: &str) -> Result<PresetSnapshot, SchemaError> {
    Ok(serde_json::from_str(data)?)
}

pub fn encode_session_payload_json(payload: &SessionPayload) -> serde_json::Result<String> {
    serde_json::to_string(payload)
}

pub fn decode_session_payload_json(data: &str) -> Result<SessionPayload, SchemaError> {
    Ok(serde_json::from_str(data)?)
}

pub fn encode_ideology_json(ideology: &IdeologyFile) -> serde_json::Result<String> {
    serde_json::to_string_pretty(ideology)
}

pub fn decode_ideology_json(data: &str) -> Result<IdeologyFile, SchemaError> {
    let ideology: IdeologyFile = serde_json::from_str(data)?;
    ideology.validate()?;
    Ok(ideology)
}
