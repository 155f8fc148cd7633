//! Live world model and the preset engine built on it.
//!
//! A world is a bevy [`World`](bevy::prelude::World) produced by the
//! [`GenerationPipeline`]. Presets are captured from a live world with
//! [`capture_preset`], stored through [`PresetStore`], and applied exactly
//! once to a freshly generated world by [`WorldGenerator::generate`].
//! [`PreviewController`] renders candidate parameters on a worker thread.

mod capture;
pub mod components;
pub mod config;
mod generation;
pub mod hashing;
mod heightfield;
mod hydrology;
pub mod placement;
mod populate;
mod preview;
mod reaper;
mod render;
pub mod resources;
mod restore;
mod session;
mod store;
mod worldgen;

pub use capture::{
    capture_preset, capture_sections, capture_session_payload, referenced_ideologies,
    CaptureOptions, TerrainCaptureMode,
};
pub use config::{load_preset_config_from_env, FactionDef, PresetConfig, PresetConfigError};
pub use generation::{GenerationError, GenerationPipeline, GenerationStepKind, PipelineRun};
pub use preview::{CancellationToken, PreviewController, PreviewPoll, PreviewState, WorkerOutcome};
pub use reaper::{reap_orphans, ReapReport};
pub use render::{BiomeRenderer, PreviewBitmap, PreviewError, PreviewRenderer};
pub use restore::{
    apply_generation_parameters, restore_sections, restore_snapshot, IdeologySource,
    InMemoryIdeologies, NoIdeologies, RestoreDiagnostic, RestoreError, RestoreReport,
};
pub use session::{PersistedSideTables, PresetSession, SaveBundle, SessionError, SideTables};
pub use store::{validate_preset_name, PresetMetadata, PresetStore, PresetStoreError, RESERVED_NAME};
pub use worldgen::{GeneratedWorld, WorldGenerator};
