use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use preset_schema::GenerationParameters;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_PRESET_CONFIG: &str = include_str!("data/preset_config.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FactionDef {
    pub def_name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub player: bool,
    /// Settlements generated for this faction. The player always gets one.
    #[serde(default)]
    pub settlements: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    presets_dir: PathBuf,
    preview_debounce_frames: u32,
    render_retry_limit: u32,
    shutdown_grace_ms: u64,
    default_generation: GenerationParameters,
    faction_defs: Vec<FactionDef>,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            presets_dir: PathBuf::from("presets"),
            preview_debounce_frames: 12,
            render_retry_limit: 2,
            shutdown_grace_ms: 250,
            default_generation: GenerationParameters::default(),
            faction_defs: Vec::new(),
        }
    }
}

impl PresetConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_PRESET_CONFIG)
                .expect("builtin preset config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, PresetConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| PresetConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = PresetConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn presets_dir(&self) -> &Path {
        &self.presets_dir
    }

    pub fn with_presets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.presets_dir = dir.into();
        self
    }

    pub fn preview_debounce_frames(&self) -> u32 {
        self.preview_debounce_frames
    }

    pub fn render_retry_limit(&self) -> u32 {
        self.render_retry_limit
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn default_generation(&self) -> &GenerationParameters {
        &self.default_generation
    }

    pub fn faction_defs(&self) -> &[FactionDef] {
        &self.faction_defs
    }

    pub fn with_faction_defs(mut self, defs: Vec<FactionDef>) -> Self {
        self.faction_defs = defs;
        self
    }
}

#[derive(Debug, Error)]
pub enum PresetConfigError {
    #[error("failed to parse preset config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read preset config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PresetConfigMetadata {
    path: Option<PathBuf>,
}

impl PresetConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Loads the config named by `WORLD_PRESET_CONFIG_PATH`, falling back to the
/// builtin copy. `PRESETS_DIR` overrides the presets directory either way.
pub fn load_preset_config_from_env() -> (Arc<PresetConfig>, PresetConfigMetadata) {
    let override_path = env::var("WORLD_PRESET_CONFIG_PATH")
        .ok()
        .map(PathBuf::from);
    let presets_dir = env::var("PRESETS_DIR").ok().map(PathBuf::from);

    let (config, metadata) = match override_path {
        Some(path) => match PresetConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "world_presets::config",
                    path = %path.display(),
                    "preset_config.loaded=file"
                );
                (config, PresetConfigMetadata::new(Some(path)))
            }
            Err(err) => {
                tracing::warn!(
                    target: "world_presets::config",
                    path = %path.display(),
                    error = %err,
                    "preset_config.load_failed"
                );
                builtin_with_log()
            }
        },
        None => builtin_with_log(),
    };

    let config = match presets_dir {
        Some(dir) => {
            tracing::debug!(
                target: "world_presets::config",
                dir = %dir.display(),
                "preset_config.presets_dir=env"
            );
            config.with_presets_dir(dir)
        }
        None => config,
    };
    (Arc::new(config), metadata)
}

fn builtin_with_log() -> (PresetConfig, PresetConfigMetadata) {
    tracing::info!(
        target: "world_presets::config",
        "preset_config.loaded=builtin"
    );
    (
        PresetConfig::builtin().as_ref().clone(),
        PresetConfigMetadata::new(None),
    )
}
