//! Named presets on disk, one folder per preset:
//!
//! ```text
//! <root>/<name>/preset.json
//! <root>/<name>/thumbnail.png
//! <root>/<name>/flavor.png
//! <root>/<name>/ideologies/<file>.json
//! ```

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use preset_schema::{
    decode_ideology_json, decode_preset_json, encode_ideology_json, encode_preset_json,
    validate_ideology_file_name, IdeologyFile, InclusionFlags, NamedIdeology, PresetSnapshot,
    SchemaError,
};
use thiserror::Error;

use crate::{
    config::PresetConfig,
    restore::{IdeologySource, RestoreError},
};

pub const PRESET_FILE: &str = "preset.json";
pub const THUMBNAIL_FILE: &str = "thumbnail.png";
pub const FLAVOR_FILE: &str = "flavor.png";
pub const IDEOLOGY_DIR: &str = "ideologies";
/// Stands for "no preset"; never stored.
pub const RESERVED_NAME: &str = "Default";

const STAGING_SUFFIX: &str = ".staging";

#[derive(Debug, Error)]
pub enum PresetStoreError {
    #[error("preset not found: {0}")]
    NotFound(String),
    #[error("invalid preset {name:?}: {reason}")]
    Invalid { name: String, reason: String },
    #[error("filesystem failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
}

impl PresetStoreError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        PresetStoreError::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| PresetStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn schema(name: &str, path: &Path, err: SchemaError) -> Self {
        match err {
            SchemaError::Decode(_) => PresetStoreError::Parse {
                path: path.to_path_buf(),
                source: err,
            },
            other => PresetStoreError::invalid(name, other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetMetadata {
    pub name: String,
    pub description: String,
    pub flags: InclusionFlags,
    pub has_thumbnail: bool,
    pub has_flavor_image: bool,
    pub ideology_count: usize,
}

/// Rejects names that cannot safely become a folder name.
pub fn validate_preset_name(name: &str) -> Result<(), PresetStoreError> {
    let reason = if name.trim().is_empty() {
        "name is empty"
    } else if name.trim().eq_ignore_ascii_case(RESERVED_NAME) {
        "name is reserved"
    } else if name.contains(['/', '\\']) {
        "name contains a path separator"
    } else if name.contains("..") {
        "name contains '..'"
    } else if name.starts_with('.') {
        "name starts with '.'"
    } else if name.chars().any(char::is_control) {
        "name contains control characters"
    } else {
        return Ok(());
    };
    Err(PresetStoreError::invalid(name, reason))
}

fn log_failure<T>(
    op: &'static str,
    name: &str,
    result: Result<T, PresetStoreError>,
) -> Result<T, PresetStoreError> {
    if let Err(err) = &result {
        tracing::warn!(
            target: "world_presets::store",
            op,
            preset = name,
            error = %err,
            "preset.store_failed"
        );
    }
    result
}

#[derive(Debug, Clone)]
pub struct PresetStore {
    root: PathBuf,
    cache: BTreeMap<String, PresetMetadata>,
}

impl PresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &PresetConfig) -> Self {
        Self::new(config.presets_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata from the last `list`, kept current by `save` and `delete`.
    pub fn cached(&self) -> impl Iterator<Item = &PresetMetadata> {
        self.cache.values()
    }

    fn preset_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Rescans the root. Unreadable presets are logged and left out.
    pub fn list(&mut self) -> Vec<PresetMetadata> {
        self.cache.clear();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                let _ = log_failure::<()>("list", "", Err(PresetStoreError::io(&self.root)(err)));
                return Vec::new();
            }
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !entry.path().is_dir() || validate_preset_name(name).is_err() {
                continue;
            }
            if let Ok(snapshot) = self.get(name) {
                let metadata = self.metadata_for(&snapshot);
                self.cache.insert(metadata.name.clone(), metadata);
            }
        }
        tracing::debug!(
            target: "world_presets::store",
            root = %self.root.display(),
            count = self.cache.len(),
            "preset.listed"
        );
        self.cache.values().cloned().collect()
    }

    fn metadata_for(&self, snapshot: &PresetSnapshot) -> PresetMetadata {
        let dir = self.preset_dir(&snapshot.name);
        let ideology_count = fs::read_dir(dir.join(IDEOLOGY_DIR))
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0);
        PresetMetadata {
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            flags: snapshot.flags(),
            has_thumbnail: dir.join(THUMBNAIL_FILE).is_file(),
            has_flavor_image: dir.join(FLAVOR_FILE).is_file(),
            ideology_count,
        }
    }

    pub fn get(&self, name: &str) -> Result<PresetSnapshot, PresetStoreError> {
        log_failure("get", name, self.read_snapshot(name))
    }

    fn read_snapshot(&self, name: &str) -> Result<PresetSnapshot, PresetStoreError> {
        validate_preset_name(name)?;
        let path = self.preset_dir(name).join(PRESET_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PresetStoreError::NotFound(name.to_string()));
            }
            Err(err) => return Err(PresetStoreError::io(&path)(err)),
        };
        let mut snapshot =
            decode_preset_json(&raw).map_err(|err| PresetStoreError::schema(name, &path, err))?;
        let pruned = snapshot.sections.prune();
        if !pruned.is_empty() {
            tracing::warn!(
                target: "world_presets::store",
                preset = name,
                pruned = ?pruned,
                "preset.stale_sections_pruned"
            );
        }
        // The folder is authoritative for the name.
        snapshot.name = name.to_string();
        snapshot
            .validate()
            .map_err(|err| PresetStoreError::invalid(name, err.to_string()))?;
        Ok(snapshot)
    }

    /// Writes the preset into a staging folder, then swaps it into place.
    /// Saving over an existing name replaces that preset entirely.
    pub fn save(
        &mut self,
        snapshot: &PresetSnapshot,
        thumbnail: Option<&[u8]>,
        flavor_image: Option<&[u8]>,
        ideologies: &[NamedIdeology],
    ) -> Result<PresetMetadata, PresetStoreError> {
        let result = self.write_preset(snapshot, thumbnail, flavor_image, ideologies);
        let metadata = log_failure("save", &snapshot.name, result)?;
        tracing::info!(
            target: "world_presets::store",
            preset = %metadata.name,
            flags = ?metadata.flags,
            ideologies = metadata.ideology_count,
            "preset.saved"
        );
        self.cache.insert(metadata.name.clone(), metadata.clone());
        Ok(metadata)
    }

    fn write_preset(
        &self,
        snapshot: &PresetSnapshot,
        thumbnail: Option<&[u8]>,
        flavor_image: Option<&[u8]>,
        ideologies: &[NamedIdeology],
    ) -> Result<PresetMetadata, PresetStoreError> {
        let name = snapshot.name.as_str();
        validate_preset_name(name)?;
        snapshot
            .validate()
            .map_err(|err| PresetStoreError::invalid(name, err.to_string()))?;
        for named in ideologies {
            validate_ideology_file_name(&named.file_name)
                .and_then(|()| named.ideology.validate())
                .map_err(|err| PresetStoreError::invalid(name, err.to_string()))?;
        }

        let staging = self.root.join(format!(".{name}{STAGING_SUFFIX}"));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(PresetStoreError::io(&staging))?;
        }
        let ideology_dir = staging.join(IDEOLOGY_DIR);
        fs::create_dir_all(&ideology_dir).map_err(PresetStoreError::io(&ideology_dir))?;

        let json = encode_preset_json(snapshot).map_err(|err| PresetStoreError::Parse {
            path: staging.join(PRESET_FILE),
            source: SchemaError::Decode(err),
        })?;
        write_file(&staging.join(PRESET_FILE), json.as_bytes())?;
        if let Some(bytes) = thumbnail {
            write_file(&staging.join(THUMBNAIL_FILE), bytes)?;
        }
        if let Some(bytes) = flavor_image {
            write_file(&staging.join(FLAVOR_FILE), bytes)?;
        }
        for named in ideologies {
            let path = ideology_dir.join(&named.file_name);
            let json = encode_ideology_json(&named.ideology).map_err(|err| PresetStoreError::Parse {
                path: path.clone(),
                source: SchemaError::Decode(err),
            })?;
            write_file(&path, json.as_bytes())?;
        }

        let target = self.preset_dir(name);
        if target.exists() {
            fs::remove_dir_all(&target).map_err(PresetStoreError::io(&target))?;
        }
        fs::rename(&staging, &target).map_err(PresetStoreError::io(&target))?;
        Ok(self.metadata_for(snapshot))
    }

    pub fn delete(&mut self, name: &str) -> Result<(), PresetStoreError> {
        let result = validate_preset_name(name).and_then(|()| {
            let dir = self.preset_dir(name);
            if !dir.is_dir() {
                return Err(PresetStoreError::NotFound(name.to_string()));
            }
            fs::remove_dir_all(&dir).map_err(PresetStoreError::io(&dir))
        });
        log_failure("delete", name, result)?;
        self.cache.remove(name);
        tracing::info!(target: "world_presets::store", preset = name, "preset.deleted");
        Ok(())
    }

    pub fn load_ideology(
        &self,
        preset: &str,
        file_name: &str,
    ) -> Result<IdeologyFile, PresetStoreError> {
        let result = validate_preset_name(preset).and_then(|()| {
            validate_ideology_file_name(file_name)
                .map_err(|err| PresetStoreError::invalid(preset, err.to_string()))?;
            let path = self.preset_dir(preset).join(IDEOLOGY_DIR).join(file_name);
            let raw = read_optional(&path)?
                .ok_or_else(|| PresetStoreError::NotFound(format!("{preset}/{file_name}")))?;
            let raw = String::from_utf8_lossy(&raw);
            decode_ideology_json(&raw).map_err(|err| PresetStoreError::schema(preset, &path, err))
        });
        log_failure("load_ideology", preset, result)
    }

    pub fn thumbnail(&self, name: &str) -> Result<Option<Vec<u8>>, PresetStoreError> {
        self.read_image(name, THUMBNAIL_FILE)
    }

    pub fn flavor_image(&self, name: &str) -> Result<Option<Vec<u8>>, PresetStoreError> {
        self.read_image(name, FLAVOR_FILE)
    }

    fn read_image(&self, name: &str, file: &str) -> Result<Option<Vec<u8>>, PresetStoreError> {
        let result = validate_preset_name(name).and_then(|()| {
            let dir = self.preset_dir(name);
            if !dir.is_dir() {
                return Err(PresetStoreError::NotFound(name.to_string()));
            }
            read_optional(&dir.join(file))
        });
        log_failure("read_image", name, result)
    }

    /// Resolves the preset picked for a new world. No selection, the
    /// reserved default, and unreadable presets all mean world defaults.
    pub fn resolve_selection(&self, name: Option<&str>) -> Option<PresetSnapshot> {
        let name = name.map(str::trim).filter(|name| !name.is_empty())?;
        if name.eq_ignore_ascii_case(RESERVED_NAME) {
            return None;
        }
        match self.get(name) {
            Ok(snapshot) => Some(snapshot),
            Err(_) => {
                tracing::info!(
                    target: "world_presets::store",
                    preset = name,
                    "preset.selection_fallback=defaults"
                );
                None
            }
        }
    }
}

impl IdeologySource for PresetStore {
    fn load_ideology(&self, preset: &str, file_name: &str) -> Result<IdeologyFile, RestoreError> {
        PresetStore::load_ideology(self, preset, file_name).map_err(|err| match err {
            PresetStoreError::NotFound(_) => RestoreError::not_found("ideology file", file_name),
            other => RestoreError::invalid("ideology file", other.to_string()),
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PresetStoreError> {
    fs::write(path, bytes).map_err(PresetStoreError::io(path))
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PresetStoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PresetStoreError::io(path)(err)),
    }
}
