use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Sections a snapshot carries. A cleared flag means the matching section
    /// is empty, never stale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InclusionFlags: u32 {
        const TERRAIN = 1 << 0;
        const BASES = 1 << 1;
        const MAP_MARKERS = 1 << 2;
        const WORLD_FEATURES = 1 << 3;
        const FACTIONS = 1 << 4;
        const IDEOLOGIES = 1 << 5;
        const STORYKEEPER_ENTRIES = 1 << 6;
        const TECH_LEVEL = 1 << 7;
        const GENERATION_PARAMETERS = 1 << 8;
    }
}

impl InclusionFlags {
    /// Sections that travel with an ordinary save. Ideology files live in a
    /// preset folder, so they never ride along with a save.
    pub fn session_default() -> Self {
        Self::all() - Self::IDEOLOGIES
    }

    /// Parses a comma separated list of section names (`terrain,bases`).
    pub fn from_names(names: &str) -> Option<Self> {
        let mut flags = Self::empty();
        for raw in names.split(',') {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let flag = match name.to_ascii_lowercase().as_str() {
                "all" => Self::all(),
                "terrain" => Self::TERRAIN,
                "bases" | "settlements" => Self::BASES,
                "markers" | "map_markers" => Self::MAP_MARKERS,
                "features" | "world_features" => Self::WORLD_FEATURES,
                "factions" => Self::FACTIONS,
                "ideologies" => Self::IDEOLOGIES,
                "storykeeper" | "storykeeper_entries" => Self::STORYKEEPER_ENTRIES,
                "tech" | "tech_level" => Self::TECH_LEVEL,
                "generation" | "generation_parameters" => Self::GENERATION_PARAMETERS,
                _ => return None,
            };
            flags |= flag;
        }
        Some(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_default_excludes_ideologies() {
        let flags = InclusionFlags::session_default();
        assert!(!flags.contains(InclusionFlags::IDEOLOGIES));
        assert!(flags.contains(InclusionFlags::TERRAIN | InclusionFlags::BASES));
    }

    #[test]
    fn parses_section_names() {
        let flags = InclusionFlags::from_names("terrain, bases,markers").expect("known names");
        assert_eq!(
            flags,
            InclusionFlags::TERRAIN | InclusionFlags::BASES | InclusionFlags::MAP_MARKERS
        );
        assert!(InclusionFlags::from_names("terrain,weather").is_none());
        assert_eq!(InclusionFlags::from_names("all"), Some(InclusionFlags::all()));
    }
}
