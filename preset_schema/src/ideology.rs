use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Ideology as stored in a preset's `ideologies/` folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeologyFile {
    pub name: String,
    pub culture: String,
    pub memes: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub precepts: Vec<String>,
}

/// Content identity used to avoid loading the same ideology twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdeologyFingerprint(pub u64);

impl IdeologyFile {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::invalid("ideology.name", "must not be empty"));
        }
        if self.culture.trim().is_empty() {
            return Err(SchemaError::invalid("ideology.culture", "must not be empty"));
        }
        Ok(())
    }

    /// Name, culture and meme set; meme order does not matter.
    pub fn fingerprint(&self) -> IdeologyFingerprint {
        let mut memes: Vec<&str> = self.memes.iter().map(String::as_str).collect();
        memes.sort_unstable();
        memes.dedup();
        let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
        hasher.write(self.name.as_bytes());
        hasher.write_u8(0xff);
        hasher.write(self.culture.as_bytes());
        for meme in memes {
            hasher.write_u8(0xfe);
            hasher.write(meme.as_bytes());
        }
        IdeologyFingerprint(hasher.finish())
    }

    pub fn file_name(&self) -> String {
        ideology_file_name(&self.name)
    }
}

/// Ideology paired with the file it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedIdeology {
    pub file_name: String,
    pub ideology: IdeologyFile,
}

impl From<IdeologyFile> for NamedIdeology {
    fn from(ideology: IdeologyFile) -> Self {
        Self {
            file_name: ideology.file_name(),
            ideology,
        }
    }
}

/// Hands out one file name per distinct ideology. Ideologies sharing an
/// in-game name but not a fingerprint get numbered suffixes.
#[derive(Debug, Default, Clone)]
pub struct IdeologyFileNames {
    by_fingerprint: HashMap<IdeologyFingerprint, String>,
    taken: HashSet<String>,
}

impl IdeologyFileNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, ideology: &IdeologyFile) -> String {
        let fingerprint = ideology.fingerprint();
        if let Some(file_name) = self.by_fingerprint.get(&fingerprint) {
            return file_name.clone();
        }
        let base = ideology.file_name();
        let mut file_name = base.clone();
        let mut suffix = 2u32;
        while self.taken.contains(&file_name) {
            let stem = base.trim_end_matches(".json");
            file_name = format!("{stem}_{suffix}.json");
            suffix += 1;
        }
        self.taken.insert(file_name.clone());
        self.by_fingerprint.insert(fingerprint, file_name.clone());
        file_name
    }
}

/// Rejects names that would escape the `ideologies/` folder.
pub fn validate_ideology_file_name(file_name: &str) -> Result<(), SchemaError> {
    let stem = file_name.strip_suffix(".json").unwrap_or_default();
    if stem.is_empty()
        || file_name.contains(['/', '\\'])
        || file_name.contains("..")
        || file_name.chars().any(char::is_control)
    {
        return Err(SchemaError::invalid(
            "ideology.file_name",
            format!("{file_name:?} is not a plain .json file name"),
        ));
    }
    Ok(())
}

/// File name derived from an ideology's in-game name.
pub fn ideology_file_name(name: &str) -> String {
    let mut stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        stem.push_str("ideology");
    }
    format!("{stem}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ideology(memes: &[&str]) -> IdeologyFile {
        IdeologyFile {
            name: "Sunward Path".to_string(),
            culture: "Astropolitan".to_string(),
            memes: memes.iter().map(|m| m.to_string()).collect(),
            description: None,
            precepts: Vec::new(),
        }
    }

    #[test]
    fn fingerprint_ignores_meme_order_and_description() {
        let a = ideology(&["Transhumanist", "Collectivist"]);
        let mut b = ideology(&["Collectivist", "Transhumanist"]);
        b.description = Some("Different prose".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_culture() {
        let a = ideology(&["Collectivist"]);
        let mut b = ideology(&["Collectivist"]);
        b.culture = "Corunan".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn same_name_different_memes_gets_distinct_files() {
        let mut names = IdeologyFileNames::new();
        let tidal = ideology(&["Collectivist", "Rancher"]);
        let mut rival = ideology(&["HumanPrimacy", "Raider"]);
        rival.culture = "Kriminul".to_string();

        let first = names.assign(&tidal);
        let second = names.assign(&rival);
        assert_eq!(first, "sunward_path.json");
        assert_eq!(second, "sunward_path_2.json");
        assert_eq!(names.assign(&ideology(&["Rancher", "Collectivist"])), first);
        assert_eq!(names.assign(&rival), second);
    }

    #[test]
    fn file_names_must_stay_inside_the_folder() {
        assert!(validate_ideology_file_name("sunward_path_2.json").is_ok());
        for bad in ["", ".json", "../up.json", "a/b.json", "plain.txt"] {
            assert!(validate_ideology_file_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn file_name_is_sanitised() {
        assert_eq!(ideology_file_name("Sunward Path!"), "sunward_path_.json");
        assert_eq!(ideology_file_name("  "), "ideology.json");
    }
}
