mod common;

use std::fs;

use bevy::prelude::*;
use preset_schema::{IdeologyFile, InclusionFlags};
use tempfile::tempdir;

use world_core::components::Faction;
use world_core::resources::IdeologyRegistry;
use world_core::{
    capture_preset, referenced_ideologies, BiomeRenderer, CaptureOptions, PresetSession,
    PresetStore, PresetStoreError, PreviewRenderer,
};

use common::{faction_by_def, generate, generator, params};

#[test]
fn captured_world_is_stored_listed_and_applied() {
    let dir = tempdir().expect("tempdir");
    let mut store = PresetStore::new(dir.path());

    let source = generate("stored");
    let session = PresetSession::new();
    let snapshot = capture_preset(
        &source,
        &session,
        "Stored",
        "ideologies and all",
        &CaptureOptions::default(),
    );
    let ideologies = referenced_ideologies(&source, &snapshot.sections);
    assert!(!ideologies.is_empty());
    let thumbnail = BiomeRenderer::default()
        .render(&source)
        .encode_png()
        .expect("thumbnail encodes");
    store
        .save(&snapshot, Some(&thumbnail), Some(&thumbnail), &ideologies)
        .expect("saves");

    let listed = store.list();
    assert_eq!(listed.len(), 1);
    let metadata = &listed[0];
    assert_eq!(metadata.name, "Stored");
    assert_eq!(metadata.flags, InclusionFlags::all());
    assert!(metadata.has_thumbnail);
    assert!(metadata.has_flavor_image);
    assert_eq!(metadata.ideology_count, ideologies.len());

    let raw = fs::read_to_string(dir.path().join("Stored").join("preset.json")).expect("on disk");
    let document: serde_json::Value = serde_json::from_str(&raw).expect("plain json");
    assert_eq!(document["name"], "Stored");
    assert!(document["sections"]["terrain"]["grid"].is_object());

    let mut target_session = PresetSession::new();
    target_session.set_pending_preset(store.resolve_selection(Some("Stored")));
    let generated = generator()
        .generate(params("elsewhere"), &mut target_session, &store)
        .expect("generates");
    let report = generated.report.expect("applied");
    assert!(report.is_clean(), "{:?}", report.diagnostics);
    assert!(report.ideologies_reused + report.ideologies_registered > 0);

    let mut target = generated.world;
    let tribe = faction_by_def(&mut target, "TribeCivil");
    assert!(target
        .get::<Faction>(tribe)
        .is_some_and(|faction| faction.primary_ideology.is_some()));
    assert_eq!(target_session.applied_preset(), Some("Stored"));
}

#[test]
fn corrupt_and_deleted_presets_fall_back_to_defaults() {
    let dir = tempdir().expect("tempdir");
    let mut store = PresetStore::new(dir.path());
    let source = generate("fallback");
    let snapshot = capture_preset(
        &source,
        &PresetSession::new(),
        "Doomed",
        "",
        &CaptureOptions::new(InclusionFlags::BASES),
    );
    store.save(&snapshot, None, None, &[]).expect("saves");
    store.delete("Doomed").expect("deletes");
    assert!(store.resolve_selection(Some("Doomed")).is_none());
    assert!(matches!(
        store.get("Doomed"),
        Err(PresetStoreError::NotFound(_))
    ));

    fs::create_dir_all(dir.path().join("Garbled")).expect("mkdir");
    fs::write(dir.path().join("Garbled").join("preset.json"), b"[1, 2").expect("write");
    assert!(store.resolve_selection(Some("Garbled")).is_none());
    assert!(store.list().is_empty());

    let mut session = PresetSession::new();
    session.set_pending_preset(store.resolve_selection(Some("Garbled")));
    let generated = generator()
        .generate(params("fallback"), &mut session, &store)
        .expect("generates");
    assert!(generated.report.is_none());
}

fn ideology_of(world: &mut World, def_name: &str) -> Option<IdeologyFile> {
    let faction = faction_by_def(world, def_name);
    let id = world.get::<Faction>(faction)?.primary_ideology?;
    world.resource::<IdeologyRegistry>().get(id).cloned()
}

#[test]
fn same_named_ideologies_survive_the_store_separately() {
    let dir = tempdir().expect("tempdir");
    let mut store = PresetStore::new(dir.path());

    let mut source = generate("tidal");
    let creed = |culture: &str, memes: [&str; 2]| IdeologyFile {
        name: "Tidal Creed".to_string(),
        culture: culture.to_string(),
        memes: memes.iter().map(|m| m.to_string()).collect(),
        description: None,
        precepts: Vec::new(),
    };
    for (def_name, ideology) in [
        ("Empire", creed("Rustican", ["Collectivist", "Rancher"])),
        ("PirateBand", creed("Kriminul", ["HumanPrimacy", "Raider"])),
    ] {
        let (id, _) = source.resource_mut::<IdeologyRegistry>().register(ideology);
        let faction = faction_by_def(&mut source, def_name);
        source.get_mut::<Faction>(faction).expect("faction").primary_ideology = Some(id);
    }

    let snapshot = capture_preset(
        &source,
        &PresetSession::new(),
        "Tides",
        "",
        &CaptureOptions::new(InclusionFlags::IDEOLOGIES),
    );
    let ideologies = referenced_ideologies(&source, &snapshot.sections);
    let metadata = store
        .save(&snapshot, None, None, &ideologies)
        .expect("saves");
    assert_eq!(metadata.ideology_count, ideologies.len());

    let mut session = PresetSession::new();
    session.set_pending_preset(store.resolve_selection(Some("Tides")));
    let generated = generator()
        .generate(params("other-tides"), &mut session, &store)
        .expect("generates");
    let report = generated.report.expect("applied");
    assert!(report.is_clean(), "{:?}", report.diagnostics);

    let mut target = generated.world;
    for def_name in ["Empire", "PirateBand", "TribeCivil"] {
        assert_eq!(
            ideology_of(&mut target, def_name),
            ideology_of(&mut source, def_name),
            "{def_name}"
        );
    }
}

#[test]
fn preset_with_impossible_grid_size_is_treated_as_corrupt() {
    let dir = tempdir().expect("tempdir");
    let store = PresetStore::new(dir.path());
    let snapshot = capture_preset(
        &generate("giant"),
        &PresetSession::new(),
        "Giant",
        "",
        &CaptureOptions::new(InclusionFlags::TERRAIN),
    );
    let mut document = serde_json::to_value(&snapshot).expect("encodes");
    document["sections"]["terrain"]["grid"]["tiles"]["dimensions"] =
        serde_json::json!({ "width": 65536, "height": 65536 });
    fs::create_dir_all(dir.path().join("Giant")).expect("mkdir");
    fs::write(
        dir.path().join("Giant").join("preset.json"),
        serde_json::to_string(&document).expect("json"),
    )
    .expect("write");

    assert!(matches!(
        store.get("Giant"),
        Err(PresetStoreError::Invalid { .. })
    ));
    let mut session = PresetSession::new();
    session.set_pending_preset(store.resolve_selection(Some("Giant")));
    assert!(session.pending_preset().is_none());
    let generated = generator()
        .generate(params("giant"), &mut session, &store)
        .expect("generates");
    assert!(generated.report.is_none());
}
