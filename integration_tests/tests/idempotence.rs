mod common;

use preset_schema::{InclusionFlags, MarkerLayer, StorykeeperEntry, TechLevel};

use world_core::placement::{spawn_label_feature, spawn_map_marker};
use world_core::resources::{
    IdeologyId, IdeologyRegistry, StorykeeperRoster, WorldGrid, WorldTechLevel,
};
use world_core::{
    capture_preset, capture_sections, referenced_ideologies, restore_snapshot, CaptureOptions,
    InMemoryIdeologies, PresetSession,
};

use common::{free_land_tiles, generate, settlement_sites};

fn restorable_flags() -> InclusionFlags {
    InclusionFlags::TERRAIN
        | InclusionFlags::BASES
        | InclusionFlags::MAP_MARKERS
        | InclusionFlags::WORLD_FEATURES
        | InclusionFlags::FACTIONS
        | InclusionFlags::IDEOLOGIES
        | InclusionFlags::STORYKEEPER_ENTRIES
        | InclusionFlags::TECH_LEVEL
}

#[test]
fn same_preset_yields_same_state_in_different_worlds() {
    let mut source = generate("idempotence-source");
    let tiles = free_land_tiles(&mut source, 2);
    spawn_map_marker(&mut source, tiles[0], MarkerLayer::Primary).expect("marker");
    spawn_label_feature(&mut source, tiles[1], "Glass Coast", 8.0, 0.0).expect("label");
    source.insert_resource(StorykeeperRoster(vec![StorykeeperEntry {
        def_name: "Cassandra".to_string(),
        difficulty: "Rough".to_string(),
    }]));
    source.insert_resource(WorldTechLevel(TechLevel::Spacer));

    let source_session = PresetSession::new();
    let options = CaptureOptions::new(restorable_flags());
    let snapshot = capture_preset(&source, &source_session, "Glass", "", &options);
    let ideologies: InMemoryIdeologies = referenced_ideologies(&source, &snapshot.sections)
        .into_iter()
        .collect();

    let mut captures = Vec::new();
    let mut registries = Vec::new();
    for seed in ["idempotence-a", "idempotence-b"] {
        let mut world = generate(seed);
        let mut session = PresetSession::new();
        let report = restore_snapshot(&mut world, &mut session, Some(&snapshot), &ideologies);
        assert!(report.is_clean(), "{seed}: {:?}", report.diagnostics);
        assert_eq!(report.applied, restorable_flags());
        assert_eq!(
            world.resource::<WorldTechLevel>().0,
            TechLevel::Spacer,
            "{seed}"
        );
        let registry = world.resource::<IdeologyRegistry>();
        registries.push(
            (0..registry.len() as u32)
                .filter_map(|id| registry.get(IdeologyId(id)).cloned())
                .collect::<Vec<_>>(),
        );
        captures.push(capture_sections(&world, &session, &options));
    }
    assert_eq!(registries[0], registries[1]);
    assert_eq!(captures[0], captures[1]);
    assert_eq!(captures[0], snapshot.sections);
}

#[test]
fn restoring_twice_equals_restoring_once() {
    let mut source = generate("twice-source");
    let tile = free_land_tiles(&mut source, 1)[0];
    spawn_label_feature(&mut source, tile, "Twin Peaks", 8.0, 0.0).expect("label");
    let session = PresetSession::new();
    let options = CaptureOptions::new(restorable_flags());
    let snapshot = capture_preset(&source, &session, "Twice", "", &options);
    let ideologies: InMemoryIdeologies = referenced_ideologies(&source, &snapshot.sections)
        .into_iter()
        .collect();

    let mut world = generate("twice-target");
    let mut target_session = PresetSession::new();
    restore_snapshot(&mut world, &mut target_session, Some(&snapshot), &ideologies);
    let once = capture_sections(&world, &target_session, &options);
    let sites_once = settlement_sites(&mut world);
    let registry_once = world.resource::<IdeologyRegistry>().len();
    restore_snapshot(&mut world, &mut target_session, Some(&snapshot), &ideologies);
    let twice = capture_sections(&world, &target_session, &options);

    assert_eq!(once, twice);
    assert_eq!(sites_once, settlement_sites(&mut world));
    assert_eq!(registry_once, world.resource::<IdeologyRegistry>().len());
    let slots = world
        .resource::<WorldGrid>()
        .tiles()
        .feature_ids
        .iter()
        .filter(|slot| slot.is_some())
        .count();
    assert!(slots > 0);
}

#[test]
fn missing_preset_is_a_no_op() {
    let mut world = generate("no-preset");
    let before = capture_sections(&world, &PresetSession::new(), &CaptureOptions::default());
    let mut session = PresetSession::new();
    let report = restore_snapshot(
        &mut world,
        &mut session,
        None,
        &InMemoryIdeologies::default(),
    );
    assert!(report.applied.is_empty());
    assert!(session.applied_preset().is_none());
    let after = capture_sections(&world, &PresetSession::new(), &CaptureOptions::default());
    assert_eq!(before, after);
}
