mod common;

use bevy::prelude::*;
use preset_schema::{
    FactionPopulationData, InclusionFlags, MarkerCustomData, MarkerLayer, SettlementCustomData,
};
use tempfile::tempdir;

use world_core::components::Faction;
use world_core::placement::{spawn_label_feature, spawn_map_marker, spawn_settlement};
use world_core::resources::{GenerationTuning, WorldGrid};
use world_core::{
    capture_preset, capture_sections, referenced_ideologies, CaptureOptions, PresetSession,
    PresetStore,
};

use common::{
    faction_by_def, free_land_tiles, generate, generator, npc_settlements, params,
    primary_marker_tiles, settlement_sites,
};

/// Builds the source world: river density 1.4, exactly three NPC
/// settlements, two markers, one label, customised faction data.
fn authored_world(session: &mut PresetSession) -> World {
    let mut source_params = params("round-trip");
    source_params.river_density = 1.4;
    let mut world = generator()
        .generate_plain(source_params)
        .expect("source world");

    for entity in npc_settlements(&mut world) {
        world.despawn(entity);
    }
    let tribe = faction_by_def(&mut world, "TribeCivil");
    let raiders = faction_by_def(&mut world, "PirateBand");
    let tiles = free_land_tiles(&mut world, 6);

    let oakhaven = spawn_settlement(&mut world, tribe, tiles[0], "Oakhaven").expect("spawn");
    spawn_settlement(&mut world, tribe, tiles[1], "Millbrook").expect("spawn");
    spawn_settlement(&mut world, raiders, tiles[2], "Saltmarsh").expect("spawn");
    session.set_settlement_custom(
        oakhaven,
        SettlementCustomData {
            description: Some("Founded on the old ford".to_string()),
            icon: None,
            color: Some([200, 120, 40]),
        },
    );

    for (tile, label) in [(tiles[3], "Wreck"), (tiles[4], "Cache")] {
        let marker = spawn_map_marker(&mut world, tile, MarkerLayer::Primary).expect("marker");
        session.set_entity_custom(
            marker,
            MarkerCustomData {
                label: Some(label.to_string()),
                ..Default::default()
            },
        );
    }
    spawn_label_feature(&mut world, tiles[5], "Ashen Reach", 10.0, 0.25).expect("label");

    if let Some(mut faction) = world.get_mut::<Faction>(tribe) {
        faction.name = "Children of the Ford".to_string();
    }
    session.set_faction_population(
        tribe,
        FactionPopulationData {
            population: 640,
            leader_title: Some("Elder".to_string()),
        },
    );
    world
}

#[test]
fn captured_preset_rebuilds_the_world() {
    let dir = tempdir().expect("tempdir");
    let mut store = PresetStore::new(dir.path());
    let mut source_session = PresetSession::new();
    let mut source = authored_world(&mut source_session);

    let snapshot = capture_preset(
        &source,
        &source_session,
        "Fordlands",
        "three towns by the river",
        &CaptureOptions::default(),
    );
    assert_eq!(snapshot.sections.settlements.len(), 3);
    assert_eq!(snapshot.sections.map_markers.len(), 2);
    let ideologies = referenced_ideologies(&source, &snapshot.sections);
    store
        .save(&snapshot, None, None, &ideologies)
        .expect("preset saves");

    let mut session = PresetSession::new();
    session.set_pending_preset(store.resolve_selection(Some("Fordlands")));
    let generated = generator()
        .generate(params("someplace-else"), &mut session, &store)
        .expect("target world");
    let report = generated.report.expect("preset applied");
    assert!(report.is_clean(), "{:?}", report.diagnostics);
    let mut target = generated.world;

    assert_eq!(target.resource::<GenerationTuning>().0.river_density, 1.4);
    assert_eq!(settlement_sites(&mut target), settlement_sites(&mut source));
    assert_eq!(
        primary_marker_tiles(&mut target),
        primary_marker_tiles(&mut source)
    );
    assert_eq!(
        target.resource::<WorldGrid>().tiles().elevation,
        source.resource::<WorldGrid>().tiles().elevation
    );

    let tribe = faction_by_def(&mut target, "TribeCivil");
    assert_eq!(
        target.get::<Faction>(tribe).map(|f| f.name.as_str()),
        Some("Children of the Ford")
    );
    assert_eq!(
        session.faction_population(tribe).map(|p| p.population),
        Some(640)
    );

    let recaptured = capture_sections(&target, &session, &CaptureOptions::default());
    assert_eq!(recaptured, snapshot.sections);
}

#[test]
fn cleared_flags_capture_nothing_and_restore_nothing() {
    let mut session = PresetSession::new();
    let source = authored_world(&mut session);
    let sections = capture_sections(&source, &session, &CaptureOptions::new(InclusionFlags::BASES));
    assert!(sections.terrain.is_none());
    assert!(sections.map_markers.is_empty());
    assert!(sections.world_features.is_empty());
    assert!(sections.faction_overrides.is_empty());
    assert!(sections.generation_parameters.is_none());
    assert_eq!(sections.settlements.len(), 3);

    let mut target = generate("gated");
    let marker_tile = free_land_tiles(&mut target, 1)[0];
    spawn_map_marker(&mut target, marker_tile, MarkerLayer::Primary).expect("marker");
    let elevation = target.resource::<WorldGrid>().tiles().elevation.clone();

    let mut target_session = PresetSession::new();
    let report = world_core::restore_sections(
        &mut target,
        &mut target_session,
        &sections,
        "gated",
        &world_core::NoIdeologies,
    );
    assert_eq!(report.applied, InclusionFlags::BASES);
    assert_eq!(primary_marker_tiles(&mut target), vec![marker_tile]);
    assert_eq!(target.resource::<WorldGrid>().tiles().elevation, elevation);
    assert_eq!(npc_settlements(&mut target).len(), 3);
}
