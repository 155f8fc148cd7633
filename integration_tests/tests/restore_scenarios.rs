mod common;

use preset_schema::{
    GridDimensions, InclusionFlags, PresetSnapshot, SettlementRecord, WorldSections,
};

use world_core::resources::WorldGrid;
use world_core::{
    capture_sections, restore_snapshot, CaptureOptions, NoIdeologies, PresetSession,
    RestoreDiagnostic, RestoreError,
};

use common::{free_land_tiles, generate, generator, params, settlement_sites};

#[test]
fn unknown_faction_def_is_skipped_and_reported() {
    let mut world = generate("oakhaven");
    let tiles = free_land_tiles(&mut world, 2);

    let mut sections = WorldSections::empty(InclusionFlags::BASES);
    sections.settlements = vec![
        SettlementRecord {
            tile: 42,
            name: Some("Oakhaven".to_string()),
            faction_def: "OutlanderCivil".to_string(),
            custom: None,
        },
        SettlementRecord {
            tile: tiles[0],
            name: Some("Riverend".to_string()),
            faction_def: "TribeCivil".to_string(),
            custom: None,
        },
        SettlementRecord {
            tile: tiles[1],
            name: Some("Gullrock".to_string()),
            faction_def: "PirateBand".to_string(),
            custom: None,
        },
    ];
    let snapshot = PresetSnapshot::new("Oakhaven", "", sections);

    let mut session = PresetSession::new();
    let report = restore_snapshot(&mut world, &mut session, Some(&snapshot), &NoIdeologies);

    assert_eq!(
        report.diagnostics,
        vec![RestoreDiagnostic {
            section: InclusionFlags::BASES,
            error: RestoreError::not_found("faction def", "OutlanderCivil"),
        }]
    );
    let sites = settlement_sites(&mut world);
    assert_eq!(sites.len(), 2);
    assert!(sites.iter().all(|(_, name, _)| name != "Oakhaven"));
    assert_eq!(report.settlements_spawned, 2);
}

#[test]
fn full_terrain_onto_equal_tile_count_is_exact() {
    let source = generate("terrain-source");
    let sections = capture_sections(
        &source,
        &PresetSession::new(),
        &CaptureOptions::new(InclusionFlags::TERRAIN),
    );
    let snapshot = PresetSnapshot::new("Terrain", "", sections);

    let mut target = generate("terrain-target");
    let mut session = PresetSession::new();
    let report = restore_snapshot(&mut target, &mut session, Some(&snapshot), &NoIdeologies);
    assert!(report.is_clean());
    assert_eq!(report.applied, InclusionFlags::TERRAIN);

    let expected = source.resource::<WorldGrid>().tiles();
    let actual = target.resource::<WorldGrid>().tiles();
    assert_eq!(actual.biome, expected.biome);
    assert_eq!(actual.elevation, expected.elevation);
    assert_eq!(actual.hilliness, expected.hilliness);
    assert_eq!(actual.rivers, expected.rivers);
}

#[test]
fn full_terrain_onto_other_tile_count_is_rejected() {
    let source = generate("terrain-source");
    let sections = capture_sections(
        &source,
        &PresetSession::new(),
        &CaptureOptions::new(InclusionFlags::TERRAIN | InclusionFlags::TECH_LEVEL),
    );
    let snapshot = PresetSnapshot::new("Terrain", "", sections);

    let mut larger = params("terrain-larger");
    larger.subdivisions += 1;
    let mut target = generator().generate_plain(larger).expect("larger world");
    let before = target.resource::<WorldGrid>().tiles().clone();

    let mut session = PresetSession::new();
    let report = restore_snapshot(&mut target, &mut session, Some(&snapshot), &NoIdeologies);

    assert_eq!(report.diagnostics.len(), 1);
    assert!(matches!(
        report.diagnostics[0].error,
        RestoreError::Invalid { kind: "terrain", .. }
    ));
    assert!(!report.applied.contains(InclusionFlags::TERRAIN));
    assert!(report.applied.contains(InclusionFlags::TECH_LEVEL));
    assert_eq!(target.resource::<WorldGrid>().tiles(), &before);
}

#[test]
fn impossible_grid_size_is_reported_not_fatal() {
    let source = generate("terrain-source");
    let mut sections = capture_sections(
        &source,
        &PresetSession::new(),
        &CaptureOptions::new(InclusionFlags::TERRAIN),
    );
    if let Some(grid) = sections.terrain.as_mut().and_then(|t| t.grid.as_mut()) {
        grid.tiles.dimensions = GridDimensions {
            width: 65536,
            height: 65536,
        };
    }
    let snapshot = PresetSnapshot::new("Giant", "", sections);

    let mut target = generate("terrain-target");
    let before = target.resource::<WorldGrid>().tiles().clone();
    let mut session = PresetSession::new();
    let report = restore_snapshot(&mut target, &mut session, Some(&snapshot), &NoIdeologies);

    assert!(!report.applied.contains(InclusionFlags::TERRAIN));
    assert!(matches!(
        report.diagnostics[..],
        [RestoreDiagnostic {
            error: RestoreError::Invalid { kind: "terrain", .. },
            ..
        }]
    ));
    assert_eq!(target.resource::<WorldGrid>().tiles(), &before);
}
