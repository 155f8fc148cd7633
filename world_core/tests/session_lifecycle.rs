use bevy::prelude::*;
use preset_schema::{
    decode_session_payload_json, encode_session_payload_json, FactionPopulationData,
    InclusionFlags, PresetSnapshot, SettlementCustomData, WorldSections,
};

use world_core::components::{Faction, Settlement};
use world_core::{PresetConfig, PresetSession, WorldGenerator};

fn generated_world(seed: &str) -> World {
    let generator = WorldGenerator::new(PresetConfig::builtin());
    let mut params = PresetConfig::builtin().default_generation().clone();
    params.seed = seed.to_string();
    params.subdivisions = 2;
    generator.generate_plain(params).expect("world generates")
}

fn first_npc_settlement(world: &mut World) -> Entity {
    let players: Vec<Entity> = world
        .query::<(Entity, &Faction)>()
        .iter(world)
        .filter(|(_, faction)| faction.is_player)
        .map(|(entity, _)| entity)
        .collect();
    world
        .query::<(Entity, &Settlement)>()
        .iter(world)
        .find(|(_, settlement)| !players.contains(&settlement.faction))
        .map(|(entity, _)| entity)
        .expect("an npc settlement")
}

#[test]
fn orphaned_customisations_are_reaped_on_save() {
    let mut world = generated_world("reaper");
    let mut session = PresetSession::new();

    let settlements: Vec<Entity> = world
        .query_filtered::<Entity, With<Settlement>>()
        .iter(&world)
        .collect();
    for entity in &settlements {
        session.set_settlement_custom(*entity, SettlementCustomData::default());
    }
    let doomed = &settlements[..2];
    for entity in doomed {
        world.despawn(*entity);
    }

    let bundle = session.prepare_save_payload(&world);
    assert_eq!(
        session.tables().settlement_custom().len(),
        settlements.len() - doomed.len()
    );
    assert_eq!(
        bundle.side_tables.settlement_keys.len(),
        settlements.len() - doomed.len()
    );
}

#[test]
fn side_tables_survive_a_save_and_load() {
    let mut world = generated_world("persist");
    let settlement = first_npc_settlement(&mut world);
    let faction = world.get::<Settlement>(settlement).expect("settlement").faction;

    let mut session = PresetSession::new();
    session.set_settlement_custom(
        settlement,
        SettlementCustomData {
            description: Some("Walled market town".to_string()),
            ..Default::default()
        },
    );
    session.set_faction_population(
        faction,
        FactionPopulationData {
            population: 1200,
            leader_title: Some("Warden".to_string()),
        },
    );
    let bundle = session.prepare_save_payload(&world);
    assert!(!bundle.payload.sections().includes(InclusionFlags::IDEOLOGIES));

    let json = encode_session_payload_json(&bundle.payload).expect("encodes");
    let payload = decode_session_payload_json(&json).expect("decodes");
    assert_eq!(payload, bundle.payload);

    let mut restored = PresetSession::new();
    restored
        .on_load_game(&world, Some(&bundle))
        .expect("lengths match");
    assert_eq!(
        restored
            .settlement_custom(settlement)
            .and_then(|custom| custom.description.as_deref()),
        Some("Walled market town")
    );
    assert_eq!(
        restored.faction_population(faction).map(|p| p.population),
        Some(1200)
    );
}

#[test]
fn new_game_keeps_only_the_pending_preset() {
    let mut world = generated_world("reset");
    let settlement = first_npc_settlement(&mut world);
    let mut session = PresetSession::new();
    session.set_settlement_custom(settlement, SettlementCustomData::default());
    session.set_pending_preset(Some(PresetSnapshot::new(
        "Next",
        "",
        WorldSections::empty(InclusionFlags::TECH_LEVEL),
    )));

    session.on_new_game();
    assert!(session.tables().is_empty());
    assert_eq!(session.pending_preset().map(|p| p.name.as_str()), Some("Next"));

    session.clear_all();
    assert!(session.pending_preset().is_none());
}
