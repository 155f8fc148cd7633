//! Per-session state owned by the main thread: per-entity customisation
//! tables and the preset waiting to be applied to the next generated world.

use std::{collections::HashMap, marker::PhantomData, rc::Rc};

use bevy::prelude::*;
use preset_schema::{
    FactionPopulationData, MarkerCustomData, PresetSnapshot, SessionPayload,
    SettlementCustomData,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    capture::capture_session_payload,
    components::{Faction, MapMarker, Settlement},
    reaper::{reap_orphans, ReapReport},
};

/// Customisation data keyed by live entity.
#[derive(Debug, Default)]
pub struct SideTables {
    pub(crate) settlement_custom: HashMap<Entity, SettlementCustomData>,
    pub(crate) entity_custom: HashMap<Entity, MarkerCustomData>,
    pub(crate) faction_population: HashMap<Entity, FactionPopulationData>,
}

impl SideTables {
    pub fn len(&self) -> usize {
        self.settlement_custom.len() + self.entity_custom.len() + self.faction_population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.settlement_custom.clear();
        self.entity_custom.clear();
        self.faction_population.clear();
    }

    pub fn settlement_custom(&self) -> &HashMap<Entity, SettlementCustomData> {
        &self.settlement_custom
    }

    pub fn entity_custom(&self) -> &HashMap<Entity, MarkerCustomData> {
        &self.entity_custom
    }

    pub fn faction_population(&self) -> &HashMap<Entity, FactionPopulationData> {
        &self.faction_population
    }
}

/// Side tables flattened into parallel key/value lists for a save file.
/// Keys are entity bits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSideTables {
    pub settlement_keys: Vec<u64>,
    pub settlement_values: Vec<SettlementCustomData>,
    pub entity_keys: Vec<u64>,
    pub entity_values: Vec<MarkerCustomData>,
    pub faction_keys: Vec<u64>,
    pub faction_values: Vec<FactionPopulationData>,
}

/// Everything a save carries for this subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveBundle {
    pub payload: SessionPayload,
    pub side_tables: PersistedSideTables,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{table} table has {keys} keys but {values} values")]
    MismatchedLengths {
        table: &'static str,
        keys: usize,
        values: usize,
    },
}

/// Owned by the main thread; deliberately neither `Send` nor `Sync`.
#[derive(Debug, Default)]
pub struct PresetSession {
    tables: SideTables,
    pending_preset: Option<PresetSnapshot>,
    applied_preset: Option<String>,
    _main_thread: PhantomData<Rc<()>>,
}

impl PresetSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &SideTables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut SideTables {
        &mut self.tables
    }

    /// Custom data for a settlement, created on first use. `None` when the
    /// entity is not a live settlement.
    pub fn customize_settlement(
        &mut self,
        world: &World,
        entity: Entity,
    ) -> Option<&mut SettlementCustomData> {
        world.get::<Settlement>(entity)?;
        Some(self.tables.settlement_custom.entry(entity).or_default())
    }

    /// Custom data for a map marker, created on first use.
    pub fn customize_entity(
        &mut self,
        world: &World,
        entity: Entity,
    ) -> Option<&mut MarkerCustomData> {
        world.get::<MapMarker>(entity)?;
        Some(self.tables.entity_custom.entry(entity).or_default())
    }

    /// Population data for a faction, created on first use.
    pub fn customize_faction_population(
        &mut self,
        world: &World,
        entity: Entity,
    ) -> Option<&mut FactionPopulationData> {
        world.get::<Faction>(entity)?;
        Some(self.tables.faction_population.entry(entity).or_default())
    }

    pub fn settlement_custom(&self, entity: Entity) -> Option<&SettlementCustomData> {
        self.tables.settlement_custom.get(&entity)
    }

    pub fn entity_custom(&self, entity: Entity) -> Option<&MarkerCustomData> {
        self.tables.entity_custom.get(&entity)
    }

    pub fn faction_population(&self, entity: Entity) -> Option<&FactionPopulationData> {
        self.tables.faction_population.get(&entity)
    }

    pub fn set_settlement_custom(&mut self, entity: Entity, data: SettlementCustomData) {
        self.tables.settlement_custom.insert(entity, data);
    }

    pub fn set_entity_custom(&mut self, entity: Entity, data: MarkerCustomData) {
        self.tables.entity_custom.insert(entity, data);
    }

    pub fn set_faction_population(&mut self, entity: Entity, data: FactionPopulationData) {
        self.tables.faction_population.insert(entity, data);
    }

    pub(crate) fn clear_faction_population(&mut self) {
        self.tables.faction_population.clear();
    }

    pub fn reap_orphans(&mut self, world: &World) -> ReapReport {
        reap_orphans(world, &mut self.tables)
    }

    pub fn set_pending_preset(&mut self, preset: Option<PresetSnapshot>) {
        self.pending_preset = preset;
    }

    pub fn pending_preset(&self) -> Option<&PresetSnapshot> {
        self.pending_preset.as_ref()
    }

    /// Hands the pending preset to world generation. Each preset is applied
    /// at most once.
    pub fn take_pending_preset(&mut self) -> Option<PresetSnapshot> {
        self.pending_preset.take()
    }

    /// Name of the preset the current world was built from.
    pub fn applied_preset(&self) -> Option<&str> {
        self.applied_preset.as_deref()
    }

    pub(crate) fn mark_applied(&mut self, name: &str) {
        self.applied_preset = Some(name.to_string());
    }

    pub fn persist(&self) -> PersistedSideTables {
        let (settlement_keys, settlement_values) = flatten(&self.tables.settlement_custom);
        let (entity_keys, entity_values) = flatten(&self.tables.entity_custom);
        let (faction_keys, faction_values) = flatten(&self.tables.faction_population);
        PersistedSideTables {
            settlement_keys,
            settlement_values,
            entity_keys,
            entity_values,
            faction_keys,
            faction_values,
        }
    }

    /// Rebuilds the side tables from a save. Keys that do not name a live
    /// entity are dropped; returns how many.
    pub fn load_persisted(
        &mut self,
        world: &World,
        persisted: &PersistedSideTables,
    ) -> Result<usize, SessionError> {
        check_lengths(
            "settlement",
            &persisted.settlement_keys,
            &persisted.settlement_values,
        )?;
        check_lengths("entity", &persisted.entity_keys, &persisted.entity_values)?;
        check_lengths("faction", &persisted.faction_keys, &persisted.faction_values)?;

        self.tables.clear();
        let mut dropped = 0;
        dropped += rebuild(
            world,
            &mut self.tables.settlement_custom,
            &persisted.settlement_keys,
            &persisted.settlement_values,
        );
        dropped += rebuild(
            world,
            &mut self.tables.entity_custom,
            &persisted.entity_keys,
            &persisted.entity_values,
        );
        dropped += rebuild(
            world,
            &mut self.tables.faction_population,
            &persisted.faction_keys,
            &persisted.faction_values,
        );
        if dropped > 0 {
            tracing::info!(
                target: "world_presets::session",
                dropped,
                "session.persisted_keys_dropped"
            );
        }
        Ok(dropped)
    }

    /// Reaps, then captures the per-save payload.
    pub fn prepare_save_payload(&mut self, world: &World) -> SaveBundle {
        self.reap_orphans(world);
        SaveBundle {
            payload: capture_session_payload(world, self),
            side_tables: self.persist(),
        }
    }

    pub fn on_new_game(&mut self) {
        self.tables.clear();
        self.applied_preset = None;
        tracing::debug!(target: "world_presets::session", "session.reset=new_game");
    }

    /// Loading a save never applies a preset; the pending one is discarded.
    pub fn on_load_game(
        &mut self,
        world: &World,
        bundle: Option<&SaveBundle>,
    ) -> Result<(), SessionError> {
        self.clear_all();
        if let Some(bundle) = bundle {
            self.applied_preset = bundle.payload.source_preset().map(str::to_string);
            self.load_persisted(world, &bundle.side_tables)?;
        }
        tracing::debug!(target: "world_presets::session", "session.reset=load_game");
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.tables.clear();
        self.pending_preset = None;
        self.applied_preset = None;
    }
}

fn flatten<V: Clone>(table: &HashMap<Entity, V>) -> (Vec<u64>, Vec<V>) {
    let mut entries: Vec<(u64, &V)> = table
        .iter()
        .map(|(entity, value)| (entity.to_bits(), value))
        .collect();
    entries.sort_unstable_by_key(|(bits, _)| *bits);
    entries
        .into_iter()
        .map(|(bits, value)| (bits, value.clone()))
        .unzip()
}

fn check_lengths<V>(table: &'static str, keys: &[u64], values: &[V]) -> Result<(), SessionError> {
    if keys.len() == values.len() {
        Ok(())
    } else {
        Err(SessionError::MismatchedLengths {
            table,
            keys: keys.len(),
            values: values.len(),
        })
    }
}

fn rebuild<V: Clone>(
    world: &World,
    table: &mut HashMap<Entity, V>,
    keys: &[u64],
    values: &[V],
) -> usize {
    let mut dropped = 0;
    for (bits, value) in keys.iter().zip(values) {
        match Entity::try_from_bits(*bits) {
            Ok(entity) if world.get_entity(entity).is_some() => {
                table.insert(entity, value.clone());
            }
            _ => dropped += 1,
        }
    }
    dropped
}
