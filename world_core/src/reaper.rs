use std::collections::{HashMap, HashSet};

use bevy::prelude::*;

use crate::session::SideTables;

/// Entries removed by one sweep, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub settlement: usize,
    pub entity: usize,
    pub faction: usize,
}

impl ReapReport {
    pub fn total(&self) -> usize {
        self.settlement + self.entity + self.faction
    }
}

/// Drops side-table entries whose owning entity no longer exists.
///
/// The live set is rebuilt from the world on every call.
pub fn reap_orphans(world: &World, tables: &mut SideTables) -> ReapReport {
    let live: HashSet<Entity> = world.iter_entities().map(|entity| entity.id()).collect();
    let report = ReapReport {
        settlement: retain_live(&mut tables.settlement_custom, &live),
        entity: retain_live(&mut tables.entity_custom, &live),
        faction: retain_live(&mut tables.faction_population, &live),
    };
    if report.total() > 0 {
        tracing::info!(
            target: "world_presets::reaper",
            settlement = report.settlement,
            entity = report.entity,
            faction = report.faction,
            "reaper.swept"
        );
    }
    report
}

fn retain_live<V>(table: &mut HashMap<Entity, V>, live: &HashSet<Entity>) -> usize {
    let before = table.len();
    table.retain(|entity, _| live.contains(entity));
    before - table.len()
}

#[cfg(test)]
mod tests {
    use preset_schema::{FactionPopulationData, MarkerCustomData, SettlementCustomData};

    use super::*;

    #[test]
    fn removes_only_dead_keys() {
        let mut world = World::new();
        let live: Vec<Entity> = (0..5).map(|_| world.spawn_empty().id()).collect();
        let dead: Vec<Entity> = (0..3).map(|_| world.spawn_empty().id()).collect();

        let mut tables = SideTables::default();
        for entity in live.iter().chain(dead.iter()) {
            tables
                .settlement_custom
                .insert(*entity, SettlementCustomData::default());
        }
        tables
            .entity_custom
            .insert(dead[0], MarkerCustomData::default());
        tables
            .faction_population
            .insert(live[0], FactionPopulationData::default());
        for entity in &dead {
            world.despawn(*entity);
        }

        let report = reap_orphans(&world, &mut tables);
        assert_eq!(
            report,
            ReapReport {
                settlement: 3,
                entity: 1,
                faction: 0
            }
        );
        assert_eq!(tables.settlement_custom.len(), 5);
        assert!(tables.entity_custom.is_empty());
        assert_eq!(tables.faction_population.len(), 1);
    }

    #[test]
    fn second_sweep_is_a_no_op() {
        let mut world = World::new();
        let entity = world.spawn_empty().id();
        let mut tables = SideTables::default();
        tables
            .entity_custom
            .insert(entity, MarkerCustomData::default());
        world.despawn(entity);
        assert_eq!(reap_orphans(&world, &mut tables).total(), 1);
        assert_eq!(reap_orphans(&world, &mut tables).total(), 0);
    }
}
